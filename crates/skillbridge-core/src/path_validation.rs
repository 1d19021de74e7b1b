//! Path containment.
//!
//! Every filesystem argument is resolved to an absolute, symlink-free path and
//! must stay under the sandbox root. Targets that do not exist yet (output
//! files) are resolved through their deepest existing ancestor.

use std::path::{Component, Path, PathBuf};

use crate::error::PathEscape;

/// Canonicalize the sandbox root itself.
pub fn canonical_root(root: &Path) -> Result<PathBuf, PathEscape> {
    root.canonicalize()
        .map_err(|_| PathEscape::InvalidRoot(root.to_path_buf()))
}

/// Resolve `candidate` against an already canonical root.
///
/// Relative paths are joined onto the root; absolute paths are taken as-is and
/// must still land inside it. No filesystem mutation happens here.
pub fn resolve_under_canonical_root(root: &Path, candidate: &str) -> Result<PathBuf, PathEscape> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return Err(PathEscape::Malformed(candidate.to_string()));
    }
    let input = Path::new(trimmed);
    let full = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    // Split into the deepest existing ancestor and the missing tail.
    let mut existing = full.clone();
    let mut tail: Vec<Component<'_>> = Vec::new();
    let components: Vec<Component<'_>> = full.components().collect();
    let mut idx = components.len();
    while !existing.exists() {
        // A dangling symlink can point anywhere; refuse to follow it.
        if existing.symlink_metadata().is_ok() {
            return Err(PathEscape::OutsideRoot(candidate.to_string()));
        }
        if idx == 0 || !existing.pop() {
            return Err(PathEscape::OutsideRoot(candidate.to_string()));
        }
        idx -= 1;
        tail.push(components[idx]);
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|_| PathEscape::OutsideRoot(candidate.to_string()))?;
    for component in tail.into_iter().rev() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PathEscape::UnresolvableTraversal(candidate.to_string()))
            }
            _ => return Err(PathEscape::Malformed(candidate.to_string())),
        }
    }

    if !resolved.starts_with(root) {
        return Err(PathEscape::OutsideRoot(candidate.to_string()));
    }
    Ok(resolved)
}

/// Canonicalize `root`, then resolve `candidate` under it.
pub fn resolve_under_root(root: &Path, candidate: &str) -> Result<PathBuf, PathEscape> {
    let root = canonical_root(root)?;
    resolve_under_canonical_root(&root, candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_relative_path_inside_root() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/a.txt"), "x").unwrap();
        let resolved = resolve_under_root(tmp.path(), "data/a.txt").unwrap();
        assert!(resolved.ends_with("data/a.txt"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_parent_traversal_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("workspace");
        fs::create_dir_all(&root).unwrap();
        let err = resolve_under_root(&root, "../../etc/passwd").unwrap_err();
        assert!(matches!(
            err,
            PathEscape::OutsideRoot(_) | PathEscape::UnresolvableTraversal(_)
        ));
    }

    #[test]
    fn test_absolute_override_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_under_root(tmp.path(), "/etc/passwd").unwrap_err();
        assert_eq!(err, PathEscape::OutsideRoot("/etc/passwd".to_string()));
    }

    #[test]
    fn test_missing_target_resolved_through_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve_under_root(tmp.path(), "out/new/report.txt").unwrap();
        let root = tmp.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("out/new/report.txt"));
        assert!(!root.join("out").exists());
    }

    #[test]
    fn test_traversal_below_missing_directory_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_under_root(tmp.path(), "ghost/../../outside").unwrap_err();
        assert_eq!(
            err,
            PathEscape::UnresolvableTraversal("ghost/../../outside".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_indirection_escapes() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        let err = resolve_under_root(tmp.path(), "link/secret.txt").unwrap_err();
        assert_eq!(err, PathEscape::OutsideRoot("link/secret.txt".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", tmp.path().join("dangling")).unwrap();
        assert!(resolve_under_root(tmp.path(), "dangling").is_err());
    }

    #[test]
    fn test_empty_path_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_under_root(tmp.path(), "  ").unwrap_err(),
            PathEscape::Malformed("  ".to_string())
        );
    }
}
