//! Bundle discovery: direct children of the skills root that contain SKILL.md.

use std::fs;
use std::path::{Path, PathBuf};

use super::metadata::SKILL_FILE;

/// List bundle directories under `root`, ordered by lower-cased directory name.
///
/// Hidden directories are skipped. A missing root yields an empty list.
pub fn discover_bundles(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut bundles: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .map(|n| !n.to_string_lossy().starts_with('.'))
                .unwrap_or(false)
        })
        .filter(|p| p.join(SKILL_FILE).is_file())
        .collect();
    bundles.sort_by_key(|p| bundle_dir_name(p));
    bundles
}

/// Lower-cased directory name of a bundle.
pub fn bundle_dir_name(bundle: &Path) -> String {
    bundle
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_bundles_empty_or_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_bundles(tmp.path()).is_empty());
        assert!(discover_bundles(&tmp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_discover_bundles_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["Zeta", "alpha", ".hidden", "no-header"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("Zeta").join(SKILL_FILE), "---\nname: zeta\n---\n").unwrap();
        fs::write(tmp.path().join("alpha").join(SKILL_FILE), "---\nname: alpha\n---\n").unwrap();
        fs::write(tmp.path().join(".hidden").join(SKILL_FILE), "---\nname: h\n---\n").unwrap();

        let found = discover_bundles(tmp.path());
        let names: Vec<_> = found.iter().map(|p| bundle_dir_name(p)).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
