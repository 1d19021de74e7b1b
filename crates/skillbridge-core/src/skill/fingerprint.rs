//! Version fingerprints: a content hash over the bundle's header and files.
//!
//! A fingerprint changes whenever any file in the bundle changes, even when the
//! declared `version` does not. Caches keyed by it can never serve stale shapes.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Hex chars kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint a bundle directory: sorted relative paths + contents.
pub fn compute_fingerprint(bundle_dir: &Path, version: &str) -> Result<String> {
    let mut files = Vec::new();
    collect_files(bundle_dir, bundle_dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    hasher.update([0u8]);
    for rel in files {
        let file_path = bundle_dir.join(&rel);
        let content = fs::read(&file_path)
            .with_context(|| format!("Failed to read file for hashing: {}", file_path.display()))?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    Ok(digest[..FINGERPRINT_LEN].to_string())
}

fn collect_files(root: &Path, current: &Path, out: &mut Vec<String>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(current)
        .with_context(|| format!("Failed to read directory: {}", current.display()))?
        .flatten()
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let ignored_dirs: HashSet<&str> =
        HashSet::from([".git", "__pycache__", "node_modules", ".venv", "venv"]);

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if ignored_dirs.contains(name.as_ref()) {
                continue;
            }
            collect_files(root, &path, out)?;
            continue;
        }
        if !path.is_file() || name == ".DS_Store" || name.ends_with(".pyc") {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.to_string_lossy().replace('\\', "/"));
        out.push(rel);
    }
    Ok(())
}
