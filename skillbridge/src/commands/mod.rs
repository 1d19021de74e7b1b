//! Command handlers. Each returns the text to print on stdout.

pub mod catalog;
pub mod chat;
pub mod exec;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use skillbridge_core::config::PathsConfig;
use skillbridge_core::skill::dependency::EnvironmentProbe;
use skillbridge_core::Registry;

/// Paths from the environment with CLI overrides applied.
pub fn resolve_paths(skills_dir: Option<&str>, root: Option<&str>) -> PathsConfig {
    let mut paths = PathsConfig::from_env();
    if let Some(dir) = skills_dir {
        paths.skills_dir = PathBuf::from(dir);
    }
    if let Some(root) = root {
        paths.sandbox_root = PathBuf::from(root);
    }
    paths
}

/// Scan the skill root with a probe of the real environment.
pub fn load_registry(paths: &PathsConfig) -> Result<Arc<Registry>> {
    let registry = Registry::scan(&paths.skills_dir, Arc::new(EnvironmentProbe::new()))
        .with_context(|| format!("Failed to load skills from {}", paths.skills_dir.display()))?
        .with_manifest_path(paths.manifest_path.clone());
    Ok(Arc::new(registry))
}
