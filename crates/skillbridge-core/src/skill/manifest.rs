//! Catalog manifest and health view for external routing layers.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::registry::Catalog;

pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub runtime_requirements: Vec<String>,
    pub estimated_tokens: u32,
    pub ready: bool,
    pub missing_deps: Vec<String>,
    pub fingerprint: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogManifest {
    pub version: String,
    pub generated_at: String,
    pub generation: u64,
    pub skills: Vec<ManifestEntry>,
}

/// Per-skill `{version, ready, missing_deps}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthEntry {
    pub version: String,
    pub ready: bool,
    pub missing_deps: Vec<String>,
}

pub fn build_manifest(catalog: &Catalog) -> CatalogManifest {
    let skills = catalog
        .skills()
        .iter()
        .map(|d| ManifestEntry {
            id: d.name.clone(),
            name: d.name.clone(),
            version: d.version.clone(),
            description: d.description.clone(),
            category: d.category.clone(),
            runtime_requirements: d.runtime_requirements.clone(),
            estimated_tokens: d.estimated_tokens,
            ready: d.readiness.ready,
            missing_deps: d.readiness.missing_deps.clone(),
            fingerprint: d.fingerprint.clone(),
            parameters: d.parameters.clone(),
        })
        .collect();
    CatalogManifest {
        version: MANIFEST_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        generation: catalog.generation(),
        skills,
    }
}

/// Write the manifest as pretty JSON, creating parent directories.
pub fn write_manifest(catalog: &Catalog, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(&build_manifest(catalog))?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    Ok(())
}

pub fn health(catalog: &Catalog) -> BTreeMap<String, HealthEntry> {
    catalog
        .skills()
        .iter()
        .map(|d| {
            (
                d.name.clone(),
                HealthEntry {
                    version: d.version.clone(),
                    ready: d.readiness.ready,
                    missing_deps: d.readiness.missing_deps.clone(),
                },
            )
        })
        .collect()
}
