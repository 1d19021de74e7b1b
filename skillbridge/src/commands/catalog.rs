//! Catalog commands: health scan, manifest export, rendered tool declarations.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use skillbridge_agent::schema;
use skillbridge_agent::ModelTarget;
use skillbridge_core::skill::manifest;
use skillbridge_core::{selector, Registry, SkillDescriptor};

/// Per-skill health plus every bundle the scan rejected.
pub fn scan(registry: &Registry) -> Result<String> {
    let catalog = registry.snapshot();
    let out = json!({
        "root": registry.root(),
        "generation": catalog.generation(),
        "skills": registry.health(),
        "rejected": catalog.rejected(),
    });
    Ok(serde_json::to_string_pretty(&out)?)
}

/// Manifest JSON, written to `output` when given.
pub fn manifest(registry: &Registry, output: Option<&str>) -> Result<String> {
    let catalog = registry.snapshot();
    match output {
        Some(path) => {
            manifest::write_manifest(&catalog, Path::new(path))?;
            Ok(format!("Wrote manifest for {} skill(s) to {}", catalog.len(), path))
        }
        None => Ok(serde_json::to_string_pretty(&manifest::build_manifest(&catalog))?),
    }
}

/// Declarations as the given target would receive them.
pub fn tools(registry: &Registry, target: &str, query: Option<&str>, max: Option<usize>) -> Result<String> {
    let catalog = registry.snapshot();
    let parsed: ModelTarget = target.parse()?;
    let selected: Vec<Arc<SkillDescriptor>> = match query {
        Some(q) => selector::select(q, catalog.skills(), max.unwrap_or(parsed.default_max_tools())),
        None => catalog
            .skills()
            .iter()
            .take(max.unwrap_or(usize::MAX))
            .cloned()
            .collect(),
    };
    let declarations = selected
        .iter()
        .map(|d| schema::render_for(d, target))
        .collect::<Result<Vec<Value>, _>>()
        .with_context(|| format!("Failed to render tools for '{}'", target))?;
    Ok(serde_json::to_string_pretty(&declarations)?)
}
