//! Catalog entries.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use super::metadata::RiskLevel;

/// Dependency status of one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Readiness {
    pub ready: bool,
    pub missing_deps: Vec<String>,
}

impl Readiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            missing_deps: Vec::new(),
        }
    }
}

/// One catalogued skill. Owned by the registry; shared read-only through snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct SkillDescriptor {
    /// Canonical (lower-cased) identity.
    pub name: String,
    pub version: String,
    pub description: String,
    /// JSON-schema object of accepted arguments.
    pub parameters: Value,
    pub runtime_requirements: Vec<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub readiness: Readiness,
    /// Content hash of the bundle; keys every derived cache.
    pub fingerprint: String,
    pub risk_level: RiskLevel,
    pub network: bool,
    pub estimated_tokens: u32,
    #[serde(skip)]
    pub bundle_dir: PathBuf,
    /// Relative to `bundle_dir`; `None` for knowledge skills.
    pub entry_point: Option<String>,
    pub language: Option<String>,
    #[serde(skip)]
    pub guide: String,
    /// Bundle ships a references/ directory.
    pub has_references: bool,
}

impl SkillDescriptor {
    pub fn is_ready(&self) -> bool {
        self.readiness.ready
    }

    /// Knowledge skills have no entry point; executing one returns its guide.
    pub fn is_knowledge(&self) -> bool {
        self.entry_point.is_none()
    }

    /// Parameter names declared in the schema, in schema order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    /// Absolute path of the bundle's references directory, if any.
    pub fn references_dir(&self) -> Option<PathBuf> {
        ["references", "References"]
            .iter()
            .map(|d| self.bundle_dir.join(d))
            .find(|p| p.is_dir())
    }
}
