//! Tool declarations per model family.
//!
//! `render` is a pure function of the descriptor and the target: the output
//! object maps are ordered, so the same input always serializes to the same
//! bytes. [`SchemaCache`] keeps one rendered declaration per
//! `(target, skill)` pinned to the skill's fingerprint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use skillbridge_core::cache::FingerprintCache;
use skillbridge_core::{Catalog, SkillDescriptor};

use crate::types::{ModelTarget, UnsupportedTargetError};

/// Description length accepted by every supported model family.
pub const DESCRIPTION_LIMIT: usize = 1024;

const PRUNE_MARKER: &str = "... [Content Pruned for Token Economy]";

/// Appended for skills that ship reference documents.
pub const RESOURCE_HINT: &str = "\n[NOTE: Before using this tool, check its reference documents with 'read_resource' or 'search_resource' if applicable.]";

/// Keep the first `limit - 50` chars and mark the cut.
pub fn prune_description(description: &str, limit: usize) -> String {
    if description.chars().count() <= limit {
        return description.to_string();
    }
    let kept: String = description.chars().take(limit.saturating_sub(50)).collect();
    format!("{}{}", kept, PRUNE_MARKER)
}

fn describe(descriptor: &SkillDescriptor) -> String {
    let base = descriptor.description.trim();
    let mut text = if base.is_empty() {
        format!("Run the {} skill.", descriptor.name)
    } else {
        prune_description(base, DESCRIPTION_LIMIT)
    };
    if descriptor.has_references {
        text.push_str(RESOURCE_HINT);
    }
    if !descriptor.is_ready() {
        text.push_str(&format!(
            " [UNAVAILABLE: Missing dependencies: {}]",
            descriptor.readiness.missing_deps.join(", ")
        ));
    }
    text
}

/// Render the tool declaration of one skill for `target`.
pub fn render(descriptor: &SkillDescriptor, target: ModelTarget) -> Value {
    render_declaration(
        &descriptor.name,
        &describe(descriptor),
        &descriptor.parameters,
        target,
    )
}

/// [`render`] with a target identifier such as `"openai"`.
pub fn render_for(descriptor: &SkillDescriptor, target: &str) -> Result<Value, UnsupportedTargetError> {
    Ok(render(descriptor, target.parse()?))
}

/// Build a declaration from raw parts. Also used for built-in tools.
pub fn render_declaration(name: &str, description: &str, parameters: &Value, target: ModelTarget) -> Value {
    let parameters = object_schema(parameters);
    match target {
        ModelTarget::OpenAi => json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
            }
        }),
        ModelTarget::Claude => json!({
            "name": name,
            "description": description,
            "input_schema": parameters,
        }),
        ModelTarget::Gemini => json!({
            "name": name,
            "description": description,
            "parameters": gemini_schema(&parameters),
        }),
    }
}

/// Top-level parameters are always an object schema with `properties`.
fn object_schema(parameters: &Value) -> Value {
    let mut schema = match parameters {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    schema.insert("type".to_string(), json!("object"));
    if !schema.get("properties").is_some_and(Value::is_object) {
        schema.insert("properties".to_string(), json!({}));
    }
    Value::Object(schema)
}

/// Fold every key to lower case and upper-case `type` values.
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                let key = key.to_lowercase();
                let folded = match key.as_str() {
                    "type" => gemini_type(value),
                    "properties" => match value {
                        Value::Object(props) => Value::Object(
                            props
                                .iter()
                                .map(|(name, prop)| (name.to_lowercase(), gemini_schema(prop)))
                                .collect(),
                        ),
                        other => other.clone(),
                    },
                    "required" => match value {
                        Value::Array(names) => Value::Array(
                            names
                                .iter()
                                .map(|n| match n.as_str() {
                                    Some(s) => Value::String(s.to_lowercase()),
                                    None => n.clone(),
                                })
                                .collect(),
                        ),
                        other => other.clone(),
                    },
                    // Gemini rejects these.
                    "additionalproperties" => continue,
                    "format" if !matches!(value.as_str(), Some("enum" | "date-time")) => continue,
                    _ => gemini_schema(value),
                };
                out.insert(key, folded);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

fn gemini_type(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        // Union types are not supported; keep the first non-null member.
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .map(|t| Value::String(t.to_uppercase()))
            .unwrap_or_else(|| json!("STRING")),
        other => other.clone(),
    }
}

/// One rendered declaration.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaCacheEntry {
    pub skill_name: String,
    pub target: ModelTarget,
    /// Bundle fingerprint the schema was rendered from.
    pub fingerprint: String,
    pub schema: Value,
    pub rendered_at: DateTime<Utc>,
}

/// Rendered declarations shared by concurrent turns.
pub struct SchemaCache {
    entries: FingerprintCache<SchemaCacheEntry>,
    /// Catalog generation the entries were last pruned against.
    synced_generation: AtomicU64,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self {
            entries: FingerprintCache::default(),
            synced_generation: AtomicU64::new(u64::MAX),
        }
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry, re-rendered when the bundle fingerprint or readiness changed.
    pub fn entry(&self, descriptor: &SkillDescriptor, target: ModelTarget) -> Arc<SchemaCacheEntry> {
        let key = format!("{}/{}", target.as_str(), descriptor.name);
        // Readiness changes the description without changing the bundle.
        let pin = format!(
            "{}:{}",
            descriptor.fingerprint,
            descriptor.readiness.missing_deps.join(",")
        );
        self.entries.get_or_insert_with(&key, &pin, || SchemaCacheEntry {
            skill_name: descriptor.name.clone(),
            target,
            fingerprint: descriptor.fingerprint.clone(),
            schema: render(descriptor, target),
            rendered_at: Utc::now(),
        })
    }

    pub fn render(&self, descriptor: &SkillDescriptor, target: ModelTarget) -> Value {
        self.entry(descriptor, target).schema.clone()
    }

    /// Drop entries of skills that left the catalog.
    pub fn retain_catalog(&self, catalog: &Catalog) {
        self.entries.retain(|key| {
            key.split_once('/')
                .is_some_and(|(_, name)| catalog.get(name).is_some())
        });
    }

    /// Prune once per catalog generation, so skills removed by a reload
    /// do not keep their entries.
    pub fn sync_catalog(&self, catalog: &Catalog) {
        let generation = catalog.generation();
        if self.synced_generation.swap(generation, Ordering::AcqRel) != generation {
            self.retain_catalog(catalog);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
