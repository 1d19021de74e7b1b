use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Declarative header file at the root of every bundle.
pub const SKILL_FILE: &str = "SKILL.md";

static FRONT_MATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^---\s*\n(.*?)\n---[ \t]*\r?\n?").expect("SKILL.md front matter regex is valid")
});

static ENUM_SHORTHAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^enum\[(.*)\]$").expect("enum shorthand regex is valid"));

/// Front matter as written in SKILL.md.
#[derive(Deserialize, Debug, Clone, Default)]
struct FrontMatter {
    #[serde(default)]
    name: String,

    #[serde(default)]
    version: Option<serde_yaml::Value>,

    #[serde(default)]
    description: Option<String>,

    /// Either a JSON schema object or a `{name: type}` shorthand map.
    #[serde(default)]
    parameters: Option<serde_yaml::Value>,

    /// Entries may be null in hand-written headers.
    #[serde(default)]
    runtime_requirements: Vec<Option<String>>,

    #[serde(default)]
    category: Option<String>,

    #[serde(default)]
    tags: Vec<String>,

    #[serde(default)]
    risk_level: Option<String>,

    #[serde(default)]
    network: Option<bool>,

    #[serde(default)]
    estimated_tokens: Option<u32>,
}

/// Declared risk level of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    High,
}

/// Parsed header plus what was detected from the bundle layout.
#[derive(Debug, Clone)]
pub struct SkillHeader {
    /// Declared name, as written.
    pub name: String,
    pub version: String,
    pub description: String,
    /// Normalised JSON-schema object (`type: object`).
    pub parameters: Value,
    pub runtime_requirements: Vec<String>,
    pub category: String,
    pub declared_tags: Vec<String>,
    pub risk_level: RiskLevel,
    pub network: bool,
    pub estimated_tokens: u32,
    /// Entry point relative to the bundle dir, `None` for knowledge skills.
    pub entry_point: Option<String>,
    /// "python", "node" or "bash"
    pub language: Option<String>,
    /// Markdown after the front matter.
    pub guide: String,
    /// Raw front matter text.
    pub raw_header: String,
}

/// Parse SKILL.md in `bundle_dir` and detect the entry point.
pub fn parse_skill_header(bundle_dir: &Path) -> Result<SkillHeader> {
    let skill_md_path = bundle_dir.join(SKILL_FILE);
    if !skill_md_path.exists() {
        anyhow::bail!("SKILL.md not found in directory: {}", bundle_dir.display());
    }
    let content = fs::read_to_string(&skill_md_path)
        .with_context(|| format!("Failed to read SKILL.md: {}", skill_md_path.display()))?;

    let mut header = parse_header_content(&content)?;
    header.entry_point = detect_entry_point(bundle_dir);
    header.language = header
        .entry_point
        .as_deref()
        .and_then(detect_language_from_entry_point);
    Ok(header)
}

/// Parse header text without touching the filesystem.
pub fn parse_header_content(content: &str) -> Result<SkillHeader> {
    let captures = FRONT_MATTER_RE
        .captures(content)
        .ok_or_else(|| anyhow::anyhow!("No YAML front matter found in SKILL.md"))?;
    let whole = captures
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("Failed to extract YAML content"))?;
    let yaml_content = captures
        .get(1)
        .ok_or_else(|| anyhow::anyhow!("Failed to extract YAML content"))?
        .as_str();

    let fm: FrontMatter =
        serde_yaml::from_str(yaml_content).with_context(|| "Failed to parse YAML front matter")?;

    if fm.name.trim().is_empty() {
        anyhow::bail!("Skill name is required in SKILL.md");
    }

    let parameters = match fm.parameters {
        Some(raw) => normalize_parameters(yaml_to_json(raw)?)?,
        None => empty_parameters(),
    };

    let risk_level = match fm.risk_level.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(ref s) if s == "high" => RiskLevel::High,
        _ => RiskLevel::Low,
    };

    Ok(SkillHeader {
        name: fm.name.trim().to_string(),
        version: fm
            .version
            .map(scalar_to_string)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "0.1.0".to_string()),
        description: fm.description.unwrap_or_default().trim().to_string(),
        parameters,
        runtime_requirements: fm
            .runtime_requirements
            .into_iter()
            .flatten()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        category: fm
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string()),
        declared_tags: fm.tags.into_iter().map(|t| t.trim().to_lowercase()).collect(),
        risk_level,
        network: fm.network.unwrap_or(false),
        estimated_tokens: fm.estimated_tokens.unwrap_or(500),
        entry_point: None,
        language: None,
        guide: content[whole.end()..].trim().to_string(),
        raw_header: yaml_content.to_string(),
    })
}

fn scalar_to_string(v: serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn yaml_to_json(v: serde_yaml::Value) -> Result<Value> {
    serde_json::to_value(v).with_context(|| "parameters must be representable as JSON")
}

fn empty_parameters() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

/// Accept a full JSON schema, or the `{name: "string" | "enum[a,b]" | "integer?"}` shorthand.
fn normalize_parameters(raw: Value) -> Result<Value> {
    let Value::Object(map) = raw else {
        anyhow::bail!("parameters must be a mapping");
    };
    if map.contains_key("properties") || map.get("type").and_then(|t| t.as_str()) == Some("object")
    {
        let mut schema = map;
        schema
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
        schema
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        return Ok(Value::Object(schema));
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, spec) in map {
        let (prop, is_required) = match spec {
            Value::String(s) => shorthand_property(&s),
            Value::Object(obj) => (Value::Object(obj), true),
            other => anyhow::bail!("unsupported parameter spec for '{}': {}", name, other),
        };
        if is_required {
            required.push(Value::String(name.clone()));
        }
        properties.insert(name, prop);
    }
    Ok(json!({ "type": "object", "properties": properties, "required": required }))
}

/// `"string"`, `"integer?"`, `"enum[a,b,c]"`, `"path"` → property schema + required flag.
fn shorthand_property(spec: &str) -> (Value, bool) {
    let spec = spec.trim();
    let (spec, required) = match spec.strip_suffix('?') {
        Some(s) => (s.trim(), false),
        None => (spec, true),
    };
    if let Some(caps) = ENUM_SHORTHAND_RE.captures(spec) {
        let values: Vec<Value> = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or("")
            .split(',')
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| Value::String(v.to_string()))
            .collect();
        return (json!({ "type": "string", "enum": values }), required);
    }
    let prop = match spec.to_lowercase().as_str() {
        "path" | "file" => json!({ "type": "string", "format": "path" }),
        "int" | "integer" => json!({ "type": "integer" }),
        "float" | "number" => json!({ "type": "number" }),
        "bool" | "boolean" => json!({ "type": "boolean" }),
        "array" | "list" => json!({ "type": "array" }),
        "object" | "dict" => json!({ "type": "object" }),
        _ => json!({ "type": "string" }),
    };
    (prop, required)
}

/// Auto-detect entry point: main.{py,js,sh} under scripts/ (or legacy Scripts/).
fn detect_entry_point(bundle_dir: &Path) -> Option<String> {
    for dir in ["scripts", "Scripts"] {
        let scripts_dir = bundle_dir.join(dir);
        if !scripts_dir.is_dir() {
            continue;
        }
        for ext in [".py", ".js", ".sh"] {
            if scripts_dir.join(format!("main{}", ext)).is_file() {
                return Some(format!("{}/main{}", dir, ext));
            }
        }
    }
    None
}

/// Auto-detect language from entry point extension
fn detect_language_from_entry_point(entry_point: &str) -> Option<String> {
    if entry_point.ends_with(".py") {
        Some("python".to_string())
    } else if entry_point.ends_with(".js") {
        Some("node".to_string())
    } else if entry_point.ends_with(".sh") {
        Some("bash".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand_parameters() {
        let content = r#"---
name: sample-converter
version: 1.2.0
description: Convert text between cases or count words
parameters:
  input_text: string
  operation: enum[uppercase,lowercase,titlecase,wordcount]
  limit: integer?
runtime_requirements: []
---

# Sample converter

Use `operation` to pick the conversion.
"#;
        let header = parse_header_content(content).expect("header should parse");
        assert_eq!(header.name, "sample-converter");
        assert_eq!(header.version, "1.2.0");
        assert_eq!(header.category, "general");
        assert_eq!(header.parameters["type"], "object");
        assert_eq!(header.parameters["properties"]["input_text"]["type"], "string");
        assert_eq!(
            header.parameters["properties"]["operation"]["enum"],
            json!(["uppercase", "lowercase", "titlecase", "wordcount"])
        );
        assert_eq!(header.parameters["properties"]["limit"]["type"], "integer");
        let required = header.parameters["required"].as_array().unwrap();
        assert!(required.contains(&json!("input_text")));
        assert!(!required.contains(&json!("limit")));
        assert!(header.guide.starts_with("# Sample converter"));
    }

    #[test]
    fn test_parse_full_json_schema_parameters() {
        let content = r#"---
name: reader
version: 2
parameters:
  type: object
  properties:
    path:
      type: string
      format: path
  required: [path]
runtime_requirements:
  - pandas>=2.0
  -
  - "requests==2.31  # http"
risk_level: HIGH
network: true
---
"#;
        let header = parse_header_content(content).expect("header should parse");
        assert_eq!(header.version, "2");
        assert_eq!(header.parameters["properties"]["path"]["format"], "path");
        assert_eq!(
            header.runtime_requirements,
            vec!["pandas>=2.0".to_string(), "requests==2.31  # http".to_string()]
        );
        assert_eq!(header.risk_level, RiskLevel::High);
        assert!(header.network);
    }

    #[test]
    fn test_missing_parameters_defaults_to_empty_object() {
        let header = parse_header_content("---\nname: guide-only\n---\nRead me.\n").unwrap();
        assert_eq!(header.parameters["properties"], json!({}));
        assert_eq!(header.estimated_tokens, 500);
        assert_eq!(header.guide, "Read me.");
    }

    #[test]
    fn test_missing_front_matter_or_name_fails() {
        assert!(parse_header_content("# no header").is_err());
        assert!(parse_header_content("---\ndescription: nameless\n---\n").is_err());
    }

    #[test]
    fn test_detect_entry_point_and_language() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("Scripts")).unwrap();
        std::fs::write(tmp.path().join("Scripts/main.py"), "print('x')").unwrap();
        std::fs::write(tmp.path().join(SKILL_FILE), "---\nname: legacy\n---\n").unwrap();
        let header = parse_skill_header(tmp.path()).unwrap();
        assert_eq!(header.entry_point.as_deref(), Some("Scripts/main.py"));
        assert_eq!(header.language.as_deref(), Some("python"));
    }
}
