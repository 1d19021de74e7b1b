//! Argument validation against a skill's declared parameter schema.
//!
//! Only the subset skills actually declare is enforced: required keys,
//! top-level JSON types and `enum` membership. Unknown keys pass through.

use serde_json::{Map, Value};

use crate::error::ValidationError;

#[derive(Debug, Clone)]
struct PropertyRule {
    name: String,
    json_type: Option<String>,
    allowed: Option<Vec<Value>>,
}

/// Compiled form of a parameter schema. Cached per fingerprint by the registry.
#[derive(Debug, Clone, Default)]
pub struct ParamValidator {
    properties: Vec<PropertyRule>,
    required: Vec<String>,
}

impl ParamValidator {
    pub fn compile(schema: &Value) -> Self {
        let properties = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| PropertyRule {
                        name: name.clone(),
                        json_type: prop.get("type").and_then(|t| t.as_str()).map(|t| t.to_lowercase()),
                        allowed: prop.get("enum").and_then(|e| e.as_array()).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let required = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        Self {
            properties,
            required,
        }
    }

    /// Rename keys to their declared spelling (case-insensitive match).
    pub fn normalize_keys(&self, args: &Map<String, Value>) -> Map<String, Value> {
        args.iter()
            .map(|(k, v)| {
                let declared = self
                    .properties
                    .iter()
                    .find(|p| p.name == *k)
                    .or_else(|| self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(k)))
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| k.clone());
                (declared, v.clone())
            })
            .collect()
    }

    pub fn validate(&self, args: &Value) -> Result<(), ValidationError> {
        let obj = args.as_object().ok_or(ValidationError::NotAnObject)?;
        for name in &self.required {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    return Err(ValidationError::MissingRequired(name.clone()))
                }
                Some(_) => {}
            }
        }
        for rule in &self.properties {
            let Some(value) = obj.get(&rule.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(ref expected) = rule.json_type {
                if !type_matches(expected, value) {
                    return Err(ValidationError::WrongType {
                        name: rule.name.clone(),
                        expected: expected.clone(),
                    });
                }
            }
            if let Some(ref allowed) = rule.allowed {
                if !allowed.contains(value) {
                    return Err(ValidationError::NotInEnum {
                        name: rule.name.clone(),
                        allowed: allowed
                            .iter()
                            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                            .collect(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}
