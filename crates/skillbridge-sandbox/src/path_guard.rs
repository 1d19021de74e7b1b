//! Argument path sanitization.
//!
//! Finds every filesystem argument of a call, resolves it under the sandbox
//! root and rewrites it to the canonical absolute path. Runs before any
//! process is started.

use serde_json::{Map, Value};
use skillbridge_core::error::PathEscape;
use skillbridge_core::path_validation::resolve_under_canonical_root;
use std::path::Path;

const PATH_KEYS: &[&str] = &[
    "path",
    "file",
    "dir",
    "directory",
    "folder",
    "source",
    "destination",
    "target",
    "output",
    "input_file",
];

const PATH_SUFFIXES: &[&str] = &["_path", "_file", "_dir"];

/// The first argument that failed containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathViolation {
    pub argument: String,
    pub value: String,
    pub error: PathEscape,
}

/// True for argument names that conventionally carry paths.
pub fn is_path_key(key: &str) -> bool {
    let key = key.to_lowercase();
    PATH_KEYS.contains(&key.as_str()) || PATH_SUFFIXES.iter().any(|s| key.ends_with(s))
}

/// What the declared schema says about one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathHint {
    Path,
    NotPath,
    Undeclared,
}

/// The declared property wins over the name guess: an `enum`, a non-string
/// `type` or a non-path `format` is never treated as a path.
fn path_hint(parameters: &Value, key: &str) -> PathHint {
    let Some(prop) = parameters.get("properties").and_then(|p| p.get(key)) else {
        return PathHint::Undeclared;
    };
    match prop.get("format").and_then(|f| f.as_str()) {
        Some("path") => return PathHint::Path,
        Some(_) => return PathHint::NotPath,
        None => {}
    }
    if prop.get("enum").is_some() {
        return PathHint::NotPath;
    }
    match prop.get("type").and_then(|t| t.as_str()) {
        None | Some("string") | Some("array") => PathHint::Undeclared,
        Some(_) => PathHint::NotPath,
    }
}

/// Single-token values carrying a parent traversal are checked even when
/// the argument is not a path. Prose with spaces is left alone.
fn has_traversal(value: &str) -> bool {
    let value = value.trim();
    !value.chars().any(char::is_whitespace)
        && Path::new(value)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
}

/// Resolve all filesystem arguments in place. `root` must be canonical.
pub fn sanitize_arguments(
    root: &Path,
    parameters: &Value,
    args: &mut Map<String, Value>,
) -> Result<usize, PathViolation> {
    let mut rewritten = 0;
    for (key, value) in args.iter_mut() {
        let hint = path_hint(parameters, key);
        if hint == PathHint::NotPath {
            continue;
        }
        let path_arg = hint == PathHint::Path || is_path_key(key);
        match value {
            Value::String(s) => {
                if path_arg || has_traversal(s) {
                    *s = resolve(root, key, s)?;
                    rewritten += 1;
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::String(s) = item {
                        if path_arg || has_traversal(s) {
                            *s = resolve(root, key, s)?;
                            rewritten += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(rewritten)
}

fn resolve(root: &Path, key: &str, value: &str) -> Result<String, PathViolation> {
    resolve_under_canonical_root(root, value)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|error| PathViolation {
            argument: key.to_string(),
            value: value.to_string(),
            error,
        })
}
