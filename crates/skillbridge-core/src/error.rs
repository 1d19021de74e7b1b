//! Typed errors for the registry, argument validation and sandbox containment.

use std::path::PathBuf;
use thiserror::Error;

/// Registry-level failures. Each is isolated to one bundle or one lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("integrity error: bundle directory '{dir_name}' does not match declared name '{declared}'")]
    Integrity { dir_name: String, declared: String },

    #[error("skill '{skill}' is unavailable: missing dependencies [{}]", .missing.join(", "))]
    DependencyMissing { skill: String, missing: Vec<String> },

    #[error("skill '{0}' not found")]
    NotFound(String),

    #[error("invalid skill bundle {}: {message}", dir.display())]
    Metadata { dir: PathBuf, message: String },

    #[error("skills root {} is not a directory", .0.display())]
    RootMissing(PathBuf),
}

/// Arguments rejected by a skill's declared parameter schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing required argument '{0}'")]
    MissingRequired(String),

    #[error("argument '{name}' must be of type {expected}")]
    WrongType { name: String, expected: String },

    #[error("argument '{name}' must be one of [{}]", .allowed.join(", "))]
    NotInEnum { name: String, allowed: Vec<String> },
}

/// A path argument that would resolve outside the sandbox root.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathEscape {
    #[error("sandbox root {} cannot be resolved", .0.display())]
    InvalidRoot(PathBuf),

    #[error("path '{0}' escapes the sandbox root")]
    OutsideRoot(String),

    #[error("path '{0}' contains a parent traversal below a missing directory")]
    UnresolvableTraversal(String),

    #[error("path '{0}' is empty or not a string")]
    Malformed(String),
}
