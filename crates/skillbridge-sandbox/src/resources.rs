//! Read and search files in a bundle's `references/` directory.
//!
//! Resource names are contained by the same path algorithm as call arguments,
//! with the references directory as the root.

use serde::Serialize;
use skillbridge_core::error::PathEscape;
use skillbridge_core::path_validation::resolve_under_root;
use skillbridge_core::skill::SkillDescriptor;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Matches returned by one search.
pub const MAX_SEARCH_MATCHES: usize = 50;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("skill '{0}' has no references directory")]
    NoReferences(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Escape(#[from] PathEscape),

    #[error("failed to read resource {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMatch {
    pub line: usize,
    pub content: String,
}

fn resolve(skill: &SkillDescriptor, file: &str) -> Result<PathBuf, ResourceError> {
    let dir = skill
        .references_dir()
        .ok_or_else(|| ResourceError::NoReferences(skill.name.clone()))?;
    let path = resolve_under_root(&dir, file)?;
    if !path.is_file() {
        return Err(ResourceError::NotFound(file.to_string()));
    }
    Ok(path)
}

fn read(path: PathBuf) -> Result<String, ResourceError> {
    fs::read(&path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| ResourceError::Io { path, source })
}

/// Read a reference file, truncated to `limit` characters when given.
pub fn read_resource(
    skill: &SkillDescriptor,
    file: &str,
    limit: Option<usize>,
) -> Result<String, ResourceError> {
    let content = read(resolve(skill, file)?)?;
    Ok(match limit {
        Some(n) if content.chars().count() > n => content.chars().take(n).collect(),
        _ => content,
    })
}

/// Case-insensitive line search, capped at [`MAX_SEARCH_MATCHES`].
pub fn search_resource(
    skill: &SkillDescriptor,
    file: &str,
    query: &str,
) -> Result<Vec<ResourceMatch>, ResourceError> {
    let content = read(resolve(skill, file)?)?;
    let needle = query.to_lowercase();
    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| line.to_lowercase().contains(&needle))
        .take(MAX_SEARCH_MATCHES)
        .map(|(i, line)| ResourceMatch {
            line: i + 1,
            content: line.trim().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillbridge_core::skill::{Readiness, RiskLevel};

    fn skill_at(dir: PathBuf) -> SkillDescriptor {
        SkillDescriptor {
            name: "doc-skill".to_string(),
            version: "0.1.0".to_string(),
            description: String::new(),
            parameters: json!({"type": "object", "properties": {}}),
            runtime_requirements: Vec::new(),
            tags: Vec::new(),
            category: "general".to_string(),
            readiness: Readiness::ready(),
            fingerprint: "0".repeat(16),
            risk_level: RiskLevel::Low,
            network: false,
            estimated_tokens: 500,
            bundle_dir: dir,
            entry_point: None,
            language: None,
            guide: String::new(),
            has_references: true,
        }
    }

    #[test]
    fn test_read_and_search() {
        let tmp = tempfile::tempdir().unwrap();
        let refs = tmp.path().join("references");
        fs::create_dir_all(&refs).unwrap();
        let body: String = (1..=80).map(|i| format!("Row {} alpha\n", i)).collect();
        fs::write(refs.join("guide.md"), format!("Intro\n{}", body)).unwrap();
        let skill = skill_at(tmp.path().to_path_buf());

        assert_eq!(read_resource(&skill, "guide.md", Some(5)).unwrap(), "Intro");
        let hits = search_resource(&skill, "guide.md", "ALPHA").unwrap();
        assert_eq!(hits.len(), MAX_SEARCH_MATCHES);
        assert_eq!(hits[0], ResourceMatch { line: 2, content: "Row 1 alpha".to_string() });
    }

    #[test]
    fn test_escape_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("references")).unwrap();
        fs::write(tmp.path().join("SKILL.md"), "secret").unwrap();
        let skill = skill_at(tmp.path().to_path_buf());

        assert!(matches!(
            read_resource(&skill, "../SKILL.md", None),
            Err(ResourceError::Escape(_))
        ));
        assert!(matches!(
            read_resource(&skill, "nope.md", None),
            Err(ResourceError::NotFound(_))
        ));
    }
}
