//! Built-in tools over skill reference documents.
//!
//! Offered only when a selected skill ships a `references/` directory. They
//! never spawn a process; reads are contained to that directory.

use serde_json::{json, Value};
use std::time::Instant;

use skillbridge_core::{observability, Registry};
use skillbridge_sandbox::resources::{self, ResourceError};
use skillbridge_sandbox::{ExecutionResult, ExecutionState, ToolCallRequest};

use crate::schema::render_declaration;
use crate::types::ModelTarget;

pub const READ_RESOURCE: &str = "read_resource";
pub const SEARCH_RESOURCE: &str = "search_resource";

pub fn is_builtin(name: &str) -> bool {
    name == READ_RESOURCE || name == SEARCH_RESOURCE
}

pub fn declarations(target: ModelTarget) -> Vec<Value> {
    let read = json!({
        "type": "object",
        "properties": {
            "skill": {"type": "string", "description": "Skill name"},
            "file": {"type": "string", "description": "File name inside the skill's references directory"},
            "limit": {"type": "integer", "description": "Maximum characters to return"}
        },
        "required": ["skill", "file"]
    });
    let search = json!({
        "type": "object",
        "properties": {
            "skill": {"type": "string", "description": "Skill name"},
            "file": {"type": "string", "description": "File name inside the skill's references directory"},
            "query": {"type": "string", "description": "Case-insensitive text to find"}
        },
        "required": ["skill", "file", "query"]
    });
    vec![
        render_declaration(
            READ_RESOURCE,
            "Read a reference document shipped with a skill.",
            &read,
            target,
        ),
        render_declaration(
            SEARCH_RESOURCE,
            "Search a skill's reference document and return matching lines with line numbers.",
            &search,
            target,
        ),
    ]
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Run a built-in tool. Never requires approval.
pub fn dispatch(registry: &Registry, request: &ToolCallRequest) -> ExecutionResult {
    let start = Instant::now();
    let args = &request.arguments;
    let (Some(skill_name), Some(file)) = (str_arg(args, "skill"), str_arg(args, "file")) else {
        return ExecutionResult::with_stderr(
            request,
            ExecutionState::Failed,
            "missing required arguments: skill, file",
        );
    };
    let skill = match registry.get(skill_name) {
        Ok(s) => s,
        Err(e) => return ExecutionResult::with_stderr(request, ExecutionState::Failed, e.to_string()),
    };

    let output = if request.skill_name == READ_RESOURCE {
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
        resources::read_resource(&skill, file, limit)
    } else {
        let Some(query) = str_arg(args, "query") else {
            return ExecutionResult::with_stderr(
                request,
                ExecutionState::Failed,
                "missing required argument: query",
            );
        };
        resources::search_resource(&skill, file, query).map(|matches| json!(matches).to_string())
    };

    let mut result = match output {
        Ok(stdout) => ExecutionResult {
            stdout,
            exit_code: Some(0),
            ..ExecutionResult::with_stderr(request, ExecutionState::Success, "")
        },
        Err(ResourceError::Escape(e)) => {
            observability::security_path_violation(&skill.name, &request.call_id, "file", &e.to_string());
            ExecutionResult::with_stderr(request, ExecutionState::SecurityViolation, e.to_string())
        }
        Err(e) => ExecutionResult::with_stderr(request, ExecutionState::Failed, e.to_string()),
    };
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::skill::dependency::StaticProbe;
    use std::fs;
    use std::sync::Arc;

    fn registry_with_references() -> (tempfile::TempDir, Registry) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("style-guide");
        fs::create_dir_all(dir.join("references")).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            "---\nname: style-guide\ndescription: House style\n---\nFollow the guide.\n",
        )
        .unwrap();
        fs::write(
            dir.join("references").join("rules.md"),
            "Use short sentences.\nAvoid jargon.\nPrefer short words.\n",
        )
        .unwrap();
        let registry = Registry::scan(tmp.path(), Arc::new(StaticProbe::default())).unwrap();
        (tmp, registry)
    }

    #[test]
    fn test_declarations_per_target() {
        let decls = declarations(ModelTarget::Claude);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0]["name"], READ_RESOURCE);
        assert_eq!(decls[1]["input_schema"]["required"], json!(["skill", "file", "query"]));
        assert!(is_builtin(SEARCH_RESOURCE));
        assert!(!is_builtin("style-guide"));
    }

    #[test]
    fn test_read_and_search() {
        let (_tmp, registry) = registry_with_references();
        let read = ToolCallRequest::new("c1", READ_RESOURCE, json!({"skill": "style-guide", "file": "rules.md"}));
        let result = dispatch(&registry, &read);
        assert_eq!(result.state, ExecutionState::Success);
        assert!(result.stdout.starts_with("Use short sentences."));

        let search = ToolCallRequest::new(
            "c2",
            SEARCH_RESOURCE,
            json!({"skill": "style-guide", "file": "rules.md", "query": "SHORT"}),
        );
        let result = dispatch(&registry, &search);
        assert_eq!(result.state, ExecutionState::Success);
        let matches: Value = serde_json::from_str(&result.stdout).unwrap();
        assert_eq!(matches.as_array().unwrap().len(), 2);
        assert_eq!(matches[1]["line"], 3);
    }

    #[test]
    fn test_escape_is_security_violation() {
        let (_tmp, registry) = registry_with_references();
        let req = ToolCallRequest::new(
            "c3",
            READ_RESOURCE,
            json!({"skill": "style-guide", "file": "../../etc/passwd"}),
        );
        let result = dispatch(&registry, &req);
        assert_eq!(result.state, ExecutionState::SecurityViolation);
    }

    #[test]
    fn test_missing_arguments_fail() {
        let (_tmp, registry) = registry_with_references();
        let req = ToolCallRequest::new("c4", SEARCH_RESOURCE, json!({"skill": "style-guide", "file": "rules.md"}));
        let result = dispatch(&registry, &req);
        assert_eq!(result.state, ExecutionState::Failed);
        assert!(result.stderr.contains("query"));
    }
}
