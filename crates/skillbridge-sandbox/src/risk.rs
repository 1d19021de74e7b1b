//! High-risk predicates. A matching call is paused for approval instead of run.
//!
//! Categories are configured with SKILLBRIDGE_HIGH_RISK_CONFIRM:
//! - `destructive_fs`: recursive or forced deletes, disk formatting
//! - `network`: URL-valued arguments or bundles declaring `network: true`
//! - `shell`: remote-script pipes, fork bombs, recursive chmod 777
//!
//! Bundles declaring `risk_level: high` always pause unless the policy is `none`.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use skillbridge_core::config::HighRiskConfig;
use skillbridge_core::skill::{RiskLevel, SkillDescriptor};
use std::sync::LazyLock;

pub const DESTRUCTIVE_FS: &str = "destructive_fs";
pub const NETWORK: &str = "network";
pub const SHELL: &str = "shell";
pub const DECLARED_HIGH: &str = "declared_high_risk";

static TEXT_PATTERNS: LazyLock<Vec<(Regex, &'static str, &'static str)>> = LazyLock::new(|| {
    [
        (r"\brm\s+(-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\b", DESTRUCTIVE_FS, "recursive delete"),
        (r"\brm\s+(-[a-zA-Z]*f[a-zA-Z]*|--force)\b", DESTRUCTIVE_FS, "forced delete"),
        (r"(?i)\brmdir\s+/s\b", DESTRUCTIVE_FS, "recursive directory removal"),
        (r"(?i)\bdel\s+(/[a-z]\s+)*/s\b", DESTRUCTIVE_FS, "recursive delete"),
        (r"shutil\.rmtree", DESTRUCTIVE_FS, "recursive tree removal"),
        (r"\bfind\b.*\s-delete\b", DESTRUCTIVE_FS, "find -delete"),
        (r"\bmkfs(\.\w+)?\b", DESTRUCTIVE_FS, "filesystem format"),
        (r"\bdd\s+.*\bof=", DESTRUCTIVE_FS, "raw device write"),
        (r"(curl|wget)\s+.*\|\s*(bash|sh|zsh)\b", SHELL, "piping remote script to shell"),
        (r":\(\)\s*\{\s*:\|:\s*&\s*\}\s*;\s*:", SHELL, "fork bomb"),
        (r"chmod\s+(-[a-zA-Z]*R|--recursive)\s+777", SHELL, "recursive chmod 777"),
        (r"(?i)\b(https?|ftp)://", NETWORK, "outbound network address"),
    ]
    .into_iter()
    .map(|(pattern, category, reason)| {
        (
            Regex::new(pattern).expect("high-risk pattern is valid"),
            category,
            reason,
        )
    })
    .collect()
});

const DELETE_VERBS: &[&str] = &["delete", "remove", "purge", "wipe"];
const VERB_KEYS: &[&str] = &["operation", "action", "mode"];

/// Why a call was paused, plus the offending arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDescriptor {
    pub category: String,
    pub reason: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct HighRiskPolicy {
    config: HighRiskConfig,
}

impl Default for HighRiskPolicy {
    fn default() -> Self {
        Self::from_env()
    }
}

impl HighRiskPolicy {
    pub fn new(config: HighRiskConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(HighRiskConfig::from_env())
    }

    /// First matching predicate, if any.
    pub fn assess(&self, skill: &SkillDescriptor, args: &Map<String, Value>) -> Option<RiskDescriptor> {
        if self.config.is_disabled() {
            return None;
        }
        let found = self.match_arguments(args).or_else(|| {
            if skill.network && self.config.confirms(NETWORK) {
                Some((NETWORK, "skill declares outbound network access".to_string()))
            } else if skill.risk_level == RiskLevel::High {
                Some((DECLARED_HIGH, "skill declares risk_level: high".to_string()))
            } else {
                None
            }
        });
        found.map(|(category, reason)| RiskDescriptor {
            category: category.to_string(),
            reason: format!("{}: {}", skill.name, reason),
            arguments: Value::Object(args.clone()),
        })
    }

    fn match_arguments(&self, args: &Map<String, Value>) -> Option<(&'static str, String)> {
        if self.config.confirms(DESTRUCTIVE_FS) && is_recursive_delete_request(args) {
            return Some((DESTRUCTIVE_FS, "recursive delete requested".to_string()));
        }
        let mut texts = Vec::new();
        for (key, value) in args {
            collect_strings(key, value, &mut texts);
        }
        for (key, text) in texts {
            for (re, category, reason) in TEXT_PATTERNS.iter() {
                if self.config.confirms(category) && re.is_match(text) {
                    return Some((*category, format!("{} in argument '{}'", reason, key)));
                }
            }
        }
        None
    }
}

fn is_recursive_delete_request(args: &Map<String, Value>) -> bool {
    let get = |name: &str| {
        args.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };
    let deletes = VERB_KEYS.iter().filter_map(|k| get(k)).any(|v| {
        v.as_str()
            .is_some_and(|s| DELETE_VERBS.contains(&s.trim().to_lowercase().as_str()))
    });
    let recursive = get("recursive").is_some_and(|v| match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    });
    deletes && recursive
}

fn collect_strings<'a>(key: &'a str, value: &'a Value, out: &mut Vec<(&'a str, &'a str)>) {
    match value {
        Value::String(s) => out.push((key, s)),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(key, v, out)),
        Value::Object(map) => map.iter().for_each(|(k, v)| collect_strings(k, v, out)),
        _ => {}
    }
}
