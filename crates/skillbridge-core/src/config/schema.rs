//! 按领域分组的配置结构体
//!
//! 从环境变量加载，统一 fallback 逻辑。

use super::env_keys::{agent_loop, execution, high_risk, llm, observability as obv_keys, paths};
use super::loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// LLM API 配置
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Explicit backend variant (`openai`, `claude`, `gemini`). `None` = detect from model/base.
    pub target: Option<String>,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// 从环境变量加载，空值使用默认（会自动加载 .env）
    pub fn from_env() -> Self {
        load_dotenv();
        let target = env_optional(llm::MODEL_TARGET, &[]).map(|t| t.to_lowercase());
        let model = env_or(llm::MODEL, llm::MODEL_ALIASES, || {
            Self::default_model_for_target(target.as_deref()).to_string()
        });
        let api_base = env_or(llm::API_BASE, llm::API_BASE_ALIASES, || {
            Self::default_base_for(target.as_deref(), &model).to_string()
        });
        Self {
            target,
            api_base,
            api_key: env_or(llm::API_KEY, llm::API_KEY_ALIASES, String::new),
            model,
        }
    }

    /// 从环境变量加载，若 api_key 为空则返回 None
    pub fn try_from_env() -> Option<Self> {
        let cfg = Self::from_env();
        if cfg.api_key.trim().is_empty() {
            None
        } else {
            Some(cfg)
        }
    }

    pub fn default_model_for_target(target: Option<&str>) -> &'static str {
        match target {
            Some("claude") => "claude-3-5-sonnet-latest",
            Some("gemini") => "gemini-2.0-flash",
            _ => "gpt-4o",
        }
    }

    fn default_base_for(target: Option<&str>, model: &str) -> &'static str {
        let model = model.to_lowercase();
        if target == Some("claude") || model.starts_with("claude") {
            "https://api.anthropic.com"
        } else if target == Some("gemini") || model.starts_with("gemini") {
            "https://generativelanguage.googleapis.com/v1beta"
        } else {
            "https://api.openai.com/v1"
        }
    }
}

/// Skill bundle root and sandbox root.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub skills_dir: PathBuf,
    /// 所有执行路径都必须落在此目录下
    pub sandbox_root: PathBuf,
    /// When set, the catalog manifest is written here after each scan.
    pub manifest_path: Option<PathBuf>,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let skills_dir = env_optional(paths::SKILLS_DIR, paths::SKILLS_DIR_ALIASES)
            .map(PathBuf::from)
            .unwrap_or_else(|| cwd.join("skills"));
        let sandbox_root = env_optional(paths::SANDBOX_ROOT, paths::SANDBOX_ROOT_ALIASES)
            .map(PathBuf::from)
            .unwrap_or(cwd);
        let manifest_path = env_optional(paths::MANIFEST, &[]).map(PathBuf::from);
        Self {
            skills_dir,
            sandbox_root,
            manifest_path,
        }
    }
}

/// Resource limits and session housekeeping for the execution engine.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
    pub max_memory_mb: u64,
    pub session_ttl_secs: u64,
}

impl ExecutionConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            timeout_secs: env_parse(execution::TIMEOUT_SECS, &[], 30u64),
            max_memory_mb: env_parse(execution::MAX_MEMORY_MB, &[], 256u64),
            session_ttl_secs: env_parse(execution::SESSION_TTL_SECS, &[], 3600u64),
        }
    }
}

/// Agentic loop limits.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub max_iterations: usize,
    /// `0` disables expiry.
    pub approval_timeout_secs: u64,
    pub max_error_retries: usize,
}

impl LoopConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            max_iterations: env_parse(agent_loop::MAX_ITERATIONS, &[], 10usize),
            approval_timeout_secs: env_parse(agent_loop::APPROVAL_TIMEOUT_SECS, &[], 300u64),
            max_error_retries: env_parse(agent_loop::MAX_ERROR_RETRIES, &[], 0usize),
        }
    }
}

/// 高危类别集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighRiskConfig {
    pub categories: BTreeSet<String>,
}

impl HighRiskConfig {
    pub const DEFAULT_CATEGORIES: &'static [&'static str] = &["destructive_fs", "network", "shell"];

    pub fn from_env() -> Self {
        load_dotenv();
        let raw = env_optional(high_risk::CONFIRM, &[]).unwrap_or_else(|| "all".to_string());
        Self::parse(&raw)
    }

    /// "none" → 空集；"all" 或空 → 默认全部类别；否则逗号分隔
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        let categories = match raw.as_str() {
            "none" => BTreeSet::new(),
            "" | "all" => Self::DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            _ => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        Self { categories }
    }

    pub fn confirms(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    pub fn is_disabled(&self) -> bool {
        self.categories.is_empty()
    }
}

/// 可观测性配置：quiet、log_level、log_json、audit_log、security_events_log
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
    pub security_events_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::QUIET, &[], false),
                log_level: env_or(obv_keys::LOG_LEVEL, &[], || "skillbridge=info".to_string()),
                log_json: env_bool(obv_keys::LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::AUDIT_LOG, &[]),
                security_events_log: env_optional(obv_keys::SECURITY_EVENTS_LOG, &[]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_risk_parse() {
        assert!(HighRiskConfig::parse("none").is_disabled());
        let all = HighRiskConfig::parse("ALL");
        assert!(all.confirms("destructive_fs"));
        assert!(all.confirms("network"));
        assert!(all.confirms("shell"));
        let custom = HighRiskConfig::parse(" network , ");
        assert!(custom.confirms("network"));
        assert!(!custom.confirms("shell"));
    }

    #[test]
    fn test_default_model_for_target() {
        assert_eq!(LlmConfig::default_model_for_target(None), "gpt-4o");
        assert_eq!(LlmConfig::default_model_for_target(Some("gemini")), "gemini-2.0-flash");
        assert_eq!(
            LlmConfig::default_base_for(None, "claude-3-opus"),
            "https://api.anthropic.com"
        );
    }
}
