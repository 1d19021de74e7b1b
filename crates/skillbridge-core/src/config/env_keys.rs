//! 环境变量 key 常量与别名定义
//!
//! 主变量使用 `SKILLBRIDGE_*`，兼容 `OPENAI_*`、`ANTHROPIC_*`、`GEMINI_*` 等。

/// LLM API 配置
pub mod llm {
    /// Backend variant: openai | claude | gemini
    pub const MODEL_TARGET: &str = "SKILLBRIDGE_MODEL_TARGET";

    pub const API_BASE: &str = "SKILLBRIDGE_API_BASE";
    pub const API_BASE_ALIASES: &[&str] = &["OPENAI_API_BASE", "OPENAI_BASE_URL", "BASE_URL"];

    pub const API_KEY: &str = "SKILLBRIDGE_API_KEY";
    pub const API_KEY_ALIASES: &[&str] =
        &["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "GEMINI_API_KEY", "API_KEY"];

    pub const MODEL: &str = "SKILLBRIDGE_MODEL";
    pub const MODEL_ALIASES: &[&str] = &["OPENAI_MODEL", "CLAUDE_MODEL", "GEMINI_MODEL", "MODEL"];
}

/// Skills、沙箱根目录、manifest
pub mod paths {
    pub const SKILLS_DIR: &str = "SKILLBRIDGE_SKILLS_DIR";
    pub const SKILLS_DIR_ALIASES: &[&str] = &["SKILLS_HOME", "SKILLS_DIR"];

    pub const SANDBOX_ROOT: &str = "SKILLBRIDGE_SANDBOX_ROOT";
    pub const SANDBOX_ROOT_ALIASES: &[&str] = &["SKILLBRIDGE_WORKSPACE"];

    pub const MANIFEST: &str = "SKILLBRIDGE_MANIFEST";
}

/// 执行资源限制与会话
pub mod execution {
    pub const TIMEOUT_SECS: &str = "SKILLBRIDGE_TIMEOUT_SECS";
    pub const MAX_MEMORY_MB: &str = "SKILLBRIDGE_MAX_MEMORY_MB";
    pub const SESSION_TTL_SECS: &str = "SKILLBRIDGE_SESSION_TTL_SECS";
}

/// Agentic loop
pub mod agent_loop {
    pub const MAX_ITERATIONS: &str = "SKILLBRIDGE_MAX_ITERATIONS";
    /// 审批等待超时（秒），0 表示不过期
    pub const APPROVAL_TIMEOUT_SECS: &str = "SKILLBRIDGE_APPROVAL_TIMEOUT_SECS";
    pub const MAX_ERROR_RETRIES: &str = "SKILLBRIDGE_MAX_ERROR_RETRIES";
}

/// 可观测性与日志
pub mod observability {
    pub const QUIET: &str = "SKILLBRIDGE_QUIET";
    pub const LOG_LEVEL: &str = "SKILLBRIDGE_LOG_LEVEL";
    pub const LOG_JSON: &str = "SKILLBRIDGE_LOG_JSON";
    pub const AUDIT_LOG: &str = "SKILLBRIDGE_AUDIT_LOG";
    pub const SECURITY_EVENTS_LOG: &str = "SKILLBRIDGE_SECURITY_EVENTS_LOG";
}

/// 高危操作审批：可配置哪些类别需人工确认
pub mod high_risk {
    /// SKILLBRIDGE_HIGH_RISK_CONFIRM: 逗号分隔，如 "destructive_fs,network,shell"。
    /// "none" 表示全部跳过确认；"all" 等同默认。
    pub const CONFIRM: &str = "SKILLBRIDGE_HIGH_RISK_CONFIRM";
}
