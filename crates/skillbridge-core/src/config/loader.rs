//! 统一环境变量加载逻辑
//!
//! 集中维护 fallback 链，避免在业务代码中重复 `or_else` 调用。

use std::env;
use std::str::FromStr;

/// 加载当前目录下的 `.env` 到环境变量（不覆盖已存在的变量）
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = env::current_dir()
            .map(|d| d.join(".env"))
            .unwrap_or_else(|_| std::path::PathBuf::from(".env"));
        let Ok(content) = std::fs::read_to_string(&path) else {
            return;
        };
        for (key, value) in parse_dotenv(&content) {
            if env::var(&key).is_err() {
                set_env_var(&key, &value);
            }
        }
    });
}

/// Parse `KEY=value` lines, stripping quotes and unquoted inline comments.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// 从主变量或别名链读取环境变量，失败时使用默认值
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// 从主变量或别名链读取，返回 Option（空值视为未设置）
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// 解析布尔型环境变量：0/false/no/off 为 false，其余非空值为 true
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    match env_optional(primary, aliases) {
        Some(s) => !matches!(
            s.to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// 解析数值型环境变量；无法解析时记录 warn 并回退到默认值
pub fn env_parse<T>(primary: &str, aliases: &[&str], default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env_optional(primary, aliases) {
        Some(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Invalid value for {}: {:?}, using default {}", primary, raw, default);
                default
            }
        },
        None => default,
    }
}

// ─── 集中式 env::set_var / remove_var 包装 ─────────────────────────────────
//
// SAFETY 约定：调用方需确保在多线程启动前（tokio runtime 创建前）调用。

/// 设置单个环境变量（unsafe 集中在此处）
#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

/// 移除单个环境变量
#[allow(unsafe_code)]
pub fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_strips_quotes_and_comments() {
        let pairs = parse_dotenv(
            "# comment\nA=1\nB = \"two words\"\nC='x' \nD=plain # trailing\n\nnot a pair\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
                ("D".to_string(), "plain".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_helpers_with_aliases() {
        set_env_var("SKILLBRIDGE_TEST_ALIAS_B", "from-alias");
        assert_eq!(
            env_or("SKILLBRIDGE_TEST_ALIAS_A", &["SKILLBRIDGE_TEST_ALIAS_B"], || "d".into()),
            "from-alias"
        );
        assert_eq!(env_optional("SKILLBRIDGE_TEST_ALIAS_MISSING", &[]), None);
        remove_env_var("SKILLBRIDGE_TEST_ALIAS_B");
    }

    #[test]
    fn test_env_bool_and_parse() {
        set_env_var("SKILLBRIDGE_TEST_BOOL", "off");
        assert!(!env_bool("SKILLBRIDGE_TEST_BOOL", &[], true));
        set_env_var("SKILLBRIDGE_TEST_NUM", "not-a-number");
        assert_eq!(env_parse("SKILLBRIDGE_TEST_NUM", &[], 7u64), 7);
        set_env_var("SKILLBRIDGE_TEST_NUM", "42");
        assert_eq!(env_parse("SKILLBRIDGE_TEST_NUM", &[], 7u64), 42);
        remove_env_var("SKILLBRIDGE_TEST_BOOL");
        remove_env_var("SKILLBRIDGE_TEST_NUM");
    }
}
