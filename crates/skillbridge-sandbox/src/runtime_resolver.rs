//! RuntimeResolver trait: extension point for new runtimes (Deno, Lua, etc.)
//!
//! The engine asks the resolver for an interpreter by the bundle's detected
//! language before spawning.

use std::path::PathBuf;

/// Resolved runtime for a given language: interpreter path and optional env vars.
#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    /// Path to the interpreter executable (e.g. python3, node, bash)
    pub interpreter: PathBuf,
    /// Extra environment variables (e.g. NODE_PATH for Node.js)
    pub extra_env: Vec<(String, String)>,
}

/// Extension point for resolving runtime interpreters by language.
pub trait RuntimeResolver: Send + Sync {
    /// Returns `None` if the language is not supported or not installed.
    fn resolve(&self, language: &str) -> Option<ResolvedRuntime>;
}

/// Interpreters found on PATH at startup.
#[derive(Debug, Clone, Default)]
pub struct RuntimePaths {
    pub python: Option<PathBuf>,
    pub node: Option<PathBuf>,
    pub shell: Option<PathBuf>,
    /// Cached `node_modules` directory, if any
    pub node_modules: Option<PathBuf>,
}

impl RuntimePaths {
    pub fn detect() -> Self {
        Self {
            python: which::which("python3").or_else(|_| which::which("python")).ok(),
            node: which::which("node").ok(),
            shell: which::which("bash").or_else(|_| which::which("sh")).ok(),
            node_modules: None,
        }
    }
}

impl RuntimeResolver for RuntimePaths {
    fn resolve(&self, language: &str) -> Option<ResolvedRuntime> {
        match language {
            "python" => self.python.clone().map(|interpreter| ResolvedRuntime {
                interpreter,
                extra_env: vec![
                    ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
                    ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
                ],
            }),
            "bash" => self.shell.clone().map(|interpreter| ResolvedRuntime {
                interpreter,
                extra_env: Vec::new(),
            }),
            "node" => {
                let interpreter = self.node.clone()?;
                let mut extra_env = Vec::new();
                if let Some(ref node_modules) = self.node_modules {
                    extra_env.push((
                        "NODE_PATH".to_string(),
                        node_modules.to_string_lossy().to_string(),
                    ));
                }
                Some(ResolvedRuntime {
                    interpreter,
                    extra_env,
                })
            }
            _ => None,
        }
    }
}
