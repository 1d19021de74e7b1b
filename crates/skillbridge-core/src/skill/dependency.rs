//! Runtime dependency checks.
//!
//! A missing dependency never fails a scan: the descriptor is kept and marked
//! unready so callers can surface it as unavailable.

use std::collections::{BTreeSet, HashMap};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use super::descriptor::Readiness;

/// Decides whether one normalised requirement is satisfied by the running environment.
pub trait DependencyProbe: Send + Sync {
    fn is_available(&self, requirement: &str) -> bool;

    /// Drop memoised answers. Called at the start of every scan or reload.
    fn refresh(&self) {}
}

/// Strip version specifiers, extras and trailing comments: `pandas>=2.0  # df` → `pandas`.
pub fn normalize_requirement(raw: &str) -> Option<String> {
    let without_comment = raw.split('#').next().unwrap_or("");
    let cut = without_comment
        .find(|c: char| matches!(c, '=' | '>' | '<' | '~' | '!' | '[' | ';' | ' ' | '\t'))
        .unwrap_or(without_comment.len());
    let name = without_comment[..cut].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Check every requirement; missing ones are reported by their normalised name.
pub fn check_requirements(requirements: &[String], probe: &dyn DependencyProbe) -> Readiness {
    let mut missing = Vec::new();
    let mut seen = BTreeSet::new();
    for raw in requirements {
        let Some(name) = normalize_requirement(raw) else {
            continue;
        };
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        if !probe.is_available(&name) {
            missing.push(name);
        }
    }
    Readiness {
        ready: missing.is_empty(),
        missing_deps: missing,
    }
}

/// Distribution names whose import name differs.
fn import_name(requirement: &str) -> String {
    let lower = requirement.to_lowercase();
    let mapped = match lower.as_str() {
        "beautifulsoup4" | "bs4" => "bs4",
        "pyyaml" => "yaml",
        "scikit-learn" | "sklearn" => "sklearn",
        "pillow" => "PIL",
        "opencv-python" | "opencv-python-headless" => "cv2",
        "python-dateutil" => "dateutil",
        "python-dotenv" => "dotenv",
        "python-docx" => "docx",
        "pymupdf" => "fitz",
        _ => return lower.replace('-', "_"),
    };
    mapped.to_string()
}

/// Probes the real environment: an executable on PATH, or an importable Python module.
///
/// Results are memoised until the next `refresh`.
pub struct EnvironmentProbe {
    python: Option<std::path::PathBuf>,
    cache: Mutex<HashMap<String, bool>>,
}

impl EnvironmentProbe {
    pub fn new() -> Self {
        let python = which::which("python3").or_else(|_| which::which("python")).ok();
        Self {
            python,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn python_can_import(&self, module: &str) -> bool {
        let Some(ref python) = self.python else {
            return false;
        };
        Command::new(python)
            .args([
                "-c",
                "import importlib.util, sys; sys.exit(0 if importlib.util.find_spec(sys.argv[1]) else 1)",
                module,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyProbe for EnvironmentProbe {
    fn is_available(&self, requirement: &str) -> bool {
        let key = requirement.to_lowercase();
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return *hit;
            }
        }
        let available =
            which::which(requirement).is_ok() || self.python_can_import(&import_name(requirement));
        tracing::debug!(requirement = %requirement, available, "dependency probe");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, available);
        }
        available
    }

    fn refresh(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

/// Fixed answer set, for tests and offline catalog builds.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    available: BTreeSet<String>,
}

impl StaticProbe {
    pub fn with_available<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            available: names.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }
}

impl DependencyProbe for StaticProbe {
    fn is_available(&self, requirement: &str) -> bool {
        self.available.contains(&requirement.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_requirement() {
        assert_eq!(normalize_requirement("pandas>=2.0").as_deref(), Some("pandas"));
        assert_eq!(normalize_requirement("requests==2.31  # http").as_deref(), Some("requests"));
        assert_eq!(normalize_requirement("uvicorn[standard]~=0.30").as_deref(), Some("uvicorn"));
        assert_eq!(normalize_requirement("numpy; python_version>'3.8'").as_deref(), Some("numpy"));
        assert_eq!(normalize_requirement("  # only a comment"), None);
    }

    #[test]
    fn test_missing_dependency_is_reported_not_raised() {
        let probe = StaticProbe::with_available(["numpy"]);
        let readiness = check_requirements(
            &["numpy>=1.0".to_string(), "pandas".to_string(), "PANDAS==2".to_string()],
            &probe,
        );
        assert!(!readiness.ready);
        assert_eq!(readiness.missing_deps, vec!["pandas".to_string()]);
    }

    #[test]
    fn test_no_requirements_is_ready() {
        let readiness = check_requirements(&[], &StaticProbe::default());
        assert!(readiness.ready);
        assert!(readiness.missing_deps.is_empty());
    }

    #[test]
    fn test_import_name_aliases() {
        assert_eq!(import_name("PyYAML"), "yaml");
        assert_eq!(import_name("scikit-learn"), "sklearn");
        assert_eq!(import_name("typing-extensions"), "typing_extensions");
    }

    #[test]
    fn test_environment_probe_finds_shell() {
        let probe = EnvironmentProbe::new();
        if which::which("sh").is_ok() {
            assert!(probe.is_available("sh"));
        }
        assert!(!probe.is_available("definitely-not-a-real-dependency-xyz"));
    }
}
