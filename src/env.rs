//! Environment lookup and environment-name resolution.

use std::collections::HashMap;
use std::path::Path;

/// Selects the deployment environment, e.g. `production`.
pub const ENV_VAR: &str = "CONFIGOR_ENV";
/// Overrides the prefix of synthesized override names. `-` disables it.
pub const ENV_PREFIX_VAR: &str = "CONFIGOR_ENV_PREFIX";
pub const DEBUG_MODE_VAR: &str = "CONFIGOR_DEBUG_MODE";
pub const VERBOSE_MODE_VAR: &str = "CONFIGOR_VERBOSE_MODE";
pub const SILENT_MODE_VAR: &str = "CONFIGOR_SILENT_MODE";

pub const DEFAULT_PREFIX: &str = "Configor";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const TEST_ENVIRONMENT: &str = "test";

/// Executable paths produced by `cargo test`: `target/<profile>/deps/<name>-<hash>`.
const TEST_HARNESS_PATTERN: &str = r"[/\\]deps[/\\][^/\\]+-[0-9a-f]{16}(\.exe)?$";

/// Read access to environment variables.
///
/// Loading goes through this trait so tests can supply a scoped map instead of
/// mutating the process environment.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    /// The variable's value, treating empty values as unset.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolve the environment name.
///
/// Order: explicit setting, `CONFIGOR_ENV`, `test` when running under the test
/// harness, then `development`.
pub fn detect_environment(explicit: Option<&str>, env: &dyn EnvSource) -> String {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Some(name) = env.non_empty(ENV_VAR) {
        return name;
    }
    let running_tests = std::env::args_os()
        .next()
        .is_some_and(|arg0| is_test_harness(Path::new(&arg0)));
    if running_tests {
        return TEST_ENVIRONMENT.to_string();
    }
    DEFAULT_ENVIRONMENT.to_string()
}

/// Whether `program` looks like a cargo test binary.
pub fn is_test_harness(program: &Path) -> bool {
    let program = program.to_string_lossy();
    regex_lite::Regex::new(TEST_HARNESS_PATTERN).is_ok_and(|re| re.is_match(&program))
}

/// Resolve the override-name prefix. `None` means names carry no prefix.
pub fn resolve_prefix(explicit: Option<&str>, env: &dyn EnvSource) -> Option<String> {
    let prefix = explicit
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .or_else(|| env.non_empty(ENV_PREFIX_VAR))
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    (prefix != "-").then_some(prefix)
}

/// A mode toggle is on when its variable holds any non-empty value.
pub fn flag(env: &dyn EnvSource, key: &str) -> bool {
    env.non_empty(key).is_some()
}
