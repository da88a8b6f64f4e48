//! Caller-facing settings for a [`Configor`](super::Configor).

use std::time::Duration;

/// Loader settings. Unset fields fall back to `CONFIGOR_*` variables and then
/// to built-in defaults when the loader is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Environment name; `None` reads `CONFIGOR_ENV` and falls back to
    /// `test` or `development`.
    pub environment: Option<String>,
    /// Prefix for synthesized override names; `None` reads
    /// `CONFIGOR_ENV_PREFIX` and falls back to `Configor`. `-` disables it.
    pub env_prefix: Option<String>,
    /// Joins name-path segments into override names.
    pub env_separator: String,
    pub debug: bool,
    pub verbose: bool,
    pub silent: bool,
    /// Fail when a file contains keys that match no field.
    pub error_on_unmatched_keys: bool,
    /// Poll resolved files for newer modification times.
    pub auto_reload: bool,
    pub auto_reload_interval: Duration,
    /// Reload on file-system events instead of waiting for the next poll.
    pub watch_files: bool,
    pub watch_debounce: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            environment: None,
            env_prefix: None,
            env_separator: "_".to_string(),
            debug: false,
            verbose: false,
            silent: false,
            error_on_unmatched_keys: false,
            auto_reload: false,
            auto_reload_interval: Duration::from_secs(1),
            watch_files: false,
            watch_debounce: Duration::from_millis(500),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn with_env_separator(mut self, separator: impl Into<String>) -> Self {
        self.env_separator = separator.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_error_on_unmatched_keys(mut self, strict: bool) -> Self {
        self.error_on_unmatched_keys = strict;
        self
    }

    /// Enable polling; a zero interval keeps the current one.
    pub fn with_auto_reload(mut self, interval: Duration) -> Self {
        self.auto_reload = true;
        if !interval.is_zero() {
            self.auto_reload_interval = interval;
        }
        self
    }

    pub fn with_watch_files(mut self, watch: bool) -> Self {
        self.watch_files = watch;
        self
    }

    pub fn with_watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = debounce;
        self
    }

    /// Whether any background reload mode is enabled.
    pub fn reloads(&self) -> bool {
        self.auto_reload || self.watch_files
    }
}
