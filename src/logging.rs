//! Gated diagnostics for configuration loading.
//!
//! Output goes through `tracing` with target `configor`; installing a
//! subscriber is left to the application. The debug, verbose and silent flags
//! decide which messages are emitted at all:
//! - debug or verbose: environment, loaded files, env hits, final dump, failures
//! - verbose only: every candidate variable name probed
//! - not silent: missing-file and example-fallback warnings

use serde::Serialize;
use std::path::Path;

pub const TARGET: &str = "configor";

/// Which diagnostic messages are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub debug: bool,
    pub verbose: bool,
    pub silent: bool,
}

impl Diagnostics {
    pub fn new(debug: bool, verbose: bool, silent: bool) -> Self {
        Self {
            debug,
            verbose,
            silent,
        }
    }

    /// Debug or verbose output is enabled.
    pub fn detailed(&self) -> bool {
        self.debug || self.verbose
    }

    pub fn environment(&self, environment: &str, prefix: Option<&str>) {
        if self.detailed() {
            tracing::info!(
                target: TARGET,
                environment,
                prefix = prefix.unwrap_or("-"),
                "Current environment: {environment}"
            );
        }
    }

    pub fn loading_file(&self, path: &Path) {
        if self.detailed() {
            tracing::info!(target: TARGET, "Loading configuration from {}", path.display());
        }
    }

    pub fn missing_file(&self, path: &Path) {
        if !self.silent {
            tracing::warn!(target: TARGET, "Failed to find configuration {}", path.display());
        }
    }

    pub fn example_fallback(&self, path: &Path) {
        if !self.silent {
            tracing::warn!(
                target: TARGET,
                "Failed to find configuration file, using example file {}",
                path.display()
            );
        }
    }

    pub fn probing_env(&self, names: &[String]) {
        if self.verbose {
            tracing::debug!(target: TARGET, "Trying to load from env: {}", names.join(", "));
        }
    }

    pub fn env_hit(&self, var: &str, path: &str) {
        if self.detailed() {
            tracing::info!(target: TARGET, var, field = path, "Loading configuration for {path} from env {var}");
        }
    }

    /// Pretty-printed dump of the final configuration.
    pub fn dump<T: Serialize>(&self, config: &T) {
        if !self.detailed() {
            return;
        }
        match serde_json::to_string_pretty(config) {
            Ok(json) => tracing::info!(target: TARGET, "Configuration:\n{json}"),
            Err(e) => tracing::debug!(target: TARGET, error = %e, "Failed to render configuration"),
        }
    }

    pub fn load_failed(&self, error: &dyn std::error::Error) {
        if self.detailed() {
            tracing::error!(target: TARGET, "Failed to load configuration: {error}");
        }
    }

    /// Same flags, but without file-discovery warnings. Used for reload ticks,
    /// which would otherwise repeat them every interval.
    pub fn quiet(self) -> Self {
        Self {
            silent: true,
            ..self
        }
    }
}
