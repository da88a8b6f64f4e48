//! The layered loading pipeline.
//!
//! One load runs, in order:
//! 1. **Seed** - the target's current value as a tree
//! 2. **Defaults** - declared defaults into blank fields
//! 3. **Files** - each resolved file laid over the tree, lowest priority first
//! 4. **Environment** - variable overrides, then required-field checks
//!
//! Files are type-checked against the target as they are applied, so a file
//! that does not fit is reported by path.

use super::defaults::apply_defaults;
use super::files::FileSet;
use super::merge::deep_merge;
use super::options::Options;
use super::overrides::{EnvContext, apply_env};
use super::reload::{LiveBuilder, Reloader};
use crate::env::{
    DEBUG_MODE_VAR, EnvSource, ProcessEnv, SILENT_MODE_VAR, VERBOSE_MODE_VAR, detect_environment,
    flag, resolve_prefix,
};
use crate::error::{ConfigError, FormatAttempt, Result};
use crate::format::Format;
use crate::logging::Diagnostics;
use crate::schema::{Configurable, NamePath, Schema, zero_value};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads configuration records from files and environment variables.
///
/// Environment name, override prefix and diagnostic flags are resolved once,
/// when the loader is built.
#[derive(Clone)]
pub struct Configor {
    options: Options,
    environment: String,
    prefix: Option<String>,
    diagnostics: Diagnostics,
    env: Arc<dyn EnvSource>,
}

impl fmt::Debug for Configor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configor")
            .field("options", &self.options)
            .field("environment", &self.environment)
            .field("prefix", &self.prefix)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl Default for Configor {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// Why one file layer could not be applied.
enum LayerFailure {
    Unmatched(Vec<String>),
    Invalid(String),
}

impl Configor {
    /// Build a loader reading overrides from the process environment.
    pub fn new(options: Options) -> Self {
        Self::with_env_source(options, ProcessEnv)
    }

    /// Build a loader reading overrides and `CONFIGOR_*` settings from `env`.
    pub fn with_env_source(options: Options, env: impl EnvSource + 'static) -> Self {
        let env: Arc<dyn EnvSource> = Arc::new(env);
        let diagnostics = Diagnostics::new(
            options.debug || flag(env.as_ref(), DEBUG_MODE_VAR),
            options.verbose || flag(env.as_ref(), VERBOSE_MODE_VAR),
            options.silent || flag(env.as_ref(), SILENT_MODE_VAR),
        );
        let environment = detect_environment(options.environment.as_deref(), env.as_ref());
        let prefix = resolve_prefix(options.env_prefix.as_deref(), env.as_ref());
        Self {
            options,
            environment,
            prefix,
            diagnostics,
            env,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Prefix of synthesized override names, `None` when disabled.
    pub fn env_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Files a load of `files` would read, in application order.
    pub fn resolve_files<P: AsRef<Path>>(&self, files: &[P]) -> FileSet {
        FileSet::resolve(files, &self.environment, &self.diagnostics)
    }

    /// Load a fresh record from `files`.
    pub fn load<T: Configurable, P: AsRef<Path>>(&self, files: &[P]) -> Result<T> {
        let mut config = T::default();
        self.load_into(&mut config, files)?;
        Ok(config)
    }

    /// Load into an existing record. Its current values seed the load, so only
    /// blank fields receive defaults. On error `config` is left untouched.
    pub fn load_into<T: Configurable, P: AsRef<Path>>(
        &self,
        config: &mut T,
        files: &[P],
    ) -> Result<()> {
        self.diagnostics
            .environment(&self.environment, self.prefix.as_deref());
        let set = self.resolve_files(files);
        *config = self.load_files(config, &set, &self.diagnostics)?;
        Ok(())
    }

    /// A reloader holding the result of an initial load of `files`.
    pub fn reloader<T: Configurable, P: AsRef<Path>>(&self, files: &[P]) -> Result<Reloader<T>> {
        self.diagnostics
            .environment(&self.environment, self.prefix.as_deref());
        let requested: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let set = self.resolve_files(&requested);
        let config = self.load_files(&T::default(), &set, &self.diagnostics)?;
        Ok(Reloader::new(self.clone(), requested, set, config))
    }

    /// Builder for a live, optionally self-reloading, configuration handle.
    pub fn live<T: Configurable, P: AsRef<Path>>(&self, files: &[P]) -> LiveBuilder<T> {
        let requested = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        LiveBuilder::new(self.clone(), requested)
    }

    /// Run the pipeline over an already resolved file set, seeded with `current`.
    pub(crate) fn load_files<T: Configurable>(
        &self,
        current: &T,
        files: &FileSet,
        diagnostics: &Diagnostics,
    ) -> Result<T> {
        let result = self.run_pipeline(current, files, diagnostics);
        match &result {
            Ok(config) => diagnostics.dump(config),
            Err(err) => diagnostics.load_failed(err),
        }
        result
    }

    fn run_pipeline<T: Configurable>(
        &self,
        current: &T,
        files: &FileSet,
        diagnostics: &Diagnostics,
    ) -> Result<T> {
        let zero_tree = zero_value::<T>();
        let Value::Object(zero) = &zero_tree else {
            return Err(ConfigError::InvalidTarget {
                kind: kind_of(&zero_tree),
            });
        };
        let mut tree = serde_json::to_value(current).map_err(|_| ConfigError::InvalidTarget {
            kind: "an unserializable value",
        })?;
        if !tree.is_object() {
            return Err(ConfigError::InvalidTarget {
                kind: kind_of(&tree),
            });
        }

        let schema = Schema::of::<T>(&zero_tree);
        let hint = schema.format_hint(zero);
        let root = NamePath::root();

        let applied = apply_defaults(&mut tree, &schema, zero, &root)?;
        if !applied.is_empty() {
            tree = canonicalize::<T>(tree).map_err(|message| ConfigError::InvalidDefault {
                path: applied.join(", "),
                message,
            })?;
        }

        for file in files {
            diagnostics.loading_file(&file.path);
            let bytes = std::fs::read(&file.path).map_err(|source| ConfigError::Read {
                path: file.path.clone(),
                source,
            })?;
            tree = match file.format() {
                Some(format) => self
                    .apply_layer::<T>(format, &bytes, &hint, &schema, zero, &tree)
                    .map_err(|failure| layer_error(&file.path, format, failure))?,
                None => self.detect_layer::<T>(&file.path, &bytes, &hint, &schema, zero, &tree)?,
            };
        }

        let ctx = EnvContext {
            env: self.env.as_ref(),
            prefix: self.prefix.as_deref(),
            separator: &self.options.env_separator,
            diagnostics,
        };
        apply_env(&mut tree, &schema, zero, &root, &ctx, true)?;

        serde_json::from_value(tree).map_err(|e| ConfigError::InvalidOverride {
            message: e.to_string(),
        })
    }

    /// Decode one file and lay it over `tree`.
    fn apply_layer<T: Configurable>(
        &self,
        format: Format,
        bytes: &[u8],
        hint: &Value,
        schema: &Schema,
        zero: &Map<String, Value>,
        tree: &Value,
    ) -> Result<Value, LayerFailure> {
        let layer = format.decode(bytes, hint).map_err(LayerFailure::Invalid)?;
        if !matches!(layer, Value::Object(_) | Value::Null) {
            return Err(LayerFailure::Invalid(format!(
                "expected a map at the top level, found {}",
                kind_of(&layer)
            )));
        }
        if self.options.error_on_unmatched_keys && format.supports_strict() {
            let keys = schema.unmatched_keys(zero, &layer);
            if !keys.is_empty() {
                return Err(LayerFailure::Unmatched(keys));
            }
        }
        canonicalize::<T>(deep_merge(tree.clone(), layer)).map_err(LayerFailure::Invalid)
    }

    /// Try each auto-detect format in turn. Unmatched keys end the search
    /// immediately; any other failure moves on to the next format.
    fn detect_layer<T: Configurable>(
        &self,
        path: &Path,
        bytes: &[u8],
        hint: &Value,
        schema: &Schema,
        zero: &Map<String, Value>,
        tree: &Value,
    ) -> Result<Value> {
        let mut attempts = Vec::new();
        for format in Format::AUTO_DETECT_ORDER {
            match self.apply_layer::<T>(format, bytes, hint, schema, zero, tree) {
                Ok(merged) => return Ok(merged),
                Err(LayerFailure::Unmatched(keys)) => {
                    return Err(ConfigError::UnmatchedKeys {
                        path: path.to_path_buf(),
                        format,
                        keys,
                    });
                }
                Err(LayerFailure::Invalid(message)) => {
                    attempts.push(FormatAttempt { format, message });
                }
            }
        }
        Err(ConfigError::Undetected {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

fn layer_error(path: &Path, format: Format, failure: LayerFailure) -> ConfigError {
    match failure {
        LayerFailure::Unmatched(keys) => ConfigError::UnmatchedKeys {
            path: path.to_path_buf(),
            format,
            keys,
        },
        LayerFailure::Invalid(message) => ConfigError::Decode {
            path: path.to_path_buf(),
            format,
            message,
        },
    }
}

/// Pass a tree through `T` and back, so it holds exactly what `T` keeps.
fn canonicalize<T: Configurable>(tree: Value) -> Result<Value, String> {
    let typed: T = serde_json::from_value(tree).map_err(|e| e.to_string())?;
    serde_json::to_value(&typed).map_err(|e| e.to_string())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}
