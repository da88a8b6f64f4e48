//! Error types for configuration loading.

use crate::format::Format;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`Configor`](crate::Configor) and the reload machinery.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target record does not serialize to a map of named fields.
    #[error("invalid config, should be struct (target serializes as {kind})")]
    InvalidTarget { kind: &'static str },

    /// A resolved configuration file could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file was malformed or did not fit the target record.
    #[error("failed to decode {format} configuration {}: {message}", path.display())]
    Decode {
        path: PathBuf,
        format: Format,
        message: String,
    },

    /// Strict mode found keys that match no field of the target record.
    #[error(
        "there are keys in {format} configuration {} that do not match any field: {}",
        path.display(),
        keys.join(", ")
    )]
    UnmatchedKeys {
        path: PathBuf,
        format: Format,
        keys: Vec<String>,
    },

    /// A file without a recognized extension failed every format.
    #[error("failed to decode configuration {}: {}", path.display(), Attempts(attempts))]
    Undetected {
        path: PathBuf,
        attempts: Vec<FormatAttempt>,
    },

    /// A required field is still blank after defaults, files and env overrides.
    #[error("{path} is required, but blank")]
    RequiredBlank { path: String },

    /// A declared default literal could not be decoded.
    #[error("invalid default for {path}: {message}")]
    InvalidDefault { path: String, message: String },

    /// An environment variable held an undecodable literal.
    #[error("failed to decode environment variable {var}: {message}")]
    InvalidEnv { var: String, message: String },

    /// Environment overrides produced values of the wrong type.
    #[error("environment overrides do not fit the configuration: {message}")]
    InvalidOverride { message: String },

    /// Serializing a record failed.
    #[error("failed to encode {format} configuration: {message}")]
    Encode { format: Format, message: String },

    /// A dump target has no recognized extension.
    #[error("no configuration format matches {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Writing a dumped configuration failed.
    #[error("failed to write configuration file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Auto-reload was requested outside a tokio runtime.
    #[error("auto-reload requires a running tokio runtime")]
    NoRuntime,

    /// The file watcher could not be set up.
    #[error("failed to watch configuration files: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    /// Keys reported by strict mode, if this is an unmatched-keys error.
    pub fn unmatched_keys(&self) -> Option<&[String]> {
        match self {
            ConfigError::UnmatchedKeys { keys, .. } => Some(keys),
            _ => None,
        }
    }

    /// Returns true for required-but-blank failures.
    pub fn is_required_blank(&self) -> bool {
        matches!(self, ConfigError::RequiredBlank { .. })
    }
}

/// Why one format was rejected while auto-detecting a file's format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatAttempt {
    pub format: Format,
    pub message: String,
}

struct Attempts<'a>(&'a [FormatAttempt]);

impl fmt::Display for Attempts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", attempt.format, attempt.message)?;
        }
        Ok(())
    }
}

/// Result type for configuration operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
