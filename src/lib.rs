//! Configor: layered configuration loading.
//!
//! Loads a serde record from YAML, TOML, JSON or INI files, with
//! per-environment file variants, environment-variable overrides, declared
//! defaults, required fields and optional hot-reload.
//!
//! ```no_run
//! use configor::{Configurable, Field, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Config {
//!     app_name: String,
//!     port: u16,
//! }
//!
//! impl Configurable for Config {
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field(Field::new("app_name").default_value("app"))
//!             .field(Field::new("port").default_value("8080"))
//!     }
//! }
//!
//! let config: Config = configor::load(&["config/app.yml"])?;
//! # Ok::<(), configor::ConfigError>(())
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod format;
pub mod logging;
pub mod schema;

pub use config::{
    Configor, FileEvent, FileSet, LiveBuilder, LiveConfig, Options, ReloadOutcome, Reloader,
};
pub use env::{EnvSource, ProcessEnv};
pub use error::{ConfigError, FormatAttempt, Result};
pub use format::{Format, dump, read_file};
pub use schema::{Configurable, Field, NamePath, Schema, Segment};

use std::path::Path;

/// Load `files` into a fresh record with default [`Options`].
pub fn load<T: Configurable, P: AsRef<Path>>(files: &[P]) -> Result<T> {
    Configor::new(Options::default()).load(files)
}

/// Environment name a default loader would use.
pub fn environment() -> String {
    env::detect_environment(None, &ProcessEnv)
}
