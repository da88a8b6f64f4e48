//! Layered configuration loading.
//!
//! A load resolves its files, then builds the record from four layers, each
//! overriding the one before it:
//! 1. **Current value** - the record being loaded into (`Default` for a fresh load)
//! 2. **Defaults** - declared default literals, for blank fields only
//! 3. **Files** - base file, then its environment variant (`app.production.yml`);
//!    the example variant (`app.example.yml`) stands in when neither exists
//! 4. **Environment** - per-field overrides such as `CONFIGOR_DB_PASSWORD`
//!
//! Required fields are checked last, so a value may come from any layer.
//!
//! ## Reloading
//! [`Reloader`] re-runs a load on demand and publishes changed results through an
//! `ArcSwap`. [`LiveConfig`] drives a reloader from a timer
//! (`Options::auto_reload`) or from file-system events (`Options::watch_files`).
//!
//! ## Environment Variables
//! - `CONFIGOR_ENV` - Environment name (default: `development`, or `test` under `cargo test`)
//! - `CONFIGOR_ENV_PREFIX` - Override-name prefix (default: `Configor`, `-` for none)
//! - `CONFIGOR_DEBUG_MODE` / `CONFIGOR_VERBOSE_MODE` / `CONFIGOR_SILENT_MODE` - Diagnostics

mod defaults;
mod files;
mod loader;
mod merge;
mod options;
mod overrides;
mod reload;
mod watcher;

pub use files::{EXAMPLE_QUALIFIER, FileSet, FileSource, ResolvedFile, candidate_paths, variant_path};
pub use loader::Configor;
pub use merge::{deep_merge, merge_into};
pub use options::Options;
pub use reload::{EventCallback, LiveBuilder, LiveConfig, ReloadCallback, ReloadOutcome, Reloader};
pub use watcher::{ConfigWatcher, FileEvent};
