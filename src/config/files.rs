//! Resolution of requested paths into the concrete files to load.
//!
//! Requested paths are visited in reverse order. For each one the base file is
//! taken if it exists, then its environment variant (`app.production.yml`),
//! which is applied after the base file and so wins conflicts. When neither
//! exists the example variant (`app.example.yml`) is used as a fallback.

use crate::format::Format;
use crate::logging::Diagnostics;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Qualifier of the fallback file used when nothing else is found.
pub const EXAMPLE_QUALIFIER: &str = "example";

/// Why a file was included in a [`FileSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    /// The path as requested
    Base,
    /// The environment-qualified variant of a requested path
    Environment,
    /// The example variant, used when neither of the above exists
    Example,
}

impl fmt::Display for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Base => write!(f, "base"),
            FileSource::Environment => write!(f, "environment"),
            FileSource::Example => write!(f, "example"),
        }
    }
}

/// A file that exists on disk and will be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub source: FileSource,
    /// Modification time captured at resolution.
    pub modified: Option<SystemTime>,
}

impl ResolvedFile {
    /// Stat `path`, returning `None` unless it is a regular file.
    pub fn probe(path: PathBuf, source: FileSource) -> Option<Self> {
        let metadata = std::fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            modified: metadata.modified().ok(),
            path,
            source,
        })
    }

    /// Format implied by the extension; `None` means auto-detect.
    pub fn format(&self) -> Option<Format> {
        Format::from_path(&self.path)
    }
}

/// Ordered, deduplicated files for one load, lowest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<ResolvedFile>,
}

impl FileSet {
    /// Resolve `requested` for `environment`.
    ///
    /// Missing files are reported through `diagnostics` and skipped.
    pub fn resolve<P: AsRef<Path>>(
        requested: &[P],
        environment: &str,
        diagnostics: &Diagnostics,
    ) -> Self {
        let mut set = Self::default();
        for path in requested.iter().rev() {
            let path = path.as_ref();
            let mut found = false;

            if let Some(file) = ResolvedFile::probe(path.to_path_buf(), FileSource::Base) {
                found = true;
                set.push(file);
            }

            let env_path = variant_path(path, environment);
            if let Some(file) = ResolvedFile::probe(env_path, FileSource::Environment) {
                found = true;
                set.push(file);
            }

            if found {
                continue;
            }
            let example_path = variant_path(path, EXAMPLE_QUALIFIER);
            match ResolvedFile::probe(example_path, FileSource::Example) {
                Some(file) => {
                    diagnostics.example_fallback(&file.path);
                    set.push(file);
                }
                None => diagnostics.missing_file(path),
            }
        }
        set
    }

    /// Append a file unless the same path is already present.
    pub fn push(&mut self, file: ResolvedFile) {
        if !self.files.iter().any(|f| f.path == file.path) {
            self.files.push(file);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    pub fn get(&self, path: &Path) -> Option<&ResolvedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Whether this set differs from `previous` in a way that calls for a reload:
    /// a different number of files, a file `previous` did not have, or a newer
    /// modification time.
    pub fn changed_since(&self, previous: &FileSet) -> bool {
        if self.len() != previous.len() {
            return true;
        }
        self.files.iter().any(|file| match previous.get(&file.path) {
            None => true,
            Some(old) => match (file.modified, old.modified) {
                (Some(new), Some(old)) => new > old,
                (Some(_), None) => true,
                (None, _) => false,
            },
        })
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a ResolvedFile;
    type IntoIter = std::slice::Iter<'a, ResolvedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Insert `.<qualifier>` before the extension: `app.yml` becomes
/// `app.<qualifier>.yml`, and `app` becomes `app.<qualifier>`.
pub fn variant_path(path: &Path, qualifier: &str) -> PathBuf {
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    let mut file_name = OsString::new();
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            file_name.push(stem);
            file_name.push(".");
            file_name.push(qualifier);
            file_name.push(".");
            file_name.push(ext);
        }
        _ => {
            file_name.push(name);
            file_name.push(".");
            file_name.push(qualifier);
        }
    }
    path.with_file_name(file_name)
}

/// Every path that could take part in a load of `requested`, whether or not it
/// exists yet: base, environment variant and example variant.
pub fn candidate_paths<P: AsRef<Path>>(requested: &[P], environment: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for path in requested {
        let path = path.as_ref();
        for candidate in [
            path.to_path_buf(),
            variant_path(path, environment),
            variant_path(path, EXAMPLE_QUALIFIER),
        ] {
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
    }
    paths
}
