//! File watcher for configuration files.
//!
//! Watches the parent directory of every candidate file (base, environment
//! variant and example variant) and reports changes to exactly those files.
//! Files are matched by location and by resolved symlink target, so both
//! rename-based saves and symlink swaps are noticed. Uses debouncing to
//! coalesce rapid file changes.

use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often the event loop checks whether its consumer went away.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Change to a watched configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// The file was written or created
    Written(PathBuf),
    /// The file is a symlink that now points somewhere else
    Retargeted { path: PathBuf, target: PathBuf },
    /// The file was removed and is no longer watched
    Removed(PathBuf),
    /// Watcher encountered an error
    Error(String),
}

impl FileEvent {
    /// Returns true if this event requires a config reload.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, FileEvent::Error(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            FileEvent::Written(path)
            | FileEvent::Retargeted { path, .. }
            | FileEvent::Removed(path) => Some(path),
            FileEvent::Error(_) => None,
        }
    }
}

/// Running watcher. Stops once the event receiver is dropped.
#[derive(Debug)]
pub struct ConfigWatcher {
    _task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching `files`, sending classified events to `events`.
    ///
    /// Files whose directory does not exist are skipped.
    pub fn start(
        runtime: &Handle,
        files: Vec<PathBuf>,
        debounce: Duration,
        events: mpsc::Sender<FileEvent>,
    ) -> Result<Self, notify::Error> {
        let (notify_tx, notify_rx) = std_mpsc::channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(debounce, notify_tx)?;

        let mut state = WatchState::new(files);
        let watcher = debouncer.watcher();
        for dir in state.directories() {
            if dir.is_dir() {
                info!(target: "configor", "Watching configuration directory: {}", dir.display());
                watcher.watch(&dir, notify::RecursiveMode::NonRecursive)?;
            } else {
                warn!(
                    target: "configor",
                    "Configuration directory does not exist, skipping watch: {}",
                    dir.display()
                );
            }
        }

        let task = runtime.spawn_blocking(move || {
            loop {
                if events.is_closed() {
                    debug!(target: "configor", "Config watcher receiver dropped, stopping");
                    return;
                }
                match notify_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Ok(batch)) => {
                        let paths = batch
                            .into_iter()
                            .filter(|e| {
                                matches!(
                                    e.kind,
                                    DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                                )
                            })
                            .map(|e| e.path);
                        let before = state.directories();
                        for event in state.classify(paths) {
                            debug!(target: "configor", ?event, "Config change detected");
                            if events.blocking_send(event).is_err() {
                                return;
                            }
                        }
                        for dir in before {
                            if !state.directories().contains(&dir) {
                                let _ = debouncer.watcher().unwatch(&dir);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        error!(target: "configor", "File watcher error: {e}");
                        if events.blocking_send(FileEvent::Error(e.to_string())).is_err() {
                            return;
                        }
                    }
                    Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                        info!(target: "configor", "Config watcher channel closed, stopping");
                        return;
                    }
                }
            }
        });

        Ok(Self { _task: task })
    }
}

/// A file being watched.
#[derive(Debug, Clone)]
struct WatchedFile {
    path: PathBuf,
    /// Location with the directory canonicalized, symlinks in the file name kept.
    location: PathBuf,
    /// Fully resolved path, if the file exists.
    target: Option<PathBuf>,
}

impl WatchedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            location: normalize(&path),
            target: std::fs::canonicalize(&path).ok(),
            path,
        }
    }

    fn directory(&self) -> PathBuf {
        match self.location.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Default)]
struct WatchState {
    files: Vec<WatchedFile>,
}

impl WatchState {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            files: paths.into_iter().map(WatchedFile::new).collect(),
        }
    }

    /// Distinct directories that still hold watched files.
    fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for file in &self.files {
            let dir = file.directory();
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Turn changed paths into events for the watched files they concern.
    ///
    /// Every watched symlink is also re-resolved, since swapping what a link
    /// points at may only touch files elsewhere in the directory.
    fn classify(&mut self, changed: impl IntoIterator<Item = PathBuf>) -> Vec<FileEvent> {
        let changed: Vec<PathBuf> = changed.into_iter().map(|p| normalize(&p)).collect();
        let mut events = Vec::new();
        let mut removed = Vec::new();

        for (idx, file) in self.files.iter_mut().enumerate() {
            let touched = changed
                .iter()
                .any(|p| *p == file.location || file.target.as_ref() == Some(p));
            let is_link = std::fs::symlink_metadata(&file.path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if !touched && !is_link {
                continue;
            }

            let current = std::fs::canonicalize(&file.path).ok();
            match current {
                None if touched => {
                    events.push(FileEvent::Removed(file.path.clone()));
                    removed.push(idx);
                }
                None => {}
                Some(target)
                    if is_link && file.target.as_ref().is_some_and(|old| *old != target) =>
                {
                    file.target = Some(target.clone());
                    events.push(FileEvent::Retargeted {
                        path: file.path.clone(),
                        target,
                    });
                }
                Some(target) => {
                    file.target = Some(target);
                    if touched {
                        events.push(FileEvent::Written(file.path.clone()));
                    }
                }
            }
        }

        for idx in removed.into_iter().rev() {
            let file = self.files.remove(idx);
            debug!(target: "configor", "Stopped watching {}", file.path.display());
        }
        events
    }
}

/// Canonicalize the directory part of `path`, keeping the file name as is.
fn normalize(path: &Path) -> PathBuf {
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match std::fs::canonicalize(dir) {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}
