//! Reloading a loaded configuration while it is in use.
//!
//! The published value lives behind an [`ArcSwap`]: readers take a snapshot
//! without locking, and a reload cycle swaps in a fully built replacement in a
//! single store. A failed cycle leaves the published value untouched.

use super::files::{FileSet, candidate_paths};
use super::loader::Configor;
use super::watcher::{ConfigWatcher, FileEvent};
use crate::error::{ConfigError, Result};
use crate::schema::Configurable;
use arc_swap::{ArcSwap, Guard};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Called with the new value after each successful publish.
pub type ReloadCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
/// Called with every file-system event seen by the watcher.
pub type EventCallback = Arc<dyn Fn(&FileEvent) + Send + Sync>;

/// Result of one reload cycle.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// A new value was published and the callback invoked.
    Published,
    /// Nothing changed on disk, or the reloaded value equals the published one.
    Unchanged,
    /// The cycle failed; the previous value stays published.
    Failed(ConfigError),
}

impl ReloadOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, ReloadOutcome::Published)
    }
}

/// Re-runs the pipeline for one set of requested files and publishes results.
pub struct Reloader<T: Configurable> {
    configor: Configor,
    requested: Vec<PathBuf>,
    files: FileSet,
    shared: Arc<ArcSwap<T>>,
    on_reload: Option<ReloadCallback<T>>,
}

impl<T: Configurable> Reloader<T> {
    pub(crate) fn new(configor: Configor, requested: Vec<PathBuf>, files: FileSet, config: T) -> Self {
        Self {
            configor,
            requested,
            files,
            shared: Arc::new(ArcSwap::from_pointee(config)),
            on_reload: None,
        }
    }

    pub fn on_reload(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Arc::new(callback));
        self
    }

    fn set_callback(&mut self, callback: Option<ReloadCallback<T>>) {
        self.on_reload = callback;
    }

    /// Current published value.
    pub fn get(&self) -> Arc<T> {
        self.shared.load_full()
    }

    /// Handle to the published value, shared with any readers.
    pub fn shared(&self) -> Arc<ArcSwap<T>> {
        Arc::clone(&self.shared)
    }

    /// Files of the last successful load.
    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn requested(&self) -> &[PathBuf] {
        &self.requested
    }

    /// Timer tick: reload only if the resolved files differ from the last
    /// successful load (file added or removed, or a newer modification time).
    pub fn reload(&mut self) -> ReloadOutcome {
        let files = self.resolve();
        if !files.changed_since(&self.files) {
            return ReloadOutcome::Unchanged;
        }
        self.cycle(files)
    }

    /// Reload regardless of modification times, e.g. after a file-system event.
    pub fn force_reload(&mut self) -> ReloadOutcome {
        let files = self.resolve();
        self.cycle(files)
    }

    fn resolve(&self) -> FileSet {
        let quiet = self.configor.diagnostics().quiet();
        FileSet::resolve(&self.requested, self.configor.environment(), &quiet)
    }

    fn cycle(&mut self, files: FileSet) -> ReloadOutcome {
        let current = self.shared.load_full();
        let quiet = self.configor.diagnostics().quiet();
        let next = match self.configor.load_files(current.as_ref(), &files, &quiet) {
            Ok(next) => next,
            Err(err) => {
                warn!(target: "configor", error = %err, "Failed to reload configuration, keeping previous value");
                return ReloadOutcome::Failed(err);
            }
        };
        self.files = files;

        if same_value(&next, current.as_ref()) {
            debug!(target: "configor", "Configuration files changed but the loaded value did not");
            return ReloadOutcome::Unchanged;
        }

        let next = Arc::new(next);
        self.shared.store(Arc::clone(&next));
        info!(target: "configor", files = self.files.len(), "Configuration reloaded");
        if let Some(callback) = &self.on_reload {
            callback(&next);
        }
        ReloadOutcome::Published
    }
}

fn same_value<T: Configurable>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Configures and starts a [`LiveConfig`].
pub struct LiveBuilder<T: Configurable> {
    configor: Configor,
    requested: Vec<PathBuf>,
    on_reload: Option<ReloadCallback<T>>,
    on_event: Option<EventCallback>,
}

impl<T: Configurable> LiveBuilder<T> {
    pub(crate) fn new(configor: Configor, requested: Vec<PathBuf>) -> Self {
        Self {
            configor,
            requested,
            on_reload: None,
            on_event: None,
        }
    }

    /// Called after every reload that published a new value.
    pub fn on_reload(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Arc::new(callback));
        self
    }

    /// Called for every file-system event when watching files.
    pub fn on_event(mut self, callback: impl Fn(&FileEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Load once, then start background reloading if the options ask for it.
    ///
    /// Background reloading needs a tokio runtime; without one this fails with
    /// [`ConfigError::NoRuntime`].
    pub fn start(self) -> Result<LiveConfig<T>> {
        let mut reloader: Reloader<T> = self.configor.reloader(&self.requested)?;
        reloader.set_callback(self.on_reload);
        let shared = reloader.shared();

        let options = self.configor.options().clone();
        if !options.reloads() {
            return Ok(LiveConfig {
                shared,
                stop: None,
                task: None,
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (events, watcher) = if options.watch_files {
            let (tx, rx) = mpsc::channel(64);
            let paths = candidate_paths(&self.requested, self.configor.environment());
            let watcher = ConfigWatcher::start(&runtime, paths, options.watch_debounce, tx)?;
            (Some(rx), Some(watcher))
        } else {
            (None, None)
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let interval = options
            .auto_reload
            .then(|| options.auto_reload_interval.max(Duration::from_millis(1)));
        let coordinator = Coordinator {
            reloader: Some(reloader),
            interval,
            events,
            on_event: self.on_event,
            stop: stop_rx,
            _watcher: watcher,
        };
        let task = runtime.spawn(coordinator.run());

        Ok(LiveConfig {
            shared,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }
}

/// A loaded configuration, kept current by a background task.
///
/// Dropping the handle stops the task; [`LiveConfig::shutdown`] does so and
/// waits for it to finish.
pub struct LiveConfig<T: Configurable> {
    shared: Arc<ArcSwap<T>>,
    stop: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Configurable> LiveConfig<T> {
    /// Snapshot of the current value.
    pub fn get(&self) -> Arc<T> {
        self.shared.load_full()
    }

    /// Cheap short-lived read access.
    pub fn load(&self) -> Guard<Arc<T>> {
        self.shared.load()
    }

    pub fn shared(&self) -> Arc<ArcSwap<T>> {
        Arc::clone(&self.shared)
    }

    /// Whether a background task is reloading this configuration.
    pub fn is_reloading(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop background reloading and wait for the task to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T: Configurable> Drop for LiveConfig<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Background loop driving a [`Reloader`] from timer ticks and file events.
///
/// Each cycle reads and decodes files, so it runs on the blocking pool; the
/// reloader is moved there and handed back when the cycle ends.
struct Coordinator<T: Configurable> {
    reloader: Option<Reloader<T>>,
    interval: Option<Duration>,
    events: Option<mpsc::Receiver<FileEvent>>,
    on_event: Option<EventCallback>,
    stop: watch::Receiver<bool>,
    _watcher: Option<ConfigWatcher>,
}

impl<T: Configurable> Coordinator<T> {
    async fn run(mut self) {
        let period = self.interval.unwrap_or(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ticking = self.interval.is_some();
        let mut events_open = self.events.is_some();

        debug!(target: "configor", ticking, watching = events_open, "Configuration reload task started");
        loop {
            tokio::select! {
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick(), if ticking => {
                    self.cycle(false).await;
                }
                event = next_event(&mut self.events), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => events_open = false,
                },
            }
            if self.reloader.is_none() {
                break;
            }
        }
        debug!(target: "configor", "Configuration reload task stopped");
    }

    async fn handle_event(&mut self, event: FileEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
        if event.requires_reload() {
            self.cycle(true).await;
        }
    }

    async fn cycle(&mut self, force: bool) {
        let Some(mut reloader) = self.reloader.take() else {
            return;
        };
        let joined = tokio::task::spawn_blocking(move || {
            if force {
                reloader.force_reload();
            } else {
                reloader.reload();
            }
            reloader
        })
        .await;
        match joined {
            Ok(reloader) => self.reloader = Some(reloader),
            Err(err) => error!(target: "configor", error = %err, "Reload cycle panicked, stopping reloads"),
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<FileEvent>>) -> Option<FileEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => None,
    }
}
