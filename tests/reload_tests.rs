//! Live configuration tests: timer-driven and watcher-driven reloading.

mod common;

use common::{init_tracing, write};
use configor::{Configor, Configurable, FileEvent, LiveConfig, Options, ReloadOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Server {
    name: String,
    port: u16,
}

impl Configurable for Server {}

fn loader(options: Options) -> Configor {
    init_tracing();
    Configor::with_env_source(options.with_silent(true), HashMap::new())
}

/// Push a file's modification time into the past, so a rewrite is always newer.
fn age(path: &std::path::Path) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(60))
        .unwrap();
}

/// Swap in new content with a rename, so no reader ever sees a half-written file.
fn replace(path: &std::path::Path, content: &str) {
    let staging = path.with_extension("tmp");
    std::fs::write(&staging, content).unwrap();
    std::fs::rename(&staging, path).unwrap();
}

/// Poll `live` until `check` holds or `timeout` passes.
async fn wait_for<T: Configurable>(
    live: &LiveConfig<T>,
    timeout: Duration,
    check: impl Fn(&T) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check(&*live.get()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check(&*live.get())
}

#[test]
fn reloader_tracks_added_environment_file() {
    let temp = TempDir::new().unwrap();
    let base = write(&temp, "app.yml", "name: base\nport: 80\n");
    age(&base);

    let mut reloader = loader(Options::new().with_environment("production"))
        .reloader::<Server, _>(&[&base])
        .unwrap();
    assert_eq!(reloader.files().len(), 1);

    write(&temp, "app.production.yml", "port: 443\n");
    assert!(reloader.reload().is_published());
    assert_eq!(reloader.files().len(), 2);
    assert_eq!(
        *reloader.get(),
        Server {
            name: "base".to_string(),
            port: 443
        }
    );
}

#[test]
fn reloader_keeps_value_after_bad_edit() {
    let temp = TempDir::new().unwrap();
    let base = write(&temp, "app.json", "{\"name\": \"a\", \"port\": 1}");
    age(&base);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut reloader = loader(Options::new())
        .reloader::<Server, _>(&[&base])
        .unwrap()
        .on_reload(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    std::fs::write(&base, "{\"name\": \"b\", \"port\": \"high\"}").unwrap();
    assert!(matches!(reloader.reload(), ReloadOutcome::Failed(_)));
    assert_eq!(reloader.get().name, "a");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    std::fs::write(&base, "{\"name\": \"b\", \"port\": 2}").unwrap();
    assert!(reloader.force_reload().is_published());
    assert_eq!(reloader.get().port, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auto_reload_publishes_file_changes() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "app.yml", "name: first\nport: 1\n");
    age(&path);

    let reloads = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reloads);
    let live = loader(Options::new().with_auto_reload(Duration::from_millis(25)))
        .live::<Server, _>(&[&path])
        .on_reload(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .unwrap();
    assert!(live.is_reloading());
    assert_eq!(live.get().name, "first");

    // Readers holding a snapshot keep it across the swap.
    let snapshot = live.get();
    replace(&path, "name: second\nport: 2\n");

    assert!(wait_for(&live, Duration::from_secs(5), |c| c.name == "second").await);
    assert_eq!(snapshot.name, "first");
    assert_eq!(live.load().port, 2);
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    live.shutdown().await;
}

#[tokio::test]
async fn auto_reload_survives_broken_file() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "app.yml", "name: first\n");
    age(&path);

    let live = loader(Options::new().with_auto_reload(Duration::from_millis(25)))
        .live::<Server, _>(&[&path])
        .start()
        .unwrap();

    replace(&path, "name: [broken\n");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(live.get().name, "first");
    assert!(live.is_reloading());

    replace(&path, "name: fixed\n");
    assert!(wait_for(&live, Duration::from_secs(5), |c| c.name == "fixed").await);

    live.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_mode_reloads_on_write() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "app.yml", "name: first\n");

    let events: Arc<Mutex<Vec<FileEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let live = loader(
        Options::new()
            .with_watch_files(true)
            .with_watch_debounce(Duration::from_millis(50)),
    )
    .live::<Server, _>(&[&path])
    .on_event(move |event| sink.lock().unwrap().push(event.clone()))
    .start()
    .unwrap();

    // Give the watcher a moment to register before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    replace(&path, "name: watched\n");

    assert!(wait_for(&live, Duration::from_secs(10), |c| c.name == "watched").await);
    let seen = events.lock().unwrap().clone();
    assert!(seen.contains(&FileEvent::Written(path.clone())), "events: {seen:?}");

    live.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_mode_picks_up_new_environment_file() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, "app.yml", "name: base\nport: 80\n");

    let live = loader(
        Options::new()
            .with_environment("staging")
            .with_watch_files(true)
            .with_watch_debounce(Duration::from_millis(50)),
    )
    .live::<Server, _>(&[&path])
    .start()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    write(&temp, "app.staging.yml", "port: 8080\n");

    assert!(wait_for(&live, Duration::from_secs(10), |c| c.port == 8080).await);
    assert_eq!(live.get().name, "base");

    live.shutdown().await;
}
