//! Filesystem watcher with change-origin classification.
//!
//! Watches the vault tree and publishes add/change/delete events for note
//! files. Before surfacing an add or change, the new content's hash is
//! checked against the write queue's expected set: a match means this
//! process produced the file and the event is suppressed. Everything that
//! reaches subscribers is, by construction, external editor activity.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::queue::ExpectedHashes;
use crate::vault::{VaultWalker, content_hash};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to start watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to seed watcher state: {0}")]
    Walk(#[from] crate::vault::VaultWalkerError),
}

/// Kind of an external vault event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultEventKind {
    Added,
    Changed,
    Deleted,
}

/// An external change to a note file, vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEvent {
    pub kind: VaultEventKind,
    pub path: String,
}

/// Watcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct WatcherOptions {
    /// Per-path debounce applied by the OS watcher layer.
    pub debounce: Duration,
    /// Events within this window after start are dropped (initialization
    /// storms).
    pub startup_grace: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            startup_grace: Duration::from_millis(500),
        }
    }
}

/// Vault filesystem watcher handle.
pub struct VaultWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    events: broadcast::Sender<VaultEvent>,
    task: JoinHandle<()>,
}

impl VaultWatcher {
    /// Start watching a vault root. `expected` is the write queue's hash
    /// set used to classify events as internal or external.
    pub fn start(
        root: PathBuf,
        expected: ExpectedHashes,
        opts: WatcherOptions,
    ) -> Result<Self, WatcherError> {
        // Seed the known-path set so pre-existing files report "changed"
        // rather than "added" on their first external edit.
        let known: HashSet<String> = VaultWalker::new(&root)?
            .walk()?
            .into_iter()
            .map(|f| f.relative_path)
            .collect();

        let (tx, rx) = mpsc::channel::<Vec<DebouncedEvent>>(128);
        let mut debouncer = new_debouncer(
            opts.debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    let _ = tx.blocking_send(events);
                }
                Err(e) => tracing::warn!("watcher backend error: {e}"),
            },
        )?;
        debouncer.watcher().watch(&root, notify::RecursiveMode::Recursive)?;

        let (events, _) = broadcast::channel(256);
        let task = tokio::spawn(process_events(
            rx,
            root.clone(),
            expected,
            known,
            Instant::now() + opts.startup_grace,
            events.clone(),
        ));

        tracing::info!("watching vault at {}", root.display());
        Ok(Self { _debouncer: debouncer, events, task })
    }

    /// Subscribe to external events.
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    /// Stop watching and drop all watcher state.
    pub fn close(self) {
        self.task.abort();
    }
}

async fn process_events(
    mut rx: mpsc::Receiver<Vec<DebouncedEvent>>,
    root: PathBuf,
    expected: ExpectedHashes,
    mut known: HashSet<String>,
    quiet_until: Instant,
    events: broadcast::Sender<VaultEvent>,
) {
    while let Some(batch) = rx.recv().await {
        for event in batch {
            if Instant::now() < quiet_until {
                continue;
            }
            if event.kind != DebouncedEventKind::Any {
                // Continuous events settle into a final Any.
                continue;
            }
            let Some(rel) = note_relative_path(&root, &event.path) else {
                continue;
            };

            if event.path.exists() {
                let hash = match content_hash(&event.path) {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!("failed to hash {rel}: {e}");
                        continue;
                    }
                };
                if expected.is_expected(&rel, &hash) {
                    tracing::debug!("suppressing internal event for {rel}");
                    known.insert(rel);
                    continue;
                }
                let kind = if known.insert(rel.clone()) {
                    VaultEventKind::Added
                } else {
                    VaultEventKind::Changed
                };
                let _ = events.send(VaultEvent { kind, path: rel });
            } else if known.remove(&rel) {
                let _ = events.send(VaultEvent { kind: VaultEventKind::Deleted, path: rel });
            }
        }
    }
}

/// Vault-relative path for a note file event; `None` filters the event out.
/// Notes are `<type>/<name>.md` with no hidden or underscore-prefixed
/// components.
fn note_relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = Vec::new();
    for part in rel.components() {
        let s = part.as_os_str().to_str()?;
        if s.starts_with('.') {
            return None;
        }
        components.push(s);
    }
    let [note_type, filename] = components.as_slice() else {
        return None;
    };
    if !filename.ends_with(".md") || filename.starts_with('_') {
        return None;
    }
    Some(format!("{note_type}/{filename}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn fast_opts() -> WatcherOptions {
        WatcherOptions {
            debounce: Duration::from_millis(50),
            startup_grace: Duration::from_millis(100),
        }
    }

    async fn recv_event(
        rx: &mut broadcast::Receiver<VaultEvent>,
    ) -> Option<VaultEvent> {
        timeout(Duration::from_secs(3), rx.recv()).await.ok().and_then(|r| r.ok())
    }

    #[test]
    fn relative_path_filtering() {
        let root = Path::new("/vault");
        assert_eq!(
            note_relative_path(root, Path::new("/vault/general/a.md")),
            Some("general/a.md".to_string())
        );
        assert_eq!(note_relative_path(root, Path::new("/vault/a.md")), None);
        assert_eq!(
            note_relative_path(root, Path::new("/vault/.flint-note/search.db")),
            None
        );
        assert_eq!(
            note_relative_path(root, Path::new("/vault/general/_description.md")),
            None
        );
        assert_eq!(
            note_relative_path(root, Path::new("/vault/general/a.md.tmp")),
            None
        );
        assert_eq!(
            note_relative_path(root, Path::new("/vault/general/deep/a.md")),
            None
        );
    }

    #[tokio::test]
    async fn external_create_and_change_surface() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("general")).unwrap();

        let watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            ExpectedHashes::default(),
            fast_opts(),
        )
        .unwrap();
        let mut rx = watcher.subscribe();
        tokio::time::sleep(Duration::from_millis(150)).await;

        fs::write(dir.path().join("general/new.md"), "external body").unwrap();
        let event = recv_event(&mut rx).await.expect("expected an event");
        assert_eq!(event.kind, VaultEventKind::Added);
        assert_eq!(event.path, "general/new.md");

        fs::write(dir.path().join("general/new.md"), "edited body").unwrap();
        let event = recv_event(&mut rx).await.expect("expected an event");
        assert_eq!(event.kind, VaultEventKind::Changed);

        watcher.close();
    }

    #[tokio::test]
    async fn expected_hash_suppresses_internal_event() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("general")).unwrap();

        let expected = ExpectedHashes::default();
        let watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            expected.clone(),
            fast_opts(),
        )
        .unwrap();
        let mut rx = watcher.subscribe();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let body = "internally written";
        expected.insert(
            "general/own.md",
            &crate::vault::content_hash_str(body),
            Instant::now() + Duration::from_secs(5),
        );
        fs::write(dir.path().join("general/own.md"), body).unwrap();

        // No event may surface for the suppressed write.
        let got = timeout(Duration::from_millis(800), rx.recv()).await;
        assert!(got.is_err(), "internal write must not surface: {got:?}");

        watcher.close();
    }

    #[tokio::test]
    async fn delete_surfaces_for_known_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("general")).unwrap();
        fs::write(dir.path().join("general/gone.md"), "soon gone").unwrap();

        let watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            ExpectedHashes::default(),
            fast_opts(),
        )
        .unwrap();
        let mut rx = watcher.subscribe();
        tokio::time::sleep(Duration::from_millis(150)).await;

        fs::remove_file(dir.path().join("general/gone.md")).unwrap();
        let event = recv_event(&mut rx).await.expect("expected an event");
        assert_eq!(event.kind, VaultEventKind::Deleted);
        assert_eq!(event.path, "general/gone.md");

        watcher.close();
    }
}
