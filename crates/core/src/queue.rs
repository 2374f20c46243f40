//! Debounced, coalescing file-write queue.
//!
//! Every internal write goes through this queue. Rapid writes to the same
//! path collapse into one disk write (the most recently queued content
//! wins), and every queued content's hash is deposited in the shared
//! [`ExpectedHashes`] set *before* anything touches disk. The watcher
//! consults that set to tell the process's own writes apart from external
//! editor activity.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::vault::content_hash_str;

/// Tuning knobs for the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// Debounce delay before a queued write reaches disk.
    pub delay: Duration,
    /// How long a hash stays expected after its write completes, covering
    /// filesystem notification latency.
    pub write_ttl: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { delay: Duration::from_millis(1000), write_ttl: Duration::from_millis(1000) }
    }
}

/// Retry backoff schedule for failed writes.
const RETRY_BACKOFF_MS: [u64; 3] = [100, 500, 1000];

/// Shared set of content hashes this process expects to see on disk,
/// per vault-relative path. Entries expire; lookups purge lazily.
#[derive(Debug, Clone, Default)]
pub struct ExpectedHashes {
    inner: Arc<Mutex<HashMap<String, HashMap<String, Instant>>>>,
}

impl ExpectedHashes {
    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Instant>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a hash as expected until the given deadline (extends an
    /// existing entry when later).
    pub fn insert(&self, path: &str, hash: &str, until: Instant) {
        let mut map = self.lock();
        let entry = map.entry(path.to_string()).or_default();
        match entry.get_mut(hash) {
            Some(deadline) if *deadline >= until => {}
            _ => {
                entry.insert(hash.to_string(), until);
            }
        }
    }

    /// Whether the hash is currently expected for the path.
    pub fn is_expected(&self, path: &str, hash: &str) -> bool {
        let now = Instant::now();
        let mut map = self.lock();
        let Some(entry) = map.get_mut(path) else { return false };
        entry.retain(|_, deadline| *deadline > now);
        let hit = entry.contains_key(hash);
        if entry.is_empty() {
            map.remove(path);
        }
        hit
    }

    /// Number of live expected hashes for a path.
    pub fn count_for(&self, path: &str) -> usize {
        let now = Instant::now();
        let mut map = self.lock();
        let Some(entry) = map.get_mut(path) else { return 0 };
        entry.retain(|_, deadline| *deadline > now);
        entry.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

struct PendingWrite {
    content: String,
    generation: u64,
    timer: JoinHandle<()>,
}

struct QueueInner {
    root: PathBuf,
    opts: QueueOptions,
    pending: Mutex<HashMap<String, PendingWrite>>,
    expected: ExpectedHashes,
    generation: Mutex<u64>,
}

/// Observability snapshot of the queue.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub pending_paths: Vec<String>,
    /// Live expected-hash counts per pending path.
    pub expected_counts: HashMap<String, usize>,
}

/// Per-vault write queue handle (cheap to clone).
#[derive(Clone)]
pub struct FileWriteQueue {
    inner: Arc<QueueInner>,
}

impl FileWriteQueue {
    pub fn new(root: PathBuf, opts: QueueOptions) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                root,
                opts,
                pending: Mutex::new(HashMap::new()),
                expected: ExpectedHashes::default(),
                generation: Mutex::new(0),
            }),
        }
    }

    /// The expected-hash set, shared with the watcher.
    pub fn expected_hashes(&self) -> ExpectedHashes {
        self.inner.expected.clone()
    }

    /// Queue content for a vault-relative path with the default delay.
    /// Replaces any still-pending content for that path and re-arms its
    /// timer.
    pub fn queue_write(&self, path: &str, content: String) {
        self.queue_write_delayed(path, content, self.inner.opts.delay);
    }

    /// Queue content with an explicit delay.
    pub fn queue_write_delayed(&self, path: &str, content: String, delay: Duration) {
        let inner = &self.inner;
        let hash = content_hash_str(&content);
        // The hash must be expected before the write can possibly land.
        inner
            .expected
            .insert(path, &hash, Instant::now() + delay + inner.opts.write_ttl);

        let generation = {
            let mut counter = inner.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *counter += 1;
            *counter
        };

        let timer = {
            let inner = Arc::clone(&self.inner);
            let path = path.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                QueueInner::flush_generation(&inner, &path, generation).await;
            })
        };

        let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.insert(
            path.to_string(),
            PendingWrite { content, generation, timer },
        ) {
            previous.timer.abort();
        }
    }

    /// Force the pending write for a path to disk now. Returns true when
    /// something was written.
    pub async fn flush(&self, path: &str) -> bool {
        let taken = {
            let mut pending =
                self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.remove(path)
        };
        match taken {
            Some(write) => {
                write.timer.abort();
                QueueInner::write_to_disk(&self.inner, path, &write.content).await;
                true
            }
            None => false,
        }
    }

    /// Flush every pending write.
    pub async fn flush_all(&self) {
        let paths: Vec<String> = {
            let pending =
                self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.keys().cloned().collect()
        };
        for path in paths {
            self.flush(&path).await;
        }
    }

    /// Cancel timers and drop all queued and expected state.
    pub fn shutdown(&self) {
        let mut pending =
            self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, write) in pending.drain() {
            write.timer.abort();
        }
        self.inner.expected.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> QueueStats {
        let pending_paths: Vec<String> = {
            let pending =
                self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.keys().cloned().collect()
        };
        let expected_counts = pending_paths
            .iter()
            .map(|p| (p.clone(), self.inner.expected.count_for(p)))
            .collect();
        QueueStats { pending_paths, expected_counts }
    }
}

impl QueueInner {
    /// Timer-fired flush. A stale generation means the write was superseded
    /// or already flushed; do nothing.
    async fn flush_generation(inner: &Arc<QueueInner>, path: &str, generation: u64) {
        let content = {
            let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get(path) {
                Some(write) if write.generation == generation => {
                    pending.remove(path).map(|w| w.content)
                }
                _ => None,
            }
        };
        if let Some(content) = content {
            Self::write_to_disk(inner, path, &content).await;
        }
    }

    /// Atomic write (temp file + rename) with retry backoff. After a
    /// successful write the content hash stays expected for the TTL so the
    /// watcher can absorb its own notification.
    async fn write_to_disk(inner: &Arc<QueueInner>, path: &str, content: &str) {
        let absolute = inner.root.join(path);
        let hash = content_hash_str(content);

        let mut last_error: Option<std::io::Error> = None;
        for attempt in 0..=RETRY_BACKOFF_MS.len() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS[attempt - 1]))
                    .await;
            }
            match Self::atomic_write(&absolute, content).await {
                Ok(()) => {
                    inner.expected.insert(
                        path,
                        &hash,
                        Instant::now() + inner.opts.write_ttl,
                    );
                    tracing::debug!("wrote {path} ({} bytes)", content.len());
                    return;
                }
                Err(e) => last_error = Some(e),
            }
        }

        tracing::error!(
            "giving up on {path} after {} attempts: {}",
            RETRY_BACKOFF_MS.len() + 1,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        );
    }

    async fn atomic_write(absolute: &std::path::Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = absolute.with_extension("md.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, absolute).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_opts() -> QueueOptions {
        QueueOptions {
            delay: Duration::from_millis(50),
            write_ttl: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn coalesces_rapid_writes_to_last_content() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(dir.path().to_path_buf(), fast_opts());

        queue.queue_write("general/a.md", "v1".to_string());
        queue.queue_write("general/a.md", "v2".to_string());
        queue.queue_write("general/a.md", "v3".to_string());
        assert_eq!(queue.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let on_disk = std::fs::read_to_string(dir.path().join("general/a.md")).unwrap();
        assert_eq!(on_disk, "v3");
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn every_queued_hash_is_expected() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(dir.path().to_path_buf(), fast_opts());
        let expected = queue.expected_hashes();

        queue.queue_write("general/a.md", "v1".to_string());
        queue.queue_write("general/a.md", "v2".to_string());

        assert!(expected.is_expected("general/a.md", &content_hash_str("v1")));
        assert!(expected.is_expected("general/a.md", &content_hash_str("v2")));
        assert!(!expected.is_expected("general/a.md", &content_hash_str("other")));
    }

    #[tokio::test]
    async fn hash_survives_ttl_after_write_then_expires() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(dir.path().to_path_buf(), fast_opts());
        let expected = queue.expected_hashes();

        queue.queue_write("general/a.md", "body".to_string());
        queue.flush("general/a.md").await;

        let hash = content_hash_str("body");
        assert!(expected.is_expected("general/a.md", &hash));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!expected.is_expected("general/a.md", &hash));
    }

    #[tokio::test]
    async fn flush_forces_immediate_write() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(
            dir.path().to_path_buf(),
            QueueOptions { delay: Duration::from_secs(60), ..fast_opts() },
        );

        queue.queue_write("general/a.md", "now".to_string());
        assert!(queue.flush("general/a.md").await);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("general/a.md")).unwrap(),
            "now"
        );
        assert!(!queue.flush("general/a.md").await);
    }

    #[tokio::test]
    async fn flush_all_drains_every_path() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(
            dir.path().to_path_buf(),
            QueueOptions { delay: Duration::from_secs(60), ..fast_opts() },
        );

        queue.queue_write("general/a.md", "a".to_string());
        queue.queue_write("general/b.md", "b".to_string());
        queue.flush_all().await;

        assert!(dir.path().join("general/a.md").exists());
        assert!(dir.path().join("general/b.md").exists());
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_writes() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(dir.path().to_path_buf(), fast_opts());

        queue.queue_write("general/a.md", "never".to_string());
        queue.shutdown();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!dir.path().join("general/a.md").exists());
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn stats_reports_pending_and_expected() {
        let dir = TempDir::new().unwrap();
        let queue = FileWriteQueue::new(
            dir.path().to_path_buf(),
            QueueOptions { delay: Duration::from_secs(60), ..fast_opts() },
        );

        queue.queue_write("general/a.md", "v1".to_string());
        queue.queue_write("general/a.md", "v2".to_string());

        let stats = queue.stats();
        assert_eq!(stats.pending_paths, vec!["general/a.md".to_string()]);
        assert_eq!(stats.expected_counts["general/a.md"], 2);
    }
}
