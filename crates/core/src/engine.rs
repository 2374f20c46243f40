//! The per-vault engine: one context object owning every component.
//!
//! All mutations flow through here so the index, the on-disk tree, and the
//! link graph stay consistent: content writes go through the write queue
//! (so the watcher can classify them as internal), link rows are replaced
//! atomically after every body change, and title links are converted to ID
//! links before anything reaches disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_yaml::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{ConfigError, VaultConfig, index_path};
use crate::frontmatter::{self, Frontmatter, NameStyle};
use crate::hierarchy::{HierarchyError, HierarchyManager};
use crate::ids::NoteId;
use crate::index::types::{
    MetadataValue, NoteChange, NoteQuery, NoteRecord, UpdateOutcome,
};
use crate::index::{IndexDb, IndexError};
use crate::migration::{MigrationError, MigrationReport, MigrationRunner};
use crate::queue::{FileWriteQueue, QueueOptions, QueueStats};
use crate::review::ReviewScheduler;
use crate::sync::{SyncError, SyncReconciler, SyncStats};
use crate::vault::content_hash_str;
use crate::watcher::{VaultEvent, VaultWatcher, WatcherError, WatcherOptions};
use crate::wikilink::LinkResolver;
use crate::workflow::WorkflowManager;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index database error: {0}")]
    Index(#[from] IndexError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Engine construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub queue: QueueOptions,
    pub watcher: WatcherOptions,
}

/// Input for creating a note.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub note_type: String,
    pub title: String,
    pub content: String,
    /// Basename; derived from the title when absent.
    pub filename: Option<String>,
    /// Extra frontmatter fields, retained verbatim.
    pub metadata: Vec<(String, MetadataValue)>,
}

/// Outcome of an optimistically locked note update.
#[derive(Debug, Clone)]
pub enum NoteUpdate {
    Applied(NoteRecord),
    /// The expected hash was stale; nothing changed.
    Conflict,
}

/// The per-vault context.
pub struct NoteEngine {
    root: PathBuf,
    config: VaultConfig,
    db: Arc<IndexDb>,
    queue: FileWriteQueue,
    watcher: Mutex<Option<VaultWatcher>>,
}

impl NoteEngine {
    /// Open (or initialize) a vault with default options.
    pub async fn open(vault_root: &Path) -> Result<Self, EngineError> {
        Self::open_with(vault_root, EngineOptions::default()).await
    }

    pub async fn open_with(
        vault_root: &Path,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(vault_root).await.map_err(|source| {
            EngineError::Io { path: vault_root.to_path_buf(), source }
        })?;
        let config = VaultConfig::load_or_init(vault_root)?;
        let db = Arc::new(IndexDb::open(&index_path(vault_root))?);
        let queue = FileWriteQueue::new(vault_root.to_path_buf(), options.queue);

        Ok(Self {
            root: vault_root.to_path_buf(),
            config,
            db,
            queue,
            watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn vault_root(&self) -> &Path {
        &self.root
    }

    /// The index store, for read-side queries.
    pub fn db(&self) -> &Arc<IndexDb> {
        &self.db
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Component accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn review(&self) -> ReviewScheduler {
        ReviewScheduler::new(Arc::clone(&self.db))
    }

    pub fn workflows(&self) -> WorkflowManager {
        WorkflowManager::new(Arc::clone(&self.db))
    }

    pub fn hierarchy(&self) -> Result<HierarchyManager, EngineError> {
        Ok(HierarchyManager::load(Arc::clone(&self.db))?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Reconcile the index with the on-disk tree.
    pub async fn sync(&self) -> Result<SyncStats, EngineError> {
        let reconciler = SyncReconciler::new(
            Arc::clone(&self.db),
            self.root.clone(),
            self.queue.clone(),
        );
        Ok(reconciler.reconcile().await?)
    }

    /// Run pending schema migrations from the given current version.
    pub fn check_and_migrate(
        &self,
        current_version: &str,
    ) -> Result<MigrationReport, EngineError> {
        let runner = MigrationRunner::new(Arc::clone(&self.db), self.root.clone());
        Ok(runner.check_and_migrate(current_version)?)
    }

    /// Start watching the vault for external changes.
    pub fn start_watcher(&self, options: WatcherOptions) -> Result<(), EngineError> {
        let watcher = VaultWatcher::start(
            self.root.clone(),
            self.queue.expected_hashes(),
            options,
        )?;
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(watcher) {
            previous.close();
        }
        Ok(())
    }

    /// Subscribe to external events; `None` until the watcher is started.
    pub fn subscribe_events(&self) -> Option<broadcast::Receiver<VaultEvent>> {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(VaultWatcher::subscribe)
    }

    /// Flush pending writes, stop timers, and close the watcher.
    pub async fn shutdown(&self) {
        self.queue.flush_all().await;
        self.queue.shutdown();
        let watcher = {
            let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(watcher) = watcher {
            watcher.close();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Note operations
    // ─────────────────────────────────────────────────────────────────────

    pub async fn create_note(&self, new: NewNote) -> Result<NoteRecord, EngineError> {
        validate_type_name(&new.note_type)?;
        let filename = normalize_filename(
            new.filename.clone().unwrap_or_else(|| slugify(&new.title)),
        )?;

        if self
            .db
            .get_note_by_type_filename(&new.note_type, &filename)?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "note {}/{filename} already exists",
                new.note_type
            )));
        }

        let mut id = NoteId::mint();
        while self.db.id_exists(&id)? {
            id = NoteId::mint();
        }

        let resolver = LinkResolver::new(&self.db);
        let (body, _) = resolver.convert_title_links_to_id_links(&new.content)?;

        let now = Utc::now();
        let fm = build_frontmatter(
            &id,
            &new.note_type,
            &new.title,
            now,
            now,
            &new.metadata,
        );
        let document = frontmatter::render_note(&fm, &body, NameStyle::Prefixed);
        let content_hash = content_hash_str(&document);

        let record = NoteRecord {
            id: id.clone(),
            note_type: new.note_type.clone(),
            filename: filename.clone(),
            path: format!("{}/{filename}", new.note_type),
            title: new.title.clone(),
            content: body.clone(),
            created: now,
            updated: now,
            file_mtime_ms: now.timestamp_millis(),
            size_bytes: document.len() as i64,
            content_hash,
            archived: false,
        };
        self.db.insert_note(&record)?;
        self.db.replace_metadata(&id, &new.metadata)?;
        resolver.store_links_for(&id, &body)?;
        self.db
            .update_broken_links(&id, &record.title, &record.note_type, &record.filename)?;

        self.queue.queue_write(&record.path, document);
        self.queue.flush(&record.path).await;

        tracing::debug!("created note {} at {}", record.id, record.path);
        Ok(record)
    }

    pub fn get_note(&self, id: &NoteId) -> Result<Option<NoteRecord>, EngineError> {
        Ok(self.db.get_note(id)?)
    }

    pub fn get_note_by_path(&self, path: &str) -> Result<Option<NoteRecord>, EngineError> {
        Ok(self.db.get_note_by_path(path)?)
    }

    pub fn list_notes(&self, query: &NoteQuery) -> Result<Vec<NoteRecord>, EngineError> {
        Ok(self.db.list_notes(query)?)
    }

    pub fn search_notes(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<NoteRecord>, EngineError> {
        Ok(self.db.search_notes(query, limit)?)
    }

    pub fn backlinks(
        &self,
        id: &NoteId,
    ) -> Result<Vec<crate::index::NoteLink>, EngineError> {
        Ok(self.db.backlinks(id)?)
    }

    /// Update a note's body, guarded by the caller's view of the stored
    /// content hash. On a stale hash nothing changes and
    /// [`NoteUpdate::Conflict`] is returned.
    pub async fn update_note(
        &self,
        id: &NoteId,
        new_body: &str,
        expected_hash: &str,
    ) -> Result<NoteUpdate, EngineError> {
        let existing = self
            .db
            .get_note(id)?
            .ok_or_else(|| EngineError::NotFound(format!("note {id}")))?;

        let resolver = LinkResolver::new(&self.db);
        let (body, _) = resolver.convert_title_links_to_id_links(new_body)?;

        let now = Utc::now();
        let metadata = self.db.get_metadata(id)?;
        let fm = build_frontmatter(
            id,
            &existing.note_type,
            &existing.title,
            existing.created,
            now,
            &metadata,
        );
        let document = frontmatter::render_note(&fm, &body, NameStyle::Prefixed);
        let content_hash = content_hash_str(&document);

        let change = NoteChange {
            title: None,
            content: body.clone(),
            updated: now,
            file_mtime_ms: now.timestamp_millis(),
            size_bytes: document.len() as i64,
            content_hash,
        };
        match self.db.update_note(id, &change, Some(expected_hash))? {
            UpdateOutcome::Conflict => return Ok(NoteUpdate::Conflict),
            UpdateOutcome::Applied => {}
        }

        resolver.store_links_for(id, &body)?;
        self.queue.queue_write(&existing.path, document);

        let refreshed = self
            .db
            .get_note(id)?
            .ok_or_else(|| EngineError::NotFound(format!("note {id}")))?;
        Ok(NoteUpdate::Applied(refreshed))
    }

    /// Rename a note's title. ID links pointing at the note are untouched;
    /// broken title links matching the new title get repaired.
    pub async fn rename_note_title(
        &self,
        id: &NoteId,
        new_title: &str,
    ) -> Result<NoteRecord, EngineError> {
        let existing = self
            .db
            .get_note(id)?
            .ok_or_else(|| EngineError::NotFound(format!("note {id}")))?;

        let now = Utc::now();
        let metadata = self.db.get_metadata(id)?;
        let fm = build_frontmatter(
            id,
            &existing.note_type,
            new_title,
            existing.created,
            now,
            &metadata,
        );
        let document = frontmatter::render_note(&fm, &existing.content, NameStyle::Prefixed);
        let content_hash = content_hash_str(&document);

        self.db.update_note_title(
            id,
            new_title,
            now,
            &content_hash,
            now.timestamp_millis(),
            document.len() as i64,
        )?;
        self.db
            .update_broken_links(id, new_title, &existing.note_type, &existing.filename)?;

        self.queue.queue_write(&existing.path, document);
        self.queue.flush(&existing.path).await;

        self.db
            .get_note(id)?
            .ok_or_else(|| EngineError::NotFound(format!("note {id}")))
    }

    /// Delete a note: the file goes, the row goes, dependents cascade, and
    /// inbound links degrade to broken.
    pub async fn delete_note(&self, id: &NoteId) -> Result<bool, EngineError> {
        let Some(existing) = self.db.get_note(id)? else {
            return Ok(false);
        };
        let file = self.root.join(&existing.path);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(EngineError::Io { path: file, source }),
        }
        Ok(self.db.delete_note(id)?)
    }

    pub fn archive_note(&self, id: &NoteId, archived: bool) -> Result<(), EngineError> {
        Ok(self.db.set_archived(id, archived)?)
    }

    /// Note and link counts per type.
    pub fn vault_stats(&self) -> Result<VaultStats, EngineError> {
        Ok(VaultStats {
            notes: self.db.count_notes()?,
            notes_by_type: self.db.count_notes_by_type()?,
            links: self.db.count_links()?,
            broken_links: self.db.count_broken_links()?,
        })
    }
}

/// Aggregate vault counters.
#[derive(Debug, Clone)]
pub struct VaultStats {
    pub notes: i64,
    pub notes_by_type: Vec<(String, i64)>,
    pub links: i64,
    pub broken_links: i64,
}

fn build_frontmatter(
    id: &NoteId,
    note_type: &str,
    title: &str,
    created: chrono::DateTime<Utc>,
    updated: chrono::DateTime<Utc>,
    metadata: &[(String, MetadataValue)],
) -> Frontmatter {
    let mut fm = Frontmatter::default();
    fm.insert("id", Value::String(id.to_string()));
    fm.insert("type", Value::String(note_type.to_string()));
    if !title.is_empty() {
        fm.insert("title", Value::String(title.to_string()));
    }
    fm.insert("created", frontmatter::timestamp_value(created));
    fm.insert("updated", frontmatter::timestamp_value(updated));
    for (key, value) in metadata {
        fm.insert(key, value.to_yaml());
    }
    fm
}

fn validate_type_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty()
        || name.contains('/')
        || name.starts_with('.')
        || name.starts_with('_')
    {
        return Err(EngineError::Validation(format!("invalid note type name: '{name}'")));
    }
    Ok(())
}

fn normalize_filename(raw: String) -> Result<String, EngineError> {
    let with_ext =
        if raw.ends_with(".md") { raw } else { format!("{raw}.md") };
    let stem = with_ext.trim_end_matches(".md");
    if stem.is_empty() || stem.starts_with('_') || stem.contains('/') {
        return Err(EngineError::Validation(format!(
            "invalid note filename: '{with_ext}'"
        )));
    }
    Ok(with_ext)
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "untitled".to_string() } else { slug }
}
