//! The sync reconciler: make the index reflect the tree.
//!
//! Walks the vault, compares each file against the index using mtime first
//! and content hash second, and applies additions, updates, and deletions.
//! Files without a stable ID get one stamped into their frontmatter on the
//! way in; resolvable title links are rewritten to ID links and written
//! back through the queue so the watcher never mistakes the rewrite for an
//! external edit.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_yaml::Value;
use thiserror::Error;

use crate::frontmatter::{self, Frontmatter, NameStyle};
use crate::ids::NoteId;
use crate::index::types::{NoteChange, NoteRecord};
use crate::index::{IndexDb, IndexError, PathEntry};
use crate::queue::FileWriteQueue;
use crate::vault::{VaultWalker, VaultWalkerError, WalkedFile, content_hash_str};
use crate::wikilink::LinkResolver;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("vault walker error: {0}")]
    Walker(#[from] VaultWalkerError),

    #[error("index database error: {0}")]
    Index(#[from] IndexError),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Counters from one reconcile pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub files_seen: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Files that received a freshly minted ID in their frontmatter.
    pub ids_stamped: usize,
    /// Bodies rewritten by title-link conversion.
    pub links_rewritten: usize,
    pub errors: usize,
}

/// Reconciles the on-disk tree with the index.
pub struct SyncReconciler {
    db: Arc<IndexDb>,
    root: PathBuf,
    queue: FileWriteQueue,
}

impl SyncReconciler {
    pub fn new(db: Arc<IndexDb>, root: PathBuf, queue: FileWriteQueue) -> Self {
        Self { db, root, queue }
    }

    /// Run one full reconcile pass.
    pub async fn reconcile(&self) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();
        let indexed = self.db.path_index()?;
        let files = VaultWalker::new(&self.root)?.walk()?;
        stats.files_seen = files.len();

        let mut seen: HashSet<String> = HashSet::with_capacity(files.len());
        for file in &files {
            seen.insert(file.relative_path.clone());
            let result = match indexed.get(&file.relative_path) {
                None => self.absorb_new_file(file, &mut stats).await,
                Some(entry) => {
                    if file.modified_ms <= entry.file_mtime_ms {
                        stats.unchanged += 1;
                        continue;
                    }
                    self.absorb_changed_file(file, entry, &mut stats).await
                }
            };
            if let Err(e) = result {
                tracing::warn!("failed to sync {}: {e}", file.relative_path);
                stats.errors += 1;
            }
        }

        // Anything tracked but no longer on disk is gone; the cascade takes
        // dependent rows with it.
        for (path, entry) in &indexed {
            if !seen.contains(path) && self.db.delete_note(&entry.id)? {
                tracing::debug!("removed from index: {path}");
                stats.deleted += 1;
            }
        }

        tracing::info!(
            "sync: {} seen, {} added, {} updated, {} deleted, {} unchanged, {} stamped",
            stats.files_seen,
            stats.added,
            stats.updated,
            stats.deleted,
            stats.unchanged,
            stats.ids_stamped,
        );
        Ok(stats)
    }

    /// Index a file the store has never seen at this path.
    async fn absorb_new_file(
        &self,
        file: &WalkedFile,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let raw = tokio::fs::read_to_string(&file.absolute_path).await.map_err(|e| {
            SyncError::FileRead { path: file.relative_path.clone(), source: e }
        })?;
        let parsed = frontmatter::parse(&raw);
        let mut fm = parsed.metadata();

        // An ID from frontmatter is honored unless another note already owns
        // it (an imported copy); then a fresh one is minted and stamped.
        let fm_id: Option<NoteId> =
            fm.get_str("id").and_then(|s| s.parse().ok());
        let (mut id, needs_stamp) = match fm_id {
            Some(id) if !self.db.id_exists(&id)? => (id, false),
            Some(taken) => {
                tracing::warn!(
                    "{} reuses id {taken} of another note, minting a fresh one",
                    file.relative_path
                );
                (NoteId::mint(), true)
            }
            None => (NoteId::mint(), true),
        };
        while needs_stamp && self.db.id_exists(&id)? {
            id = NoteId::mint();
        }

        // A surviving row under the same (type, filename) refers to a file
        // that no longer exists with that identity; replace it.
        if let Some(stale) =
            self.db.get_note_by_type_filename(&file.note_type, &file.filename)?
        {
            if stale.id != id {
                tracing::debug!(
                    "replacing stale index row for {} ({} -> {id})",
                    file.relative_path,
                    stale.id
                );
                self.db.delete_note(&stale.id)?;
            }
        }

        let resolver = LinkResolver::new(&self.db);
        let (body, converted) = resolver.convert_title_links_to_id_links(&parsed.body)?;

        // Titles come from frontmatter only; a missing title stays empty.
        let title = fm.get_str("title").unwrap_or_default().to_string();
        let created = fm
            .get_str("created")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let rewrite = needs_stamp || converted > 0;
        let (document, content_hash, size_bytes) = if rewrite {
            fm.insert_if_absent("id", Value::String(id.to_string()));
            fm.insert_if_absent("type", Value::String(file.note_type.clone()));
            fm.normalize_aliases();
            let doc = frontmatter::render_note(&fm, &body, NameStyle::Prefixed);
            let hash = content_hash_str(&doc);
            let size = doc.len() as i64;
            (Some(doc), hash, size)
        } else {
            (None, content_hash_str(&raw), file.size as i64)
        };

        let record = NoteRecord {
            id,
            note_type: file.note_type.clone(),
            filename: file.filename.clone(),
            path: file.relative_path.clone(),
            title: title.clone(),
            content: body.clone(),
            created,
            updated: Utc::now(),
            file_mtime_ms: file.modified_ms,
            size_bytes,
            content_hash,
            archived: false,
        };
        self.db.insert_note(&record)?;

        self.store_metadata(&record.id, &fm)?;
        resolver.store_links_for(&record.id, &body)?;

        // A new note can heal links that were broken before it existed.
        self.db.update_broken_links(
            &record.id,
            &record.title,
            &record.note_type,
            &record.filename,
        )?;

        if let Some(document) = document {
            self.queue.queue_write(&file.relative_path, document);
            self.queue.flush(&file.relative_path).await;
        }

        stats.added += 1;
        if needs_stamp {
            stats.ids_stamped += 1;
        }
        if converted > 0 {
            stats.links_rewritten += 1;
        }
        Ok(())
    }

    /// Re-absorb a tracked file whose mtime moved forward.
    async fn absorb_changed_file(
        &self,
        file: &WalkedFile,
        entry: &PathEntry,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let raw = tokio::fs::read_to_string(&file.absolute_path).await.map_err(|e| {
            SyncError::FileRead { path: file.relative_path.clone(), source: e }
        })?;

        // mtime moved but content did not: refresh the stored mtime so the
        // skip optimization works next pass.
        let raw_hash = content_hash_str(&raw);
        if raw_hash == entry.content_hash {
            self.db.touch_mtime(&entry.id, file.modified_ms)?;
            stats.unchanged += 1;
            return Ok(());
        }

        let parsed = frontmatter::parse(&raw);
        let fm = parsed.metadata();
        let fm_id: Option<NoteId> = fm.get_str("id").and_then(|s| s.parse().ok());
        let id_matches = fm_id.as_ref() == Some(&entry.id);

        // Title links are only converted when the rewrite can be written
        // back, i.e. when the file's ID agrees with the row being updated.
        let resolver = LinkResolver::new(&self.db);
        let (body, converted) = if id_matches {
            resolver.convert_title_links_to_id_links(&parsed.body)?
        } else {
            (parsed.body.clone(), 0)
        };

        let title = fm.get_str("title").unwrap_or_default().to_string();
        let (write_back, content_hash, size_bytes) = if converted > 0 {
            let doc = frontmatter::render_note(&fm, &body, NameStyle::Prefixed);
            let hash = content_hash_str(&doc);
            let size = doc.len() as i64;
            (Some(doc), hash, size)
        } else {
            (None, raw_hash, file.size as i64)
        };

        let change = NoteChange {
            title: Some(title.clone()),
            content: body.clone(),
            updated: Utc::now(),
            file_mtime_ms: file.modified_ms,
            size_bytes,
            content_hash,
        };
        // The tree is authoritative here; no optimistic guard.
        self.db.update_note(&entry.id, &change, None)?;

        self.store_metadata(&entry.id, &fm)?;
        resolver.store_links_for(&entry.id, &body)?;
        self.db.update_broken_links(&entry.id, &title, &file.note_type, &file.filename)?;

        if let Some(document) = write_back {
            self.queue.queue_write(&file.relative_path, document);
            stats.links_rewritten += 1;
        }

        stats.updated += 1;
        Ok(())
    }

    fn store_metadata(&self, id: &NoteId, fm: &Frontmatter) -> Result<(), IndexError> {
        let entries: Vec<_> = fm
            .user_fields()
            .map(|(key, value)| {
                (key.to_string(), crate::index::MetadataValue::from_yaml(value))
            })
            .collect();
        self.db.replace_metadata(id, &entries)
    }
}
