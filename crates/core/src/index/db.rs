//! Database connection and note operations.
//!
//! One `IndexDb` owns the vault's SQLite file. Readers and writers share the
//! single connection behind a mutex; SQLite's WAL mode keeps reads cheap and
//! the mutex gives the single-writer guarantee the engine relies on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use super::schema::{self, SchemaError};
use super::types::{MetadataValue, NoteChange, NoteQuery, NoteRecord, UpdateOutcome};
use crate::ids::NoteId;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unparseable stored data: {0}")]
    Parse(String),
}

/// Vault index database handle.
pub struct IndexDb {
    conn: Mutex<Connection>,
}

impl IndexDb {
    /// Open or create the index at the given path. A brand-new database is
    /// created directly at the current schema.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory database (tests).
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, IndexError> {
        if schema::is_fresh(&conn)? {
            schema::create_schema(&conn)?;
        } else {
            // Existing database: leave content alone. The migration runner
            // is responsible for bringing legacy schemas forward.
            schema::ensure_version_table(&conn)?;
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Lock the connection. Exposed within the crate so the migration runner
    /// can take exclusive access; everything else goes through typed methods.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Notes
    // ─────────────────────────────────────────────────────────────────────

    /// Insert a note row. Fails on a duplicate ID or `(type, filename)`.
    pub fn insert_note(&self, note: &NoteRecord) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO notes (id, type, filename, path, title, content, created,
                                updated, file_mtime, size_bytes, content_hash, archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                note.id.as_str(),
                note.note_type,
                note.filename,
                note.path,
                note.title,
                note.content,
                note.created.to_rfc3339(),
                note.updated.to_rfc3339(),
                note.file_mtime_ms,
                note.size_bytes,
                note.content_hash,
                note.archived as i64,
            ],
        )?;
        Ok(())
    }

    /// Insert a note, regenerating its ID until it does not collide.
    pub fn insert_note_with_fresh_id(
        &self,
        note: &mut NoteRecord,
    ) -> Result<(), IndexError> {
        loop {
            match self.insert_note(note) {
                Ok(()) => return Ok(()),
                Err(IndexError::Database(rusqlite::Error::SqliteFailure(_, Some(msg))))
                    if msg.contains("notes.id") =>
                {
                    note.id = NoteId::mint();
                }
                Err(other) => return Err(other),
            }
        }
    }

    pub fn get_note(&self, id: &NoteId) -> Result<Option<NoteRecord>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            &format!("{NOTE_SELECT} WHERE id = ?1"),
            [id.as_str()],
            row_to_note,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_note_by_path(&self, path: &str) -> Result<Option<NoteRecord>, IndexError> {
        let conn = self.lock();
        conn.query_row(&format!("{NOTE_SELECT} WHERE path = ?1"), [path], row_to_note)
            .optional()
            .map_err(Into::into)
    }

    pub fn get_note_by_type_filename(
        &self,
        note_type: &str,
        filename: &str,
    ) -> Result<Option<NoteRecord>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            &format!("{NOTE_SELECT} WHERE type = ?1 AND filename = ?2"),
            [note_type, filename],
            row_to_note,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Resolve a title to a note ID. Ambiguous titles resolve to the
    /// earliest-created note; this is a documented policy, not an accident.
    pub fn find_id_by_title(&self, title: &str) -> Result<Option<NoteId>, IndexError> {
        if title.is_empty() {
            return Ok(None);
        }
        let conn = self.lock();
        conn.query_row(
            "SELECT id FROM notes WHERE title = ?1 ORDER BY created ASC, id ASC LIMIT 1",
            [title],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|s| s.parse().map_err(|_| IndexError::Parse(format!("bad id in db: {s}"))))
        .transpose()
    }

    /// Resolve a `type/stem` reference (stem may or may not carry `.md`).
    pub fn find_id_by_type_and_stem(
        &self,
        note_type: &str,
        stem: &str,
    ) -> Result<Option<NoteId>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id FROM notes
             WHERE type = ?1 AND (filename = ?2 OR filename = ?2 || '.md')
             ORDER BY created ASC, id ASC LIMIT 1",
            [note_type, stem],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|s| s.parse().map_err(|_| IndexError::Parse(format!("bad id in db: {s}"))))
        .transpose()
    }

    pub fn id_exists(&self, id: &NoteId) -> Result<bool, IndexError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notes WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_notes(&self, query: &NoteQuery) -> Result<Vec<NoteRecord>, IndexError> {
        let mut sql = format!("{NOTE_SELECT} WHERE 1=1");
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(note_type) = &query.note_type {
            sql.push_str(" AND type = ?");
            bind.push(Box::new(note_type.clone()));
        }
        if !query.include_archived {
            sql.push_str(" AND archived = 0");
        }
        sql.push_str(" ORDER BY updated DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let notes =
            stmt.query_map(refs.as_slice(), row_to_note)?.filter_map(|r| r.ok()).collect();
        Ok(notes)
    }

    /// Snapshot of every tracked path for the sync reconciler.
    pub fn path_index(&self) -> Result<HashMap<String, PathEntry>, IndexError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT path, id, file_mtime, content_hash FROM notes")?;
        let mut map = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (path, id, file_mtime_ms, content_hash) = row?;
            let id = id
                .parse()
                .map_err(|_| IndexError::Parse(format!("bad id in db: {id}")))?;
            map.insert(path, PathEntry { id, file_mtime_ms, content_hash });
        }
        Ok(map)
    }

    /// Update a note's content, optionally guarded by the stored hash.
    ///
    /// With `expected_hash`, a mismatch affects zero rows and reports
    /// [`UpdateOutcome::Conflict`]; the caller decides how to surface it.
    pub fn update_note(
        &self,
        id: &NoteId,
        change: &NoteChange,
        expected_hash: Option<&str>,
    ) -> Result<UpdateOutcome, IndexError> {
        let conn = self.lock();
        let rows = match expected_hash {
            Some(expected) => conn.execute(
                "UPDATE notes SET
                    title = COALESCE(?1, title), content = ?2, updated = ?3,
                    file_mtime = ?4, size_bytes = ?5, content_hash = ?6
                 WHERE id = ?7 AND content_hash = ?8",
                params![
                    change.title,
                    change.content,
                    change.updated.to_rfc3339(),
                    change.file_mtime_ms,
                    change.size_bytes,
                    change.content_hash,
                    id.as_str(),
                    expected,
                ],
            )?,
            None => conn.execute(
                "UPDATE notes SET
                    title = COALESCE(?1, title), content = ?2, updated = ?3,
                    file_mtime = ?4, size_bytes = ?5, content_hash = ?6
                 WHERE id = ?7",
                params![
                    change.title,
                    change.content,
                    change.updated.to_rfc3339(),
                    change.file_mtime_ms,
                    change.size_bytes,
                    change.content_hash,
                    id.as_str(),
                ],
            )?,
        };

        if rows > 0 {
            return Ok(UpdateOutcome::Applied);
        }
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notes WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(IndexError::NoteNotFound(id.to_string()));
        }
        Ok(UpdateOutcome::Conflict)
    }

    /// Rename a note's title without touching content (ID links are immune
    /// to this; the stored hash still changes because the on-disk document
    /// does).
    pub fn update_note_title(
        &self,
        id: &NoteId,
        title: &str,
        updated: DateTime<Utc>,
        content_hash: &str,
        file_mtime_ms: i64,
        size_bytes: i64,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE notes SET title = ?1, updated = ?2, content_hash = ?3,
                              file_mtime = ?4, size_bytes = ?5
             WHERE id = ?6",
            params![
                title,
                updated.to_rfc3339(),
                content_hash,
                file_mtime_ms,
                size_bytes,
                id.as_str()
            ],
        )?;
        if rows == 0 {
            return Err(IndexError::NoteNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Refresh only the stored mtime (content proved identical by hash).
    pub fn touch_mtime(&self, id: &NoteId, file_mtime_ms: i64) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE notes SET file_mtime = ?1 WHERE id = ?2",
            params![file_mtime_ms, id.as_str()],
        )?;
        Ok(())
    }

    pub fn set_archived(&self, id: &NoteId, archived: bool) -> Result<(), IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE notes SET archived = ?1 WHERE id = ?2",
            params![archived as i64, id.as_str()],
        )?;
        if rows == 0 {
            return Err(IndexError::NoteNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a note; dependent rows cascade (links, metadata, review items,
    /// suggestions, hierarchy edges) and inbound links lose their target.
    pub fn delete_note(&self, id: &NoteId) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM notes WHERE id = ?1", [id.as_str()])?;
        Ok(rows > 0)
    }

    pub fn delete_note_by_path(&self, path: &str) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM notes WHERE path = ?1", [path])?;
        Ok(rows > 0)
    }

    pub fn count_notes(&self) -> Result<i64, IndexError> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
    }

    pub fn count_notes_by_type(&self) -> Result<Vec<(String, i64)>, IndexError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT type, COUNT(*) FROM notes GROUP BY type ORDER BY type")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(counts)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata entries
    // ─────────────────────────────────────────────────────────────────────

    /// Replace every metadata entry for a note in one transaction.
    pub fn replace_metadata(
        &self,
        id: &NoteId,
        entries: &[(String, MetadataValue)],
    ) -> Result<(), IndexError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM note_metadata WHERE note_id = ?1", [id.as_str()])?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO note_metadata (note_id, key, value, value_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), key, value.to_stored(), value.type_tag()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_metadata(
        &self,
        id: &NoteId,
    ) -> Result<Vec<(String, MetadataValue)>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT key, value, value_type FROM note_metadata
             WHERE note_id = ?1 ORDER BY key",
        )?;
        let entries = stmt
            .query_map([id.as_str()], |row| {
                let key: String = row.get(0)?;
                let value: Option<String> = row.get(1)?;
                let tag: String = row.get(2)?;
                Ok((key, MetadataValue::from_stored(&tag, &value.unwrap_or_default())))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn get_metadata_value(
        &self,
        id: &NoteId,
        key: &str,
    ) -> Result<Option<MetadataValue>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT value, value_type FROM note_metadata WHERE note_id = ?1 AND key = ?2",
            params![id.as_str(), key],
            |row| {
                let value: Option<String> = row.get(0)?;
                let tag: String = row.get(1)?;
                Ok(MetadataValue::from_stored(&tag, &value.unwrap_or_default()))
            },
        )
        .optional()
        .map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────
    // ID migration map
    // ─────────────────────────────────────────────────────────────────────

    /// Record an old-identifier mapping. Write-once: an existing mapping for
    /// the same old identifier is never overwritten.
    pub fn record_id_migration(
        &self,
        old_identifier: &str,
        new_id: &NoteId,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO note_id_migration (old_identifier, new_id)
             VALUES (?1, ?2)",
            params![old_identifier, new_id.as_str()],
        )?;
        Ok(())
    }

    pub fn lookup_id_migration(
        &self,
        old_identifier: &str,
    ) -> Result<Option<NoteId>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT new_id FROM note_id_migration WHERE old_identifier = ?1",
            [old_identifier],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|s| s.parse().map_err(|_| IndexError::Parse(format!("bad id in db: {s}"))))
        .transpose()
    }

    // ─────────────────────────────────────────────────────────────────────
    // UI state
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_ui_state(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ui_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    pub fn get_ui_state(&self, key: &str) -> Result<Option<serde_json::Value>, IndexError> {
        let conn = self.lock();
        let raw: Option<Option<String>> = conn
            .query_row("SELECT value FROM ui_state WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw.flatten() {
            Some(s) => match serde_json::from_str(&s) {
                Ok(v) => Ok(Some(v)),
                Err(_) => {
                    tracing::warn!("unparseable ui_state blob for key {key}, dropping");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// Reconciler's view of one tracked path.
#[derive(Debug, Clone)]
pub struct PathEntry {
    pub id: NoteId,
    pub file_mtime_ms: i64,
    pub content_hash: String,
}

const NOTE_SELECT: &str = "SELECT id, type, filename, path, title, content, created,
                                  updated, file_mtime, size_bytes, content_hash, archived
                           FROM notes";

pub(crate) fn row_to_note(row: &rusqlite::Row) -> Result<NoteRecord, rusqlite::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(NoteRecord {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        note_type: row.get(1)?,
        filename: row.get(2)?,
        path: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        created: parse_timestamp(&created),
        updated: parse_timestamp(&updated),
        file_mtime_ms: row.get(8)?,
        size_bytes: row.get(9)?,
        content_hash: row.get(10)?,
        archived: row.get::<_, i64>(11)? != 0,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
