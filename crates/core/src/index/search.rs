//! Full-text search over note titles and content.
//!
//! Backed by the `notes_fts` FTS5 table, which triggers keep in sync with
//! `notes`. Ranking is delegated to the FTS engine.

use super::db::{IndexDb, IndexError};
use super::types::NoteRecord;

impl IndexDb {
    /// Search notes matching an FTS query string, best matches first.
    pub fn search_notes(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<NoteRecord>, IndexError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT n.id, n.type, n.filename, n.path, n.title, n.content, n.created,
                    n.updated, n.file_mtime, n.size_bytes, n.content_hash, n.archived
             FROM notes n
             JOIN notes_fts f ON n.rowid = f.rowid
             WHERE notes_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let notes = stmt
            .query_map(rusqlite::params![query, limit], super::db::row_to_note)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(notes)
    }
}
