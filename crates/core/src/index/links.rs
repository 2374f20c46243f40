//! Link storage: internal wikilink edges and external URLs.

use rusqlite::{OptionalExtension, params};

use super::db::{IndexDb, IndexError, parse_timestamp};
use super::types::{ExternalLink, ExternalLinkKind, NoteLink};
use crate::ids::NoteId;

impl IndexDb {
    /// Replace every outgoing link row for a source note atomically:
    /// delete-then-insert inside one transaction.
    pub fn store_links(
        &self,
        source: &NoteId,
        links: &[NoteLink],
        externals: &[ExternalLink],
    ) -> Result<(), IndexError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM note_links WHERE source_note_id = ?1", [source.as_str()])?;
        tx.execute("DELETE FROM external_links WHERE note_id = ?1", [source.as_str()])?;

        for link in links {
            tx.execute(
                "INSERT INTO note_links (source_note_id, target_note_id, target_title,
                                         link_text, line_number, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.as_str(),
                    link.target_id.as_ref().map(NoteId::as_str),
                    link.target_title,
                    link.link_text,
                    link.line_number,
                    link.created.to_rfc3339(),
                ],
            )?;
        }
        for ext in externals {
            tx.execute(
                "INSERT INTO external_links (note_id, url, title, line_number,
                                             link_type, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.as_str(),
                    ext.url,
                    ext.title,
                    ext.line_number,
                    ext.link_type.as_str(),
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn outgoing_links(&self, source: &NoteId) -> Result<Vec<NoteLink>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{LINK_SELECT} WHERE source_note_id = ?1"))?;
        let links = stmt
            .query_map([source.as_str()], row_to_link)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(links)
    }

    /// Incoming links to a note.
    pub fn backlinks(&self, target: &NoteId) -> Result<Vec<NoteLink>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{LINK_SELECT} WHERE target_note_id = ?1"))?;
        let links = stmt
            .query_map([target.as_str()], row_to_link)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(links)
    }

    /// Every link whose target is currently unresolved.
    pub fn broken_links(&self) -> Result<Vec<NoteLink>, IndexError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("{LINK_SELECT} WHERE target_note_id IS NULL"))?;
        let links = stmt.query_map([], row_to_link)?.filter_map(|r| r.ok()).collect();
        Ok(links)
    }

    /// Point broken links at a newly appeared note. A row qualifies when its
    /// written reference equals the new note's title or its `type/stem`
    /// reference (with or without `.md`). Returns the number of rows fixed.
    pub fn update_broken_links(
        &self,
        new_id: &NoteId,
        title: &str,
        note_type: &str,
        filename: &str,
    ) -> Result<usize, IndexError> {
        let stem = filename.strip_suffix(".md").unwrap_or(filename);
        let by_stem = format!("{note_type}/{stem}");
        let by_file = format!("{note_type}/{filename}");
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE note_links SET target_note_id = ?1
             WHERE target_note_id IS NULL
               AND (( ?2 != '' AND target_title = ?2)
                 OR target_title = ?3
                 OR target_title = ?4
                 OR target_title = ?5)",
            params![new_id.as_str(), title, by_stem, by_file, new_id.as_str()],
        )?;
        Ok(rows)
    }

    pub fn external_links(&self, note: &NoteId) -> Result<Vec<ExternalLink>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, note_id, url, title, line_number, link_type
             FROM external_links WHERE note_id = ?1",
        )?;
        let links = stmt
            .query_map([note.as_str()], |row| {
                let id: String = row.get(1)?;
                let kind: String = row.get(5)?;
                Ok(ExternalLink {
                    id: Some(row.get(0)?),
                    note_id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
                    url: row.get(2)?,
                    title: row.get(3)?,
                    line_number: row.get::<_, Option<u32>>(4)?.unwrap_or(0),
                    link_type: ExternalLinkKind::parse(&kind)
                        .unwrap_or(ExternalLinkKind::Url),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(links)
    }

    pub fn count_links(&self) -> Result<i64, IndexError> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM note_links", [], |row| row.get(0))?)
    }

    pub fn count_broken_links(&self) -> Result<i64, IndexError> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM note_links WHERE target_note_id IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    /// Whether any link row already points at the given target.
    pub fn has_backlinks(&self, target: &NoteId) -> Result<bool, IndexError> {
        let conn = self.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM note_links WHERE target_note_id = ?1 LIMIT 1",
                [target.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

const LINK_SELECT: &str = "SELECT id, source_note_id, target_note_id, target_title,
                                  link_text, line_number, created
                           FROM note_links";

fn row_to_link(row: &rusqlite::Row) -> Result<NoteLink, rusqlite::Error> {
    let source: String = row.get(1)?;
    let target: Option<String> = row.get(2)?;
    let created: String = row.get(6)?;
    Ok(NoteLink {
        id: Some(row.get(0)?),
        source_id: source.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        target_id: match target {
            Some(t) => Some(t.parse().map_err(|_| rusqlite::Error::InvalidQuery)?),
            None => None,
        },
        target_title: row.get(3)?,
        link_text: row.get(4)?,
        line_number: row.get::<_, Option<u32>>(5)?.unwrap_or(0),
        created: parse_timestamp(&created),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::NoteRecord;
    use chrono::Utc;

    fn note(note_type: &str, filename: &str, title: &str) -> NoteRecord {
        let now = Utc::now();
        NoteRecord {
            id: NoteId::mint(),
            note_type: note_type.to_string(),
            filename: filename.to_string(),
            path: format!("{note_type}/{filename}"),
            title: title.to_string(),
            content: String::new(),
            created: now,
            updated: now,
            file_mtime_ms: 0,
            size_bytes: 0,
            content_hash: "h".to_string(),
            archived: false,
        }
    }

    fn link_to(source: &NoteId, target: Option<&NoteId>, written: &str) -> NoteLink {
        NoteLink {
            id: None,
            source_id: source.clone(),
            target_id: target.cloned(),
            target_title: written.to_string(),
            link_text: None,
            line_number: 1,
            created: Utc::now(),
        }
    }

    #[test]
    fn store_replaces_previous_rows() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        let b = note("general", "b.md", "B");
        db.insert_note(&a).unwrap();
        db.insert_note(&b).unwrap();

        db.store_links(&a.id, &[link_to(&a.id, Some(&b.id), "B")], &[]).unwrap();
        db.store_links(&a.id, &[link_to(&a.id, None, "Missing")], &[]).unwrap();

        let out = db.outgoing_links(&a.id).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_title, "Missing");
        assert!(out[0].target_id.is_none());
    }

    #[test]
    fn backlinks_read_by_target() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        let b = note("general", "b.md", "B");
        db.insert_note(&a).unwrap();
        db.insert_note(&b).unwrap();

        db.store_links(&a.id, &[link_to(&a.id, Some(&b.id), "B")], &[]).unwrap();

        let back = db.backlinks(&b.id).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].source_id, a.id);
    }

    #[test]
    fn deleting_target_nulls_links_and_deleting_source_cascades() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        let b = note("general", "b.md", "B");
        db.insert_note(&a).unwrap();
        db.insert_note(&b).unwrap();
        db.store_links(&a.id, &[link_to(&a.id, Some(&b.id), "B")], &[]).unwrap();

        db.delete_note(&b.id).unwrap();
        let out = db.outgoing_links(&a.id).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].target_id.is_none(), "target must be nulled, not deleted");

        db.delete_note(&a.id).unwrap();
        assert_eq!(db.count_links().unwrap(), 0);
    }

    #[test]
    fn update_broken_links_matches_title_and_type_path() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        db.insert_note(&a).unwrap();
        db.store_links(
            &a.id,
            &[
                link_to(&a.id, None, "New Note"),
                link_to(&a.id, None, "projects/roadmap"),
                link_to(&a.id, None, "Unrelated"),
            ],
            &[],
        )
        .unwrap();

        let target = note("projects", "roadmap.md", "New Note");
        db.insert_note(&target).unwrap();

        let fixed = db
            .update_broken_links(&target.id, &target.title, "projects", "roadmap.md")
            .unwrap();
        assert_eq!(fixed, 2);
        assert_eq!(db.count_broken_links().unwrap(), 1);
    }

    #[test]
    fn empty_title_does_not_match_broken_links() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        db.insert_note(&a).unwrap();
        db.store_links(&a.id, &[link_to(&a.id, None, "")], &[]).unwrap();

        let untitled = note("general", "untitled.md", "");
        db.insert_note(&untitled).unwrap();
        let fixed = db
            .update_broken_links(&untitled.id, "", "general", "untitled.md")
            .unwrap();
        assert_eq!(fixed, 0);
    }

    #[test]
    fn external_links_round_trip() {
        let db = IndexDb::open_in_memory().unwrap();
        let a = note("general", "a.md", "A");
        db.insert_note(&a).unwrap();

        db.store_links(
            &a.id,
            &[],
            &[ExternalLink {
                id: None,
                note_id: a.id.clone(),
                url: "https://example.com".to_string(),
                title: Some("Example".to_string()),
                line_number: 3,
                link_type: ExternalLinkKind::Url,
            }],
        )
        .unwrap();

        let ext = db.external_links(&a.id).unwrap();
        assert_eq!(ext.len(), 1);
        assert_eq!(ext[0].url, "https://example.com");
        assert_eq!(ext[0].link_type, ExternalLinkKind::Url);

        db.delete_note(&a.id).unwrap();
        // Cascade removed the external rows with the note.
        let conn_count: i64 = {
            let db2 = db;
            let conn = db2.lock();
            conn.query_row("SELECT COUNT(*) FROM external_links", [], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(conn_count, 0);
    }
}
