//! Persistence for AI-generated suggestions.
//!
//! Generation itself is an external collaborator; this layer only stores
//! what it produced, tracks dismissals, and answers whether a note is
//! eligible for generation at all.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::db::{IndexDb, IndexError, parse_timestamp};
use super::types::{MetadataValue, Suggestion, SuggestionRecord};
use crate::ids::NoteId;

impl IndexDb {
    /// Store (replace) the suggestion set for a note.
    pub fn store_suggestions(
        &self,
        note_id: &NoteId,
        suggestions: &[Suggestion],
        model_version: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<(), IndexError> {
        let payload = serde_json::to_string(suggestions)
            .map_err(|e| IndexError::Parse(format!("suggestions: {e}")))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO note_suggestions
                (note_id, suggestions, dismissed_ids, generated_at, model_version)
             VALUES (?1, ?2, '[]', ?3, ?4)
             ON CONFLICT(note_id) DO UPDATE SET
                suggestions = excluded.suggestions,
                generated_at = excluded.generated_at,
                model_version = excluded.model_version",
            params![note_id.as_str(), payload, generated_at.to_rfc3339(), model_version],
        )?;
        Ok(())
    }

    pub fn get_suggestions(
        &self,
        note_id: &NoteId,
    ) -> Result<Option<SuggestionRecord>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT note_id, suggestions, dismissed_ids, generated_at, model_version
             FROM note_suggestions WHERE note_id = ?1",
            [note_id.as_str()],
            |row| {
                let note_id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                let dismissed: String = row.get(2)?;
                let generated_at: Option<String> = row.get(3)?;
                Ok(SuggestionRecord {
                    note_id: note_id
                        .parse()
                        .map_err(|_| rusqlite::Error::InvalidQuery)?,
                    suggestions: serde_json::from_str(&payload).unwrap_or_else(|e| {
                        tracing::warn!("unparseable suggestions blob: {e}");
                        Vec::new()
                    }),
                    dismissed_ids: serde_json::from_str(&dismissed)
                        .unwrap_or_default(),
                    generated_at: generated_at.map(|s| parse_timestamp(&s)),
                    model_version: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Suggestions that have not been dismissed.
    pub fn active_suggestions(
        &self,
        note_id: &NoteId,
    ) -> Result<Vec<Suggestion>, IndexError> {
        let Some(record) = self.get_suggestions(note_id)? else {
            return Ok(Vec::new());
        };
        Ok(record
            .suggestions
            .into_iter()
            .filter(|s| !record.dismissed_ids.contains(&s.id))
            .collect())
    }

    /// Add a suggestion ID to the dismissed set. Returns false when the note
    /// has no suggestion record.
    pub fn dismiss_suggestion(
        &self,
        note_id: &NoteId,
        suggestion_id: &str,
    ) -> Result<bool, IndexError> {
        let Some(record) = self.get_suggestions(note_id)? else {
            return Ok(false);
        };
        let mut dismissed = record.dismissed_ids;
        if !dismissed.iter().any(|d| d == suggestion_id) {
            dismissed.push(suggestion_id.to_string());
        }
        let payload = serde_json::to_string(&dismissed)
            .map_err(|e| IndexError::Parse(format!("dismissed ids: {e}")))?;
        let conn = self.lock();
        conn.execute(
            "UPDATE note_suggestions SET dismissed_ids = ?1 WHERE note_id = ?2",
            params![payload, note_id.as_str()],
        )?;
        Ok(true)
    }

    pub fn clear_suggestions(&self, note_id: &NoteId) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn
            .execute("DELETE FROM note_suggestions WHERE note_id = ?1", [note_id.as_str()])?;
        Ok(rows > 0)
    }

    /// Whether suggestion generation applies to this note: the type's config
    /// must enable it and the note must not carry the `_suggestions_disabled`
    /// metadata flag.
    pub fn suggestions_enabled_for(&self, note_id: &NoteId) -> Result<bool, IndexError> {
        let Some(note) = self.get_note(note_id)? else {
            return Ok(false);
        };
        let type_enabled = self
            .get_type_description(&note.note_type)?
            .map(|d| d.def.suggestions_config.enabled)
            .unwrap_or(false);
        if !type_enabled {
            return Ok(false);
        }
        let disabled = matches!(
            self.get_metadata_value(note_id, "_suggestions_disabled")?,
            Some(MetadataValue::Boolean(true))
        );
        Ok(!disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::descriptions::{NoteTypeDef, SuggestionsConfig};
    use crate::index::types::NoteRecord;

    fn insert_note(db: &IndexDb, note_type: &str, filename: &str) -> NoteId {
        let now = Utc::now();
        let note = NoteRecord {
            id: NoteId::mint(),
            note_type: note_type.to_string(),
            filename: filename.to_string(),
            path: format!("{note_type}/{filename}"),
            title: String::new(),
            content: String::new(),
            created: now,
            updated: now,
            file_mtime_ms: 0,
            size_bytes: 0,
            content_hash: "h".to_string(),
            archived: false,
        };
        db.insert_note(&note).unwrap();
        note.id
    }

    fn sample(id: &str) -> Suggestion {
        Suggestion {
            id: id.to_string(),
            kind: "link".to_string(),
            text: format!("Consider linking {id}"),
            priority: Some(1),
            reasoning: None,
        }
    }

    #[test]
    fn store_get_dismiss() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "general", "a.md");

        db.store_suggestions(&id, &[sample("s1"), sample("s2")], "m-1", Utc::now())
            .unwrap();

        assert_eq!(db.active_suggestions(&id).unwrap().len(), 2);
        assert!(db.dismiss_suggestion(&id, "s1").unwrap());
        let active = db.active_suggestions(&id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "s2");

        // Dismissal survives regeneration of the same suggestion set.
        db.store_suggestions(&id, &[sample("s1"), sample("s3")], "m-2", Utc::now())
            .unwrap();
        let active = db.active_suggestions(&id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "s3");
    }

    #[test]
    fn dismiss_without_record_is_false() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "general", "a.md");
        assert!(!db.dismiss_suggestion(&id, "s1").unwrap());
    }

    #[test]
    fn eligibility_requires_type_opt_in() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "reading", "a.md");

        // No description: disabled by default.
        assert!(!db.suggestions_enabled_for(&id).unwrap());

        db.upsert_type_description(&NoteTypeDef {
            name: "reading".to_string(),
            suggestions_config: SuggestionsConfig { enabled: true, ..Default::default() },
            ..Default::default()
        })
        .unwrap();
        assert!(db.suggestions_enabled_for(&id).unwrap());

        // Per-note override wins.
        db.replace_metadata(
            &id,
            &[("_suggestions_disabled".to_string(), MetadataValue::Boolean(true))],
        )
        .unwrap();
        assert!(!db.suggestions_enabled_for(&id).unwrap());
    }

    #[test]
    fn cascade_deletes_with_note() {
        let db = IndexDb::open_in_memory().unwrap();
        let id = insert_note(&db, "general", "a.md");
        db.store_suggestions(&id, &[sample("s1")], "m", Utc::now()).unwrap();
        db.delete_note(&id).unwrap();
        assert!(db.get_suggestions(&id).unwrap().is_none());
    }
}
