//! Review item and review state storage.

use rusqlite::{OptionalExtension, params};

use super::db::{IndexDb, IndexError, parse_timestamp};
use super::types::{ReviewConfig, ReviewHistoryEntry, ReviewItem, ReviewStatus};
use crate::ids::NoteId;

impl IndexDb {
    /// Write a review item row, creating or replacing it.
    pub fn upsert_review_item(&self, item: &ReviewItem) -> Result<(), IndexError> {
        let history = serde_json::to_string(&item.history)
            .map_err(|e| IndexError::Parse(format!("review history: {e}")))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO review_items
                (note_id, enabled, last_reviewed, next_session_number,
                 current_interval, status, review_count, review_history)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(note_id) DO UPDATE SET
                enabled = excluded.enabled,
                last_reviewed = excluded.last_reviewed,
                next_session_number = excluded.next_session_number,
                current_interval = excluded.current_interval,
                status = excluded.status,
                review_count = excluded.review_count,
                review_history = excluded.review_history",
            params![
                item.note_id.as_str(),
                item.enabled as i64,
                item.last_reviewed.map(|d| d.to_rfc3339()),
                item.next_session_number,
                item.current_interval,
                item.status.as_str(),
                item.review_count,
                history,
            ],
        )?;
        Ok(())
    }

    pub fn get_review_item(
        &self,
        note_id: &NoteId,
    ) -> Result<Option<ReviewItem>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            &format!("{REVIEW_SELECT} WHERE note_id = ?1"),
            [note_id.as_str()],
            row_to_review_item,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Items due now: enabled, active, and scheduled at or before the
    /// current session.
    pub fn due_review_items(
        &self,
        current_session: i64,
    ) -> Result<Vec<ReviewItem>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{REVIEW_SELECT}
             WHERE enabled = 1 AND status = 'active' AND next_session_number <= ?1
             ORDER BY next_session_number ASC, note_id ASC"
        ))?;
        let items = stmt
            .query_map([current_session], row_to_review_item)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    pub fn set_review_enabled(
        &self,
        note_id: &NoteId,
        enabled: bool,
    ) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE review_items SET enabled = ?1 WHERE note_id = ?2",
            params![enabled as i64, note_id.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub fn current_session_number(&self) -> Result<i64, IndexError> {
        let conn = self.lock();
        let session: Option<i64> = conn
            .query_row(
                "SELECT current_session_number FROM review_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(session.unwrap_or(1))
    }

    pub fn set_session_number(&self, session: i64) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO review_state (id, current_session_number) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET current_session_number = excluded.current_session_number",
            [session],
        )?;
        Ok(())
    }

    pub fn review_config(&self) -> Result<ReviewConfig, IndexError> {
        let conn = self.lock();
        let config = conn
            .query_row(
                "SELECT session_size, sessions_per_week, max_interval_sessions,
                        min_interval_days
                 FROM review_config WHERE id = 1",
                [],
                |row| {
                    Ok(ReviewConfig {
                        session_size: row.get(0)?,
                        sessions_per_week: row.get(1)?,
                        max_interval_sessions: row.get(2)?,
                        min_interval_days: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(config.unwrap_or_default())
    }

    pub fn set_review_config(&self, config: &ReviewConfig) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO review_config
                (id, session_size, sessions_per_week, max_interval_sessions, min_interval_days)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                session_size = excluded.session_size,
                sessions_per_week = excluded.sessions_per_week,
                max_interval_sessions = excluded.max_interval_sessions,
                min_interval_days = excluded.min_interval_days",
            params![
                config.session_size,
                config.sessions_per_week,
                config.max_interval_sessions,
                config.min_interval_days,
            ],
        )?;
        Ok(())
    }
}

const REVIEW_SELECT: &str =
    "SELECT note_id, enabled, last_reviewed, next_session_number, current_interval,
            status, review_count, review_history
     FROM review_items";

fn row_to_review_item(row: &rusqlite::Row) -> Result<ReviewItem, rusqlite::Error> {
    let note_id: String = row.get(0)?;
    let last_reviewed: Option<String> = row.get(2)?;
    let status: String = row.get(5)?;
    let history_raw: String = row.get(7)?;

    // History blobs may predate the rating scheme; the entry deserializer
    // coerces legacy `passed` flags. A wholly unparseable blob degrades to
    // an empty history rather than failing the read.
    let history: Vec<ReviewHistoryEntry> =
        serde_json::from_str(&history_raw).unwrap_or_else(|e| {
            tracing::warn!("unparseable review history for {note_id}: {e}");
            Vec::new()
        });

    Ok(ReviewItem {
        note_id: note_id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        enabled: row.get::<_, i64>(1)? != 0,
        last_reviewed: last_reviewed.map(|s| parse_timestamp(&s)),
        next_session_number: row.get(3)?,
        current_interval: row.get(4)?,
        status: ReviewStatus::parse(&status).unwrap_or(ReviewStatus::Active),
        review_count: row.get(6)?,
        history,
    })
}
