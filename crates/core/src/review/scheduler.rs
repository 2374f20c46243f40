//! Session-based spaced-engagement scheduling.
//!
//! Time is counted in work sessions, not days: a shared session counter
//! advances when the user sits down to review, and each item's interval is
//! measured in sessions. Ratings 1-3 scale the interval by 0.5/1.5/2.5 and
//! move the next due session forward by the rounded multiplier; rating 4
//! retires the item for good.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::ids::NoteId;
use crate::index::types::{ReviewHistoryEntry, ReviewItem, ReviewStatus};
use crate::index::{IndexDb, IndexError};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("index database error: {0}")]
    Index(#[from] IndexError),

    #[error("review item not found for note {0}")]
    NotFound(NoteId),

    #[error("invalid rating {0}, expected 1-4")]
    InvalidRating(u8),
}

/// Sessions-in-the-future offset used when retiring an item.
const RETIRED_SESSION_OFFSET: i64 = 1_000_000;

fn multiplier(rating: u8) -> f64 {
    match rating {
        1 => 0.5,
        2 => 1.5,
        _ => 2.5,
    }
}

/// Scheduler over the vault's review items.
pub struct ReviewScheduler {
    db: Arc<IndexDb>,
}

impl ReviewScheduler {
    pub fn new(db: Arc<IndexDb>) -> Self {
        Self { db }
    }

    /// Enroll a note for review, due at the current session. Idempotent:
    /// an already-enrolled note keeps its row (re-enabling it if disabled).
    pub fn enable_review(&self, note_id: &NoteId) -> Result<ReviewItem, ReviewError> {
        if let Some(existing) = self.db.get_review_item(note_id)? {
            if !existing.enabled {
                self.db.set_review_enabled(note_id, true)?;
            }
            return self
                .db
                .get_review_item(note_id)?
                .ok_or_else(|| ReviewError::NotFound(note_id.clone()));
        }
        let item = ReviewItem::new(note_id.clone(), self.db.current_session_number()?);
        self.db.upsert_review_item(&item)?;
        Ok(item)
    }

    /// Returns false when the note was not enrolled.
    pub fn disable_review(&self, note_id: &NoteId) -> Result<bool, ReviewError> {
        Ok(self.db.set_review_enabled(note_id, false)?)
    }

    /// Items due in the current session: enabled, active, and scheduled at
    /// or before the shared counter.
    pub fn get_notes_for_review(&self) -> Result<Vec<ReviewItem>, ReviewError> {
        let current = self.db.current_session_number()?;
        Ok(self.db.due_review_items(current)?)
    }

    /// Record a completed review and reschedule (or retire) the item.
    pub fn complete_review(
        &self,
        note_id: &NoteId,
        rating: u8,
        response: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<ReviewItem, ReviewError> {
        if !(1..=4).contains(&rating) {
            return Err(ReviewError::InvalidRating(rating));
        }
        let mut item = self
            .db
            .get_review_item(note_id)?
            .ok_or_else(|| ReviewError::NotFound(note_id.clone()))?;

        let current = self.db.current_session_number()?;
        let config = self.db.review_config()?;
        let now = Utc::now();

        item.history.push(ReviewHistoryEntry {
            date: now,
            session_number: current,
            rating,
            prompt: prompt.map(str::to_string),
            response: response.map(str::to_string),
            feedback: None,
        });
        item.review_count += 1;
        item.last_reviewed = Some(now);

        if rating == 4 {
            item.status = ReviewStatus::Retired;
            item.next_session_number = current + RETIRED_SESSION_OFFSET;
        } else {
            let mult = multiplier(rating);
            let scaled = (item.current_interval as f64 * mult).round() as i64;
            item.current_interval = scaled.clamp(1, config.max_interval_sessions);
            item.next_session_number = current + mult.round() as i64;
        }

        self.db.upsert_review_item(&item)?;
        Ok(item)
    }

    /// Advance the shared session counter, returning the new value.
    pub fn increment_session_number(&self) -> Result<i64, ReviewError> {
        let next = self.db.current_session_number()? + 1;
        self.db.set_session_number(next)?;
        Ok(next)
    }

    pub fn current_session(&self) -> Result<i64, ReviewError> {
        Ok(self.db.current_session_number()?)
    }
}

/// Calendar estimate for when a session will happen, assuming a steady
/// sessions-per-week pace from `base_date`.
pub fn estimate_session_date(
    target_session: i64,
    current_session: i64,
    sessions_per_week: u32,
    base_date: DateTime<Utc>,
) -> DateTime<Utc> {
    let per_week = sessions_per_week.max(1) as f64;
    let days = (target_session - current_session) as f64 / per_week * 7.0;
    base_date + Duration::milliseconds((days * 86_400_000.0) as i64)
}
