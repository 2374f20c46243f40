//! Stable note identifiers.
//!
//! Every note carries an immutable ID of the form `n-` followed by eight
//! lowercase hex characters (four random bytes). IDs are independent of the
//! note's filename and title, which is what lets wikilinks survive renames.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static NOTE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^n-[0-9a-f]{8}$").unwrap());

/// Error returned when parsing a string that is not a valid note ID.
#[derive(Debug, Error)]
#[error("invalid note id: {0}")]
pub struct InvalidNoteId(pub String);

/// An immutable note identifier (`n-` + 8 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Mint a fresh random ID. Uniqueness is enforced at insert time; callers
    /// regenerate on a UNIQUE violation.
    pub fn mint() -> Self {
        Self(format!("n-{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = InvalidNoteId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_note_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidNoteId(s.to_string()))
        }
    }
}

/// Check whether a string has the exact shape of a note ID.
pub fn is_note_id(s: &str) -> bool {
    NOTE_ID_RE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_valid() {
        for _ in 0..100 {
            let id = NoteId::mint();
            assert!(is_note_id(id.as_str()), "bad id: {}", id);
        }
    }

    #[test]
    fn accepts_exact_shape_only() {
        assert!(is_note_id("n-12345678"));
        assert!(is_note_id("n-deadbeef"));
        assert!(!is_note_id("n-1234567"));
        assert!(!is_note_id("n-123456789"));
        assert!(!is_note_id("n-DEADBEEF"));
        assert!(!is_note_id("m-12345678"));
        assert!(!is_note_id("n-1234567g"));
        assert!(!is_note_id(" n-12345678"));
        assert!(!is_note_id(""));
    }

    #[test]
    fn parse_round_trips() {
        let id: NoteId = "n-0a1b2c3d".parse().unwrap();
        assert_eq!(id.as_str(), "n-0a1b2c3d");
        assert_eq!(id.to_string(), "n-0a1b2c3d");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("note/a".parse::<NoteId>().is_err());
        assert!("n-XYZ".parse::<NoteId>().is_err());
    }
}
