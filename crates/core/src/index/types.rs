//! Row types for the vault index.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::NoteId;

/// A note row. `(note_type, filename)` is unique per vault; `id` is globally
/// unique and immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    pub note_type: String,
    /// Basename with the `.md` extension.
    pub filename: String,
    /// Vault-relative path, forward slashes on every OS.
    pub path: String,
    /// May be empty; titles are never synthesized from filenames.
    pub title: String,
    /// Markdown body (frontmatter excluded).
    pub content: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// On-disk modification time, unix milliseconds.
    pub file_mtime_ms: i64,
    pub size_bytes: i64,
    /// Hash of the on-disk document (frontmatter plus body).
    pub content_hash: String,
    pub archived: bool,
}

/// Fields that change on a content update.
#[derive(Debug, Clone)]
pub struct NoteChange {
    /// `None` leaves the stored title untouched.
    pub title: Option<String>,
    pub content: String,
    pub updated: DateTime<Utc>,
    pub file_mtime_ms: i64,
    pub size_bytes: i64,
    pub content_hash: String,
}

/// Result of an optimistically locked update. A conflict is a value, not an
/// error: the statement simply affected zero rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Conflict,
}

/// A metadata value with its original YAML type preserved as a tag.
///
/// Values are persisted as strings in `note_metadata.value`; the
/// `value_type` column carries the tag that coerces them back on read.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<serde_json::Value>),
    Date(String),
}

impl MetadataValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Array(_) => "array",
            Self::Date(_) => "date",
        }
    }

    /// The stored string form.
    pub fn to_stored(&self) -> String {
        match self {
            Self::String(s) | Self::Date(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::Boolean(b) => b.to_string(),
            Self::Array(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    /// Coerce a stored string back using its tag. Unknown tags and
    /// unparseable payloads degrade to `String`.
    pub fn from_stored(tag: &str, raw: &str) -> Self {
        match tag {
            "number" => match raw.parse::<f64>() {
                Ok(n) => Self::Number(n),
                Err(_) => Self::String(raw.to_string()),
            },
            "boolean" => Self::Boolean(raw == "true"),
            "array" => match serde_json::from_str(raw) {
                Ok(items) => Self::Array(items),
                Err(_) => Self::String(raw.to_string()),
            },
            "date" => Self::Date(raw.to_string()),
            _ => Self::String(raw.to_string()),
        }
    }

    /// Classify a YAML scalar into a tagged value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Bool(b) => Self::Boolean(*b),
            serde_yaml::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_yaml::Value::Sequence(seq) => Self::Array(
                seq.iter()
                    .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
                    .collect(),
            ),
            serde_yaml::Value::String(s) if looks_like_date(s) => Self::Date(s.clone()),
            other => Self::String(
                other.as_str().map(str::to_string).unwrap_or_else(|| {
                    serde_yaml::to_string(other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default()
                }),
            ),
        }
    }

    /// Convert back to a YAML value for frontmatter emission.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Self::String(s) | Self::Date(s) => serde_yaml::Value::String(s.clone()),
            Self::Boolean(b) => serde_yaml::Value::Bool(*b),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    serde_yaml::Value::Number((*n as i64).into())
                } else {
                    serde_yaml::Value::Number((*n).into())
                }
            }
            Self::Array(items) => serde_yaml::Value::Sequence(
                items
                    .iter()
                    .map(|v| serde_yaml::to_value(v).unwrap_or(serde_yaml::Value::Null))
                    .collect(),
            ),
        }
    }
}

fn looks_like_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}

/// An internal wikilink edge. `target_note_id` is NULL while the link is
/// broken; `target_title` keeps the written reference so the link can be
/// repaired when a matching note appears.
#[derive(Debug, Clone)]
pub struct NoteLink {
    pub id: Option<i64>,
    pub source_id: NoteId,
    pub target_id: Option<NoteId>,
    /// The target as written: a title, a `type/filename` reference, or an ID.
    pub target_title: String,
    /// Display text, when the link carried one.
    pub link_text: Option<String>,
    /// 1-based line number in the source body.
    pub line_number: u32,
    pub created: DateTime<Utc>,
}

/// Kind of an external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalLinkKind {
    Url,
    Image,
    Embed,
}

impl ExternalLinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Image => "image",
            Self::Embed => "embed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "url" => Some(Self::Url),
            "image" => Some(Self::Image),
            "embed" => Some(Self::Embed),
            _ => None,
        }
    }
}

/// A link from a note to something outside the vault.
#[derive(Debug, Clone)]
pub struct ExternalLink {
    pub id: Option<i64>,
    pub note_id: NoteId,
    pub url: String,
    pub title: Option<String>,
    pub line_number: u32,
    pub link_type: ExternalLinkKind,
}

/// Query filter for listing notes.
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    pub note_type: Option<String>,
    pub include_archived: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Review item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Active,
    /// Terminal: excluded from every future due list.
    Retired,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

/// One completed review in an item's history.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHistoryEntry {
    pub date: DateTime<Utc>,
    pub session_number: i64,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl<'de> Deserialize<'de> for ReviewHistoryEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Legacy entries carry `passed: true/false` instead of a rating;
        // they coerce to 2/1 (the pass-quality distinction is lost).
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            date: DateTime<Utc>,
            #[serde(default)]
            session_number: i64,
            rating: Option<u8>,
            passed: Option<bool>,
            prompt: Option<String>,
            response: Option<String>,
            feedback: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let rating = match (raw.rating, raw.passed) {
            (Some(r), _) => r,
            (None, Some(true)) => 2,
            (None, Some(false)) => 1,
            (None, None) => 1,
        };
        Ok(Self {
            date: raw.date,
            session_number: raw.session_number,
            rating,
            prompt: raw.prompt,
            response: raw.response,
            feedback: raw.feedback,
        })
    }
}

/// Per-note review scheduling state.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub note_id: NoteId,
    pub enabled: bool,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_session_number: i64,
    /// Spacing interval measured in sessions.
    pub current_interval: i64,
    pub status: ReviewStatus,
    pub review_count: i64,
    pub history: Vec<ReviewHistoryEntry>,
}

impl ReviewItem {
    /// Fresh item due at the given session.
    pub fn new(note_id: NoteId, due_session: i64) -> Self {
        Self {
            note_id,
            enabled: true,
            last_reviewed: None,
            next_session_number: due_session,
            current_interval: 1,
            status: ReviewStatus::Active,
            review_count: 0,
            history: Vec::new(),
        }
    }
}

/// Vault-wide review scheduling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConfig {
    pub session_size: u32,
    pub sessions_per_week: u32,
    pub max_interval_sessions: i64,
    pub min_interval_days: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            session_size: 5,
            sessions_per_week: 7,
            max_interval_sessions: 15,
            min_interval_days: 1,
        }
    }
}

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Recurrence frequency for recurring workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// Recurrence rule. `day_of_week` is 0 = Sunday through 6 = Saturday;
/// `day_of_month` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSpec {
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
}

/// A named task-like entity with optional scheduling.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    pub status: WorkflowStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub recurring: Option<RecurringSpec>,
    pub last_completed: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Kind of supplementary material attached to a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Text,
    Code,
    NoteReference,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::NoteReference => "note_reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "code" => Some(Self::Code),
            "note_reference" => Some(Self::NoteReference),
            _ => None,
        }
    }
}

/// Ordered supplementary material on a workflow.
#[derive(Debug, Clone)]
pub struct SupplementaryMaterial {
    pub id: Option<i64>,
    pub workflow_id: i64,
    pub position: i64,
    pub kind: MaterialKind,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

impl SupplementaryMaterial {
    /// Serialized size in bytes: content plus metadata JSON.
    pub fn serialized_size(&self) -> usize {
        let meta_len = self
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok())
            .map(|s| s.len())
            .unwrap_or(0);
        self.content.len() + meta_len
    }
}

/// One row in a workflow's append-only completion log.
#[derive(Debug, Clone)]
pub struct WorkflowCompletion {
    pub id: i64,
    pub workflow_id: i64,
    pub completed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A single AI suggestion attached to a note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// The persisted suggestion set for a note.
#[derive(Debug, Clone)]
pub struct SuggestionRecord {
    pub note_id: NoteId,
    pub suggestions: Vec<Suggestion>,
    pub dismissed_ids: Vec<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub model_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_through_storage() {
        let cases = vec![
            MetadataValue::String("hello".into()),
            MetadataValue::Number(42.0),
            MetadataValue::Number(2.5),
            MetadataValue::Boolean(true),
            MetadataValue::Array(vec!["a".into(), "b".into()]),
            MetadataValue::Date("2024-03-01".into()),
        ];
        for value in cases {
            let restored = MetadataValue::from_stored(value.type_tag(), &value.to_stored());
            assert_eq!(restored, value);
        }
    }

    #[test]
    fn yaml_classification() {
        let v = MetadataValue::from_yaml(&serde_yaml::Value::Bool(true));
        assert_eq!(v.type_tag(), "boolean");

        let v = MetadataValue::from_yaml(&serde_yaml::Value::String("2024-01-15".into()));
        assert_eq!(v.type_tag(), "date");

        let v = MetadataValue::from_yaml(&serde_yaml::Value::String("plain".into()));
        assert_eq!(v.type_tag(), "string");

        let seq = serde_yaml::Value::Sequence(vec![serde_yaml::Value::String("x".into())]);
        assert_eq!(MetadataValue::from_yaml(&seq).type_tag(), "array");
    }

    #[test]
    fn bad_stored_payload_degrades_to_string() {
        let v = MetadataValue::from_stored("array", "not json");
        assert_eq!(v, MetadataValue::String("not json".into()));
        let v = MetadataValue::from_stored("number", "NaN-ish");
        assert_eq!(v, MetadataValue::String("NaN-ish".into()));
    }

    #[test]
    fn legacy_passed_history_coerces_to_rating() {
        let json = r#"[
            {"date": "2024-01-01T00:00:00Z", "sessionNumber": 3, "passed": true},
            {"date": "2024-01-02T00:00:00Z", "sessionNumber": 4, "passed": false},
            {"date": "2024-01-03T00:00:00Z", "sessionNumber": 5, "rating": 3}
        ]"#;
        let entries: Vec<ReviewHistoryEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].rating, 2);
        assert_eq!(entries[1].rating, 1);
        assert_eq!(entries[2].rating, 3);
    }

    #[test]
    fn material_size_counts_metadata() {
        let material = SupplementaryMaterial {
            id: None,
            workflow_id: 1,
            position: 0,
            kind: MaterialKind::Text,
            content: "abcd".into(),
            metadata: Some(serde_json::json!({"k": "v"})),
        };
        assert_eq!(material.serialized_size(), 4 + r#"{"k":"v"}"#.len());
    }
}
