//! Note-type descriptions: per-vault schema and guidance for each type.
//!
//! Descriptions started life as `<type>/_description.md` YAML files; the
//! 2.17.0 migration moved them into the `note_type_descriptions` table.
//! `format_description`/`parse_description` keep the on-disk YAML form
//! round-trippable for export and for the migration itself.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::db::{IndexDb, IndexError, parse_timestamp};
use super::types::UpdateOutcome;
use crate::vault::content_hash_str;

/// Declared type of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Date,
    /// Requires `constraints.options`.
    Select,
}

/// Constraints on a metadata field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One field in a type's metadata schema. Field order is meaningful and
/// preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<FieldConstraints>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSchema {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Per-type AI suggestion options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_guidance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_suggestions: Option<u32>,
}

/// The serializable payload of a type description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteTypeDef {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub agent_instructions: Vec<String>,
    #[serde(default)]
    pub metadata_schema: MetadataSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub editor_chips: Vec<String>,
    #[serde(default)]
    pub suggestions_config: SuggestionsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_review_mode: Option<String>,
}

/// A stored type description with its bookkeeping columns.
#[derive(Debug, Clone)]
pub struct TypeDescriptionRecord {
    pub def: NoteTypeDef,
    /// Hash of the formatted definition, used for optimistic locking.
    pub content_hash: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Render a definition to its YAML document form.
pub fn format_description(def: &NoteTypeDef) -> String {
    serde_yaml::to_string(def).unwrap_or_default()
}

/// Parse a YAML document back into a definition.
pub fn parse_description(raw: &str) -> Result<NoteTypeDef, IndexError> {
    serde_yaml::from_str(raw)
        .map_err(|e| IndexError::Parse(format!("invalid type description: {e}")))
}

/// Check schema well-formedness. `select` fields must declare options.
pub fn validate_metadata_schema(schema: &MetadataSchema) -> Result<(), IndexError> {
    for field in &schema.fields {
        if field.field_type == FieldType::Select {
            let has_options = field
                .constraints
                .as_ref()
                .and_then(|c| c.options.as_ref())
                .is_some_and(|opts| !opts.is_empty());
            if !has_options {
                return Err(IndexError::Validation(format!(
                    "Select field '{}' has no options defined",
                    field.name
                )));
            }
        }
    }
    Ok(())
}

impl IndexDb {
    /// Insert or replace a type description unconditionally.
    pub fn upsert_type_description(
        &self,
        def: &NoteTypeDef,
    ) -> Result<TypeDescriptionRecord, IndexError> {
        validate_metadata_schema(&def.metadata_schema)?;
        let now = Utc::now();
        let hash = content_hash_str(&format_description(def));
        let conn = self.lock();
        conn.execute(
            "INSERT INTO note_type_descriptions
                (name, purpose, agent_instructions, metadata_schema, icon,
                 editor_chips, suggestions_config, default_review_mode,
                 content_hash, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(name) DO UPDATE SET
                purpose = excluded.purpose,
                agent_instructions = excluded.agent_instructions,
                metadata_schema = excluded.metadata_schema,
                icon = excluded.icon,
                editor_chips = excluded.editor_chips,
                suggestions_config = excluded.suggestions_config,
                default_review_mode = excluded.default_review_mode,
                content_hash = excluded.content_hash,
                updated = excluded.updated",
            params![
                def.name,
                def.purpose,
                json_string(&def.agent_instructions),
                json_string(&def.metadata_schema),
                def.icon,
                json_string(&def.editor_chips),
                json_string(&def.suggestions_config),
                def.default_review_mode,
                hash,
                now.to_rfc3339(),
            ],
        )?;
        drop(conn);
        self.get_type_description(&def.name)?
            .ok_or_else(|| IndexError::NotFound(format!("note type: {}", def.name)))
    }

    /// Update a description guarded by its stored content hash. A stale hash
    /// affects zero rows and reports a conflict.
    pub fn update_type_description(
        &self,
        def: &NoteTypeDef,
        expected_hash: &str,
    ) -> Result<UpdateOutcome, IndexError> {
        validate_metadata_schema(&def.metadata_schema)?;
        let now = Utc::now();
        let hash = content_hash_str(&format_description(def));
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE note_type_descriptions SET
                purpose = ?1, agent_instructions = ?2, metadata_schema = ?3,
                icon = ?4, editor_chips = ?5, suggestions_config = ?6,
                default_review_mode = ?7, content_hash = ?8, updated = ?9
             WHERE name = ?10 AND content_hash = ?11",
            params![
                def.purpose,
                json_string(&def.agent_instructions),
                json_string(&def.metadata_schema),
                def.icon,
                json_string(&def.editor_chips),
                json_string(&def.suggestions_config),
                def.default_review_mode,
                hash,
                now.to_rfc3339(),
                def.name,
                expected_hash,
            ],
        )?;
        if rows > 0 { Ok(UpdateOutcome::Applied) } else { Ok(UpdateOutcome::Conflict) }
    }

    pub fn get_type_description(
        &self,
        name: &str,
    ) -> Result<Option<TypeDescriptionRecord>, IndexError> {
        let conn = self.lock();
        conn.query_row(
            &format!("{DESC_SELECT} WHERE name = ?1"),
            [name],
            row_to_description,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_type_descriptions(
        &self,
    ) -> Result<Vec<TypeDescriptionRecord>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{DESC_SELECT} ORDER BY name"))?;
        let records = stmt
            .query_map([], row_to_description)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    pub fn delete_type_description(&self, name: &str) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows =
            conn.execute("DELETE FROM note_type_descriptions WHERE name = ?1", [name])?;
        Ok(rows > 0)
    }
}

const DESC_SELECT: &str =
    "SELECT name, purpose, agent_instructions, metadata_schema, icon, editor_chips,
            suggestions_config, default_review_mode, content_hash, created, updated
     FROM note_type_descriptions";

fn json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Deserialize a JSON column, degrading to the default on parse failure.
fn json_column<T: for<'de> Deserialize<'de> + Default>(
    raw: Option<String>,
    what: &str,
) -> T {
    match raw {
        None => T::default(),
        Some(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!("unparseable {what} column, using default: {e}");
            T::default()
        }),
    }
}

fn row_to_description(
    row: &rusqlite::Row,
) -> Result<TypeDescriptionRecord, rusqlite::Error> {
    let created: String = row.get(9)?;
    let updated: String = row.get(10)?;
    Ok(TypeDescriptionRecord {
        def: NoteTypeDef {
            name: row.get(0)?,
            purpose: row.get(1)?,
            agent_instructions: json_column(row.get(2)?, "agent_instructions"),
            metadata_schema: json_column(row.get(3)?, "metadata_schema"),
            icon: row.get(4)?,
            editor_chips: json_column(row.get(5)?, "editor_chips"),
            suggestions_config: json_column(row.get(6)?, "suggestions_config"),
            default_review_mode: row.get(7)?,
        },
        content_hash: row.get(8)?,
        created: parse_timestamp(&created),
        updated: parse_timestamp(&updated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_def() -> NoteTypeDef {
        NoteTypeDef {
            name: "reading".to_string(),
            purpose: "Track books and papers".to_string(),
            agent_instructions: vec![
                "Summarize the key argument".to_string(),
                "Suggest related notes".to_string(),
            ],
            metadata_schema: MetadataSchema {
                fields: vec![
                    FieldDef {
                        name: "author".to_string(),
                        field_type: FieldType::String,
                        required: true,
                        description: Some("Primary author".to_string()),
                        constraints: None,
                    },
                    FieldDef {
                        name: "status".to_string(),
                        field_type: FieldType::Select,
                        required: false,
                        description: None,
                        constraints: Some(FieldConstraints {
                            options: Some(vec![
                                "to-read".to_string(),
                                "reading".to_string(),
                                "done".to_string(),
                            ]),
                            ..Default::default()
                        }),
                    },
                ],
            },
            icon: Some("book".to_string()),
            editor_chips: vec!["author".to_string(), "status".to_string()],
            suggestions_config: SuggestionsConfig {
                enabled: true,
                prompt_guidance: Some("Focus on connections".to_string()),
                suggestion_types: None,
                max_suggestions: Some(3),
            },
            default_review_mode: Some("spaced".to_string()),
        }
    }

    #[test]
    fn format_parse_round_trip_preserves_every_field() {
        let def = sample_def();
        let formatted = format_description(&def);
        let reparsed = parse_description(&formatted).unwrap();
        assert_eq!(reparsed, def);
    }

    #[test]
    fn select_without_options_is_rejected() {
        let mut def = sample_def();
        def.metadata_schema.fields[1].constraints = None;
        let db = IndexDb::open_in_memory().unwrap();
        let err = db.upsert_type_description(&def).unwrap_err();
        match err {
            IndexError::Validation(msg) => {
                assert_eq!(msg, "Select field 'status' has no options defined");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn upsert_and_get() {
        let db = IndexDb::open_in_memory().unwrap();
        let stored = db.upsert_type_description(&sample_def()).unwrap();
        assert_eq!(stored.def, sample_def());
        assert!(!stored.content_hash.is_empty());

        let fetched = db.get_type_description("reading").unwrap().unwrap();
        assert_eq!(fetched.def.purpose, "Track books and papers");
    }

    #[test]
    fn optimistic_update_detects_stale_hash() {
        let db = IndexDb::open_in_memory().unwrap();
        let stored = db.upsert_type_description(&sample_def()).unwrap();

        let mut changed = sample_def();
        changed.purpose = "Updated purpose".to_string();
        let outcome =
            db.update_type_description(&changed, &stored.content_hash).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        // The old hash no longer matches.
        let outcome =
            db.update_type_description(&changed, &stored.content_hash).unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);
    }

    #[test]
    fn corrupt_json_column_degrades_to_default() {
        let db = IndexDb::open_in_memory().unwrap();
        db.upsert_type_description(&sample_def()).unwrap();
        {
            let conn = db.lock();
            conn.execute(
                "UPDATE note_type_descriptions SET metadata_schema = 'not json'
                 WHERE name = 'reading'",
                [],
            )
            .unwrap();
        }
        let fetched = db.get_type_description("reading").unwrap().unwrap();
        assert!(fetched.def.metadata_schema.fields.is_empty());
        assert_eq!(fetched.def.name, "reading");
    }
}
