//! The vault index: SQLite as the primary queryable source of truth.
//!
//! Everything queryable about a vault lives here: notes and their metadata,
//! the wikilink graph, note-type descriptions, review scheduling state,
//! workflows, hierarchy edges, suggestions, and UI state. The on-disk
//! markdown files and this index are kept mutually consistent by the sync
//! reconciler and the engine; no component mutates notes behind the store's
//! back except migrations, which take exclusive access.

pub mod db;
pub mod descriptions;
mod hierarchy;
mod links;
mod review;
pub mod schema;
mod search;
mod suggestions;
pub mod types;
mod workflows;

pub use db::{IndexDb, IndexError, PathEntry};
pub use descriptions::{
    FieldConstraints, FieldDef, FieldType, MetadataSchema, NoteTypeDef,
    SuggestionsConfig, TypeDescriptionRecord, format_description, parse_description,
    validate_metadata_schema,
};
pub use schema::{CURRENT_VERSION, VERSION_CHAIN};
pub use types::{
    ExternalLink, ExternalLinkKind, Frequency, MaterialKind, MetadataValue, NoteChange,
    NoteLink, NoteQuery, NoteRecord, RecurringSpec, ReviewConfig, ReviewHistoryEntry,
    ReviewItem, ReviewStatus, Suggestion, SuggestionRecord, SupplementaryMaterial,
    UpdateOutcome, Workflow, WorkflowCompletion, WorkflowStatus,
};
