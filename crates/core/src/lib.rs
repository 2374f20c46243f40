//! flint-core: the note engine behind a flint vault.
//!
//! A vault is a directory of markdown notes (one subdirectory per note
//! type) with a SQLite index in its `.flint-note` sidecar. The index is the
//! queryable source of truth; this crate keeps it and the files mutually
//! consistent under both API-driven and editor-driven mutation, maintains a
//! rename-proof wikilink graph, schedules spaced reviews, and migrates old
//! vaults forward.

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod frontmatter;
pub mod hierarchy;
pub mod ids;
pub mod index;
pub mod migration;
pub mod queue;
pub mod review;
pub mod sync;
pub mod vault;
pub mod watcher;
pub mod wikilink;
pub mod workflow;

pub use config::VaultConfig;
pub use engine::{EngineError, EngineOptions, NewNote, NoteEngine, NoteUpdate, VaultStats};
pub use ids::{NoteId, is_note_id};
pub use index::{IndexDb, IndexError, NoteRecord, UpdateOutcome};
pub use migration::{MigrationReport, MigrationRunner};
pub use queue::{FileWriteQueue, QueueOptions};
pub use review::ReviewScheduler;
pub use sync::{SyncReconciler, SyncStats};
pub use watcher::{VaultEvent, VaultEventKind, VaultWatcher, WatcherOptions};
pub use workflow::WorkflowManager;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
