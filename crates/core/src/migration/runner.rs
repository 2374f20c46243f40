//! Ordered, idempotent schema migrations.
//!
//! Registered migrations form a linear chain; `check_and_migrate` applies
//! every step after the caller's current version that is not yet recorded in
//! `schema_version`. Each step validates preconditions, applies inside a
//! transaction, validates postconditions, and records its version before
//! commit. A failing step aborts the run and leaves the database at the
//! last fully applied version.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;

use super::steps::registry;
use crate::index::schema::{self, SchemaError, VERSION_CHAIN};
use crate::index::IndexDb;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("unknown schema version: {0}")]
    UnknownVersion(String),

    #[error("migration {version} precondition failed: {message}")]
    Precondition { version: String, message: String },

    #[error("migration {version} postcondition failed: {message}")]
    Postcondition { version: String, message: String },

    #[error("migration file rewrite failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Context handed to every step.
pub struct MigrationContext<'a> {
    pub vault_root: &'a Path,
}

/// One entry in the migration chain.
pub trait MigrationStep {
    /// The version this step migrates *to*.
    fn version(&self) -> &'static str;

    fn validate_pre(&self, conn: &Connection) -> Result<(), MigrationError> {
        let _ = conn;
        Ok(())
    }

    fn apply(
        &self,
        conn: &Connection,
        ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError>;

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        let _ = conn;
        Ok(())
    }
}

/// Result of a `check_and_migrate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: bool,
    pub executed_migrations: Vec<String>,
}

/// Runs the migration chain against one vault.
pub struct MigrationRunner {
    db: Arc<IndexDb>,
    vault_root: PathBuf,
}

impl MigrationRunner {
    pub fn new(db: Arc<IndexDb>, vault_root: PathBuf) -> Self {
        Self { db, vault_root }
    }

    /// Bring the database from `current_version` to the newest version.
    ///
    /// Re-running at the newest version is a no-op reporting
    /// `{migrated: false, executed_migrations: []}`.
    pub fn check_and_migrate(
        &self,
        current_version: &str,
    ) -> Result<MigrationReport, MigrationError> {
        let current_pos = VERSION_CHAIN
            .iter()
            .position(|v| *v == current_version)
            .ok_or_else(|| MigrationError::UnknownVersion(current_version.to_string()))?;

        // Exclusive access for the whole run; migrations are the one caller
        // allowed to bypass the typed store API.
        let mut conn = self.db.lock();
        schema::ensure_version_table(&conn)?;
        // The declared current version and its ancestors count as applied.
        for version in &VERSION_CHAIN[..=current_pos] {
            schema::record_version(&conn, version)?;
        }
        let applied: HashSet<String> =
            schema::applied_versions(&conn)?.into_iter().collect();

        let ctx = MigrationContext { vault_root: &self.vault_root };
        let mut executed = Vec::new();

        for step in registry() {
            let version = step.version();
            let step_pos = VERSION_CHAIN
                .iter()
                .position(|v| *v == version)
                .ok_or_else(|| MigrationError::UnknownVersion(version.to_string()))?;
            if step_pos <= current_pos || applied.contains(version) {
                continue;
            }

            tracing::info!("applying migration {version}");
            step.validate_pre(&conn)?;

            let tx = conn.transaction()?;
            tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
            step.apply(&tx, &ctx)?;
            step.validate_post(&tx)?;
            schema::record_version(&tx, version)?;
            tx.commit()?;

            executed.push(version.to_string());
        }

        Ok(MigrationReport { migrated: !executed.is_empty(), executed_migrations: executed })
    }
}

/// True when a table exists.
pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::CURRENT_VERSION;

    #[test]
    fn rerun_at_current_is_noop() {
        let db = Arc::new(IndexDb::open_in_memory().unwrap());
        let dir = tempfile::TempDir::new().unwrap();
        let runner = MigrationRunner::new(db, dir.path().to_path_buf());

        let report = runner.check_and_migrate(CURRENT_VERSION).unwrap();
        assert_eq!(
            report,
            MigrationReport { migrated: false, executed_migrations: vec![] }
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let db = Arc::new(IndexDb::open_in_memory().unwrap());
        let dir = tempfile::TempDir::new().unwrap();
        let runner = MigrationRunner::new(db, dir.path().to_path_buf());

        let err = runner.check_and_migrate("9.9.9");
        assert!(matches!(err, Err(MigrationError::UnknownVersion(_))));
    }
}
