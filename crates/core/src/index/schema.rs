//! SQLite schema definition.
//!
//! The schema is versioned by the `schema_version` table, one row per
//! applied version. A fresh database is created directly at the newest
//! schema with the full version chain recorded; pre-2.x databases reach it
//! through the migration runner.

use rusqlite::Connection;
use thiserror::Error;

/// Ordered version chain. The last entry is the current schema.
pub const VERSION_CHAIN: [&str; 9] = [
    "1.0.0", "1.1.0", "2.0.0", "2.0.1", "2.1.0", "2.2.0", "2.3.0", "2.4.0", "2.17.0",
];

/// The version a fresh database is created at.
pub const CURRENT_VERSION: &str = "2.17.0";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// True when the database contains no user tables at all.
pub fn is_fresh(conn: &Connection) -> Result<bool, SchemaError> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(tables == 0)
}

/// Create the `schema_version` table when missing.
pub fn ensure_version_table(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version TEXT PRIMARY KEY,
            applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// Record a version as applied (idempotent).
pub fn record_version(conn: &Connection, version: &str) -> Result<(), SchemaError> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// The set of versions recorded as applied, in chain order.
pub fn applied_versions(conn: &Connection) -> Result<Vec<String>, SchemaError> {
    ensure_version_table(conn)?;
    let mut stmt = conn.prepare("SELECT version FROM schema_version")?;
    let mut applied: Vec<String> =
        stmt.query_map([], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    applied.sort_by_key(|v| VERSION_CHAIN.iter().position(|c| *c == v.as_str()));
    Ok(applied)
}

/// Create every table, index, and trigger of the current schema and stamp
/// the whole version chain as applied.
pub fn create_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(CREATE_SCHEMA_SQL)?;
    ensure_version_table(conn)?;
    for version in VERSION_CHAIN {
        record_version(conn, version)?;
    }
    Ok(())
}

pub const CREATE_SCHEMA_SQL: &str = r#"
-- Notes: one row per markdown file under a type directory.
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    filename TEXT NOT NULL,
    path TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    file_mtime INTEGER NOT NULL DEFAULT 0,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL DEFAULT '',
    archived INTEGER NOT NULL DEFAULT 0,
    UNIQUE (type, filename)
);
CREATE INDEX IF NOT EXISTS idx_notes_path ON notes(path);
CREATE INDEX IF NOT EXISTS idx_notes_title ON notes(title);

-- Arbitrary frontmatter fields not covered by fixed columns.
CREATE TABLE IF NOT EXISTS note_metadata (
    note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT,
    value_type TEXT NOT NULL DEFAULT 'string',
    PRIMARY KEY (note_id, key)
);

-- Internal wikilink edges. target stays NULL while the link is broken.
CREATE TABLE IF NOT EXISTS note_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    target_note_id TEXT REFERENCES notes(id) ON DELETE SET NULL,
    target_title TEXT NOT NULL,
    link_text TEXT,
    line_number INTEGER,
    created TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_note_links_source ON note_links(source_note_id);
CREATE INDEX IF NOT EXISTS idx_note_links_target ON note_links(target_note_id);

CREATE TABLE IF NOT EXISTS external_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    title TEXT,
    line_number INTEGER,
    link_type TEXT NOT NULL DEFAULT 'url',
    created TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_external_links_note ON external_links(note_id);

-- Per-vault note type descriptions (migrated from _description.md files).
CREATE TABLE IF NOT EXISTS note_type_descriptions (
    name TEXT PRIMARY KEY,
    purpose TEXT NOT NULL DEFAULT '',
    agent_instructions TEXT,
    metadata_schema TEXT,
    icon TEXT,
    editor_chips TEXT,
    suggestions_config TEXT,
    default_review_mode TEXT,
    content_hash TEXT NOT NULL DEFAULT '',
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

-- Old identifier (type/basename) to stable note ID, written once.
CREATE TABLE IF NOT EXISTS note_id_migration (
    old_identifier TEXT PRIMARY KEY,
    new_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_items (
    note_id TEXT PRIMARY KEY REFERENCES notes(id) ON DELETE CASCADE,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_reviewed TEXT,
    next_session_number INTEGER NOT NULL DEFAULT 1,
    current_interval INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'active',
    review_count INTEGER NOT NULL DEFAULT 0,
    review_history TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_review_due
    ON review_items(next_session_number) WHERE enabled = 1;

CREATE TABLE IF NOT EXISTS review_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    current_session_number INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS review_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    session_size INTEGER NOT NULL DEFAULT 5,
    sessions_per_week INTEGER NOT NULL DEFAULT 7,
    max_interval_sessions INTEGER NOT NULL DEFAULT 15,
    min_interval_days INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS workflows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    due_at TEXT,
    recurring TEXT,
    last_completed TEXT,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_supplementary_materials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id INTEGER NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    material_type TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_materials_workflow
    ON workflow_supplementary_materials(workflow_id, position);

CREATE TABLE IF NOT EXISTS workflow_completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id INTEGER NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    completed_at TEXT NOT NULL,
    note TEXT
);

-- Parent/child edges with per-parent dense ordering.
CREATE TABLE IF NOT EXISTS note_hierarchy (
    parent_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    child_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (parent_id, child_id)
);
CREATE INDEX IF NOT EXISTS idx_hierarchy_parent ON note_hierarchy(parent_id, position);
CREATE INDEX IF NOT EXISTS idx_hierarchy_child ON note_hierarchy(child_id);

CREATE TABLE IF NOT EXISTS note_suggestions (
    note_id TEXT PRIMARY KEY REFERENCES notes(id) ON DELETE CASCADE,
    suggestions TEXT NOT NULL DEFAULT '[]',
    dismissed_ids TEXT NOT NULL DEFAULT '[]',
    generated_at TEXT,
    model_version TEXT
);

CREATE TABLE IF NOT EXISTS ui_state (
    key TEXT PRIMARY KEY,
    value TEXT
);

-- Full-text search over title and content, kept in sync by triggers.
CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
    title,
    content,
    content='notes',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS notes_fts_ai AFTER INSERT ON notes BEGIN
    INSERT INTO notes_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_ad AFTER DELETE ON notes BEGIN
    INSERT INTO notes_fts(notes_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_au AFTER UPDATE ON notes BEGIN
    INSERT INTO notes_fts(notes_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
    INSERT INTO notes_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_database_gets_full_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(is_fresh(&conn).unwrap());
        create_schema(&conn).unwrap();
        assert!(!is_fresh(&conn).unwrap());

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for required in [
            "notes",
            "note_metadata",
            "note_links",
            "external_links",
            "note_type_descriptions",
            "note_id_migration",
            "review_items",
            "review_state",
            "review_config",
            "workflows",
            "workflow_supplementary_materials",
            "workflow_completions",
            "note_hierarchy",
            "note_suggestions",
            "ui_state",
            "schema_version",
        ] {
            assert!(tables.iter().any(|t| t == required), "missing table {required}");
        }
    }

    #[test]
    fn create_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
    }

    #[test]
    fn whole_chain_is_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        let applied = applied_versions(&conn).unwrap();
        assert_eq!(applied.len(), VERSION_CHAIN.len());
        assert_eq!(applied.last().map(String::as_str), Some(CURRENT_VERSION));
    }
}
