//! The registered migration chain.
//!
//! Versions 1.x predate stable note IDs: the `notes` primary key was the
//! old identifier `type/filename` and links referenced those identifiers
//! directly. The 2.0.0 step performs the cutover to `n-`-prefixed IDs and
//! every later step layers one feature's tables (or one data fix) on top.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, params};
use serde_yaml::Value;

use super::runner::{MigrationContext, MigrationError, MigrationStep, table_exists};
use crate::frontmatter::{self, NameStyle};
use crate::ids::{NoteId, is_note_id};
use crate::index::descriptions::{format_description, parse_description};
use crate::vault::{content_hash_str, system_time_ms};

/// Every registered step, in chain order.
pub(super) fn registry() -> Vec<Box<dyn MigrationStep>> {
    vec![
        Box::new(MetadataTable),
        Box::new(StableNoteIds),
        Box::new(ReresolveLinks),
        Box::new(RelativePaths),
        Box::new(ReviewTables),
        Box::new(HierarchyTable),
        Box::new(WorkflowTables),
        Box::new(PrefixedFrontmatter),
    ]
}

// ─────────────────────────────────────────────────────────────────────────
// 1.1.0: metadata key/value table
// ─────────────────────────────────────────────────────────────────────────

struct MetadataTable;

impl MigrationStep for MetadataTable {
    fn version(&self) -> &'static str {
        "1.1.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS note_metadata (
                note_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                value_type TEXT NOT NULL DEFAULT 'string',
                PRIMARY KEY (note_id, key)
            );",
        )?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        require_table(conn, self.version(), "note_metadata")
    }
}

// ─────────────────────────────────────────────────────────────────────────
// 2.0.0: stable note IDs
// ─────────────────────────────────────────────────────────────────────────

const NOTES_DDL_V2: &str = "
    CREATE TABLE notes (
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
";

const NOTE_LINKS_DDL_V2: &str = "
    CREATE TABLE note_links (
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
";

const EXTERNAL_LINKS_DDL: &str = "
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
";

struct StableNoteIds;

impl MigrationStep for StableNoteIds {
    fn version(&self) -> &'static str {
        "2.0.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS note_id_migration (
                old_identifier TEXT PRIMARY KEY,
                new_id TEXT NOT NULL
            );",
        )?;

        if !table_exists(conn, "notes")? {
            // Empty database: nothing to cut over.
            conn.execute_batch(NOTES_DDL_V2)?;
            conn.execute_batch(NOTE_LINKS_DDL_V2)?;
            conn.execute_batch(EXTERNAL_LINKS_DDL)?;
            return Ok(());
        }

        // Snapshot the legacy rows. A partial earlier run may have left the
        // backup (and map) behind with `notes` already emptied; both paths
        // replay identically from backup + map without regenerating IDs.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notes_backup AS SELECT * FROM notes;",
        )?;

        let old_identifiers: Vec<String> = {
            let mut stmt = conn.prepare("SELECT id FROM notes_backup")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let mapped: HashMap<String, String> = {
            let mut stmt =
                conn.prepare("SELECT old_identifier, new_id FROM note_id_migration")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };
        let mut used: HashSet<String> = mapped.values().cloned().collect();
        for old in &old_identifiers {
            if mapped.contains_key(old) {
                continue;
            }
            let mut id = NoteId::mint();
            while used.contains(id.as_str()) {
                id = NoteId::mint();
            }
            used.insert(id.to_string());
            conn.execute(
                "INSERT INTO note_id_migration (old_identifier, new_id) VALUES (?1, ?2)",
                params![old, id.as_str()],
            )?;
        }

        // Rebuild notes keyed by the new IDs.
        conn.execute_batch("DROP TABLE notes;")?;
        conn.execute_batch(NOTES_DDL_V2)?;
        conn.execute_batch(
            "INSERT INTO notes (id, type, filename, path, title, content, created,
                                updated, file_mtime, size_bytes, content_hash, archived)
             SELECT m.new_id, b.type, b.filename, b.path, b.title, b.content,
                    b.created, b.updated, b.file_mtime, b.size_bytes, b.content_hash,
                    b.archived
             FROM notes_backup b
             JOIN note_id_migration m ON m.old_identifier = b.id;",
        )?;

        // Rebuild links with both endpoints remapped; an unmapped target
        // stays NULL (broken) instead of blocking the cutover.
        if table_exists(conn, "note_links")? {
            conn.execute_batch("ALTER TABLE note_links RENAME TO note_links_legacy;")?;
            conn.execute_batch(NOTE_LINKS_DDL_V2)?;
            conn.execute_batch(
                "INSERT INTO note_links (source_note_id, target_note_id, target_title,
                                         link_text, line_number, created)
                 SELECT m1.new_id, m2.new_id, l.target_title, l.link_text,
                        l.line_number, l.created
                 FROM note_links_legacy l
                 JOIN note_id_migration m1 ON m1.old_identifier = l.source_note_id
                 LEFT JOIN note_id_migration m2 ON m2.old_identifier = l.target_note_id;
                 DROP TABLE note_links_legacy;",
            )?;
        } else {
            conn.execute_batch(NOTE_LINKS_DDL_V2)?;
        }
        conn.execute_batch(EXTERNAL_LINKS_DDL)?;

        // Stamp the new IDs into on-disk frontmatter, preserving every
        // existing key.
        let rows: Vec<(String, String, String)> = {
            let mut stmt = conn.prepare("SELECT id, path, type FROM notes")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<Result<_, _>>()?
        };
        for (id, path, note_type) in rows {
            stamp_id_into_file(ctx.vault_root, &path, &id, &note_type)?;
        }

        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        let ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT id FROM notes")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for id in &ids {
            if !is_note_id(id) {
                return Err(MigrationError::Postcondition {
                    version: self.version().to_string(),
                    message: format!("note id '{id}' does not match the ID shape"),
                });
            }
        }
        if table_exists(conn, "notes_backup")? {
            let backup: i64 =
                conn.query_row("SELECT COUNT(*) FROM notes_backup", [], |r| r.get(0))?;
            let notes: i64 =
                conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?;
            if notes != backup {
                return Err(MigrationError::Postcondition {
                    version: self.version().to_string(),
                    message: format!("expected {backup} notes after cutover, found {notes}"),
                });
            }
        }
        Ok(())
    }
}

/// Insert `id` (and `type` when missing) into a note file's frontmatter.
/// Existing keys and the body are preserved; absent files are skipped.
fn stamp_id_into_file(
    vault_root: &Path,
    stored_path: &str,
    id: &str,
    note_type: &str,
) -> Result<(), MigrationError> {
    // Pre-2.1.0 paths may still be absolute.
    let candidate = Path::new(stored_path);
    let file = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        vault_root.join(stored_path)
    };
    if !file.is_file() {
        tracing::warn!("skipping frontmatter stamp, file missing: {}", file.display());
        return Ok(());
    }

    let raw = std::fs::read_to_string(&file)
        .map_err(|source| MigrationError::Io { path: file.clone(), source })?;
    let parsed = frontmatter::parse(&raw);
    let mut fm = parsed.metadata();

    let mut changed = fm.insert_if_absent("id", Value::String(id.to_string()));
    changed |= fm.insert_if_absent("type", Value::String(note_type.to_string()));
    if !changed {
        return Ok(());
    }

    let document = frontmatter::render_note(&fm, &parsed.body, NameStyle::Legacy);
    std::fs::write(&file, document)
        .map_err(|source| MigrationError::Io { path: file, source })
}

// ─────────────────────────────────────────────────────────────────────────
// 2.0.1: re-resolve broken links after the cutover
// ─────────────────────────────────────────────────────────────────────────

struct ReresolveLinks;

impl MigrationStep for ReresolveLinks {
    fn version(&self) -> &'static str {
        "2.0.1"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        let by_title = conn.execute(
            "UPDATE note_links SET target_note_id = (
                SELECT n.id FROM notes n
                WHERE n.title = note_links.target_title AND n.title != ''
                ORDER BY n.created ASC, n.id ASC LIMIT 1)
             WHERE target_note_id IS NULL
               AND EXISTS (SELECT 1 FROM notes n
                           WHERE n.title = note_links.target_title AND n.title != '')",
            [],
        )?;
        let by_path = conn.execute(
            "UPDATE note_links SET target_note_id = (
                SELECT n.id FROM notes n
                WHERE n.type || '/' || n.filename = note_links.target_title
                   OR n.type || '/' || REPLACE(n.filename, '.md', '') = note_links.target_title
                ORDER BY n.created ASC, n.id ASC LIMIT 1)
             WHERE target_note_id IS NULL
               AND EXISTS (SELECT 1 FROM notes n
                           WHERE n.type || '/' || n.filename = note_links.target_title
                              OR n.type || '/' || REPLACE(n.filename, '.md', '')
                                 = note_links.target_title)",
            [],
        )?;
        tracing::info!("re-resolved {} broken links", by_title + by_path);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// 2.1.0: vault-relative paths
// ─────────────────────────────────────────────────────────────────────────

struct RelativePaths;

impl MigrationStep for RelativePaths {
    fn version(&self) -> &'static str {
        "2.1.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        // The canonical relative path is always `type/filename` with forward
        // slashes; whatever absolute or backslashed form a row carries
        // collapses onto it.
        conn.execute(
            "UPDATE notes SET path = type || '/' || filename
             WHERE path != type || '/' || filename",
            [],
        )?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        let offenders: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notes
             WHERE path LIKE '/%' OR path LIKE '%\\%' OR path LIKE '_:%'",
            [],
            |row| row.get(0),
        )?;
        if offenders > 0 {
            return Err(MigrationError::Postcondition {
                version: self.version().to_string(),
                message: format!("{offenders} paths are still not vault-relative"),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// 2.2.0 / 2.3.0 / 2.4.0: feature tables
// ─────────────────────────────────────────────────────────────────────────

struct ReviewTables;

impl MigrationStep for ReviewTables {
    fn version(&self) -> &'static str {
        "2.2.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS review_items (
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
            );",
        )?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        require_table(conn, self.version(), "review_items")
    }
}

struct HierarchyTable;

impl MigrationStep for HierarchyTable {
    fn version(&self) -> &'static str {
        "2.3.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS note_hierarchy (
                parent_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                child_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                PRIMARY KEY (parent_id, child_id)
            );
            CREATE INDEX IF NOT EXISTS idx_hierarchy_parent
                ON note_hierarchy(parent_id, position);
            CREATE INDEX IF NOT EXISTS idx_hierarchy_child
                ON note_hierarchy(child_id);",
        )?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        require_table(conn, self.version(), "note_hierarchy")
    }
}

struct WorkflowTables;

impl MigrationStep for WorkflowTables {
    fn version(&self) -> &'static str {
        "2.4.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        _ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS workflows (
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
            );",
        )?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        require_table(conn, self.version(), "workflows")?;
        require_table(conn, self.version(), "note_suggestions")
    }
}

// ─────────────────────────────────────────────────────────────────────────
// 2.17.0: prefixed frontmatter, description import, full-text search
// ─────────────────────────────────────────────────────────────────────────

struct PrefixedFrontmatter;

impl MigrationStep for PrefixedFrontmatter {
    fn version(&self) -> &'static str {
        "2.17.0"
    }

    fn apply(
        &self,
        conn: &Connection,
        ctx: &MigrationContext<'_>,
    ) -> Result<(), MigrationError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS note_type_descriptions (
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
            );",
        )?;

        import_legacy_descriptions(conn, ctx.vault_root)?;

        // Full-text search over (title, content), kept in sync by triggers.
        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
                title, content, content='notes', content_rowid='rowid'
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
            INSERT INTO notes_fts(notes_fts) VALUES ('rebuild');",
        )?;

        rewrite_frontmatter_prefixed(conn, ctx.vault_root)?;
        Ok(())
    }

    fn validate_post(&self, conn: &Connection) -> Result<(), MigrationError> {
        require_table(conn, self.version(), "note_type_descriptions")?;
        require_table(conn, self.version(), "notes_fts")
    }
}

/// Move `<type>/_description.md` files into the descriptions table.
fn import_legacy_descriptions(
    conn: &Connection,
    vault_root: &Path,
) -> Result<(), MigrationError> {
    let Ok(entries) = std::fs::read_dir(vault_root) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let dir = entry.path();
        let dir_name = match dir.file_name().and_then(|n| n.to_str()) {
            Some(n) if !n.starts_with('.') && dir.is_dir() => n.to_string(),
            _ => continue,
        };
        let file = dir.join("_description.md");
        if !file.is_file() {
            continue;
        }
        let raw = std::fs::read_to_string(&file)
            .map_err(|source| MigrationError::Io { path: file.clone(), source })?;
        let mut def = match parse_description(&raw) {
            Ok(def) => def,
            Err(e) => {
                tracing::warn!("skipping unparseable description {}: {e}", file.display());
                continue;
            }
        };
        if def.name.is_empty() {
            def.name = dir_name;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let hash = content_hash_str(&format_description(&def));
        conn.execute(
            "INSERT OR REPLACE INTO note_type_descriptions
                (name, purpose, agent_instructions, metadata_schema, icon,
                 editor_chips, suggestions_config, default_review_mode,
                 content_hash, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                def.name,
                def.purpose,
                serde_json::to_string(&def.agent_instructions).unwrap_or_default(),
                serde_json::to_string(&def.metadata_schema).unwrap_or_default(),
                def.icon,
                serde_json::to_string(&def.editor_chips).unwrap_or_default(),
                serde_json::to_string(&def.suggestions_config).unwrap_or_default(),
                def.default_review_mode,
                hash,
                now,
            ],
        )?;
        std::fs::remove_file(&file)
            .map_err(|source| MigrationError::Io { path: file, source })?;
    }
    Ok(())
}

/// Rewrite every note's frontmatter to the prefixed name-space, refreshing
/// the stored hash so the next sync pass sees files and index agreeing.
fn rewrite_frontmatter_prefixed(
    conn: &Connection,
    vault_root: &Path,
) -> Result<(), MigrationError> {
    let rows: Vec<(String, String)> = {
        let mut stmt = conn.prepare("SELECT id, path FROM notes")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };

    for (id, rel_path) in rows {
        let file = vault_root.join(&rel_path);
        if !file.is_file() {
            tracing::warn!("skipping prefixed rewrite, file missing: {}", file.display());
            continue;
        }
        let raw = std::fs::read_to_string(&file)
            .map_err(|source| MigrationError::Io { path: file.clone(), source })?;
        let parsed = frontmatter::parse(&raw);
        let fm = parsed.metadata();
        if fm.is_empty() {
            continue;
        }
        let document = frontmatter::render_note(&fm, &parsed.body, NameStyle::Prefixed);
        if document == raw {
            continue;
        }
        std::fs::write(&file, &document)
            .map_err(|source| MigrationError::Io { path: file.clone(), source })?;
        let mtime = system_time_ms(
            std::fs::metadata(&file).and_then(|m| m.modified()).ok(),
        );
        conn.execute(
            "UPDATE notes SET content_hash = ?1, file_mtime = ?2, size_bytes = ?3
             WHERE id = ?4",
            params![content_hash_str(&document), mtime, document.len() as i64, id],
        )?;
    }
    Ok(())
}

fn require_table(
    conn: &Connection,
    version: &str,
    name: &str,
) -> Result<(), MigrationError> {
    if table_exists(conn, name)? {
        Ok(())
    } else {
        Err(MigrationError::Postcondition {
            version: version.to_string(),
            message: format!("expected table '{name}' to exist"),
        })
    }
}
