//! Hierarchy edge storage. Graph semantics (cycle checks, ordering rules)
//! live in the hierarchy manager; this layer is rows only.

use rusqlite::params;

use super::db::{IndexDb, IndexError};
use crate::ids::NoteId;

impl IndexDb {
    /// Every `(parent, child, position)` edge in the vault.
    pub fn hierarchy_edges(&self) -> Result<Vec<(NoteId, NoteId, i64)>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT parent_id, child_id, position FROM note_hierarchy
             ORDER BY parent_id, position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut edges = Vec::new();
        for row in rows {
            let (parent, child, position) = row?;
            let parent = parent
                .parse()
                .map_err(|_| IndexError::Parse(format!("bad id in db: {parent}")))?;
            let child = child
                .parse()
                .map_err(|_| IndexError::Parse(format!("bad id in db: {child}")))?;
            edges.push((parent, child, position));
        }
        Ok(edges)
    }

    /// Children of a parent in position order.
    pub fn children_of(&self, parent: &NoteId) -> Result<Vec<NoteId>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT child_id FROM note_hierarchy WHERE parent_id = ?1 ORDER BY position",
        )?;
        collect_ids(stmt.query_map([parent.as_str()], |row| row.get::<_, String>(0))?)
    }

    /// Parents of a child, earliest-created parent first. The ordering backs
    /// the "first parent by creation time" rule for hierarchy paths.
    pub fn parents_of(&self, child: &NoteId) -> Result<Vec<NoteId>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT h.parent_id FROM note_hierarchy h
             JOIN notes n ON n.id = h.parent_id
             WHERE h.child_id = ?1
             ORDER BY n.created ASC, h.parent_id ASC",
        )?;
        collect_ids(stmt.query_map([child.as_str()], |row| row.get::<_, String>(0))?)
    }

    pub fn insert_hierarchy_edge(
        &self,
        parent: &NoteId,
        child: &NoteId,
        position: i64,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO note_hierarchy (parent_id, child_id, position)
             VALUES (?1, ?2, ?3)",
            params![parent.as_str(), child.as_str(), position],
        )?;
        Ok(())
    }

    pub fn delete_hierarchy_edge(
        &self,
        parent: &NoteId,
        child: &NoteId,
    ) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM note_hierarchy WHERE parent_id = ?1 AND child_id = ?2",
            params![parent.as_str(), child.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Rewrite a parent's entire child list with dense positions `0..n-1`
    /// in one transaction.
    pub fn write_child_positions(
        &self,
        parent: &NoteId,
        ordered_children: &[NoteId],
    ) -> Result<(), IndexError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM note_hierarchy WHERE parent_id = ?1", [parent.as_str()])?;
        for (position, child) in ordered_children.iter().enumerate() {
            tx.execute(
                "INSERT INTO note_hierarchy (parent_id, child_id, position)
                 VALUES (?1, ?2, ?3)",
                params![parent.as_str(), child.as_str(), position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn collect_ids(
    rows: impl Iterator<Item = Result<String, rusqlite::Error>>,
) -> Result<Vec<NoteId>, IndexError> {
    let mut ids = Vec::new();
    for row in rows {
        let raw = row?;
        ids.push(
            raw.parse().map_err(|_| IndexError::Parse(format!("bad id in db: {raw}")))?,
        );
    }
    Ok(ids)
}
