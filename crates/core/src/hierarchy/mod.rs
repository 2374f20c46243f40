//! Acyclic parent/child note hierarchy with ordered children.
//!
//! Edges live in the index; an in-memory adjacency mirror (children and
//! parents maps) answers reads without touching the database and is rebuilt
//! from the store at startup and after every edit.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::ids::NoteId;
use crate::index::{IndexDb, IndexError};

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("index database error: {0}")]
    Index(#[from] IndexError),

    #[error("a note cannot be its own subnote")]
    SelfReference,

    #[error("adding {child} under {parent} would create a cycle")]
    CycleDetected { parent: NoteId, child: NoteId },

    #[error("reorder must supply the complete current child set")]
    NotAPermutation,
}

#[derive(Debug, Default)]
struct Adjacency {
    children: HashMap<NoteId, Vec<NoteId>>,
    parents: HashMap<NoteId, Vec<NoteId>>,
}

/// Manages the vault's subnote graph.
pub struct HierarchyManager {
    db: Arc<IndexDb>,
    graph: Mutex<Adjacency>,
}

impl HierarchyManager {
    /// Build the manager, loading the adjacency mirror from the store.
    pub fn load(db: Arc<IndexDb>) -> Result<Self, HierarchyError> {
        let manager = Self { db, graph: Mutex::new(Adjacency::default()) };
        manager.reload()?;
        Ok(manager)
    }

    /// Rebuild the in-memory graph from the store.
    pub fn reload(&self) -> Result<(), HierarchyError> {
        let mut adjacency = Adjacency::default();
        for (parent, child, _position) in self.db.hierarchy_edges()? {
            adjacency.children.entry(parent.clone()).or_default().push(child.clone());
            adjacency.parents.entry(child).or_default().push(parent);
        }
        *self.lock_graph() = adjacency;
        Ok(())
    }

    /// Attach `child` under `parent`, optionally at a specific position
    /// (appended otherwise). Rejects self-edges and anything that would
    /// close a directed cycle.
    pub fn add_subnote(
        &self,
        parent: &NoteId,
        child: &NoteId,
        position: Option<usize>,
    ) -> Result<(), HierarchyError> {
        if parent == child {
            return Err(HierarchyError::SelfReference);
        }
        if self.is_ancestor(child, parent) {
            return Err(HierarchyError::CycleDetected {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        let mut children = self.db.children_of(parent)?;
        children.retain(|c| c != child);
        let at = position.unwrap_or(children.len()).min(children.len());
        children.insert(at, child.clone());
        self.db.write_child_positions(parent, &children)?;
        self.reload()
    }

    /// Detach `child` from `parent`. Idempotent: detaching an absent edge
    /// is a no-op.
    pub fn remove_subnote(
        &self,
        parent: &NoteId,
        child: &NoteId,
    ) -> Result<(), HierarchyError> {
        let mut children = self.db.children_of(parent)?;
        let before = children.len();
        children.retain(|c| c != child);
        if children.len() != before {
            self.db.write_child_positions(parent, &children)?;
            self.reload()?;
        }
        Ok(())
    }

    /// Rewrite a parent's child order. `ordered_children` must be a
    /// permutation of the current child set; positions become dense
    /// `0..n-1` atomically.
    pub fn reorder_subnotes(
        &self,
        parent: &NoteId,
        ordered_children: &[NoteId],
    ) -> Result<(), HierarchyError> {
        let existing = self.db.children_of(parent)?;
        let existing_set: HashSet<&NoteId> = existing.iter().collect();
        let proposed_set: HashSet<&NoteId> = ordered_children.iter().collect();
        if existing.len() != ordered_children.len() || existing_set != proposed_set {
            return Err(HierarchyError::NotAPermutation);
        }

        self.db.write_child_positions(parent, ordered_children)?;
        self.reload()
    }

    /// Ordered children of a parent, from the in-memory mirror.
    pub fn get_subnotes(&self, parent: &NoteId) -> Vec<NoteId> {
        self.lock_graph().children.get(parent).cloned().unwrap_or_default()
    }

    pub fn get_parents(&self, child: &NoteId) -> Vec<NoteId> {
        self.lock_graph().parents.get(child).cloned().unwrap_or_default()
    }

    /// Root-to-target path. Multi-parent nodes follow the first parent by
    /// creation time, yielding one deterministic representative path.
    pub fn get_hierarchy_path(&self, id: &NoteId) -> Result<Vec<NoteId>, HierarchyError> {
        let mut path = vec![id.clone()];
        let mut visited: HashSet<NoteId> = HashSet::from([id.clone()]);
        let mut cursor = id.clone();
        loop {
            let parents = self.db.parents_of(&cursor)?;
            let Some(first) = parents.into_iter().next() else {
                break;
            };
            if !visited.insert(first.clone()) {
                break;
            }
            path.push(first.clone());
            cursor = first;
        }
        path.reverse();
        Ok(path)
    }

    /// DFS upward over parent edges: is `ancestor` reachable from `node`?
    fn is_ancestor(&self, ancestor: &NoteId, node: &NoteId) -> bool {
        let graph = self.lock_graph();
        let mut stack = vec![node.clone()];
        let mut visited: HashSet<NoteId> = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == ancestor {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(parents) = graph.parents.get(&current) {
                stack.extend(parents.iter().cloned());
            }
        }
        false
    }

    fn lock_graph(&self) -> std::sync::MutexGuard<'_, Adjacency> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::NoteRecord;
    use chrono::{Duration, Utc};

    fn insert_note(db: &IndexDb, filename: &str, age_days: i64) -> NoteId {
        let now = Utc::now() - Duration::days(age_days);
        let note = NoteRecord {
            id: NoteId::mint(),
            note_type: "general".to_string(),
            filename: filename.to_string(),
            path: format!("general/{filename}"),
            title: String::new(),
            content: String::new(),
            created: now,
            updated: now,
            file_mtime_ms: 0,
            size_bytes: 0,
            content_hash: "h".to_string(),
            archived: false,
        };
        db.insert_note(&note).unwrap();
        note.id
    }

    fn setup() -> (Arc<IndexDb>, HierarchyManager) {
        let db = Arc::new(IndexDb::open_in_memory().unwrap());
        let manager = HierarchyManager::load(Arc::clone(&db)).unwrap();
        (db, manager)
    }

    #[test]
    fn add_and_list_subnotes() {
        let (db, manager) = setup();
        let parent = insert_note(&db, "p.md", 0);
        let a = insert_note(&db, "a.md", 0);
        let b = insert_note(&db, "b.md", 0);

        manager.add_subnote(&parent, &a, None).unwrap();
        manager.add_subnote(&parent, &b, None).unwrap();
        assert_eq!(manager.get_subnotes(&parent), vec![a.clone(), b.clone()]);

        // Positioned insert shifts the rest.
        let c = insert_note(&db, "c.md", 0);
        manager.add_subnote(&parent, &c, Some(0)).unwrap();
        assert_eq!(manager.get_subnotes(&parent), vec![c, a, b]);
    }

    #[test]
    fn rejects_self_edge_and_cycles() {
        let (db, manager) = setup();
        let a = insert_note(&db, "a.md", 0);
        let b = insert_note(&db, "b.md", 0);
        let c = insert_note(&db, "c.md", 0);

        assert!(matches!(
            manager.add_subnote(&a, &a, None),
            Err(HierarchyError::SelfReference)
        ));

        manager.add_subnote(&a, &b, None).unwrap();
        manager.add_subnote(&b, &c, None).unwrap();
        assert!(matches!(
            manager.add_subnote(&c, &a, None),
            Err(HierarchyError::CycleDetected { .. })
        ));
        // The direct back-edge is a cycle too.
        assert!(matches!(
            manager.add_subnote(&b, &a, None),
            Err(HierarchyError::CycleDetected { .. })
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let (db, manager) = setup();
        let parent = insert_note(&db, "p.md", 0);
        let child = insert_note(&db, "c.md", 0);

        manager.add_subnote(&parent, &child, None).unwrap();
        manager.remove_subnote(&parent, &child).unwrap();
        manager.remove_subnote(&parent, &child).unwrap();
        assert!(manager.get_subnotes(&parent).is_empty());
    }

    #[test]
    fn reorder_requires_permutation() {
        let (db, manager) = setup();
        let parent = insert_note(&db, "p.md", 0);
        let a = insert_note(&db, "a.md", 0);
        let b = insert_note(&db, "b.md", 0);
        manager.add_subnote(&parent, &a, None).unwrap();
        manager.add_subnote(&parent, &b, None).unwrap();

        assert!(matches!(
            manager.reorder_subnotes(&parent, std::slice::from_ref(&a)),
            Err(HierarchyError::NotAPermutation)
        ));

        let stranger = insert_note(&db, "x.md", 0);
        assert!(matches!(
            manager.reorder_subnotes(&parent, &[a.clone(), stranger]),
            Err(HierarchyError::NotAPermutation)
        ));

        manager.reorder_subnotes(&parent, &[b.clone(), a.clone()]).unwrap();
        assert_eq!(manager.get_subnotes(&parent), vec![b, a]);
    }

    #[test]
    fn hierarchy_path_prefers_earliest_created_parent() {
        let (db, manager) = setup();
        let old_root = insert_note(&db, "old.md", 10);
        let new_root = insert_note(&db, "new.md", 0);
        let middle = insert_note(&db, "middle.md", 5);
        let leaf = insert_note(&db, "leaf.md", 0);

        manager.add_subnote(&old_root, &middle, None).unwrap();
        manager.add_subnote(&new_root, &middle, None).unwrap();
        manager.add_subnote(&middle, &leaf, None).unwrap();

        let path = manager.get_hierarchy_path(&leaf).unwrap();
        assert_eq!(path, vec![old_root, middle, leaf]);
    }

    #[test]
    fn path_of_root_is_itself() {
        let (db, manager) = setup();
        let lonely = insert_note(&db, "lonely.md", 0);
        assert_eq!(manager.get_hierarchy_path(&lonely).unwrap(), vec![lonely]);
    }
}
