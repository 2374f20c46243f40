//! Workflow storage: workflows, supplementary materials, completion log.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::db::{IndexDb, IndexError, parse_timestamp};
use super::types::{
    MaterialKind, RecurringSpec, SupplementaryMaterial, Workflow, WorkflowCompletion,
    WorkflowStatus,
};

impl IndexDb {
    pub fn insert_workflow(
        &self,
        name: &str,
        due_at: Option<DateTime<Utc>>,
        recurring: Option<&RecurringSpec>,
    ) -> Result<Workflow, IndexError> {
        let now = Utc::now();
        let recurring_json = recurring
            .map(|r| {
                serde_json::to_string(r)
                    .map_err(|e| IndexError::Parse(format!("recurring spec: {e}")))
            })
            .transpose()?;
        let id = {
            let conn = self.lock();
            conn.execute(
                "INSERT INTO workflows (name, status, due_at, recurring, created, updated)
                 VALUES (?1, 'active', ?2, ?3, ?4, ?4)",
                params![
                    name,
                    due_at.map(|d| d.to_rfc3339()),
                    recurring_json,
                    now.to_rfc3339()
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_workflow(id)?
            .ok_or_else(|| IndexError::NotFound(format!("workflow {id}")))
    }

    pub fn get_workflow(&self, id: i64) -> Result<Option<Workflow>, IndexError> {
        let conn = self.lock();
        conn.query_row(&format!("{WORKFLOW_SELECT} WHERE id = ?1"), [id], row_to_workflow)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{WORKFLOW_SELECT} ORDER BY created, id"))?;
        let workflows =
            stmt.query_map([], row_to_workflow)?.filter_map(|r| r.ok()).collect();
        Ok(workflows)
    }

    pub fn set_workflow_status(
        &self,
        id: i64,
        status: WorkflowStatus,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE workflows SET status = ?1, updated = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(IndexError::NotFound(format!("workflow {id}")));
        }
        Ok(())
    }

    pub fn set_workflow_last_completed(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE workflows SET last_completed = ?1, updated = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(IndexError::NotFound(format!("workflow {id}")));
        }
        Ok(())
    }

    pub fn delete_workflow(&self, id: i64) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM workflows WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Supplementary materials
    // ─────────────────────────────────────────────────────────────────────

    /// Append a material at the end of the workflow's ordered list.
    pub fn insert_material(
        &self,
        workflow_id: i64,
        kind: MaterialKind,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<SupplementaryMaterial, IndexError> {
        let conn = self.lock();
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0)
             FROM workflow_supplementary_materials WHERE workflow_id = ?1",
            [workflow_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO workflow_supplementary_materials
                (workflow_id, position, material_type, content, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                workflow_id,
                position,
                kind.as_str(),
                content,
                metadata.map(|m| m.to_string())
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(SupplementaryMaterial {
            id: Some(id),
            workflow_id,
            position,
            kind,
            content: content.to_string(),
            metadata: metadata.cloned(),
        })
    }

    pub fn list_materials(
        &self,
        workflow_id: i64,
    ) -> Result<Vec<SupplementaryMaterial>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, position, material_type, content, metadata
             FROM workflow_supplementary_materials
             WHERE workflow_id = ?1 ORDER BY position",
        )?;
        let materials = stmt
            .query_map([workflow_id], |row| {
                let kind: String = row.get(3)?;
                let metadata: Option<String> = row.get(5)?;
                Ok(SupplementaryMaterial {
                    id: Some(row.get(0)?),
                    workflow_id: row.get(1)?,
                    position: row.get(2)?,
                    kind: MaterialKind::parse(&kind).unwrap_or(MaterialKind::Text),
                    content: row.get(4)?,
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(materials)
    }

    pub fn delete_material(&self, material_id: i64) -> Result<bool, IndexError> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM workflow_supplementary_materials WHERE id = ?1",
            [material_id],
        )?;
        Ok(rows > 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Completion log
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_completion(
        &self,
        workflow_id: i64,
        completed_at: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<(), IndexError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO workflow_completions (workflow_id, completed_at, note)
             VALUES (?1, ?2, ?3)",
            params![workflow_id, completed_at.to_rfc3339(), note],
        )?;
        Ok(())
    }

    pub fn list_completions(
        &self,
        workflow_id: i64,
    ) -> Result<Vec<WorkflowCompletion>, IndexError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, completed_at, note FROM workflow_completions
             WHERE workflow_id = ?1 ORDER BY completed_at, id",
        )?;
        let completions = stmt
            .query_map([workflow_id], |row| {
                let at: String = row.get(2)?;
                Ok(WorkflowCompletion {
                    id: row.get(0)?,
                    workflow_id: row.get(1)?,
                    completed_at: parse_timestamp(&at),
                    note: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(completions)
    }
}

const WORKFLOW_SELECT: &str =
    "SELECT id, name, status, due_at, recurring, last_completed, created, updated
     FROM workflows";

fn row_to_workflow(row: &rusqlite::Row) -> Result<Workflow, rusqlite::Error> {
    let status: String = row.get(2)?;
    let due_at: Option<String> = row.get(3)?;
    let recurring: Option<String> = row.get(4)?;
    let last_completed: Option<String> = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;

    Ok(Workflow {
        id: row.get(0)?,
        name: row.get(1)?,
        status: WorkflowStatus::parse(&status).unwrap_or(WorkflowStatus::Active),
        due_at: due_at.map(|s| parse_timestamp(&s)),
        recurring: recurring.and_then(|r| match serde_json::from_str(&r) {
            Ok(spec) => Some(spec),
            Err(e) => {
                tracing::warn!("unparseable recurring spec, ignoring: {e}");
                None
            }
        }),
        last_completed: last_completed.map(|s| parse_timestamp(&s)),
        created: parse_timestamp(&created),
        updated: parse_timestamp(&updated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::Frequency;

    #[test]
    fn create_and_fetch() {
        let db = IndexDb::open_in_memory().unwrap();
        let wf = db.insert_workflow("Weekly planning", None, None).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Active);
        assert!(wf.recurring.is_none());

        let spec = RecurringSpec {
            frequency: Frequency::Weekly,
            day_of_week: Some(1),
            day_of_month: None,
        };
        let wf2 = db.insert_workflow("Reviews", None, Some(&spec)).unwrap();
        assert_eq!(wf2.recurring, Some(spec));
    }

    #[test]
    fn materials_are_ordered_and_cascade() {
        let db = IndexDb::open_in_memory().unwrap();
        let wf = db.insert_workflow("W", None, None).unwrap();

        db.insert_material(wf.id, MaterialKind::Text, "first", None).unwrap();
        db.insert_material(
            wf.id,
            MaterialKind::Code,
            "second",
            Some(&serde_json::json!({"lang": "rust"})),
        )
        .unwrap();

        let materials = db.list_materials(wf.id).unwrap();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0].position, 0);
        assert_eq!(materials[1].position, 1);
        assert_eq!(materials[1].kind, MaterialKind::Code);

        db.delete_workflow(wf.id).unwrap();
        assert!(db.list_materials(wf.id).unwrap().is_empty());
    }

    #[test]
    fn completion_log_appends() {
        let db = IndexDb::open_in_memory().unwrap();
        let wf = db.insert_workflow("W", None, None).unwrap();

        let t1 = Utc::now() - chrono::Duration::days(1);
        let t2 = Utc::now();
        db.insert_completion(wf.id, t1, Some("first run")).unwrap();
        db.insert_completion(wf.id, t2, None).unwrap();

        let log = db.list_completions(wf.id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].note.as_deref(), Some("first run"));
    }

    #[test]
    fn corrupt_recurring_spec_degrades_to_none() {
        let db = IndexDb::open_in_memory().unwrap();
        let wf = db.insert_workflow("W", None, None).unwrap();
        {
            let conn = db.lock();
            conn.execute(
                "UPDATE workflows SET recurring = '{nope' WHERE id = ?1",
                [wf.id],
            )
            .unwrap();
        }
        let fetched = db.get_workflow(wf.id).unwrap().unwrap();
        assert!(fetched.recurring.is_none());
    }
}
