//! Workflow lifecycle: creation, due-date logic, materials, completion.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use thiserror::Error;

use crate::index::types::{
    Frequency, MaterialKind, RecurringSpec, SupplementaryMaterial, Workflow,
    WorkflowCompletion, WorkflowStatus,
};
use crate::index::{IndexDb, IndexError};

/// Per-material size limit (content plus serialized metadata).
pub const MAX_MATERIAL_BYTES: usize = 50 * 1024;
/// Total materials limit per workflow.
pub const MAX_TOTAL_BYTES: usize = 500 * 1024;

fn kb(bytes: usize) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("index database error: {0}")]
    Index(#[from] IndexError),

    #[error("workflow not found: {0}")]
    NotFound(i64),

    #[error("Material size {} exceeds maximum allowed size of {}", kb(*.size), kb(MAX_MATERIAL_BYTES))]
    MaterialTooLarge { size: usize },

    #[error(
        "Total materials size: Current {}; New material {}; Limit {}",
        kb(*.current),
        kb(*.added),
        kb(MAX_TOTAL_BYTES)
    )]
    TotalSizeExceeded { current: usize, added: usize },

    #[error("invalid workflow: {0}")]
    Validation(String),
}

/// Input for creating a workflow.
#[derive(Debug, Clone, Default)]
pub struct NewWorkflow {
    pub name: String,
    pub due_at: Option<DateTime<Utc>>,
    pub recurring: Option<RecurringSpec>,
    pub materials: Vec<NewMaterial>,
}

/// Input for one supplementary material.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub kind: MaterialKind,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewMaterial {
    fn serialized_size(&self) -> usize {
        let meta_len = self
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok())
            .map(|s| s.len())
            .unwrap_or(0);
        self.content.len() + meta_len
    }
}

/// Manages workflows over the index store.
pub struct WorkflowManager {
    db: Arc<IndexDb>,
}

impl WorkflowManager {
    pub fn new(db: Arc<IndexDb>) -> Self {
        Self { db }
    }

    pub fn create_workflow(&self, new: NewWorkflow) -> Result<Workflow, WorkflowError> {
        if new.name.trim().is_empty() {
            return Err(WorkflowError::Validation("name must not be empty".to_string()));
        }
        if let Some(spec) = &new.recurring {
            validate_recurring(spec)?;
        }

        let mut total = 0usize;
        for material in &new.materials {
            let size = material.serialized_size();
            if size > MAX_MATERIAL_BYTES {
                return Err(WorkflowError::MaterialTooLarge { size });
            }
            if total + size > MAX_TOTAL_BYTES {
                return Err(WorkflowError::TotalSizeExceeded { current: total, added: size });
            }
            total += size;
        }

        let workflow =
            self.db.insert_workflow(&new.name, new.due_at, new.recurring.as_ref())?;
        for material in &new.materials {
            self.db.insert_material(
                workflow.id,
                material.kind,
                &material.content,
                material.metadata.as_ref(),
            )?;
        }
        Ok(workflow)
    }

    pub fn get_workflow(&self, id: i64) -> Result<Workflow, WorkflowError> {
        self.db.get_workflow(id)?.ok_or(WorkflowError::NotFound(id))
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.db.list_workflows()?)
    }

    pub fn set_status(&self, id: i64, status: WorkflowStatus) -> Result<(), WorkflowError> {
        self.get_workflow(id)?;
        Ok(self.db.set_workflow_status(id, status)?)
    }

    /// Append a material, enforcing both size bounds.
    pub fn add_material(
        &self,
        workflow_id: i64,
        material: NewMaterial,
    ) -> Result<SupplementaryMaterial, WorkflowError> {
        self.get_workflow(workflow_id)?;

        let size = material.serialized_size();
        if size > MAX_MATERIAL_BYTES {
            return Err(WorkflowError::MaterialTooLarge { size });
        }
        let current: usize = self
            .db
            .list_materials(workflow_id)?
            .iter()
            .map(SupplementaryMaterial::serialized_size)
            .sum();
        if current + size > MAX_TOTAL_BYTES {
            return Err(WorkflowError::TotalSizeExceeded { current, added: size });
        }

        Ok(self.db.insert_material(
            workflow_id,
            material.kind,
            &material.content,
            material.metadata.as_ref(),
        )?)
    }

    pub fn list_materials(
        &self,
        workflow_id: i64,
    ) -> Result<Vec<SupplementaryMaterial>, WorkflowError> {
        Ok(self.db.list_materials(workflow_id)?)
    }

    pub fn remove_material(&self, material_id: i64) -> Result<bool, WorkflowError> {
        Ok(self.db.delete_material(material_id)?)
    }

    /// Record a completion. One-time workflows transition to `completed`;
    /// recurring workflows stay active with a fresh `last_completed`.
    pub fn complete_workflow(
        &self,
        id: i64,
        note: Option<&str>,
    ) -> Result<Workflow, WorkflowError> {
        let workflow = self.get_workflow(id)?;
        let now = Utc::now();

        self.db.insert_completion(id, now, note)?;
        self.db.set_workflow_last_completed(id, now)?;
        if workflow.recurring.is_none() {
            self.db.set_workflow_status(id, WorkflowStatus::Completed)?;
        }
        self.get_workflow(id)
    }

    pub fn completions(&self, id: i64) -> Result<Vec<WorkflowCompletion>, WorkflowError> {
        Ok(self.db.list_completions(id)?)
    }

    /// Workflows due at `now`.
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self
            .db
            .list_workflows()?
            .into_iter()
            .filter(|w| is_workflow_due(w, now))
            .collect())
    }
}

/// Whether a workflow is due at `now`.
///
/// One-time: the due date has passed. Recurring: never completed, or the
/// period has elapsed: daily after 24 h, weekly after 7 days on the
/// configured weekday, monthly after 28 days on the configured day of month.
pub fn is_workflow_due(workflow: &Workflow, now: DateTime<Utc>) -> bool {
    if workflow.status != WorkflowStatus::Active {
        return false;
    }
    match &workflow.recurring {
        None => workflow.due_at.is_some_and(|due| due <= now),
        Some(spec) => {
            let Some(last) = workflow.last_completed else {
                return true;
            };
            let elapsed = now - last;
            match spec.frequency {
                Frequency::Daily => elapsed >= Duration::hours(24),
                Frequency::Weekly => {
                    elapsed >= Duration::days(7)
                        && spec.day_of_week.is_none_or(|day| {
                            now.weekday().num_days_from_sunday() as u8 == day
                        })
                }
                Frequency::Monthly => {
                    elapsed >= Duration::days(28)
                        && spec.day_of_month.is_none_or(|day| now.day() as u8 == day)
                }
            }
        }
    }
}

fn validate_recurring(spec: &RecurringSpec) -> Result<(), WorkflowError> {
    if let Some(day) = spec.day_of_week {
        if day > 6 {
            return Err(WorkflowError::Validation(format!(
                "dayOfWeek {day} out of range 0-6"
            )));
        }
    }
    if let Some(day) = spec.day_of_month {
        if day == 0 || day > 31 {
            return Err(WorkflowError::Validation(format!(
                "dayOfMonth {day} out of range 1-31"
            )));
        }
    }
    Ok(())
}
