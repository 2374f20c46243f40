//! Workflow management.

pub mod manager;

pub use manager::{
    MAX_MATERIAL_BYTES, MAX_TOTAL_BYTES, NewMaterial, NewWorkflow, WorkflowError,
    WorkflowManager, is_workflow_due,
};
