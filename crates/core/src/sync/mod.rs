//! Index/tree synchronization.

pub mod reconciler;

pub use reconciler::{SyncError, SyncReconciler, SyncStats};
