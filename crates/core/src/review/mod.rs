//! Spaced-engagement review scheduling.

pub mod scheduler;

pub use scheduler::{ReviewError, ReviewScheduler, estimate_session_date};
