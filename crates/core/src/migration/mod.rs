//! Versioned schema migrations with on-disk frontmatter rewrites.

pub mod runner;
mod steps;

pub use runner::{
    MigrationContext, MigrationError, MigrationReport, MigrationRunner, MigrationStep,
};
