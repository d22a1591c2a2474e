//! Error types for the migration planner.

use std::path::PathBuf;

/// Errors that can occur while planning or persisting a migration.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Actions depend on each other in a way no ordering can satisfy.
    #[error("Dependency cycle detected between actions: {}", .actions.join(", "))]
    DependencyCycle {
        /// Summaries of the actions that could not be scheduled.
        actions: Vec<String>,
    },

    /// A diff entry has a shape the deriver does not know how to translate.
    #[error("Cannot derive an action from diff entry: {0}")]
    UnclassifiedDiff(String),

    /// A column alteration points at a column missing from the target schema.
    #[error("Column '{column}' does not exist in table '{table}' of the target schema")]
    MissingColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// No output directory was given and preview mode is off.
    #[error("Migrations directory is needed without preview")]
    MissingOutDir,

    /// The output directory does not exist.
    #[error("Migrations directory not found: {0}")]
    OutDirNotFound(PathBuf),

    /// Migration artifact already exists.
    #[error("Migration file already exists: {0}")]
    ArtifactExists(PathBuf),

    /// Database error in the state store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (writing migration artifacts).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state could not be interpreted.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),
}

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, PlanError>;
