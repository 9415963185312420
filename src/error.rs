//! Error types for rubric-core
//!
//! Three failure families, matching how the engine treats them:
//! - configuration errors: malformed or ambiguous criteria, rejected before
//!   any process is spawned
//! - runtime errors: a test runner finished without producing the report
//!   artifact the adapter expected
//! - wrapped IO/serialization failures
//!
//! Preflight failures are deliberately *not* errors: they are captured as
//! [`crate::report::FatalError`] values and surfaced through the fatal
//! reporter, never raised past `setup()`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors for rubric-core operations
#[derive(Debug, Error)]
pub enum RubricError {
    // Configuration errors: raised synchronously while building the tree
    // or resolving a framework, before any resource is touched
    #[error("category '{category}' declares neither tests nor subjects")]
    EmptyCategory { category: String },

    #[error("subject '{subject}' declares neither tests nor subjects")]
    EmptySubject { subject: String },

    #[error("'{name}' declares both tests and nested subjects but no 'subjects_weight'")]
    MissingSubjectsWeight { name: String },

    #[error("'{name}' has subjects_weight {value}, expected strictly between 0 and 100")]
    SubjectsWeightOutOfRange { name: String, value: u32 },

    #[error("subject descriptor at index {index} is missing a name")]
    MissingSubjectName { index: usize },

    #[error("unknown test framework: {name} (supported: {supported})")]
    UnknownFramework { name: String, supported: String },

    // Runtime errors: the run aborts, but teardown still executes
    #[error("test runner produced no readable report at {path:?}")]
    MissingReport { path: PathBuf },

    #[error("failed to launch test runner '{program}': {reason}")]
    RunnerLaunch { program: String, reason: String },

    // Generic failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RubricError {
    /// True for errors raised while interpreting the criteria or engine
    /// configuration, i.e. before any subprocess was spawned.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RubricError::EmptyCategory { .. }
                | RubricError::EmptySubject { .. }
                | RubricError::MissingSubjectsWeight { .. }
                | RubricError::SubjectsWeightOutOfRange { .. }
                | RubricError::MissingSubjectName { .. }
                | RubricError::UnknownFramework { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RubricError>;
