//! Migration error types.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::batch::BatchState;
use crate::state::MigrationStatus;

/// A single run parameter whose persisted value differs from the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDifference {
    pub key: String,
    /// Value recorded when the ongoing migration was prepared
    pub persisted: Option<String>,
    /// Value supplied for the current invocation
    pub requested: Option<String>,
}

impl fmt::Display for ParameterDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: '{}' (in progress) vs '{}' (requested)",
            self.key,
            self.persisted.as_deref().unwrap_or("<unset>"),
            self.requested.as_deref().unwrap_or("<unset>")
        )
    }
}

/// Phase of the batch protocol a count check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Read,
    Stage,
    Complete,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Read => write!(f, "read"),
            BatchPhase::Stage => write!(f, "stage"),
            BatchPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Errors raised by the migration core and its adapters.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The target reported precondition problems for an endpoint
    #[error("Timeouts for endpoint '{endpoint}' cannot be migrated: {}", problems.join("; "))]
    CannotMigrate {
        endpoint: String,
        problems: Vec<String>,
    },

    /// Records were left in the staging area when the migration was completed
    #[error("Staging area for endpoint '{endpoint}' still holds {remaining} timeout(s)")]
    StagingNotEmpty { endpoint: String, remaining: usize },

    /// Another batch is staged for the endpoint while completing this one
    #[error(
        "Cannot complete batch {batch} for endpoint '{endpoint}': staging area holds batch {other_batch}"
    )]
    StagingConflict {
        endpoint: String,
        batch: u32,
        other_batch: u32,
    },

    /// Abort or resume was requested but no migration is in progress
    #[error("No migration in progress")]
    NoMigrationInProgress,

    /// Batches were already partitioned for this run
    #[error("Migration for endpoint '{endpoint}' is already prepared")]
    AlreadyPrepared { endpoint: String },

    /// Ongoing migration was started with different run parameters
    #[error(
        "In-progress migration parameters don't match, rerun with abort or adjust the parameters: {}",
        differences.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
    )]
    ParameterDrift { differences: Vec<ParameterDifference> },

    /// A batch state change would regress its lifecycle
    #[error("Batch {batch} cannot move from {from} to {to}")]
    InvalidBatchTransition {
        batch: u32,
        from: BatchState,
        to: BatchState,
    },

    /// Batch number unknown to the current migration
    #[error("Batch not found: {0}")]
    BatchNotFound(u32),

    /// Batches must be numbered 1..=n without gaps
    #[error("Batches are not numbered contiguously from 1: {0}")]
    InvalidBatchSequence(String),

    /// An adapter returned a different number of timeouts than the batch owns
    #[error("Batch {batch} {phase} count mismatch: expected {expected}, got {actual}")]
    BatchCountMismatch {
        batch: u32,
        phase: BatchPhase,
        expected: usize,
        actual: usize,
    },

    /// The persisted migration is in a status a runner cannot continue from
    #[error(
        "Migration for endpoint '{endpoint}' is {status} with {outstanding} batch(es) outstanding and cannot be resumed; abort it and run again"
    )]
    UnresumableStatus {
        endpoint: String,
        status: MigrationStatus,
        outstanding: usize,
    },

    /// The persisted migration belongs to another endpoint
    #[error("Migration in progress is for endpoint '{actual}', expected '{expected}'")]
    EndpointMismatch { expected: String, actual: String },

    /// I/O error in an adapter
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error in an adapter
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Adapter failure without a richer error type
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    /// Operator misuse or corrupted state; rerunning will not help.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            MigrationError::StagingNotEmpty { .. }
                | MigrationError::StagingConflict { .. }
                | MigrationError::NoMigrationInProgress
                | MigrationError::AlreadyPrepared { .. }
                | MigrationError::InvalidBatchTransition { .. }
                | MigrationError::InvalidBatchSequence(_)
                | MigrationError::BatchNotFound(_)
                | MigrationError::BatchCountMismatch { .. }
                | MigrationError::EndpointMismatch { .. }
                | MigrationError::UnresumableStatus { .. }
        )
    }

    /// Failure of the current invocation that a rerun resumes from the last checkpoint.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            MigrationError::Io(_) | MigrationError::Json(_) | MigrationError::Adapter(_)
        )
    }
}
