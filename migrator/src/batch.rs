//! Batches: the unit of migration.

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// Lifecycle of a batch. Moves forward only: pending → staged → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Claimed on the source, nothing written to the target yet
    Pending,
    /// Written to the target's staging area
    Staged,
    /// Moved into the target's native delay store
    Completed,
}

impl BatchState {
    /// Position in the lifecycle (lower = earlier)
    pub fn order(&self) -> u8 {
        match self {
            BatchState::Pending => 0,
            BatchState::Staged => 1,
            BatchState::Completed => 2,
        }
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchState::Pending => write!(f, "pending"),
            BatchState::Staged => write!(f, "staged"),
            BatchState::Completed => write!(f, "completed"),
        }
    }
}

/// One partition of the timeouts claimed by a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// 1-based position in the migration order
    pub number: u32,
    pub state: BatchState,
    pub number_of_timeouts: usize,
    /// Ids of the records this batch owns, needed to release them on abort
    #[serde(default)]
    pub timeout_ids: Vec<String>,
}

impl BatchInfo {
    /// Create a pending batch owning the given record ids
    pub fn new(number: u32, timeout_ids: Vec<String>) -> Self {
        Self {
            number,
            state: BatchState::Pending,
            number_of_timeouts: timeout_ids.len(),
            timeout_ids,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == BatchState::Completed
    }

    /// Move the batch forward to `next`.
    ///
    /// Returns `Ok(false)` when the batch is already at or past `next`, so repeated
    /// checkpoints are harmless. Moving backwards is only possible through an abort,
    /// which discards the batch altogether, so it is never allowed here.
    pub fn advance_to(&mut self, next: BatchState) -> Result<bool> {
        if next == BatchState::Pending && self.state != BatchState::Pending {
            return Err(MigrationError::InvalidBatchTransition {
                batch: self.number,
                from: self.state,
                to: next,
            });
        }
        if self.state.order() >= next.order() {
            return Ok(false);
        }
        self.state = next;
        Ok(true)
    }
}

/// Split record ids into contiguous batches of at most `page_size` ids.
///
/// Batch numbers start at 1. An empty input yields no batches.
pub fn partition_into_batches(ids: Vec<String>, page_size: usize) -> Vec<BatchInfo> {
    let page_size = page_size.max(1);
    ids.chunks(page_size)
        .enumerate()
        .map(|(i, chunk)| BatchInfo::new(i as u32 + 1, chunk.to_vec()))
        .collect()
}
