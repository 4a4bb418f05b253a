//! Abort runner: unwinds a migration that has not completed.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MigrationError, Result};
use crate::source::TimeoutsSource;
use crate::target::TimeoutsTarget;

/// What an abort released
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortSummary {
    pub endpoint: String,
    pub run_id: Uuid,
    /// Timeouts handed back to the legacy timeout manager
    pub released_timeouts: usize,
    /// Batches that had already reached the target and stay there
    pub completed_batches: usize,
}

pub struct AbortRunner {
    source: Arc<dyn TimeoutsSource>,
    target: Arc<dyn TimeoutsTarget>,
}

impl AbortRunner {
    pub fn new(source: Arc<dyn TimeoutsSource>, target: Arc<dyn TimeoutsTarget>) -> Self {
        Self { source, target }
    }

    /// Abort the migration in progress.
    ///
    /// The source is unwound before the target so that a failing target abort
    /// never leaves records claimed on the source side.
    pub async fn run(&self) -> Result<AbortSummary> {
        if !self.source.check_if_a_migration_is_in_progress().await? {
            return Err(MigrationError::NoMigrationInProgress);
        }
        let state = self
            .source
            .try_load_ongoing_migration()
            .await?
            .ok_or(MigrationError::NoMigrationInProgress)?;

        let summary = AbortSummary {
            endpoint: state.endpoint_name.clone(),
            run_id: state.run_id,
            released_timeouts: state
                .incomplete_batches()
                .map(|b| b.number_of_timeouts)
                .sum(),
            completed_batches: state.completed_batches(),
        };

        tracing::info!(
            endpoint = %summary.endpoint,
            run_id = %summary.run_id,
            "Aborting migration, releasing {} timeouts",
            summary.released_timeouts
        );

        self.source.abort().await?;
        self.target.abort(&state.endpoint_name).await?;

        tracing::info!(endpoint = %summary.endpoint, "Migration aborted");
        Ok(summary)
    }
}
