//! Migration runner: drives endpoints through the batch protocol.
//!
//! For every batch, in ascending number order:
//!
//! ```text
//! Pending ──read──► stage ──► mark staged ──► Staged ──complete──► mark completed ──► Completed
//! ```
//!
//! Every arrow that changes state is checkpointed through the source before the
//! next call is made, and the next batch is always derived from the state the
//! source just persisted. A run that fails at any point can be restarted and
//! picks up at the first batch that has not completed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

use crate::batch::{BatchInfo, BatchState};
use crate::error::{BatchPhase, MigrationError, Result};
use crate::filter::EndpointFilter;
use crate::progress::{MigrationProgress, NoopProgress};
use crate::source::TimeoutsSource;
use crate::state::{MigrationStatus, RunParameters, ToolState};
use crate::target::{EndpointTargetBatchMigrator, TimeoutsTarget};
use crate::types::EndpointInfo;

/// Outcome of migrating one endpoint during this invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    pub endpoint: String,
    /// Whether the endpoint's migration was already in progress
    pub resumed: bool,
    pub batches_migrated: usize,
    pub timeouts_migrated: usize,
}

/// Outcome of a [`MigrationRunner::run`] invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub endpoints: Vec<EndpointSummary>,
}

impl MigrationSummary {
    pub fn total_timeouts(&self) -> usize {
        self.endpoints.iter().map(|e| e.timeouts_migrated).sum()
    }
}

/// Moves timeouts from a source to a target, one endpoint and one batch at a time.
pub struct MigrationRunner {
    source: Arc<dyn TimeoutsSource>,
    target: Arc<dyn TimeoutsTarget>,
    force: bool,
    progress: Arc<dyn MigrationProgress>,
}

impl MigrationRunner {
    pub fn new(source: Arc<dyn TimeoutsSource>, target: Arc<dyn TimeoutsTarget>) -> Self {
        Self {
            source,
            target,
            force: false,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Continue an ongoing migration even if its run parameters differ.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn MigrationProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Migrate every selected endpoint's timeouts due at or before `cutoff_time`.
    ///
    /// An ongoing migration is resumed first. All selected endpoints are checked
    /// against the target before anything is prepared, so a failed precondition
    /// leaves both sides untouched.
    pub async fn run(
        &self,
        cutoff_time: DateTime<Utc>,
        filter: &EndpointFilter,
        run_parameters: &RunParameters,
    ) -> Result<MigrationSummary> {
        let ongoing = self.source.try_load_ongoing_migration().await?;
        if let Some(state) = &ongoing {
            self.verify_run_parameters(state, run_parameters)?;
            ensure_resumable(state)?;
        }

        let mut endpoints: Vec<EndpointInfo> = self
            .source
            .list_endpoints(cutoff_time)
            .await?
            .into_iter()
            .filter(|e| filter.should_include(&e.endpoint_name))
            .collect();
        endpoints.sort_by(|a, b| a.endpoint_name.cmp(&b.endpoint_name));

        if ongoing.is_none() && endpoints.is_empty() {
            tracing::warn!(
                "No timeouts due before {} found for {}",
                cutoff_time,
                filter
            );
            return Ok(MigrationSummary::default());
        }

        for endpoint in &endpoints {
            let check = self.target.able_to_migrate(endpoint).await?;
            if !check.can_migrate() {
                return Err(MigrationError::CannotMigrate {
                    endpoint: endpoint.endpoint_name.clone(),
                    problems: check.problems,
                });
            }
        }

        let mut summary = MigrationSummary::default();

        let resumed_endpoint = match ongoing {
            Some(state) => {
                tracing::info!(
                    "Resuming migration of '{}' ({}/{} batches completed)",
                    state.endpoint_name,
                    state.completed_batches(),
                    state.batches().len()
                );
                let mut endpoint_summary = self.migrate_endpoint(&state.endpoint_name).await?;
                endpoint_summary.resumed = true;
                summary.endpoints.push(endpoint_summary);
                Some(state.endpoint_name)
            }
            None => None,
        };

        for endpoint in endpoints {
            if resumed_endpoint.as_deref() == Some(endpoint.endpoint_name.as_str()) {
                continue;
            }

            let state = self
                .source
                .prepare(cutoff_time, &endpoint.endpoint_name, run_parameters)
                .await?;
            tracing::info!(
                "Prepared {} timeouts of '{}' in {} batches",
                state.number_of_timeouts(),
                state.endpoint_name,
                state.batches().len()
            );
            summary
                .endpoints
                .push(self.migrate_endpoint(&state.endpoint_name).await?);
        }

        Ok(summary)
    }

    fn verify_run_parameters(&self, state: &ToolState, requested: &RunParameters) -> Result<()> {
        let differences = state.run_parameters.diff(requested);
        if differences.is_empty() {
            return Ok(());
        }
        if !self.force {
            return Err(MigrationError::ParameterDrift { differences });
        }
        for difference in &differences {
            tracing::warn!("Continuing despite changed run parameter {}", difference);
        }
        Ok(())
    }

    async fn migrate_endpoint(&self, endpoint: &str) -> Result<EndpointSummary> {
        let span = tracing::info_span!("migrate_endpoint", endpoint = %endpoint);
        async move {
            let state = self.load_state(endpoint).await?;
            ensure_resumable(&state)?;
            if state.status == MigrationStatus::Completed {
                tracing::info!(run_id = %state.run_id, "All batches already migrated, cleaning up");
            } else {
                tracing::info!(run_id = %state.run_id, "Starting migration");
            }
            self.progress.on_endpoint_started(
                endpoint,
                state.number_of_timeouts() as u64,
                state.batches().len() as u32,
            );

            let mut migrator = self
                .target
                .prepare_target_endpoint_batch_migrator(endpoint)
                .await?;

            let mut summary = EndpointSummary {
                endpoint: endpoint.to_string(),
                resumed: false,
                batches_migrated: 0,
                timeouts_migrated: 0,
            };
            let mut last_completed: Option<u32> = None;

            loop {
                let state = self.load_state(endpoint).await?;
                if state.is_finished() {
                    break;
                }
                ensure_resumable(&state)?;
                let Some(batch) = state.next_batch().cloned() else {
                    break;
                };
                if last_completed.is_some_and(|last| batch.number <= last) {
                    return Err(MigrationError::Adapter(format!(
                        "source did not record completion of batch {}",
                        batch.number
                    )));
                }

                self.migrate_batch(migrator.as_mut(), &batch).await?;

                summary.batches_migrated += 1;
                summary.timeouts_migrated += batch.number_of_timeouts;
                last_completed = Some(batch.number);
                self.progress.on_batch_completed(
                    endpoint,
                    batch.number,
                    batch.number_of_timeouts as u64,
                );
            }
            drop(migrator);

            self.source.complete().await?;
            self.target.complete(endpoint).await?;
            self.progress.on_endpoint_completed(endpoint);

            tracing::info!(
                "Migration completed: {} timeouts in {} batches",
                summary.timeouts_migrated,
                summary.batches_migrated
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn migrate_batch(
        &self,
        migrator: &mut dyn EndpointTargetBatchMigrator,
        batch: &BatchInfo,
    ) -> Result<()> {
        let number = batch.number;
        let expected = batch.number_of_timeouts;

        if batch.state == BatchState::Pending {
            let records = self.source.read_batch(number).await?;
            check_count(number, BatchPhase::Read, expected, records.len())?;

            let staged = migrator.stage_batch(records, number).await?;
            check_count(number, BatchPhase::Stage, expected, staged)?;

            self.source.mark_batch_as_staged(number).await?;
            tracing::debug!(batch = number, "Staged {} timeouts", staged);
        }

        let completed = migrator.complete_batch(number).await?;
        if completed == 0 && batch.state == BatchState::Staged && expected > 0 {
            // Moved by a previous run that stopped before the checkpoint
            tracing::warn!(
                batch = number,
                "Nothing left in staging, assuming batch was completed before a restart"
            );
        } else {
            check_count(number, BatchPhase::Complete, expected, completed)?;
        }

        self.source.mark_batch_as_completed(number).await?;
        tracing::debug!(batch = number, "Completed batch");
        Ok(())
    }

    async fn load_state(&self, endpoint: &str) -> Result<ToolState> {
        let state = self
            .source
            .try_load_ongoing_migration()
            .await?
            .ok_or(MigrationError::NoMigrationInProgress)?;
        if state.endpoint_name != endpoint {
            return Err(MigrationError::EndpointMismatch {
                expected: endpoint.to_string(),
                actual: state.endpoint_name,
            });
        }
        Ok(state)
    }
}

/// Reject persisted states a run cannot continue from. Only a partitioned run, or a
/// completed one with every batch in the target, may go on to archival.
fn ensure_resumable(state: &ToolState) -> Result<()> {
    let resumable = match state.status {
        MigrationStatus::NeverRun => false,
        MigrationStatus::StoragePrepared => true,
        MigrationStatus::Completed => state.is_finished(),
    };
    if resumable {
        return Ok(());
    }
    Err(MigrationError::UnresumableStatus {
        endpoint: state.endpoint_name.clone(),
        status: state.status,
        outstanding: state.outstanding_batches(),
    })
}

fn check_count(batch: u32, phase: BatchPhase, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MigrationError::BatchCountMismatch {
            batch,
            phase,
            expected,
            actual,
        });
    }
    Ok(())
}
