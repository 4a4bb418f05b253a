//! Source capability: the legacy timeout store being drained.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::state::{RunParameters, ToolState};
use crate::types::{EndpointInfo, TimeoutRecord};

/// A legacy timeout store.
///
/// The source is the store of record for the migration: it owns and persists the
/// [`ToolState`] and every batch transition. Each mutating call must be durable
/// before it returns, since runners resume from whatever the source reports.
///
/// # Concurrency
///
/// Only one migration run may be active against a store at a time. Implementations
/// do not lock; running two migrators concurrently corrupts staging partitions.
#[async_trait]
pub trait TimeoutsSource: Send + Sync {
    /// Load the migration in progress, if any.
    async fn try_load_ongoing_migration(&self) -> Result<Option<ToolState>>;

    /// Claim the endpoint's timeouts due at or before `cutoff_time` and partition
    /// them into batches.
    ///
    /// The returned state has status `StoragePrepared`. Fails with
    /// `MigrationError::AlreadyPrepared` when a migration already exists, so
    /// records claimed by an earlier prepare are never re-partitioned.
    async fn prepare(
        &self,
        cutoff_time: DateTime<Utc>,
        endpoint_name: &str,
        run_parameters: &RunParameters,
    ) -> Result<ToolState>;

    /// Read exactly the records owned by batch `number`.
    async fn read_batch(&self, number: u32) -> Result<Vec<TimeoutRecord>>;

    /// Checkpoint that batch `number` is in the target's staging area. Idempotent.
    async fn mark_batch_as_staged(&self, number: u32) -> Result<()>;

    /// Checkpoint that batch `number` reached the target's delay store. Idempotent.
    async fn mark_batch_as_completed(&self, number: u32) -> Result<()>;

    /// Drop the migration and hand records of incomplete batches back to their
    /// original owner. Records of completed batches stay migrated.
    async fn abort(&self) -> Result<()>;

    /// Endpoints with timeouts due at or before `cutoff_time`, excluding records
    /// already migrated but including those mid-migration.
    async fn list_endpoints(&self, cutoff_time: DateTime<Utc>) -> Result<Vec<EndpointInfo>>;

    /// Archive the migration state after every batch completed.
    async fn complete(&self) -> Result<()>;

    /// Cheap existence check for a migration in progress.
    async fn check_if_a_migration_is_in_progress(&self) -> Result<bool>;

    /// Human-readable source name
    fn source_name(&self) -> &str;
}
