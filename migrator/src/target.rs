//! Target capability: a transport's native delayed delivery.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EndpointInfo, MigrationCheckResult, TimeoutRecord};

/// A transport's native delay mechanism.
#[async_trait]
pub trait TimeoutsTarget: Send + Sync {
    /// Check whether the endpoint's timeouts can be migrated.
    ///
    /// Must not change long-lived state. Creating the endpoint's staging area is
    /// allowed since it is idempotent and needed later anyway.
    async fn able_to_migrate(&self, endpoint: &EndpointInfo) -> Result<MigrationCheckResult>;

    /// Open a batch migrator scoped to one endpoint, creating its staging area.
    ///
    /// Resources held by the migrator are released when it is dropped.
    async fn prepare_target_endpoint_batch_migrator(
        &self,
        endpoint_name: &str,
    ) -> Result<Box<dyn EndpointTargetBatchMigrator>>;

    /// Remove the endpoint's staging area and everything in it.
    async fn abort(&self, endpoint_name: &str) -> Result<()>;

    /// Remove the endpoint's staging area.
    ///
    /// Fails with `MigrationError::StagingNotEmpty`, leaving the staging area in
    /// place, if any record was never moved to the delay store.
    async fn complete(&self, endpoint_name: &str) -> Result<()>;

    /// Human-readable target name
    fn target_name(&self) -> &str;
}

/// Moves batches of one endpoint into the target, through a staging area.
#[async_trait]
pub trait EndpointTargetBatchMigrator: Send {
    /// Write `records` into the staging partition of batch `batch_number`.
    ///
    /// Staging the same batch twice must not produce duplicates. Returns the
    /// number of records staged.
    async fn stage_batch(&mut self, records: Vec<TimeoutRecord>, batch_number: u32)
        -> Result<usize>;

    /// Atomically move the staged records of `batch_number` into the delay store
    /// and clear the partition.
    ///
    /// Returns the number moved; 0 when nothing is staged (re-entry after a crash).
    async fn complete_batch(&mut self, batch_number: u32) -> Result<usize>;
}
