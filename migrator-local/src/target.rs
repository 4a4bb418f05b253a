//! File-backed native delayed delivery.
//!
//! Layout under the root directory, per endpoint:
//!
//! ```text
//! <endpoint>/staging/batch-<n>/<encoded id>.json   staged, not yet deliverable
//! <endpoint>/delayed/<commit>/<encoded id>.json    committed delay store
//! ```
//!
//! A batch is committed by renaming its whole staging partition into the delay
//! store, so a batch is either fully staged or fully delivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use timeout_migrator::config::LocalAdapterConfig;
use timeout_migrator::{
    chunk_records, ChunkLimits, EndpointInfo, EndpointTargetBatchMigrator, MigrationCheckResult,
    MigrationError, Result, TimeoutRecord, TimeoutsTarget,
};

use crate::files::{
    endpoint_dir_name, list_dirs, list_json_files, read_json, record_file_name,
    remove_dir_if_exists, write_json_atomic,
};

const PARTITION_PREFIX: &str = "batch-";

fn partition_name(batch_number: u32) -> String {
    format!("{}{}", PARTITION_PREFIX, batch_number)
}

fn partition_number(name: &str) -> Option<u32> {
    name.strip_prefix(PARTITION_PREFIX)?.parse().ok()
}

/// A message scheduled for delivery by the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedMessage {
    pub deliver_at: DateTime<Utc>,
    pub timeout: TimeoutRecord,
}

impl DelayedMessage {
    pub fn from_record(timeout: TimeoutRecord) -> Self {
        Self {
            deliver_at: timeout.time,
            timeout,
        }
    }

    /// Overdue timeouts are deliverable right away.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.deliver_at <= now
    }
}

/// Delay store kept as JSON files in a directory.
pub struct LocalTarget {
    root: PathBuf,
    limits: ChunkLimits,
    max_delay: Option<Duration>,
    name: String,
}

impl LocalTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        Self {
            root,
            limits: ChunkLimits::default(),
            max_delay: None,
            name,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &LocalAdapterConfig) -> Self {
        Self::new(root)
            .with_limits(config.chunk_limits())
            .with_max_delay(config.max_delay())
    }

    pub fn with_limits(mut self, limits: ChunkLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Reject endpoints with timeouts further out than `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn endpoint_dir(&self, endpoint_name: &str) -> PathBuf {
        self.root.join(endpoint_dir_name(endpoint_name))
    }

    fn staging_dir(&self, endpoint_name: &str) -> PathBuf {
        self.endpoint_dir(endpoint_name).join("staging")
    }

    fn delayed_dir(&self, endpoint_name: &str) -> PathBuf {
        self.endpoint_dir(endpoint_name).join("delayed")
    }

    /// Every message in the endpoint's delay store, ordered by delivery time.
    pub async fn delayed_messages(&self, endpoint_name: &str) -> Result<Vec<DelayedMessage>> {
        let mut messages = Vec::new();
        for (_, commit) in list_dirs(&self.delayed_dir(endpoint_name)).await? {
            for path in list_json_files(&commit).await? {
                if let Some(message) = read_json::<DelayedMessage>(&path).await? {
                    messages.push(message);
                }
            }
        }
        messages.sort_by(|a, b| {
            a.deliver_at
                .cmp(&b.deliver_at)
                .then_with(|| a.timeout.id.cmp(&b.timeout.id))
        });
        Ok(messages)
    }

    /// Number of records in the endpoint's staging area, across all partitions.
    pub async fn staged_count(&self, endpoint_name: &str) -> Result<usize> {
        let mut count = 0;
        for (_, partition) in list_dirs(&self.staging_dir(endpoint_name)).await? {
            count += list_json_files(&partition).await?.len();
        }
        Ok(count)
    }

    pub async fn has_staging_area(&self, endpoint_name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.staging_dir(endpoint_name)).await?)
    }

    async fn check_writable(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let probe = dir.join(".probe");
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await
    }
}

#[async_trait]
impl TimeoutsTarget for LocalTarget {
    async fn able_to_migrate(&self, endpoint: &EndpointInfo) -> Result<MigrationCheckResult> {
        let mut result = MigrationCheckResult::new();

        if let Some(max_delay) = self.max_delay {
            let horizon = chrono::Duration::from_std(max_delay)
                .ok()
                .and_then(|max| Utc::now().checked_add_signed(max));
            if let Some(horizon) = horizon {
                if endpoint.longest_timeout > horizon {
                    result.add_problem(format!(
                        "Timeout due {} is beyond the maximum delay of {}s",
                        endpoint.longest_timeout.to_rfc3339(),
                        max_delay.as_secs()
                    ));
                }
            }
        }

        let staging = self.staging_dir(&endpoint.endpoint_name);
        if let Err(e) = self.check_writable(&staging).await {
            result.add_problem(format!(
                "Target directory {} is not writable: {}",
                staging.display(),
                e
            ));
        }

        Ok(result)
    }

    async fn prepare_target_endpoint_batch_migrator(
        &self,
        endpoint_name: &str,
    ) -> Result<Box<dyn EndpointTargetBatchMigrator>> {
        let staging = self.staging_dir(endpoint_name);
        let delayed = self.delayed_dir(endpoint_name);
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::create_dir_all(&delayed).await?;

        Ok(Box::new(LocalBatchMigrator {
            endpoint_name: endpoint_name.to_string(),
            staging,
            delayed,
            limits: self.limits,
        }))
    }

    async fn abort(&self, endpoint_name: &str) -> Result<()> {
        remove_dir_if_exists(&self.staging_dir(endpoint_name)).await?;
        info!(endpoint = %endpoint_name, "Removed staging area");
        Ok(())
    }

    async fn complete(&self, endpoint_name: &str) -> Result<()> {
        let remaining = self.staged_count(endpoint_name).await?;
        if remaining > 0 {
            return Err(MigrationError::StagingNotEmpty {
                endpoint: endpoint_name.to_string(),
                remaining,
            });
        }
        remove_dir_if_exists(&self.staging_dir(endpoint_name)).await
    }

    fn target_name(&self) -> &str {
        &self.name
    }
}

/// Stages and commits batches of one endpoint.
struct LocalBatchMigrator {
    endpoint_name: String,
    staging: PathBuf,
    delayed: PathBuf,
    limits: ChunkLimits,
}

#[async_trait]
impl EndpointTargetBatchMigrator for LocalBatchMigrator {
    async fn stage_batch(
        &mut self,
        records: Vec<TimeoutRecord>,
        batch_number: u32,
    ) -> Result<usize> {
        let partition = self.staging.join(partition_name(batch_number));
        tokio::fs::create_dir_all(&partition).await?;

        for chunk in chunk_records(records, self.limits) {
            let size = chunk.len();
            let writes = chunk.into_iter().map(|record| {
                let path = partition.join(record_file_name(&record.id));
                async move { write_json_atomic(&path, &DelayedMessage::from_record(record)).await }
            });
            try_join_all(writes).await?;
            debug!(batch = batch_number, records = size, "Staged chunk");
        }

        // Records are keyed by id, so a restaged batch overwrites instead of adding
        Ok(list_json_files(&partition).await?.len())
    }

    async fn complete_batch(&mut self, batch_number: u32) -> Result<usize> {
        let own = partition_name(batch_number);

        for (name, path) in list_dirs(&self.staging).await? {
            if name == own {
                continue;
            }
            if let Some(other_batch) = partition_number(&name) {
                if !list_json_files(&path).await?.is_empty() {
                    return Err(MigrationError::StagingConflict {
                        endpoint: self.endpoint_name.clone(),
                        batch: batch_number,
                        other_batch,
                    });
                }
            }
        }

        let partition = self.staging.join(&own);
        let count = list_json_files(&partition).await?.len();
        if count == 0 {
            remove_dir_if_exists(&partition).await?;
            return Ok(0);
        }

        tokio::fs::create_dir_all(&self.delayed).await?;
        let commit = self.delayed.join(format!("{}-{}", own, Uuid::new_v4()));
        tokio::fs::rename(&partition, &commit).await?;

        debug!(
            endpoint = %self.endpoint_name,
            batch = batch_number,
            timeouts = count,
            "Committed batch to delay store"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_partition_names() {
        assert_eq!(partition_name(12), "batch-12");
        assert_eq!(partition_number("batch-12"), Some(12));
        assert_eq!(partition_number("batch-x"), None);
        assert_eq!(partition_number(".probe"), None);
    }

    #[test]
    fn test_delayed_message_due() {
        let now = Utc::now();
        let overdue = DelayedMessage::from_record(TimeoutRecord::new(
            "a",
            "Sales",
            "Sales",
            now - ChronoDuration::hours(1),
        ));
        let later = DelayedMessage::from_record(TimeoutRecord::new(
            "b",
            "Sales",
            "Sales",
            now + ChronoDuration::hours(1),
        ));
        assert!(overdue.is_due(now));
        assert!(!later.is_due(now));
        assert_eq!(later.deliver_at, later.timeout.time);
    }
}
