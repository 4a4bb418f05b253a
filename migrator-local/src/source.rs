//! File-backed legacy timeout store.
//!
//! Layout under the root directory:
//!
//! ```text
//! timeouts/<encoded id>.json              one TimeoutRecord per file
//! migration/state.json                    ToolState of the run in progress
//! migration/archive/<endpoint>-<run>.json ToolStates of completed runs
//! ```
//!
//! Claimed records stay in place; their owner is rewritten with a marker prefix
//! so the legacy manager no longer dispatches them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use timeout_migrator::{
    partition_into_batches, EndpointInfo, MigrationError, Result, RunParameters, TimeoutRecord,
    TimeoutsSource, ToolState,
};

use crate::files::{
    endpoint_dir_name, list_json_files, read_json, record_file_name, write_json_atomic,
};

/// Owner prefix of records claimed by the migration in progress
pub const IN_PROGRESS_PREFIX: &str = "__hidden__";
/// Owner prefix of records that reached the target
pub const MIGRATED_PREFIX: &str = "__migrated__";

const IO_CONCURRENCY: usize = 16;

/// Owner of a record with any migration marker removed.
pub fn original_owner(owner: &str) -> &str {
    owner
        .strip_prefix(IN_PROGRESS_PREFIX)
        .or_else(|| owner.strip_prefix(MIGRATED_PREFIX))
        .unwrap_or(owner)
}

fn hidden(owner: &str) -> String {
    format!("{}{}", IN_PROGRESS_PREFIX, original_owner(owner))
}

fn migrated(owner: &str) -> String {
    format!("{}{}", MIGRATED_PREFIX, original_owner(owner))
}

fn restored(owner: &str) -> String {
    original_owner(owner).to_string()
}

/// Timeout store kept as JSON files in a directory.
pub struct LocalSource {
    root: PathBuf,
    batch_size: usize,
    name: String,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, batch_size: usize) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        Self {
            root,
            batch_size: batch_size.max(1),
            name,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn timeouts_dir(&self) -> PathBuf {
        self.root.join("timeouts")
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.timeouts_dir().join(record_file_name(id))
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("migration").join("state.json")
    }

    fn archive_dir(&self) -> PathBuf {
        self.root.join("migration").join("archive")
    }

    /// Store a timeout, replacing any record with the same id.
    pub async fn add_timeout(&self, record: &TimeoutRecord) -> Result<()> {
        write_json_atomic(&self.record_path(&record.id), record).await
    }

    pub async fn get_timeout(&self, id: &str) -> Result<Option<TimeoutRecord>> {
        read_json(&self.record_path(id)).await
    }

    /// States of completed runs, oldest first.
    pub async fn archived_states(&self) -> Result<Vec<ToolState>> {
        let mut states = Vec::new();
        for path in list_json_files(&self.archive_dir()).await? {
            if let Some(state) = read_json::<ToolState>(&path).await? {
                states.push(state);
            }
        }
        states.sort_by_key(|s| s.started_at);
        Ok(states)
    }

    async fn load_records(&self) -> Result<Vec<TimeoutRecord>> {
        let paths = list_json_files(&self.timeouts_dir()).await?;
        let records: Vec<Option<TimeoutRecord>> = stream::iter(paths)
            .map(|path| async move { read_json::<TimeoutRecord>(&path).await })
            .buffered(IO_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(records.into_iter().flatten().collect())
    }

    async fn load_state(&self) -> Result<Option<ToolState>> {
        read_json(&self.state_path()).await
    }

    async fn require_state(&self) -> Result<ToolState> {
        self.load_state()
            .await?
            .ok_or(MigrationError::NoMigrationInProgress)
    }

    async fn save_state(&self, state: &ToolState) -> Result<()> {
        write_json_atomic(&self.state_path(), state).await
    }

    /// Rewrite the owner of every record in `ids`. Records already carrying the
    /// new owner are left alone, so repeating a call is harmless.
    async fn set_owners(&self, ids: &[String], owner_fn: fn(&str) -> String) -> Result<()> {
        stream::iter(ids.to_vec())
            .map(|id| async move {
                let path = self.record_path(&id);
                let Some(mut record) = read_json::<TimeoutRecord>(&path).await? else {
                    warn!(id = %id, "Timeout vanished from the store");
                    return Ok(());
                };
                let owner = owner_fn(&record.owning_timeout_manager);
                if owner != record.owning_timeout_manager {
                    record.owning_timeout_manager = owner;
                    write_json_atomic(&path, &record).await?;
                }
                Ok::<_, MigrationError>(())
            })
            .buffer_unordered(IO_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TimeoutsSource for LocalSource {
    async fn try_load_ongoing_migration(&self) -> Result<Option<ToolState>> {
        self.load_state().await
    }

    async fn prepare(
        &self,
        cutoff_time: DateTime<Utc>,
        endpoint_name: &str,
        run_parameters: &RunParameters,
    ) -> Result<ToolState> {
        if let Some(existing) = self.load_state().await? {
            return Err(MigrationError::AlreadyPrepared {
                endpoint: existing.endpoint_name,
            });
        }

        let mut eligible: Vec<TimeoutRecord> = self
            .load_records()
            .await?
            .into_iter()
            .filter(|r| r.owning_timeout_manager == endpoint_name && r.time <= cutoff_time)
            .collect();
        eligible.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        let ids: Vec<String> = eligible.into_iter().map(|r| r.id).collect();

        let mut state = ToolState::new(endpoint_name, cutoff_time, run_parameters.clone());
        state.init_batches(partition_into_batches(ids.clone(), self.batch_size))?;

        // Records are never hidden without a persisted run to restore them from
        self.save_state(&state).await?;
        self.set_owners(&ids, hidden).await?;

        info!(
            endpoint = %endpoint_name,
            timeouts = ids.len(),
            batches = state.batches().len(),
            "Prepared timeouts for migration"
        );
        Ok(state)
    }

    async fn read_batch(&self, number: u32) -> Result<Vec<TimeoutRecord>> {
        let state = self.require_state().await?;
        let batch = state.batch(number)?;

        let records: Vec<Option<TimeoutRecord>> = stream::iter(batch.timeout_ids.clone())
            .map(|id| async move { self.get_timeout(&id).await })
            .buffered(IO_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(records.into_iter().flatten().collect())
    }

    async fn mark_batch_as_staged(&self, number: u32) -> Result<()> {
        let mut state = self.require_state().await?;
        if state.mark_batch_staged(number)? {
            self.save_state(&state).await?;
        }
        Ok(())
    }

    async fn mark_batch_as_completed(&self, number: u32) -> Result<()> {
        let mut state = self.require_state().await?;
        let ids = state.batch(number)?.timeout_ids.clone();

        // Owners before state; a resumed run repeats this call
        self.set_owners(&ids, migrated).await?;
        if state.mark_batch_completed(number)? {
            self.save_state(&state).await?;
        }
        debug!(batch = number, timeouts = ids.len(), "Batch marked as migrated");
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        let state = self.require_state().await?;
        let ids: Vec<String> = state
            .incomplete_batches()
            .flat_map(|b| b.timeout_ids.iter().cloned())
            .collect();

        self.set_owners(&ids, restored).await?;
        tokio::fs::remove_file(self.state_path()).await?;

        info!(
            endpoint = %state.endpoint_name,
            released = ids.len(),
            "Aborted migration"
        );
        Ok(())
    }

    async fn list_endpoints(&self, cutoff_time: DateTime<Utc>) -> Result<Vec<EndpointInfo>> {
        let records = self.load_records().await?;

        let mut by_owner: BTreeMap<&str, Vec<&TimeoutRecord>> = BTreeMap::new();
        for record in &records {
            if record.owning_timeout_manager.starts_with(MIGRATED_PREFIX)
                || record.time > cutoff_time
            {
                continue;
            }
            by_owner
                .entry(original_owner(&record.owning_timeout_manager))
                .or_default()
                .push(record);
        }

        Ok(by_owner
            .into_iter()
            .filter_map(|(owner, records)| EndpointInfo::from_records(owner, records))
            .collect())
    }

    async fn complete(&self) -> Result<()> {
        let mut state = self.require_state().await?;
        if let Some(batch) = state.next_batch() {
            return Err(MigrationError::Adapter(format!(
                "cannot complete migration of '{}': batch {} is {}",
                state.endpoint_name, batch.number, batch.state
            )));
        }

        state.mark_completed();
        let archived = self.archive_dir().join(format!(
            "{}-{}.json",
            endpoint_dir_name(&state.endpoint_name),
            state.run_id
        ));
        write_json_atomic(&archived, &state).await?;
        tokio::fs::remove_file(self.state_path()).await?;

        info!(
            endpoint = %state.endpoint_name,
            timeouts = state.number_of_timeouts(),
            "Archived completed migration"
        );
        Ok(())
    }

    async fn check_if_a_migration_is_in_progress(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.state_path()).await?)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
