//! Durable record of a migration run.
//!
//! A [`ToolState`] is created when a source prepares an endpoint, persisted by the
//! source after every batch transition, and archived or deleted once the run
//! completes or is aborted. Runners only ever hold short-lived copies of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::batch::{BatchInfo, BatchState};
use crate::error::{MigrationError, ParameterDifference, Result};

/// Overall status of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Created, batches not partitioned yet
    NeverRun,
    /// Batches partitioned and persisted
    StoragePrepared,
    /// Every batch reached the target
    Completed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::NeverRun => write!(f, "never_run"),
            MigrationStatus::StoragePrepared => write!(f, "storage_prepared"),
            MigrationStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Settings a run was started with, compared on resume to detect drift.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunParameters(BTreeMap<String, String>);

impl RunParameters {
    pub const CUTOFF_TIME: &'static str = "cutoff_time";
    pub const ENDPOINT_FILTER: &'static str = "endpoint_filter";
    pub const SOURCE: &'static str = "source";
    pub const TARGET: &'static str = "target";
    pub const BATCH_SIZE: &'static str = "batch_size";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys whose values differ between `self` (persisted) and `requested`.
    pub fn diff(&self, requested: &RunParameters) -> Vec<ParameterDifference> {
        let mut keys: Vec<&String> = self.0.keys().chain(requested.0.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let persisted = self.0.get(key);
                let wanted = requested.0.get(key);
                (persisted != wanted).then(|| ParameterDifference {
                    key: key.clone(),
                    persisted: persisted.cloned(),
                    requested: wanted.cloned(),
                })
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RunParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The migration record owned and persisted by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolState {
    pub run_id: Uuid,
    pub endpoint_name: String,
    pub cutoff_time: DateTime<Utc>,
    pub run_parameters: RunParameters,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Ordered by batch number; set once by [`ToolState::init_batches`]
    #[serde(default)]
    batches: Vec<BatchInfo>,
}

impl ToolState {
    pub fn new(
        endpoint_name: impl Into<String>,
        cutoff_time: DateTime<Utc>,
        run_parameters: RunParameters,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            endpoint_name: endpoint_name.into(),
            cutoff_time,
            run_parameters,
            status: MigrationStatus::NeverRun,
            started_at: Utc::now(),
            completed_at: None,
            batches: Vec::new(),
        }
    }

    /// Record the partitioning of this run. Can only happen once.
    pub fn init_batches(&mut self, mut batches: Vec<BatchInfo>) -> Result<()> {
        if self.status != MigrationStatus::NeverRun {
            return Err(MigrationError::AlreadyPrepared {
                endpoint: self.endpoint_name.clone(),
            });
        }

        batches.sort_by_key(|b| b.number);
        for (i, batch) in batches.iter().enumerate() {
            if batch.number as usize != i + 1 {
                return Err(MigrationError::InvalidBatchSequence(format!(
                    "expected batch {} at position {}, found {}",
                    i + 1,
                    i,
                    batch.number
                )));
            }
        }

        self.batches = batches;
        self.status = MigrationStatus::StoragePrepared;
        Ok(())
    }

    pub fn batches(&self) -> &[BatchInfo] {
        &self.batches
    }

    pub fn batch(&self, number: u32) -> Result<&BatchInfo> {
        self.batches
            .iter()
            .find(|b| b.number == number)
            .ok_or(MigrationError::BatchNotFound(number))
    }

    /// The first batch, in number order, that has not reached the target yet.
    pub fn next_batch(&self) -> Option<&BatchInfo> {
        self.batches.iter().find(|b| !b.is_completed())
    }

    pub fn mark_batch_staged(&mut self, number: u32) -> Result<bool> {
        self.advance_batch(number, BatchState::Staged)
    }

    pub fn mark_batch_completed(&mut self, number: u32) -> Result<bool> {
        self.advance_batch(number, BatchState::Completed)
    }

    fn advance_batch(&mut self, number: u32, next: BatchState) -> Result<bool> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.number == number)
            .ok_or(MigrationError::BatchNotFound(number))?;
        batch.advance_to(next)
    }

    pub fn mark_completed(&mut self) {
        self.status = MigrationStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Every batch reached the target, so the run may be archived.
    ///
    /// Never true for a `NeverRun` state: it has no batches because nothing was
    /// partitioned yet, not because everything was migrated.
    pub fn is_finished(&self) -> bool {
        self.status != MigrationStatus::NeverRun && self.next_batch().is_none()
    }

    /// Batches that have not reached the target yet
    pub fn outstanding_batches(&self) -> usize {
        self.batches.len() - self.completed_batches()
    }

    pub fn number_of_timeouts(&self) -> usize {
        self.batches.iter().map(|b| b.number_of_timeouts).sum()
    }

    pub fn completed_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_completed()).count()
    }

    /// Batches whose records have not been committed to the target.
    pub fn incomplete_batches(&self) -> impl Iterator<Item = &BatchInfo> {
        self.batches.iter().filter(|b| !b.is_completed())
    }
}
