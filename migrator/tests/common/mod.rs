//! In-memory source and target that record every call, for exercising the runners.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use timeout_migrator::{
    partition_into_batches, EndpointInfo, EndpointTargetBatchMigrator, MigrationCheckResult,
    MigrationError, Result, RunParameters, TimeoutRecord, TimeoutsSource, TimeoutsTarget,
    ToolState,
};

const IN_PROGRESS: &str = "migrating:";
const MIGRATED: &str = "migrated:";

/// Shared, ordered log of adapter calls with optional injected failures.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
    fail_points: Arc<Mutex<HashSet<String>>>,
}

impl CallLog {
    pub fn record(&self, call: impl Into<String>) -> Result<()> {
        let call = call.into();
        self.calls.lock().push(call.clone());
        if self.fail_points.lock().remove(&call) {
            return Err(MigrationError::Adapter(format!("injected failure at {}", call)));
        }
        Ok(())
    }

    /// Fail the next occurrence of `call`
    pub fn fail_at(&self, call: impl Into<String>) {
        self.fail_points.lock().insert(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    pub fn contains(&self, call: &str) -> bool {
        self.position(call).is_some()
    }
}

#[derive(Default)]
struct SourceData {
    records: BTreeMap<String, TimeoutRecord>,
    state: Option<ToolState>,
    archived: Vec<ToolState>,
}

pub struct InMemorySource {
    data: Mutex<SourceData>,
    page_size: usize,
    log: CallLog,
}

fn original_owner(owner: &str) -> &str {
    owner
        .strip_prefix(IN_PROGRESS)
        .or_else(|| owner.strip_prefix(MIGRATED))
        .unwrap_or(owner)
}

impl InMemorySource {
    pub fn new(page_size: usize, log: CallLog) -> Self {
        Self {
            data: Mutex::new(SourceData::default()),
            page_size,
            log,
        }
    }

    pub fn insert(&self, record: TimeoutRecord) {
        self.data.lock().records.insert(record.id.clone(), record);
    }

    /// Add `count` timeouts owned by `endpoint`, due one minute apart from `start`
    pub fn seed(&self, endpoint: &str, count: usize, start: DateTime<Utc>) {
        for i in 0..count {
            self.insert(
                TimeoutRecord::new(
                    format!("{}-{:05}", endpoint, i),
                    format!("{}.Handler", endpoint),
                    endpoint,
                    start + Duration::minutes(i as i64),
                )
                .with_state(format!("payload {}", i).into_bytes())
                .with_header("NServiceBus.MessageId", format!("msg-{}", i)),
            );
        }
    }

    pub fn owner_of(&self, id: &str) -> Option<String> {
        self.data
            .lock()
            .records
            .get(id)
            .map(|r| r.owning_timeout_manager.clone())
    }

    pub fn state(&self) -> Option<ToolState> {
        self.data.lock().state.clone()
    }

    pub fn archived(&self) -> Vec<ToolState> {
        self.data.lock().archived.clone()
    }

    pub fn set_state(&self, state: ToolState) {
        self.data.lock().state = Some(state);
    }
}

#[async_trait]
impl TimeoutsSource for InMemorySource {
    async fn try_load_ongoing_migration(&self) -> Result<Option<ToolState>> {
        self.log.record("source.try_load_ongoing_migration")?;
        Ok(self.data.lock().state.clone())
    }

    async fn prepare(
        &self,
        cutoff_time: DateTime<Utc>,
        endpoint_name: &str,
        run_parameters: &RunParameters,
    ) -> Result<ToolState> {
        self.log.record(format!("source.prepare({})", endpoint_name))?;
        let mut data = self.data.lock();
        if data.state.is_some() {
            return Err(MigrationError::AlreadyPrepared {
                endpoint: endpoint_name.to_string(),
            });
        }

        let mut eligible: Vec<&TimeoutRecord> = data
            .records
            .values()
            .filter(|r| r.owning_timeout_manager == endpoint_name && r.time <= cutoff_time)
            .collect();
        eligible.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        let ids: Vec<String> = eligible.into_iter().map(|r| r.id.clone()).collect();

        for id in &ids {
            if let Some(record) = data.records.get_mut(id) {
                record.owning_timeout_manager = format!("{}{}", IN_PROGRESS, endpoint_name);
            }
        }

        let mut state = ToolState::new(endpoint_name, cutoff_time, run_parameters.clone());
        state.init_batches(partition_into_batches(ids, self.page_size))?;
        data.state = Some(state.clone());
        Ok(state)
    }

    async fn read_batch(&self, number: u32) -> Result<Vec<TimeoutRecord>> {
        self.log.record(format!("source.read_batch({})", number))?;
        let data = self.data.lock();
        let state = data
            .state
            .as_ref()
            .ok_or(MigrationError::NoMigrationInProgress)?;
        let batch = state.batch(number)?;
        Ok(batch
            .timeout_ids
            .iter()
            .filter_map(|id| data.records.get(id).cloned())
            .collect())
    }

    async fn mark_batch_as_staged(&self, number: u32) -> Result<()> {
        self.log.record(format!("source.mark_batch_as_staged({})", number))?;
        let mut data = self.data.lock();
        let state = data
            .state
            .as_mut()
            .ok_or(MigrationError::NoMigrationInProgress)?;
        state.mark_batch_staged(number)?;
        Ok(())
    }

    async fn mark_batch_as_completed(&self, number: u32) -> Result<()> {
        self.log
            .record(format!("source.mark_batch_as_completed({})", number))?;
        let mut data = self.data.lock();
        let SourceData { records, state, .. } = &mut *data;
        let state = state.as_mut().ok_or(MigrationError::NoMigrationInProgress)?;
        state.mark_batch_completed(number)?;
        for id in &state.batch(number)?.timeout_ids {
            if let Some(record) = records.get_mut(id) {
                let owner = original_owner(&record.owning_timeout_manager).to_string();
                record.owning_timeout_manager = format!("{}{}", MIGRATED, owner);
            }
        }
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        self.log.record("source.abort")?;
        let mut data = self.data.lock();
        let Some(state) = data.state.take() else {
            return Ok(());
        };
        for batch in state.incomplete_batches() {
            for id in &batch.timeout_ids {
                if let Some(record) = data.records.get_mut(id) {
                    record.owning_timeout_manager =
                        original_owner(&record.owning_timeout_manager).to_string();
                }
            }
        }
        Ok(())
    }

    async fn list_endpoints(&self, cutoff_time: DateTime<Utc>) -> Result<Vec<EndpointInfo>> {
        self.log.record("source.list_endpoints")?;
        let data = self.data.lock();
        let mut by_endpoint: HashMap<&str, Vec<&TimeoutRecord>> = HashMap::new();
        for record in data.records.values() {
            if record.owning_timeout_manager.starts_with(MIGRATED) || record.time > cutoff_time {
                continue;
            }
            by_endpoint
                .entry(original_owner(&record.owning_timeout_manager))
                .or_default()
                .push(record);
        }
        Ok(by_endpoint
            .into_iter()
            .filter_map(|(name, records)| EndpointInfo::from_records(name, records))
            .collect())
    }

    async fn complete(&self) -> Result<()> {
        self.log.record("source.complete")?;
        let mut data = self.data.lock();
        if let Some(mut state) = data.state.take() {
            state.mark_completed();
            data.archived.push(state);
        }
        Ok(())
    }

    async fn check_if_a_migration_is_in_progress(&self) -> Result<bool> {
        self.log.record("source.check_if_a_migration_is_in_progress")?;
        Ok(self.data.lock().state.is_some())
    }

    fn source_name(&self) -> &str {
        "in-memory"
    }
}

#[derive(Default)]
struct TargetData {
    /// endpoint -> batch -> id -> record
    staging: HashMap<String, BTreeMap<u32, BTreeMap<String, TimeoutRecord>>>,
    delayed: HashMap<String, BTreeMap<String, TimeoutRecord>>,
    problems: HashMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct InMemoryTarget {
    data: Arc<Mutex<TargetData>>,
    log: CallLog,
}

impl InMemoryTarget {
    pub fn new(log: CallLog) -> Self {
        Self {
            data: Arc::new(Mutex::new(TargetData::default())),
            log,
        }
    }

    pub fn add_problem(&self, endpoint: &str, problem: &str) {
        self.data
            .lock()
            .problems
            .entry(endpoint.to_string())
            .or_default()
            .push(problem.to_string());
    }

    pub fn delayed(&self, endpoint: &str) -> Vec<TimeoutRecord> {
        self.data
            .lock()
            .delayed
            .get(endpoint)
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_staging_area(&self, endpoint: &str) -> bool {
        self.data.lock().staging.contains_key(endpoint)
    }

    pub fn staged_count(&self, endpoint: &str) -> usize {
        self.data
            .lock()
            .staging
            .get(endpoint)
            .map(|batches| batches.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Put a record straight into a staging partition
    pub fn stage_directly(&self, endpoint: &str, batch: u32, record: TimeoutRecord) {
        self.data
            .lock()
            .staging
            .entry(endpoint.to_string())
            .or_default()
            .entry(batch)
            .or_default()
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl TimeoutsTarget for InMemoryTarget {
    async fn able_to_migrate(&self, endpoint: &EndpointInfo) -> Result<MigrationCheckResult> {
        self.log
            .record(format!("target.able_to_migrate({})", endpoint.endpoint_name))?;
        let data = self.data.lock();
        Ok(MigrationCheckResult {
            problems: data
                .problems
                .get(&endpoint.endpoint_name)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn prepare_target_endpoint_batch_migrator(
        &self,
        endpoint_name: &str,
    ) -> Result<Box<dyn EndpointTargetBatchMigrator>> {
        self.log
            .record(format!("target.prepare_migrator({})", endpoint_name))?;
        self.data
            .lock()
            .staging
            .entry(endpoint_name.to_string())
            .or_default();
        Ok(Box::new(InMemoryBatchMigrator {
            endpoint: endpoint_name.to_string(),
            data: Arc::clone(&self.data),
            log: self.log.clone(),
        }))
    }

    async fn abort(&self, endpoint_name: &str) -> Result<()> {
        self.log.record(format!("target.abort({})", endpoint_name))?;
        self.data.lock().staging.remove(endpoint_name);
        Ok(())
    }

    async fn complete(&self, endpoint_name: &str) -> Result<()> {
        self.log.record(format!("target.complete({})", endpoint_name))?;
        let mut data = self.data.lock();
        let remaining: usize = data
            .staging
            .get(endpoint_name)
            .map(|batches| batches.values().map(BTreeMap::len).sum())
            .unwrap_or(0);
        if remaining > 0 {
            return Err(MigrationError::StagingNotEmpty {
                endpoint: endpoint_name.to_string(),
                remaining,
            });
        }
        data.staging.remove(endpoint_name);
        Ok(())
    }

    fn target_name(&self) -> &str {
        "in-memory"
    }
}

struct InMemoryBatchMigrator {
    endpoint: String,
    data: Arc<Mutex<TargetData>>,
    log: CallLog,
}

#[async_trait]
impl EndpointTargetBatchMigrator for InMemoryBatchMigrator {
    async fn stage_batch(
        &mut self,
        records: Vec<TimeoutRecord>,
        batch_number: u32,
    ) -> Result<usize> {
        self.log
            .record(format!("target.stage_batch({})", batch_number))?;
        let mut data = self.data.lock();
        let partition = data
            .staging
            .entry(self.endpoint.clone())
            .or_default()
            .entry(batch_number)
            .or_default();
        for record in records {
            partition.insert(record.id.clone(), record);
        }
        Ok(partition.len())
    }

    async fn complete_batch(&mut self, batch_number: u32) -> Result<usize> {
        self.log
            .record(format!("target.complete_batch({})", batch_number))?;
        let mut data = self.data.lock();
        let staging = data.staging.entry(self.endpoint.clone()).or_default();
        if let Some((&other, _)) = staging
            .iter()
            .find(|(n, records)| **n != batch_number && !records.is_empty())
        {
            return Err(MigrationError::StagingConflict {
                endpoint: self.endpoint.clone(),
                batch: batch_number,
                other_batch: other,
            });
        }
        let moved = staging.remove(&batch_number).unwrap_or_default();
        let count = moved.len();
        data.delayed
            .entry(self.endpoint.clone())
            .or_default()
            .extend(moved);
        Ok(count)
    }
}

pub struct Harness {
    pub log: CallLog,
    pub source: Arc<InMemorySource>,
    pub target: Arc<InMemoryTarget>,
}

impl Harness {
    pub fn new(page_size: usize) -> Self {
        let log = CallLog::default();
        Self {
            source: Arc::new(InMemorySource::new(page_size, log.clone())),
            target: Arc::new(InMemoryTarget::new(log.clone())),
            log,
        }
    }

    pub fn runner(&self) -> timeout_migrator::MigrationRunner {
        timeout_migrator::MigrationRunner::new(self.source.clone(), self.target.clone())
    }
}

pub fn params(cutoff: DateTime<Utc>, endpoint: &str) -> RunParameters {
    RunParameters::new()
        .with(RunParameters::CUTOFF_TIME, cutoff.to_rfc3339())
        .with(RunParameters::ENDPOINT_FILTER, endpoint)
}
