//! Records and summaries exchanged between sources, targets and runners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// A scheduled message held by a legacy timeout manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutRecord {
    /// Unique within the source store
    pub id: String,
    /// Logical address the message is delivered to
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<Uuid>,
    /// Message body, opaque to the migration
    #[serde(with = "base64_bytes", default)]
    pub state: Vec<u8>,
    /// When the message is due. May already be in the past.
    pub time: DateTime<Utc>,
    /// Current owner; sources rewrite it to mark in-progress and migrated records
    pub owning_timeout_manager: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl TimeoutRecord {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        owner: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            saga_id: None,
            state: Vec::new(),
            time,
            owning_timeout_manager: owner.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_state(mut self, state: impl Into<Vec<u8>>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_saga_id(mut self, saga_id: Uuid) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    /// Approximate serialized size, used to respect payload caps when staging.
    pub fn estimated_size(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        // base64 inflates the body by 4/3
        self.id.len()
            + self.destination.len()
            + self.owning_timeout_manager.len()
            + self.state.len().div_ceil(3) * 4
            + headers
            + 64
    }
}

/// Outstanding timeouts of one endpoint, as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub endpoint_name: String,
    pub nr_of_timeouts: usize,
    pub shortest_timeout: DateTime<Utc>,
    pub longest_timeout: DateTime<Utc>,
    pub destinations: BTreeSet<String>,
}

impl EndpointInfo {
    /// Summarize a set of records belonging to `endpoint_name`.
    ///
    /// Returns `None` for an empty set, since an endpoint without timeouts has
    /// nothing to migrate.
    pub fn from_records<'a>(
        endpoint_name: impl Into<String>,
        records: impl IntoIterator<Item = &'a TimeoutRecord>,
    ) -> Option<Self> {
        let mut iter = records.into_iter();
        let first = iter.next()?;
        let mut info = Self {
            endpoint_name: endpoint_name.into(),
            nr_of_timeouts: 1,
            shortest_timeout: first.time,
            longest_timeout: first.time,
            destinations: BTreeSet::from([first.destination.clone()]),
        };
        for record in iter {
            info.nr_of_timeouts += 1;
            info.shortest_timeout = info.shortest_timeout.min(record.time);
            info.longest_timeout = info.longest_timeout.max(record.time);
            info.destinations.insert(record.destination.clone());
        }
        Some(info)
    }
}

/// Outcome of a target's precondition check for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCheckResult {
    pub problems: Vec<String>,
}

impl MigrationCheckResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_problem(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    pub fn can_migrate(&self) -> bool {
        self.problems.is_empty()
    }
}

// Serde helper: bytes as a base64 string
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
