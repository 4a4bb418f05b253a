//! Preview runner: read-only reconnaissance before a migration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::source::TimeoutsSource;
use crate::target::TimeoutsTarget;
use crate::types::EndpointInfo;

/// Cutoff used to list every outstanding timeout
pub const PREVIEW_CUTOFF: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Timeouts due this soon may fire under the legacy manager before migration reaches them
pub const DEFAULT_IMMINENT_WINDOW: Duration = Duration::from_secs(4 * 60 * 60);

/// Preview of one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointPreview {
    pub info: EndpointInfo,
    /// Target preconditions that block migration
    pub problems: Vec<String>,
    /// Risks that don't block migration
    pub warnings: Vec<String>,
}

impl EndpointPreview {
    pub fn can_migrate(&self) -> bool {
        self.problems.is_empty()
    }
}

/// The migration currently in progress, if any
#[derive(Debug, Clone, Serialize)]
pub struct OngoingMigration {
    pub endpoint: String,
    pub run_id: Uuid,
    pub completed_batches: usize,
    pub total_batches: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewReport {
    pub endpoints: Vec<EndpointPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ongoing: Option<OngoingMigration>,
}

impl PreviewReport {
    pub fn can_migrate(&self) -> bool {
        self.endpoints.iter().all(EndpointPreview::can_migrate)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointPreview> {
        self.endpoints.iter().find(|e| e.info.endpoint_name == name)
    }
}

pub struct PreviewRunner {
    source: Arc<dyn TimeoutsSource>,
    target: Arc<dyn TimeoutsTarget>,
    imminent_window: Duration,
}

impl PreviewRunner {
    pub fn new(source: Arc<dyn TimeoutsSource>, target: Arc<dyn TimeoutsTarget>) -> Self {
        Self {
            source,
            target,
            imminent_window: DEFAULT_IMMINENT_WINDOW,
        }
    }

    pub fn with_imminent_window(mut self, window: Duration) -> Self {
        self.imminent_window = window;
        self
    }

    /// List every endpoint with outstanding timeouts and what stands in the way of
    /// migrating it. Never changes the source.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<PreviewReport> {
        let ongoing = self
            .source
            .try_load_ongoing_migration()
            .await?
            .map(|state| OngoingMigration {
                endpoint: state.endpoint_name.clone(),
                run_id: state.run_id,
                completed_batches: state.completed_batches(),
                total_batches: state.batches().len(),
            });

        let mut infos = self.source.list_endpoints(PREVIEW_CUTOFF).await?;
        infos.sort_by(|a, b| a.endpoint_name.cmp(&b.endpoint_name));

        // A window past the representable range reaches every timeout
        let horizon = chrono::Duration::from_std(self.imminent_window)
            .ok()
            .and_then(|window| now.checked_add_signed(window));
        let window_minutes = self.imminent_window.as_secs() / 60;
        let mut endpoints = Vec::with_capacity(infos.len());

        for info in infos {
            let check = self.target.able_to_migrate(&info).await?;

            let mut warnings = Vec::new();
            if horizon.map_or(true, |horizon| info.shortest_timeout <= horizon) {
                warnings.push(format!(
                    "Timeout due at {} is within {}h{:02}m; it may fire before it is migrated",
                    info.shortest_timeout.to_rfc3339(),
                    window_minutes / 60,
                    window_minutes % 60
                ));
            }

            tracing::debug!(
                endpoint = %info.endpoint_name,
                problems = check.problems.len(),
                warnings = warnings.len(),
                "Previewed endpoint"
            );
            endpoints.push(EndpointPreview {
                info,
                problems: check.problems,
                warnings,
            });
        }

        Ok(PreviewReport { endpoints, ongoing })
    }
}
