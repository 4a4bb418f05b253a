//! timeout-migrator: move scheduled messages from a legacy timeout manager to a
//! transport's native delayed delivery.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            │  Runners                                 │
//!            │  ┌───────────┐ ┌───────────┐ ┌─────────┐ │
//!            │  │ Migration │ │  Abort    │ │ Preview │ │
//!            │  └─────┬─────┘ └─────┬─────┘ └────┬────┘ │
//!            └────────┼─────────────┼────────────┼──────┘
//!                     ▼             ▼            ▼
//!        ┌────────────────────┐        ┌────────────────────┐
//!        │  TimeoutsSource    │        │  TimeoutsTarget    │
//!        │  (store of record, │        │  staging area +    │
//!        │   owns ToolState)  │        │  native delays     │
//!        └────────────────────┘        └────────────────────┘
//! ```
//!
//! A run claims an endpoint's timeouts on the source, partitions them into
//! numbered batches and moves each batch through `pending → staged → completed`,
//! checkpointing every step in the source's [`ToolState`]. Interrupted runs are
//! resumed by running again; [`AbortRunner`] hands claimed timeouts back instead.
//!
//! Only one run may be active against a source at a time.

pub mod abort;
pub mod batch;
pub mod chunking;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod preview;
pub mod progress;
pub mod runner;
pub mod source;
pub mod state;
pub mod target;
pub mod types;

pub use abort::{AbortRunner, AbortSummary};
pub use batch::{partition_into_batches, BatchInfo, BatchState};
pub use chunking::{chunk_records, ChunkLimits};
pub use config::{LogFormat, LoggingConfig, MigratorConfig};
pub use error::{BatchPhase, MigrationError, ParameterDifference, Result};
pub use filter::EndpointFilter;
pub use preview::{EndpointPreview, PreviewReport, PreviewRunner, PREVIEW_CUTOFF};
pub use progress::{ConsoleProgress, MigrationProgress, NoopProgress};
pub use runner::{EndpointSummary, MigrationRunner, MigrationSummary};
pub use source::TimeoutsSource;
pub use state::{MigrationStatus, RunParameters, ToolState};
pub use target::{EndpointTargetBatchMigrator, TimeoutsTarget};
pub use types::{EndpointInfo, MigrationCheckResult, TimeoutRecord};
