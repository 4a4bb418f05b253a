//! File-backed reference adapters for timeout-migrator.
//!
//! [`LocalSource`] plays the legacy timeout manager and [`LocalTarget`] the
//! transport's delayed delivery, each keeping its data as JSON files under a root
//! directory. Every write goes through a temporary file and a rename, so each
//! checkpoint is atomic on a single filesystem.
//!
//! ```no_run
//! use std::sync::Arc;
//! use timeout_migrator::MigrationRunner;
//! use timeout_migrator_local::{LocalSource, LocalTarget};
//!
//! let source = Arc::new(LocalSource::new("/var/lib/timeouts", 1000));
//! let target = Arc::new(LocalTarget::new("/var/lib/delayed"));
//! let runner = MigrationRunner::new(source, target);
//! ```

mod files;
pub mod source;
pub mod target;

pub use source::{original_owner, LocalSource, IN_PROGRESS_PREFIX, MIGRATED_PREFIX};
pub use target::{DelayedMessage, LocalTarget};
