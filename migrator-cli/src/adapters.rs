//! Source and target selection from the command line.

use clap::{Args, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use timeout_migrator::config::MigratorConfig;
use timeout_migrator::{TimeoutsSource, TimeoutsTarget};
use timeout_migrator_local::{LocalSource, LocalTarget};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// JSON files in a directory
    Local,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// JSON files in a directory
    Local,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Local => write!(f, "local"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AdapterArgs {
    /// Legacy timeout store to migrate from
    #[arg(long, value_enum, default_value_t = SourceKind::Local)]
    pub source: SourceKind,

    /// Directory of the local source
    #[arg(long)]
    pub source_dir: PathBuf,

    /// Delayed delivery to migrate to
    #[arg(long, value_enum, default_value_t = TargetKind::Local)]
    pub target: TargetKind,

    /// Directory of the local target
    #[arg(long)]
    pub target_dir: PathBuf,
}

impl AdapterArgs {
    pub fn build_source(&self, batch_size: usize) -> Arc<dyn TimeoutsSource> {
        match self.source {
            SourceKind::Local => Arc::new(LocalSource::new(&self.source_dir, batch_size)),
        }
    }

    pub fn build_target(&self, config: &MigratorConfig) -> Arc<dyn TimeoutsTarget> {
        match self.target {
            TargetKind::Local => Arc::new(LocalTarget::from_config(&self.target_dir, &config.local)),
        }
    }

    /// Source identity recorded with a run
    pub fn source_description(&self) -> String {
        format!("{}:{}", self.source, self.source_dir.display())
    }

    /// Target identity recorded with a run
    pub fn target_description(&self) -> String {
        format!("{}:{}", self.target, self.target_dir.display())
    }
}
