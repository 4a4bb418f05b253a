use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use std::sync::Arc;

use timeout_migrator::config::MigratorConfig;
use timeout_migrator::{
    AbortRunner, ConsoleProgress, EndpointFilter, MigrationRunner, MigrationSummary, RunParameters,
};

use crate::adapters::AdapterArgs;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub adapters: AdapterArgs,

    /// Migrate timeouts due at or before this time (RFC 3339)
    #[arg(long, value_parser = parse_cutoff, required_unless_present = "abort")]
    pub cutoff_time: Option<DateTime<Utc>>,

    /// Only migrate timeouts of this endpoint
    #[arg(long, conflicts_with = "all_endpoints")]
    pub endpoint: Option<String>,

    /// Migrate timeouts of every endpoint
    #[arg(long)]
    pub all_endpoints: bool,

    /// Timeouts per batch (overrides the configuration)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Resume an ongoing migration even if the parameters changed
    #[arg(long)]
    pub force: bool,

    /// Don't show a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Abort the migration in progress instead of migrating
    #[arg(long)]
    pub abort: bool,
}

fn parse_cutoff(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", value, e))
}

impl MigrateArgs {
    fn filter(&self) -> Result<EndpointFilter> {
        match (&self.endpoint, self.all_endpoints) {
            (Some(name), false) => Ok(EndpointFilter::specific(name.clone())),
            (None, true) => Ok(EndpointFilter::IncludeAll),
            _ => anyhow::bail!("Specify either --endpoint NAME or --all-endpoints"),
        }
    }

    fn effective_batch_size(&self, config: &MigratorConfig) -> Result<usize> {
        let size = self.batch_size.unwrap_or(config.migration.batch_size);
        if size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }
        Ok(size)
    }

    /// Parameters recorded with a run and compared when it is resumed.
    pub fn run_parameters(
        &self,
        cutoff_time: DateTime<Utc>,
        filter: &EndpointFilter,
        batch_size: usize,
    ) -> RunParameters {
        RunParameters::new()
            .with(RunParameters::CUTOFF_TIME, cutoff_time.to_rfc3339())
            .with(RunParameters::ENDPOINT_FILTER, filter.as_parameter())
            .with(RunParameters::SOURCE, self.adapters.source_description())
            .with(RunParameters::TARGET, self.adapters.target_description())
            .with(RunParameters::BATCH_SIZE, batch_size.to_string())
    }
}

/// Migrate timeouts, or abort the migration in progress with `--abort`.
pub async fn run_migrate(config: &MigratorConfig, args: &MigrateArgs) -> Result<()> {
    if args.abort {
        return run_abort(config, args).await;
    }

    let cutoff_time = args
        .cutoff_time
        .context("--cutoff-time is required to migrate")?;
    let filter = args.filter()?;
    let batch_size = args.effective_batch_size(config)?;
    let run_parameters = args.run_parameters(cutoff_time, &filter, batch_size);

    let source = args.adapters.build_source(batch_size);
    let target = args.adapters.build_target(config);
    tracing::info!(
        "Migrating timeouts due before {} for {} from {} to {}",
        cutoff_time.to_rfc3339(),
        filter,
        source.source_name(),
        target.target_name()
    );

    let mut runner =
        MigrationRunner::new(source, target).with_force(args.force || config.migration.force);
    if !args.no_progress {
        runner = runner.with_progress(Arc::new(ConsoleProgress::new()));
    }

    let summary = runner
        .run(cutoff_time, &filter, &run_parameters)
        .await
        .context("Migration failed")?;
    print_summary(&summary);
    Ok(())
}

async fn run_abort(config: &MigratorConfig, args: &MigrateArgs) -> Result<()> {
    let batch_size = args.effective_batch_size(config)?;
    let source = args.adapters.build_source(batch_size);
    let target = args.adapters.build_target(config);

    let summary = AbortRunner::new(source, target)
        .run()
        .await
        .context("Abort failed")?;

    println!(
        "Aborted migration of '{}' (run {}).",
        summary.endpoint, summary.run_id
    );
    println!(
        "  Released:  {} timeout(s) back to the legacy timeout manager",
        summary.released_timeouts
    );
    println!(
        "  Kept:      {} completed batch(es) in the target",
        summary.completed_batches
    );
    Ok(())
}

fn print_summary(summary: &MigrationSummary) {
    if summary.endpoints.is_empty() {
        println!("No timeouts to migrate.");
        return;
    }
    for endpoint in &summary.endpoints {
        println!(
            "{}: {} timeout(s) in {} batch(es){}",
            endpoint.endpoint,
            endpoint.timeouts_migrated,
            endpoint.batches_migrated,
            if endpoint.resumed { " (resumed)" } else { "" }
        );
    }
    println!("Total: {} timeout(s) migrated", summary.total_timeouts());
}
