use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use timeout_migrator::config::MigratorConfig;
use timeout_migrator::{PreviewReport, PreviewRunner};

use crate::adapters::AdapterArgs;

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub adapters: AdapterArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// List outstanding timeouts per endpoint and whether the target can take them.
pub async fn run_preview(config: &MigratorConfig, args: &PreviewArgs) -> Result<()> {
    let source = args.adapters.build_source(config.migration.batch_size);
    let target = args.adapters.build_target(config);

    let report = PreviewRunner::new(source, target)
        .with_imminent_window(config.migration.imminent_window())
        .run(Utc::now())
        .await
        .context("Preview failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let blocked = report.endpoints.iter().filter(|e| !e.can_migrate()).count();
    if blocked > 0 {
        anyhow::bail!("{} endpoint(s) cannot be migrated", blocked);
    }
    Ok(())
}

fn print_report(report: &PreviewReport) {
    if let Some(ongoing) = &report.ongoing {
        println!(
            "Migration in progress for '{}' (run {}): {}/{} batches completed",
            ongoing.endpoint, ongoing.run_id, ongoing.completed_batches, ongoing.total_batches
        );
        println!();
    }

    if report.endpoints.is_empty() {
        println!("No timeouts to migrate.");
        return;
    }

    for endpoint in &report.endpoints {
        let info = &endpoint.info;
        println!("{}", info.endpoint_name);
        println!("  Timeouts:      {}", info.nr_of_timeouts);
        println!("  Shortest:      {}", info.shortest_timeout.to_rfc3339());
        println!("  Longest:       {}", info.longest_timeout.to_rfc3339());
        println!(
            "  Destinations:  {}",
            info.destinations
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        for warning in &endpoint.warnings {
            println!("  Warning:       {}", warning);
        }
        if endpoint.can_migrate() {
            println!("  Can migrate:   yes");
        } else {
            println!("  Can migrate:   no");
            for problem in &endpoint.problems {
                println!("    - {}", problem);
            }
        }
        println!();
    }
}
