use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Progress callbacks for a migration run.
pub trait MigrationProgress: Send + Sync {
    /// Called before the first batch of an endpoint is processed.
    fn on_endpoint_started(&self, endpoint: &str, total_timeouts: u64, total_batches: u32);

    /// Called after a batch is checkpointed as completed.
    fn on_batch_completed(&self, endpoint: &str, batch_number: u32, timeouts: u64);

    /// Called after the endpoint's migration is archived on both sides.
    fn on_endpoint_completed(&self, endpoint: &str);
}

/// No-op progress reporter for when progress isn't needed.
pub struct NoopProgress;

impl MigrationProgress for NoopProgress {
    fn on_endpoint_started(&self, _endpoint: &str, _total_timeouts: u64, _total_batches: u32) {}
    fn on_batch_completed(&self, _endpoint: &str, _batch_number: u32, _timeouts: u64) {}
    fn on_endpoint_completed(&self, _endpoint: &str) {}
}

/// Terminal progress bar, one bar per endpoint.
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
    migrated: AtomicU64,
    start: Instant,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            migrated: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Total timeouts migrated across all endpoints so far
    pub fn migrated(&self) -> u64 {
        self.migrated.load(Ordering::Relaxed)
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationProgress for ConsoleProgress {
    fn on_endpoint_started(&self, endpoint: &str, total_timeouts: u64, total_batches: u32) {
        let bar = ProgressBar::new(total_timeouts);
        bar.set_style(Self::style());
        bar.set_prefix(endpoint.to_string());
        bar.set_message(format!("0/{} batches", total_batches));
        *self.bar.lock() = Some(bar);
    }

    fn on_batch_completed(&self, _endpoint: &str, batch_number: u32, timeouts: u64) {
        self.migrated.fetch_add(timeouts, Ordering::Relaxed);
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.inc(timeouts);
            bar.set_message(format!("batch {} done", batch_number));
        }
    }

    fn on_endpoint_completed(&self, endpoint: &str) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_with_message(format!(
                "Done! Migrated {} in {:.1}s",
                endpoint,
                self.start.elapsed().as_secs_f64()
            ));
        }
    }
}
