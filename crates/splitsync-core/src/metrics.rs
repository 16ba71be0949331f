//! Global atomic counters for sync activity.
//!
//! Counters are bumped at the call site; [`Metrics::flush`] emits all values
//! as one `info!` event, e.g. after a batch of deliveries.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    syncs_started: AtomicU64,
    secondary_created: AtomicU64,
    pipeline_aborts: AtomicU64,
    status_writes: AtomicU64,
    status_writes_skipped: AtomicU64,
    force_pushes_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            syncs_started: AtomicU64::new(0),
            secondary_created: AtomicU64::new(0),
            pipeline_aborts: AtomicU64::new(0),
            status_writes: AtomicU64::new(0),
            status_writes_skipped: AtomicU64::new(0),
            force_pushes_skipped: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, metric: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = metric, "counter incremented");
    }

    pub fn inc_syncs_started(&self) {
        Self::bump(&self.syncs_started, "syncs_started");
    }

    pub fn inc_secondary_created(&self) {
        Self::bump(&self.secondary_created, "secondary_created");
    }

    pub fn inc_pipeline_aborts(&self) {
        Self::bump(&self.pipeline_aborts, "pipeline_aborts");
    }

    pub fn inc_status_writes(&self) {
        Self::bump(&self.status_writes, "status_writes");
    }

    /// An aggregate status was already current on the secondary.
    pub fn inc_status_writes_skipped(&self) {
        Self::bump(&self.status_writes_skipped, "status_writes_skipped");
    }

    pub fn inc_force_pushes_skipped(&self) {
        Self::bump(&self.force_pushes_skipped, "force_pushes_skipped");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            syncs_started = self.syncs_started(),
            secondary_created = self.secondary_created(),
            pipeline_aborts = self.pipeline_aborts(),
            status_writes = self.status_writes(),
            status_writes_skipped = self.status_writes_skipped(),
            force_pushes_skipped = self.force_pushes_skipped(),
        );
    }

    pub fn syncs_started(&self) -> u64 {
        self.syncs_started.load(Ordering::Relaxed)
    }

    pub fn secondary_created(&self) -> u64 {
        self.secondary_created.load(Ordering::Relaxed)
    }

    pub fn pipeline_aborts(&self) -> u64 {
        self.pipeline_aborts.load(Ordering::Relaxed)
    }

    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::Relaxed)
    }

    pub fn status_writes_skipped(&self) -> u64 {
        self.status_writes_skipped.load(Ordering::Relaxed)
    }

    pub fn force_pushes_skipped(&self) -> u64 {
        self.force_pushes_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.syncs_started,
            &self.secondary_created,
            &self.pipeline_aborts,
            &self.status_writes,
            &self.status_writes_skipped,
            &self.force_pushes_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
