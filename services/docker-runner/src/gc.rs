//! Garbage collection of stale containers.
//!
//! The collector runs one pass per tick:
//! - Snapshot registry entries recorded more than `gc_delay` ago
//! - Inspect each candidate
//! - Remove dead/exited containers that finished more than `gc_delay` ago and
//!   created containers that were never started within `gc_delay`
//!
//! A container that no longer exists is dropped from the registry. Failures
//! are logged per candidate; the entry stays registered and is retried on the
//! next pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::docker::{ContainerInspect, ContainerStatus};
use crate::registry::{age_boundary, ContainerRegistry};
use crate::runtime::ContainerRuntime;

/// Default interval between collection passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Default minimum age before a container is considered.
pub const DEFAULT_GC_DELAY: Duration = Duration::from_secs(10 * 60);

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Minimum age of a registry entry and of the container's exit before it
    /// is collected.
    pub gc_delay: Duration,

    /// Interval between passes.
    pub interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            gc_delay: DEFAULT_GC_DELAY,
            interval: DEFAULT_GC_INTERVAL,
        }
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Candidates inspected.
    pub inspected: usize,

    /// Containers removed.
    pub removed: usize,

    /// Entries dropped because the container was already gone.
    pub reconciled: usize,

    /// Candidates whose inspection or removal failed.
    pub failed: usize,
}

/// Returns true if an inspected container may be removed.
///
/// `boundary` is `now - gc_delay`; the runtime's own timestamps decide.
pub fn is_collectable(container: &ContainerInspect, boundary: DateTime<Utc>) -> bool {
    match container.state.status {
        ContainerStatus::Dead | ContainerStatus::Exited => {
            container.state.finished_at < boundary
        }
        ContainerStatus::Created => container.created < boundary,
        _ => false,
    }
}

/// Background garbage collector.
pub struct Collector {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ContainerRegistry>,
    config: CollectorConfig,
}

impl Collector {
    /// Create a collector over the given runtime and registry.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<ContainerRegistry>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
        }
    }

    /// Run collection passes until shutdown is signalled or the sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            gc_delay_secs = self.config.gc_delay.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "Starting container garbage collector"
        );

        // Nothing recorded at spawn time is old enough yet; first pass after
        // one period.
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.collect_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Container garbage collector shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform one collection pass now.
    pub async fn collect_once(&self) -> CollectionReport {
        self.collect_at(Utc::now()).await
    }

    /// Perform one collection pass as if the current time were `now`.
    pub async fn collect_at(&self, now: DateTime<Utc>) -> CollectionReport {
        let mut report = CollectionReport::default();
        let Some(boundary) = age_boundary(now, self.config.gc_delay) else {
            return report;
        };

        let candidates = self.registry.snapshot_older_than(now, self.config.gc_delay);
        for id in candidates {
            report.inspected += 1;

            let container = match self.runtime.inspect_container(&id).await {
                Ok(container) => container,
                Err(e) if e.is_not_found() => {
                    debug!(container_id = %id, "Container no longer exists");
                    self.registry.unrecord(&id);
                    report.reconciled += 1;
                    continue;
                }
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to inspect container");
                    report.failed += 1;
                    continue;
                }
            };

            if !is_collectable(&container, boundary) {
                continue;
            }

            info!(
                container_id = %id,
                status = ?container.state.status,
                "Removing old container"
            );
            match self.runtime.remove_container(&id, false).await {
                Ok(()) => {
                    self.registry.unrecord(&id);
                    report.removed += 1;
                }
                Err(e) if e.is_not_found() => {
                    self.registry.unrecord(&id);
                    report.reconciled += 1;
                }
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to remove container");
                    report.failed += 1;
                }
            }
        }

        if report.inspected > 0 {
            debug!(
                inspected = report.inspected,
                removed = report.removed,
                reconciled = report.reconciled,
                failed = report.failed,
                remaining = self.registry.len(),
                "Garbage collection pass complete"
            );
        }
        report
    }
}
