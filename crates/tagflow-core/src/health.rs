// ── Health monitor ──
//
// Periodically exercises each endpoint's authentication path on a fixed
// base tick. Endpoints whose next-poll deadline lies in the future are
// skipped; failures push the deadline out linearly up to a ceiling.
// Every cycle publishes exactly one health snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tagflow_api::ReaderTransport;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcast::BroadcastGateway;
use crate::config::HealthConfig;
use crate::model::HealthRecord;
use crate::session::{ReaderFleet, SessionController};

/// What happened to one endpoint during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollResult {
    Succeeded,
    Failed,
    NotDue,
    Busy,
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Not yet due, or busy with a lifecycle operation.
    pub skipped: usize,
}

/// Adaptive health poller over a reader fleet.
pub struct HealthMonitor<T> {
    fleet: Arc<ReaderFleet<T>>,
    gateway: Arc<BroadcastGateway>,
    config: HealthConfig,
}

impl<T: ReaderTransport> HealthMonitor<T> {
    pub fn new(fleet: Arc<ReaderFleet<T>>, gateway: Arc<BroadcastGateway>, config: HealthConfig) -> Self {
        Self {
            fleet,
            gateway,
            config,
        }
    }

    /// Delay before the next poll after a success.
    pub fn success_delay(&self) -> Duration {
        success_delay(&self.config)
    }

    /// Delay before the next poll after `failures` consecutive failures.
    pub fn failure_delay(&self, failures: u32) -> Duration {
        failure_delay(&self.config, failures)
    }

    /// Check every due endpoint concurrently, then publish one snapshot.
    pub async fn poll_cycle(&self) -> CycleReport {
        let now = Instant::now();
        let checks = self
            .fleet
            .controllers()
            .iter()
            .cloned()
            .map(|c| poll_endpoint(c, self.config, now));
        let results = join_all(checks).await;

        let mut report = CycleReport::default();
        for result in results {
            match result {
                PollResult::Succeeded => report.succeeded += 1,
                PollResult::Failed => report.failed += 1,
                PollResult::NotDue | PollResult::Busy => report.skipped += 1,
            }
        }

        self.gateway.publish_health(self.fleet.health_snapshot());
        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "health cycle complete"
        );
        report
    }

    /// Poll on the base interval until cancelled. The first cycle runs
    /// immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.base_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_cycle().await;
                }
            }
        }
        debug!("health monitor stopped");
    }
}

async fn poll_endpoint<T: ReaderTransport>(
    controller: Arc<SessionController<T>>,
    config: HealthConfig,
    now: Instant,
) -> PollResult {
    if !controller.health().is_due(now) {
        return PollResult::NotDue;
    }

    let Some(result) = controller.health_check().await else {
        return PollResult::Busy;
    };

    match result {
        Ok(()) => {
            let delay = success_delay(&config);
            controller.update_health(|h| {
                h.consecutive_failures = 0;
                h.reachable = true;
                h.authenticated = true;
                h.last_success_at = Some(Utc::now());
                schedule(h, now, delay);
            });
            PollResult::Succeeded
        }
        Err(e) => {
            let mut delay = Duration::ZERO;
            controller.update_health(|h| {
                h.consecutive_failures = h.consecutive_failures.saturating_add(1);
                h.reachable = false;
                h.authenticated = false;
                h.last_error = Some(e.to_string());
                h.last_error_kind = Some(e.kind());
                delay = failure_delay(&config, h.consecutive_failures);
                schedule(h, now, delay);
            });
            // The controller already logged the failure itself.
            debug!(
                endpoint = controller.name(),
                kind = %e.kind(),
                retry_in_secs = delay.as_secs(),
                "health check backing off"
            );
            PollResult::Failed
        }
    }
}

fn success_delay(config: &HealthConfig) -> Duration {
    config.min_poll_interval.max(config.base_interval)
}

fn failure_delay(config: &HealthConfig, failures: u32) -> Duration {
    config
        .base_interval
        .saturating_mul(failures.saturating_add(1))
        .min(config.max_backoff)
}

/// Deadlines count from the start of the cycle, so a slow check does not
/// push every later poll back by its own latency.
fn schedule(record: &mut HealthRecord, cycle_start: Instant, delay: Duration) {
    record.next_poll_deadline = Some(cycle_start + delay);
    record.next_poll_at = chrono::Duration::from_std(delay.saturating_sub(cycle_start.elapsed()))
        .ok()
        .map(|d| Utc::now() + d);
}
