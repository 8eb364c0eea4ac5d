// ── Reader fleet ──
//
// Aggregate lifecycle across every configured endpoint. Endpoints are
// driven concurrently; each reports its own outcome and a failure on one
// never rolls back another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tagflow_api::ReaderTransport;
use tracing::info;

use super::{ScanModes, SessionController};
use crate::error::CoreError;
use crate::model::{AggregateOutcome, EndpointOutcome, HealthRecord, ScanMode, StopOutcome};

/// Every session controller plus the aggregate scan modes.
pub struct ReaderFleet<T> {
    controllers: Vec<Arc<SessionController<T>>>,
    modes: Arc<ScanModes>,
}

impl<T: ReaderTransport> ReaderFleet<T> {
    pub fn new(controllers: Vec<SessionController<T>>, modes: Arc<ScanModes>) -> Self {
        Self {
            controllers: controllers.into_iter().map(Arc::new).collect(),
            modes,
        }
    }

    pub fn controllers(&self) -> &[Arc<SessionController<T>>] {
        &self.controllers
    }

    /// Controller by endpoint name, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Arc<SessionController<T>>> {
        self.controllers
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn modes(&self) -> &Arc<ScanModes> {
        &self.modes
    }

    /// Activate `mode` and start every endpoint.
    pub async fn start_all(&self, mode: ScanMode) -> AggregateOutcome {
        self.modes.activate(mode);
        info!(mode = %mode, endpoints = self.controllers.len(), "starting scan");

        let starts = self.controllers.iter().cloned().map(|c| async move {
            match c.start().await {
                Ok(outcome) => EndpointOutcome {
                    endpoint: c.name().to_owned(),
                    success: true,
                    detail: outcome.to_string(),
                    error_kind: None,
                },
                Err(e) => failure(c.name(), &e),
            }
        });
        AggregateOutcome::from_endpoints(join_all(starts).await)
    }

    /// Deactivate `mode`; stop the readers only once no mode remains.
    pub async fn stop_all(&self, mode: ScanMode) -> AggregateOutcome {
        self.modes.deactivate(mode);
        if self.modes.any_active() {
            info!(mode = %mode, "scan mode cleared, other mode still active");
            let kept = self
                .controllers
                .iter()
                .map(|c| EndpointOutcome {
                    endpoint: c.name().to_owned(),
                    success: true,
                    detail: StopOutcome::KeptScanning.to_string(),
                    error_kind: None,
                })
                .collect();
            return AggregateOutcome::from_endpoints(kept);
        }
        info!(mode = %mode, endpoints = self.controllers.len(), "stopping scan");
        self.stop_readers().await
    }

    /// Clear every mode and stop every reader.
    pub async fn stop_everything(&self) -> AggregateOutcome {
        self.modes.deactivate_all();
        self.stop_readers().await
    }

    /// Clear every mode and force a device stop on every reader.
    pub async fn reset_all(&self) -> AggregateOutcome {
        self.modes.deactivate_all();
        let resets = self.controllers.iter().cloned().map(|c| async move {
            match c.reset().await {
                Ok(()) => EndpointOutcome {
                    endpoint: c.name().to_owned(),
                    success: true,
                    detail: StopOutcome::Stopped.to_string(),
                    error_kind: None,
                },
                Err(e) => failure(c.name(), &e),
            }
        });
        AggregateOutcome::from_endpoints(join_all(resets).await)
    }

    /// Stamp `lastTagAt` on the named endpoint, if it is known.
    pub fn note_tag_seen(&self, endpoint: &str, at: DateTime<Utc>) {
        if let Some(controller) = self.get(endpoint) {
            controller.note_tag_seen(at);
        }
    }

    /// Current health of every endpoint, in configuration order.
    pub fn health_snapshot(&self) -> Vec<HealthRecord> {
        self.controllers.iter().map(|c| c.health()).collect()
    }

    async fn stop_readers(&self) -> AggregateOutcome {
        let stops = self.controllers.iter().cloned().map(|c| async move {
            match c.stop().await {
                Ok(outcome) => EndpointOutcome {
                    endpoint: c.name().to_owned(),
                    success: true,
                    detail: outcome.to_string(),
                    error_kind: None,
                },
                Err(e) => failure(c.name(), &e),
            }
        });
        AggregateOutcome::from_endpoints(join_all(stops).await)
    }
}

fn failure(endpoint: &str, err: &CoreError) -> EndpointOutcome {
    EndpointOutcome {
        endpoint: endpoint.to_owned(),
        success: false,
        detail: err.to_string(),
        error_kind: Some(err.kind()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tagflow_api::Credentials;

    use super::*;
    use crate::config::{EndpointAddress, EndpointConfig, SessionTiming};
    use crate::error::ErrorKind;
    use crate::model::{SessionState, StartOutcome};
    use crate::testing::{Fail, MockTransport};

    fn fleet(transports: Vec<(&str, MockTransport)>) -> ReaderFleet<MockTransport> {
        let controllers = transports
            .into_iter()
            .map(|(name, transport)| {
                let config = EndpointConfig {
                    name: name.into(),
                    address: EndpointAddress::Callback("127.0.0.1:5084".into()),
                    credentials: Credentials::new("admin", "secret"),
                };
                SessionController::new(&config, transport, SessionTiming::default())
            })
            .collect();
        ReaderFleet::new(controllers, Arc::new(ScanModes::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn one_conflict_still_succeeds_overall() {
        let fleet = fleet(vec![
            ("dock-1", MockTransport::new()),
            ("dock-2", MockTransport::new().fail_start(Fail::Conflict)),
        ]);
        let outcome = fleet.start_all(ScanMode::Standard).await;

        assert!(outcome.success);
        assert_eq!(outcome.endpoints[0].detail, StartOutcome::Started.to_string());
        assert_eq!(
            outcome.endpoints[1].detail,
            StartOutcome::RecoveredFromConflict.to_string()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_is_reported_without_rollback() {
        let fleet = fleet(vec![
            ("dock-1", MockTransport::new()),
            ("dock-2", MockTransport::new().fail_auth(Fail::Unreachable)),
        ]);
        let outcome = fleet.start_all(ScanMode::Standard).await;

        assert!(!outcome.success);
        let failed: Vec<_> = outcome.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_kind, Some(ErrorKind::Unreachable));
        assert_eq!(fleet.get("dock-1").unwrap().state(), SessionState::Scanning);
        assert_eq!(fleet.get("DOCK-2").unwrap().state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn readers_keep_scanning_while_another_mode_is_active() {
        let fleet = fleet(vec![("dock-1", MockTransport::new())]);
        fleet.start_all(ScanMode::Standard).await;
        fleet.start_all(ScanMode::DirectedSearch).await;

        let outcome = fleet.stop_all(ScanMode::Standard).await;
        assert!(outcome.success);
        assert_eq!(outcome.endpoints[0].detail, StopOutcome::KeptScanning.to_string());
        let controller = fleet.get("dock-1").unwrap();
        assert_eq!(controller.state(), SessionState::Scanning);

        fleet.stop_all(ScanMode::DirectedSearch).await;
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transport().count("stop"), 1);
        assert_eq!(controller.transport().count("start"), 1);
    }
}
