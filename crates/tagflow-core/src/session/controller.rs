// ── Session controller ──
//
// Drives the authenticate / start / stop lifecycle of one reader
// endpoint. Lifecycle operations on an endpoint are serialized by an
// async mutex; different endpoints never contend. Every transport call
// is bounded by the operation timeout, and a timeout counts as
// unreachable.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tagflow_api::{Credentials, ReaderTransport, SessionToken};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::config::{EndpointConfig, SessionTiming};
use crate::error::CoreError;
use crate::model::{HealthRecord, SessionState, StartOutcome, StopOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceOp {
    Start,
    Stop,
}

impl DeviceOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Lifecycle owner of a single reader endpoint.
pub struct SessionController<T> {
    name: String,
    transport: T,
    credentials: Credentials,
    timing: SessionTiming,
    op_lock: Mutex<()>,
    token: ArcSwapOption<SessionToken>,
    state: watch::Sender<SessionState>,
    health: watch::Sender<HealthRecord>,
}

impl<T: ReaderTransport> SessionController<T> {
    pub fn new(config: &EndpointConfig, transport: T, timing: SessionTiming) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (health, _) = watch::channel(HealthRecord::new(&config.name));
        Self {
            name: config.name.clone(),
            transport,
            credentials: config.credentials.clone(),
            timing,
            op_lock: Mutex::new(()),
            token: ArcSwapOption::empty(),
            state,
            health,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn health(&self) -> HealthRecord {
        self.health.borrow().clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Exchange the stored credentials for a fresh session token.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        self.authenticate_locked()
            .await
            .map_err(|e| self.failed("authenticate", e))
    }

    /// Begin scanning. A no-op when already scanning.
    pub async fn start(&self) -> Result<StartOutcome, CoreError> {
        let _guard = self.op_lock.lock().await;
        if self.state() == SessionState::Scanning {
            debug!(endpoint = %self.name, "already scanning");
            return Ok(StartOutcome::AlreadyScanning);
        }

        let outcome = self.start_locked().await.map_err(|e| self.failed("start", e))?;
        self.set_state(SessionState::Scanning);
        info!(endpoint = %self.name, outcome = %outcome, "scanning");
        Ok(outcome)
    }

    /// Stop scanning. A no-op unless scanning.
    pub async fn stop(&self) -> Result<StopOutcome, CoreError> {
        let _guard = self.op_lock.lock().await;
        if self.state() != SessionState::Scanning {
            debug!(endpoint = %self.name, state = %self.state(), "not scanning");
            return Ok(StopOutcome::AlreadyIdle);
        }

        self.device_with_reauth(DeviceOp::Stop)
            .await
            .map_err(|e| self.failed("stop", e))?;
        self.set_state(SessionState::Idle);
        info!(endpoint = %self.name, "stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Issue a device stop whatever the local state says, then settle in Idle.
    /// Halts inventory left running by an earlier process.
    pub async fn reset(&self) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        self.device_with_reauth(DeviceOp::Stop)
            .await
            .map_err(|e| self.failed("reset", e))?;
        self.set_state(SessionState::Idle);
        info!(endpoint = %self.name, "reset to idle");
        Ok(())
    }

    /// Health probe: re-authenticate unless a lifecycle operation holds
    /// the endpoint. `None` means the endpoint was busy.
    pub async fn health_check(&self) -> Option<Result<(), CoreError>> {
        let Ok(_guard) = self.op_lock.try_lock() else {
            debug!(endpoint = %self.name, "lifecycle operation in progress, skipping health check");
            return None;
        };
        Some(
            self.authenticate_locked()
                .await
                .map_err(|e| self.failed("health-check", e)),
        )
    }

    // ── Health bookkeeping ───────────────────────────────────────────

    /// Stamp the time a tag from this reader was last ingested.
    pub fn note_tag_seen(&self, at: DateTime<Utc>) {
        self.health.send_modify(|h| {
            if h.last_tag_at.is_none_or(|prev| prev < at) {
                h.last_tag_at = Some(at);
            }
        });
    }

    pub(crate) fn update_health(&self, update: impl FnOnce(&mut HealthRecord)) {
        self.health.send_modify(update);
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn authenticate_locked(&self) -> Result<(), CoreError> {
        let previous = self.state();
        if previous == SessionState::Disconnected {
            self.set_state(SessionState::Authenticating);
        }

        let token = match self.timed(self.transport.authenticate(&self.credentials)).await {
            Ok(token) => token,
            Err(e) => {
                self.set_state(previous);
                return Err(CoreError::from_transport(&self.name, e));
            }
        };

        let issued_at = token.issued_at();
        self.token.store(Some(Arc::new(token)));
        if matches!(
            self.state(),
            SessionState::Disconnected | SessionState::Authenticating
        ) {
            self.set_state(SessionState::Idle);
        }
        self.health.send_modify(|h| {
            h.reachable = true;
            h.authenticated = true;
            h.token_issued_at = Some(issued_at);
            h.last_success_at = Some(Utc::now());
            h.last_error = None;
            h.last_error_kind = None;
        });
        debug!(endpoint = %self.name, "authenticated");
        Ok(())
    }

    async fn start_locked(&self) -> Result<StartOutcome, CoreError> {
        match self.device_with_reauth(DeviceOp::Start).await {
            Ok(()) => Ok(StartOutcome::Started),
            Err(CoreError::Conflict { message, .. }) => {
                info!(endpoint = %self.name, reason = %message, "reader already running, restarting inventory");
                self.device_with_reauth(DeviceOp::Stop).await?;
                tokio::time::sleep(self.timing.settle_interval).await;
                self.device_with_reauth(DeviceOp::Start).await?;
                Ok(StartOutcome::RecoveredFromConflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Run a device command, re-authenticating and retrying exactly once
    /// if the reader refuses the token.
    async fn device_with_reauth(&self, op: DeviceOp) -> Result<(), CoreError> {
        let token = self.ensure_token().await?;
        match self.device(op, &token).await {
            Err(e) if e.is_unauthorized() => {
                warn!(endpoint = %self.name, operation = op.as_str(), "token refused, re-authenticating");
                self.token.store(None);
                self.authenticate_locked().await?;
                let token = self.current_token()?;
                self.device(op, &token)
                    .await
                    .map_err(|e| CoreError::from_transport(&self.name, e))
            }
            other => other.map_err(|e| CoreError::from_transport(&self.name, e)),
        }
    }

    async fn device(&self, op: DeviceOp, token: &SessionToken) -> Result<(), tagflow_api::Error> {
        match op {
            DeviceOp::Start => self.timed(self.transport.start(token)).await,
            DeviceOp::Stop => self.timed(self.transport.stop(token)).await,
        }
    }

    async fn ensure_token(&self) -> Result<Arc<SessionToken>, CoreError> {
        if let Some(token) = self.token.load_full() {
            return Ok(token);
        }
        self.authenticate_locked().await?;
        self.current_token()
    }

    fn current_token(&self) -> Result<Arc<SessionToken>, CoreError> {
        self.token
            .load_full()
            .ok_or_else(|| CoreError::Internal(format!("no session token for '{}'", self.name)))
    }

    async fn timed<R>(
        &self,
        call: impl Future<Output = Result<R, tagflow_api::Error>>,
    ) -> Result<R, tagflow_api::Error> {
        let limit = self.timing.operation_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(tagflow_api::Error::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        self.health.send_modify(|h| h.session_state = state);
    }

    /// Log and record a failed operation, handing the error back.
    fn failed(&self, operation: &'static str, err: CoreError) -> CoreError {
        warn!(
            endpoint = %self.name,
            operation,
            kind = %err.kind(),
            error = %err,
            "reader operation failed"
        );
        self.health.send_modify(|h| {
            h.last_error = Some(err.to_string());
            h.last_error_kind = Some(err.kind());
        });
        err
    }
}
