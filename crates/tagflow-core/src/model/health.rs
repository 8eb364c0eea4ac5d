use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::SessionState;
use crate::error::ErrorKind;

/// Connectivity and session health of one reader endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub endpoint: String,
    pub session_state: SessionState,
    pub reachable: bool,
    pub authenticated: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub last_tag_at: Option<DateTime<Utc>>,
    pub token_issued_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Wall-clock rendering of `next_poll_deadline`.
    pub next_poll_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub next_poll_deadline: Option<Instant>,
}

impl HealthRecord {
    /// Record for an endpoint nothing has been heard from yet.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_state: SessionState::Disconnected,
            reachable: false,
            authenticated: false,
            last_success_at: None,
            last_error: None,
            last_error_kind: None,
            last_tag_at: None,
            token_issued_at: None,
            consecutive_failures: 0,
            next_poll_at: None,
            next_poll_deadline: None,
        }
    }

    /// Whether the health monitor should check this endpoint at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_poll_deadline.is_none_or(|deadline| deadline <= now)
    }
}
