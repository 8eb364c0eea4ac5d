use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Lifecycle state of one reader endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Authenticating,
    Idle,
    Scanning,
}

/// The two logical scan sessions. Either one keeps the readers scanning.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ScanMode {
    Standard,
    DirectedSearch,
}

/// How a start request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StartOutcome {
    /// Already scanning; no device command issued.
    AlreadyScanning,
    Started,
    /// The reader reported inventory already running and was restarted.
    RecoveredFromConflict,
}

/// How a stop request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StopOutcome {
    /// Not scanning; no device command issued.
    AlreadyIdle,
    Stopped,
    /// Another scan mode is still active, so the readers keep scanning.
    KeptScanning,
}

/// Result of a lifecycle operation on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOutcome {
    pub endpoint: String,
    pub success: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Result of a lifecycle operation across all endpoints.
///
/// Failed endpoints never roll back successful ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOutcome {
    pub success: bool,
    pub endpoints: Vec<EndpointOutcome>,
}

impl AggregateOutcome {
    pub fn from_endpoints(endpoints: Vec<EndpointOutcome>) -> Self {
        Self {
            success: endpoints.iter().all(|e| e.success),
            endpoints,
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &EndpointOutcome> {
        self.endpoints.iter().filter(|e| !e.success)
    }
}
