// ── Core error types ──
//
// Domain-level errors from tagflow-core. Consumers never see HTTP status
// codes or JSON parse failures directly: `CoreError::from_transport`
// classifies transport-layer errors into the reader failure taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure kind, stable enough to log, count and serialize.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ErrorKind {
    /// Network or transport failure. Retried with backoff, never fatal.
    Unreachable,
    /// Credentials refused.
    AuthRejected,
    /// Session token refused.
    Unauthorized,
    /// Device already in the requested state.
    Conflict,
    /// Unparseable read event; the event is dropped.
    MalformedEvent,
    /// Reference data could not be fetched; lookups degrade to "not available".
    SourceUnavailable,
    /// Configuration or wiring problem.
    Config,
    Internal,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Reader errors ────────────────────────────────────────────────
    #[error("Reader '{endpoint}' unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Reader '{endpoint}' rejected credentials: {message}")]
    AuthRejected { endpoint: String, message: String },

    #[error("Reader '{endpoint}' refused the session token")]
    Unauthorized { endpoint: String },

    #[error("Reader '{endpoint}' is in a conflicting state: {message}")]
    Conflict { endpoint: String, message: String },

    #[error("Reader endpoint not found: {name}")]
    EndpointNotFound { name: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed read event: {message}")]
    MalformedEvent { message: String },

    #[error("Reference source unavailable: {message}")]
    SourceUnavailable { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The classified kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::AuthRejected { .. } => ErrorKind::AuthRejected,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::MalformedEvent { .. } => ErrorKind::MalformedEvent,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::EndpointNotFound { .. } | Self::Config { .. } => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Classify a transport error raised while talking to `endpoint`.
    ///
    /// Anything that is not a credential, token or state problem follows the
    /// unreachable path, so it is retried with backoff.
    pub fn from_transport(endpoint: &str, err: tagflow_api::Error) -> Self {
        use tagflow_api::Error as Api;

        let endpoint = endpoint.to_owned();
        match err {
            Api::Rejected { message } => Self::AuthRejected { endpoint, message },
            Api::Unauthorized => Self::Unauthorized { endpoint },
            Api::Conflict { message } => Self::Conflict { endpoint, message },
            Api::SourceUnavailable { message } => Self::SourceUnavailable { message },
            Api::Timeout { timeout_ms } => Self::Unreachable {
                endpoint,
                reason: format!("timed out after {timeout_ms}ms"),
            },
            other => Self::Unreachable {
                endpoint,
                reason: other.to_string(),
            },
        }
    }

    /// Classify a reference-source failure.
    pub fn from_source(err: &tagflow_api::Error) -> Self {
        match err {
            tagflow_api::Error::SourceUnavailable { message } => Self::SourceUnavailable {
                message: message.clone(),
            },
            other => Self::SourceUnavailable {
                message: other.to_string(),
            },
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tagflow_api::Error> for CoreError {
    fn from(err: tagflow_api::Error) -> Self {
        match err {
            tagflow_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            tagflow_api::Error::Tls(msg) => Self::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            other => Self::from_transport("<unknown>", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagflow_api::Error as Api;

    #[test]
    fn transport_errors_are_classified() {
        let cases = [
            (Api::Unauthorized, ErrorKind::Unauthorized),
            (
                Api::Rejected {
                    message: "nope".into(),
                },
                ErrorKind::AuthRejected,
            ),
            (
                Api::Conflict {
                    message: "running".into(),
                },
                ErrorKind::Conflict,
            ),
            (Api::Timeout { timeout_ms: 500 }, ErrorKind::Unreachable),
            (
                Api::Device {
                    status: 500,
                    message: "boom".into(),
                },
                ErrorKind::Unreachable,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(CoreError::from_transport("dock-1", err).kind(), kind);
        }
    }

    #[test]
    fn kind_displays_camel_case() {
        assert_eq!(ErrorKind::AuthRejected.to_string(), "authRejected");
        assert_eq!(ErrorKind::SourceUnavailable.as_ref(), "sourceUnavailable");
    }
}
