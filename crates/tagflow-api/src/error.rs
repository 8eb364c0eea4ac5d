use thiserror::Error;

/// Top-level error type for the `tagflow-api` crate.
///
/// Covers every failure mode of the reader and reference-source surfaces:
/// authentication, device state, transport, and payload decoding.
/// `tagflow-core` classifies these into the domain error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials were refused by the reader.
    #[error("Authentication rejected: {message}")]
    Rejected { message: String },

    /// The session token is no longer accepted by the reader.
    #[error("Session token rejected -- re-authentication required")]
    Unauthorized,

    // ── Device state ────────────────────────────────────────────────
    /// The reader is already in (or transitioning to) the requested state.
    #[error("Reader reports conflicting state: {message}")]
    Conflict { message: String },

    /// The reader answered with a status the client does not understand.
    #[error("Unexpected reader response (HTTP {status}): {message}")]
    Device { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, host down.
    #[error("Endpoint unreachable: {message}")]
    Unreachable { message: String },

    /// HTTP transport error that is not a plain connectivity failure.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Local I/O failure (file-backed sources).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Reference source answered but could not provide the dataset.
    #[error("Reference source unavailable: {message}")]
    SourceUnavailable { message: String },
}

impl Error {
    /// Returns `true` if the session token expired and a fresh
    /// authentication might resolve it.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns `true` if the device reported an "already running" conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Map a `reqwest` send failure, folding connectivity problems into
    /// [`Unreachable`](Self::Unreachable).
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unreachable {
                message: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}

/// First 200 characters of a response body, for error messages.
pub(crate) fn body_preview(body: &str) -> String {
    body.chars().take(200).collect()
}
