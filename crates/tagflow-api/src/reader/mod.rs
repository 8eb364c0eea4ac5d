//! Reader transport capability and its two backends.
//!
//! Every reader endpoint, whatever its wire protocol, is driven through
//! [`ReaderTransport`]: exchange credentials for a token, then start and
//! stop inventory with that token. Tag reads arrive asynchronously and
//! are funnelled into a [`ReadSink`].

mod callback;
mod http;
mod push;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::auth::{Credentials, SessionToken};
use crate::error::Error;

pub use callback::CallbackReader;
pub use http::HttpReader;
pub use push::parse_push_payload;

// ── Capability ──────────────────────────────────────────────────────

/// Lifecycle operations every reader backend supports.
pub trait ReaderTransport: Send + Sync + 'static {
    /// Exchange credentials for a session token.
    ///
    /// Fails with [`Error::Unreachable`] or [`Error::Rejected`].
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<SessionToken, Error>> + Send;

    /// Begin inventory.
    ///
    /// Fails with [`Error::Unauthorized`], [`Error::Conflict`] or
    /// [`Error::Unreachable`].
    fn start(&self, token: &SessionToken) -> impl Future<Output = Result<(), Error>> + Send;

    /// End inventory. Fails with [`Error::Unauthorized`] or [`Error::Unreachable`].
    fn stop(&self, token: &SessionToken) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Static dispatch over the supported reader backends.
#[derive(Debug)]
pub enum ReaderBackend {
    Http(HttpReader),
    Callback(CallbackReader),
}

impl ReaderTransport for ReaderBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, Error> {
        match self {
            Self::Http(reader) => reader.authenticate(credentials).await,
            Self::Callback(reader) => reader.authenticate(credentials).await,
        }
    }

    async fn start(&self, token: &SessionToken) -> Result<(), Error> {
        match self {
            Self::Http(reader) => reader.start(token).await,
            Self::Callback(reader) => reader.start(token).await,
        }
    }

    async fn stop(&self, token: &SessionToken) -> Result<(), Error> {
        match self {
            Self::Http(reader) => reader.stop(token).await,
            Self::Callback(reader) => reader.stop(token).await,
        }
    }
}

// ── Read events ─────────────────────────────────────────────────────

/// One tag sighting as reported by a reader, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReadEvent {
    /// Primary identifier (EPC) as a hex string.
    pub raw_hex: String,
    pub antenna: u16,
    /// Peak RSSI in dBm.
    #[serde(default)]
    pub signal_strength: Option<i16>,
    /// Name of the reader endpoint that produced the read.
    pub source_reader: String,
    /// Secondary identifier (TID) as a hex string, when the reader reports one.
    #[serde(default)]
    pub secondary_hex: Option<String>,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl RawReadEvent {
    pub fn new(source_reader: impl Into<String>, raw_hex: impl Into<String>, antenna: u16) -> Self {
        Self {
            raw_hex: raw_hex.into(),
            antenna,
            signal_strength: None,
            source_reader: source_reader.into(),
            secondary_hex: None,
            observed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_signal(mut self, rssi: i16) -> Self {
        self.signal_strength = Some(rssi);
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, secondary_hex: impl Into<String>) -> Self {
        self.secondary_hex = Some(secondary_hex.into());
        self
    }
}

/// Producer half of the read-event channel.
///
/// Cheap to clone; handed to every backend that delivers reads on its own
/// schedule (SDK callbacks, push listeners). The ingestion pump owns the
/// receiving half. The channel is bounded: when the pump falls behind,
/// new reads are dropped rather than queued without limit.
#[derive(Debug, Clone)]
pub struct ReadSink {
    tx: mpsc::Sender<RawReadEvent>,
}

impl ReadSink {
    /// Create a sink buffering up to `capacity` reads (at least one) and
    /// the receiver the ingestion pump drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RawReadEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Hand one event to the pump without waiting.
    ///
    /// Returns `false` when the event was dropped: the buffer is full or
    /// the pump is gone.
    pub fn deliver(&self, event: RawReadEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    reader = %event.source_reader,
                    capacity = self.tx.max_capacity(),
                    "read buffer full, dropping read"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Hand a batch to the pump, preserving order. Stops at the first
    /// dropped event and returns how many were accepted.
    pub fn deliver_all(&self, events: impl IntoIterator<Item = RawReadEvent>) -> usize {
        let mut accepted = 0;
        for event in events {
            if !self.deliver(event) {
                break;
            }
            accepted += 1;
        }
        accepted
    }
}
