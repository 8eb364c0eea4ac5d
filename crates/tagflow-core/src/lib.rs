//! Ingestion, session and broadcast services between `tagflow-api` and
//! the command-line binary.
//!
//! - **[`TagService`]**: Central facade. Assembles every component from a
//!   [`ServiceConfig`], spawns the background health monitor and ingestion
//!   pump, and executes control [`Command`]s.
//!
//! - **[`SessionController`]** / **[`ReaderFleet`]**: Per-reader
//!   authenticate/start/stop lifecycle with conflict recovery and a single
//!   re-authentication on token refusal, aggregated across endpoints under
//!   the shared [`ScanModes`].
//!
//! - **[`HealthMonitor`]**: Adaptive polling of each reader's
//!   authentication path with linear backoff.
//!
//! - **[`IngestionEngine`]**: Decode, gate, filter, deduplicate, enrich
//!   and zone raw reads into the lock-free [`TagStore`].
//!
//! - **[`ReferenceCache`]**: TTL-bounded enrichment table, loaded on demand.
//!
//! - **[`BroadcastGateway`]**: Non-blocking fan-out of [`ObserverEvent`]s.

pub mod broadcast;
pub mod cache;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod health;
pub mod ingest;
pub mod model;
pub mod service;
pub mod session;
pub mod store;
pub mod zone;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broadcast::{BroadcastGateway, Subscription};
pub use cache::ReferenceCache;
pub use command::{Command, CommandResult};
pub use config::{
    EndpointAddress, EndpointConfig, HealthConfig, IngestConfig, ReferenceColumns, ReferenceConfig,
    ReferenceSourceConfig, ServiceConfig, SessionTiming, ZoneRule,
};
pub use decode::{DECODE_FAILURE, Decoded, decode_identifier};
pub use error::{CoreError, ErrorKind};
pub use health::{CycleReport, HealthMonitor};
pub use ingest::{DropReason, IngestOutcome, IngestSummary, IngestionEngine, identity_key};
pub use model::{
    AggregateOutcome, EndpointOutcome, Enrichment, HealthRecord, NOT_AVAILABLE, ObserverEvent,
    ReferenceEntry, ScanMode, SessionState, StartOutcome, StopOutcome, Tag,
};
pub use service::TagService;
pub use session::{ActiveModes, ReaderFleet, ScanModes, SessionController};
pub use store::{TagStore, Upserted};
pub use zone::{UNASSIGNED, ZoneClassifier};
