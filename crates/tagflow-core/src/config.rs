// ── Runtime service configuration ──
//
// These types describe *what* the service manages and how aggressively.
// They carry credential data and timing knobs, but never touch disk.
// The binary builds a `ServiceConfig` (via tagflow-config) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use tagflow_api::{Credentials, TransportConfig};
use url::Url;

/// Where a reader endpoint lives and which backend speaks to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    /// Reader exposing the local REST API.
    Http(Url),
    /// Reader driven through the vendor SDK, `host:port`.
    Callback(String),
}

impl EndpointAddress {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Callback(_) => "callback",
        }
    }
}

/// Identity of one reader endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub address: EndpointAddress,
    pub credentials: Credentials,
}

/// Timing of lifecycle operations against a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Upper bound on any single transport call.
    pub operation_timeout: Duration,
    /// Pause between the stop and the retried start of conflict recovery.
    pub settle_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(10),
            settle_interval: Duration::from_secs(1),
        }
    }
}

/// Health polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Tick of the monitor loop, and the unit of the failure backoff.
    pub base_interval: Duration,
    /// Floor on the delay after a successful check.
    pub min_poll_interval: Duration,
    /// Ceiling on the delay after repeated failures.
    pub max_backoff: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(7),
            min_poll_interval: Duration::from_secs(7),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Column names of the reference dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceColumns {
    pub key: String,
    pub item_code: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub owner: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            key: "Tag ID".into(),
            item_code: "Item Code".into(),
            description: "Description".into(),
            category: "Category".into(),
            location: "Location".into(),
            owner: "Owner".into(),
        }
    }
}

/// Where reference data comes from.
#[derive(Debug, Clone, Default)]
pub enum ReferenceSourceConfig {
    /// JSON over HTTP, with an optional pre-acquired bearer token.
    Http {
        url: Url,
        bearer: Option<SecretString>,
    },
    /// JSON file on disk.
    File(PathBuf),
    /// No source: every lookup misses.
    #[default]
    None,
}

/// Reference cache settings.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub source: ReferenceSourceConfig,
    pub columns: ReferenceColumns,
    pub ttl: Duration,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            source: ReferenceSourceConfig::None,
            columns: ReferenceColumns::default(),
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// One antenna-range rule of the zone table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRule {
    pub reader: String,
    pub first_antenna: u16,
    pub last_antenna: u16,
    pub zone: String,
}

impl ZoneRule {
    pub fn new(
        reader: impl Into<String>,
        antennas: std::ops::RangeInclusive<u16>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            reader: reader.into(),
            first_antenna: *antennas.start(),
            last_antenna: *antennas.end(),
            zone: zone.into(),
        }
    }
}

/// Ingestion filter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Decoded identifiers must start with one of these. Empty accepts all.
    pub prefixes: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["FF".into()],
        }
    }
}

/// Everything `TagService` needs to run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub transport: TransportConfig,
    pub session: SessionTiming,
    pub health: HealthConfig,
    pub reference: ReferenceConfig,
    pub ingest: IngestConfig,
    pub zones: Vec<ZoneRule>,
    /// Bound on waiting for background tasks and reader stops at shutdown.
    pub shutdown_grace: Duration,
    /// Buffered events per observer before it starts skipping.
    pub observer_capacity: usize,
    /// Buffered reads awaiting ingestion before new ones are dropped.
    pub read_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            transport: TransportConfig::default(),
            session: SessionTiming::default(),
            health: HealthConfig::default(),
            reference: ReferenceConfig::default(),
            ingest: IngestConfig::default(),
            zones: Vec::new(),
            shutdown_grace: Duration::from_secs(5),
            observer_capacity: 1024,
            read_capacity: 4096,
        }
    }
}
