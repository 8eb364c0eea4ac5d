//! Configuration for the tagflow service.
//!
//! TOML file + `TAGFLOW_` environment overrides loaded with figment,
//! credential resolution (env var or plaintext), validation, and
//! translation to `tagflow_core::ServiceConfig`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tagflow_api::{Credentials, TlsMode, TransportConfig};
use tagflow_core::{
    EndpointAddress, EndpointConfig, HealthConfig, IngestConfig, ReferenceColumns, ReferenceConfig,
    ReferenceSourceConfig, ServiceConfig, SessionTiming, ZoneRule,
};

/// Prefix for environment overrides. Nested keys are separated by `__`,
/// e.g. `TAGFLOW_HEALTH__MAX_BACKOFF_SECS=120`.
pub const ENV_PREFIX: &str = "TAGFLOW_";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for reader '{reader}'")]
    NoCredentials { reader: String },

    #[error("environment variable '{name}' is not set")]
    MissingEnv { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub health: HealthSection,

    #[serde(default)]
    pub ingest: IngestSection,

    #[serde(default)]
    pub reference: ReferenceSection,

    #[serde(default)]
    pub readers: Vec<ReaderEntry>,

    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Bound on every reader and reference request, in seconds.
    pub timeout_secs: u64,
    /// Pause between stop and restart when recovering from a conflict.
    pub settle_ms: u64,
    pub shutdown_grace_secs: u64,
    /// Buffered events per observer before it starts skipping.
    pub observer_capacity: usize,
    /// Buffered reads awaiting ingestion before new ones are dropped.
    pub read_capacity: usize,
    /// Accept self-signed reader certificates.
    pub insecure: bool,
    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            settle_ms: 1000,
            shutdown_grace_secs: 5,
            observer_capacity: 1024,
            read_capacity: 4096,
            insecure: true,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSection {
    pub base_interval_secs: u64,
    pub min_poll_interval_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            base_interval_secs: 7,
            min_poll_interval_secs: 7,
            max_backoff_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestSection {
    /// Decoded identifiers must start with one of these. Empty accepts all.
    pub prefixes: Vec<String>,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            prefixes: vec!["FF".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReferenceSection {
    /// JSON endpoint serving the reference table.
    pub url: Option<String>,
    /// JSON file holding the reference table.
    pub file: Option<PathBuf>,
    /// Bearer token for `url` (plaintext, prefer `token_env`).
    pub token: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,
    pub ttl_secs: u64,
    pub key_column: String,
    pub item_code_column: String,
    pub description_column: String,
    pub category_column: String,
    pub location_column: String,
    pub owner_column: String,
}

impl Default for ReferenceSection {
    fn default() -> Self {
        let columns = ReferenceColumns::default();
        Self {
            url: None,
            file: None,
            token: None,
            token_env: None,
            ttl_secs: 60 * 60,
            key_column: columns.key,
            item_code_column: columns.item_code,
            description_column: columns.description,
            category_column: columns.category,
            location_column: columns.location,
            owner_column: columns.owner,
        }
    }
}

/// Reader backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    /// Local REST API; `address` is a base URL.
    Http,
    /// Vendor SDK; `address` is `host:port`.
    Callback,
}

/// One `[[readers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReaderEntry {
    pub name: String,
    pub kind: ReaderKind,
    pub address: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Plaintext password (prefer `password_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

fn default_username() -> String {
    "admin".into()
}

/// One `[[zones]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ZoneEntry {
    pub reader: String,
    pub first_antenna: u16,
    pub last_antenna: u16,
    pub zone: String,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "tagflow", "tagflow").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("tagflow");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent dirs.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// A commented starting point for `config init`.
pub fn sample_config() -> &'static str {
    include_str!("sample.toml")
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a reader's password: `password_env` first, then plaintext.
pub fn resolve_password(reader: &ReaderEntry) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = reader.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref pw) = reader.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        reader: reader.name.clone(),
    })
}

/// Resolve the reference bearer token, if one is configured.
pub fn resolve_reference_token(section: &ReferenceSection) -> Result<Option<SecretString>, ConfigError> {
    if let Some(ref env_name) = section.token_env {
        return std::env::var(env_name)
            .map(|val| Some(SecretString::from(val)))
            .map_err(|_| ConfigError::MissingEnv {
                name: env_name.clone(),
            });
    }
    Ok(section.token.clone().map(SecretString::from))
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Check cross-field constraints the TOML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for reader in &self.readers {
            let name = reader.name.trim();
            if name.is_empty() {
                return Err(invalid("readers.name", "must not be empty"));
            }
            if !names.insert(name.to_ascii_lowercase()) {
                return Err(invalid("readers.name", format!("duplicate reader '{name}'")));
            }
            reader_address(reader)?;
        }

        for zone in &self.zones {
            if zone.first_antenna > zone.last_antenna {
                return Err(invalid(
                    "zones",
                    format!(
                        "zone '{}' has first_antenna {} after last_antenna {}",
                        zone.zone, zone.first_antenna, zone.last_antenna
                    ),
                ));
            }
            if !names.contains(&zone.reader.trim().to_ascii_lowercase()) {
                return Err(invalid(
                    "zones.reader",
                    format!("zone '{}' names unknown reader '{}'", zone.zone, zone.reader),
                ));
            }
        }

        if self.health.base_interval_secs == 0 {
            return Err(invalid("health.base_interval_secs", "must be positive"));
        }
        if self.service.timeout_secs == 0 {
            return Err(invalid("service.timeout_secs", "must be positive"));
        }
        if self.service.observer_capacity == 0 {
            return Err(invalid("service.observer_capacity", "must be positive"));
        }
        if self.service.read_capacity == 0 {
            return Err(invalid("service.read_capacity", "must be positive"));
        }
        if self.reference.url.is_some() && self.reference.file.is_some() {
            return Err(invalid("reference", "set either url or file, not both"));
        }
        if let Some(ref url) = self.reference.url {
            parse_url("reference.url", url)?;
        }
        Ok(())
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for reader in &mut copy.readers {
            if reader.password.is_some() {
                reader.password = Some(REDACTED.into());
            }
        }
        if copy.reference.token.is_some() {
            copy.reference.token = Some(REDACTED.into());
        }
        copy
    }

    pub fn reader(&self, name: &str) -> Option<&ReaderEntry> {
        self.readers
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }
}

/// Validate, resolve credentials and build the core runtime config.
pub fn to_service_config(cfg: &Config) -> Result<ServiceConfig, ConfigError> {
    cfg.validate()?;

    let endpoints = cfg
        .readers
        .iter()
        .map(|reader| {
            Ok(EndpointConfig {
                name: reader.name.trim().to_owned(),
                address: reader_address(reader)?,
                credentials: Credentials {
                    username: reader.username.clone(),
                    password: resolve_password(reader)?,
                },
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let tls = if let Some(ref ca_path) = cfg.service.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else if cfg.service.insecure {
        TlsMode::DangerAcceptInvalid
    } else {
        TlsMode::System
    };
    let timeout = Duration::from_secs(cfg.service.timeout_secs);

    let source = match (&cfg.reference.url, &cfg.reference.file) {
        (Some(url), _) => ReferenceSourceConfig::Http {
            url: parse_url("reference.url", url)?,
            bearer: resolve_reference_token(&cfg.reference)?,
        },
        (None, Some(path)) => ReferenceSourceConfig::File(path.clone()),
        (None, None) => ReferenceSourceConfig::None,
    };

    Ok(ServiceConfig {
        endpoints,
        transport: TransportConfig { tls, timeout },
        session: SessionTiming {
            operation_timeout: timeout,
            settle_interval: Duration::from_millis(cfg.service.settle_ms),
        },
        health: HealthConfig {
            base_interval: Duration::from_secs(cfg.health.base_interval_secs),
            min_poll_interval: Duration::from_secs(cfg.health.min_poll_interval_secs),
            max_backoff: Duration::from_secs(cfg.health.max_backoff_secs),
        },
        reference: ReferenceConfig {
            source,
            columns: ReferenceColumns {
                key: cfg.reference.key_column.clone(),
                item_code: cfg.reference.item_code_column.clone(),
                description: cfg.reference.description_column.clone(),
                category: cfg.reference.category_column.clone(),
                location: cfg.reference.location_column.clone(),
                owner: cfg.reference.owner_column.clone(),
            },
            ttl: Duration::from_secs(cfg.reference.ttl_secs),
        },
        ingest: IngestConfig {
            prefixes: cfg.ingest.prefixes.clone(),
        },
        zones: zone_rules(cfg),
        shutdown_grace: Duration::from_secs(cfg.service.shutdown_grace_secs),
        observer_capacity: cfg.service.observer_capacity,
        read_capacity: cfg.service.read_capacity,
    })
}

/// The zone table as core rules.
pub fn zone_rules(cfg: &Config) -> Vec<ZoneRule> {
    cfg.zones
        .iter()
        .map(|z| ZoneRule::new(z.reader.trim(), z.first_antenna..=z.last_antenna, z.zone.clone()))
        .collect()
}

fn reader_address(reader: &ReaderEntry) -> Result<EndpointAddress, ConfigError> {
    let field = format!("readers.{}.address", reader.name);
    match reader.kind {
        ReaderKind::Http => parse_url(&field, &reader.address).map(EndpointAddress::Http),
        ReaderKind::Callback => {
            let address = reader.address.trim();
            match address.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(EndpointAddress::Callback(address.to_owned()))
                }
                _ => Err(invalid(field, format!("expected host:port, got '{address}'"))),
            }
        }
    }
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse()
        .map_err(|e| invalid(field, format!("invalid URL '{raw}': {e}")))
}
