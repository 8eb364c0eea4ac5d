//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use tagflow_config::ConfigError;
use tagflow_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const PARTIAL: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Readers ──────────────────────────────────────────────────────
    #[error("Could not reach reader '{reader}'")]
    #[diagnostic(
        code(tagflow::unreachable),
        help(
            "Check that the reader is powered and reachable.\n\
             Reason: {reason}\n\
             Try: tagflow health -v"
        )
    )]
    Unreachable { reader: String, reason: String },

    #[error("Reader '{reader}' rejected the configured credentials")]
    #[diagnostic(
        code(tagflow::auth_failed),
        help(
            "Verify the username and password for this reader.\n\
             Prefer password_env over a plaintext password in the config file."
        )
    )]
    AuthFailed { reader: String, message: String },

    #[error("No password configured for reader '{reader}'")]
    #[diagnostic(
        code(tagflow::no_credentials),
        help("Set password_env (or password) for this reader in the config file.")
    )]
    NoCredentials { reader: String },

    #[error("Reader '{reader}' is in a conflicting state: {message}")]
    #[diagnostic(
        code(tagflow::conflict),
        help("Run: tagflow stop, then try again.")
    )]
    Conflict { reader: String, message: String },

    #[error("Reader '{name}' is not configured")]
    #[diagnostic(
        code(tagflow::not_found),
        help("Run: tagflow config show to list configured readers")
    )]
    ReaderNotFound { name: String },

    #[error("{operation} failed on {failed} of {total} reader(s)")]
    #[diagnostic(
        code(tagflow::partial_failure),
        help("Readers that succeeded keep their new state. Run: tagflow health")
    )]
    PartialFailure {
        operation: String,
        failed: usize,
        total: usize,
    },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Reference data unavailable: {message}")]
    #[diagnostic(
        code(tagflow::reference),
        help("Check the [reference] url or file setting and the column names.")
    )]
    ReferenceUnavailable { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tagflow::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(tagflow::no_config),
        help(
            "Create one with: tagflow config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(tagflow::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Environment variable '{name}' is not set")]
    #[diagnostic(
        code(tagflow::missing_env),
        help("Export the variable or point the config at a different one.")
    )]
    MissingEnv { name: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(tagflow::config))]
    Config { message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(tagflow::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render configuration: {0}")]
    #[diagnostic(code(tagflow::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::MissingEnv { .. } => {
                exit_code::AUTH
            }
            Self::ReaderNotFound { .. } | Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::PartialFailure { .. } => exit_code::PARTIAL,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unreachable { endpoint, reason } => CliError::Unreachable {
                reader: endpoint,
                reason,
            },
            CoreError::AuthRejected { endpoint, message } => CliError::AuthFailed {
                reader: endpoint,
                message,
            },
            CoreError::Unauthorized { endpoint } => CliError::AuthFailed {
                reader: endpoint,
                message: "session token refused".into(),
            },
            CoreError::Conflict { endpoint, message } => CliError::Conflict {
                reader: endpoint,
                message,
            },
            CoreError::EndpointNotFound { name } => CliError::ReaderNotFound { name },
            CoreError::SourceUnavailable { message } => CliError::ReferenceUnavailable { message },
            CoreError::MalformedEvent { message } => CliError::Validation {
                field: "read event".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { reader } => CliError::NoCredentials { reader },
            ConfigError::MissingEnv { name } => CliError::MissingEnv { name },
            ConfigError::Io(e) => CliError::Io(e),
            ConfigError::Serialization(e) => CliError::Toml(e),
            ConfigError::Figment(e) => CliError::Config {
                message: e.to_string(),
            },
        }
    }
}
