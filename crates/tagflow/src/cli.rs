//! Clap derive structures for the `tagflow` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tagflow_core::ScanMode;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tagflow -- RFID tag ingestion and reader session service
#[derive(Debug, Parser)]
#[command(
    name = "tagflow",
    version,
    about = "Ingest RFID tag reads, track reader health and stream live tag updates",
    long_about = "Drives a fleet of RFID readers through their session lifecycle,\n\
        deduplicates and enriches tag reads against reference data, classifies\n\
        tags into zones, and streams tag and health events as JSON lines.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "TAGFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TAGFLOW_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Logical scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanModeArg {
    /// Regular inventory scan
    Standard,
    /// Locate specific tags
    DirectedSearch,
}

impl From<ScanModeArg> for ScanMode {
    fn from(arg: ScanModeArg) -> Self {
        match arg {
            ScanModeArg::Standard => Self::Standard,
            ScanModeArg::DirectedSearch => Self::DirectedSearch,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the service: health polling, ingestion and live event stream
    Run(RunArgs),

    /// Start scanning on every reader
    Start(ScanArgs),

    /// Stop scanning on every reader
    Stop,

    /// Check every reader's reachability and authentication
    #[command(alias = "hc")]
    Health(HealthArgs),

    /// Decode hex tag identifiers to text
    Decode(DecodeArgs),

    /// Show the zone table, or classify one reader/antenna pair
    Zone(ZoneArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Begin this scan mode as soon as the service is up
    #[arg(long, value_name = "MODE")]
    pub start: Option<ScanModeArg>,

    /// Accept pushed reads and control commands as newline-delimited JSON
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Reader name for pushed reads that carry no host name
    #[arg(long, default_value = "push")]
    pub push_reader: String,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Scan mode to start
    #[arg(long, short = 'm', default_value = "standard")]
    pub mode: ScanModeArg,
}

#[derive(Debug, Args)]
pub struct HealthArgs {
    /// Report only this reader
    pub reader: Option<String>,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Hex identifiers (EPC or TID)
    #[arg(required = true)]
    pub hex: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ZoneArgs {
    /// Reader name
    #[arg(requires = "antenna")]
    pub reader: Option<String>,

    /// Antenna port
    pub antenna: Option<u16>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the configuration file path
    Path,
    /// Show the effective configuration (secrets redacted)
    Show,
    /// Write a commented sample configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
