//! Command-line interface definitions for session-wrench.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, config file, error format) apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Rebuild lost sessions from the server databases and the frame log
//! session-wrench restore-sessions devices.txt
//!
//! # Recover sessions from an older store dump
//! session-wrench restore-sessions-from-dump devices.txt \
//!     --dump-datetime "2024-03-01 10:00:00 +0300"
//!
//! # Export two sessions as CSV
//! session-wrench get-sessions aa00000000000001,aa00000000000002 -o csv
//!
//! # Verbose mode for debugging
//! session-wrench -v restore-sessions devices.txt
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::lorawan::{AesKey, DevAddr, Eui64};
use crate::output::OutputFormat;

/// Inspect, import and rebuild LoRaWAN device-sessions.
///
/// Sessions live in the network server's key-value store. When they are lost,
/// session-wrench rebuilds them from the server databases and the frame log,
/// or recovers them from an older dump of the store.
#[derive(Debug, Parser)]
#[command(name = "session-wrench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: ./session-wrench.toml, then the user config dir)
    #[arg(short, long, value_name = "PATH", global = true, env = "SESSION_WRENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for session-wrench.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild sessions from the server databases and the frame log
    RestoreSessions(RestoreArgs),
    /// Recover sessions from an older dump of the session store
    RestoreSessionsFromDump(RestoreFromDumpArgs),
    /// Fetch sessions from the store
    GetSessions(GetSessionsArgs),
    /// Write sessions from a CSV file
    SetSessions(SetSessionsArgs),
    /// Encrypt or decrypt an FRMPayload
    Plcrypt(PlcryptArgs),
    /// Print the effective configuration as TOML
    Configfile,
}

/// Format of the end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Log lines only
    Log,
    /// Log lines plus a JSON document on stdout
    Json,
}

/// Arguments for the restore-sessions subcommand.
#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Text file with one DevEUI per line
    #[arg(value_name = "FILE")]
    pub devices: PathBuf,

    /// Report format
    #[arg(long, value_enum, default_value = "log")]
    pub report: ReportFormat,
}

/// Arguments for the restore-sessions-from-dump subcommand.
#[derive(Debug, Args)]
pub struct RestoreFromDumpArgs {
    /// Text file with one DevEUI per line
    #[arg(value_name = "FILE")]
    pub devices: PathBuf,

    /// When the dump was taken, e.g. "2024-03-01 10:00:00 +0300"
    #[arg(short = 'd', long, value_name = "DATETIME", alias = "redis-dump-datetime")]
    pub dump_datetime: String,

    /// Report format
    #[arg(long, value_enum, default_value = "log")]
    pub report: ReportFormat,
}

/// Arguments for the get-sessions subcommand.
#[derive(Debug, Args)]
pub struct GetSessionsArgs {
    /// Comma separated DevEUIs
    #[arg(value_name = "DEV_EUIS", value_delimiter = ',', required = true)]
    pub dev_euis: Vec<Eui64>,

    /// Output format (json to stdout, csv to a file)
    #[arg(short, long = "output-format", value_enum, default_value = "json")]
    pub output: OutputFormat,

    /// Directory for CSV files
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,
}

/// Arguments for the set-sessions subcommand.
#[derive(Debug, Args)]
pub struct SetSessionsArgs {
    /// CSV file with one session per row
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Added to every FCntUp
    #[arg(short = 'u', long = "up-cnt-increase", value_name = "N", default_value = "0")]
    pub up_increase: u32,

    /// Added to every NFCntDown
    #[arg(short = 'd', long = "down-cnt-increase", value_name = "N", default_value = "0")]
    pub down_increase: u32,
}

/// Arguments for the plcrypt subcommand.
#[derive(Debug, Args)]
pub struct PlcryptArgs {
    /// Application session key (hex)
    #[arg(short = 's', long = "session-key", value_name = "HEX")]
    pub key: AesKey,

    /// Device address (hex)
    #[arg(short = 'a', long = "devaddr", value_name = "HEX")]
    pub dev_addr: DevAddr,

    /// Frame counter
    #[arg(short = 'f', long = "fcnt", value_name = "N", default_value = "0")]
    pub f_cnt: u32,

    /// Decrypt an uplink payload (by default a downlink payload is encrypted)
    #[arg(short = 'd', long)]
    pub decrypt: bool,

    /// Payload (hex)
    #[arg(value_name = "DATA")]
    pub data: String,
}
