//! session-wrench - LoRaWAN device-session maintenance
//!
//! Inspects, imports and rebuilds the device-sessions a LoRaWAN network server
//! keeps in its key-value store. Lost sessions are rebuilt from the server
//! databases and the frame log, or recovered from an older store dump.

pub mod batch;
pub mod cli;
pub mod config;
pub mod connect;
pub mod context;
pub mod error;
pub mod import;
pub mod logging;
pub mod lorawan;
pub mod output;
pub mod progress;
pub mod restore;
pub mod session;
pub mod sources;
pub mod store;

use std::io::{self, Write};

use anyhow::Context as _;

use crate::batch::{read_device_list, run_batch, BatchReport};
use crate::cli::{Cli, Commands, GetSessionsArgs, PlcryptArgs, ReportFormat, SetSessionsArgs};
use crate::config::Config;
use crate::context::{connect_identity, connect_store, Context};
use crate::error::ExitCode;
use crate::import::{import_sessions, read_sessions, CounterAdjust};
use crate::lorawan::crypto::{encrypt_frm_payload, Direction};
use crate::progress::Progress;
use crate::restore::dump::parse_cutoff;
use crate::restore::{ColdRebuild, DumpRecovery};
use crate::store::StoreError;

/// Run the command selected on the command line.
///
/// Inputs (device lists, CSV files, timestamps) are validated before any
/// store or database is contacted.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Plcrypt(args) = &cli.command {
        logging::init_logging(cli.verbose, cli.quiet, None);
        return plcrypt(args);
    }

    let config = Config::load(cli.config.as_deref())?;
    let configured = logging::parse_level(&config.general.log_level);
    logging::init_logging(cli.verbose, cli.quiet, configured);
    log::debug!("log level: {}", logging::current_level_name());

    match cli.command {
        Commands::RestoreSessions(args) => {
            let band = config.band()?;
            let devices = read_device_list(&args.devices)?;
            let ctx = Context::connect(&config, band, false)?;
            let progress = Progress::new(cli.quiet);
            let engine = ColdRebuild::from_context(&ctx);
            let report = run_batch(&engine, &ctx.store, &devices, &progress);
            finish_batch(&report, args.report)
        }
        Commands::RestoreSessionsFromDump(args) => {
            let band = config.band()?;
            let cutoff = parse_cutoff(&args.dump_datetime)?;
            let devices = read_device_list(&args.devices)?;
            let ctx = Context::connect(&config, band, true)?;
            let progress = Progress::new(cli.quiet);
            let engine = DumpRecovery::from_context(&ctx, cutoff)
                .context("dump store not connected")?;
            log::info!("dump taken at {}", engine.cutoff());
            let report = run_batch(&engine, &ctx.store, &devices, &progress);
            finish_batch(&report, args.report)
        }
        Commands::GetSessions(args) => get_sessions(&config, &args),
        Commands::SetSessions(args) => set_sessions(&config, &args),
        Commands::Plcrypt(args) => plcrypt(&args),
        Commands::Configfile => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::Success)
        }
    }
}

fn finish_batch(report: &BatchReport, format: ReportFormat) -> anyhow::Result<ExitCode> {
    if format == ReportFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(report.exit_code())
}

/// Exit code for a run that handled `done` out of `total` items.
fn completion(done: usize, total: usize) -> ExitCode {
    if done == 0 {
        ExitCode::NothingRestored
    } else if done == total {
        ExitCode::Success
    } else {
        ExitCode::PartialSuccess
    }
}

fn get_sessions(config: &Config, args: &GetSessionsArgs) -> anyhow::Result<ExitCode> {
    let band = config.band()?;
    let store = connect_store(config, &band)?;

    let mut sessions = Vec::with_capacity(args.dev_euis.len());
    for dev_eui in &args.dev_euis {
        match store.get(dev_eui) {
            Ok(s) => sessions.push(s),
            Err(StoreError::NotFound(_)) => log::warn!("dev_eui={} no device-session", dev_eui),
            Err(e) => log::error!("dev_eui={} {}", dev_eui, e),
        }
    }
    if sessions.len() != args.dev_euis.len() {
        log::warn!(
            "fetched {} out of {} requested session(s)",
            sessions.len(),
            args.dev_euis.len()
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_sessions(&sessions, args.output, &args.out_dir, &mut out)?;
    out.flush()?;
    Ok(completion(sessions.len(), args.dev_euis.len()))
}

fn set_sessions(config: &Config, args: &SetSessionsArgs) -> anyhow::Result<ExitCode> {
    let records = read_sessions(&args.file)?;
    log::info!("{} session row(s) read from {}", records.len(), args.file.display());

    let band = config.band()?;
    let store = connect_store(config, &band)?;
    let identity = connect_identity(config)?;
    let adjust = CounterAdjust {
        up: args.up_increase,
        down: args.down_increase,
    };
    let report = import_sessions(&store, &identity, records, adjust)?;
    Ok(completion(report.saved, report.rows))
}

fn plcrypt(args: &PlcryptArgs) -> anyhow::Result<ExitCode> {
    let data = hex::decode(args.data.trim()).context("payload is not valid hex")?;
    let (direction, job) = if args.decrypt {
        (Direction::Uplink, "Decrypted")
    } else {
        (Direction::Downlink, "Encrypted")
    };
    let result = encrypt_frm_payload(&args.key, direction, args.dev_addr, args.f_cnt, &data)?;
    println!("Input data: {}", args.data);
    println!("{} RESULT : {}", job, hex::encode(result));
    Ok(ExitCode::Success)
}
