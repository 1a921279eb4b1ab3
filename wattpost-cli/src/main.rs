//! CLI for the wattpost PostgREST uploader.
//!
//! Provides commands for validating upload configurations, inspecting the
//! CSV schema an output set produces, encoding a log dump offline, and
//! running a live uploader against a PostgREST endpoint.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use wattpost::config::UploadConfig;
use wattpost::encoder::{Batch, RowEncoder};
use wattpost::log::{LogStore, MemoryLog, Snapshot};
use wattpost::measurement::{ChannelRate, Measurement, sort_measurements};
use wattpost::transport::HttpTransport;
use wattpost::uploader::{UploadState, Uploader};

/// wattpost — PostgREST uploader for embedded time-series logs.
#[derive(Parser)]
#[command(name = "wattpost", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Load and validate an upload configuration, then print a summary.
    Validate {
        /// Path to the configuration JSON.
        config: PathBuf,
    },

    /// Print the CSV header an output set produces.
    Header {
        /// Path to the outputs JSON (array of channel-rate measurements).
        outputs: PathBuf,
    },

    /// Encode a log dump to CSV on stdout, without uploading.
    Encode {
        /// Path to the configuration JSON.
        config: PathBuf,

        /// Path to the log dump JSON (array of snapshots).
        log: PathBuf,

        /// Path to the outputs JSON.
        outputs: PathBuf,

        /// Device identity substituted into the device-name template.
        #[arg(long, default_value = "wattpost")]
        device: String,
    },

    /// Run an uploader against a PostgREST endpoint, replaying a log dump.
    Run {
        /// Path to the configuration JSON.
        config: PathBuf,

        /// Path to the log dump JSON.
        log: PathBuf,

        /// Path to the outputs JSON.
        outputs: PathBuf,

        /// Device identity substituted into the device-name template.
        #[arg(long, default_value = "wattpost")]
        device: String,

        /// PostgREST base URL (e.g., "http://localhost:3000").
        #[arg(long)]
        url: String,

        /// HTTP request timeout in seconds.
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Header { outputs } => cmd_header(&outputs),
        Commands::Encode {
            config,
            log,
            outputs,
            device,
        } => cmd_encode(&config, &log, &outputs, &device),
        Commands::Run {
            config,
            log,
            outputs,
            device,
            url,
            timeout,
        } => cmd_run(&config, &log, &outputs, &device, &url, timeout),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Loads an outputs file into a sorted measurement list.
fn load_outputs(path: &PathBuf) -> Result<Vec<Box<dyn Measurement>>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let rates: Vec<ChannelRate> = serde_json::from_str(&text)?;
    let mut measurements: Vec<Box<dyn Measurement>> = rates
        .into_iter()
        .map(|r| Box::new(r) as Box<dyn Measurement>)
        .collect();
    sort_measurements(&mut measurements);
    Ok(measurements)
}

/// Loads a log dump into an in-memory log store.
fn load_log(path: &PathBuf) -> Result<MemoryLog, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let mut records: Vec<Snapshot> = serde_json::from_str(&text)?;
    records.sort_by_key(|r| r.time);

    let mut log = MemoryLog::new();
    for record in records {
        log.push(record);
    }
    Ok(log)
}

/// Implements `wattpost validate <config>`.
fn cmd_validate(config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = UploadConfig::from_path(config_path)?;

    println!("Config: {}", config_path.display());
    println!();
    println!("  Endpoint path: {}", config.endpoint_path());
    println!("  Schema:        {}", config.effective_schema());
    println!("  Device name:   {}", config.device_name);
    println!("  Interval:      {}s", config.interval);
    println!("  Bulk send:     {} interval(s)", config.bulk_send);
    println!("  Buffer limit:  {} bytes", config.buffer_limit);
    println!(
        "  Auth:          {}",
        if config.jwt_token.is_some() {
            "JWT bearer token"
        } else {
            "anonymous"
        }
    );
    Ok(())
}

/// Implements `wattpost header <outputs>`.
fn cmd_header(outputs_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let measurements = load_outputs(outputs_path)?;
    let encoder = RowEncoder::new(&measurements, "$device".to_string());
    println!("{}", encoder.header());
    Ok(())
}

/// Implements `wattpost encode <config> <log> <outputs>`.
///
/// Walks every complete interval in the dump and prints the batch body that
/// the uploader would POST, in one piece.
fn cmd_encode(
    config_path: &PathBuf,
    log_path: &PathBuf,
    outputs_path: &PathBuf,
    device: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = UploadConfig::from_path(config_path)?;
    let log = load_log(log_path)?;
    let measurements = load_outputs(outputs_path)?;
    if log.is_empty() {
        return Err("log dump holds no records".into());
    }

    let encoder = RowEncoder::new(&measurements, config.resolve_device_name(device));
    let mut batch = Batch::new(usize::MAX);

    let interval = config.interval;
    let mut t = log.first_key() - log.first_key() % interval;
    let mut older = log.read_at(t);

    while t + interval <= log.last_key() {
        let newer = log.read_at(t + interval);
        if (newer.log_hours - older.log_hours) != 0.0 {
            encoder.encode_tick(&measurements, &older, &newer, &mut batch);
        }
        older = newer;
        t += interval;
    }

    if batch.row_count() == 0 {
        return Err("no complete intervals with logged data in the dump".into());
    }
    print!("{}", batch.take_body());
    Ok(())
}

/// Implements `wattpost run <config> <log> <outputs> --url <base>`.
///
/// Drives the cooperative tick loop forever: the uploader resolves its
/// resume point, drains the dump, then idles waiting for data that will
/// never arrive. Useful for exercising a PostgREST table end to end.
fn cmd_run(
    config_path: &PathBuf,
    log_path: &PathBuf,
    outputs_path: &PathBuf,
    device: &str,
    url: &str,
    timeout: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = UploadConfig::from_path(config_path)?;
    let log = load_log(log_path)?;
    let measurements = load_outputs(outputs_path)?;

    let transport = HttpTransport::new(url, Duration::from_secs(timeout))?;
    let mut uploader = Uploader::new(config, device, measurements, log, transport)?;

    tracing::info!(url, device = uploader.device_name(), "uploader started");

    loop {
        let delay = uploader.tick();
        if uploader.state() == UploadState::Stopped {
            tracing::info!("uploader stopped");
            return Ok(());
        }
        std::thread::sleep(delay);
    }
}
