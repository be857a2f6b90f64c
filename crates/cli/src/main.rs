//! RAN Monitor CLI
//!
//! A command-line tool for watching per-UE findings, querying the ingest
//! endpoint, operating the persisted snapshot store and running the vendor
//! log parsers.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{parse, snapshots, store, watch};
use monitor_lib::forwarder::SendOrder;
use monitor_lib::parser::Vendor;
use monitor_lib::store::{SourceMode, DEFAULT_CAPACITY, DEFAULT_HISTORY_LIMIT};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RAN Monitor CLI
#[derive(Parser)]
#[command(name = "ranmon")]
#[command(author, version, about = "CLI for the RAN telemetry monitor", long_about = None)]
pub struct Cli {
    /// Ingest endpoint URL (can also be set via RANMON_ENDPOINT env var)
    #[arg(long, env = "RANMON_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Directory holding the persisted snapshot store
    #[arg(long, env = "RANMON_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll snapshots into the local store and show live findings
    Watch {
        /// Acquisition mode (persisted in the store)
        #[arg(long, value_parser = parse_mode)]
        mode: Option<SourceMode>,

        /// Time between cycles, e.g. 3s or 500ms
        #[arg(long, default_value = "3s", value_parser = parse_duration)]
        interval: Duration,

        /// Snapshots retained in the store
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: usize,

        /// History samples per UE fed to the inference rules
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        history: usize,

        /// Exit after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Show the most recent snapshot held by the ingest endpoint
    Latest,

    /// Evaluate the UEs of the newest snapshot held by the ingest endpoint
    Findings {
        /// Only this UE (decimal, or hex such as 0x1a2b)
        #[arg(long, value_parser = parse_rnti)]
        rnti: Option<u32>,

        /// History samples per UE fed to the inference rules
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        history: usize,
    },

    /// POST a JSON snapshot (or array of snapshots) file to the ingest endpoint
    Push {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Operate the persisted snapshot store
    #[command(subcommand)]
    Store(StoreCommands),

    /// Parse base-station console output into snapshots
    #[command(subcommand)]
    Parse(ParseCommands),
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Show store state
    Status,

    /// Stop scheduled acquisition
    Pause,

    /// Resume scheduled acquisition
    Resume,

    /// Drop all snapshots, reject anything older, switch to API mode and pause
    Flush,

    /// Set the acquisition mode
    Mode {
        /// mock or api
        #[arg(value_parser = parse_mode)]
        mode: SourceMode,
    },

    /// Set the remote ingest endpoint used in API mode
    Endpoint {
        /// Endpoint URL
        url: String,
    },
}

#[derive(Subcommand)]
pub enum ParseCommands {
    /// srsRAN gNB console metrics
    Srsran(ParseArgs),

    /// OAI gNB periodic MAC statistics
    Oai(ParseArgs),
}

#[derive(Args)]
pub struct ParseArgs {
    /// Console output file to read
    #[arg(long, short)]
    pub input: PathBuf,

    /// Tail the file from its current end until Ctrl-C
    #[arg(long)]
    pub follow: bool,

    /// Forward snapshots to this ingest URL
    #[arg(long)]
    pub post_url: Option<String>,

    /// NDJSON output, `-` for stdout (default when nothing else is selected)
    #[arg(long, short)]
    pub output: Option<String>,

    /// Append one CSV row per UE to this file
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Minimum time between forwarded POSTs
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub send_interval: Duration,

    /// Which buffered snapshots each POST carries
    #[arg(long, default_value = "latest", value_parser = parse_send_order)]
    pub send_order: SendOrder,

    /// Source label written into every snapshot
    #[arg(long)]
    pub source: Option<String>,

    /// Per-request POST timeout
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Retries for transient POST failures
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

fn parse_mode(s: &str) -> Result<SourceMode, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_send_order(s: &str) -> Result<SendOrder, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// Accepts `500ms`, `3s`, `2m` or bare seconds (`1.5`)
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, "m")
    } else {
        (s, "s")
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;
    let secs = match unit {
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        _ => value,
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("duration must be positive, got '{}'", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("duration '{}' is too large", s))
}

/// Same decoding as the vendor parsers: digits are decimal, `1a2b` is hex
fn parse_rnti(s: &str) -> Result<u32, String> {
    monitor_lib::parser::parse_rnti(s).ok_or_else(|| format!("invalid RNTI '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load()?;
    let format = match cli.format {
        Some(format) => format,
        None => config
            .default_format
            .as_deref()
            .and_then(|f| output::OutputFormat::from_str(f, true).ok())
            .unwrap_or_default(),
    };
    let state_dir = config.state_dir(cli.state_dir.as_deref())?;
    let endpoint = cli.endpoint.clone().or_else(|| config.endpoint.clone());

    // Execute command
    match cli.command {
        Commands::Watch {
            mode,
            interval,
            capacity,
            history,
            cycles,
        } => {
            let options = watch::WatchOptions {
                mode,
                endpoint,
                interval,
                capacity,
                history,
                cycles,
            };
            watch::watch(state_dir, options, format).await?;
        }
        Commands::Latest => {
            let client = ingest_client(endpoint, &state_dir)?;
            snapshots::show_latest(&client, format).await?;
        }
        Commands::Findings { rnti, history } => {
            let client = ingest_client(endpoint, &state_dir)?;
            snapshots::show_findings(&client, rnti, history, format).await?;
        }
        Commands::Push { file } => {
            let client = ingest_client(endpoint, &state_dir)?;
            snapshots::push_file(&client, &file, format).await?;
        }
        Commands::Store(store_cmd) => {
            let snapshot_store = store::open(&state_dir);
            match store_cmd {
                StoreCommands::Status => store::show_status(&snapshot_store, &state_dir, format)?,
                StoreCommands::Pause => store::pause(&snapshot_store),
                StoreCommands::Resume => store::resume(&snapshot_store),
                StoreCommands::Flush => store::flush(&snapshot_store),
                StoreCommands::Mode { mode } => store::set_mode(&snapshot_store, mode),
                StoreCommands::Endpoint { url } => store::set_endpoint(&snapshot_store, &url)?,
            }
        }
        Commands::Parse(parse_cmd) => {
            let (vendor, args) = match parse_cmd {
                ParseCommands::Srsran(args) => (Vendor::Srsran, args),
                ParseCommands::Oai(args) => (Vendor::Oai, args),
            };
            parse::run(vendor, args, format).await?;
        }
    }

    Ok(())
}

/// Client for the flag/env/config endpoint, else the one saved in the store
fn ingest_client(endpoint: Option<String>, state_dir: &std::path::Path) -> Result<client::IngestClient> {
    let endpoint = match endpoint {
        Some(endpoint) => endpoint,
        None => store::open(state_dir).endpoint(),
    };
    client::IngestClient::new(&endpoint)
        .with_context(|| format!("Invalid ingest endpoint {}", endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1e30").is_err());
        assert!(parse_duration("1e30m").is_err());
    }

    #[test]
    fn test_parse_rnti() {
        assert_eq!(parse_rnti("4601").unwrap(), 4601);
        assert_eq!(parse_rnti("0x4601").unwrap(), 4601);
        assert_eq!(parse_rnti("0x1a2b").unwrap(), 0x1a2b);
        assert!(parse_rnti("0xzz").is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
