//! CLI entry point for the GTFS-RT service alert collector.
//!
//! `collect` takes one snapshot of the feed and refreshes the daily archive,
//! `archive` only rebuilds a daily archive, and `inspect` decodes a saved
//! payload.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use gtfs_rt_sa_collector::{
    alerts::normalize,
    config::{Config, ConfigLayer},
    fetch::BasicClient,
    output::{RunId, print_json},
    parser::decode,
    pipeline,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_sa_collector")]
#[command(about = "Snapshot and archive a GTFS-RT service alerts feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed once, save it and refresh today's archive
    Collect {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the run report as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rebuild the daily archive without fetching
    Archive {
        #[command(flatten)]
        config: ConfigArgs,

        /// Day to archive (YYYY-MM-DD), defaults to today in UTC
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Decode a saved .pb payload and print its alert rows
    Inspect {
        /// Path to a raw feed file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file (also read from COLLECTOR_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URL
    #[arg(long)]
    url: Option<String>,

    /// Directory receiving payloads, tables and archives
    #[arg(long, value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// File name prefix of payloads and tables
    #[arg(long)]
    prefix: Option<String>,
}

impl ConfigArgs {
    /// Defaults, then config file, then environment, then flags.
    fn resolve(&self) -> Result<Config> {
        let mut config = Config::default();

        let file = self
            .config
            .clone()
            .or_else(|| std::env::var("COLLECTOR_CONFIG").ok().map(PathBuf::from));
        if let Some(path) = file {
            config = config.merge(ConfigLayer::load(&path)?);
        }

        config = config.merge(ConfigLayer::from_env()?);
        config = config.merge(ConfigLayer {
            feed_url: self.url.clone(),
            archive_dir: self.archive_dir.clone(),
            timeout_secs: self.timeout_secs,
            file_prefix: self.prefix.clone(),
        });

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_rt_sa_collector.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_sa_collector.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect { config, json } => {
            let config = config.resolve()?;
            info!(
                url = %config.feed_url,
                archive_dir = %config.archive_dir.display(),
                "Starting collection"
            );

            let client = BasicClient::new()?;
            let report = pipeline::run(&config, &client).await;

            if json {
                print_json(&report)?;
            }
            if report.succeeded() {
                info!(summary = %report.summary(), "Collection finished");
            } else {
                error!(summary = %report.summary(), "Collection finished with errors");
            }
        }
        Commands::Archive { config, date } => {
            let config = config.resolve()?;
            let day = date.unwrap_or_else(|| Utc::now().date_naive());

            match pipeline::archive(&config, day) {
                Ok(bundle) => info!(
                    bundle = %bundle.path.display(),
                    entries = bundle.entries.len(),
                    "Archive updated"
                ),
                Err(e) => error!(error = %e, "Archive failed"),
            }
        }
        Commands::Inspect { file } => {
            let bytes = std::fs::read(&file)?;
            let alerts = decode(&bytes)?;
            let capture = RunId::capture_from_file_name(&file).unwrap_or_else(Utc::now);
            let records = normalize(&alerts, capture);

            info!(alerts = alerts.len(), records = records.len(), "Payload decoded");
            print_json(&records)?;
        }
    }

    Ok(())
}
