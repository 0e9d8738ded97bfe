//! Status server - Main Entry Point
//!
//! Loads the configuration, wires every configured attribute to a simulated
//! instrument, starts collection in the requested mode and logs the latest
//! snapshot until interrupted.

use instrument_status_server::{
    client::SimulatedClientFactory,
    engine::build_engine,
    error::ErrorReporter,
    logging::{init_logging, LogConfig},
    Scheduler, StatusServer, StatusServerConfig,
};

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

/// Collection mode to start in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Keep full history
    Heavy,
    /// Last values only, per-attribute delays
    Light,
    /// Last values only, one delay for every attribute
    Fixed,
}

/// Status server configuration
#[derive(Parser, Debug)]
#[command(name = "status-server")]
#[command(about = "Collects and serves instrument attribute values")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "STATUS_SERVER_CONFIG", default_value = "status-server.toml")]
    config: PathBuf,

    /// Collection mode
    #[arg(long, value_enum, default_value_t = Mode::Heavy)]
    mode: Mode,

    /// Delay used by every attribute in fixed mode
    #[arg(long, default_value_t = 1_000, allow_negative_numbers = true)]
    fixed_rate_ms: i64,

    /// Seconds between two logged snapshots
    #[arg(long, default_value_t = 10)]
    snapshot_interval: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.debug {
        log_config = log_config.with_level(Level::DEBUG).with_thread_ids(true);
    }
    init_logging(log_config)?;

    let config = StatusServerConfig::load(&cli.config)?;
    info!(
        "Loaded {} device(s) from {}",
        config.devices.len(),
        cli.config.display()
    );

    let scheduler = Arc::new(Scheduler::with_worker_threads(config.engine.worker_threads)?);
    let factory = SimulatedClientFactory::new();
    let (engine, report) = build_engine(&config, &factory, scheduler).await?;
    if !report.is_clean() {
        warn!(report = %serde_json::to_string(&report)?, "Setup incomplete");
    }

    let server = StatusServer::new(Arc::new(engine)).with_use_aliases(config.engine.use_aliases);
    let started = match cli.mode {
        Mode::Heavy => server.start_collect_data().await,
        Mode::Light => server.start_light_polling().await,
        Mode::Fixed => server.start_light_polling_at_fixed_rate(cli.fixed_rate_ms).await,
    };
    if let Err(e) = started {
        error!(response = %ErrorReporter::format_api_error(&e), "Start command rejected");
        server.shutdown().await?;
        return Err(e.into());
    }
    info!("Status: {}", server.status().await);

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.snapshot_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for record in server.get_latest_snapshot() {
                    info!("{}", record);
                }
            }
        }
    }

    info!("Interrupted, stopping");
    server.stop_collect_data().await?;
    server.shutdown().await?;
    Ok(())
}
