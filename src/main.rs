//! OpenWeatherMap Prometheus Exporter
//!
//! Daemon entry point: resolve configuration, start the scrape server, then
//! poll until SIGINT or SIGTERM.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      owm-exporter                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │  │ OpenWeather  │───▶│   PollLoop   │───▶│  MetricSet   │    │
//! │  │   Client     │    │              │    │  (/metrics)  │    │
//! │  └──────────────┘    └──────────────┘    └──────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use owm_exporter::adapters::{OpenWeatherClient, OpenWeatherConfig, PrometheusSink};
use owm_exporter::config::{CliOverrides, ConfigResolver, EnvOverrides, LogLevel};
use owm_exporter::lifecycle::LifecycleController;
use owm_exporter::metrics::{MetricSet, MetricsServer};
use owm_exporter::poller::{PollLoop, PollLoopConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Prometheus exporter for OpenWeatherMap current weather
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file (default: config.yaml next to the binary)
    #[arg(short = 'f', long = "file", visible_short_alias = 'c', visible_alias = "config-file")]
    file: Option<PathBuf>,

    /// Increase verbosity (-v warning, -vv info, -vvv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(
        CliOverrides {
            config_file: args.file.clone(),
            verbosity: args.verbose,
        },
        EnvOverrides::from_env(),
    );

    // Logging depends on the resolved level, so config errors go to stderr
    let config = match resolver.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("owm-exporter: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(config.log_level, args.log_json);

    info!("Starting OpenWeatherMap exporter");
    match &config.config_file {
        Some(path) => info!("  Config file: {}", path.display()),
        None => warn!(
            "  Config file {} not found, using defaults and environment",
            resolver.config_path().display()
        ),
    }
    info!("  Interval: {:?}", config.interval);
    info!("  Units: {}", config.units);
    info!("  Locations: {}", config.locations.len());

    // Start metrics server
    let metrics = Arc::new(MetricSet::new()?);
    let server = MetricsServer::bind(config.listen_addr()).await.map_err(|e| {
        error!("{}", e);
        e
    })?;

    let lifecycle = LifecycleController::new();
    let _signals = lifecycle.install_signal_handlers()?;

    let server_handle = tokio::spawn(server.serve(Arc::clone(&metrics), lifecycle.token()));

    // Wire the poll loop
    let provider = OpenWeatherClient::new(
        OpenWeatherConfig::new(config.api_key.clone()).with_timeout(config.request_timeout),
    )?;
    let sink = PrometheusSink::new(Arc::clone(&metrics));
    let poll_loop = PollLoop::new(
        PollLoopConfig::from(&config),
        Arc::new(provider),
        Arc::new(sink),
        lifecycle.clone(),
    );

    let cycles = poll_loop.run().await;

    match server_handle.await {
        Ok(Err(e)) => error!("Metrics server error: {}", e),
        Err(e) => error!("Metrics server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Exporter shutdown complete after {} cycles", cycles);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(level: LogLevel, json: bool) {
    let mut filter = EnvFilter::from_default_env().add_directive(level.as_tracing_level().into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
