//! shravan - vehicle telemetry subscriber daemon
//!
//! Two threads: the subscriber maintains the TLS stream connection and
//! feeds decoded signal updates into the shared hub; the main thread runs
//! the range audit consumer and writes the recorded series to CSV when the
//! drive cycle ends.

use shravan::app::{self, RangeAudit};
use shravan::config::AppConfig;
use shravan::error::{Error, Result};
use shravan::sink::SignalHub;
use shravan::subscriber::{Subscriber, Timing};
use shravan::transport::TlsEndpoint;
use std::env;
use std::path::Path;
use std::sync::Arc;

/// Parsed command line.
///
/// Supports:
/// - `shravan [host] [port]` (positional overrides of the config file)
/// - `shravan --config <path>` / `-c <path>`
struct CliArgs {
    config_path: String,
    host: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();
    let mut config_path = "shravan.toml".to_string();
    let mut positionals = Vec::new();

    let mut i = 1;
    while i < args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            config_path = args[i + 1].clone();
            i += 2;
        } else {
            positionals.push(args[i].clone());
            i += 1;
        }
    }

    CliArgs {
        config_path,
        host: positionals.first().cloned(),
        port: positionals.get(1).and_then(|p| p.parse().ok()),
    }
}

fn main() -> Result<()> {
    let cli = parse_args();
    let mut config = AppConfig::from_file(&cli.config_path)?;
    if let Some(host) = cli.host {
        config.tcp.host = host;
    }
    if let Some(port) = cli.port {
        config.tcp.port = port;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("shravan v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!("Server: {}:{}", config.tcp.host, config.tcp.port);

    let hub = Arc::new(SignalHub::new());

    let ctrlc_hub = Arc::clone(&hub);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        ctrlc_hub.mark_stopped();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let connector = TlsEndpoint::from_config(&config)?;
    let subscriber_hub = Arc::clone(&hub);
    let _subscriber_thread = std::thread::Builder::new()
        .name("subscriber".to_string())
        .spawn(move || {
            let mut subscriber =
                Subscriber::new(Box::new(connector), subscriber_hub, Timing::default());
            match subscriber.run() {
                Ok(()) => log::info!("Subscriber stopped"),
                Err(e) => {
                    // Unclassified socket error: fail fast, no flush.
                    log::error!("Subscriber failed: {}", e);
                    std::process::exit(1);
                }
            }
        })?;

    let series = RangeAudit::new(Arc::clone(&hub)).run();
    app::write_csv(&series, Path::new(&config.output.csv_path))?;

    // The subscriber may still be probing if the cycle ended on the idle
    // cutoff; mark the hub stopped so it winds down before process exit.
    hub.mark_stopped();
    log::info!("shravan stopped");
    Ok(())
}
