//! Departure guard - forgotten items reminder for the front door
//!
//! Watches the hallway for someone leaving, checks whether tracked items
//! stayed behind and pushes a reminder to the owner's phone.
//!
//! Module structure:
//! - `domain/` - Household document and pipeline value types
//! - `io/` - Sensors, push client and config HTTP API
//! - `services/` - Trigger, exit confirmation, probes, throttle, monitor loop
//! - `infra/` - Config, metrics, household store

use clap::Parser;
use departure_guard::infra::{Config, HouseholdStore, Metrics};
use departure_guard::io::{start_api_server, ApiState, LinePushClient, SensorSuite};
use departure_guard::services::{ManualTrigger, MonitorLoop};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Departure guard - forgotten items reminder
#[derive(Parser, Debug)]
#[command(name = "departure-guard", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG overrides, default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    info!(git_hash = %env!("GIT_HASH"), "departure-guard starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        sensor_mode = %config.sensor_mode().as_str(),
        data_file = %config.data_file(),
        exit_timeout_ms = %config.exit_timeout().as_millis(),
        motion_pixel_threshold = %config.motion_pixel_threshold(),
        tag_attempts = %config.tag_attempts(),
        notify_min_interval_secs = %config.notify_min_interval().as_secs(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(HouseholdStore::new(config.data_file()));
    let metrics = Arc::new(Metrics::new());
    let manual = ManualTrigger::new();

    // Config API (port 0 disables it)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = Arc::new(ApiState {
            store: store.clone(),
            manual: manual.clone(),
            metrics: metrics.clone(),
        });
        let bind_address = config.http_bind_address().to_string();
        let api_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_api_server(&bind_address, http_port, state, api_shutdown).await {
                tracing::error!(error = %format!("{e:#}"), "http_api_error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(metrics_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let sensors = SensorSuite::from_config(&config, store.clone()).await;
    let push = Arc::new(LinePushClient::new(config.notify_endpoint(), config.notify_timeout())?);
    let mut monitor =
        MonitorLoop::from_config(&config, store, sensors, manual, push, metrics.clone());

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    monitor.run(shutdown_rx).await;

    metrics.report().log();
    info!("departure-guard shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_from_env_and_flag() {
        std::env::set_var("CONFIG_FILE", "config/pi.toml");

        let args = Args::try_parse_from(["departure-guard"]).unwrap();
        assert_eq!(args.config, "config/pi.toml");

        let args = Args::try_parse_from(["departure-guard", "--config", "other.toml"]).unwrap();
        assert_eq!(args.config, "other.toml");

        std::env::remove_var("CONFIG_FILE");
        let args = Args::try_parse_from(["departure-guard"]).unwrap();
        assert_eq!(args.config, "config/dev.toml");
    }
}
