//! Garage door controller
//!
//! Loads the configuration, configures the pins, wires the notification bus
//! and interrupt dispatcher, and serves the API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use garage_api::{start_server, AppState, TokenVerifier};
use garage_bus::{InterruptDispatcher, MqttPublisher, NotificationBus};
use garage_config::{GarageConfig, GpioBackend};
use garage_doors::GarageController;
use garage_gpio::{SharedHardware, SimulatedGpio};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "GARAGE_CONFIG", default_value = "garage.yaml")]
    config: PathBuf,

    /// Log filter, overrides RUST_LOG (e.g. "debug" or "garage_bus=trace")
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    info!("Starting garage door controller v{}", env!("CARGO_PKG_VERSION"));

    let config = match GarageConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", args.config.display(), e);
            eprintln!("Example configuration:\n\n{}", GarageConfig::example());
            return Err(e).context("invalid configuration");
        }
    };

    run(config).await
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_hardware(backend: GpioBackend) -> Result<SharedHardware> {
    match backend {
        GpioBackend::Simulated => {
            warn!("Using the simulated GPIO backend, no doors will move");
            Ok(Arc::new(SimulatedGpio::new()))
        }
        #[cfg(feature = "rpi")]
        GpioBackend::Rpi => {
            let gpio = garage_gpio::RppalGpio::new().context("failed to open the GPIO header")?;
            Ok(Arc::new(gpio))
        }
        #[cfg(not(feature = "rpi"))]
        GpioBackend::Rpi => {
            anyhow::bail!("gpio.backend is 'rpi' but this build lacks the 'rpi' feature")
        }
    }
}

async fn run(config: GarageConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let hardware = build_hardware(config.gpio.backend)?;
    let controller = GarageController::new(hardware.clone(), &config, shutdown_rx.clone());
    controller
        .setup_pins()
        .context("failed to configure GPIO pins")?;
    info!(board = %controller.info(), "GPIO ready");

    let sensors = controller.sensors().clone();
    let bus = match &config.mqtt {
        Some(mqtt) => {
            let (publisher, connection) = MqttPublisher::connect(mqtt);
            let bus = NotificationBus::with_mqtt(sensors, Arc::new(publisher), mqtt);
            connection.spawn(bus.clone(), shutdown_rx.clone());
            bus
        }
        None => {
            info!("No MQTT broker configured");
            NotificationBus::new(sensors)
        }
    };

    InterruptDispatcher::new(bus.clone(), &config.doors)
        .start(hardware.as_ref(), config.gpio.edge_capacity)
        .context("failed to register sensor interrupts")?;

    let verifier =
        TokenVerifier::from_config(&config.auth).context("failed to set up token verification")?;

    let state = AppState {
        controller,
        bus,
        verifier: Arc::new(verifier),
        debug_routes: config.server.debug_routes,
    };
    if state.debug_routes {
        warn!("Debug routes enabled");
    }

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutting down...");
        let _ = shutdown_tx.send(true);
    };

    start_server(state, &config.server.bind, shutdown)
        .await
        .with_context(|| format!("API server on {} failed", config.server.bind))?;

    info!("Garage door controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["garage-door"]).unwrap();
        assert!(args.log_level.is_none());
        // GARAGE_CONFIG may be set in the environment running the tests
        if std::env::var_os("GARAGE_CONFIG").is_none() {
            assert_eq!(args.config, PathBuf::from("garage.yaml"));
        }
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "garage-door",
            "--config",
            "/etc/garage/garage.yaml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/garage/garage.yaml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_simulated_backend() {
        let hardware = build_hardware(GpioBackend::Simulated).unwrap();
        assert_eq!(hardware.board_id(), "Simulated GPIO board");
    }

    #[cfg(not(feature = "rpi"))]
    #[test]
    fn test_rpi_backend_requires_feature() {
        assert!(build_hardware(GpioBackend::Rpi).is_err());
    }
}
