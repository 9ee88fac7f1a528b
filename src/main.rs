use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tello_joy::config::AppConfig;
use tello_joy::joy::{DriverSettings, JoyDriverHandle};
use tello_joy::lifecycle::{LifecycleController, NodeHandle, ParameterStore};
use tello_joy::transport::mqtt::MqttTransport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (config, path) = AppConfig::load_or_init(config_path).await?;
    info!("Using configuration {}", path.display());

    let mqtt = Arc::new(MqttTransport::connect(&config.mqtt));

    let driver = if config.driver.enabled {
        config.driver.validate()?;
        Some(start_driver(
            config.driver.clone(),
            config.node.joy_topic.clone(),
            mqtt.clone(),
        ))
    } else {
        info!("Gamepad driver disabled, expecting joy samples from the broker");
        None
    };

    let params = ParameterStore::new(config.node.drone_name.clone());
    let controller = LifecycleController::new(
        config.node.clone(),
        config.binding.clone(),
        params,
        mqtt.clone(),
    )?;
    let node = NodeHandle::spawn(controller);

    node.configure().await?;

    let timeout = Duration::from_millis(config.node.service_timeout_ms);
    if !node.wait_for_service(timeout).await? {
        warn!(
            "Service '{}' not available yet, requests will be queued",
            config.node.action_service
        );
    }
    node.activate().await?;

    if let Some((driver, _)) = &driver {
        if driver.is_finished() {
            warn!("Joy driver stopped during startup, no gamepad samples will be forwarded");
        }
    }

    info!("{} running, press Ctrl-C to stop", node.name());
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    node.deactivate().await?;
    node.cleanup().await?;
    node.shutdown().await?;
    node.join().await;

    if let Some((driver, forward)) = driver {
        stop_driver(driver, forward).await;
    }
    mqtt.disconnect().await;

    Ok(())
}

/// Starts the gamepad driver and a task forwarding its samples to the broker.
fn start_driver(
    settings: DriverSettings,
    topic: String,
    mqtt: Arc<MqttTransport>,
) -> (JoyDriverHandle, JoinHandle<()>) {
    let (sample_tx, mut sample_rx) = mpsc::channel(16);
    let driver = JoyDriverHandle::spawn(settings, sample_tx);

    let forward = tokio::spawn(async move {
        while let Some(sample) = sample_rx.recv().await {
            if let Err(e) = mqtt.publish_joy(&topic, &sample) {
                warn!("Failed to forward joy sample: {}", e);
            }
        }
        debug!("Joy forwarding stopped");
    });

    (driver, forward)
}

async fn stop_driver(driver: JoyDriverHandle, forward: JoinHandle<()>) {
    if let Err(e) = driver.stop().await {
        error!("Joy driver stopped with error: {}", e);
    }
    if let Err(e) = forward.await {
        error!("Joy forwarding task failed: {}", e);
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
