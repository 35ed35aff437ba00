use crate::driver::LogDriver;
use crate::layer::DriverLayer;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the tracing bridge.
///
/// **Fields**
/// - `channel_buffer`: maximum number of queued records before new ones
///   are dropped.
/// - `min_level`: least severe level forwarded to the driver.
/// - `service_name`: value written to every record's `service` field.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed as well, so events (and driver notices) are printed to stdout.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub min_level: Level,
    pub service_name: Option<String>,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            min_level: Level::ERROR,
            service_name: None,
            enable_stdout: true,
        }
    }
}

/// Install a global subscriber that forwards events to `driver`.
///
/// **Returns**
/// - The handle of the forwarding task.
/// - `Err(..)` if a global subscriber was already installed.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    driver: Arc<dyn LogDriver>,
    config: LayerConfig,
) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    let (layer, handle) = DriverLayer::new(
        driver,
        config.channel_buffer,
        config.min_level,
        config.service_name,
    );

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(handle)
}

/// Install the bridge with [`LayerConfig::default`].
pub fn init_tracing(driver: Arc<dyn LogDriver>) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    init_tracing_with_config(driver, LayerConfig::default())
}

/// Install only the stdout `fmt` subscriber, so driver notices (first
/// connection, schema applied) are printed without bridging events.
pub fn init_notices() -> Result<(), SetGlobalDefaultError> {
    let subscriber = Registry::default().with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
}
