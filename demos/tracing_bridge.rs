use tokio::time::{sleep, Duration};
use tracing::{error, info};

use edd_logger::{
    backend::driver_from_env,
    init::{init_tracing_with_config, LayerConfig},
};

#[tokio::main]
async fn main() {
    // EDD_LOGGER_DSN or DB_URL select the driver; console otherwise.
    let driver = driver_from_env().expect("failed to build driver");

    let config = LayerConfig {
        service_name: Some("auth".to_string()),
        enable_stdout: false,
        ..LayerConfig::default()
    };
    init_tracing_with_config(driver, config).expect("install subscriber");

    info!("starting service");

    error!(
        trace_id = "trace-42",
        user = "42",
        action = "login",
        duration_ms = 8.3,
        "authentication failed"
    );

    // Give the background task a little time to drain the channel
    sleep(Duration::from_secs(1)).await;
}
