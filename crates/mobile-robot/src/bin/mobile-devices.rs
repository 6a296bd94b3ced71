use anyhow::Result;
use mobile_robot::discovery::list_available_devices;
use mobile_robot::{RobotConfig, SystemRunner};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RobotConfig::from_env();
    let devices = list_available_devices(Arc::new(SystemRunner), &config).await;
    tracing::info!(
        "Found {} Android, {} iOS and {} Simulator devices",
        devices.android.len(),
        devices.ios.len(),
        devices.simulators.len()
    );

    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}
