//! Enumerates connected Android devices, physical iOS devices and booted
//! Simulators from the output of their command-line tools.
//!
//! Discovery is best effort: a missing tool yields an empty list and a
//! warning, never an error.

use crate::command::{CommandRequest, CommandRunner};
use crate::config::RobotConfig;
use crate::devices::simulator::XCRUN;
use crate::devices::{AndroidDeviceType, AndroidRobot};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidDevice {
    pub device_id: String,
    pub device_type: AndroidDeviceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IosDevice {
    pub device_id: String,
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulator {
    pub name: String,
    #[serde(rename = "udid")]
    pub uuid: String,
    pub state: String,
}

impl Simulator {
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

/// Everything `mobile-devices` prints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AvailableDevices {
    pub android: Vec<AndroidDevice>,
    pub ios: Vec<IosDevice>,
    pub simulators: Vec<Simulator>,
}

#[derive(Debug, Deserialize)]
struct SimctlDevices {
    #[serde(default)]
    devices: HashMap<String, Vec<Simulator>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoIosList {
    #[serde(default)]
    device_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoIosVersion {
    #[serde(default)]
    version: String,
}

/// Serials of devices in the `device` state; unauthorized and offline
/// entries are left out.
pub fn parse_adb_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.starts_with("List of devices attached"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            (parts.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}

pub fn parse_simctl_devices(output: &str) -> Result<Vec<Simulator>> {
    let parsed: SimctlDevices = serde_json::from_str(output)?;
    let mut runtimes: Vec<_> = parsed.devices.into_iter().collect();
    runtimes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(runtimes.into_iter().flat_map(|(_, devices)| devices).collect())
}

fn is_release_version(output: &str) -> bool {
    serde_json::from_str::<GoIosVersion>(output)
        .map(|v| v.version.starts_with('v') || v.version == "local-build")
        .unwrap_or(false)
}

pub async fn list_android_devices(
    runner: Arc<dyn CommandRunner>,
    config: &RobotConfig,
) -> Vec<AndroidDevice> {
    let adb = config.adb_path.to_string_lossy().into_owned();
    let output = match runner
        .run(CommandRequest::new(adb, ["devices"], config.command_timeout))
        .await
    {
        Ok(output) => output.stdout_lossy(),
        Err(e) => {
            warn!("Could not run adb, is ANDROID_HOME set? {}", e);
            return Vec::new();
        }
    };

    let mut devices = Vec::new();
    for device_id in parse_adb_devices(&output) {
        let robot = AndroidRobot::new(&device_id, config, runner.clone());
        let device_type = robot.get_device_type().await.unwrap_or_else(|e| {
            debug!("Feature query failed on {}: {}", device_id, e);
            AndroidDeviceType::Mobile
        });
        devices.push(AndroidDevice {
            device_id,
            device_type,
        });
    }
    devices
}

async fn go_ios(runner: &dyn CommandRunner, config: &RobotConfig, args: &[&str]) -> Result<String> {
    let program = config.go_ios_path.to_string_lossy().into_owned();
    let output = runner
        .run(CommandRequest::new(program, args.iter().copied(), config.command_timeout))
        .await?;
    Ok(output.stdout_lossy())
}

pub async fn is_go_ios_installed(runner: &dyn CommandRunner, config: &RobotConfig) -> bool {
    match go_ios(runner, config, &["version"]).await {
        Ok(output) => is_release_version(&output),
        Err(_) => false,
    }
}

async fn list_ios_devices_inner(runner: &dyn CommandRunner, config: &RobotConfig) -> Result<Vec<IosDevice>> {
    let list: GoIosList = serde_json::from_str(&go_ios(runner, config, &["list"]).await?)?;
    let mut devices = Vec::with_capacity(list.device_list.len());
    for device_id in list.device_list {
        let info: serde_json::Value =
            serde_json::from_str(&go_ios(runner, config, &["info", "--udid", &device_id]).await?)?;
        let device_name = info
            .get("DeviceName")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&device_id)
            .to_string();
        devices.push(IosDevice {
            device_id,
            device_name,
        });
    }
    Ok(devices)
}

pub async fn list_ios_devices(runner: Arc<dyn CommandRunner>, config: &RobotConfig) -> Vec<IosDevice> {
    if !is_go_ios_installed(runner.as_ref(), config).await {
        warn!("go-ios is not installed, physical iOS devices cannot be detected");
        return Vec::new();
    }
    list_ios_devices_inner(runner.as_ref(), config)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not list iOS devices: {}", e);
            Vec::new()
        })
}

pub async fn list_simulators(runner: Arc<dyn CommandRunner>, config: &RobotConfig) -> Vec<Simulator> {
    if !cfg!(target_os = "macos") {
        return Vec::new();
    }
    let request = CommandRequest::new(XCRUN, ["simctl", "list", "devices", "-j"], config.command_timeout);
    let parsed = match runner.run(request).await {
        Ok(output) => parse_simctl_devices(&output.stdout_lossy()),
        Err(e) => Err(e),
    };
    parsed.unwrap_or_else(|e| {
        warn!("Could not list simulators: {}", e);
        Vec::new()
    })
}

pub async fn list_booted_simulators(runner: Arc<dyn CommandRunner>, config: &RobotConfig) -> Vec<Simulator> {
    list_simulators(runner, config)
        .await
        .into_iter()
        .filter(Simulator::is_booted)
        .collect()
}

/// Runs the three discovery calls concurrently.
pub async fn list_available_devices(runner: Arc<dyn CommandRunner>, config: &RobotConfig) -> AvailableDevices {
    let (android, ios, simulators) = tokio::join!(
        list_android_devices(runner.clone(), config),
        list_ios_devices(runner.clone(), config),
        list_booted_simulators(runner, config),
    );
    AvailableDevices {
        android,
        ios,
        simulators,
    }
}
