//! Physical iOS devices: go-ios for app lifecycle and screenshots,
//! WebDriverAgent through a tunnel and port forward for interaction.

use crate::agents::WebDriverAgent;
use crate::command::{CommandRequest, CommandRunner};
use crate::config::RobotConfig;
use crate::robot::{Button, InstalledApp, Orientation, Robot, ScreenElement, ScreenSize, SwipeDirection};
use crate::{Result, RobotError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tracing::debug;

const TUNNEL_MIN_MAJOR_VERSION: u32 = 17;
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfo {
    pub product_version: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

pub(crate) async fn is_listening(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

pub(crate) fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

pub(crate) fn command_failure(action: &str, err: RobotError) -> RobotError {
    match err {
        RobotError::Command { output, .. } => RobotError::actionable(
            format!("Failed to {}: {}", action, output),
            "Check the bundle and the device state, then retry",
        ),
        other => other,
    }
}

pub struct IosRobot {
    device_id: String,
    go_ios_path: String,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    wda: WebDriverAgent,
    wda_host: String,
    wda_port: u16,
    tunnel_port: u16,
    major_version: OnceCell<u32>,
}

impl IosRobot {
    pub fn new(device_id: &str, config: &RobotConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            device_id: device_id.to_string(),
            go_ios_path: config.go_ios_path.to_string_lossy().into_owned(),
            runner,
            command_timeout: config.command_timeout,
            wda: WebDriverAgent::with_base_url(config.wda_base_url()),
            wda_host: config.wda_host.clone(),
            wda_port: config.wda_port,
            tunnel_port: config.ios_tunnel_port,
            major_version: OnceCell::new(),
        }
    }

    async fn ios(&self, args: &[&str]) -> Result<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.push("--udid".to_string());
        full.push(self.device_id.clone());
        let output = self
            .runner
            .run(CommandRequest::new(self.go_ios_path.clone(), full, self.command_timeout))
            .await?;
        Ok(output.stdout_lossy())
    }

    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        let output = self.ios(&["info"]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn os_major_version(&self) -> Result<u32> {
        self.major_version
            .get_or_try_init(|| async {
                let info = self.get_device_info().await?;
                major_version(&info.product_version).ok_or_else(|| {
                    RobotError::Protocol(format!("Unexpected iOS version {}", info.product_version))
                })
            })
            .await
            .copied()
    }

    async fn assert_tunnel_running(&self) -> Result<()> {
        if self.os_major_version().await? >= TUNNEL_MIN_MAJOR_VERSION
            && !is_listening("localhost", self.tunnel_port).await
        {
            return Err(RobotError::tunnel_not_running());
        }
        Ok(())
    }

    /// Checks tunnel, port forward and agent in that order.
    async fn wda(&self) -> Result<&WebDriverAgent> {
        self.assert_tunnel_running().await?;
        if !is_listening(&self.wda_host, self.wda_port).await {
            return Err(RobotError::wda_forward_not_running());
        }
        if !self.wda.is_running().await {
            return Err(RobotError::wda_not_running("the device (tunnel and port forward are okay)"));
        }
        Ok(&self.wda)
    }
}

fn parse_app_list(output: &str) -> Vec<InstalledApp> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(bundle, name)| InstalledApp {
            package_name: bundle.to_string(),
            app_name: name.trim().to_string(),
        })
        .collect()
}

#[async_trait]
impl Robot for IosRobot {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn get_screen_size(&self) -> Result<ScreenSize> {
        self.wda().await?.get_screen_size().await
    }

    async fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.wda().await?.tap(x, y).await
    }

    async fn double_tap(&self, x: i32, y: i32) -> Result<()> {
        self.wda().await?.double_tap(x, y).await
    }

    async fn long_press(&self, x: i32, y: i32, duration_ms: Option<u64>) -> Result<()> {
        self.wda().await?.long_press(x, y, duration_ms).await
    }

    async fn swipe(&self, direction: SwipeDirection) -> Result<()> {
        self.wda().await?.swipe(direction).await
    }

    async fn swipe_between_points(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Result<()> {
        self.wda().await?.swipe_between_points(x0, y0, x1, y1).await
    }

    async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<()> {
        self.wda()
            .await?
            .swipe_from_coordinate(x, y, direction, distance)
            .await
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        self.wda().await?.send_keys(text).await
    }

    async fn press_button(&self, button: Button) -> Result<()> {
        self.wda().await?.press_button(button).await
    }

    async fn get_screenshot(&self) -> Result<Vec<u8>> {
        self.assert_tunnel_running().await?;
        let file = tempfile::Builder::new()
            .prefix("screenshot-")
            .suffix(".png")
            .tempfile()?;
        let path = file.path().to_string_lossy().into_owned();
        debug!("Capturing {} into {}", self.device_id, path);
        self.ios(&["screenshot", "--output", &path]).await?;
        Ok(tokio::fs::read(file.path()).await?)
    }

    async fn get_elements_on_screen(&self) -> Result<Vec<ScreenElement>> {
        self.wda().await?.get_elements_on_screen().await
    }

    async fn list_apps(&self) -> Result<Vec<InstalledApp>> {
        self.assert_tunnel_running().await?;
        let output = self.ios(&["apps", "--all", "--list"]).await?;
        Ok(parse_app_list(&output))
    }

    async fn launch_app(&self, package_name: &str) -> Result<()> {
        self.assert_tunnel_running().await?;
        self.ios(&["launch", package_name]).await?;
        Ok(())
    }

    async fn terminate_app(&self, package_name: &str) -> Result<()> {
        self.assert_tunnel_running().await?;
        self.ios(&["kill", package_name]).await?;
        Ok(())
    }

    async fn install_app(&self, path: &str) -> Result<()> {
        self.assert_tunnel_running().await?;
        let path_arg = format!("--path={}", path);
        self.ios(&["install", &path_arg])
            .await
            .map_err(|e| command_failure("install app", e))?;
        Ok(())
    }

    async fn uninstall_app(&self, package_name: &str) -> Result<()> {
        self.assert_tunnel_running().await?;
        self.ios(&["uninstall", package_name])
            .await
            .map_err(|e| command_failure("uninstall app", e))?;
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.wda().await?.open_url(url).await
    }

    async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        self.wda().await?.set_orientation(orientation).await
    }

    async fn get_orientation(&self) -> Result<Orientation> {
        self.wda().await?.get_orientation().await
    }

    async fn hide_keyboard(&self) -> Result<bool> {
        self.wda().await?.dismiss_keyboard().await
    }

    async fn clear_text_field(&self) -> Result<()> {
        self.wda().await?.clear_active_element().await
    }
}
