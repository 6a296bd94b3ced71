//! iOS Simulators: simctl for lifecycle and screenshots, WebDriverAgent for
//! everything the user does on screen.

use super::ios::command_failure;
use super::simctl_apps::{parse_ios_app_data, SimulatorApp};
use crate::agents::WebDriverAgent;
use crate::command::{CommandRequest, CommandRunner};
use crate::config::RobotConfig;
use crate::robot::{Button, InstalledApp, Orientation, Robot, ScreenElement, ScreenSize, SwipeDirection};
use crate::{Result, RobotError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const XCRUN: &str = "xcrun";

/// simctl complains when asked to terminate an app that is not running.
fn is_not_running(err: &RobotError) -> bool {
    match err {
        RobotError::Command { output, .. } => output.contains("found nothing to terminate"),
        _ => false,
    }
}

pub struct SimulatorRobot {
    udid: String,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    wda: WebDriverAgent,
}

impl SimulatorRobot {
    pub fn new(udid: &str, config: &RobotConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            udid: udid.to_string(),
            runner,
            command_timeout: config.command_timeout,
            wda: WebDriverAgent::with_base_url(config.wda_base_url()),
        }
    }

    async fn simctl(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut full = vec!["simctl"];
        full.extend_from_slice(args);
        let output = self
            .runner
            .run(CommandRequest::new(XCRUN, full, self.command_timeout))
            .await?;
        Ok(output.stdout)
    }

    async fn wda(&self) -> Result<&WebDriverAgent> {
        if !self.wda.is_running().await {
            return Err(RobotError::wda_not_running("the simulator"));
        }
        Ok(&self.wda)
    }

    /// Full app records as reported by `simctl listapps`.
    pub async fn list_simulator_apps(&self) -> Result<Vec<SimulatorApp>> {
        let raw = self.simctl(&["listapps", &self.udid]).await?;
        Ok(parse_ios_app_data(&String::from_utf8_lossy(&raw)))
    }
}

#[async_trait]
impl Robot for SimulatorRobot {
    fn device_id(&self) -> &str {
        &self.udid
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
        self.simctl(&["io", &self.udid, "screenshot", "-"]).await
    }

    async fn get_elements_on_screen(&self) -> Result<Vec<ScreenElement>> {
        self.wda().await?.get_elements_on_screen().await
    }

    async fn list_apps(&self) -> Result<Vec<InstalledApp>> {
        Ok(self
            .list_simulator_apps()
            .await?
            .into_iter()
            .map(|app| InstalledApp {
                package_name: app.bundle_identifier,
                app_name: app.display_name,
            })
            .collect())
    }

    async fn launch_app(&self, package_name: &str) -> Result<()> {
        self.simctl(&["launch", &self.udid, package_name]).await?;
        Ok(())
    }

    async fn terminate_app(&self, package_name: &str) -> Result<()> {
        match self.simctl(&["terminate", &self.udid, package_name]).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_running(&e) => {
                debug!("{} was not running on {}", package_name, self.udid);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn install_app(&self, path: &str) -> Result<()> {
        self.simctl(&["install", &self.udid, path])
            .await
            .map_err(|e| command_failure("install app", e))?;
        Ok(())
    }

    async fn uninstall_app(&self, package_name: &str) -> Result<()> {
        self.simctl(&["uninstall", &self.udid, package_name])
            .await
            .map_err(|e| command_failure("uninstall app", e))?;
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.simctl(&["openurl", &self.udid, url]).await?;
        Ok(())
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
