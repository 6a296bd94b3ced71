//! Owned state for a caller driving one device at a time.

use crate::command::CommandRunner;
use crate::config::RobotConfig;
use crate::devices::{AndroidRobot, IosRobot, SimulatorRobot};
use crate::discovery::{self, AvailableDevices};
use crate::image::{ImageMagick, ImageTransformer};
use crate::robot::{Button, DeviceKind, Robot, ScreenElement, ScreenSize};
use crate::screenshot::{Screenshot, ScreenshotOptimizer};
use crate::{Result, RobotError};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// The selected backend, tagged by kind.
pub enum SelectedRobot {
    Android(AndroidRobot),
    Ios(IosRobot),
    Simulator(SimulatorRobot),
}

impl SelectedRobot {
    pub fn kind(&self) -> DeviceKind {
        match self {
            SelectedRobot::Android(_) => DeviceKind::Android,
            SelectedRobot::Ios(_) => DeviceKind::Ios,
            SelectedRobot::Simulator(_) => DeviceKind::Simulator,
        }
    }

    pub fn robot(&self) -> &dyn Robot {
        match self {
            SelectedRobot::Android(robot) => robot,
            SelectedRobot::Ios(robot) => robot,
            SelectedRobot::Simulator(robot) => robot,
        }
    }

    async fn release(self) {
        if let SelectedRobot::Android(robot) = self {
            robot.shutdown().await;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UiState {
    pub screen_size: ScreenSize,
    #[serde(skip)]
    pub screenshot: Screenshot,
    pub elements: Vec<ScreenElement>,
}

pub struct DeviceController {
    config: RobotConfig,
    runner: Arc<dyn CommandRunner>,
    optimizer: ScreenshotOptimizer,
    current: Option<SelectedRobot>,
}

impl DeviceController {
    /// Uses ImageMagick for screenshot optimization.
    pub fn new(config: RobotConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let magick: Arc<dyn ImageTransformer> =
            Arc::new(ImageMagick::new(runner.clone(), config.command_timeout));
        Self::with_transformer(config, runner, Some(magick))
    }

    pub fn with_transformer(
        config: RobotConfig,
        runner: Arc<dyn CommandRunner>,
        transformer: Option<Arc<dyn ImageTransformer>>,
    ) -> Self {
        let optimizer =
            ScreenshotOptimizer::new(transformer, config.screenshot_max_width, config.jpeg_quality);
        Self {
            config,
            runner,
            optimizer,
            current: None,
        }
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Binds a fresh robot to `device_id`, releasing the previous one.
    pub async fn use_device(&mut self, kind: DeviceKind, device_id: &str) {
        let selected = match kind {
            DeviceKind::Android => {
                SelectedRobot::Android(AndroidRobot::new(device_id, &self.config, self.runner.clone()))
            }
            DeviceKind::Ios => SelectedRobot::Ios(IosRobot::new(device_id, &self.config, self.runner.clone())),
            DeviceKind::Simulator => {
                SelectedRobot::Simulator(SimulatorRobot::new(device_id, &self.config, self.runner.clone()))
            }
        };
        if let Some(previous) = self.current.replace(selected) {
            previous.release().await;
        }
        info!("Selected {:?} device {}", kind, device_id);
    }

    pub fn current(&self) -> Option<&SelectedRobot> {
        self.current.as_ref()
    }

    pub fn require_robot(&self) -> Result<&dyn Robot> {
        self.current
            .as_ref()
            .map(SelectedRobot::robot)
            .ok_or_else(RobotError::no_device_selected)
    }

    pub async fn take_screenshot(&self) -> Result<Screenshot> {
        let robot = self.require_robot()?;
        let (size, png) = tokio::try_join!(robot.get_screen_size(), robot.get_screenshot())?;
        self.optimizer.process(png, size.scale).await
    }

    /// Screen size, screenshot and elements fetched concurrently.
    pub async fn ui_state(&self) -> Result<UiState> {
        let robot = self.require_robot()?;
        let (size, png, elements) = tokio::join!(
            robot.get_screen_size(),
            robot.get_screenshot(),
            robot.get_elements_on_screen(),
        );
        let screen_size = size?;
        let screenshot = self.optimizer.process(png?, screen_size.scale).await?;
        Ok(UiState {
            screen_size,
            screenshot,
            elements: elements?,
        })
    }

    pub async fn type_text(&self, text: &str, submit: bool) -> Result<()> {
        let robot = self.require_robot()?;
        robot.send_keys(text).await?;
        if submit {
            robot.press_button(Button::Enter).await?;
        }
        Ok(())
    }

    pub async fn list_available_devices(&self) -> AvailableDevices {
        discovery::list_available_devices(self.runner.clone(), &self.config).await
    }

    /// Releases the selected robot.
    pub async fn shutdown(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.release().await;
        }
    }
}
