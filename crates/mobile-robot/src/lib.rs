pub mod agents;
pub mod command;
pub mod config;
pub mod controller;
pub mod coords;
pub mod devices;
pub mod discovery;
pub mod elements;
pub mod error;
pub mod http;
pub mod image;
pub mod png;
pub mod robot;
pub mod screenshot;

pub use agents::{UiAutomator2Client, WebDriverAgent};
pub use command::{CommandOutput, CommandRequest, CommandRunner, SystemRunner};
pub use config::{RobotConfig, UnimportantViews};
pub use controller::{DeviceController, SelectedRobot, UiState};
pub use devices::{AndroidRobot, IosRobot, SimulatorRobot};
pub use error::{Result, RobotError};
pub use robot::{
    Button, DeviceKind, InstalledApp, Orientation, Robot, ScreenElement, ScreenElementRect, ScreenSize,
    SwipeDirection,
};
pub use screenshot::{Screenshot, ScreenshotOptimizer};
