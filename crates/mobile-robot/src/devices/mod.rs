pub mod android;
pub mod ios;
pub mod simctl_apps;
pub mod simulator;

pub use android::{AndroidDeviceType, AndroidRobot};
pub use ios::IosRobot;
pub use simctl_apps::{parse_ios_app_data, SimulatorApp};
pub use simulator::SimulatorRobot;
