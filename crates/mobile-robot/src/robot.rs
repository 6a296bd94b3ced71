use crate::{Result, RobotError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Screen size in logical units; `scale` is physical pixels per logical unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenElementRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenElementRect {
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenElement {
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(rename = "coordinates")]
    pub rect: ScreenElementRect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
}

impl ScreenElement {
    pub fn new(element_type: impl Into<String>, rect: ScreenElementRect) -> Self {
        Self {
            element_type: element_type.into(),
            text: None,
            label: None,
            name: None,
            value: None,
            identifier: None,
            rect,
            focused: None,
        }
    }

    /// An element is worth returning when something names it and it covers
    /// some area.
    pub fn is_useful(&self) -> bool {
        let named = [&self.text, &self.label, &self.name, &self.identifier]
            .iter()
            .any(|field| field.as_deref().is_some_and(|s| !s.is_empty()));
        named && self.rect.has_area()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub package_name: String,
    pub app_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for SwipeDirection {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(SwipeDirection::Up),
            "down" => Ok(SwipeDirection::Down),
            "left" => Ok(SwipeDirection::Left),
            "right" => Ok(SwipeDirection::Right),
            _ => Err(RobotError::unsupported(format!("Swipe direction \"{}\"", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Button {
    Home,
    Back,
    VolumeUp,
    VolumeDown,
    Enter,
    DpadCenter,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Home => "HOME",
            Button::Back => "BACK",
            Button::VolumeUp => "VOLUME_UP",
            Button::VolumeDown => "VOLUME_DOWN",
            Button::Enter => "ENTER",
            Button::DpadCenter => "DPAD_CENTER",
            Button::DpadUp => "DPAD_UP",
            Button::DpadDown => "DPAD_DOWN",
            Button::DpadLeft => "DPAD_LEFT",
            Button::DpadRight => "DPAD_RIGHT",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Button {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        let button = match s.to_ascii_uppercase().as_str() {
            "HOME" => Button::Home,
            "BACK" => Button::Back,
            "VOLUME_UP" => Button::VolumeUp,
            "VOLUME_DOWN" => Button::VolumeDown,
            "ENTER" => Button::Enter,
            "DPAD_CENTER" => Button::DpadCenter,
            "DPAD_UP" => Button::DpadUp,
            "DPAD_DOWN" => Button::DpadDown,
            "DPAD_LEFT" => Button::DpadLeft,
            "DPAD_RIGHT" => Button::DpadRight,
            _ => return Err(RobotError::unsupported(format!("Button \"{}\"", s))),
        };
        Ok(button)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Wire form used by WebDriverAgent and UiAutomator2.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Orientation::Portrait => "PORTRAIT",
            Orientation::Landscape => "LANDSCAPE",
        }
    }

    pub fn from_wire(value: &str) -> Self {
        if value.eq_ignore_ascii_case("portrait") {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => f.write_str("portrait"),
            Orientation::Landscape => f.write_str("landscape"),
        }
    }
}

impl FromStr for Orientation {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(RobotError::unsupported(format!("Orientation \"{}\"", s))),
        }
    }
}

/// Which backend drives a device; chosen explicitly at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Android,
    Ios,
    Simulator,
}

impl FromStr for DeviceKind {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(DeviceKind::Android),
            "ios" => Ok(DeviceKind::Ios),
            "simulator" => Ok(DeviceKind::Simulator),
            _ => Err(RobotError::unsupported(format!("Device type \"{}\"", s))),
        }
    }
}

/// Common device-control capability implemented by every backend.
///
/// Coordinates are logical units on every backend. A robot is bound to one
/// device id for its whole lifetime.
#[async_trait]
pub trait Robot: Send + Sync {
    fn device_id(&self) -> &str;

    async fn get_screen_size(&self) -> Result<ScreenSize>;

    async fn tap(&self, x: i32, y: i32) -> Result<()>;

    async fn double_tap(&self, x: i32, y: i32) -> Result<()>;

    /// `duration_ms` falls back to the backend's own default when `None`.
    async fn long_press(&self, x: i32, y: i32, duration_ms: Option<u64>) -> Result<()>;

    async fn swipe(&self, direction: SwipeDirection) -> Result<()>;

    async fn swipe_between_points(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Result<()>;

    async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<()>;

    async fn send_keys(&self, text: &str) -> Result<()>;

    async fn press_button(&self, button: Button) -> Result<()>;

    /// Raw PNG bytes.
    async fn get_screenshot(&self) -> Result<Vec<u8>>;

    async fn get_elements_on_screen(&self) -> Result<Vec<ScreenElement>>;

    async fn list_apps(&self) -> Result<Vec<InstalledApp>>;

    async fn launch_app(&self, package_name: &str) -> Result<()>;

    /// No-op when the app is not running.
    async fn terminate_app(&self, package_name: &str) -> Result<()>;

    async fn install_app(&self, path: &str) -> Result<()>;

    async fn uninstall_app(&self, package_name: &str) -> Result<()>;

    async fn open_url(&self, url: &str) -> Result<()>;

    async fn set_orientation(&self, orientation: Orientation) -> Result<()>;

    async fn get_orientation(&self) -> Result<Orientation>;

    /// Returns whether a keyboard was visible and got dismissed.
    async fn hide_keyboard(&self) -> Result<bool>;

    async fn clear_text_field(&self) -> Result<()>;
}

/// End point of a swipe of `distance` units starting at (x, y).
pub fn swipe_target(x: i32, y: i32, direction: SwipeDirection, distance: i32) -> (i32, i32) {
    match direction {
        SwipeDirection::Up => (x, y - distance),
        SwipeDirection::Down => (x, y + distance),
        SwipeDirection::Left => (x - distance, y),
        SwipeDirection::Right => (x + distance, y),
    }
}

/// Start and end points for a full-screen swipe: 60% of the dimension,
/// centered, on the perpendicular center line.
pub fn swipe_points(size: &ScreenSize, direction: SwipeDirection) -> ((i32, i32), (i32, i32)) {
    let center_x = size.width / 2;
    let center_y = size.height / 2;
    let near = |extent: i32| (extent as f64 * 0.20) as i32;
    let far = |extent: i32| (extent as f64 * 0.80) as i32;

    match direction {
        SwipeDirection::Up => ((center_x, far(size.height)), (center_x, near(size.height))),
        SwipeDirection::Down => ((center_x, near(size.height)), (center_x, far(size.height))),
        SwipeDirection::Left => ((far(size.width), center_y), (near(size.width), center_y)),
        SwipeDirection::Right => ((near(size.width), center_y), (far(size.width), center_y)),
    }
}
