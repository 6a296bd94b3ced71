//! Android backend over adb, with UiAutomator2 as an optional fast path for
//! screenshots and element dumps.

use crate::agents::UiAutomator2Client;
use crate::command::{CommandRequest, CommandRunner};
use crate::config::RobotConfig;
use crate::coords::{scale_from_density, to_logical, to_pixels};
use crate::elements::parse_android_hierarchy;
use crate::robot::{
    swipe_points, swipe_target, Button, InstalledApp, Orientation, Robot, ScreenElement, ScreenSize,
    SwipeDirection,
};
use crate::{Result, RobotError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

const NULL_ROOT_NODE: &str = "null root node returned by UiTestAutomationBridge";
const DUMP_ATTEMPTS: usize = 10;
const UNICODE_IME: &str = "io.appium.settings/.UnicodeIME";
const UIA2_STARTUP_SECS: u64 = 10;
const DEL_BATCH: usize = 50;

pub const DEFAULT_LONG_PRESS_MS: u64 = 1000;
pub const DEFAULT_SWIPE_DISTANCE: i32 = 400;
pub const SWIPE_DURATION_MS: u64 = 1000;

static UNIQUE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"uniqueId "([^"]+)""#).expect("uniqueId pattern compiles"));
static DISPLAY_DEVICE_ON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"DisplayDeviceInfo\{[^}]*?uniqueId="([^"]+)"[^}]*?, state ON,"#)
        .expect("display device pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidDeviceType {
    Mobile,
    Tv,
}

/// Whether UiAutomator2 may be used; settled once per robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastPath {
    Unchecked,
    Available,
    Unavailable,
}

pub struct AndroidRobot {
    device_id: String,
    adb_path: String,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    uia2_enabled: bool,
    scale: OnceCell<f64>,
    uia2: UiAutomator2Client,
    fast_path: Mutex<FastPath>,
}

impl AndroidRobot {
    pub fn new(device_id: &str, config: &RobotConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            device_id: device_id.to_string(),
            adb_path: config.adb_path.to_string_lossy().into_owned(),
            uia2: UiAutomator2Client::new(device_id, config, runner.clone()),
            runner,
            command_timeout: config.command_timeout,
            uia2_enabled: config.uia2_enabled,
            scale: OnceCell::new(),
            fast_path: Mutex::new(FastPath::Unchecked),
        }
    }

    async fn adb(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut full = vec!["-s".to_string(), self.device_id.clone()];
        full.extend(args.iter().map(|a| a.to_string()));
        let output = self
            .runner
            .run(CommandRequest::new(self.adb_path.clone(), full, self.command_timeout))
            .await?;
        Ok(output.stdout)
    }

    async fn shell(&self, args: &[&str]) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        let stdout = self.adb(&full).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Physical pixels per logical unit. Cached after the first successful read.
    pub async fn scale(&self) -> f64 {
        if let Some(scale) = self.scale.get() {
            return *scale;
        }
        let density = self
            .shell(&["wm", "density"])
            .await
            .ok()
            .and_then(|output| parse_density(&output));
        match density {
            Some(density) => {
                let scale = scale_from_density(density);
                let _ = self.scale.set(scale);
                scale
            }
            None => {
                warn!("Could not read density of {}, assuming mdpi", self.device_id);
                1.0
            }
        }
    }

    async fn uia2(&self) -> Option<&UiAutomator2Client> {
        let mut state = self.fast_path.lock().await;
        if *state == FastPath::Unchecked {
            *state = match self.probe_fast_path().await {
                Ok(true) => {
                    info!("Using UiAutomator2 on {}", self.device_id);
                    FastPath::Available
                }
                Ok(false) => FastPath::Unavailable,
                Err(e) => {
                    warn!("UiAutomator2 unavailable on {}: {}", self.device_id, e);
                    FastPath::Unavailable
                }
            };
        }
        (*state == FastPath::Available).then_some(&self.uia2)
    }

    async fn probe_fast_path(&self) -> Result<bool> {
        if !self.uia2_enabled || !self.uia2.is_server_installed().await? {
            return Ok(false);
        }
        if self.uia2.is_running().await {
            return Ok(true);
        }
        self.uia2.start_server().await?;
        Ok(self.uia2.wait_for_server(UIA2_STARTUP_SECS).await)
    }

    async fn disable_fast_path(&self, err: &RobotError) {
        warn!("UiAutomator2 failed on {}, using adb from now on: {}", self.device_id, err);
        *self.fast_path.lock().await = FastPath::Unavailable;
    }

    async fn input_swipe(&self, x0: i32, y0: i32, x1: i32, y1: i32, duration_ms: u64) -> Result<()> {
        let scale = self.scale().await;
        let coords = [
            to_pixels(x0, scale),
            to_pixels(y0, scale),
            to_pixels(x1, scale),
            to_pixels(y1, scale),
        ]
        .map(|c| c.to_string());
        let duration = duration_ms.to_string();
        self.shell(&["input", "swipe", &coords[0], &coords[1], &coords[2], &coords[3], &duration])
            .await?;
        Ok(())
    }

    async fn key_event(&self, keycode: &str) -> Result<()> {
        self.shell(&["input", "keyevent", keycode]).await?;
        Ok(())
    }

    async fn ui_automator_dump(&self) -> Result<String> {
        for attempt in 1..=DUMP_ATTEMPTS {
            let raw = self.adb(&["exec-out", "uiautomator", "dump", "/dev/tty"]).await?;
            let dump = String::from_utf8_lossy(&raw);
            if dump.contains(NULL_ROOT_NODE) {
                debug!("uiautomator returned a null root node (attempt {})", attempt);
                continue;
            }
            return trim_xml(&dump)
                .map(str::to_string)
                .ok_or_else(|| RobotError::Protocol(format!("uiautomator dump has no XML: {}", dump.trim())));
        }
        Err(RobotError::actionable(
            "Failed to get UIAutomator XML",
            "Make sure the device screen is on and unlocked, then retry",
        ))
    }

    async fn display_count(&self) -> usize {
        match self.shell(&["dumpsys", "SurfaceFlinger", "--display-id"]).await {
            Ok(output) => output
                .lines()
                .filter(|line| line.starts_with("Display "))
                .count(),
            Err(e) => {
                debug!("display query failed: {}", e);
                1
            }
        }
    }

    async fn active_display_id(&self) -> Option<String> {
        if let Ok(output) = self.shell(&["cmd", "display", "get-displays"]).await {
            if let Some(id) = parse_active_display(&output) {
                return Some(id);
            }
        }
        let output = self.shell(&["dumpsys", "display"]).await.ok()?;
        parse_active_display_device(&output)
    }

    async fn screencap(&self) -> Result<Vec<u8>> {
        let display = if self.display_count().await > 1 {
            self.active_display_id().await
        } else {
            None
        };
        match display {
            Some(id) => {
                debug!("Capturing display {} of {}", id, self.device_id);
                self.adb(&["exec-out", "screencap", "-p", "-d", &id]).await
            }
            None => self.adb(&["exec-out", "screencap", "-p"]).await,
        }
    }

    async fn send_unicode(&self, text: &str) -> Result<()> {
        let previous = self
            .shell(&["settings", "get", "secure", "default_input_method"])
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "null");

        if let Err(e) = self.shell(&["ime", "set", UNICODE_IME]).await {
            warn!("Could not switch to {}: {}", UNICODE_IME, e);
        }

        let quoted = shell_quote(text);
        let sent = self
            .shell(&["am", "broadcast", "-a", "ADB_INPUT_TEXT", "--es", "msg", &quoted])
            .await;

        if let Some(previous) = previous.filter(|ime| ime != UNICODE_IME) {
            if let Err(e) = self.shell(&["ime", "set", &previous]).await {
                warn!("Could not restore input method {}: {}", previous, e);
            }
        }
        sent.map(|_| ())
    }

    pub async fn list_running_processes(&self) -> Result<Vec<String>> {
        let output = self.shell(&["ps", "-e"]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('u'))
            .filter_map(|line| line.split_whitespace().nth(8))
            .map(str::to_string)
            .collect())
    }

    pub async fn get_system_features(&self) -> Result<Vec<String>> {
        let output = self.shell(&["pm", "list", "features"]).await?;
        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("feature:"))
            .map(str::to_string)
            .collect())
    }

    pub async fn get_device_type(&self) -> Result<AndroidDeviceType> {
        let features = self.get_system_features().await?;
        let tv = features
            .iter()
            .any(|f| f == "android.software.leanback" || f == "android.hardware.type.television");
        Ok(if tv {
            AndroidDeviceType::Tv
        } else {
            AndroidDeviceType::Mobile
        })
    }

    /// Drops the UiAutomator2 session and stops the server if this robot
    /// started it. A server that was already running is left alone.
    pub async fn shutdown(&self) {
        self.uia2.delete_session().await;
        if self.uia2.started_server().await {
            self.uia2.stop_server().await;
        }
    }
}

fn install_failure(action: &str, err: RobotError) -> RobotError {
    match err {
        RobotError::Command { output, .. } => RobotError::actionable(
            format!("Failed to {}: {}", action, output),
            "Check the package and the device state, then retry",
        ),
        other => other,
    }
}

pub fn keycode(button: Button) -> &'static str {
    match button {
        Button::Back => "KEYCODE_BACK",
        Button::Home => "KEYCODE_HOME",
        Button::VolumeUp => "KEYCODE_VOLUME_UP",
        Button::VolumeDown => "KEYCODE_VOLUME_DOWN",
        Button::Enter => "KEYCODE_ENTER",
        Button::DpadCenter => "KEYCODE_DPAD_CENTER",
        Button::DpadUp => "KEYCODE_DPAD_UP",
        Button::DpadDown => "KEYCODE_DPAD_DOWN",
        Button::DpadLeft => "KEYCODE_DPAD_LEFT",
        Button::DpadRight => "KEYCODE_DPAD_RIGHT",
    }
}

/// Last `WxH` token of `wm size` output, so an override wins over the
/// physical size.
pub fn parse_wm_size(output: &str) -> Option<(i32, i32)> {
    let token = output.split_whitespace().last()?;
    let (width, height) = token.split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

pub fn parse_density(output: &str) -> Option<f64> {
    output.split_whitespace().last()?.parse().ok()
}

/// Cuts the log noise uiautomator prints around the XML document.
pub fn trim_xml(dump: &str) -> Option<&str> {
    let start = dump.find('<')?;
    let end = dump.rfind('>')?;
    (end > start).then(|| &dump[start..=end])
}

fn strip_local(id: &str) -> String {
    id.strip_prefix("local:").unwrap_or(id).to_string()
}

/// First powered-on display in `cmd display get-displays` output.
pub fn parse_active_display(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.starts_with("Display id ") && line.contains(", state ON,"))
        .find_map(|line| UNIQUE_ID.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| strip_local(m.as_str()))
}

/// First powered-on display device in `dumpsys display` output.
pub fn parse_active_display_device(output: &str) -> Option<String> {
    DISPLAY_DEVICE_ON
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_local(m.as_str()))
}

/// Escapes text for `input text`, which runs through the device shell.
pub fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*' | '~'
            | '#' | '?' | '[' | ']' | '{' | '}' | '!' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn parse_launcher_packages(output: &str) -> Vec<InstalledApp> {
    let mut seen = HashSet::new();
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("packageName="))
        .filter(|package| seen.insert(package.to_string()))
        .map(|package| InstalledApp {
            package_name: package.to_string(),
            app_name: package.to_string(),
        })
        .collect()
}

#[async_trait]
impl Robot for AndroidRobot {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn get_screen_size(&self) -> Result<ScreenSize> {
        let output = self.shell(&["wm", "size"]).await?;
        let (width, height) = parse_wm_size(&output)
            .ok_or_else(|| RobotError::Protocol(format!("Unexpected wm size output: {}", output.trim())))?;
        let scale = self.scale().await;
        Ok(ScreenSize {
            width: to_logical(width, scale),
            height: to_logical(height, scale),
            scale,
        })
    }

    async fn tap(&self, x: i32, y: i32) -> Result<()> {
        let scale = self.scale().await;
        let (px, py) = (to_pixels(x, scale).to_string(), to_pixels(y, scale).to_string());
        self.shell(&["input", "tap", &px, &py]).await?;
        Ok(())
    }

    async fn double_tap(&self, x: i32, y: i32) -> Result<()> {
        self.tap(x, y).await?;
        self.tap(x, y).await
    }

    async fn long_press(&self, x: i32, y: i32, duration_ms: Option<u64>) -> Result<()> {
        self.input_swipe(x, y, x, y, duration_ms.unwrap_or(DEFAULT_LONG_PRESS_MS))
            .await
    }

    async fn swipe(&self, direction: SwipeDirection) -> Result<()> {
        let size = self.get_screen_size().await?;
        let ((x0, y0), (x1, y1)) = swipe_points(&size, direction);
        self.input_swipe(x0, y0, x1, y1, SWIPE_DURATION_MS).await
    }

    async fn swipe_between_points(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Result<()> {
        self.input_swipe(x0, y0, x1, y1, SWIPE_DURATION_MS).await
    }

    async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<()> {
        let (x1, y1) = swipe_target(x, y, direction, distance.unwrap_or(DEFAULT_SWIPE_DISTANCE));
        self.input_swipe(x, y, x1, y1, SWIPE_DURATION_MS).await
    }

    async fn send_keys(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        // Control characters would end the remote command line.
        if text.is_ascii() && !text.chars().any(|c| c.is_ascii_control()) {
            self.shell(&["input", "text", &escape_input_text(text)]).await?;
            return Ok(());
        }
        self.send_unicode(text).await
    }

    async fn press_button(&self, button: Button) -> Result<()> {
        self.key_event(keycode(button)).await
    }

    async fn get_screenshot(&self) -> Result<Vec<u8>> {
        if let Some(uia2) = self.uia2().await {
            match uia2.get_screenshot().await {
                Ok(png) => return Ok(png),
                Err(e) => self.disable_fast_path(&e).await,
            }
        }
        self.screencap().await
    }

    async fn get_elements_on_screen(&self) -> Result<Vec<ScreenElement>> {
        let scale = self.scale().await;
        if let Some(uia2) = self.uia2().await {
            match uia2.get_elements_on_screen(scale).await {
                Ok(elements) => return Ok(elements),
                Err(e) => self.disable_fast_path(&e).await,
            }
        }
        let xml = self.ui_automator_dump().await?;
        parse_android_hierarchy(&xml, scale)
    }

    async fn list_apps(&self) -> Result<Vec<InstalledApp>> {
        let output = self
            .shell(&[
                "cmd",
                "package",
                "query-activities",
                "-a",
                "android.intent.action.MAIN",
                "-c",
                "android.intent.category.LAUNCHER",
            ])
            .await?;
        Ok(parse_launcher_packages(&output))
    }

    async fn launch_app(&self, package_name: &str) -> Result<()> {
        self.shell(&[
            "monkey",
            "-p",
            package_name,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await?;
        Ok(())
    }

    async fn terminate_app(&self, package_name: &str) -> Result<()> {
        self.shell(&["am", "force-stop", package_name]).await?;
        Ok(())
    }

    async fn install_app(&self, path: &str) -> Result<()> {
        self.adb(&["install", "-r", path])
            .await
            .map_err(|e| install_failure("install app", e))?;
        Ok(())
    }

    async fn uninstall_app(&self, package_name: &str) -> Result<()> {
        self.adb(&["uninstall", package_name])
            .await
            .map_err(|e| install_failure("uninstall app", e))?;
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        let quoted = shell_quote(url);
        self.shell(&["am", "start", "-a", "android.intent.action.VIEW", "-d", &quoted])
            .await?;
        Ok(())
    }

    async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        let rotation = match orientation {
            Orientation::Portrait => "value:i:0",
            Orientation::Landscape => "value:i:1",
        };
        self.shell(&[
            "content",
            "insert",
            "--uri",
            "content://settings/system",
            "--bind",
            "name:s:user_rotation",
            "--bind",
            rotation,
        ])
        .await?;
        self.shell(&["settings", "put", "system", "accelerometer_rotation", "0"])
            .await?;
        Ok(())
    }

    async fn get_orientation(&self) -> Result<Orientation> {
        let rotation = self
            .shell(&["settings", "get", "system", "user_rotation"])
            .await?;
        Ok(match rotation.trim() {
            "0" | "2" => Orientation::Portrait,
            _ => Orientation::Landscape,
        })
    }

    async fn hide_keyboard(&self) -> Result<bool> {
        let state = self.shell(&["dumpsys", "input_method"]).await?;
        if !state.contains("mInputShown=true") {
            return Ok(false);
        }
        self.key_event(keycode(Button::Back)).await?;
        Ok(true)
    }

    async fn clear_text_field(&self) -> Result<()> {
        let elements = self.get_elements_on_screen().await?;
        let focused = elements
            .iter()
            .find(|e| e.focused == Some(true))
            .ok_or_else(|| {
                RobotError::actionable(
                    "No focused text field found",
                    "Tap the text field first, then clear it",
                )
            })?;

        let length = focused.text.as_deref().map(|t| t.chars().count()).unwrap_or(0);
        if length == 0 {
            return Ok(());
        }

        self.key_event("KEYCODE_MOVE_END").await?;
        let mut remaining = length;
        while remaining > 0 {
            let batch = remaining.min(DEL_BATCH);
            let mut args = vec!["input", "keyevent"];
            args.extend(std::iter::repeat("KEYCODE_DEL").take(batch));
            self.shell(&args).await?;
            remaining -= batch;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wm_size() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1440x3120\nOverride size: 1080x2340\n"),
            Some((1080, 2340))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn test_parse_density() {
        assert_eq!(parse_density("Physical density: 420\n"), Some(420.0));
        assert_eq!(parse_density(""), None);
    }

    #[test]
    fn test_trim_xml() {
        let dump = "UI hierchary dumped to: /dev/tty\n<?xml version='1.0'?><hierarchy/>\n";
        assert_eq!(trim_xml(dump), Some("<?xml version='1.0'?><hierarchy/>"));
        assert_eq!(trim_xml("nothing here"), None);
    }

    #[test]
    fn test_escape_input_text() {
        assert_eq!(escape_input_text("hello world"), "hello%sworld");
        assert_eq!(escape_input_text("a&b;c"), r"a\&b\;c");
        assert_eq!(escape_input_text("it's $5"), r"it\'s%s\$5");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("안녕 하세요"), "'안녕 하세요'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_parse_active_display() {
        let output = "Displays:\n\
            Display id 0: DisplayInfo{\"Inner Screen\", displayId 0, uniqueId \"local:4619827259835644672\", app 1812 x 2176, state OFF, type INTERNAL}\n\
            Display id 1: DisplayInfo{\"Outer Screen\", displayId 1, uniqueId \"local:4619827551948147201\", app 904 x 2316, state ON, type INTERNAL}\n";
        assert_eq!(parse_active_display(output).as_deref(), Some("4619827551948147201"));
        assert_eq!(parse_active_display("Displays:\n"), None);
    }

    #[test]
    fn test_parse_active_display_device() {
        let output = "DISPLAY MANAGER (dumpsys display)\n\
            DisplayDeviceInfo{\"Inner Screen\": uniqueId=\"local:100\", 1812 x 2176, modeId 1, state OFF, committedState OFF}\n\
            DisplayDeviceInfo{\"Outer Screen\": uniqueId=\"local:200\", 904 x 2316, modeId 2, state ON, committedState ON}\n";
        assert_eq!(parse_active_display_device(output).as_deref(), Some("200"));
    }

    #[test]
    fn test_launcher_packages_deduplicated() {
        let output = "2 activities found:\n  Activity #0:\n    packageName=com.android.chrome\n  Activity #1:\n    packageName=com.android.chrome\n    packageName=com.google.android.youtube\n";
        let apps = parse_launcher_packages(output);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].package_name, "com.google.android.youtube");
        assert_eq!(apps[1].app_name, "com.google.android.youtube");
    }

    #[test]
    fn test_every_button_has_a_keycode() {
        assert_eq!(keycode(Button::DpadCenter), "KEYCODE_DPAD_CENTER");
        assert_eq!(keycode(Button::Enter), "KEYCODE_ENTER");
    }
}
