//! Client for the Appium UiAutomator2 server running on an Android device.
//!
//! The server speaks physical pixels. Unlike WebDriverAgent, one session is
//! created lazily and reused for the lifetime of the client.

use super::{actions, delete, element_id, envelope_value, get_json, post_json, probe_status, session_id, unexpected_response};
use crate::command::{CommandRequest, CommandRunner};
use crate::config::{RobotConfig, UnimportantViews};
use crate::elements::parse_android_hierarchy;
use crate::robot::{Orientation, ScreenElement, ScreenElementRect, ScreenSize};
use crate::{Result, RobotError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const AGENT: &str = "UiAutomator2";

pub const SERVER_PACKAGE: &str = "io.appium.uiautomator2.server";
pub const SERVER_TEST_PACKAGE: &str = "io.appium.uiautomator2.server.test";
pub const DEFAULT_LONG_PRESS_MS: u64 = 1000;
pub const DEFAULT_SWIPE_MS: u64 = 1000;

pub struct UiAutomator2Client {
    device_id: String,
    adb_path: String,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    host_port: u16,
    device_port: u16,
    base_url: String,
    unimportant_views: UnimportantViews,
    unimportant_views_applied: AtomicBool,
    session: Mutex<Option<String>>,
    server: Mutex<Option<Child>>,
}

impl UiAutomator2Client {
    pub fn new(device_id: &str, config: &RobotConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            device_id: device_id.to_string(),
            adb_path: config.adb_path.to_string_lossy().into_owned(),
            runner,
            command_timeout: config.command_timeout,
            host_port: config.uia2_host_port,
            device_port: config.uia2_device_port,
            base_url: format!("http://127.0.0.1:{}", config.uia2_host_port),
            unimportant_views: config.uia2_unimportant_views,
            unimportant_views_applied: AtomicBool::new(false),
            session: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn adb(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["-s".to_string(), self.device_id.clone()];
        full.extend(args.iter().map(|a| a.to_string()));
        let output = self
            .runner
            .run(CommandRequest::new(self.adb_path.clone(), full, self.command_timeout))
            .await?;
        Ok(output.stdout_lossy())
    }

    /// Checks the package list for the server APK.
    pub async fn is_server_installed(&self) -> Result<bool> {
        let output = self.adb(&["shell", "pm", "list", "packages", SERVER_PACKAGE]).await?;
        Ok(output.lines().any(|line| line.trim() == format!("package:{}", SERVER_PACKAGE)))
    }

    /// Forwards the port and launches the instrumentation. No-op when this
    /// client already started it.
    pub async fn start_server(&self) -> Result<()> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Ok(());
        }

        let host = format!("tcp:{}", self.host_port);
        let device = format!("tcp:{}", self.device_port);
        self.adb(&["forward", &host, &device]).await.map_err(|e| {
            RobotError::actionable(
                format!("Failed to forward port {} to the device: {}", self.host_port, e),
                "Check that the device is connected and the port is free",
            )
        })?;

        let runner_class = format!("{}/androidx.test.runner.AndroidJUnitRunner", SERVER_TEST_PACKAGE);
        let args: Vec<String> = [
            "-s",
            self.device_id.as_str(),
            "shell",
            "am",
            "instrument",
            "-w",
            runner_class.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let child = match self.runner.spawn_detached(&self.adb_path, &args) {
            Ok(child) => child,
            Err(e) => {
                self.remove_forward().await;
                return Err(e);
            }
        };
        info!("Started UiAutomator2 server on {}", self.device_id);
        *server = Some(child);
        Ok(())
    }

    /// Whether this client launched the instrumentation it is tracking.
    pub async fn started_server(&self) -> bool {
        self.server.lock().await.is_some()
    }

    async fn remove_forward(&self) {
        let host = format!("tcp:{}", self.host_port);
        if let Err(e) = self.adb(&["forward", "--remove", &host]).await {
            debug!("forward removal failed: {}", e);
        }
    }

    /// Best-effort teardown of the server, forward and session.
    pub async fn stop_server(&self) {
        if let Some(mut child) = self.server.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("instrumentation already gone: {}", e);
            }
        }
        *self.session.lock().await = None;

        self.remove_forward().await;
        if let Err(e) = self.adb(&["shell", "am", "force-stop", SERVER_PACKAGE]).await {
            debug!("force-stop failed: {}", e);
        }
    }

    pub async fn is_running(&self) -> bool {
        probe_status(&self.base_url).await
    }

    /// Polls once per second; false on timeout.
    pub async fn wait_for_server(&self, timeout_secs: u64) -> bool {
        for attempt in 0..timeout_secs.max(1) {
            if self.is_running().await {
                return true;
            }
            if attempt + 1 < timeout_secs {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        false
    }

    /// Returns the cached session id, creating one on first use.
    pub async fn ensure_session(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(id) = session.as_ref() {
            return Ok(id.clone());
        }
        let body = json!({"capabilities": {"alwaysMatch": {"platformName": "Android"}}});
        let response = post_json(AGENT, &format!("{}/session", self.base_url), &body).await?;
        let id = session_id(AGENT, &response)?;
        debug!("{} session {} created", AGENT, id);
        *session = Some(id.clone());
        Ok(id)
    }

    pub async fn delete_session(&self) {
        let Some(id) = self.session.lock().await.take() else {
            return;
        };
        if let Err(e) = delete(AGENT, &format!("{}/session/{}", self.base_url, id)).await {
            debug!("session delete failed: {}", e);
        }
    }

    async fn session_url(&self) -> Result<String> {
        let id = self.ensure_session().await?;
        Ok(format!("{}/session/{}", self.base_url, id))
    }

    async fn session_get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.session_url().await?, path);
        let body = get_json(AGENT, &url).await?;
        Ok(envelope_value(AGENT, &body)?.clone())
    }

    async fn session_post(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{}", self.session_url().await?, path);
        post_json(AGENT, &url, payload).await
    }

    async fn set_ignore_unimportant_views(&self, enabled: bool) -> Result<()> {
        let payload = json!({"settings": {"ignoreUnimportantViews": enabled}});
        self.session_post("/appium/settings", &payload).await?;
        Ok(())
    }

    /// Raw XML page source.
    pub async fn get_page_source(&self) -> Result<String> {
        match self.unimportant_views {
            UnimportantViews::Off => self.fetch_source().await,
            UnimportantViews::Persistent => {
                if !self.unimportant_views_applied.load(Ordering::Acquire) {
                    self.set_ignore_unimportant_views(true).await?;
                    self.unimportant_views_applied.store(true, Ordering::Release);
                }
                self.fetch_source().await
            }
            UnimportantViews::PerFetch => {
                self.set_ignore_unimportant_views(true).await?;
                let source = self.fetch_source().await;
                if let Err(e) = self.set_ignore_unimportant_views(false).await {
                    warn!("Failed to restore ignoreUnimportantViews: {}", e);
                }
                source
            }
        }
    }

    async fn fetch_source(&self) -> Result<String> {
        match self.session_get("/source").await? {
            Value::String(xml) => Ok(xml),
            _ => Err(unexpected_response(AGENT, "page source is not a string")),
        }
    }

    /// Elements with rectangles converted to logical units by `scale`.
    pub async fn get_elements_on_screen(&self, scale: f64) -> Result<Vec<ScreenElement>> {
        let xml = self.get_page_source().await?;
        parse_android_hierarchy(&xml, scale)
    }

    /// Window size in physical pixels.
    pub async fn get_screen_size(&self) -> Result<ScreenSize> {
        let value = self.session_get("/window/current/size").await?;
        let dimension = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| unexpected_response(AGENT, format!("window size without {}", key)))
        };
        Ok(ScreenSize {
            width: dimension("width")? as i32,
            height: dimension("height")? as i32,
            scale: 1.0,
        })
    }

    /// PNG bytes decoded from the base64 payload.
    pub async fn get_screenshot(&self) -> Result<Vec<u8>> {
        let value = self.session_get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| unexpected_response(AGENT, "screenshot is not a string"))?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| unexpected_response(AGENT, format!("screenshot is not base64: {}", e)))
    }

    async fn perform(&self, payload: Value) -> Result<()> {
        self.session_post("/actions", &payload).await?;
        Ok(())
    }

    pub async fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.perform(actions::tap(x, y)).await
    }

    pub async fn double_tap(&self, x: i32, y: i32) -> Result<()> {
        self.perform(actions::double_tap(x, y)).await
    }

    pub async fn long_press(&self, x: i32, y: i32, duration_ms: Option<u64>) -> Result<()> {
        self.perform(actions::press(x, y, duration_ms.unwrap_or(DEFAULT_LONG_PRESS_MS)))
            .await
    }

    pub async fn swipe(&self, x0: i32, y0: i32, x1: i32, y1: i32, duration_ms: Option<u64>) -> Result<()> {
        self.perform(actions::drag(x0, y0, x1, y1, duration_ms.unwrap_or(DEFAULT_SWIPE_MS)))
            .await
    }

    pub async fn send_keys(&self, text: &str) -> Result<()> {
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.session_post("/keys", &json!({"value": chars})).await?;
        Ok(())
    }

    pub async fn press_keycode(&self, keycode: u32) -> Result<()> {
        self.session_post("/appium/device/press_keycode", &json!({"keycode": keycode}))
            .await?;
        Ok(())
    }

    pub async fn back(&self) -> Result<()> {
        self.session_post("/back", &json!({})).await?;
        Ok(())
    }

    pub async fn get_orientation(&self) -> Result<Orientation> {
        let value = self.session_get("/orientation").await?;
        Ok(Orientation::from_wire(value.as_str().unwrap_or("PORTRAIT")))
    }

    pub async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        self.session_post("/orientation", &json!({"orientation": orientation.as_wire()}))
            .await?;
        Ok(())
    }

    /// First element matching `selector`, or `None` when nothing matches.
    pub async fn find_element(&self, strategy: &str, selector: &str) -> Result<Option<String>> {
        let url = format!("{}/element", self.session_url().await?);
        let payload = json!({"using": strategy, "value": selector});
        let response = crate::http::client().post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: Value = response.json().await?;
        Ok(body.get("value").and_then(element_id))
    }

    pub async fn find_elements(&self, strategy: &str, selector: &str) -> Result<Vec<String>> {
        let payload = json!({"using": strategy, "value": selector});
        let body = self.session_post("/elements", &payload).await?;
        Ok(body
            .get("value")
            .and_then(Value::as_array)
            .map(|refs| refs.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    pub async fn click_element(&self, element: &str) -> Result<()> {
        self.session_post(&format!("/element/{}/click", element), &json!({}))
            .await?;
        Ok(())
    }

    pub async fn get_element_text(&self, element: &str) -> Result<String> {
        let value = self.session_get(&format!("/element/{}/text", element)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Element rectangle in physical pixels.
    pub async fn get_element_rect(&self, element: &str) -> Result<ScreenElementRect> {
        let value = self.session_get(&format!("/element/{}/rect", element)).await?;
        let field = |key: &str| value.get(key).and_then(Value::as_f64).unwrap_or(0.0) as i32;
        Ok(ScreenElementRect {
            x: field("x"),
            y: field("y"),
            width: field("width"),
            height: field("height"),
        })
    }
}
