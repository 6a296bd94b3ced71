//! WebDriverAgent client used by physical iOS devices and Simulators.
//!
//! Every session-scoped call runs inside [`WebDriverAgent::with_session`],
//! which creates a fresh session and always deletes it afterwards.

use super::{actions, delete, envelope_value, get_json, post_json, probe_status, session_id, unexpected_response};
use crate::elements::parse_ios_source;
use crate::http::client;
use crate::robot::{swipe_points, swipe_target, Button, Orientation, ScreenElement, ScreenSize, SwipeDirection};
use crate::{Result, RobotError};
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, warn};

const AGENT: &str = "WebDriverAgent";

pub const DEFAULT_LONG_PRESS_MS: u64 = 500;
pub const DEFAULT_SWIPE_DISTANCE: i32 = 400;

/// Deletes the session in the background if the owning future is dropped
/// before it could clean up.
struct SessionGuard {
    url: Option<String>,
}

impl SessionGuard {
    fn new(url: String) -> Self {
        Self { url: Some(url) }
    }

    fn disarm(&mut self) {
        self.url = None;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(url) = self.url.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client().delete(&url).send().await {
                    warn!("Failed to delete abandoned session {}: {}", url, e);
                }
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebDriverAgent {
    base_url: String,
}

impl WebDriverAgent {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_base_url(format!("http://{}:{}", host, port))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Readiness probe; never fails.
    pub async fn is_running(&self) -> bool {
        probe_status(&self.base_url).await
    }

    async fn create_session(&self) -> Result<String> {
        let body = json!({"capabilities": {"alwaysMatch": {"platformName": "iOS"}}});
        let response = post_json(AGENT, &format!("{}/session", self.base_url), &body).await?;
        session_id(AGENT, &response)
    }

    /// Runs `operation` with a session URL, deleting the session on every
    /// exit path.
    pub async fn with_session<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let id = self.create_session().await?;
        let session_url = format!("{}/session/{}", self.base_url, id);
        debug!("{} session {} created", AGENT, id);

        let mut guard = SessionGuard::new(session_url.clone());
        let result = operation(session_url.clone()).await;

        if let Err(e) = delete(AGENT, &session_url).await {
            warn!("Failed to delete {} session {}: {}", AGENT, id, e);
        }
        guard.disarm();
        result
    }

    pub async fn get_screen_size(&self) -> Result<ScreenSize> {
        self.with_session(|session| async move {
            let body = get_json(AGENT, &format!("{}/wda/screen", session)).await?;
            let value = envelope_value(AGENT, &body)?;
            let dimension = |key: &str| {
                value
                    .pointer(&format!("/screenSize/{}", key))
                    .and_then(Value::as_f64)
                    .ok_or_else(|| unexpected_response(AGENT, format!("screen size without {}", key)))
            };
            let scale = value.get("scale").and_then(Value::as_f64).unwrap_or(1.0);
            Ok(ScreenSize {
                width: dimension("width")? as i32,
                height: dimension("height")? as i32,
                scale: scale.max(1.0),
            })
        })
        .await
    }

    async fn perform(&self, payload: Value) -> Result<()> {
        self.with_session(|session| async move {
            post_json(AGENT, &format!("{}/actions", session), &payload).await?;
            Ok(())
        })
        .await
    }

    /// Performs a swipe and then releases the action queue.
    async fn perform_swipe(&self, payload: Value) -> Result<()> {
        self.with_session(|session| async move {
            let url = format!("{}/actions", session);
            post_json(AGENT, &url, &payload).await?;
            delete(AGENT, &url).await?;
            Ok(())
        })
        .await
    }

    pub async fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.perform(actions::tap(x, y)).await
    }

    pub async fn double_tap(&self, x: i32, y: i32) -> Result<()> {
        self.perform(actions::double_tap(x, y)).await
    }

    pub async fn long_press(&self, x: i32, y: i32, duration_ms: Option<u64>) -> Result<()> {
        let hold = duration_ms.unwrap_or(DEFAULT_LONG_PRESS_MS);
        self.perform(actions::press(x, y, hold)).await
    }

    pub async fn swipe(&self, direction: SwipeDirection) -> Result<()> {
        let size = self.get_screen_size().await?;
        let ((x0, y0), (x1, y1)) = swipe_points(&size, direction);
        self.perform_swipe(actions::swipe(x0, y0, x1, y1)).await
    }

    pub async fn swipe_between_points(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Result<()> {
        self.perform_swipe(actions::swipe(x0, y0, x1, y1)).await
    }

    pub async fn swipe_from_coordinate(
        &self,
        x: i32,
        y: i32,
        direction: SwipeDirection,
        distance: Option<i32>,
    ) -> Result<()> {
        let (x1, y1) = swipe_target(x, y, direction, distance.unwrap_or(DEFAULT_SWIPE_DISTANCE));
        self.perform_swipe(actions::swipe(x, y, x1, y1)).await
    }

    pub async fn send_keys(&self, text: &str) -> Result<()> {
        let body = json!({"value": [text]});
        self.with_session(|session| async move {
            post_json(AGENT, &format!("{}/wda/keys", session), &body).await?;
            Ok(())
        })
        .await
    }

    pub async fn press_button(&self, button: Button) -> Result<()> {
        let name = match button {
            Button::Enter => return self.send_keys("\n").await,
            Button::Home => "home",
            Button::VolumeUp => "volumeup",
            Button::VolumeDown => "volumedown",
            other => return Err(RobotError::unsupported(format!("Button \"{}\"", other))),
        };
        self.with_session(|session| async move {
            post_json(AGENT, &format!("{}/wda/pressButton", session), &json!({"name": name})).await?;
            Ok(())
        })
        .await
    }

    /// Accessibility tree root (`value` of `/source`). Not session scoped.
    pub async fn get_page_source(&self) -> Result<Value> {
        let mut body = get_json(AGENT, &format!("{}/source/?format=json", self.base_url)).await?;
        match body.get_mut("value").map(Value::take) {
            Some(value) if value.is_object() => Ok(value),
            _ => Err(unexpected_response(AGENT, "page source is not a JSON tree")),
        }
    }

    pub async fn get_elements_on_screen(&self) -> Result<Vec<ScreenElement>> {
        let source = self.get_page_source().await?;
        Ok(parse_ios_source(&source))
    }

    pub async fn open_url(&self, url: &str) -> Result<()> {
        let body = json!({"url": url});
        self.with_session(|session| async move {
            post_json(AGENT, &format!("{}/url", session), &body).await?;
            Ok(())
        })
        .await
    }

    pub async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        let body = json!({"orientation": orientation.as_wire()});
        self.with_session(|session| async move {
            post_json(AGENT, &format!("{}/orientation", session), &body).await?;
            Ok(())
        })
        .await
    }

    pub async fn get_orientation(&self) -> Result<Orientation> {
        self.with_session(|session| async move {
            let body = get_json(AGENT, &format!("{}/orientation", session)).await?;
            envelope_value(AGENT, &body)?
                .as_str()
                .map(Orientation::from_wire)
                .ok_or_else(|| unexpected_response(AGENT, "orientation is not a string"))
        })
        .await
    }

    /// Returns false when the agent reports there is no keyboard to dismiss.
    pub async fn dismiss_keyboard(&self) -> Result<bool> {
        self.with_session(|session| async move {
            let url = format!("{}/wda/keyboard/dismiss", session);
            let response = client().post(&url).json(&json!({})).send().await?;
            if response.status().is_success() {
                Ok(true)
            } else {
                debug!("keyboard dismiss answered {}", response.status());
                Ok(false)
            }
        })
        .await
    }

    /// Clears the element that currently has keyboard focus.
    pub async fn clear_active_element(&self) -> Result<()> {
        self.with_session(|session| async move {
            let response = client().get(format!("{}/element/active", session)).send().await?;
            if !response.status().is_success() {
                return Err(RobotError::actionable(
                    "No text field is focused",
                    "Tap the text field first, then clear it",
                ));
            }
            let body: Value = response.json().await?;
            let id = envelope_value(AGENT, &body)
                .ok()
                .and_then(super::element_id)
                .ok_or_else(|| unexpected_response(AGENT, "active element has no id"))?;
            post_json(AGENT, &format!("{}/element/{}/clear", session, id), &json!({})).await?;
            Ok(())
        })
        .await
    }
}
