//! HTTP clients for the on-device automation agents.

pub mod actions;
pub mod uiautomator2;
pub mod webdriver_agent;

pub use uiautomator2::UiAutomator2Client;
pub use webdriver_agent::WebDriverAgent;

use crate::http::{self, client};
use crate::{Result, RobotError};
use serde_json::Value;
use tracing::debug;

/// W3C element reference key.
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub(crate) async fn get_json(agent: &str, url: &str) -> Result<Value> {
    debug!("{} GET {}", agent, url);
    let response = client().get(url).send().await?;
    http::json_body(response, agent).await
}

pub(crate) async fn post_json(agent: &str, url: &str, body: &Value) -> Result<Value> {
    debug!("{} POST {}", agent, url);
    let response = client().post(url).json(body).send().await?;
    http::json_body(response, agent).await
}

pub(crate) async fn delete(agent: &str, url: &str) -> Result<Value> {
    debug!("{} DELETE {}", agent, url);
    let response = client().delete(url).send().await?;
    http::json_body(response, agent).await
}

/// GET `/status` with the short probe timeout; any failure means not running.
pub(crate) async fn probe_status(base_url: &str) -> bool {
    let url = format!("{}/status", base_url);
    match client().get(&url).timeout(http::PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("status probe {} failed: {}", url, e);
            false
        }
    }
}

/// Session id from either the W3C (`value.sessionId`) or legacy envelope.
pub(crate) fn session_id(agent: &str, body: &Value) -> Result<String> {
    body.get("sessionId")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/value/sessionId").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| unexpected_response(agent, "session response carries no sessionId"))
}

/// The `value` member of a WebDriver response envelope.
pub(crate) fn envelope_value<'a>(agent: &str, body: &'a Value) -> Result<&'a Value> {
    body.get("value")
        .ok_or_else(|| unexpected_response(agent, format!("no value field in {}", body)))
}

/// Element id from a W3C or JSONWP element reference.
pub(crate) fn element_id(reference: &Value) -> Option<String> {
    reference
        .get(W3C_ELEMENT_KEY)
        .or_else(|| reference.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn unexpected_response(agent: &str, detail: impl AsRef<str>) -> RobotError {
    RobotError::actionable(
        format!("{} returned an unexpected response: {}", agent, detail.as_ref()),
        format!("Make sure a compatible {} build is running and retry", agent),
    )
}
