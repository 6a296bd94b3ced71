//! Process-wide HTTP pool shared by the WebDriverAgent and UiAutomator2 clients.

use crate::{Result, RobotError};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

pub fn client() -> &'static Client {
    &CLIENT
}

/// Turns a non-2xx response into an actionable error carrying the body.
pub async fn ensure_success(response: Response, agent: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(RobotError::actionable(
        format!("{} request {} failed with status {}: {}", agent, url, status, body.trim()),
        format!("Check that {} is running and responsive, then retry", agent),
    ))
}

/// Reads a successful response as JSON.
pub async fn json_body(response: Response, agent: &str) -> Result<Value> {
    let response = ensure_success(response, agent).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}
