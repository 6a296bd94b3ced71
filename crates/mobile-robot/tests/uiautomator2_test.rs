mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{FakeAgent, ScriptedRunner, png_header, test_config};
use mobile_robot::{RobotConfig, UiAutomator2Client, UnimportantViews};
use serde_json::json;
use std::sync::Arc;

const SOURCE: &str = "<?xml version='1.0' encoding='UTF-8'?>\
<hierarchy>\
<android.widget.FrameLayout text=\"\" content-desc=\"\" bounds=\"[0,0][1080,2400]\">\
<android.widget.TextView text=\"Inbox\" class=\"android.widget.TextView\" resource-id=\"com.example:id/title\" bounds=\"[60,150][540,270]\"/>\
<android.widget.ImageButton text=\"\" content-desc=\"Compose\" class=\"android.widget.ImageButton\" bounds=\"[900,2100][1050,2250]\"/>\
</android.widget.FrameLayout>\
</hierarchy>";

fn client(agent: &FakeAgent, unimportant_views: UnimportantViews) -> UiAutomator2Client {
    let config = RobotConfig {
        uia2_host_port: agent.port,
        uia2_unimportant_views: unimportant_views,
        ..test_config()
    };
    UiAutomator2Client::new("emulator-5554", &config, Arc::new(ScriptedRunner::new()))
}

#[tokio::test]
async fn test_session_is_reused() {
    let agent = FakeAgent::start().await;
    let client = client(&agent, UnimportantViews::Off);

    assert!(client.is_running().await);
    let first = client.ensure_session().await.unwrap();
    let second = client.ensure_session().await.unwrap();
    client.tap(100, 200).await.unwrap();

    assert_eq!(first, "session-1");
    assert_eq!(first, second);
    assert_eq!(agent.count("POST", "/session"), 1);
    assert_eq!(agent.count("POST", "/session/session-1/actions"), 1);

    client.delete_session().await;
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);
}

#[tokio::test]
async fn test_elements_are_scaled_to_logical_units() {
    let agent = FakeAgent::start().await;
    agent.respond("GET", "/source", json!({"value": SOURCE}));
    let client = client(&agent, UnimportantViews::Off);

    let elements = client.get_elements_on_screen(3.0).await.unwrap();
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].text.as_deref(), Some("Inbox"));
    assert_eq!(
        (elements[0].rect.x, elements[0].rect.y, elements[0].rect.width, elements[0].rect.height),
        (20, 50, 160, 40)
    );
    assert_eq!(elements[1].label.as_deref(), Some("Compose"));
    assert!(agent.calls().iter().all(|c| !c.contains("/appium/settings")));
}

#[tokio::test]
async fn test_per_fetch_unimportant_views_are_restored() {
    let agent = FakeAgent::start().await;
    agent.respond("GET", "/source", json!({"value": SOURCE}));
    let client = client(&agent, UnimportantViews::PerFetch);

    client.get_page_source().await.unwrap();

    let settings: Vec<_> = agent
        .requests()
        .into_iter()
        .filter(|r| r.path.ends_with("/appium/settings"))
        .map(|r| r.body["settings"]["ignoreUnimportantViews"].clone())
        .collect();
    assert_eq!(settings, [json!(true), json!(false)]);
}

#[tokio::test]
async fn test_persistent_unimportant_views_applied_once() {
    let agent = FakeAgent::start().await;
    agent.respond("GET", "/source", json!({"value": SOURCE}));
    let client = client(&agent, UnimportantViews::Persistent);

    client.get_page_source().await.unwrap();
    client.get_page_source().await.unwrap();

    assert_eq!(agent.count("POST", "/session/session-1/appium/settings"), 1);
}

#[tokio::test]
async fn test_screenshot_is_base64_decoded() {
    let agent = FakeAgent::start().await;
    let png = png_header(1080, 2400);
    agent.respond("GET", "/screenshot", json!({"value": STANDARD.encode(&png)}));
    let client = client(&agent, UnimportantViews::Off);

    assert_eq!(client.get_screenshot().await.unwrap(), png);
}

#[tokio::test]
async fn test_missing_element_is_none() {
    let agent = FakeAgent::start().await;
    agent.fail("/element");
    let client = client(&agent, UnimportantViews::Off);

    let found = client.find_element("id", "com.example:id/missing").await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_start_server_is_idempotent() {
    let runner = ScriptedRunner::new().spawning(&["sleep", "30"]).into_arc();
    let client = UiAutomator2Client::new("emulator-5554", &test_config(), runner.clone());

    client.start_server().await.unwrap();
    client.start_server().await.unwrap();
    assert!(client.started_server().await);
    assert_eq!(runner.count("forward tcp:"), 1);
    assert_eq!(runner.count("am instrument"), 1);
    let pid = runner.spawned()[0];
    #[cfg(target_os = "linux")]
    assert!(common::process_alive(pid));

    client.stop_server().await;
    assert!(!client.started_server().await);
    assert_eq!(runner.count("forward --remove tcp:"), 1);
    assert_eq!(runner.count("am force-stop io.appium.uiautomator2.server"), 1);
    #[cfg(target_os = "linux")]
    assert!(!common::process_alive(pid));
    let _ = pid;
}

#[tokio::test]
async fn test_failed_launch_removes_forward() {
    let runner = Arc::new(ScriptedRunner::new());
    let client = UiAutomator2Client::new("emulator-5554", &test_config(), runner.clone());

    assert!(client.start_server().await.is_err());
    assert!(!client.started_server().await);
    assert_eq!(runner.count("forward tcp:"), 1);
    assert_eq!(runner.count("forward --remove tcp:"), 1);
}
