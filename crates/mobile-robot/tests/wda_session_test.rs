mod common;

use common::FakeAgent;
use mobile_robot::{Button, RobotError, SwipeDirection, WebDriverAgent};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_session_created_and_deleted_once_on_success() {
    let agent = FakeAgent::start().await;
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    wda.tap(40, 60).await.unwrap();

    assert_eq!(agent.count("POST", "/session"), 1);
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);

    let actions = agent
        .requests()
        .into_iter()
        .find(|r| r.path == "/session/session-1/actions")
        .expect("tap posts an action sequence");
    let first = &actions.body["actions"][0]["actions"][0];
    assert_eq!(first["type"], "pointerMove");
    assert_eq!(first["x"], 40);
    assert_eq!(first["y"], 60);
}

#[tokio::test]
async fn test_session_deleted_when_operation_fails() {
    let agent = FakeAgent::start().await;
    agent.fail("/actions");
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    let err = wda.tap(1, 1).await.unwrap_err();
    assert!(err.is_actionable());
    assert!(err.to_string().contains("induced failure"));

    assert_eq!(agent.count("POST", "/session"), 1);
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);
}

#[tokio::test]
async fn test_with_session_returns_operation_error_after_cleanup() {
    let agent = FakeAgent::start().await;
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    let result: Result<(), RobotError> = wda
        .with_session(|_| async { Err(RobotError::Protocol("boom".to_string())) })
        .await;

    assert!(matches!(result, Err(RobotError::Protocol(ref m)) if m == "boom"));
    assert_eq!(agent.calls(), ["POST /session", "DELETE /session/session-1"]);
}

#[tokio::test]
async fn test_swipe_releases_action_queue() {
    let agent = FakeAgent::start().await;
    agent.respond(
        "GET",
        "/wda/screen",
        json!({"value": {"screenSize": {"width": 1000, "height": 2000}, "scale": 3}}),
    );
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    wda.swipe(SwipeDirection::Left).await.unwrap();

    assert_eq!(
        agent.calls(),
        [
            "POST /session",
            "GET /session/session-1/wda/screen",
            "DELETE /session/session-1",
            "POST /session",
            "POST /session/session-2/actions",
            "DELETE /session/session-2/actions",
            "DELETE /session/session-2",
        ]
    );

    let swipe = agent
        .requests()
        .into_iter()
        .find(|r| r.method == "POST" && r.path == "/session/session-2/actions")
        .unwrap();
    let steps = &swipe.body["actions"][0]["actions"];
    assert_eq!(steps[0]["x"], 800);
    assert_eq!(steps[0]["y"], 1000);
    assert_eq!(steps[2]["x"], 200);
    assert_eq!(steps[2]["y"], 1000);
}

#[tokio::test]
async fn test_screen_size_reports_agent_scale() {
    let agent = FakeAgent::start().await;
    agent.respond(
        "GET",
        "/wda/screen",
        json!({"value": {"screenSize": {"width": 390, "height": 844}, "scale": 3}}),
    );
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    let size = wda.get_screen_size().await.unwrap();
    assert_eq!((size.width, size.height, size.scale), (390, 844, 3.0));
}

#[tokio::test]
async fn test_page_source_is_not_session_scoped() {
    let agent = FakeAgent::start().await;
    agent.respond(
        "GET",
        "/source/",
        json!({"value": {
            "type": "Application",
            "isVisible": "1",
            "rect": {"x": 0, "y": 0, "width": 390, "height": 844},
            "children": [
                {"type": "Button", "label": "Sign in", "isVisible": "1",
                 "rect": {"x": 20, "y": 700, "width": 350, "height": 44}},
                {"type": "Other", "label": "Container", "isVisible": "1",
                 "rect": {"x": 0, "y": 0, "width": 390, "height": 844}},
                {"type": "StaticText", "isVisible": "1",
                 "rect": {"x": 20, "y": 40, "width": 100, "height": 20}}
            ]
        }}),
    );
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    let elements = wda.get_elements_on_screen().await.unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].label.as_deref(), Some("Sign in"));
    assert_eq!(agent.count("POST", "/session"), 0);
}

#[tokio::test]
async fn test_enter_is_sent_as_newline() {
    let agent = FakeAgent::start().await;
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    wda.press_button(Button::Enter).await.unwrap();
    wda.press_button(Button::Home).await.unwrap();

    let requests = agent.requests();
    let keys = requests
        .iter()
        .find(|r| r.path.ends_with("/wda/keys"))
        .unwrap();
    assert_eq!(keys.body, json!({"value": ["\n"]}));
    let button = requests
        .iter()
        .find(|r| r.path.ends_with("/wda/pressButton"))
        .unwrap();
    assert_eq!(button.body, json!({"name": "home"}));
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);
    assert_eq!(agent.count("DELETE", "/session/session-2"), 1);
}

#[tokio::test]
async fn test_dismiss_keyboard_reports_missing_keyboard() {
    let agent = FakeAgent::start().await;
    agent.fail("/wda/keyboard/dismiss");
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    assert!(!wda.dismiss_keyboard().await.unwrap());
    assert_eq!(agent.count("DELETE", "/session/session-1"), 1);
}

#[tokio::test]
async fn test_clear_active_element() {
    let agent = FakeAgent::start().await;
    agent.respond(
        "GET",
        "/element/active",
        json!({"value": {"element-6066-11e4-a52e-4f735466cecf": "field-7"}}),
    );
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    wda.clear_active_element().await.unwrap();
    assert_eq!(agent.count("POST", "/session/session-1/element/field-7/clear"), 1);
}

#[tokio::test]
async fn test_session_deleted_when_cancelled_during_cleanup() {
    let agent = FakeAgent::start().await;
    agent.stall("DELETE", "/session/session-1", Duration::from_secs(2));
    let wda = WebDriverAgent::with_base_url(agent.base_url());

    let abandoned = tokio::time::timeout(Duration::from_millis(300), wda.tap(1, 1)).await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The abandoned delete plus the one issued when the call was dropped.
    assert_eq!(agent.count("DELETE", "/session/session-1"), 2);
}
