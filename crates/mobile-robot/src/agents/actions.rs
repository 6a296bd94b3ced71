//! W3C pointer-action payloads shared by both agents.

use serde_json::{json, Value};

pub const TAP_PAUSE_MS: u64 = 100;
pub const SWIPE_HOLD_MS: u64 = 1000;

fn pointer_sequence(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": {"pointerType": "touch"},
            "actions": steps,
        }]
    })
}

fn move_to(x: i32, y: i32, duration_ms: u64) -> Value {
    json!({"type": "pointerMove", "duration": duration_ms, "x": x, "y": y})
}

fn down() -> Value {
    json!({"type": "pointerDown", "button": 0})
}

fn up() -> Value {
    json!({"type": "pointerUp", "button": 0})
}

fn pause(duration_ms: u64) -> Value {
    json!({"type": "pause", "duration": duration_ms})
}

pub fn tap(x: i32, y: i32) -> Value {
    press(x, y, TAP_PAUSE_MS)
}

/// Touch down at (x, y), hold for `hold_ms`, release.
pub fn press(x: i32, y: i32, hold_ms: u64) -> Value {
    pointer_sequence(vec![move_to(x, y, 0), down(), pause(hold_ms), up()])
}

pub fn double_tap(x: i32, y: i32) -> Value {
    pointer_sequence(vec![
        move_to(x, y, 0),
        down(),
        pause(50),
        up(),
        pause(100),
        down(),
        pause(50),
        up(),
    ])
}

/// Jump to the end point, then hold before lifting.
pub fn swipe(x0: i32, y0: i32, x1: i32, y1: i32) -> Value {
    pointer_sequence(vec![
        move_to(x0, y0, 0),
        down(),
        move_to(x1, y1, 0),
        pause(SWIPE_HOLD_MS),
        up(),
    ])
}

/// Move to the end point over `duration_ms`.
pub fn drag(x0: i32, y0: i32, x1: i32, y1: i32, duration_ms: u64) -> Value {
    pointer_sequence(vec![move_to(x0, y0, 0), down(), move_to(x1, y1, duration_ms), up()])
}
