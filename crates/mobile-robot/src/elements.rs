//! Flattening of native UI hierarchies into `ScreenElement` lists.

use crate::coords::logical_rect;
use crate::robot::{ScreenElement, ScreenElementRect};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};
use serde_json::Value;

static BOUNDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+),(\d+)\]\[(\d+),(\d+)\]$").expect("bounds pattern compiles"));

/// iOS element types worth reporting.
pub const IOS_ELEMENT_TYPES: [&str; 7] = [
    "TextField",
    "Button",
    "Switch",
    "Icon",
    "SearchField",
    "StaticText",
    "Image",
];

/// Depth-first walk in document order. Nodes passing `accept` are handed to
/// `convert`; only useful elements are kept.
pub fn collect_elements<N, C, I, A, F>(root: N, children: C, accept: A, convert: F) -> Vec<ScreenElement>
where
    N: Copy,
    C: Fn(N) -> I,
    I: IntoIterator<Item = N>,
    A: Fn(N) -> bool,
    F: Fn(N) -> Option<ScreenElement>,
{
    let mut output = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if accept(node) {
            if let Some(element) = convert(node).filter(ScreenElement::is_useful) {
                output.push(element);
            }
        }
        let mut kids: Vec<N> = children(node).into_iter().collect();
        kids.reverse();
        stack.extend(kids);
    }

    output
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

/// Pixel rectangle from an Android `bounds="[l,t][r,b]"` attribute.
pub fn parse_bounds(bounds: &str) -> Option<(i32, i32, i32, i32)> {
    let caps = BOUNDS.captures(bounds)?;
    let edge = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i32>().ok());
    Some((edge(1)?, edge(2)?, edge(3)?, edge(4)?))
}

fn android_accept(node: Node<'_, '_>) -> bool {
    ["text", "content-desc", "hint"]
        .iter()
        .any(|attr| node.attribute(*attr).is_some_and(|v| !v.is_empty()))
}

fn android_convert(node: Node<'_, '_>, scale: f64) -> Option<ScreenElement> {
    let (left, top, right, bottom) = parse_bounds(node.attribute("bounds").unwrap_or_default())?;
    let rect = logical_rect(left, top, right, bottom, scale);

    let mut element = ScreenElement::new(node.attribute("class").unwrap_or("text"), rect);
    element.text = non_empty(node.attribute("text"));
    element.label = non_empty(node.attribute("content-desc")).or_else(|| non_empty(node.attribute("hint")));
    element.identifier = non_empty(node.attribute("resource-id"));
    if node.attribute("focused") == Some("true") {
        element.focused = Some(true);
    }
    Some(element)
}

/// Parses a UI Automator hierarchy dump, reporting rectangles in logical units.
///
/// Used for both the `uiautomator dump` output and UiAutomator2 page source.
pub fn parse_android_hierarchy(xml: &str, scale: f64) -> Result<Vec<ScreenElement>> {
    let document = Document::parse(xml)?;
    Ok(collect_elements(
        document.root_element(),
        |node| node.children().filter(Node::is_element),
        android_accept,
        |node| android_convert(node, scale),
    ))
}

fn json_string(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_int(rect: &Value, key: &str) -> i32 {
    rect.get(key).and_then(Value::as_f64).unwrap_or(0.0) as i32
}

fn is_visible_flag(node: &Value) -> bool {
    match node.get("isVisible") {
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn ios_rect(node: &Value) -> ScreenElementRect {
    let rect = node.get("rect").unwrap_or(&Value::Null);
    ScreenElementRect {
        x: json_int(rect, "x"),
        y: json_int(rect, "y"),
        width: json_int(rect, "width"),
        height: json_int(rect, "height"),
    }
}

fn ios_accept(node: &Value) -> bool {
    let known = node
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| IOS_ELEMENT_TYPES.contains(&t));
    let rect = ios_rect(node);
    known && is_visible_flag(node) && rect.x >= 0 && rect.y >= 0
}

fn ios_convert(node: &Value) -> Option<ScreenElement> {
    let label = json_string(node, "label");
    let name = json_string(node, "name");
    let identifier = json_string(node, "rawIdentifier");
    if label.is_none() && name.is_none() && identifier.is_none() {
        return None;
    }

    let mut element = ScreenElement::new(node.get("type").and_then(Value::as_str)?, ios_rect(node));
    element.label = label;
    element.name = name;
    element.value = json_string(node, "value");
    element.identifier = identifier;
    Some(element)
}

/// Filters a WebDriverAgent JSON source tree (the `value` object).
pub fn parse_ios_source(root: &Value) -> Vec<ScreenElement> {
    collect_elements(root, json_children, ios_accept, ios_convert)
}

fn json_children(node: &Value) -> Vec<&Value> {
    node.get("children")
        .and_then(Value::as_array)
        .map(|kids| kids.iter().collect())
        .unwrap_or_default()
}
