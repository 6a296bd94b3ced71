//! Conversion between physical pixels and logical units.
//!
//! Android works in physical pixels; callers work in logical units. iOS
//! backends never convert because WebDriverAgent already speaks points.

use crate::robot::ScreenElementRect;

/// Baseline density (mdpi) that maps to a scale of 1.
pub const BASELINE_DENSITY: f64 = 160.0;

pub fn to_pixels(logical: i32, scale: f64) -> i32 {
    (logical as f64 * scale).round() as i32
}

pub fn to_logical(physical: i32, scale: f64) -> i32 {
    (physical as f64 / scale).floor() as i32
}

/// Scale factor for an Android density; anything unusable maps to 1.
pub fn scale_from_density(density: f64) -> f64 {
    if density.is_finite() && density > 0.0 {
        (density / BASELINE_DENSITY).max(1.0)
    } else {
        1.0
    }
}

/// Converts a rectangle given by pixel edges into a logical rectangle.
pub fn logical_rect(left: i32, top: i32, right: i32, bottom: i32, scale: f64) -> ScreenElementRect {
    let x = to_logical(left, scale);
    let y = to_logical(top, scale);
    ScreenElementRect {
        x,
        y,
        width: (to_logical(right, scale) - x).max(0),
        height: (to_logical(bottom, scale) - y).max(0),
    }
}
