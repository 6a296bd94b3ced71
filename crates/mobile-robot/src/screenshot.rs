//! Validation and size reduction of captured screenshots.

use crate::image::{ImageFormat, ImageTransformer};
use crate::png::Png;
use crate::{Result, RobotError};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

pub struct ScreenshotOptimizer {
    transformer: Option<Arc<dyn ImageTransformer>>,
    max_width: Option<u32>,
    quality: u8,
}

impl ScreenshotOptimizer {
    pub fn new(transformer: Option<Arc<dyn ImageTransformer>>, max_width: Option<u32>, quality: u8) -> Self {
        Self {
            transformer,
            max_width,
            quality: quality.clamp(1, 100),
        }
    }

    /// Validates `png` and, when worthwhile, shrinks it to logical width as JPEG.
    ///
    /// A failed transform returns the original PNG.
    pub async fn process(&self, png: Vec<u8>, scale: f64) -> Result<Screenshot> {
        let (width, height) = Png::new(&png)
            .dimensions()
            .map_err(|_| RobotError::invalid_screenshot())?;
        if width == 0 || height == 0 {
            return Err(RobotError::invalid_screenshot());
        }

        let Some(transformer) = &self.transformer else {
            return Ok(original(png));
        };
        if scale <= 1.0 && self.max_width.is_none() {
            return Ok(original(png));
        }
        if !transformer.is_available().await {
            return Ok(original(png));
        }

        let target = target_width(width, scale, self.max_width);
        debug!("Resizing screenshot from {}px to {}px", width, target);
        match transformer
            .transform(&png, target, ImageFormat::Jpeg, self.quality)
            .await
        {
            Ok(data) if !data.is_empty() => Ok(Screenshot {
                data,
                mime_type: ImageFormat::Jpeg.mime_type(),
            }),
            Ok(_) => {
                warn!("Image transformer returned no data, keeping PNG");
                Ok(original(png))
            }
            Err(e) => {
                warn!("Screenshot optimization failed, keeping PNG: {}", e);
                Ok(original(png))
            }
        }
    }
}

fn original(png: Vec<u8>) -> Screenshot {
    Screenshot {
        data: png,
        mime_type: ImageFormat::Png.mime_type(),
    }
}

/// Logical width for a physical width, capped at `max_width`.
pub fn target_width(physical_width: u32, scale: f64, max_width: Option<u32>) -> u32 {
    let scale = if scale.is_finite() && scale >= 1.0 { scale } else { 1.0 };
    let logical = (physical_width as f64 / scale).floor() as u32;
    let capped = match max_width {
        Some(max) => logical.min(max),
        None => logical,
    };
    capped.max(1)
}
