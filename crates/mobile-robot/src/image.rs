use crate::command::{CommandRequest, CommandRunner};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Resizes and re-encodes images.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn transform(
        &self,
        source: &[u8],
        width: u32,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Vec<u8>>;
}

/// ImageMagick `magick` driven over stdin/stdout.
pub struct ImageMagick {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    available: OnceCell<bool>,
}

impl ImageMagick {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            available: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ImageTransformer for ImageMagick {
    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let probe = self
                    .runner
                    .run(CommandRequest::new("magick", ["--version"], self.timeout))
                    .await;
                let found = probe
                    .map(|output| output.stdout_lossy().contains("Version: ImageMagick"))
                    .unwrap_or(false);
                debug!("ImageMagick available: {}", found);
                found
            })
            .await
    }

    async fn transform(
        &self,
        source: &[u8],
        width: u32,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let args = vec![
            "-".to_string(),
            "-resize".to_string(),
            format!("{}x", width),
            "-quality".to_string(),
            quality.to_string(),
            format!("{}:-", format.extension()),
        ];
        let request = CommandRequest::new("magick", args, self.timeout).with_stdin(source.to_vec());
        let output = self.runner.run(request).await?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_strings() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
    }
}
