use crate::error::{BotError, Result};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    Rgb,
    Rgba,
}

/// Fetches raw image bytes for a user-supplied URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Clone, Default)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching source image {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BotError::SourceFetchFailed(format!("{}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| BotError::SourceFetchFailed(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BotError::SourceFetchFailed(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Fetches and decodes reference and mask images.
#[derive(Clone)]
pub struct ImageResolver {
    source: Arc<dyn ImageSource>,
}

impl ImageResolver {
    pub fn new(source: impl ImageSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub async fn resolve(&self, url: &str, format: ColorFormat) -> Result<DynamicImage> {
        let bytes = self.source.fetch(url).await?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| BotError::SourceFetchFailed(format!("{}: {}", url, e)))?;

        Ok(match format {
            ColorFormat::Rgb => DynamicImage::ImageRgb8(image.to_rgb8()),
            ColorFormat::Rgba => DynamicImage::ImageRgba8(image.to_rgba8()),
        })
    }
}
