//! Image source fetching and decoding.

use std::collections::HashMap;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the raw encoded bytes behind an element's `src` reference.
    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>>;
}

/// Decode encoded image bytes into straight-alpha RGBA8.
pub fn decode_rgba(bytes: &[u8]) -> FeedforgeResult<image::RgbaImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    Ok(dyn_img.to_rgba8())
}

/// HTTP fetcher used in production.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch image '{url}'"))?;
        if !response.status().is_success() {
            return Err(FeedforgeError::storage(format!(
                "image fetch returned {} for '{url}'",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read image body for '{url}'"))?;
        Ok(bytes.to_vec())
    }
}

/// In-memory fetcher for tests and offline rendering.
#[derive(Default)]
pub struct MemoryImageFetcher {
    sources: HashMap<String, Vec<u8>>,
}

impl MemoryImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.sources.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageFetcher {
    async fn fetch(&self, url: &str) -> FeedforgeResult<Vec<u8>> {
        self.sources
            .get(url)
            .cloned()
            .ok_or_else(|| FeedforgeError::storage(format!("unknown image source '{url}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_fixture(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn memory_fetcher_serves_and_misses() {
        let fetcher =
            MemoryImageFetcher::new().with_source("https://cdn/x.png", png_fixture(2, 2, [1, 2, 3, 255]));
        assert!(fetcher.fetch("https://cdn/x.png").await.is_ok());
        assert!(fetcher.fetch("https://cdn/missing.png").await.is_err());
    }

    #[test]
    fn decode_rejects_garbage_and_accepts_png() {
        assert!(decode_rgba(b"not an image").is_err());
        let decoded = decode_rgba(&png_fixture(3, 2, [9, 8, 7, 255])).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }
}
