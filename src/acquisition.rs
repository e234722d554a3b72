//! Image acquisition from the camera or the gallery.
//!
//! Both sources end up as an [`AcquiredImage`]: decoded pixels plus a small PNG
//! preview the webview can show directly. Nothing is written to disk.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GenericImageView, ImageEncoder};
use log::debug;

use crate::types::ImageSource;

/// Longest side of the preview sent to the frontend.
pub const PREVIEW_MAX_SIDE: u32 = 512;

/// A decoded still image held by the session.
#[derive(Debug, Clone)]
pub struct AcquiredImage {
    image: Arc<DynamicImage>,
    source: ImageSource,
    preview: String,
}

impl AcquiredImage {
    pub fn new(image: DynamicImage, source: ImageSource) -> Result<Self> {
        let (width, height) = image.dimensions();
        anyhow::ensure!(width > 0 && height > 0, "image has no pixels");
        let preview = encode_preview(&image, PREVIEW_MAX_SIDE)?;
        debug!("acquired {}x{} image from {}", width, height, source);
        Ok(Self {
            image: Arc::new(image),
            source,
            preview,
        })
    }

    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn preview_data_url(&self) -> &str {
        &self.preview
    }
}

/// Decode an image file picked from local storage.
pub fn acquire_from_path(path: &Path, source: ImageSource) -> Result<AcquiredImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?;
    AcquiredImage::new(image, source)
}

/// Decode an encoded image (JPEG, PNG, ...) held in memory.
pub fn acquire_from_bytes(bytes: &[u8], source: ImageSource) -> Result<AcquiredImage> {
    let image = image::load_from_memory(bytes).context("failed to decode image data")?;
    AcquiredImage::new(image, source)
}

/// Decode a `data:image/...;base64,` URL as produced by a webview file reader.
pub fn acquire_from_data_url(data_url: &str, source: ImageSource) -> Result<AcquiredImage> {
    let bytes = decode_data_url(data_url)?;
    acquire_from_bytes(&bytes, source)
}

fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("not a data URL"))?;
    anyhow::ensure!(header.starts_with("data:"), "not a data URL");
    anyhow::ensure!(
        header.ends_with(";base64"),
        "data URL is not base64 encoded"
    );

    general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 payload in data URL")
}

/// PNG preview scaled down to `max_side`, as a data URL.
pub fn encode_preview(image: &DynamicImage, max_side: u32) -> Result<String> {
    let (width, height) = image.dimensions();
    let preview = if width > max_side || height > max_side {
        image.thumbnail(max_side, max_side)
    } else {
        image.clone()
    };
    let rgba = preview.to_rgba8();

    let mut png_data = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_data);
    encoder
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            image::ExtendedColorType::Rgba8,
        )
        .context("failed to encode preview PNG")?;

    let base64_data = general_purpose::STANDARD.encode(&png_data);
    Ok(format!("data:image/png;base64,{}", base64_data))
}
