//! Image → input tensor.
//!
//! Nearest-neighbour resize to a square, RGB scaled to `0..=1`, batch of one.

use anyhow::Result;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::{tract_ndarray::Array4, Tensor};

/// Memory order of the input tensor expected by the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, S, S]`, the usual ONNX export.
    #[default]
    Nchw,
    /// `[1, S, S, 3]`, TensorFlow-style exports.
    Nhwc,
}

impl TensorLayout {
    pub fn shape(self, size: usize) -> [usize; 4] {
        match self {
            TensorLayout::Nchw => [1, 3, size, size],
            TensorLayout::Nhwc => [1, size, size, 3],
        }
    }
}

impl std::fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorLayout::Nchw => write!(f, "nchw"),
            TensorLayout::Nhwc => write!(f, "nhwc"),
        }
    }
}

/// Build the model input for `image` at `size × size`.
pub fn image_to_tensor(image: &DynamicImage, size: u32, layout: TensorLayout) -> Result<Tensor> {
    anyhow::ensure!(size > 0, "input size must be positive");
    let (width, height) = image.dimensions();
    anyhow::ensure!(
        width > 0 && height > 0,
        "image has no pixels ({}x{})",
        width,
        height
    );

    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, FilterType::Nearest);
    let side = size as usize;

    let tensor: Tensor = match layout {
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
        .into(),
        TensorLayout::Nhwc => Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
        .into(),
    };

    Ok(tensor)
}
