//! Channel-layout conversion between canonical RGB rasters and engine arrays.

use crate::types::{CanonicalImage, ChannelLayout, DeviceImage};
use image::RgbImage;
use ndarray::{s, Array3, ArrayView3};
use thiserror::Error;

const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("raster shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("invalid raster length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Reorder a canonical RGB raster into `layout`. Consumes the canonical image.
pub fn to_device_layout(
    image: CanonicalImage,
    layout: ChannelLayout,
) -> Result<DeviceImage, ConvertError> {
    let width = image.pixels.width() as usize;
    let height = image.pixels.height() as usize;
    let raw = image.pixels.into_raw();

    let expected = width * height * CHANNELS;
    if raw.len() != expected {
        return Err(ConvertError::InvalidLength {
            expected,
            actual: raw.len(),
        });
    }

    let rgb = Array3::from_shape_vec((height, width, CHANNELS), raw)?;
    let pixels = match layout {
        ChannelLayout::Rgb => rgb,
        ChannelLayout::Bgr => reverse_channels(rgb.view()),
    };

    Ok(DeviceImage { pixels, layout })
}

impl DeviceImage {
    /// Back to an RGB raster, for encoders that only speak RGB.
    pub fn to_rgb(&self) -> Result<RgbImage, ConvertError> {
        let (height, width, _) = self.pixels.dim();
        let raw: Vec<u8> = match self.layout {
            ChannelLayout::Rgb => self.pixels.iter().copied().collect(),
            ChannelLayout::Bgr => self.pixels.slice(s![.., .., ..;-1]).iter().copied().collect(),
        };
        let actual = raw.len();
        RgbImage::from_raw(width as u32, height as u32, raw).ok_or(ConvertError::InvalidLength {
            expected: width * height * CHANNELS,
            actual,
        })
    }
}

fn reverse_channels(src: ArrayView3<u8>) -> Array3<u8> {
    let mut out = Array3::<u8>::zeros(src.raw_dim());
    out.assign(&src.slice(s![.., .., ..;-1]));
    out
}
