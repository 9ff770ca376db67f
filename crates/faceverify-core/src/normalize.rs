//! Upload validation and canonicalization.
//!
//! Turns an untrusted byte buffer into a [`CanonicalImage`]: size-checked before
//! decoding, decoded under dimension limits, EXIF-oriented, flattened onto white
//! and downsampled to fit the configured maximum dimension.

use crate::config::PipelineConfig;
use crate::types::{CanonicalImage, RawUpload};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("upload size {size_mb:.2} MB exceeds limit of {limit_mb} MB")]
    Oversized { size_mb: f64, limit_mb: f64 },
    #[error("{0}")]
    Corrupt(String),
}

/// Stateless normalizer shared by both inputs of a verification.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_size_mb: f64,
    max_dimension: u32,
}

impl Normalizer {
    pub fn new(max_size_mb: f64, max_dimension: u32) -> Self {
        Self {
            max_size_mb,
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_size_mb, config.max_dimension)
    }

    /// Largest byte count that passes the size ceiling.
    pub fn byte_limit(&self) -> u64 {
        (self.max_size_mb * BYTES_PER_MB).floor() as u64
    }

    pub fn normalize(&self, upload: &RawUpload) -> Result<CanonicalImage, NormalizeError> {
        // The buffer itself counts too; a host may under-report.
        let size = upload.declared_size.max(upload.bytes.len() as u64);
        let size_mb = size as f64 / BYTES_PER_MB;
        if size_mb > self.max_size_mb {
            return Err(NormalizeError::Oversized {
                size_mb,
                limit_mb: self.max_size_mb,
            });
        }

        let decoded = decode(upload)?;
        let (source_width, source_height) = decoded.dimensions();

        let orientation = read_exif_orientation(&upload.bytes);
        let oriented = apply_orientation(decoded, orientation);

        let flattened_alpha = oriented.color().has_alpha();
        let rgb = if flattened_alpha {
            flatten_onto_white(&oriented.to_rgba8())
        } else {
            oriented.to_rgb8()
        };

        let (width, height) = fit_within(rgb.width(), rgb.height(), self.max_dimension);
        let pixels = if (width, height) == rgb.dimensions() {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
        };

        tracing::debug!(
            file = %upload.filename,
            source_width,
            source_height,
            width,
            height,
            orientation,
            flattened_alpha,
            "upload normalized"
        );

        Ok(CanonicalImage {
            pixels,
            source_width,
            source_height,
            orientation,
            flattened_alpha,
        })
    }
}

/// Decode with content sniffing, falling back to the filename extension.
fn decode(upload: &RawUpload) -> Result<DynamicImage, NormalizeError> {
    if upload.bytes.is_empty() {
        return Err(NormalizeError::Corrupt("empty upload".into()));
    }

    let mut reader = ImageReader::new(Cursor::new(upload.bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| NormalizeError::Corrupt(format!("failed to read upload: {e}")))?;

    if reader.format().is_none() {
        match ImageFormat::from_path(&upload.filename) {
            Ok(format) => reader.set_format(format),
            Err(_) => return Err(NormalizeError::Corrupt("unrecognized image format".into())),
        }
    }

    // Dimensions are unbounded; the allocation cap stops decompression bombs.
    reader.limits(Limits::default());

    reader
        .decode()
        .map_err(|e| NormalizeError::Corrupt(format!("failed to decode image: {e}")))
}

/// Read EXIF tag 0x0112. Returns 1 when there is no EXIF block or no tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|v| (1..=8).contains(v))
        .unwrap_or(1)
}

/// Rotate/flip so stored pixel order matches the EXIF-declared visual orientation.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        // transpose
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        // transverse
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Composite onto opaque white using alpha as blend weight.
fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        *dst = Rgb([blend(r), blend(g), blend(b)]);
    }
    out
}

/// Target size with the longer side clamped to `max_dimension`. Never upsamples.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let scale_short = |short: u32, long: u32| {
        ((short as f64 * max_dimension as f64 / long as f64).round() as u32).max(1)
    };
    if width >= height {
        (max_dimension, scale_short(height, width))
    } else {
        (scale_short(width, height), max_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgba};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn png_upload(img: DynamicImage) -> RawUpload {
        RawUpload::new("face.png", encode(img, ImageFormat::Png))
    }

    #[test]
    fn test_downsamples_landscape_to_max_dimension() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2000, 500, Rgb([10, 20, 30])));
        let canonical = Normalizer::new(10.0, 1024).normalize(&png_upload(img)).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (1024, 256));
        assert_eq!((canonical.source_width, canonical.source_height), (2000, 500));
    }

    #[test]
    fn test_downsamples_portrait_to_max_dimension() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 1200));
        let canonical = Normalizer::new(10.0, 600).normalize(&png_upload(img)).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (150, 600));
    }

    #[test]
    fn test_never_upsamples() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 30));
        let canonical = Normalizer::new(10.0, 1024).normalize(&png_upload(img)).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (40, 30));
    }

    #[test]
    fn test_transparent_pixel_becomes_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0])));
        let canonical = Normalizer::new(10.0, 1024).normalize(&png_upload(img)).unwrap();
        assert!(canonical.flattened_alpha);
        assert_eq!(canonical.pixels().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_opaque_alpha_keeps_color() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([12, 34, 56, 255])));
        let canonical = Normalizer::new(10.0, 1024).normalize(&png_upload(img)).unwrap();
        assert_eq!(canonical.pixels().get_pixel(1, 1), &Rgb([12, 34, 56]));
    }

    #[test]
    fn test_half_alpha_blends_toward_white() {
        let rgba = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let rgb = flatten_onto_white(&rgba);
        // 255 * 127 / 255 = 127
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn test_grayscale_becomes_rgb() {
        let gray: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 4, Luma([77]));
        let canonical = Normalizer::new(10.0, 1024)
            .normalize(&png_upload(DynamicImage::ImageLuma8(gray)))
            .unwrap();
        assert_eq!(canonical.pixels().get_pixel(0, 0), &Rgb([77, 77, 77]));
        assert_eq!(canonical.pixels().as_raw().len(), 4 * 4 * 3);
    }

    #[test]
    fn test_oversized_rejected_before_decode() {
        // Garbage bytes would fail to decode; the size check must win.
        let upload = RawUpload {
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
            declared_size: 50 * 1024 * 1024,
            filename: "huge.jpg".into(),
        };
        let err = Normalizer::new(10.0, 1024).normalize(&upload).unwrap_err();
        assert!(matches!(err, NormalizeError::Oversized { limit_mb, .. } if limit_mb == 10.0));
    }

    #[test]
    fn test_under_declared_size_still_checked() {
        // Hashed pixels so the PNG stays well above the limit.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
            Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
        }));
        let mut upload = png_upload(img);
        assert!(upload.bytes.len() > 1048);
        upload.declared_size = 1;
        let err = Normalizer::new(0.001, 1024).normalize(&upload).unwrap_err();
        assert!(matches!(err, NormalizeError::Oversized { .. }));
    }

    #[test]
    fn test_byte_limit() {
        assert_eq!(Normalizer::new(10.0, 1024).byte_limit(), 10 * 1024 * 1024);
        assert_eq!(Normalizer::new(0.001, 1024).byte_limit(), 1048);
    }

    #[test]
    fn test_very_wide_image_is_normalized() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(20_000, 2, Rgb([90, 90, 90])));
        let canonical = Normalizer::new(10.0, 1024).normalize(&png_upload(img)).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (1024, 1));
        assert_eq!((canonical.source_width, canonical.source_height), (20_000, 2));
    }

    #[test]
    fn test_exactly_at_limit_is_accepted() {
        let mut upload = png_upload(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        upload.declared_size = 10 * 1024 * 1024;
        assert!(Normalizer::new(10.0, 1024).normalize(&upload).is_ok());
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        let upload = RawUpload::new("face.jpg", b"definitely not a jpeg".to_vec());
        let err = Normalizer::new(10.0, 1024).normalize(&upload).unwrap_err();
        assert!(matches!(err, NormalizeError::Corrupt(_)));
    }

    #[test]
    fn test_unknown_format_without_hint_rejected() {
        let upload = RawUpload::new("face", vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let err = Normalizer::new(10.0, 1024).normalize(&upload).unwrap_err();
        assert!(matches!(err, NormalizeError::Corrupt(ref m) if m.contains("unrecognized")));
    }

    #[test]
    fn test_empty_upload_rejected() {
        let upload = RawUpload::new("face.png", Vec::new());
        assert!(matches!(
            Normalizer::new(10.0, 1024).normalize(&upload),
            Err(NormalizeError::Corrupt(_))
        ));
    }

    #[test]
    fn test_jpeg_decodes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([200, 100, 50])));
        let upload = RawUpload::new("face.jpg", encode(img, ImageFormat::Jpeg));
        let canonical = Normalizer::new(10.0, 32).normalize(&upload).unwrap();
        assert_eq!((canonical.width(), canonical.height()), (32, 24));
        assert_eq!(canonical.orientation, 1);
    }

    /// Splice an APP1 block carrying only an orientation tag right after SOI.
    fn with_exif_orientation(jpeg: Vec<u8>, orientation: u8) -> Vec<u8> {
        let tiff: [u8; 26] = [
            b'I', b'I', 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00, // header, IFD0 at 8
            0x01, 0x00, // one entry
            0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, orientation, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, // no next IFD
        ];
        let len = (2 + 6 + tiff.len()) as u16;
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xff, 0xe1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_exif_orientation_applied_during_normalize() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([120, 60, 30])));
        let bytes = with_exif_orientation(encode(img, ImageFormat::Jpeg), 6);
        assert_eq!(read_exif_orientation(&bytes), 6);

        let canonical = Normalizer::new(10.0, 1024)
            .normalize(&RawUpload::new("phone.jpg", bytes))
            .unwrap();
        assert_eq!(canonical.orientation, 6);
        assert_eq!((canonical.source_width, canonical.source_height), (40, 20));
        assert_eq!((canonical.width(), canonical.height()), (20, 40));
    }

    #[test]
    fn test_orientation_six_swaps_axes() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(3, 2));
        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.dimensions(), (2, 3));
    }

    #[test]
    fn test_orientation_transpose_moves_corner() {
        let mut rgb = RgbImage::new(3, 2);
        rgb.put_pixel(2, 0, Rgb([255, 0, 0]));
        let transposed = apply_orientation(DynamicImage::ImageRgb8(rgb), 5).to_rgb8();
        assert_eq!(transposed.dimensions(), (2, 3));
        assert_eq!(transposed.get_pixel(0, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_orientation_unknown_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(3, 2));
        assert_eq!(apply_orientation(img, 42).dimensions(), (3, 2));
    }

    #[test]
    fn test_exif_missing_defaults_to_one() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(2, 2)), ImageFormat::Png);
        assert_eq!(read_exif_orientation(&bytes), 1);
        assert_eq!(read_exif_orientation(b"garbage"), 1);
    }

    #[test]
    fn test_fit_within_bounds() {
        assert_eq!(fit_within(4000, 3000, 1024), (1024, 768));
        assert_eq!(fit_within(5000, 1, 1024), (1024, 1));
        assert_eq!(fit_within(1024, 1024, 1024), (1024, 1024));
        assert_eq!(fit_within(1025, 10, 1024), (1024, 10));
    }
}
