use crate::types::ChannelLayout;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_MAX_SIZE_MB: f64 = 10.0;
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Pipeline knobs. Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Uploads whose declared size exceeds this many MiB are rejected before decoding.
    pub max_size_mb: f64,
    /// Longest allowed side of a canonical image, in pixels.
    pub max_dimension: u32,
    /// JPEG quality (1-100) for the staged engine inputs.
    pub jpeg_quality: u8,
    /// Directory for staged engine inputs. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Channel order the engine expects.
    pub channel_layout: ChannelLayout,
    /// Token the engine uses for the first image in its error messages.
    pub first_identifier: String,
    /// Token the engine uses for the second image in its error messages.
    pub second_identifier: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            temp_dir: None,
            channel_layout: ChannelLayout::Bgr,
            first_identifier: "img1".to_string(),
            second_identifier: "img2".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
