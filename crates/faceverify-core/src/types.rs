use image::RgbImage;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Which side of the comparison an input belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Person {
    First,
    Second,
}

impl Person {
    pub const BOTH: [Person; 2] = [Person::First, Person::Second];

    /// 1-based position, as shown to users ("person 1").
    pub fn number(self) -> u8 {
        match self {
            Person::First => 1,
            Person::Second => 2,
        }
    }

    /// Ordinal word used in user-facing messages.
    pub fn ordinal(self) -> &'static str {
        match self {
            Person::First => "first",
            Person::Second => "second",
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "person {}", self.number())
    }
}

/// An uploaded image as handed over by the host.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    /// Size reported by the host. Checked against the size ceiling before decoding.
    pub declared_size: u64,
    /// Original filename, used as a format hint and for log context.
    pub filename: String,
}

impl RawUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            declared_size: bytes.len() as u64,
            bytes,
            filename: filename.into(),
        }
    }

    /// Read an upload from disk, keeping at most `max_bytes + 1` bytes.
    ///
    /// The declared size is the file's metadata length, so a file over the
    /// ceiling is still rejected as oversized without being loaded in full.
    pub fn from_path(path: &Path, max_bytes: u64) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let declared_size = file.metadata()?.len();
        let mut bytes = Vec::with_capacity(declared_size.min(max_bytes.saturating_add(1)) as usize);
        file.take(max_bytes.saturating_add(1)).read_to_end(&mut bytes)?;
        Ok(Self {
            bytes,
            declared_size,
            filename: path.to_string_lossy().into_owned(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bounded, orientation-corrected, alpha-free RGB raster.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pub(crate) pixels: RgbImage,
    /// Dimensions of the decoded source before orientation and resizing.
    pub source_width: u32,
    pub source_height: u32,
    /// EXIF orientation value that was applied (1 = none).
    pub orientation: u32,
    /// Whether the source carried an alpha channel that was flattened onto white.
    pub flattened_alpha: bool,
}

impl CanonicalImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Channel order of a [`DeviceImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Rgb,
    #[default]
    Bgr,
}

/// A canonical raster reordered into the engine's channel layout.
///
/// Stored as `(height, width, channel)`, matching OpenCV's `HxWx3` arrays.
#[derive(Debug, Clone)]
pub struct DeviceImage {
    pub(crate) pixels: Array3<u8>,
    pub(crate) layout: ChannelLayout,
}

impl DeviceImage {
    pub fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }
}

/// Raw engine result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Everything else the engine reported (model name, metric, timings, ...).
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VerificationOutcome {
    pub fn new(verified: bool, distance: Option<f64>, threshold: Option<f64>) -> Self {
        Self {
            verified,
            distance,
            threshold,
            metadata: serde_json::Map::new(),
        }
    }

    /// The full engine payload, including the core fields.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
