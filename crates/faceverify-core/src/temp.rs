//! Short-lived on-disk staging of engine inputs.
//!
//! Each [`DeviceImage`] is encoded as JPEG into an exclusively created file.
//! The returned [`TempResourceHandle`] owns that file until
//! [`TempResourceManager::release`] deletes it. Release is idempotent and never
//! fails; if a handle is dropped unreleased the file is still removed.

use crate::convert::ConvertError;
use crate::types::{DeviceImage, Person};
use image::codecs::jpeg::JpegEncoder;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create temp file in {dir}: {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode JPEG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write temp file: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to read device raster: {0}")]
    Layout(#[from] ConvertError),
}

/// Ownership token for one staged engine input.
#[derive(Debug)]
pub struct TempResourceHandle {
    path: PathBuf,
    file: Option<TempPath>,
}

impl TempResourceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }
}

/// Creates and deletes staged engine inputs under one directory.
#[derive(Debug, Clone)]
pub struct TempResourceManager {
    dir: PathBuf,
    jpeg_quality: u8,
}

impl TempResourceManager {
    pub fn new(dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            dir: dir.into(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode `image` into a new uniquely named JPEG file. Consumes the raster.
    pub fn materialize(
        &self,
        image: DeviceImage,
        attempt: Uuid,
        person: Person,
    ) -> Result<TempResourceHandle, StorageError> {
        let rgb = image.to_rgb()?;
        drop(image);

        let prefix = format!("faceverify-{}-p{}-", attempt.simple(), person.number());
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".jpg")
            .tempfile_in(&self.dir)
            .map_err(|source| StorageError::Create {
                dir: self.dir.clone(),
                source,
            })?;

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality).encode_image(&rgb)?;
            writer.flush()?;
        }

        let file = file.into_temp_path();
        let path = file.to_path_buf();
        tracing::debug!(path = %path.display(), %person, "staged engine input");

        Ok(TempResourceHandle {
            path,
            file: Some(file),
        })
    }

    /// Delete the handle's backing file. Safe to call more than once.
    ///
    /// Failures are logged and swallowed.
    pub fn release(&self, handle: &mut TempResourceHandle) {
        let Some(file) = handle.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => tracing::debug!(path = %handle.path.display(), "released engine input"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %handle.path.display(), "engine input already gone")
            }
            Err(err) => tracing::warn!(
                path = %handle.path.display(),
                error = %err,
                "failed to delete engine input; continuing"
            ),
        }
    }

    pub fn release_all<'a>(&self, handles: impl IntoIterator<Item = &'a mut TempResourceHandle>) {
        for handle in handles {
            self.release(handle);
        }
    }
}
