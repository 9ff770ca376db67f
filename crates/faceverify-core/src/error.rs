//! Pipeline error taxonomy.
//!
//! `Display` carries diagnostic detail for logs. What an end user sees comes
//! from [`PipelineError::user_message`], which never includes library or engine text.

use crate::convert::ConvertError;
use crate::temp::StorageError;
use crate::types::Person;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{person}: no image provided")]
    MissingInput { person: Person },
    #[error("{person}: upload is {size_mb:.2} MB, limit is {limit_mb} MB")]
    OversizedInput {
        person: Person,
        size_mb: f64,
        limit_mb: f64,
    },
    #[error("{person}: image could not be decoded: {detail}")]
    CorruptInput { person: Person, detail: String },
    #[error("{person}: channel conversion failed: {source}")]
    ConversionFailure {
        person: Person,
        #[source]
        source: ConvertError,
    },
    #[error("{person}: staging engine input failed: {source}")]
    StorageFailure {
        person: Person,
        #[source]
        source: StorageError,
    },
    #[error("{person}: engine found no face: {detail}")]
    NoFaceDetected { person: Person, detail: String },
    #[error("verification failed: {message}")]
    UnknownVerificationFailure { message: String },
    #[error("critical failure: {message}")]
    CriticalFailure { message: String },
}

/// Stable, serializable tag for each [`PipelineError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "person", rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput(Person),
    OversizedInput(Person),
    CorruptInput(Person),
    ConversionFailure(Person),
    StorageFailure(Person),
    NoFaceDetected(Person),
    UnknownVerificationFailure,
    CriticalFailure,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { person } => ErrorKind::MissingInput(*person),
            Self::OversizedInput { person, .. } => ErrorKind::OversizedInput(*person),
            Self::CorruptInput { person, .. } => ErrorKind::CorruptInput(*person),
            Self::ConversionFailure { person, .. } => ErrorKind::ConversionFailure(*person),
            Self::StorageFailure { person, .. } => ErrorKind::StorageFailure(*person),
            Self::NoFaceDetected { person, .. } => ErrorKind::NoFaceDetected(*person),
            Self::UnknownVerificationFailure { .. } => ErrorKind::UnknownVerificationFailure,
            Self::CriticalFailure { .. } => ErrorKind::CriticalFailure,
        }
    }

    /// The person this error is attributed to, if any.
    pub fn person(&self) -> Option<Person> {
        match self {
            Self::MissingInput { person }
            | Self::OversizedInput { person, .. }
            | Self::CorruptInput { person, .. }
            | Self::ConversionFailure { person, .. }
            | Self::StorageFailure { person, .. }
            | Self::NoFaceDetected { person, .. } => Some(*person),
            Self::UnknownVerificationFailure { .. } | Self::CriticalFailure { .. } => None,
        }
    }

    /// Safe, fixed text for display to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput { .. } => "Please input both files".to_string(),
            Self::OversizedInput { person, limit_mb, .. } => format!(
                "The {} image is too large (limit {limit_mb} MB)",
                person.ordinal()
            ),
            Self::CorruptInput { person, .. } => format!(
                "The {} image could not be read, please upload a PNG, JPEG or WebP photo",
                person.ordinal()
            ),
            Self::ConversionFailure { person, .. } => format!(
                "The {} image could not be prepared for verification",
                person.ordinal()
            ),
            Self::StorageFailure { .. } => {
                "Temporary storage is unavailable, please try again later".to_string()
            }
            Self::NoFaceDetected { person, .. } => {
                format!("No face detected in your {} image", person.ordinal())
            }
            Self::UnknownVerificationFailure { .. } => {
                "Unknown error occurred, please try with different images or later.".to_string()
            }
            Self::CriticalFailure { .. } => {
                "Verification could not be completed, please try again later".to_string()
            }
        }
    }
}
