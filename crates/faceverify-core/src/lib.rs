//! faceverify-core: ingestion and orchestration pipeline for two-photo face verification.
//!
//! Uploaded images are validated, normalized to bounded RGB, reordered into the
//! engine's channel layout, staged as temporary JPEG files and handed to an
//! external verification engine. Engine output is interpreted into a verdict
//! with a derived confidence; engine failures are classified into a small,
//! stable error taxonomy.

pub mod classify;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod interpret;
pub mod normalize;
pub mod orchestrator;
pub mod session;
pub mod temp;
pub mod types;

pub use classify::ErrorClassifier;
pub use config::PipelineConfig;
pub use engine::{CommandEngine, EngineFailure, VerificationEngine};
pub use error::{ErrorKind, PipelineError};
pub use interpret::{interpret, Interpretation, Verdict};
pub use normalize::Normalizer;
pub use orchestrator::Verifier;
pub use session::SessionStats;
pub use types::{CanonicalImage, ChannelLayout, DeviceImage, Person, RawUpload, VerificationOutcome};
