//! The verification engine seam.
//!
//! The engine is an external capability: given two image files it returns a
//! distance, a threshold and a verdict. [`CommandEngine`] drives an engine
//! program over a small command-line + JSON protocol; tests substitute scripted
//! implementations of [`VerificationEngine`].

use crate::types::VerificationOutcome;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Exit status an engine program uses to report that it rejected its inputs.
pub const EXIT_REJECTED: i32 = 2;

#[derive(Debug, Error)]
pub enum EngineFailure {
    /// The engine ran and refused the inputs, e.g. no face found in one image.
    #[error("engine rejected inputs: {0}")]
    Rejected(String),
    /// The engine could not run or produced output that cannot be used.
    #[error("engine fault: {0}")]
    Fault(String),
}

/// Compares the faces in two image files.
pub trait VerificationEngine: Send + Sync {
    /// `strict_detection = false` asks the engine to report undetectable faces
    /// instead of aborting on them.
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        strict_detection: bool,
    ) -> Result<VerificationOutcome, EngineFailure>;
}

impl<E: VerificationEngine + ?Sized> VerificationEngine for Box<E> {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        strict_detection: bool,
    ) -> Result<VerificationOutcome, EngineFailure> {
        (**self).verify(first, second, strict_detection)
    }
}

/// Runs an external engine program once per verification.
///
/// Invocation: `<program> <args...> --img1 <path> --img2 <path> --enforce-detection <bool>`.
/// Exit 0 with a JSON object on stdout is a result. Exit [`EXIT_REJECTED`] with a
/// message on stderr is a rejection. Anything else is a fault.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandEngine {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a whitespace-split command line such as `python3 contrib/deepface_verify.py`.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }
}

impl VerificationEngine for CommandEngine {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        strict_detection: bool,
    ) -> Result<VerificationOutcome, EngineFailure> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--img1")
            .arg(first)
            .arg("--img2")
            .arg(second)
            .arg("--enforce-detection")
            .arg(if strict_detection { "true" } else { "false" })
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                EngineFailure::Fault(format!(
                    "failed to run {}: {e}",
                    self.program.to_string_lossy()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("engine exited with {}", output.status));
            tracing::debug!(status = %output.status, %message, "engine exited unsuccessfully");

            return match output.status.code() {
                Some(EXIT_REJECTED) => Err(EngineFailure::Rejected(message)),
                _ => Err(EngineFailure::Fault(message)),
            };
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineFailure::Fault(format!("unreadable engine output: {e}")))
    }
}
