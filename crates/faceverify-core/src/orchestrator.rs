//! End-to-end verification of two uploads.
//!
//! Sequence: normalize → convert → materialize → invoke engine → release.
//! The first failing stage aborts the attempt. Once any temp file exists, every
//! exit path releases it, including an engine panic.

use crate::classify::ErrorClassifier;
use crate::config::PipelineConfig;
use crate::convert;
use crate::engine::VerificationEngine;
use crate::error::PipelineError;
use crate::interpret::{interpret, Interpretation};
use crate::normalize::{NormalizeError, Normalizer};
use crate::temp::TempResourceManager;
use crate::types::{ChannelLayout, DeviceImage, Person, RawUpload, VerificationOutcome};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::ScopedJoinHandle;
use uuid::Uuid;

/// Pipeline stages, in order. An attempt ends in `Done` with an outcome or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalizing,
    Converting,
    Materializing,
    Invoking,
    Releasing,
    Done,
}

/// Runs verification attempts against one engine.
///
/// Holds configuration only; every call is independent.
pub struct Verifier<E> {
    engine: E,
    normalizer: Normalizer,
    layout: ChannelLayout,
    temp: TempResourceManager,
    classifier: ErrorClassifier,
}

impl<E: VerificationEngine> Verifier<E> {
    pub fn new(engine: E, config: &PipelineConfig) -> Self {
        Self {
            engine,
            normalizer: Normalizer::from_config(config),
            layout: config.channel_layout,
            temp: TempResourceManager::new(config.temp_dir(), config.jpeg_quality),
            classifier: ErrorClassifier::from_config(config),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Verify and interpret.
    pub fn verify(
        &self,
        first: &RawUpload,
        second: &RawUpload,
    ) -> Result<Interpretation, PipelineError> {
        self.verify_outcome(first, second).map(|outcome| interpret(&outcome))
    }

    /// Verify and return the raw engine outcome.
    pub fn verify_outcome(
        &self,
        first: &RawUpload,
        second: &RawUpload,
    ) -> Result<VerificationOutcome, PipelineError> {
        let attempt = Uuid::new_v4();
        let span = tracing::info_span!("verify", attempt = %attempt.simple());
        let _guard = span.enter();

        tracing::info!(
            first = %first.filename,
            second = %second.filename,
            "verification started"
        );

        let result = self.run(attempt, first, second);
        enter_stage(Stage::Done, None);

        match &result {
            Ok(outcome) => tracing::info!(
                verified = outcome.verified,
                distance = ?outcome.distance,
                threshold = ?outcome.threshold,
                "verification finished"
            ),
            Err(err) => tracing::warn!(kind = ?err.kind(), error = %err, "verification failed"),
        }
        result
    }

    fn run(
        &self,
        attempt: Uuid,
        first: &RawUpload,
        second: &RawUpload,
    ) -> Result<VerificationOutcome, PipelineError> {
        for (person, upload) in Person::BOTH.into_iter().zip([first, second]) {
            if upload.is_empty() {
                return Err(PipelineError::MissingInput { person });
            }
        }

        let (first_image, second_image) = self.prepare_both(first, second)?;

        enter_stage(Stage::Materializing, None);
        let mut first_handle = self
            .temp
            .materialize(first_image, attempt, Person::First)
            .map_err(|source| PipelineError::StorageFailure {
                person: Person::First,
                source,
            })?;
        let mut second_handle = match self.temp.materialize(second_image, attempt, Person::Second) {
            Ok(handle) => handle,
            Err(source) => {
                self.temp.release(&mut first_handle);
                return Err(PipelineError::StorageFailure {
                    person: Person::Second,
                    source,
                });
            }
        };

        enter_stage(Stage::Invoking, None);
        let invoked = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine
                .verify(first_handle.path(), second_handle.path(), false)
        }));

        enter_stage(Stage::Releasing, None);
        self.temp.release_all([&mut first_handle, &mut second_handle]);

        match invoked {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(failure)) => Err(self.classifier.classify(failure)),
            Err(payload) => Err(PipelineError::CriticalFailure {
                message: panic_message(&*payload),
            }),
        }
    }

    /// Normalize and convert both uploads concurrently. When both fail the
    /// first person's error wins.
    fn prepare_both(
        &self,
        first: &RawUpload,
        second: &RawUpload,
    ) -> Result<(DeviceImage, DeviceImage), PipelineError> {
        prepare_pair(first, second, |person, upload| self.prepare(person, upload))
    }

    fn prepare(&self, person: Person, upload: &RawUpload) -> Result<DeviceImage, PipelineError> {
        enter_stage(Stage::Normalizing, Some(person));
        let canonical = self.normalizer.normalize(upload).map_err(|err| match err {
            NormalizeError::Oversized { size_mb, limit_mb } => PipelineError::OversizedInput {
                person,
                size_mb,
                limit_mb,
            },
            NormalizeError::Corrupt(detail) => PipelineError::CorruptInput { person, detail },
        })?;

        enter_stage(Stage::Converting, Some(person));
        convert::to_device_layout(canonical, self.layout)
            .map_err(|source| PipelineError::ConversionFailure { person, source })
    }
}

/// Run `prepare` for both people on scoped threads. A panic on either side
/// becomes `CriticalFailure` for that side.
fn prepare_pair<F>(
    first: &RawUpload,
    second: &RawUpload,
    prepare: F,
) -> Result<(DeviceImage, DeviceImage), PipelineError>
where
    F: Fn(Person, &RawUpload) -> Result<DeviceImage, PipelineError> + Sync,
{
    let span = tracing::Span::current();
    let (span, prepare) = (&span, &prepare);
    let (first, second) = std::thread::scope(|scope| {
        let [first_job, second_job] =
            [(Person::First, first), (Person::Second, second)].map(|(person, upload)| {
                scope.spawn(move || {
                    let _guard = span.enter();
                    prepare(person, upload)
                })
            });
        (join_prepared(first_job), join_prepared(second_job))
    });
    Ok((first?, second?))
}

fn join_prepared(
    job: ScopedJoinHandle<'_, Result<DeviceImage, PipelineError>>,
) -> Result<DeviceImage, PipelineError> {
    job.join().unwrap_or_else(|payload| {
        Err(PipelineError::CriticalFailure {
            message: panic_message(&*payload),
        })
    })
}

fn enter_stage(stage: Stage, person: Option<Person>) {
    match person {
        Some(person) => tracing::debug!(?stage, %person, "stage"),
        None => tracing::debug!(?stage, "stage"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}
