//! Maps engine rejections onto the pipeline error taxonomy.

use crate::config::PipelineConfig;
use crate::engine::EngineFailure;
use crate::error::PipelineError;
use crate::types::Person;

/// Decides which input an engine rejection refers to by looking for each
/// input's identifier in the engine message. The first identifier is checked
/// first, so a message naming both resolves to the first person.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    first_identifier: String,
    second_identifier: String,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new("img1", "img2")
    }
}

impl ErrorClassifier {
    pub fn new(first_identifier: impl Into<String>, second_identifier: impl Into<String>) -> Self {
        Self {
            first_identifier: first_identifier.into(),
            second_identifier: second_identifier.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.first_identifier, &config.second_identifier)
    }

    /// Classify a raw engine rejection message.
    pub fn classify_message(&self, message: &str) -> PipelineError {
        let person = if mentions(message, &self.first_identifier) {
            Some(Person::First)
        } else if mentions(message, &self.second_identifier) {
            Some(Person::Second)
        } else {
            None
        };

        match person {
            Some(person) => PipelineError::NoFaceDetected {
                person,
                detail: message.to_string(),
            },
            None => PipelineError::UnknownVerificationFailure {
                message: message.to_string(),
            },
        }
    }

    /// Rejections are classified; faults are always critical.
    pub fn classify(&self, failure: EngineFailure) -> PipelineError {
        match failure {
            EngineFailure::Rejected(message) => self.classify_message(&message),
            EngineFailure::Fault(message) => PipelineError::CriticalFailure { message },
        }
    }
}

fn mentions(message: &str, identifier: &str) -> bool {
    !identifier.is_empty() && message.contains(identifier)
}
