//! Output for the terminal: human-readable text or one JSON object per result.

use faceverify_core::{ErrorKind, Interpretation, PipelineError, SessionStats};
use serde::Serialize;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Report<'a> {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        pair: Option<&'a str>,
        #[serde(flatten)]
        result: &'a Interpretation,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        pair: Option<&'a str>,
        error: ErrorKind,
        message: String,
    },
}

/// Render one verification result. `pair` labels results inside a batch.
pub fn result(result: &Result<Interpretation, PipelineError>, pair: Option<&str>, json: bool) {
    if json {
        let report = match result {
            Ok(interpretation) => Report::Ok {
                pair,
                result: interpretation,
            },
            Err(err) => Report::Error {
                pair,
                error: err.kind(),
                message: err.user_message(),
            },
        };
        print_json(&report);
        return;
    }

    let prefix = pair.map(|p| format!("{p}: ")).unwrap_or_default();
    match result {
        Ok(interpretation) => {
            println!("{prefix}{}", interpretation.summary);
            if let Some(confidence) = interpretation.confidence_percent {
                println!("  confidence: {confidence:.1}%");
            }
            if let (Some(distance), Some(threshold)) =
                (interpretation.distance, interpretation.threshold)
            {
                println!("  distance:   {distance:.4} (threshold {threshold:.4})");
            }
            if pair.is_none() {
                match serde_json::to_string_pretty(&interpretation.engine) {
                    Ok(payload) => println!("{payload}"),
                    Err(err) => tracing::warn!(error = %err, "failed to format engine payload"),
                }
            }
        }
        Err(err) => println!("{prefix}{}", err.user_message()),
    }
}

pub fn session(stats: &SessionStats, json: bool) {
    if json {
        print_json(stats);
    } else {
        println!(
            "{} attempts: {} match, {} no match, {} failed",
            stats.attempts, stats.matches, stats.mismatches, stats.failures
        );
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(text) => println!("{text}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceverify_core::{interpret, Person, VerificationOutcome};

    #[test]
    fn test_ok_report_flattens_interpretation() {
        let interpretation = interpret(&VerificationOutcome::new(true, Some(0.2), Some(0.4)));
        let report = Report::Ok {
            pair: None,
            result: &interpretation,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["verdict"], "match");
        assert_eq!(json["confidence_percent"], 50.0);
        assert_eq!(json["engine"]["threshold"], 0.4);
        assert!(json.get("pair").is_none());
    }

    #[test]
    fn test_error_report_uses_safe_message() {
        let err = PipelineError::NoFaceDetected {
            person: Person::First,
            detail: "Face could not be detected in img1".into(),
        };
        let report = Report::Error {
            pair: Some("3"),
            error: err.kind(),
            message: err.user_message(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["pair"], "3");
        assert_eq!(json["error"]["kind"], "no_face_detected");
        assert_eq!(json["error"]["person"], "first");
        assert_eq!(json["message"], "No face detected in your first image");
    }
}
