//! Turns a raw engine outcome into a user-facing verdict.

use crate::types::VerificationOutcome;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    NoMatch,
}

impl Verdict {
    pub fn summary(self) -> &'static str {
        match self {
            Verdict::Match => "Both faces belong to the same person",
            Verdict::NoMatch => "Both faces do not belong to the same person",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub verdict: Verdict,
    pub distance: Option<f64>,
    pub threshold: Option<f64>,
    /// `(1 - distance / threshold) * 100`. Unclamped: far mismatches go negative.
    pub confidence_percent: Option<f64>,
    pub summary: String,
    /// Full engine payload, for inspection.
    pub engine: serde_json::Value,
}

pub fn interpret(outcome: &VerificationOutcome) -> Interpretation {
    let verdict = if outcome.verified {
        Verdict::Match
    } else {
        Verdict::NoMatch
    };

    Interpretation {
        verdict,
        distance: outcome.distance,
        threshold: outcome.threshold,
        confidence_percent: confidence_percent(outcome.distance, outcome.threshold),
        summary: verdict.summary().to_string(),
        engine: outcome.payload(),
    }
}

pub fn confidence_percent(distance: Option<f64>, threshold: Option<f64>) -> Option<f64> {
    match (distance, threshold) {
        (Some(distance), Some(threshold)) if threshold > 0.0 => {
            Some((1.0 - distance / threshold) * 100.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("confidence should be present");
        assert!((actual - expected).abs() < 1e-9, "got {actual}, expected {expected}");
    }

    #[test]
    fn test_zero_distance_is_full_confidence() {
        approx(confidence_percent(Some(0.0), Some(0.4)), 100.0);
    }

    #[test]
    fn test_distance_past_threshold_goes_negative() {
        approx(confidence_percent(Some(0.6), Some(0.4)), -50.0);
    }

    #[test]
    fn test_non_positive_threshold_omits_confidence() {
        assert_eq!(confidence_percent(Some(0.3), Some(0.0)), None);
        assert_eq!(confidence_percent(Some(0.3), Some(-1.0)), None);
    }

    #[test]
    fn test_missing_values_omit_confidence() {
        assert_eq!(confidence_percent(None, Some(0.4)), None);
        assert_eq!(confidence_percent(Some(0.1), None), None);
    }

    #[test]
    fn test_interpret_match() {
        let interpretation = interpret(&VerificationOutcome::new(true, Some(0.2), Some(0.4)));
        assert_eq!(interpretation.verdict, Verdict::Match);
        approx(interpretation.confidence_percent, 50.0);
        assert_eq!(interpretation.summary, "Both faces belong to the same person");
        assert_eq!(interpretation.engine["verified"], true);
    }

    #[test]
    fn test_interpret_no_match_keeps_numbers() {
        let interpretation = interpret(&VerificationOutcome::new(false, Some(0.7), Some(0.4)));
        assert_eq!(interpretation.verdict, Verdict::NoMatch);
        assert_eq!(interpretation.distance, Some(0.7));
        assert_eq!(interpretation.threshold, Some(0.4));
    }
}
