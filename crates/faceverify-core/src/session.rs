use crate::error::PipelineError;
use crate::interpret::{Interpretation, Verdict};
use serde::Serialize;

/// Advisory tally of verification attempts, held by the caller.
///
/// The pipeline never reads it; it is not a rate limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub attempts: u32,
    pub matches: u32,
    pub mismatches: u32,
    pub failures: u32,
}

impl SessionStats {
    pub fn record(&mut self, result: &Result<Interpretation, PipelineError>) {
        self.attempts = self.attempts.saturating_add(1);
        let counter = match result {
            Ok(i) if i.verdict == Verdict::Match => &mut self.matches,
            Ok(_) => &mut self.mismatches,
            Err(_) => &mut self.failures,
        };
        *counter = counter.saturating_add(1);
    }
}
