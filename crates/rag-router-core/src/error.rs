//! Turn-level error type.
//!
//! Only failures without a safe default surface here. Retrieval outages and
//! web search failures are absorbed by the orchestrator (empty context and
//! a `WEB_ERROR::` block respectively) and never become a [`TurnError`].

use std::time::Duration;

/// A failure that aborts the current turn. The conversation state is left
/// exactly as it was before the turn started.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("could not determine route: {0}")]
    ClassificationParse(String),

    #[error("classifier call failed: {0:#}")]
    Classification(anyhow::Error),

    #[error("sufficiency judgement failed: {0:#}")]
    Judgement(anyhow::Error),

    #[error("answer synthesis failed: {0:#}")]
    SynthesisFailure(anyhow::Error),

    #[error("turn timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("conversation store error: {0:#}")]
    Store(anyhow::Error),
}

impl TurnError {
    /// Machine-readable code used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            TurnError::ClassificationParse(_) => "route_error",
            TurnError::Classification(_)
            | TurnError::Judgement(_)
            | TurnError::SynthesisFailure(_) => "upstream_error",
            TurnError::Timeout(_) => "timeout",
            TurnError::Store(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_cause() {
        let err = TurnError::SynthesisFailure(anyhow::anyhow!("status 500"));
        assert!(err.to_string().contains("status 500"));

        let err = TurnError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "turn timed out after 120s");
        assert_eq!(err.code(), "timeout");
    }
}
