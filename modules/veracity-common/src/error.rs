use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeracityError {
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// Generation failures
// =============================================================================

/// A failed generation call. Carries the raw backend message plus whatever
/// structured code the backend exposed; classification happens in the
/// controllers.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct GenerationError {
    pub status: Option<u16>,
    /// Provider error type, e.g. `overloaded_error`.
    pub kind: Option<String>,
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            kind: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn timed_out(stage: Stage, after: Duration) -> Self {
        Self::new(format!("{stage} stage timed out after {after:?}"))
    }
}

/// How a failure should be treated by a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Overloaded,
    RateLimited,
    Timeout,
    ModelNotFound,
    /// The backend answered but the output did not fit the schema.
    Malformed,
    /// Unresolvable configuration, bad credentials.
    Fatal,
    Unknown,
}

impl FailureClass {
    /// Transient backend pressure: worth a fallback backend or a fresh attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureClass::Overloaded | FailureClass::RateLimited | FailureClass::Timeout
        )
    }

    /// Retrying cannot help; the round fails fast.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureClass::Fatal | FailureClass::ModelNotFound)
    }
}

// =============================================================================
// Round failures
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    Deceive,
    Audit,
    SectionPick,
    QuizMake,
    Validate,
    Relevance,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Deceive => "deceive",
            Stage::Audit => "audit",
            Stage::SectionPick => "section_pick",
            Stage::QuizMake => "quiz_make",
            Stage::Validate => "validate",
            Stage::Relevance => "relevance",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a round produced nothing. No variant carries a partial round.
#[derive(Error, Debug, Clone)]
pub enum RoundError {
    #[error("source '{title}' unavailable: {reason}")]
    Source {
        title: String,
        reason: String,
        not_found: bool,
    },

    #[error("{stage} failed and cannot be retried: {error}")]
    Fatal {
        stage: Stage,
        class: FailureClass,
        error: GenerationError,
    },

    #[error("no acceptable round after {attempts} attempt(s)")]
    Exhausted {
        attempts: u32,
        last_failure: Option<FailureClass>,
    },

    #[error("section selection returned no source text")]
    Ungrounded,

    #[error("round exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl RoundError {
    /// The failure class behind this error, if it came from a backend.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            RoundError::Fatal { class, .. } => Some(*class),
            RoundError::Exhausted { last_failure, .. } => *last_failure,
            RoundError::DeadlineExceeded(_) => Some(FailureClass::Timeout),
            _ => None,
        }
    }

    /// Short text for the presentation layer.
    pub fn user_message(&self) -> &'static str {
        if let RoundError::Source { not_found, .. } = self {
            return if *not_found {
                "No page was found for that title. Try a different one."
            } else {
                "The reference source is unavailable right now. Please try again."
            };
        }
        match self.failure_class() {
            Some(FailureClass::Overloaded) => {
                "The generation service is experiencing high demand. Please try again in a few moments."
            }
            Some(FailureClass::RateLimited) => {
                "Rate limit exceeded. Please wait a moment and try again."
            }
            Some(FailureClass::ModelNotFound) => {
                "The configured model is not available. Check the model configuration."
            }
            Some(FailureClass::Timeout) => "Generation took too long. Please try again.",
            Some(FailureClass::Fatal) => {
                "The generation service is misconfigured. Check the API credentials."
            }
            _ => "Could not produce a verified round. Try a different topic.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_fatal_classes_are_disjoint() {
        let all = [
            FailureClass::Overloaded,
            FailureClass::RateLimited,
            FailureClass::Timeout,
            FailureClass::ModelNotFound,
            FailureClass::Malformed,
            FailureClass::Fatal,
            FailureClass::Unknown,
        ];
        for class in all {
            assert!(!(class.is_transient() && class.is_fatal()), "{class:?}");
        }
        assert!(!FailureClass::Malformed.is_transient());
        assert!(!FailureClass::Malformed.is_fatal());
    }

    #[test]
    fn exhausted_round_reports_last_failure() {
        let err = RoundError::Exhausted {
            attempts: 3,
            last_failure: Some(FailureClass::Overloaded),
        };
        assert_eq!(err.failure_class(), Some(FailureClass::Overloaded));
        assert!(err.user_message().contains("high demand"));
        assert_eq!(err.to_string(), "no acceptable round after 3 attempt(s)");
    }

    #[test]
    fn source_not_found_has_its_own_message() {
        let err = RoundError::Source {
            title: "Nowhere".into(),
            reason: "missing".into(),
            not_found: true,
        };
        assert!(err.user_message().starts_with("No page was found"));
    }

    #[test]
    fn timed_out_message_names_the_stage() {
        let err = GenerationError::timed_out(Stage::Audit, Duration::from_secs(5));
        assert_eq!(err.message, "audit stage timed out after 5s");
    }
}
