//! Failure classification for retry and fallback decisions.
//!
//! Structured signals (HTTP status, provider error type) win. The message
//! matcher only runs when neither is present or neither is conclusive.

use veracity_common::{FailureClass, GenerationError};

pub fn classify(err: &GenerationError) -> FailureClass {
    if let Some(class) = err.status.and_then(from_status) {
        return class;
    }
    if let Some(class) = err.kind.as_deref().and_then(from_kind) {
        return class;
    }
    from_message(&err.message)
}

fn from_status(status: u16) -> Option<FailureClass> {
    match status {
        503 | 529 => Some(FailureClass::Overloaded),
        429 => Some(FailureClass::RateLimited),
        401 | 403 => Some(FailureClass::Fatal),
        404 => Some(FailureClass::ModelNotFound),
        408 | 504 => Some(FailureClass::Timeout),
        500..=599 => Some(FailureClass::Overloaded),
        _ => None,
    }
}

fn from_kind(kind: &str) -> Option<FailureClass> {
    match kind {
        "overloaded_error" | "api_error" => Some(FailureClass::Overloaded),
        "rate_limit_error" => Some(FailureClass::RateLimited),
        "authentication_error" | "permission_error" | "configuration_error" => {
            Some(FailureClass::Fatal)
        }
        "not_found_error" => Some(FailureClass::ModelNotFound),
        "timeout_error" => Some(FailureClass::Timeout),
        _ => None,
    }
}

fn from_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["503", "unavailable", "high demand", "overloaded"]) {
        FailureClass::Overloaded
    } else if has(&["429", "resource_exhausted", "rate limit"]) {
        FailureClass::RateLimited
    } else if has(&["timed out"]) {
        FailureClass::Timeout
    } else if has(&["404", "not_found"]) {
        FailureClass::ModelNotFound
    } else if has(&["failed to deserialize", "no structured output"]) {
        FailureClass::Malformed
    } else if has(&["api key", "environment variable"]) {
        FailureClass::Fatal
    } else {
        FailureClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use veracity_common::Stage;

    fn msg(m: &str) -> GenerationError {
        GenerationError::new(m)
    }

    #[test]
    fn status_codes_map_to_classes() {
        let cases = [
            (503, FailureClass::Overloaded),
            (529, FailureClass::Overloaded),
            (500, FailureClass::Overloaded),
            (429, FailureClass::RateLimited),
            (401, FailureClass::Fatal),
            (403, FailureClass::Fatal),
            (404, FailureClass::ModelNotFound),
            (408, FailureClass::Timeout),
            (504, FailureClass::Timeout),
        ];
        for (status, expected) in cases {
            assert_eq!(classify(&msg("boom").with_status(status)), expected, "{status}");
        }
    }

    #[test]
    fn status_wins_over_message() {
        let err = msg("model is overloaded").with_status(401);
        assert_eq!(classify(&err), FailureClass::Fatal);
    }

    #[test]
    fn provider_kind_is_used_without_a_decisive_status() {
        let err = msg("please slow down").with_status(400).with_kind("rate_limit_error");
        assert_eq!(classify(&err), FailureClass::RateLimited);
    }

    #[test]
    fn message_fallback_recognizes_overload() {
        assert_eq!(classify(&msg("503 UNAVAILABLE")), FailureClass::Overloaded);
        assert_eq!(
            classify(&msg("The model is experiencing high demand")),
            FailureClass::Overloaded
        );
    }

    #[test]
    fn message_fallback_recognizes_rate_limits() {
        assert_eq!(classify(&msg("429 RESOURCE_EXHAUSTED")), FailureClass::RateLimited);
        assert_eq!(classify(&msg("Rate limit reached")), FailureClass::RateLimited);
    }

    #[test]
    fn message_fallback_recognizes_timeouts() {
        let err = GenerationError::timed_out(Stage::Audit, Duration::from_secs(90));
        assert_eq!(classify(&err), FailureClass::Timeout);
        assert_eq!(
            classify(&msg("Network error: request timed out: operation timed out")),
            FailureClass::Timeout
        );
    }

    #[test]
    fn message_fallback_recognizes_missing_models_and_bad_output() {
        assert_eq!(classify(&msg("model not_found")), FailureClass::ModelNotFound);
        assert_eq!(
            classify(&msg("Parse error: Failed to deserialize response: missing field")),
            FailureClass::Malformed
        );
        assert_eq!(
            classify(&msg("Parse error: No structured output in Claude response")),
            FailureClass::Malformed
        );
    }

    #[test]
    fn credential_problems_are_fatal() {
        assert_eq!(
            classify(&msg("ANTHROPIC_API_KEY environment variable not set")),
            FailureClass::Fatal
        );
        assert_eq!(classify(&msg("Anthropic API key is empty")), FailureClass::Fatal);
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(classify(&msg("something odd happened")), FailureClass::Unknown);
    }
}
