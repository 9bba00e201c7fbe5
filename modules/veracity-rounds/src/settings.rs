use std::future::Future;
use std::time::Duration;

use veracity_common::{Config, RoundError};

/// Retry bounds, acceptance floor and deadlines shared by both controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSettings {
    /// Whole-sequence attempts for a deception round.
    pub max_round_attempts: u32,
    /// Generate-then-validate attempts for a quiz question.
    pub max_correction_attempts: u32,
    /// Minimum judge confidence for acceptance.
    pub confidence_floor: f64,
    pub stage_timeout: Duration,
    pub round_timeout: Option<Duration>,
    pub stage_log: bool,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self::from(&Config::new(String::new()))
    }
}

impl From<&Config> for RoundSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_round_attempts: config.max_round_attempts,
            max_correction_attempts: config.max_correction_attempts,
            confidence_floor: config.confidence_floor,
            stage_timeout: config.stage_timeout,
            round_timeout: config.round_timeout,
            stage_log: config.stage_log,
        }
    }
}

/// Await a whole round under the optional deadline.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, round: F) -> Result<T, RoundError>
where
    F: Future<Output = Result<T, RoundError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, round)
            .await
            .unwrap_or(Err(RoundError::DeadlineExceeded(limit))),
        None => round.await,
    }
}
