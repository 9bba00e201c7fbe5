use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::VeracityError;

pub const DEFAULT_GENERATOR_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_AUDITOR_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_FALLBACK_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_WIKI_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // AI provider
    pub anthropic_api_key: String,
    pub anthropic_base_url: Option<String>,
    /// Research, deception, question writing, link ranking, primary section picking.
    pub generator_model: String,
    /// Blind audit and question validation.
    pub auditor_model: String,
    /// Section picking when the primary backend is overloaded.
    pub fallback_model: String,

    // Round limits
    pub max_round_attempts: u32,
    pub max_correction_attempts: u32,
    pub confidence_floor: f64,
    pub stage_timeout: Duration,
    pub round_timeout: Option<Duration>,

    // Content source
    pub wiki_api_url: String,
    pub wiki_user_agent: String,

    /// Record per-stage trace entries on quiz rounds.
    pub stage_log: bool,
}

impl Config {
    /// Defaults for everything except credentials.
    pub fn new(anthropic_api_key: impl Into<String>) -> Self {
        Self {
            anthropic_api_key: anthropic_api_key.into(),
            anthropic_base_url: None,
            generator_model: DEFAULT_GENERATOR_MODEL.to_string(),
            auditor_model: DEFAULT_AUDITOR_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            max_round_attempts: 3,
            max_correction_attempts: 3,
            confidence_floor: 0.8,
            stage_timeout: Duration::from_secs(90),
            round_timeout: None,
            wiki_api_url: DEFAULT_WIKI_API_URL.to_string(),
            wiki_user_agent: concat!("veracity/", env!("CARGO_PKG_VERSION")).to_string(),
            stage_log: false,
        }
    }

    /// Load configuration from environment variables.
    /// `ANTHROPIC_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, VeracityError> {
        let mut config = Self::new(required_env("ANTHROPIC_API_KEY")?);

        config.anthropic_base_url = env::var("ANTHROPIC_BASE_URL").ok();
        if let Ok(model) = env::var("GENERATOR_MODEL") {
            config.generator_model = model;
        }
        if let Ok(model) = env::var("AUDITOR_MODEL") {
            config.auditor_model = model;
        }
        if let Ok(model) = env::var("FALLBACK_MODEL") {
            config.fallback_model = model;
        }

        config.max_round_attempts = parsed_env("MAX_ROUND_ATTEMPTS", config.max_round_attempts)?;
        config.max_correction_attempts =
            parsed_env("MAX_CORRECTION_ATTEMPTS", config.max_correction_attempts)?;
        config.confidence_floor = parsed_env("CONFIDENCE_FLOOR", config.confidence_floor)?;
        config.stage_timeout = Duration::from_secs(parsed_env(
            "STAGE_TIMEOUT_SECS",
            config.stage_timeout.as_secs(),
        )?);
        config.round_timeout = match env::var("ROUND_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(parse_value("ROUND_TIMEOUT_SECS", &raw)?)),
            Err(_) => None,
        };

        if let Ok(url) = env::var("WIKI_API_URL") {
            config.wiki_api_url = url;
        }
        if let Ok(agent) = env::var("WIKI_USER_AGENT") {
            config.wiki_user_agent = agent;
        }
        config.stage_log = parsed_env("STAGE_LOG", config.stage_log)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VeracityError> {
        if self.max_round_attempts == 0 {
            return Err(VeracityError::Config("MAX_ROUND_ATTEMPTS must be at least 1".into()));
        }
        if self.max_correction_attempts == 0 {
            return Err(VeracityError::Config(
                "MAX_CORRECTION_ATTEMPTS must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(VeracityError::Config(
                "CONFIDENCE_FLOOR must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            generator_model = %self.generator_model,
            auditor_model = %self.auditor_model,
            fallback_model = %self.fallback_model,
            max_round_attempts = self.max_round_attempts,
            max_correction_attempts = self.max_correction_attempts,
            confidence_floor = self.confidence_floor,
            stage_timeout_secs = self.stage_timeout.as_secs(),
            round_timeout_secs = self.round_timeout.map(|d| d.as_secs()),
            wiki_api_url = %self.wiki_api_url,
            stage_log = self.stage_log,
            anthropic_api_key = if self.anthropic_api_key.is_empty() { "<unset>" } else { "<redacted>" },
            "Loaded configuration"
        );
    }
}

fn required_env(key: &str) -> Result<String, VeracityError> {
    env::var(key).map_err(|_| VeracityError::Config(format!("{key} environment variable is required")))
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, VeracityError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, VeracityError> {
    raw.trim()
        .parse()
        .map_err(|_| VeracityError::Config(format!("{key} has an invalid value: {raw}")))
}
