use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP response. `kind` is the provider's error type
    /// (e.g. `overloaded_error`) when the body carried one.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        kind: Option<String>,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl AiError {
    /// HTTP status reported by the backend, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider error type, e.g. `overloaded_error` or `rate_limit_error`.
    pub fn kind(&self) -> Option<&str> {
        match self {
            AiError::Api { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return AiError::Network(format!("request timed out: {e}"));
        }
        AiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}
