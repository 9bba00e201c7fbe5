use thiserror::Error;

pub type Result<T> = std::result::Result<T, WikiError>;

#[derive(Debug, Clone, Error)]
pub enum WikiError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("'{title}' is a disambiguation page ({} candidates)", candidates.len())]
    Disambiguation {
        title: String,
        candidates: Vec<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl WikiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WikiError::NotFound(_) | WikiError::Disambiguation { .. })
    }
}

impl From<reqwest::Error> for WikiError {
    fn from(err: reqwest::Error) -> Self {
        WikiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for WikiError {
    fn from(err: serde_json::Error) -> Self {
        WikiError::Parse(err.to_string())
    }
}
