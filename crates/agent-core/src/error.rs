//! Error Types

use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by LLM providers
#[derive(Error, Debug)]
pub enum AgentError {
    /// The provider answered with an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unreachable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider returned a response we could not interpret
    #[error("Parse error: {0}")]
    Parse(String),

    /// Missing or invalid provider configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited (HTTP 429 or equivalent)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_conversion_keeps_message() {
        let err: AgentError = anyhow::anyhow!("socket closed").into();
        assert!(matches!(err, AgentError::Other(ref msg) if msg == "socket closed"));
    }

    #[test]
    fn test_display_prefixes_kind() {
        assert_eq!(
            AgentError::RateLimited("429 Too Many Requests".into()).to_string(),
            "Rate limited: 429 Too Many Requests"
        );
    }
}
