//! Error Types for the Pipeline

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid cryptocurrency symbol: {0}")]
    UnknownSymbol(String),

    #[error("Rate limited (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Insufficient data for {indicator}: need {needed} points, have {available}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{0}")]
    Precondition(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] AgentError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error signals rate limiting.
    ///
    /// Besides the typed variants, any error whose text carries `429` or
    /// `Rate Limit` counts.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Collaborator(AgentError::RateLimited(_)) => true,
            Self::Transport { status: 429, .. } => true,
            other => {
                let text = other.to_string();
                text.contains("429") || text.contains("Rate Limit")
            }
        }
    }

    /// Short machine-readable kind, recorded in stage metadata on failure
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSymbol(_) => "UnknownSymbolError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::Transport { .. } | Self::Network(_) => "TransportError",
            Self::InsufficientData { .. } => "InsufficientDataError",
            Self::Precondition(_) => "PreconditionError",
            Self::Collaborator(_) => "CollaboratorError",
            Self::InvalidRequest(_) => "InvalidRequestError",
            Self::Config(_) => "ConfigError",
            Self::Storage(_) => "StorageError",
            Self::Serialization(_) => "SerializationError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(
            PipelineError::RateLimited {
                status: 429,
                body: String::new()
            }
            .is_rate_limited()
        );
        assert!(PipelineError::Collaborator(AgentError::RateLimited("slow".into())).is_rate_limited());
        assert!(
            PipelineError::Collaborator(AgentError::Provider("Rate Limit exceeded".into()))
                .is_rate_limited()
        );
        assert!(
            !PipelineError::Transport {
                status: 500,
                body: "oops".into()
            }
            .is_rate_limited()
        );
        assert!(!PipelineError::UnknownSymbol("FAKE".into()).is_rate_limited());
    }

    #[test]
    fn test_unknown_symbol_message_names_symbol() {
        let err = PipelineError::UnknownSymbol("FAKE".into());
        assert!(err.to_string().contains("FAKE"));
        assert_eq!(err.kind(), "UnknownSymbolError");
    }
}
