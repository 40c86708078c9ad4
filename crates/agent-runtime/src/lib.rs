//! # agent-runtime
//!
//! Runtime LLM providers for the analysis pipeline.
//!
//! ## Providers
//!
//! - **Ollama** (default feature): local inference via Ollama
//! - **OpenAI**: any OpenAI-compatible chat-completions endpoint
//! - **Mock**: scripted replies from `agent-core`, for offline runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::provider_from_env;
//!
//! // LLM_PROVIDER=ollama | openai | mock
//! let provider = provider_from_env()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;

use std::sync::Arc;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, Completion, GenerationOptions, LlmProvider, Message, MockProvider, Result, Role,
};

/// Which backend to construct
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Mock,
}

impl ProviderKind {
    /// Parse a provider name (case-insensitive)
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            other => Err(AgentError::Config(format!("unknown LLM provider '{other}'"))),
        }
    }

    /// Model used when none is configured explicitly
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::OpenAi => "gpt-4-turbo-preview",
            Self::Mock => "mock",
        }
    }
}

/// Build the provider selected by `LLM_PROVIDER` (default: ollama)
pub fn provider_from_env() -> Result<(ProviderKind, Arc<dyn LlmProvider>)> {
    let kind = ProviderKind::parse(
        &std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".into()),
    )?;

    let provider: Arc<dyn LlmProvider> = match kind {
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_env()),
        #[cfg(not(feature = "ollama"))]
        ProviderKind::Ollama => {
            return Err(AgentError::Config(
                "agent-runtime was built without the `ollama` feature".into(),
            ));
        }
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(OpenAiConfig::from_env()?)?),
        ProviderKind::Mock => Arc::new(MockProvider::new()),
    };

    Ok((kind, provider))
}
