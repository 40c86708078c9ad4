//! # agent-core
//!
//! Provider-agnostic LLM abstraction shared by the analysis pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     crypto-pipeline                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Analyze   │  │    Plan     │  │   LlmProvider       │  │
//! │  │    stage    │──│    stage    │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages only see the `LlmProvider` trait, so Ollama, OpenAI-compatible
//! endpoints or the scripted [`MockProvider`] can be swapped freely.

pub mod error;
pub mod message;
pub mod mock;
pub mod provider;

pub use error::{AgentError, Result};
pub use message::{Message, Role, Transcript};
pub use mock::MockProvider;
pub use provider::{Completion, GenerationOptions, LlmProvider};
