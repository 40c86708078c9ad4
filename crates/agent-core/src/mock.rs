//! Mock LLM Provider
//!
//! Scripted provider for tests and offline runs. Replies are served from a
//! queue; once it drains, every call gets the default reply.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::{Completion, GenerationOptions, LlmProvider, ModelInfo};

/// A recorded prompt pair (system, user)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedPrompt {
    pub system: String,
    pub user: String,
}

enum Reply {
    Text(String),
    Fail(String),
}

/// Provider returning canned responses
pub struct MockProvider {
    script: Mutex<VecDeque<Reply>>,
    default_reply: Option<String>,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    /// Provider that answers every prompt with a short fixed analysis
    pub fn new() -> Self {
        Self::with_default_reply(
            "Market structure is neutral; wait for confirmation above resistance before adding exposure.",
        )
    }

    pub fn with_default_reply(reply: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose every call fails with a provider error
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    #[must_use]
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        lock(&self.script).push_back(Reply::Text(reply.into()));
        self
    }

    /// Queue a failure
    #[must_use]
    pub fn then_fail(self, error: impl Into<String>) -> Self {
        lock(&self.script).push_back(Reply::Fail(error.into()));
        self
    }

    /// All prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

fn join_role(messages: &[Message], role: Role) -> String {
    messages
        .iter()
        .filter(|m| m.role == role)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        lock(&self.prompts).push(RecordedPrompt {
            system: join_role(messages, Role::System),
            user: join_role(messages, Role::User),
        });

        let next = lock(&self.script).pop_front();
        match next {
            Some(Reply::Text(text)) => Ok(Completion::text(text, &options.model)),
            Some(Reply::Fail(error)) => Err(AgentError::Provider(error)),
            None => self
                .default_reply
                .as_ref()
                .map(|text| Completion::text(text.clone(), &options.model))
                .ok_or_else(|| AgentError::Provider("mock provider configured to fail".into())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "mock".into(),
            name: "mock".into(),
            context_length: None,
        }])
    }
}
