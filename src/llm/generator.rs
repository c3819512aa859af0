//! Text-generation boundary used by the update pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::litellm::{GenerationRequest, LlmProvider, Message};
use crate::error::LlmError;

/// Turns a prompt into generated text.
///
/// Transport, authentication and retries belong to the implementation; the
/// pipeline only sees the text or the error.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// [`TextGenerator`] backed by an [`LlmProvider`].
pub struct LlmTextGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: String::new(),
            system_prompt: None,
            temperature: 0.2,
            max_tokens: 4000,
        }
    }

    /// Model to request; empty uses the provider's default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));

        let request = GenerationRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        debug!("Requesting generation ({} prompt bytes)", prompt.len());
        let response = self.provider.generate(request).await?;

        let text = response.first_content().unwrap_or_default().trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        info!(
            model = %response.model,
            completion_tokens = response.usage.completion_tokens,
            "Generation complete"
        );
        Ok(text.to_string())
    }
}
