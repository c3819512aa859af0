//! LLM integration.
//!
//! [`TextGenerator`] is the seam the update pipeline depends on.
//! [`LlmTextGenerator`] implements it on top of any [`LlmProvider`], such as
//! the OpenAI-compatible [`LiteLlmClient`].
//!
//! ```ignore
//! use selfmod::llm::{LiteLlmClient, LlmTextGenerator, TextGenerator};
//! use std::sync::Arc;
//!
//! let client = Arc::new(LiteLlmClient::from_env()?);
//! let generator = LlmTextGenerator::new(client).with_temperature(0.2);
//! let text = generator.generate("Write a haiku about pipes").await?;
//! ```

pub mod generator;
pub mod litellm;

pub use generator::{LlmTextGenerator, TextGenerator};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
