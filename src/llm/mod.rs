//! LLM provider integration.
//!
//! Two interchangeable backends sit behind `LlmProvider`:
//! - **Gemini** via the native `streamGenerateContent` SSE API (default)
//! - **OpenAI** via `/v1/chat/completions` streaming
//!
//! Selection is key-driven: Gemini when `GEMINI_API_KEY` is set, otherwise
//! OpenAI.

mod gemini;
mod openai;
mod provider;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{
    ChatMessage, LlmProvider, Role, StreamChunk, ToolCall, ToolDefinition, TurnRequest,
};

use std::sync::Arc;

use crate::config::{LlmConfig, LlmProviderType};
use crate::error::LlmError;

/// Create the configured LLM provider.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider {
        LlmProviderType::Gemini => {
            tracing::info!(model = %config.gemini.model, "Using Gemini provider");
            Ok(Arc::new(GeminiProvider::new(config.gemini.clone())?))
        }
        LlmProviderType::OpenAi => {
            tracing::info!(model = %config.openai.model, "Using OpenAI provider");
            Ok(Arc::new(OpenAiProvider::new(config.openai.clone())?))
        }
    }
}
