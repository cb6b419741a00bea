//! LLM provider abstraction layer.
//!
//! Stage services only ever see the [`LlmProvider`] trait. The concrete
//! backend is an Anthropic Messages API client; tests plug in scripted fakes.

mod anthropic;
mod json;
mod key_source;
mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use json::{parse_json_response, strip_code_fence, ResponseParseError};
pub use key_source::{ApiKeySource, KeySourceError};
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{CompletionRequest, CompletionResponse, FinishReason, ModelTier, TierModels, TokenUsage};
