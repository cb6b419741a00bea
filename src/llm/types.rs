//! Common types for LLM interactions.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Price/quality tier of the model a stage runs on.
///
/// Each stage picks a tier rather than a concrete model name; the provider
/// resolves the tier through its [`TierModels`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast, cheap model (validation, shareability).
    Cheap,
    /// Balanced model (hook generation, expansion).
    Mid,
    /// Highest quality model (voice transformation).
    Premium,
}

impl ModelTier {
    pub const ALL: [ModelTier; 3] = [ModelTier::Cheap, ModelTier::Mid, ModelTier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Mid => "mid",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cheap" => Some(Self::Cheap),
            "mid" => Some(Self::Mid),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

/// Concrete model names for each tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierModels {
    pub cheap: String,
    pub mid: String,
    pub premium: String,
}

impl TierModels {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::Mid => &self.mid,
            ModelTier::Premium => &self.premium,
        }
    }
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            cheap: "claude-3-5-haiku-latest".to_string(),
            mid: "claude-sonnet-4-5".to_string(),
            premium: "claude-opus-4-1".to_string(),
        }
    }
}

/// A single-turn prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Token usage for one or more completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Response from an LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text (all text blocks concatenated).
    pub text: String,
    /// Why the completion finished.
    pub finish_reason: FinishReason,
    /// Token usage reported by the provider.
    pub usage: TokenUsage,
}

/// Why an LLM completion finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of response.
    Stop,
    /// Hit the max token limit.
    MaxTokens,
}
