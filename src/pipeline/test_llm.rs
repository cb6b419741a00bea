//! Canned LLM replies for stage unit tests.

use super::context::StageContext;
use crate::llm::{
    CompletionOptions, CompletionRequest, CompletionResponse, FinishReason, LlmError,
    LlmProvider, ModelTier, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replies in queue order, one per call. Each reply reports 10 input and 5
/// output tokens.
pub(crate) struct CannedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    temperatures: Mutex<Vec<f32>>,
}

impl CannedLlm {
    pub(crate) fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            temperatures: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn temperatures(&self) -> Vec<f32> {
        self.temperatures.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for CannedLlm {
    fn name(&self) -> &str {
        "canned"
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        tier.as_str()
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        self.temperatures.lock().unwrap().push(options.temperature);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("no reply queued".to_string())));
        reply.map(|text| CompletionResponse {
            text,
            finish_reason: FinishReason::Stop,
            usage: TokenUsage::new(10, 5),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

pub(crate) fn stage_context(llm: Arc<CannedLlm>) -> StageContext {
    StageContext::new(llm, CancellationToken::new()).with_batch_delay(Duration::ZERO)
}
