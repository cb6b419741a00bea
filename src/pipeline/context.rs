//! Shared execution context for pipeline stages.

use crate::llm::{
    CompletionOptions, CompletionRequest, CompletionResponse, LlmError, LlmProvider,
    ResponseParseError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("LLM call failed: {0}")]
    Llm(LlmError),

    #[error("{stage}: model response unparseable after {attempts} attempts: {source}")]
    Parse {
        stage: String,
        attempts: u32,
        #[source]
        source: ResponseParseError,
    },

    #[error("Pipeline cancelled")]
    Cancelled,
}

impl From<LlmError> for StageError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => StageError::Cancelled,
            other => StageError::Llm(other),
        }
    }
}

/// Handles every stage needs: the LLM, the run's cancellation token, the
/// per-call timeout and the pause between batches.
#[derive(Clone)]
pub struct StageContext {
    llm: Arc<dyn LlmProvider>,
    cancellation_token: CancellationToken,
    call_timeout: Duration,
    batch_delay: Duration,
    max_tokens: u32,
}

impl StageContext {
    pub fn new(llm: Arc<dyn LlmProvider>, cancellation_token: CancellationToken) -> Self {
        Self {
            llm,
            cancellation_token,
            call_timeout: Duration::from_secs(120),
            batch_delay: Duration::from_millis(500),
            max_tokens: 8192,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), StageError> {
        if self.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        Ok(())
    }

    /// Options for a call at `tier`/`temperature` with the context's limits applied.
    pub fn options(&self, tier: crate::llm::ModelTier, temperature: f32) -> CompletionOptions {
        CompletionOptions::new(tier, temperature)
            .with_max_tokens(self.max_tokens)
            .with_timeout(self.call_timeout)
    }

    /// Call the LLM, bounded by the call timeout and the cancellation token.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        if self.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        debug!(
            tier = options.tier.as_str(),
            temperature = options.temperature,
            model = self.llm.model_for(options.tier),
            "LLM call"
        );
        tokio::select! {
            _ = self.cancellation_token.cancelled() => Err(LlmError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, self.llm.complete(request, options)) => {
                match result {
                    Ok(response) => response,
                    Err(_) => Err(LlmError::Timeout),
                }
            }
        }
    }

    /// Sleep for `delay` unless the run is cancelled first.
    pub async fn sleep(&self, delay: Duration) -> Result<(), StageError> {
        if delay.is_zero() {
            return self.check_cancelled();
        }
        tokio::select! {
            _ = self.cancellation_token.cancelled() => Err(StageError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Rate-limit pause between consecutive batches of a stage.
    pub async fn pause_between_batches(&self) -> Result<(), StageError> {
        self.sleep(self.batch_delay).await
    }
}

/// Batch retry policy with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinishReason, ModelTier, TokenUsage};
    use async_trait::async_trait;

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        fn name(&self) -> &str {
            "slow"
        }

        fn model_for(&self, _tier: ModelTier) -> &str {
            "slow-model"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
            _options: &CompletionOptions,
        ) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CompletionResponse {
                text: "[]".to_string(),
                finish_reason: FinishReason::Stop,
                usage: TokenUsage::default(),
            })
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    #[test]
    fn test_retry_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_cancelled_llm_error_maps_to_stage_cancelled() {
        assert!(matches!(
            StageError::from(LlmError::Cancelled),
            StageError::Cancelled
        ));
        assert!(matches!(
            StageError::from(LlmError::Timeout),
            StageError::Llm(LlmError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let ctx = StageContext::new(Arc::new(SlowLlm), CancellationToken::new())
            .with_call_timeout(Duration::from_millis(20));
        let options = ctx.options(ModelTier::Cheap, 0.3);
        let result = ctx.complete(&CompletionRequest::new("hi"), &options).await;
        assert!(matches!(result, Err(LlmError::Timeout)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_call_and_sleep() {
        let token = CancellationToken::new();
        let ctx = StageContext::new(Arc::new(SlowLlm), token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let options = ctx.options(ModelTier::Cheap, 0.3);
        let result = ctx.complete(&CompletionRequest::new("hi"), &options).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert!(matches!(
            ctx.sleep(Duration::from_secs(30)).await,
            Err(StageError::Cancelled)
        ));
    }
}
