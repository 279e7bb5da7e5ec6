//! The AI feedback call: instructions plus the stored resume image in,
//! raw response out.
//!
//! [`FeedbackService`] is the seam the pipeline depends on. It returns the
//! raw response untouched; interpreting its shape is
//! [`crate::pipeline::normalize`]'s job.
//!
//! [`VisionFeedbackService`] is the production implementation over
//! `edgequake-llm`. It is intentionally thin: prompt text lives in
//! [`crate::prompts`], so instructions change without touching retry or
//! error handling here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 2 retries waits
//! 500 ms → 1 s. These are transport retries of one call; the pipeline never
//! re-runs a stage.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use super::encode::image_data;
use crate::config::AnalysisConfig;
use crate::error::ResumeError;
use crate::store::BlobStore;

/// Model used when a provider is named but no model is.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-mini";

/// The AI collaborator.
///
/// `Ok(None)` (or a JSON `null`) means the service answered with nothing;
/// the pipeline reports that as an empty response. Errors, timeouts
/// included, are reported as service failures of the analysis stage.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn feedback(&self, image_ref: &str, instructions: &str)
        -> Result<Option<Value>, ResumeError>;
}

/// Sends the resume image to a vision-capable LLM.
pub struct VisionFeedbackService {
    provider: Arc<dyn LLMProvider>,
    images: Arc<dyn BlobStore>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl VisionFeedbackService {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        images: Arc<dyn BlobStore>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            provider,
            images,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(
        config: &AnalysisConfig,
        images: Arc<dyn BlobStore>,
    ) -> Result<Self, ResumeError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, images, config))
    }
}

#[async_trait]
impl FeedbackService for VisionFeedbackService {
    async fn feedback(
        &self,
        image_ref: &str,
        instructions: &str,
    ) -> Result<Option<Value>, ResumeError> {
        let png = self.images.read(image_ref).await?;
        debug!("Loaded {} ({} bytes) for analysis", image_ref, png.len());

        let messages = vec![ChatMessage::user_with_images(
            instructions,
            vec![image_data(&png)],
        )];

        let start = Instant::now();
        let mut last_err: Option<ResumeError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.retry_backoff_ms, attempt);
                warn!(
                    "Feedback call: retry {}/{} after {:?}",
                    attempt, self.max_retries, backoff
                );
                sleep(backoff).await;
            }

            match timeout(self.api_timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    info!(
                        prompt_tokens = response.prompt_tokens,
                        completion_tokens = response.completion_tokens,
                        "Feedback received in {:?}",
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(json!({
                        "message": {"role": "assistant", "content": response.content}
                    })));
                }
                Ok(Err(e)) => {
                    warn!("Feedback call: attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(ResumeError::LlmApiError {
                        retries: attempt,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "Feedback call: attempt {} timed out after {:?}",
                        attempt + 1,
                        self.api_timeout
                    );
                    last_err = Some(ResumeError::ApiTimeout {
                        secs: self.api_timeout.as_secs(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ResumeError::Internal("no feedback attempt was made".into())))
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))))
}

fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ResumeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ResumeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, most specific first:
///
/// 1. `config.provider`, a pre-built provider.
/// 2. `config.provider_name` + `config.model`.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI, when `OPENAI_API_KEY` is set.
/// 5. Whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, ResumeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ResumeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_from_config() {
        let config = AnalysisConfig::builder()
            .temperature(0.5)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.5));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(u64::MAX, 40), Duration::from_millis(u64::MAX));
    }
}
