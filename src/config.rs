//! Configuration types for resume analysis.
//!
//! Everything tunable lives in [`AnalysisConfig`], built via
//! [`AnalysisConfigBuilder`]. The render scale is not here: pages are always
//! rasterised at [`crate::pipeline::render::RENDER_SCALE`].

use crate::error::ResumeError;
use crate::progress::ProgressCallback;
use crate::record::DEFAULT_KEY_PREFIX;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for an [`crate::analyze::AnalysisPipeline`] and the vision
/// feedback service behind it.
///
/// # Example
/// ```rust
/// use edgequake_resume::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("gpt-4.1-mini")
///     .temperature(0.2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Scoring needs some judgement but the same resume should land on
    /// roughly the same scores run to run.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one analysis. Default: 4096.
    ///
    /// A full four-category document with tips and explanations is typically
    /// 1 500–2 500 tokens. A truncated response is unparseable JSON.
    pub max_tokens: usize,

    /// Transport-level retries inside the vision feedback service. Default: 2.
    ///
    /// These cover 429/5xx blips on a single call. The pipeline itself never
    /// retries a stage.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the vision model in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom instruction template; see [`crate::prompts::render_instructions`]
    /// for the placeholders. If None, uses the built-in template.
    pub instructions_template: Option<String>,

    /// Prefix of record keys (`<prefix>:<uuid>`). Default: "resume".
    pub key_prefix: String,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            instructions_template: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("instructions_template", &self.instructions_template.is_some())
            .field("key_prefix", &self.key_prefix)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instructions_template(mut self, template: impl Into<String>) -> Self {
        self.config.instructions_template = Some(template.into());
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ResumeError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ResumeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ResumeError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.key_prefix.is_empty() || c.key_prefix.contains(':') {
            return Err(ResumeError::InvalidConfig(format!(
                "key_prefix must be non-empty and must not contain ':', got {:?}",
                c.key_prefix
            )));
        }
        Ok(self.config)
    }
}
