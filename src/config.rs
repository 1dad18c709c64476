//! Configuration types for extraction runs and reports.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The API key and model travel inside the
//! config and are handed to the extraction client when it is constructed;
//! nothing is read from or written to process environment variables.

use crate::error::CvSurveyError;
use crate::pipeline::extract::ExtractionService;
use crate::pipeline::loader::PageTextSource;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use cv_survey::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("AIza…")
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size, 3);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Credential for the built-in Gemini client.
    pub api_key: Option<String>,

    /// `edgequake-llm` provider name (e.g. "openai", "anthropic", "ollama").
    /// When set, the provider's own key variable is used instead of `api_key`.
    pub provider_name: Option<String>,

    /// Pre-constructed `edgequake-llm` provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extraction service. Takes precedence over everything else.
    pub service: Option<Arc<dyn ExtractionService>>,

    /// PDF text source. Default: pdfium.
    pub text_source: Option<Arc<dyn PageTextSource>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Kept low so categorical fields (college, degree) come back consistent.
    pub temperature: f32,

    /// Output token cap per call. Default: provider default.
    pub max_tokens: Option<usize>,

    /// Documents per extraction call. Default: 3.
    pub batch_size: usize,

    /// Total attempts per batch before it is dropped. Default: 3.
    pub max_attempts: u32,

    /// Linear backoff unit between batch attempts, in seconds. Default: 10.
    ///
    /// The wait before attempt `n + 1` is `retry_backoff_secs × n`.
    pub retry_backoff_secs: u64,

    /// Retries inside the extraction client for transient errors. Default: 2.
    pub service_retries: u32,

    /// Initial delay for the client's own retries, doubling each time. Default: 500.
    pub service_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: none.
    pub api_timeout_secs: Option<u64>,

    /// Gemini endpoint root. Default: [`DEFAULT_GEMINI_BASE_URL`].
    pub base_url: String,

    /// Custom system instruction. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            provider_name: None,
            provider: None,
            service: None,
            text_source: None,
            temperature: 0.2,
            max_tokens: None,
            batch_size: 3,
            max_attempts: 3,
            retry_backoff_secs: 10,
            service_retries: 2,
            service_backoff_ms: 500,
            api_timeout_secs: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("batch_size", &self.batch_size)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_secs", &self.retry_backoff_secs)
            .field("service_retries", &self.service_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
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

    pub fn service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn text_source(mut self, source: Arc<dyn PageTextSource>) -> Self {
        self.config.text_source = Some(source);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_secs(mut self, secs: u64) -> Self {
        self.config.retry_backoff_secs = secs;
        self
    }

    pub fn service_retries(mut self, n: u32) -> Self {
        self.config.service_retries = n;
        self
    }

    pub fn service_backoff_ms(mut self, ms: u64) -> Self {
        self.config.service_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, CvSurveyError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(CvSurveyError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(CvSurveyError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(CvSurveyError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(self.config)
    }
}

/// Report layout options.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Heading on the first content page. Default: "Survey Analysis Report".
    pub title: String,
    /// Large title on the cover page. Default: "CVS Survey Analysis".
    pub cover_title: String,
    /// Cover subtitle. Default: "Comprehensive Results".
    pub cover_subtitle: Option<String>,
    /// Rows shown in the data-sample table; 0 disables it. Default: 0.
    pub sample_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Survey Analysis Report".to_string(),
            cover_title: "CVS Survey Analysis".to_string(),
            cover_subtitle: Some("Comprehensive Results".to_string()),
            sample_rows: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_batch_policy() {
        let c = ExtractionConfig::default();
        assert_eq!(c.batch_size, 3);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_backoff_secs, 10);
        assert_eq!(c.service_retries, 2);
        assert_eq!(c.model, DEFAULT_MODEL);
        assert!((c.temperature - 0.2).abs() < f32::EPSILON);
        assert!(c.api_timeout_secs.is_none());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ExtractionConfig::builder().batch_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Batch size"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(ExtractionConfig::builder().max_attempts(0).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ExtractionConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }
}
