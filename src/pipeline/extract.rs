//! Extraction client: turn a block of CV text into candidate objects.
//!
//! Two implementations of [`ExtractionService`] ship with the crate:
//!
//! * [`GeminiExtractor`] calls the Gemini `generateContent` REST endpoint
//!   directly, with a `responseSchema` generated from the candidate schema so
//!   the model answers in the exact JSON shape.
//! * [`ProviderExtractor`] wraps any `edgequake-llm` provider. Those have no
//!   structured-output switch, so the JSON shape is spelled out in the prompt
//!   and code fences are stripped from the answer.
//!
//! ## Retry Strategy
//!
//! Both clients retry transient failures (HTTP 429/5xx, transport errors,
//! timeouts) on their own with exponential backoff
//! (`service_backoff_ms * 2^attempt`: 500 ms, 1 s with the defaults). This is
//! the inner loop; the batch orchestrator adds its own slower linear retry
//! around it. Client errors such as a rejected key fail immediately.

use crate::config::ExtractionConfig;
use crate::error::{CvSurveyError, ServiceError};
use crate::prompts::{json_output_instruction, DEFAULT_SYSTEM_PROMPT};
use crate::schema::{self, CANDIDATE_FIELDS};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw structured output of one extraction call.
///
/// Candidates are kept as JSON maps so a missing field stays observable
/// until flattening fills in its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub candidates: Vec<Map<String, Value>>,
}

impl ExtractionResponse {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Anything that can extract candidates from CV text.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Extract every candidate found in `text`.
    async fn extract(&self, text: &str) -> Result<ExtractionResponse, ServiceError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n?(.*?)\s*```\s*$").unwrap());

/// Strip a ```json … ``` wrapper, if present.
pub fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match RE_JSON_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Parse a model answer into an [`ExtractionResponse`].
///
/// Accepted shapes:
/// * `{"candidates": [ {...}, ... ]}`
/// * a bare array of candidate objects
/// * a single candidate object (at least one known field present)
///
/// Non-object array items are skipped.
pub fn parse_response(text: &str) -> Result<ExtractionResponse, ServiceError> {
    let body = strip_json_fences(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {e}")))?;

    match value {
        Value::Array(items) => Ok(collect_objects(items)),
        Value::Object(mut obj) => match obj.remove("candidates") {
            Some(Value::Array(items)) => Ok(collect_objects(items)),
            Some(Value::Null) => Ok(ExtractionResponse::default()),
            Some(other) => Err(ServiceError::MalformedResponse(format!(
                "'candidates' is not an array: {}",
                truncate(&other.to_string(), 80)
            ))),
            None if looks_like_candidate(&obj) => Ok(ExtractionResponse {
                candidates: vec![obj],
            }),
            None => Err(ServiceError::MalformedResponse(
                "object has no 'candidates' array".into(),
            )),
        },
        other => Err(ServiceError::MalformedResponse(format!(
            "expected an object or array, got: {}",
            truncate(&other.to_string(), 80)
        ))),
    }
}

fn collect_objects(items: Vec<Value>) -> ExtractionResponse {
    let total = items.len();
    let candidates: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .collect();
    if candidates.len() < total {
        debug!("Skipped {} non-object candidate entries", total - candidates.len());
    }
    ExtractionResponse { candidates }
}

fn looks_like_candidate(obj: &Map<String, Value>) -> bool {
    CANDIDATE_FIELDS
        .iter()
        .flat_map(|f| f.keys())
        .any(|k| obj.contains_key(k))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Run `call` until it succeeds, fails permanently, or `retries` extra
/// attempts are used up.
pub(crate) async fn with_transient_retry<F, Fut>(
    label: &str,
    retries: u32,
    backoff_ms: u64,
    mut call: F,
) -> Result<ExtractionResponse, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExtractionResponse, ServiceError>>,
{
    let mut last_err: Option<ServiceError> = None;

    for attempt in 0..=retries {
        if attempt > 0 {
            let backoff = backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!("{}: retry {}/{} after {}ms", label, attempt, retries, backoff);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }

        match call().await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() => {
                debug!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| ServiceError::Transport("no attempt was made".into())))
}

// ── Gemini ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Instruction<'a>,
    contents: Vec<Turn<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Instruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Gemini `generateContent` client with schema-constrained JSON output.
#[derive(Clone)]
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout_secs: Option<u64>,
    retries: u32,
    backoff_ms: u64,
}

impl std::fmt::Debug for GeminiExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiExtractor")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl GeminiExtractor {
    /// Build a client from the credential and model in `config`.
    pub fn new(config: &ExtractionConfig) -> Result<Self, CvSurveyError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CvSurveyError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "Pass the API key with --key (or GEMINI_API_KEY for the CLI), \
                       or call ExtractionConfigBuilder::api_key."
                    .to_string(),
            })?
            .to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| CvSurveyError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
            retries: config.service_retries,
            backoff_ms: config.service_backoff_ms,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body<'a>(&'a self, text: &'a str) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            system_instruction: Instruction {
                parts: vec![TextPart {
                    text: &self.system_prompt,
                }],
            },
            contents: vec![Turn {
                role: "user",
                parts: vec![TextPart { text }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
                response_schema: schema::response_schema(),
                max_output_tokens: self.max_tokens,
            },
        }
    }

    async fn call_once(&self, text: &str) -> Result<ExtractionResponse, ServiceError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status.as_u16() {
                401 | 403 => ServiceError::Auth(message),
                code => ServiceError::Http {
                    status: code,
                    message,
                },
            });
        }

        decode_generate_response(&body)
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout {
                secs: self.timeout_secs.unwrap_or(0),
            }
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Pull the answer text out of a `generateContent` body and parse it.
fn decode_generate_response(body: &str) -> Result<ExtractionResponse, ServiceError> {
    let decoded: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("unexpected response body: {e}")))?;

    if let Some(usage) = &decoded.usage_metadata {
        debug!(
            "Gemini: {} input tokens, {} output tokens",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }

    let Some(first) = decoded.candidates.first() else {
        let reason = decoded
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ServiceError::MalformedResponse(format!("empty answer: {reason}")));
    };

    let text: String = first
        .content
        .as_ref()
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::MalformedResponse(format!(
            "empty answer (finish reason: {})",
            first.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    parse_response(&text)
}

#[async_trait]
impl ExtractionService for GeminiExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResponse, ServiceError> {
        with_transient_retry("Gemini", self.retries, self.backoff_ms, || self.call_once(text)).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Extraction through any `edgequake-llm` chat provider.
pub struct ProviderExtractor {
    provider: Arc<dyn LLMProvider>,
    label: String,
    system_prompt: String,
    options: CompletionOptions,
    timeout_secs: Option<u64>,
    retries: u32,
    backoff_ms: u64,
}

impl ProviderExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        let base = config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        Self {
            provider,
            label: config
                .provider_name
                .clone()
                .unwrap_or_else(|| "provider".to_string()),
            system_prompt: format!("{base}{}", json_output_instruction()),
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
            retries: config.service_retries,
            backoff_ms: config.service_backoff_ms,
        }
    }

    fn messages(&self, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images(text, vec![]),
        ]
    }

    async fn call_once(&self, text: &str) -> Result<ExtractionResponse, ServiceError> {
        let messages = self.messages(text);
        let call = self.provider.chat(&messages, Some(&self.options));

        let response = match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| ServiceError::Timeout { secs })?,
            None => call.await,
        }
        .map_err(ServiceError::from)?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        parse_response(&response.content)
    }
}

#[async_trait]
impl ExtractionService for ProviderExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResponse, ServiceError> {
        with_transient_retry(&self.label, self.retries, self.backoff_ms, || self.call_once(text))
            .await
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_json_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_json_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_json_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn parses_candidates_object() {
        let r = parse_response(r#"{"candidates": [{"age": 30}, {"age": 41}]}"#).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.candidates[1]["age"], 41);
    }

    #[test]
    fn parses_bare_array_and_skips_non_objects() {
        let r = parse_response(r#"[{"university": "MIT"}, "noise", 3]"#).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn single_candidate_object_is_accepted() {
        let r = parse_response(r#"{"university": "MIT", "degrees": "PhD"}"#).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn rejects_unrelated_json() {
        assert!(matches!(
            parse_response(r#"{"answer": 42}"#),
            Err(ServiceError::MalformedResponse(_))
        ));
        assert!(parse_response("not json").is_err());
        assert!(parse_response(r#"{"candidates": "none"}"#).is_err());
    }

    #[test]
    fn null_candidates_is_empty() {
        assert!(parse_response(r#"{"candidates": null}"#).unwrap().is_empty());
    }

    #[test]
    fn decodes_generate_content_body() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "{\"candidates\": "}, {"text": "[{\"age\": 25}]}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 30}
        }"#;
        let r = decode_generate_response(body).unwrap();
        assert_eq!(r.candidates[0]["age"], 25);
    }

    #[test]
    fn blocked_prompt_is_malformed() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = decode_generate_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = ExtractionConfig::builder().build().unwrap();
        let err = GeminiExtractor::new(&config).unwrap_err();
        assert!(matches!(err, CvSurveyError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn request_body_carries_schema_and_temperature() {
        let config = ExtractionConfig::builder()
            .api_key("k")
            .base_url("http://localhost:9/")
            .build()
            .unwrap();
        let client = GeminiExtractor::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let body = serde_json::to_value(client.request_body("cv text")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "cv text");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["candidates"]["type"],
            "ARRAY"
        );
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("HR assistant"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_transient_retry("test", 2, 500, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::Http {
                        status: 503,
                        message: "busy".into(),
                    })
                } else {
                    Ok(ExtractionResponse::default())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = with_transient_retry("test", 2, 500, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::Auth("bad key".into())) }
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let result = with_transient_retry("test", 1, 500, || async {
            Err(ServiceError::Timeout { secs: 5 })
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Timeout { secs: 5 })));
    }
}
