//! Error types for the cv-survey library.
//!
//! Failures fall into two groups:
//!
//! * [`CvSurveyError`]: **Fatal**: the run cannot proceed at all (source
//!   directory missing, provider not configured, output not writable).
//!   Returned as `Err(CvSurveyError)` from the top-level `run*` functions.
//!
//! * Non-fatal errors, scoped to one unit of work and recovered locally:
//!   - [`DocumentError`]: one PDF could not be read; a placeholder text is
//!     used instead.
//!   - [`ServiceError`]: one extraction call failed; retried by the service
//!     itself when transient, then by the batch orchestrator.
//!   - [`BatchError`]: one batch exhausted all attempts and was dropped.
//!     Stored inside [`crate::output::BatchResult`].
//!   - [`ListParseError`]: one report column could not be parsed; the
//!     section is replaced by an inline error paragraph.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cv-survey library.
#[derive(Debug, Error)]
pub enum CvSurveyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source directory does not exist.
    #[error("Source directory not found: '{path}'\nCheck the path exists and is readable.")]
    DirectoryNotFound { path: PathBuf },

    /// The source path exists but is a file.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// Listing the source directory failed.
    #[error("Failed to list '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// No extraction service could be built (missing API key etc.).
    #[error("Extraction provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV table could not be read or written.
    #[error("Invalid candidate table '{path}': {detail}")]
    TableFormat { path: PathBuf, detail: String },

    /// The PDF writer rejected the report.
    #[error("Failed to render report '{path}': {detail}")]
    ReportFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single PDF could not be turned into text.
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    /// The pdfium library could not be loaded.
    #[error("pdfium unavailable: {0}")]
    PdfiumUnavailable(String),

    /// pdfium refused to open the file.
    #[error("cannot open '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// A page's text layer could not be read.
    #[error("page {page} of '{path}': {detail}")]
    PageText {
        path: PathBuf,
        page: usize,
        detail: String,
    },
}

/// A single extraction call failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ServiceError {
    /// The API answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got a response (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The API rejected the credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The model answered, but not with the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An `edgequake-llm` provider returned an error that may clear up.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider refused the request itself (bad parameters, unknown
    /// model, unsupported feature). Resending it cannot succeed.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<edgequake_llm::LlmError> for ServiceError {
    fn from(err: edgequake_llm::LlmError) -> Self {
        use edgequake_llm::LlmError;
        match err {
            LlmError::AuthError(msg) => ServiceError::Auth(msg),
            LlmError::NetworkError(msg) => ServiceError::Transport(msg),
            err @ (LlmError::InvalidRequest(_)
            | LlmError::ModelNotFound(_)
            | LlmError::ConfigError(_)
            | LlmError::NotSupported(_)) => ServiceError::Rejected(err.to_string()),
            other => ServiceError::Provider(other.to_string()),
        }
    }
}

impl ServiceError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, server errors, transport failures and timeouts are
    /// transient. Client errors and authentication failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Transport(_) | ServiceError::Timeout { .. } => true,
            ServiceError::Provider(_) => true,
            ServiceError::Auth(_)
            | ServiceError::MalformedResponse(_)
            | ServiceError::Rejected(_) => false,
        }
    }
}

/// A batch was dropped after using every attempt.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    #[error("Batch {batch}: extraction failed after {attempts} attempts: {detail}")]
    Exhausted {
        batch: usize,
        attempts: u32,
        detail: String,
    },
}

/// A report cell could not be read as a list literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListParseError {
    #[error("row {row}: '{text}' is not a list literal")]
    NotAList { row: usize, text: String },

    #[error("row {row}: numeric value {value} cannot be read as a list")]
    Numeric { row: usize, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_display_names_batch_and_attempts() {
        let e = BatchError::Exhausted {
            batch: 2,
            attempts: 3,
            detail: "HTTP 503: overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Batch 2"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        let rate = ServiceError::Http {
            status: 429,
            message: "slow down".into(),
        };
        let server = ServiceError::Http {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(rate.is_transient());
        assert!(server.is_transient());
        assert!(ServiceError::Timeout { secs: 30 }.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let bad = ServiceError::Http {
            status: 400,
            message: "bad schema".into(),
        };
        assert!(!bad.is_transient());
        assert!(!ServiceError::Auth("invalid key".into()).is_transient());
        assert!(!ServiceError::MalformedResponse("not json".into()).is_transient());
    }

    #[test]
    fn provider_errors_keep_their_retry_class() {
        use edgequake_llm::LlmError;

        let auth = ServiceError::from(LlmError::AuthError("invalid_api_key".into()));
        assert!(matches!(auth, ServiceError::Auth(_)));
        assert!(!auth.is_transient());

        let bad = ServiceError::from(LlmError::InvalidRequest("unknown field".into()));
        assert!(matches!(bad, ServiceError::Rejected(_)));
        assert!(!bad.is_transient());
        assert!(!ServiceError::from(LlmError::ModelNotFound("gpt-9".into())).is_transient());

        assert!(ServiceError::from(LlmError::RateLimited("slow down".into())).is_transient());
        assert!(ServiceError::from(LlmError::NetworkError("reset".into())).is_transient());
        assert!(ServiceError::from(LlmError::Timeout).is_transient());
    }

    #[test]
    fn provider_not_configured_display() {
        let e = CvSurveyError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "Pass --key".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("--key"));
    }
}
