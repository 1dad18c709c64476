//! # cv-survey
//!
//! Turn a folder of PDF resumes into a candidate table and a chart report.
//!
//! Each CV's text is sent, three at a time, to a language model that pulls
//! out a fixed set of fields (university, age, college, gender, experience,
//! department, degree, skills). The answers are flattened into one table,
//! which can be saved as CSV and summarised as a PDF of histograms and
//! ranked bar charts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory
//!  │
//!  ├─ 1. Load     list *.pdf, extract text via pdfium (spawn_blocking)
//!  ├─ 2. Batch    groups of 3, joined with blank lines
//!  ├─ 3. Extract  Gemini structured output, or any edgequake-llm provider
//!  ├─ 4. Flatten  one row per candidate, defaults for missing fields
//!  └─ 5. Output   CSV + PDF report with a separate title page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cv_survey::{create_survey_report, run, ExtractionConfig, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let output = run("./cvs", &config).await?;
//!     output.table.write_csv("candidate_data.csv".as_ref())?;
//!     create_survey_report(&output.table, "csv_report.pdf".as_ref(), &ReportConfig::default())?;
//!     eprintln!("{} candidates, {} failed batches",
//!         output.stats.candidates,
//!         output.stats.failed_batches);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cv-survey` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cv-survey = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod run;
pub mod schema;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ReportConfig};
pub use error::{BatchError, CvSurveyError, DocumentError, ListParseError, ServiceError};
pub use output::{BatchResult, RunOutput, RunStats};
pub use pipeline::extract::{ExtractionResponse, ExtractionService, GeminiExtractor, ProviderExtractor};
pub use pipeline::loader::{PageTextSource, PdfiumTextSource};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{create_survey_report, ReportSummary};
pub use run::{resolve_service, run, run_sync};
pub use schema::{CandidateRecord, FieldKind, RenderMode};
pub use table::{CandidateTable, Cell, Column};
