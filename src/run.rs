//! Top-level entry points: directory of CVs in, candidate table out.

use crate::config::ExtractionConfig;
use crate::error::CvSurveyError;
use crate::output::{RunOutput, RunStats};
use crate::pipeline::batch::{process_batches, successful_responses};
use crate::pipeline::extract::{ExtractionService, GeminiExtractor, ProviderExtractor};
use crate::pipeline::flatten::flatten;
use crate::pipeline::loader::{self, PageTextSource, PdfiumTextSource};
use crate::table::CandidateTable;
use edgequake_llm::ProviderFactory;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Process every PDF in `dir` and return the flattened candidate table.
///
/// Documents are read, sent to the extraction service in batches, and
/// merged into one table. Batches that keep failing are dropped, so a
/// partial table is still a success; inspect [`RunOutput::batches`] for
/// the failures.
///
/// A directory with no PDFs returns an empty table without contacting the
/// extraction service.
///
/// # Example
/// ```rust,no_run
/// use cv_survey::{run, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().api_key("AIza…").build()?;
/// let output = run("./cvs", &config).await?;
/// output.table.write_csv("candidate_data.csv".as_ref())?;
/// # Ok(())
/// # }
/// ```
pub async fn run(dir: impl AsRef<Path>, config: &ExtractionConfig) -> Result<RunOutput, CvSurveyError> {
    let total_start = Instant::now();
    let dir = dir.as_ref();

    // ── 1. Load ──────────────────────────────────────────────────────────
    let source: Arc<dyn PageTextSource> = config
        .text_source
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumTextSource));
    let load_start = Instant::now();
    let documents = loader::load_documents(dir, source).await?;
    let load_duration_ms = load_start.elapsed().as_millis() as u64;

    let unreadable = documents.iter().filter(|d| d.error.is_some()).count();
    if unreadable > 0 {
        warn!("{} of {} documents could not be read", unreadable, documents.len());
    }

    if documents.is_empty() {
        info!("No PDF files found in {}", dir.display());
        return Ok(RunOutput {
            table: CandidateTable::empty(),
            batches: Vec::new(),
            stats: RunStats {
                load_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
                ..RunStats::default()
            },
        });
    }

    // ── 2. Extract ───────────────────────────────────────────────────────
    let service = resolve_service(config)?;
    let texts: Vec<String> = documents.into_iter().map(|d| d.text).collect();

    let extraction_start = Instant::now();
    let batches = process_batches(service.as_ref(), &texts, config).await;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    // ── 3. Flatten ───────────────────────────────────────────────────────
    let table = flatten(&successful_responses(&batches));

    let stats = RunStats {
        documents: texts.len(),
        unreadable_documents: unreadable,
        batches: batches.len(),
        failed_batches: batches.iter().filter(|b| !b.succeeded()).count(),
        candidates: table.row_count(),
        load_duration_ms,
        extraction_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {} candidates from {} documents ({}/{} batches failed), {}ms total",
        stats.candidates, stats.documents, stats.failed_batches, stats.batches, stats.total_duration_ms
    );

    Ok(RunOutput {
        table,
        batches,
        stats,
    })
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(dir: impl AsRef<Path>, config: &ExtractionConfig) -> Result<RunOutput, CvSurveyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CvSurveyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(dir, config))
}

/// Pick the extraction service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped in a
///    [`ProviderExtractor`].
/// 3. **Named provider** (`config.provider_name`): created through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    own key variable.
/// 4. **Gemini** with the explicit `config.api_key`.
pub fn resolve_service(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionService>, CvSurveyError> {
    if let Some(service) = &config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(provider) = &config.provider {
        return Ok(Arc::new(ProviderExtractor::new(Arc::clone(provider), config)));
    }

    if let Some(name) = &config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            CvSurveyError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(ProviderExtractor::new(provider, config)));
    }

    Ok(Arc::new(GeminiExtractor::new(config)?))
}
