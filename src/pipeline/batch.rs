//! Batch orchestration: group documents, call the service, retry slowly.
//!
//! Batches are processed strictly in order, one call at a time. A failed
//! batch is retried up to `max_attempts` times in total with a linear wait
//! of `retry_backoff_secs × n` before attempt `n + 1` (10 s, then 20 s with
//! the defaults). A batch that fails every attempt is dropped: it is logged,
//! recorded in its [`BatchResult`], and the run moves on.

use crate::config::ExtractionConfig;
use crate::error::BatchError;
use crate::output::BatchResult;
use crate::pipeline::extract::{ExtractionResponse, ExtractionService};
use crate::prompts::CV_DELIMITER;
use std::ops::Range;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Split `len` items into contiguous ranges of at most `batch_size`.
///
/// Batch `i` covers `[i × batch_size, (i + 1) × batch_size)`, clipped to `len`.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Concatenate document texts into one request payload.
pub fn join_batch(texts: &[String]) -> String {
    texts.join(CV_DELIMITER)
}

/// Drive the extraction service over every batch of `texts`.
///
/// Returns one [`BatchResult`] per batch, in batch order. Never fails: a
/// batch that cannot be extracted is reported through its `error` field.
pub async fn process_batches(
    service: &dyn ExtractionService,
    texts: &[String],
    config: &ExtractionConfig,
) -> Vec<BatchResult> {
    let ranges = partition(texts.len(), config.batch_size);
    let total = ranges.len();
    let cb = config.progress_callback.as_ref();

    info!(
        "Processing {} documents in {} batches of up to {} via {}",
        texts.len(),
        total,
        config.batch_size,
        service.name()
    );
    if let Some(cb) = cb {
        cb.on_run_start(total, texts.len());
    }

    let mut results = Vec::with_capacity(total);
    for (idx, range) in ranges.into_iter().enumerate() {
        let batch_num = idx + 1;
        info!("Processing batch {}/{}", batch_num, total);
        if let Some(cb) = cb {
            cb.on_batch_start(batch_num, total, range.len());
        }

        let payload = join_batch(&texts[range.clone()]);
        let result = process_one(service, batch_num, range, &payload, config).await;

        if let Some(cb) = cb {
            match &result.error {
                None => cb.on_batch_complete(batch_num, total, result.candidates),
                Some(e) => cb.on_batch_dropped(batch_num, total, &e.to_string()),
            }
        }
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    info!("Batches complete: {}/{} succeeded", succeeded, total);
    if let Some(cb) = cb {
        cb.on_run_complete(total, succeeded);
    }

    results
}

async fn process_one(
    service: &dyn ExtractionService,
    batch_num: usize,
    documents: Range<usize>,
    payload: &str,
    config: &ExtractionConfig,
) -> BatchResult {
    let start = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        match service.extract(payload).await {
            Ok(response) => {
                debug!(
                    "Batch {}: {} candidates on attempt {}",
                    batch_num,
                    response.len(),
                    attempt
                );
                return BatchResult {
                    batch_num,
                    documents,
                    attempts: attempt,
                    candidates: response.len(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    response: Some(response),
                    error: None,
                };
            }
            Err(e) => {
                last_err = e.to_string();
                if attempt < max_attempts {
                    let delay = config.retry_backoff_secs.saturating_mul(attempt as u64);
                    warn!(
                        "Batch {}: attempt {}/{} failed ({}), retrying in {}s",
                        batch_num, attempt, max_attempts, last_err, delay
                    );
                    if let Some(cb) = config.progress_callback.as_ref() {
                        cb.on_batch_retry(batch_num, attempt, delay, &last_err);
                    }
                    sleep(Duration::from_secs(delay)).await;
                }
            }
        }
    }

    let err = BatchError::Exhausted {
        batch: batch_num,
        attempts: max_attempts,
        detail: last_err,
    };
    error!("{}", err);

    BatchResult {
        batch_num,
        documents,
        attempts: max_attempts,
        candidates: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        response: None,
        error: Some(err),
    }
}

/// Responses of the batches that succeeded, in batch order.
pub fn successful_responses(results: &[BatchResult]) -> Vec<ExtractionResponse> {
    results.iter().filter_map(|r| r.response.clone()).collect()
}
