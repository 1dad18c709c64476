//! Result types returned by a run.

use crate::error::{BatchError, CvSurveyError};
use crate::pipeline::extract::ExtractionResponse;
use crate::table::CandidateTable;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tempfile::NamedTempFile;

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The flattened candidates, one row per extracted person.
    pub table: CandidateTable,
    /// Per-batch outcomes, in batch order.
    pub batches: Vec<BatchResult>,
    pub stats: RunStats,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// 1-indexed batch number.
    pub batch_num: usize,
    /// Indices of the documents sent in this batch.
    pub documents: Range<usize>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Candidates in the response; 0 for a dropped batch.
    pub candidates: usize,
    pub duration_ms: u64,
    pub response: Option<ExtractionResponse>,
    /// Set when every attempt failed.
    pub error: Option<BatchError>,
}

impl BatchResult {
    pub fn succeeded(&self) -> bool {
        self.response.is_some()
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// PDFs found, readable or not.
    pub documents: usize,
    /// PDFs replaced by a placeholder text.
    pub unreadable_documents: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Rows in the final table.
    pub candidates: usize,
    pub load_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Create a temp file in the directory that will hold `path`.
///
/// Persisting it over `path` is then a same-filesystem rename.
pub(crate) fn temp_file_beside(path: &Path) -> Result<NamedTempFile, CvSurveyError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| CvSurveyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    NamedTempFile::new_in(parent).map_err(|e| CvSurveyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_lands_in_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("report.pdf");
        let tmp = temp_file_beside(&target).unwrap();
        assert_eq!(tmp.path().parent(), target.parent());
    }

    #[test]
    fn dropped_batch_is_not_successful() {
        let r = BatchResult {
            batch_num: 2,
            documents: 3..4,
            attempts: 3,
            candidates: 0,
            duration_ms: 0,
            response: None,
            error: Some(BatchError::Exhausted {
                batch: 2,
                attempts: 3,
                detail: "HTTP 503".into(),
            }),
        };
        assert!(!r.succeeded());
    }
}
