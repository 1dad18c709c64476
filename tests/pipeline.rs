//! End-to-end runs over a temporary directory with stubbed text and model.

use async_trait::async_trait;
use cv_survey::prompts::CV_DELIMITER;
use cv_survey::{
    create_survey_report, run, CandidateTable, Cell, DocumentError, ExtractionConfig,
    ExtractionResponse, ExtractionService, PageTextSource, ReportConfig, ServiceError,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Returns the file stem as the only page, or fails for `broken.pdf`.
struct StemText;

impl PageTextSource for StemText {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, DocumentError> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem == "broken" {
            return Err(DocumentError::Unreadable {
                path: path.to_path_buf(),
                detail: "not a pdf".into(),
            });
        }
        Ok(vec![format!("CV of {stem}"), "page two".to_string()])
    }
}

/// Answers calls from a queue and records every payload.
struct Scripted {
    answers: Mutex<VecDeque<Result<Value, ServiceError>>>,
    payloads: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(answers: Vec<Result<Value, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            payloads: Mutex::new(Vec::new()),
        })
    }

    fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for Scripted {
    async fn extract(&self, text: &str) -> Result<ExtractionResponse, ServiceError> {
        self.payloads.lock().unwrap().push(text.to_string());
        let next = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected extraction call");
        next.map(|v| serde_json::from_value(v).unwrap())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn cv_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }
    dir
}

fn config(service: Arc<Scripted>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .service(service)
        .text_source(Arc::new(StemText))
        .max_attempts(2)
        .retry_backoff_secs(0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn four_cvs_make_two_batches_and_three_rows() {
    let dir = cv_dir(&["a.pdf", "b.pdf", "c.PDF", "d.pdf", "notes.txt"]);
    let service = Scripted::new(vec![
        Ok(json!({"candidates": [
            {"university": "MIT", "age": 30, "skills": ["Rust", "SQL"]},
            {"university": "ETH", "experience": 4, "gender": "Female"}
        ]})),
        Ok(json!({"candidates": [{"degree": "PhD", "department": "Physics"}]})),
    ]);

    let output = run(dir.path(), &config(service.clone())).await.unwrap();

    let payloads = service.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(
        payloads[0],
        ["CV of a\npage two", "CV of b\npage two", "CV of c\npage two"].join(CV_DELIMITER)
    );
    assert_eq!(payloads[1], "CV of d\npage two");

    assert_eq!(output.stats.documents, 4);
    assert_eq!(output.stats.batches, 2);
    assert_eq!(output.stats.failed_batches, 0);
    assert_eq!(output.stats.candidates, 3);

    let records = output.table.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].university, "MIT");
    assert_eq!(records[0].skills, vec!["Rust", "SQL"]);
    assert_eq!(records[0].college, "Unknown");
    assert_eq!(records[1].experience, 4);
    assert_eq!(records[1].age, 0);
    assert_eq!(records[2].degree, "PhD");
    assert!(records[2].skills.is_empty());
}

#[tokio::test]
async fn unreadable_cv_is_sent_as_placeholder() {
    let dir = cv_dir(&["broken.pdf", "ok.pdf"]);
    let service = Scripted::new(vec![Ok(json!({"candidates": []}))]);

    let output = run(dir.path(), &config(service.clone())).await.unwrap();

    assert_eq!(output.stats.unreadable_documents, 1);
    let payload = &service.payloads()[0];
    assert!(payload.starts_with("Error processing document: "));
    assert!(payload.contains("broken.pdf"));
    assert!(payload.ends_with("CV of ok\npage two"));
    assert!(output.table.is_empty());
}

#[tokio::test]
async fn dropped_batch_keeps_the_others() {
    let dir = cv_dir(&["1.pdf", "2.pdf", "3.pdf", "4.pdf"]);
    let service = Scripted::new(vec![
        Err(ServiceError::Http {
            status: 503,
            message: "overloaded".into(),
        }),
        Err(ServiceError::MalformedResponse("not json".into())),
        Ok(json!({"candidates": [{"university": "Oxford"}]})),
    ]);

    let output = run(dir.path(), &config(service.clone())).await.unwrap();

    assert_eq!(service.payloads().len(), 3);
    assert_eq!(output.stats.failed_batches, 1);
    assert!(!output.batches[0].succeeded());
    assert_eq!(output.batches[0].attempts, 2);
    assert!(output.batches[1].succeeded());
    assert_eq!(output.table.row_count(), 1);
    assert_eq!(
        output.table.column("university").unwrap().cells[0],
        Cell::Text("Oxford".into())
    );
}

#[tokio::test]
async fn empty_directory_never_calls_the_service() {
    let dir = cv_dir(&["readme.md"]);
    let service = Scripted::new(Vec::new());

    let output = run(dir.path(), &config(service.clone())).await.unwrap();

    assert!(service.payloads().is_empty());
    assert_eq!(output.stats.documents, 0);
    assert!(output.table.is_empty());
}

#[tokio::test]
async fn csv_and_report_from_a_run() {
    let dir = cv_dir(&["a.pdf", "b.pdf"]);
    let service = Scripted::new(vec![Ok(json!({"candidates": [
        {"university": "MIT", "age": 30, "gender": "Male", "skills": ["Rust", "Go"]},
        {"university": "MIT", "age": 41, "gender": "Female", "skills": ["Rust"]}
    ]}))]);
    let output = run(dir.path(), &config(service)).await.unwrap();

    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("candidate_data.csv");
    output.table.write_csv(&csv_path).unwrap();

    let text = std::fs::read_to_string(&csv_path).unwrap();
    assert!(text.starts_with("university,age,college,gender,experience,department,degree,skills"));

    let reloaded = CandidateTable::read_csv(&csv_path).unwrap();
    assert_eq!(reloaded.records(), output.table.records());

    let report_path = out.path().join("csv_report.pdf");
    let summary = create_survey_report(&reloaded, &report_path, &ReportConfig::default()).unwrap();

    assert_eq!(summary.histograms + summary.ranked_bars, 8);
    assert!(summary.failed_columns.is_empty());
    assert!(std::fs::read(&report_path).unwrap().starts_with(b"%PDF"));
    assert!(out.path().join("title_page.pdf").exists());
}
