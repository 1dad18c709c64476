//! Survey report: one chart section per table column.
//!
//! ## Layout
//!
//! ```text
//! page 1   cover ("CVS Survey Analysis" / "Comprehensive Results")
//! page 2   "Survey Analysis Report"
//!          [optional data sample table]
//!          <col> Distribution   intro   chart   "Figure n: …"
//!          …
//! ```
//!
//! Scalar columns get a histogram (7.5 × 3.5 in, two per page). List columns
//! get a ranked horizontal bar chart (7.5 × 10 in) of their most frequent
//! entries, starting on a fresh page when a single histogram is left on the
//! current one. A column that cannot be read as lists gets an inline error
//! paragraph instead of a chart.
//!
//! The cover is also written on its own as `title_page.pdf` next to the
//! report.

pub mod charts;
pub mod document;

use crate::config::ReportConfig;
use crate::error::CvSurveyError;
use crate::schema::{self, RenderMode};
use crate::table::{CandidateTable, Cell, Column};
use charts::Chart;
use document::{Cover, Element, ReportDocument, TableBlock};
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the standalone cover page.
pub const TITLE_PAGE_FILE: &str = "title_page.pdf";

/// What was written.
#[derive(Debug, Clone, Default)]
pub struct ReportSummary {
    pub report_path: PathBuf,
    pub title_page_path: PathBuf,
    pub histograms: usize,
    pub ranked_bars: usize,
    /// Columns whose chart was replaced by an error paragraph.
    pub failed_columns: Vec<String>,
}

/// Chart type for a column.
///
/// Schema columns use their declared mode. Other columns (from a foreign
/// CSV, say) are inferred by [`infer_render_mode`].
pub fn render_mode_for(column: &Column) -> RenderMode {
    match schema::field(&column.name) {
        Some(field) => field.render,
        None => infer_render_mode(column),
    }
}

/// Histogram for numeric columns and for columns whose last value is not a
/// bracketed list; ranked bars otherwise.
pub fn infer_render_mode(column: &Column) -> RenderMode {
    if column.is_numeric() {
        return RenderMode::Histogram;
    }
    match column.representative() {
        None | Some(Cell::Integer(_)) => RenderMode::Histogram,
        Some(Cell::Text(s)) if !s.starts_with('[') => RenderMode::Histogram,
        Some(Cell::Text(_)) | Some(Cell::List(_)) => RenderMode::RankedBar,
    }
}

/// Assemble the report content for `table`.
pub fn build_report<R: Rng + ?Sized>(
    table: &CandidateTable,
    config: &ReportConfig,
    rng: &mut R,
) -> (ReportDocument, ReportSummary) {
    let mut doc = ReportDocument::new(&config.title);
    let mut summary = ReportSummary::default();

    doc.set_cover(Cover {
        title: config.cover_title.clone(),
        subtitle: config.cover_subtitle.clone(),
    });
    doc.push(Element::Title(config.title.clone()));
    doc.push(Element::Spacer(0.1));

    if config.sample_rows > 0 {
        push_sample(&mut doc, table, config.sample_rows);
    }

    for (idx, column) in table.columns().iter().enumerate() {
        let mode = render_mode_for(column);

        // A ranked chart needs a full page; don't leave one histogram above it.
        if mode == RenderMode::RankedBar && summary.histograms % 2 != 0 {
            doc.push(Element::PageBreak);
        }

        doc.push(Element::Heading(format!("{} Distribution", column.name)));
        doc.push(Element::Paragraph(format!(
            "The chart below shows the distribution of responses across {}:",
            column.name
        )));
        let caption = format!("Figure {}: Distribution of responses by {}", idx + 1, column.name);

        match mode {
            RenderMode::Histogram => {
                doc.push(Element::Chart(Chart::histogram(column)));
                doc.push(Element::Caption(caption));
                doc.push(Element::Spacer(0.2));
                summary.histograms += 1;
                if summary.histograms % 2 == 0 {
                    doc.push(Element::PageBreak);
                }
            }
            RenderMode::RankedBar => match Chart::ranked_bar(column, rng) {
                Ok(chart) => {
                    doc.push(Element::Chart(chart));
                    doc.push(Element::Caption(caption));
                    doc.push(Element::Spacer(0.2));
                    summary.ranked_bars += 1;
                }
                Err(e) => {
                    warn!("Column '{}': {}", column.name, e);
                    doc.push(Element::Paragraph(format!(
                        "Could not chart '{}': {}",
                        column.name, e
                    )));
                    summary.failed_columns.push(column.name.clone());
                }
            },
        }
    }

    (doc, summary)
}

fn push_sample(doc: &mut ReportDocument, table: &CandidateTable, max_rows: usize) {
    let shown = table.row_count().min(max_rows);
    doc.push(Element::Heading("Data Sample".to_string()));
    doc.push(Element::Table(TableBlock {
        headers: table.column_names().iter().map(|s| s.to_string()).collect(),
        rows: (0..shown)
            .filter_map(|i| table.row(i))
            .map(|cells| cells.iter().map(|c| c.to_field()).collect())
            .collect(),
    }));
    if table.row_count() > max_rows {
        doc.push(Element::Paragraph(format!(
            "Note: Showing {} rows out of {} total rows.",
            max_rows,
            table.row_count()
        )));
    }
    doc.push(Element::Spacer(0.2));
}

/// Render the survey report for `table` to `output`.
///
/// Also writes the cover page alone to `title_page.pdf` in the same
/// directory. Both files are written atomically.
pub fn create_survey_report(
    table: &CandidateTable,
    output: &Path,
    config: &ReportConfig,
) -> Result<ReportSummary, CvSurveyError> {
    let (doc, mut summary) = build_report(table, config, &mut rand::thread_rng());

    let title_page = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(TITLE_PAGE_FILE);

    let render_err = |path: &Path, detail: String| CvSurveyError::ReportFailed {
        path: path.to_path_buf(),
        detail,
    };

    let cover_bytes = doc.render_cover().map_err(|e| render_err(&title_page, e))?;
    write_atomic(&title_page, &cover_bytes)?;

    let bytes = doc.render().map_err(|e| render_err(output, e))?;
    write_atomic(output, &bytes)?;

    info!(
        "Report saved to {} ({} histograms, {} ranked charts)",
        output.display(),
        summary.histograms,
        summary.ranked_bars
    );

    summary.report_path = output.to_path_buf();
    summary.title_page_path = title_page;
    Ok(summary)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CvSurveyError> {
    let write_err = |e: std::io::Error| CvSurveyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp = crate::output::temp_file_beside(path)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::ExtractionResponse;
    use crate::pipeline::flatten::flatten;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn text_column(name: &str, values: &[&str]) -> Column {
        Column {
            name: name.into(),
            cells: values.iter().map(|s| Cell::Text(s.to_string())).collect(),
        }
    }

    fn sample_table() -> CandidateTable {
        let response: ExtractionResponse = serde_json::from_value(json!({
            "candidates": [
                { "university": "MIT", "age": 24, "college": "Engineering", "gender": "Male",
                  "experience": 1, "department": "Security", "degree": "Bachelor's",
                  "skills": ["Python", "SQL"] },
                { "university": "Cairo University", "age": 31, "college": "Other", "gender": "Female",
                  "experience": 8, "department": "Information Systems", "degree": "PhD",
                  "skills": ["Go"] }
            ]
        }))
        .unwrap();
        flatten(&[response])
    }

    fn headings(doc: &ReportDocument) -> Vec<&str> {
        doc.elements()
            .iter()
            .filter_map(|e| match e {
                Element::Heading(h) => Some(h.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn last_value_decides_unknown_columns() {
        let lists = text_column("tools", &["Bachelor's", r#"["Python", "SQL"]"#]);
        assert_eq!(render_mode_for(&lists), RenderMode::RankedBar);

        let degrees = text_column("qualification", &[r#"["Python"]"#, "Bachelor's"]);
        assert_eq!(render_mode_for(&degrees), RenderMode::Histogram);
    }

    #[test]
    fn schema_columns_use_declared_mode() {
        // An empty skills column has no last value to inspect.
        let skills = Column::new("skills");
        assert_eq!(render_mode_for(&skills), RenderMode::RankedBar);
        assert_eq!(render_mode_for(&Column::new("age")), RenderMode::Histogram);
    }

    #[test]
    fn one_section_per_column_with_numbered_captions() {
        let table = sample_table();
        let (doc, summary) = build_report(&table, &ReportConfig::default(), &mut StdRng::seed_from_u64(1));

        assert_eq!(headings(&doc).len(), table.columns().len());
        assert_eq!(headings(&doc)[0], "university Distribution");
        assert_eq!(summary.histograms, 7);
        assert_eq!(summary.ranked_bars, 1);
        assert!(doc.elements().contains(&Element::Caption(
            "Figure 8: Distribution of responses by skills".into()
        )));
        assert!(doc.elements().contains(&Element::Paragraph(
            "The chart below shows the distribution of responses across age:".into()
        )));
        assert_eq!(doc.elements()[0], Element::Title("Survey Analysis Report".into()));
        assert_eq!(doc.cover().unwrap().title, "CVS Survey Analysis");
    }

    #[test]
    fn page_break_after_every_second_histogram() {
        let table = sample_table();
        let (doc, _) = build_report(&table, &ReportConfig::default(), &mut StdRng::seed_from_u64(1));

        // Seven histograms give three breaks after pairs, plus one before
        // the ranked chart because the seventh sits alone on its page.
        let breaks = doc
            .elements()
            .iter()
            .filter(|e| **e == Element::PageBreak)
            .count();
        assert_eq!(breaks, 4);

        let skills_heading = doc
            .elements()
            .iter()
            .position(|e| *e == Element::Heading("skills Distribution".into()))
            .unwrap();
        assert_eq!(doc.elements()[skills_heading - 1], Element::PageBreak);
    }

    #[test]
    fn unparsable_list_column_becomes_error_paragraph() {
        let table = CandidateTable::from_columns(vec![
            text_column("tools", &["not a list", r#"["Git"]"#]),
            text_column("city", &["Cairo", "Giza"]),
        ])
        .unwrap();
        let (doc, summary) = build_report(&table, &ReportConfig::default(), &mut StdRng::seed_from_u64(1));

        assert_eq!(summary.failed_columns, vec!["tools".to_string()]);
        assert_eq!(summary.histograms, 1);
        assert!(doc.elements().iter().any(|e| matches!(
            e,
            Element::Paragraph(p) if p.starts_with("Could not chart 'tools'")
        )));
        assert_eq!(headings(&doc), vec!["tools Distribution", "city Distribution"]);
    }

    #[test]
    fn sample_table_is_optional() {
        let table = sample_table();
        let config = ReportConfig {
            sample_rows: 1,
            ..ReportConfig::default()
        };
        let (doc, _) = build_report(&table, &config, &mut StdRng::seed_from_u64(1));
        let block = doc
            .elements()
            .iter()
            .find_map(|e| match e {
                Element::Table(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(block.rows.len(), 1);
        assert_eq!(block.headers.len(), 8);
        assert!(doc.elements().contains(&Element::Paragraph(
            "Note: Showing 1 rows out of 2 total rows.".into()
        )));
    }

    #[test]
    fn writes_report_and_title_page() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("csv_report.pdf");

        let summary = create_survey_report(&sample_table(), &output, &ReportConfig::default()).unwrap();

        assert!(std::fs::read(&output).unwrap().starts_with(b"%PDF"));
        assert_eq!(summary.title_page_path, dir.path().join(TITLE_PAGE_FILE));
        assert!(summary.title_page_path.exists());
    }
}
