//! Document loading: find the PDFs in a directory and pull out their text.
//!
//! Only the top level of the directory is scanned. A file that cannot be
//! read does not stop the run: it is logged and replaced by a placeholder
//! text naming the file, so the number of documents always equals the number
//! of PDFs found.
//!
//! pdfium is not async-safe, so the whole scan runs inside
//! `tokio::task::spawn_blocking`.

use crate::error::{CvSurveyError, DocumentError};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of per-page text for one PDF file.
///
/// Implementations must release any document handle before returning,
/// whether or not extraction succeeded.
pub trait PageTextSource: Send + Sync {
    /// Text of every page, in page order.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, DocumentError>;
}

/// One loaded document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Extracted text, or the placeholder when `error` is set.
    pub text: String,
    pub error: Option<DocumentError>,
}

/// Text used in place of a document that could not be read.
pub fn placeholder_text(path: &Path) -> String {
    format!("Error processing document: {}", path.display())
}

/// List the PDF files directly inside `dir`, sorted by file name.
///
/// Matching is on the `.pdf` extension, case-insensitive. Subdirectories are
/// not descended into.
pub fn find_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, CvSurveyError> {
    if !dir.exists() {
        return Err(CvSurveyError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(CvSurveyError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let unreadable = |e: std::io::Error| CvSurveyError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every PDF in `dir` as text.
///
/// Returns an empty vector when the directory holds no PDFs.
pub async fn load_documents(
    dir: &Path,
    source: Arc<dyn PageTextSource>,
) -> Result<Vec<SourceDocument>, CvSurveyError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || load_documents_blocking(&dir, source.as_ref()))
        .await
        .map_err(|e| CvSurveyError::Internal(format!("Loader task panicked: {}", e)))?
}

/// Blocking implementation of document loading.
pub fn load_documents_blocking(
    dir: &Path,
    source: &dyn PageTextSource,
) -> Result<Vec<SourceDocument>, CvSurveyError> {
    info!("Reading PDF files from {}", dir.display());
    let files = find_pdf_files(dir)?;
    info!("Found {} PDF files in {}", files.len(), dir.display());

    let documents = files
        .into_iter()
        .map(|path| {
            debug!("Reading {}", path.display());
            match source.page_texts(&path) {
                Ok(pages) => SourceDocument {
                    text: pages.join("\n"),
                    path,
                    error: None,
                },
                Err(e) => {
                    warn!("Error reading {}: {}", path.display(), e);
                    SourceDocument {
                        text: placeholder_text(&path),
                        path,
                        error: Some(e),
                    }
                }
            }
        })
        .collect();

    Ok(documents)
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Reads page text through the pdfium library.
///
/// Library discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
///
/// The library is bound per file, so a missing pdfium surfaces as a
/// per-document error rather than aborting the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumTextSource;

impl PageTextSource for PdfiumTextSource {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, DocumentError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| DocumentError::Unreadable {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let mut texts = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| DocumentError::PageText {
                path: path.to_path_buf(),
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
            texts.push(text.all());
        }
        // `document` is dropped here on every path, closing the file.
        Ok(texts)
    }
}

fn bind_pdfium() -> Result<Pdfium, DocumentError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            DocumentError::PdfiumUnavailable(format!("Failed to load pdfium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        DocumentError::PdfiumUnavailable(format!(
            "pdfium library not found. Set PDFIUM_LIB_PATH or install pdfium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedText;

    impl PageTextSource for FixedText {
        fn page_texts(&self, path: &Path) -> Result<Vec<String>, DocumentError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with("broken") {
                return Err(DocumentError::Unreadable {
                    path: path.to_path_buf(),
                    detail: "bad xref".into(),
                });
            }
            Ok(vec![format!("{name} p1"), format!("{name} p2")])
        }
    }

    #[test]
    fn missing_directory_is_fatal() {
        let err = find_pdf_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CvSurveyError::DirectoryNotFound { .. }));
    }

    #[test]
    fn only_top_level_pdfs_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.pdf"), b"%PDF").unwrap();

        let names: Vec<String> = find_pdf_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn empty_directory_yields_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = load_documents_blocking(dir.path(), &FixedText).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn pages_are_joined_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cv.pdf"), b"%PDF").unwrap();
        let docs = load_documents_blocking(dir.path(), &FixedText).unwrap();
        assert_eq!(docs[0].text, "cv.pdf p1\ncv.pdf p2");
        assert!(docs[0].error.is_none());
    }

    #[test]
    fn unreadable_file_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"junk").unwrap();
        fs::write(dir.path().join("ok.pdf"), b"%PDF").unwrap();

        let docs = load_documents_blocking(dir.path(), &FixedText).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].text.starts_with("Error processing document: "));
        assert!(docs[0].text.contains("broken.pdf"));
        assert!(docs[0].error.is_some());
        assert_eq!(docs[1].text, "ok.pdf p1\nok.pdf p2");
    }
}
