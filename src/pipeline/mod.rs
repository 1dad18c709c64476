//! Pipeline stages for turning a directory of CVs into a candidate table.
//!
//! Each submodule implements exactly one step.
//!
//! ## Data Flow
//!
//! ```text
//! loader ──▶ batch ──▶ extract ──▶ flatten
//! (pdfium)   (groups   (LLM call)  (table with
//!             of 3)                 defaults)
//! ```
//!
//! 1. [`loader`] : list the PDFs and pull their text; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`batch`]  : group documents, call the service once per batch with
//!    linear backoff between attempts, drop batches that never succeed
//! 3. [`extract`]: the service itself; the only stage with network I/O
//! 4. [`flatten`]: merge all responses into one column-oriented table

pub mod batch;
pub mod extract;
pub mod flatten;
pub mod loader;
