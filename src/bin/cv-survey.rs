//! CLI binary for cv-survey.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `ReportConfig` and writes the output files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cv_survey::{
    create_survey_report, run, BatchProgressCallback, CandidateTable, ExtractionConfig,
    ProgressCallback, ReportConfig, RunOutput,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while PDFs are read, then a bar
/// that advances once per batch with a log line for each outcome.
struct CliProgressCallback {
    bar: ProgressBar,
    candidates: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            candidates: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    /// Remove the spinner when the run ended before any batch event.
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

fn shorten(msg: &str, max: usize) -> String {
    match msg.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &msg[..idx]),
        None => msg.to_string(),
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_batches: usize, total_documents: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Extracting {total_documents} CVs in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch: usize, _total: usize, documents: usize) {
        self.bar
            .set_message(format!("batch {batch} ({documents} CVs)"));
    }

    fn on_batch_retry(&self, batch: usize, attempt: u32, delay_secs: u64, error: &str) {
        self.bar.println(format!(
            "  {} Batch {:>3}  attempt {} failed: {}  {}",
            yellow("↻"),
            batch,
            attempt,
            shorten(error, 80),
            dim(&format!("retrying in {delay_secs}s")),
        ));
    }

    fn on_batch_complete(&self, batch: usize, total: usize, candidates: usize) {
        self.candidates.fetch_add(candidates, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            green("✓"),
            batch,
            total,
            dim(&format!("{candidates} candidates")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_dropped(&self, batch: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            red("✗"),
            batch,
            total,
            red(&shorten(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_batches: usize, succeeded: usize) {
        let failed = total_batches.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        let candidates = self.candidates.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} candidates extracted from {} batches",
                green("✔"),
                bold(&candidates.to_string()),
                total_batches
            );
        } else {
            eprintln!(
                "{} {} candidates extracted  ({}/{} batches dropped)",
                if failed == total_batches {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&candidates.to_string()),
                red(&failed.to_string()),
                total_batches,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every CV in ./cvs, write candidate_data.csv and csv_report.pdf
  cv-survey process ./cvs --key $GEMINI_API_KEY

  # Custom output names, no CSV
  cv-survey process ./cvs --output survey.pdf --save_csv false

  # Use another edgequake-llm provider (reads its own key variable)
  cv-survey process ./cvs --provider openai --model gpt-4.1-mini

  # Re-render the report from an earlier export
  cv-survey report candidate_data.csv --output csv_report.pdf --sample-rows 10

OUTPUT FILES:
  candidate_data.csv   one row per candidate; skills as ["A", "B"]
  csv_report.pdf       cover, then one chart section per column
  title_page.pdf       the cover page alone, next to the report

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY       Default for --key
  PDFIUM_LIB_PATH      Path to the pdfium shared library
  RUST_LOG             Override log filtering (e.g. cv_survey=debug)
"#;

/// Extract structured candidate data from PDF resumes and chart it.
#[derive(Parser, Debug)]
#[command(
    name = "cv-survey",
    version,
    about = "Extract candidate data from PDF resumes and build a survey report",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CV_SURVEY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CV_SURVEY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract candidates from every PDF in a directory.
    Process(ProcessArgs),
    /// Build the PDF report from a previously exported CSV.
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Directory holding the PDF resumes.
    path: PathBuf,

    /// Report file.
    #[arg(long, default_value = "csv_report.pdf")]
    output: PathBuf,

    /// CSV file for the candidate table.
    #[arg(long = "output_csv", default_value = "candidate_data.csv")]
    output_csv: PathBuf,

    /// Gemini API key.
    #[arg(
        long,
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        required_unless_present = "provider"
    )]
    key: Option<String>,

    /// Model ID.
    #[arg(long, default_value = cv_survey::config::DEFAULT_MODEL)]
    model: String,

    /// Write the CSV file. `--save_csv false` disables it.
    #[arg(
        long = "save_csv",
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    save_csv: bool,

    /// Use an edgequake-llm provider (openai, anthropic, ollama, …) instead
    /// of the built-in Gemini client.
    #[arg(
        long,
        long_help = "Use an edgequake-llm provider instead of the built-in Gemini client.\n\
          The provider reads its own key variable (OPENAI_API_KEY, ANTHROPIC_API_KEY, …)."
    )]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// CVs per extraction call.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Attempts per batch before it is dropped.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Seconds between batch attempts (multiplied by the attempt number).
    #[arg(long, default_value_t = 10)]
    retry_backoff: u64,

    /// Per-call timeout in seconds.
    #[arg(long)]
    api_timeout: Option<u64>,

    /// Path to a text file containing a custom system instruction.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Rows of the candidate table to show at the top of the report.
    #[arg(long, default_value_t = 0)]
    sample_rows: usize,

    /// Skip the PDF report.
    #[arg(long)]
    no_report: bool,

    /// Disable progress bar.
    #[arg(long, env = "CV_SURVEY_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// CSV exported by `cv-survey process`.
    csv: PathBuf,

    /// Report file.
    #[arg(long, default_value = "csv_report.pdf")]
    output: PathBuf,

    /// Rows of the table to show at the top of the report.
    #[arg(long, default_value_t = 0)]
    sample_rows: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is drawn.
    let show_progress = match &cli.command {
        Command::Process(args) => !cli.quiet && !args.no_progress,
        Command::Report(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Process(args) => process(args, cli.quiet, show_progress).await,
        Command::Report(args) => report(args, cli.quiet),
    }
}

async fn process(args: &ProcessArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let cli_cb = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_cb
        .clone()
        .map(|cb| cb as Arc<dyn BatchProgressCallback>);

    let result = extract(args, progress_cb).await;
    if let Some(cb) = &cli_cb {
        cb.clear();
    }
    let output = result?;

    if output.stats.documents == 0 {
        if !quiet {
            eprintln!(
                "{} No PDF files found in {}",
                cyan("⚠"),
                bold(&args.path.display().to_string())
            );
        }
        return Ok(());
    }

    if args.save_csv {
        output
            .table
            .write_csv(&args.output_csv)
            .context("Failed to write CSV")?;
        if !quiet {
            eprintln!(
                "{}  {} rows  →  {}",
                green("✔"),
                output.table.row_count(),
                bold(&args.output_csv.display().to_string())
            );
        }
    }

    if !args.no_report {
        if output.table.is_empty() {
            eprintln!("{} No candidates extracted; report skipped", cyan("⚠"));
        } else {
            write_report(&output.table, &args.output, args.sample_rows, quiet)?;
        }
    }

    if !quiet {
        eprintln!(
            "   {} documents  /  {} unreadable  ({}ms total)",
            dim(&output.stats.documents.to_string()),
            dim(&output.stats.unreadable_documents.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

async fn extract(args: &ProcessArgs, progress: Option<ProgressCallback>) -> Result<RunOutput> {
    let config = build_config(args, progress).await?;
    run(&args.path, &config)
        .await
        .with_context(|| format!("Failed to process {}", args.path.display()))
}

fn report(args: &ReportArgs, quiet: bool) -> Result<()> {
    let table = CandidateTable::read_csv(&args.csv)
        .with_context(|| format!("Failed to read {}", args.csv.display()))?;
    if table.is_empty() {
        anyhow::bail!("{} has no rows", args.csv.display());
    }
    write_report(&table, &args.output, args.sample_rows, quiet)
}

fn write_report(table: &CandidateTable, output: &Path, sample_rows: usize, quiet: bool) -> Result<()> {
    let config = ReportConfig {
        sample_rows,
        ..ReportConfig::default()
    };
    let summary = tokio::task::block_in_place(|| create_survey_report(table, output, &config))
        .context("Failed to build report")?;

    if !quiet {
        eprintln!(
            "{}  {} charts  →  {}",
            if summary.failed_columns.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            summary.histograms + summary.ranked_bars,
            bold(&summary.report_path.display().to_string()),
        );
        for col in &summary.failed_columns {
            eprintln!("   {} column '{}' could not be charted", red("✗"), col);
        }
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    args: &ProcessArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(&args.model)
        .temperature(args.temperature)
        .batch_size(args.batch_size as usize)
        .max_attempts(args.max_attempts)
        .retry_backoff_secs(args.retry_backoff);

    if let Some(ref key) = args.key {
        builder = builder.api_key(key);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
