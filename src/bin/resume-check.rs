//! CLI binary for edgequake-resume.
//!
//! A thin shim over the library crate: `analyze` maps flags onto
//! `AnalysisConfig` and runs the pipeline against directory-backed stores,
//! `show` prints a stored record.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_resume::record::record_key;
use edgequake_resume::{
    load_document, AnalysisConfig, AnalysisPipeline, AnalysisProgressCallback, AnalysisRecord,
    FsBlobStore, FsKvStore, KvStore, PdfiumBackend, PipelineOutcome, ProgressCallback, Rasterizer,
    RenderEngineLoader, Score, ScoreBand, Stage, StageFailure, TipKind, VisionFeedbackService,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner line showing the current stage.
struct SpinnerCallback {
    bar: ProgressBar,
}

impl SpinnerCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for SpinnerCallback {
    fn on_stage(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(stage.status_text());
    }

    fn on_failed(&self, failure: &StageFailure) {
        self.bar.finish_and_clear();
        eprintln!("{}  {}", red("✗"), failure);
    }

    fn on_succeeded(&self, _record_id: Uuid) {
        self.bar.finish_and_clear();
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a resume for a role
  resume-check analyze cv.pdf --company Acme --job-title "Backend Engineer" \
      --job-description-file job.txt

  # From a URL, machine-readable result
  resume-check analyze https://example.com/jane.pdf --company Acme --job-title SRE --json

  # Print a stored analysis
  resume-check show 3f0c1d9e-8a4b-4d8e-9c1f-2b7a6e5d4c3b

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter; overrides --verbose / --quiet
"#;

/// Score resumes against a job description using a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "resume-check",
    version,
    about = "Score resumes against a job description using a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding uploaded files and analysis records.
    #[arg(long, global = true, env = "RESUME_DATA_DIR", default_value = "resume-data")]
    data_dir: PathBuf,

    /// Record key prefix.
    #[arg(long, global = true, env = "RESUME_KEY_PREFIX", default_value = "resume")]
    key_prefix: String,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESUME_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESUME_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a resume PDF (local path or HTTP/HTTPS URL).
    Analyze(AnalyzeArgs),

    /// Print a stored analysis record.
    Show {
        /// Record id, with or without the `<prefix>:` part.
        record_id: String,

        /// Print the stored JSON only.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Company the resume is aimed at.
    #[arg(long, env = "RESUME_COMPANY")]
    company: String,

    /// Job title applied for.
    #[arg(long, env = "RESUME_JOB_TITLE")]
    job_title: String,

    /// Job description text.
    #[arg(long, env = "RESUME_JOB_DESCRIPTION", default_value = "", conflicts_with = "job_description_file")]
    job_description: String,

    /// Read the job description from a file.
    #[arg(long)]
    job_description_file: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a custom instruction template.
    #[arg(long, env = "RESUME_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RESUME_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUME_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Transport retries for the LLM call.
    #[arg(long, env = "RESUME_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "RESUME_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESUME_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Explicit path to the pdfium shared library.
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,

    /// Output the outcome as JSON.
    #[arg(long, env = "RESUME_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "RESUME_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let records = FsKvStore::new(cli.data_dir.join("records"));

    match &cli.command {
        Command::Analyze(args) => analyze(&cli, args, records).await,
        Command::Show { record_id, json } => show(&cli, &records, record_id, *json).await,
    }
}

async fn analyze(cli: &Cli, args: &AnalyzeArgs, records: FsKvStore) -> Result<()> {
    let show_progress = !cli.quiet && !args.no_progress && !args.json && !cli.verbose;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(SpinnerCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, args, progress).await?;
    let job_description = match &args.job_description_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job description from {:?}", path))?,
        None => args.job_description.clone(),
    };

    let document = load_document(&args.input, args.download_timeout)
        .await
        .context("Failed to load resume")?;

    let blobs = Arc::new(FsBlobStore::new(cli.data_dir.join("blobs")));
    let ai = VisionFeedbackService::from_config(&config, blobs.clone())
        .context("Failed to set up the LLM provider")?;

    let mut pipeline = AnalysisPipeline::new(blobs, Arc::new(records), Arc::new(ai), config);
    if let Some(path) = &args.pdfium_lib {
        let backend = Arc::new(PdfiumBackend::with_library_path(path));
        pipeline = pipeline.with_rasterizer(Rasterizer::new(Arc::new(RenderEngineLoader::new(backend))));
    }

    let outcome = pipeline
        .run(document, &args.company, &args.job_title, &job_description)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&cli.key_prefix, &outcome))?);
    }

    match outcome {
        PipelineOutcome::Succeeded { record_id } => {
            if !args.json && !cli.quiet {
                eprintln!(
                    "{}  {}",
                    green("✔"),
                    bold(&record_key(&cli.key_prefix, &record_id))
                );
                if let Some(record) = pipeline.load_record(record_id).await? {
                    print_summary(&record);
                }
            }
            Ok(())
        }
        PipelineOutcome::Failed(failure) => {
            if !args.json && !show_progress {
                eprintln!("{}  {}", red("✗"), failure);
            }
            if let Some(id) = failure.record_id {
                if !args.json {
                    eprintln!(
                        "   partial record kept at {}",
                        dim(&record_key(&cli.key_prefix, &id))
                    );
                }
            }
            std::process::exit(1);
        }
    }
}

async fn show(cli: &Cli, records: &FsKvStore, record_id: &str, json: bool) -> Result<()> {
    let id_str = record_id
        .strip_prefix(&format!("{}:", cli.key_prefix))
        .unwrap_or(record_id);
    let id: Uuid = id_str
        .parse()
        .with_context(|| format!("'{record_id}' is not a record id"))?;

    let key = record_key(&cli.key_prefix, &id);
    let raw = records
        .get(&key)
        .await?
        .with_context(|| format!("No record stored under {key}"))?;

    if json {
        let value: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| format!("Record {key} is not JSON"))?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let record: AnalysisRecord =
        serde_json::from_str(&raw).with_context(|| format!("Record {key} is malformed"))?;
    println!("{}  {}", bold(&key), dim(&record.image_ref));
    println!("   {} — {}", record.job_title, record.company_name);
    print_summary(&record);
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(
    cli: &Cli,
    args: &AnalyzeArgs,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .key_prefix(cli.key_prefix.clone());

    if let Some(model) = &args.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(path) = &args.instructions {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction template from {:?}", path))?;
        builder = builder.instructions_template(template);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn outcome_json(prefix: &str, outcome: &PipelineOutcome) -> serde_json::Value {
    match outcome {
        PipelineOutcome::Succeeded { record_id } => serde_json::json!({
            "status": "succeeded",
            "recordId": record_id,
            "key": record_key(prefix, record_id),
        }),
        PipelineOutcome::Failed(failure) => serde_json::json!({
            "status": "failed",
            "stage": failure.stage.to_string(),
            "reason": failure.reason.to_string(),
            "recordId": failure.record_id,
        }),
    }
}

fn banded(score: Option<&Score>) -> String {
    let Some(score) = score else {
        return dim("  -/100");
    };
    let text = format!("{:>3}/100", score.to_string());
    match score.as_f64().map(ScoreBand::of) {
        Some(ScoreBand::Strong) => green(&text),
        Some(ScoreBand::Fair) => yellow(&text),
        Some(ScoreBand::Weak) | None => red(&text),
    }
}

fn print_summary(record: &AnalysisRecord) {
    let Some(doc) = record.feedback() else {
        println!("   {}", yellow("analysis pending"));
        return;
    };

    if let Some(score) = &doc.overall_score {
        let headline = score.as_f64().map(|s| ScoreBand::of(s).headline()).unwrap_or_default();
        println!(
            "\n   {}  {}  {}",
            bold("Overall"),
            banded(Some(score)),
            headline
        );
    }
    if let Some(ats) = &doc.ats {
        println!("   {:<14} {}", "ATS", banded(ats.score.as_ref()));
    }
    for (kind, category) in doc.categories() {
        println!("   {:<14} {}", kind.label(), banded(category.score.as_ref()));
        for tip in &category.tips {
            let marker = match &tip.kind {
                Some(TipKind::Good) => green("+"),
                Some(TipKind::Improve) => yellow("!"),
                _ => dim("·"),
            };
            println!("      {marker} {}", tip.tip.as_deref().unwrap_or_default());
        }
    }
    if !doc.is_complete() {
        println!("   {}", dim("(some categories are missing from this analysis)"));
    }
}
