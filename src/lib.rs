//! # edgequake-resume
//!
//! Score a resume against a job description with a vision LLM.
//!
//! ## Why render the resume?
//!
//! Resumes are designed to be looked at: two-column layouts, sidebars, icons
//! and skill bars come out of text extraction scrambled or not at all. This
//! crate rasterises page 1 of the PDF and lets a vision model read it the
//! way a recruiter would, then recovers a structured feedback document from
//! whatever the model answers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Uploading          store the original
//!  ├─ 2. Converting         page 1 → PNG at 3× (one pdfium worker per process)
//!  ├─ 3. UploadingImage     store the PNG
//!  ├─ 4. PersistingInitial  checkpoint the record with pending feedback
//!  ├─ 5. Analyzing          vision LLM call with the job context
//!  ├─ 6. Normalizing        recover one JSON feedback object from the reply
//!  └─ 7. PersistingFinal    rewrite the record with the feedback
//! ```
//!
//! Each step either advances or ends the run as a stage-tagged failure;
//! [`AnalysisPipeline::run`] always returns a [`PipelineOutcome`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_resume::{
//!     load_document, AnalysisConfig, AnalysisPipeline, FsBlobStore, FsKvStore,
//!     VisionFeedbackService,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AnalysisConfig::default();
//!     let blobs = Arc::new(FsBlobStore::new("data/blobs"));
//!     let records = Arc::new(FsKvStore::new("data/records"));
//!     let ai = Arc::new(VisionFeedbackService::from_config(&config, blobs.clone())?);
//!
//!     let pipeline = AnalysisPipeline::new(blobs, records, ai, config);
//!     let resume = load_document("resume.pdf", 60).await?;
//!     let record_id = pipeline
//!         .run(resume, "Acme", "Backend Engineer", "Rust, Postgres, Kubernetes")
//!         .await
//!         .into_result()?;
//!     println!("resume:{record_id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-check` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## pdfium
//!
//! The pdfium shared library is looked up at `PDFIUM_LIB_PATH`, then in the
//! working directory, then on the system library path. It is bound once,
//! on first use, by [`RenderEngineLoader::global`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisPipeline, PipelineOutcome, Stage};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use document::{Document, RasterImage};
pub use error::{
    EngineInitError, FailureReason, NormalizeError, RasterError, ResumeError, StageFailure,
};
pub use feedback::{Category, CategoryKind, FeedbackDocument, Score, ScoreBand, Tip, TipKind};
pub use pipeline::engine::{RenderBackend, RenderEngine, RenderEngineLoader};
pub use pipeline::input::load_document;
pub use pipeline::llm::{FeedbackService, VisionFeedbackService};
pub use pipeline::normalize::normalize;
pub use pipeline::render::{PdfiumBackend, Rasterizer, RENDER_SCALE};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{AnalysisRecord, RecordFeedback};
pub use store::{BlobStore, FsBlobStore, FsKvStore, KvStore, MemoryBlobStore, MemoryKvStore};
