//! Error types for the edgequake-resume library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`ResumeError`] — **Fatal, outside the pipeline**: the input could not
//!   be resolved, the provider is not configured, a store could not be
//!   opened. Returned as `Err(ResumeError)` from setup functions and from
//!   collaborators (stores, AI service).
//!
//! * [`StageFailure`] — **Terminal pipeline outcome**: one stage of
//!   [`crate::analyze::AnalysisPipeline::run`] failed. It carries the stage
//!   and a [`FailureReason`] so callers can tell which of the network-bound
//!   steps broke. The pipeline never returns `Err`; it resolves to
//!   [`crate::analyze::PipelineOutcome::Failed`] instead.
//!
//! Stage reasons wrap the component errors ([`RasterError`],
//! [`NormalizeError`]) unchanged rather than flattening them into strings.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::analyze::Stage;

/// Fatal errors returned outside the pipeline state machine.
#[derive(Debug, Error)]
pub enum ResumeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Resume file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error after all transport retries.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { retries: u32, message: String },

    /// A single LLM call exceeded the per-call timeout.
    #[error("LLM call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A blob or key-value store operation failed at the I/O level.
    #[error("Storage error on '{target}': {source}")]
    Storage {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored blob reference does not resolve to anything.
    #[error("Stored object '{reference}' does not exist")]
    MissingObject { reference: String },

    /// A stored record could not be decoded.
    #[error("Stored record '{key}' is not valid JSON: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The render engine could not be brought up.
///
/// Cloneable because every caller waiting on the same in-flight
/// initialisation receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Render engine initialisation failed: {reason}")]
pub struct EngineInitError {
    pub reason: String,
}

impl EngineInitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Rasterisation failures. None of them are retried by the rasterizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    /// The document is not a PDF (neither by media type nor by name).
    #[error("Unsupported format: '{name}' ({media_type}); please upload a PDF file")]
    UnsupportedFormat { name: String, media_type: String },

    /// The render engine could not be acquired.
    #[error(transparent)]
    EngineInit(#[from] EngineInitError),

    /// The execution context cannot render (bitmap allocation or the
    /// render worker is gone).
    #[error("No render surface available: {detail}")]
    NoRenderSurface { detail: String },

    /// The document bytes could not be parsed.
    #[error("Could not decode document: {detail}")]
    DecodeFailure { detail: String },

    /// The page rendered but could not be serialised to PNG.
    #[error("Could not encode raster image: {detail}")]
    EncodeFailure { detail: String },
}

/// The AI response could not be turned into a feedback document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// No textual payload was found under any known response shape.
    #[error("Unexpected AI response format: no recognisable content")]
    UnrecognizedShape,

    /// A textual payload was found but the JSON candidate did not parse.
    #[error("Could not parse AI response as feedback JSON: {detail}")]
    MalformedJson {
        /// The substring that was handed to the JSON parser.
        candidate: String,
        detail: String,
    },
}

/// Why a pipeline stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The storage collaborator accepted the upload but returned no reference.
    #[error("upload produced no storage path")]
    NoPath,

    /// The AI collaborator returned nothing.
    #[error("AI service returned an empty response")]
    EmptyResponse,

    /// The key-value store reported the write as unsuccessful.
    #[error("record write was rejected by the key-value store")]
    WriteFailed,

    /// A storage collaborator raised an error (I/O, timeout, …).
    #[error("storage error: {0}")]
    Storage(String),

    /// The AI collaborator raised an error (timeout, API error, …).
    #[error("AI service error: {0}")]
    Service(String),
}

/// Terminal failure of a pipeline run, tagged with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {reason}")]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: FailureReason,
    /// Set once the partial record has been checkpointed; lets callers
    /// inspect or overwrite it.
    pub record_id: Option<Uuid>,
}
