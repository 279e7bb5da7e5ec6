//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to follow a
//! run as it moves through its stages, e.g. to drive a status line.
//!
//! # Example
//!
//! ```rust
//! use edgequake_resume::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StatusLine;
//!
//! impl AnalysisProgressCallback for StatusLine {
//!     fn on_stage(&self, stage: Stage) {
//!         eprintln!("{}", stage.status_text());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(StatusLine) as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use uuid::Uuid;

use crate::analyze::Stage;
use crate::error::StageFailure;

/// Called by the pipeline as a run advances.
///
/// Independent submissions may run concurrently and share one callback, so
/// implementations must be `Send + Sync`. All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called when a stage starts.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once when the run ends in `Failed`.
    fn on_failed(&self, failure: &StageFailure) {
        let _ = failure;
    }

    /// Called once when the run ends in `Succeeded`.
    fn on_succeeded(&self, record_id: Uuid) {
        let _ = record_id;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
