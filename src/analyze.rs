//! The analysis pipeline: one resume submission from upload to a persisted
//! feedback record.
//!
//! ```text
//! Idle → Uploading → Converting → UploadingImage → PersistingInitial
//!      → Analyzing → Normalizing → PersistingFinal → Succeeded
//! ```
//!
//! Any stage may end the run as [`PipelineOutcome::Failed`] instead. Stages
//! run strictly in sequence and none is retried here; whether to re-submit
//! is the caller's decision. [`AnalysisPipeline::run`] never returns an
//! error: every failure path resolves to a stage-tagged [`StageFailure`].
//!
//! The record is checkpointed at `PersistingInitial` with a pending
//! feedback sentinel, so a run that dies during analysis leaves an
//! inspectable record behind. `PersistingFinal` overwrites the same key.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::document::Document;
use crate::error::{FailureReason, RasterError, ResumeError, StageFailure};
use crate::pipeline::llm::FeedbackService;
use crate::pipeline::normalize::normalize;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use crate::prompts::{render_instructions, DEFAULT_INSTRUCTIONS_TEMPLATE};
use crate::record::{record_key, AnalysisRecord, RecordFeedback};
use crate::store::{BlobStore, KvStore};

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Uploading,
    Converting,
    UploadingImage,
    PersistingInitial,
    Analyzing,
    Normalizing,
    PersistingFinal,
    Succeeded,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Uploading => "Uploading",
            Stage::Converting => "Converting",
            Stage::UploadingImage => "UploadingImage",
            Stage::PersistingInitial => "PersistingInitial",
            Stage::Analyzing => "Analyzing",
            Stage::Normalizing => "Normalizing",
            Stage::PersistingFinal => "PersistingFinal",
            Stage::Succeeded => "Succeeded",
        }
    }

    /// Human-readable status line for progress displays.
    pub fn status_text(self) -> &'static str {
        match self {
            Stage::Idle => "Waiting for a resume",
            Stage::Uploading => "Uploading the file...",
            Stage::Converting => "Converting to image...",
            Stage::UploadingImage => "Uploading the image...",
            Stage::PersistingInitial => "Preparing data...",
            Stage::Analyzing => "Analyzing...",
            Stage::Normalizing => "Reading the analysis...",
            Stage::PersistingFinal => "Saving feedback...",
            Stage::Succeeded => "Analysis complete",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal result of [`AnalysisPipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Succeeded { record_id: Uuid },
    Failed(StageFailure),
}

impl PipelineOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded { .. })
    }

    /// The record id, if a record was written at all.
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            PipelineOutcome::Succeeded { record_id } => Some(*record_id),
            PipelineOutcome::Failed(failure) => failure.record_id,
        }
    }

    pub fn into_result(self) -> Result<Uuid, StageFailure> {
        match self {
            PipelineOutcome::Succeeded { record_id } => Ok(record_id),
            PipelineOutcome::Failed(failure) => Err(failure),
        }
    }
}

/// Tracks the current stage of one run and tags failures with it.
struct StageTracker {
    stage: Stage,
    record_id: Option<Uuid>,
    callback: Option<ProgressCallback>,
}

impl StageTracker {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            stage: Stage::Idle,
            record_id: None,
            callback,
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "{stage} after {}", self.stage);
        self.stage = stage;
        info!(stage = %stage, record_id = ?self.record_id, "{}", stage.status_text());
        if let Some(cb) = &self.callback {
            cb.on_stage(stage);
        }
    }

    fn fail(&self, reason: impl Into<FailureReason>) -> StageFailure {
        StageFailure {
            stage: self.stage,
            reason: reason.into(),
            record_id: self.record_id,
        }
    }
}

/// Drives one submission through every stage.
///
/// Holds no per-run state, so one pipeline can serve concurrent
/// submissions; the only shared mutable state is the render engine behind
/// the [`Rasterizer`].
pub struct AnalysisPipeline {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn KvStore>,
    feedback: Arc<dyn FeedbackService>,
    rasterizer: Rasterizer,
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    /// Build a pipeline rendering through the process-wide pdfium engine.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn KvStore>,
        feedback: Arc<dyn FeedbackService>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            blobs,
            records,
            feedback,
            rasterizer: Rasterizer::default(),
            config,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Rasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse `document` against the job context.
    pub async fn run(
        &self,
        document: Document,
        company_name: &str,
        job_title: &str,
        job_description: &str,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let mut tracker = StageTracker::new(self.config.progress_callback.clone());

        let result = self
            .execute(&mut tracker, document, company_name, job_title, job_description)
            .await;

        match result {
            Ok(record_id) => {
                tracker.enter(Stage::Succeeded);
                info!(%record_id, "Resume analysed in {:?}", started.elapsed());
                if let Some(cb) = &tracker.callback {
                    cb.on_succeeded(record_id);
                }
                PipelineOutcome::Succeeded { record_id }
            }
            Err(failure) => {
                warn!(
                    stage = %failure.stage,
                    record_id = ?failure.record_id,
                    "Analysis failed: {}",
                    failure.reason
                );
                if let Some(cb) = &tracker.callback {
                    cb.on_failed(&failure);
                }
                PipelineOutcome::Failed(failure)
            }
        }
    }

    async fn execute(
        &self,
        t: &mut StageTracker,
        document: Document,
        company_name: &str,
        job_title: &str,
        job_description: &str,
    ) -> Result<Uuid, StageFailure> {
        t.enter(Stage::Uploading);
        if !document.is_supported() {
            return Err(t.fail(RasterError::UnsupportedFormat {
                name: document.name().to_string(),
                media_type: document.media_type().to_string(),
            }));
        }
        let resume_ref = self.upload(t, document.bytes(), document.name()).await?;

        t.enter(Stage::Converting);
        let raster = self
            .rasterizer
            .rasterize(document)
            .await
            .map_err(|e| t.fail(e))?;

        t.enter(Stage::UploadingImage);
        let image_ref = self.upload(t, &raster.png, &raster.file_name).await?;
        drop(raster);

        t.enter(Stage::PersistingInitial);
        let mut record = AnalysisRecord {
            id: Uuid::new_v4(),
            resume_ref,
            image_ref,
            company_name: company_name.to_string(),
            job_title: job_title.to_string(),
            job_description: job_description.to_string(),
            feedback: RecordFeedback::Pending,
        };
        self.persist(t, &record).await?;
        t.record_id = Some(record.id);

        t.enter(Stage::Analyzing);
        let template = self
            .config
            .instructions_template
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTIONS_TEMPLATE);
        let instructions = render_instructions(template, company_name, job_title, job_description);
        let raw = match self.feedback.feedback(&record.image_ref, &instructions).await {
            Ok(Some(raw)) if !raw.is_null() => raw,
            Ok(_) => return Err(t.fail(FailureReason::EmptyResponse)),
            Err(e) => return Err(t.fail(FailureReason::Service(e.to_string()))),
        };

        t.enter(Stage::Normalizing);
        let feedback = normalize(&raw).map_err(|e| t.fail(e))?;
        debug!(
            categories = feedback.categories().count(),
            complete = feedback.is_complete(),
            "Feedback normalised"
        );

        t.enter(Stage::PersistingFinal);
        record.feedback = RecordFeedback::Ready(feedback);
        self.persist(t, &record).await?;

        Ok(record.id)
    }

    async fn upload(
        &self,
        t: &StageTracker,
        bytes: &[u8],
        name: &str,
    ) -> Result<String, StageFailure> {
        match self.blobs.upload(bytes, name).await {
            Ok(Some(reference)) if !reference.is_empty() => {
                debug!("Uploaded {} ({} bytes) → {}", name, bytes.len(), reference);
                Ok(reference)
            }
            Ok(_) => Err(t.fail(FailureReason::NoPath)),
            Err(e) => Err(t.fail(FailureReason::Storage(e.to_string()))),
        }
    }

    async fn persist(&self, t: &StageTracker, record: &AnalysisRecord) -> Result<(), StageFailure> {
        let key = record_key(&self.config.key_prefix, &record.id);
        let value = serde_json::to_string(record)
            .map_err(|e| t.fail(FailureReason::Storage(e.to_string())))?;

        match self.records.set(&key, &value).await {
            Ok(true) => {
                debug!("Wrote {} ({} bytes)", key, value.len());
                Ok(())
            }
            Ok(false) => Err(t.fail(FailureReason::WriteFailed)),
            Err(e) => Err(t.fail(FailureReason::Storage(e.to_string()))),
        }
    }

    /// Read a record back by id; `None` if it was never written.
    pub async fn load_record(&self, id: Uuid) -> Result<Option<AnalysisRecord>, ResumeError> {
        let key = record_key(&self.config.key_prefix, &id);
        let Some(raw) = self.records.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ResumeError::CorruptRecord { key, source })
    }

    /// The raw stored JSON of a record, as written.
    pub async fn load_record_json(&self, id: Uuid) -> Result<Option<Value>, ResumeError> {
        let key = record_key(&self.config.key_prefix, &id);
        let Some(raw) = self.records.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ResumeError::CorruptRecord { key, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PDF_MEDIA_TYPE;
    use crate::error::NormalizeError;
    use crate::pipeline::engine::stub::StubBackend;
    use crate::pipeline::engine::RenderEngineLoader;
    use crate::store::{MemoryBlobStore, MemoryKvStore};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedFeedback(Option<Value>);

    #[async_trait]
    impl FeedbackService for FixedFeedback {
        async fn feedback(&self, _: &str, _: &str) -> Result<Option<Value>, ResumeError> {
            Ok(self.0.clone())
        }
    }

    fn pipeline(ai: Option<Value>) -> (AnalysisPipeline, Arc<MemoryKvStore>) {
        let kv = Arc::new(MemoryKvStore::new());
        let loader = Arc::new(RenderEngineLoader::new(StubBackend::new(false)));
        let p = AnalysisPipeline::new(
            Arc::new(MemoryBlobStore::new()),
            kv.clone(),
            Arc::new(FixedFeedback(ai)),
            AnalysisConfig::default(),
        )
        .with_rasterizer(Rasterizer::new(loader));
        (p, kv)
    }

    #[test]
    fn stage_display_and_order() {
        assert_eq!(Stage::UploadingImage.to_string(), "UploadingImage");
        assert!(Stage::Uploading < Stage::Converting);
        assert!(Stage::PersistingFinal < Stage::Succeeded);
        assert!(Stage::Succeeded.is_terminal());
        assert!(!Stage::Analyzing.is_terminal());
    }

    #[test]
    fn outcome_accessors() {
        let id = Uuid::new_v4();
        let ok = PipelineOutcome::Succeeded { record_id: id };
        assert!(ok.is_succeeded());
        assert_eq!(ok.record_id(), Some(id));
        assert_eq!(ok.into_result().unwrap(), id);

        let failed = PipelineOutcome::Failed(StageFailure {
            stage: Stage::Uploading,
            reason: FailureReason::NoPath,
            record_id: None,
        });
        assert!(!failed.is_succeeded());
        assert_eq!(failed.record_id(), None);
        assert_eq!(failed.into_result().unwrap_err().stage, Stage::Uploading);
    }

    #[tokio::test]
    async fn corrupt_document_fails_at_converting() {
        let (p, kv) = pipeline(Some(json!("{}")));
        let outcome = p
            .run(Document::new("cv.pdf", PDF_MEDIA_TYPE, vec![]), "Acme", "Engineer", "")
            .await;
        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.stage, Stage::Converting);
        assert!(matches!(
            failure.reason,
            FailureReason::Raster(RasterError::DecodeFailure { .. })
        ));
        assert!(kv.keys().is_empty());
    }

    #[tokio::test]
    async fn unparseable_response_fails_at_normalizing_with_record_id() {
        let (p, kv) = pipeline(Some(json!({"content": "not json at all"})));
        let outcome = p
            .run(Document::new("cv.pdf", PDF_MEDIA_TYPE, vec![1]), "Acme", "Engineer", "")
            .await;
        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.stage, Stage::Normalizing);
        assert!(matches!(
            failure.reason,
            FailureReason::Normalize(NormalizeError::MalformedJson { .. })
        ));

        let id = failure.record_id.unwrap();
        assert_eq!(kv.keys(), vec![format!("resume:{id}")]);
        assert!(p.load_record(id).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn load_record_missing_is_none() {
        let (p, _) = pipeline(None);
        assert!(p.load_record(Uuid::new_v4()).await.unwrap().is_none());
    }
}
