//! Render engine bootstrap: bind the PDF library once per process and run
//! every page render on one dedicated worker thread.
//!
//! ## Why a dedicated worker?
//!
//! pdfium keeps global state and is not async-aware. Binding it once and
//! owning it from a single OS thread means the library is loaded exactly
//! once, renders never stall Tokio worker threads, and nothing else in the
//! process touches the bindings. Callers talk to the worker over a channel
//! and await the reply on a `oneshot`, so no caller ever busy-waits.
//!
//! ## Single-flight initialisation
//!
//! [`RenderEngineLoader::acquire`] keeps one shared in-flight initialisation
//! future. Every caller that arrives while it is pending awaits a clone of
//! the same future, so concurrent first calls converge on one bind and one
//! worker. The initialisation itself runs in a spawned task: a caller that
//! gives up on `acquire()` halfway cannot leave a half-built engine behind.
//!
//! A failed initialisation is remembered for `retry_after`. Calls inside
//! that window get the cached [`EngineInitError`] instead of re-binding a
//! library that just failed to load.
//!
//! If the worker thread itself cannot be spawned and the backend offers a
//! renderer that may move between threads ([`RenderBackend::bind_inline`]),
//! the engine degrades to rendering on the blocking pool behind a mutex.
//! Backends tied to the thread that bound them (pdfium) fail with
//! [`EngineInitError`] instead.

use futures::future::{BoxFuture, FutureExt, Shared};
use image::DynamicImage;
use once_cell::sync::Lazy;
use std::io;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::render::PdfiumBackend;
use crate::error::{EngineInitError, RasterError};

/// Name of the OS thread that owns the bound library.
pub const WORKER_THREAD_NAME: &str = "render-worker";

/// Default window during which a failed initialisation is not retried.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

// ── Backend seam ─────────────────────────────────────────────────────────

/// A PDF library that can be bound into a [`PageRenderer`].
pub trait RenderBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Load the library. Called on the worker thread; the renderer never
    /// leaves it.
    fn bind(&self) -> Result<Box<dyn PageRenderer>, EngineInitError>;

    /// Load a renderer that may be driven from any blocking-pool thread.
    /// Used only when no dedicated worker can be started. `None` when the
    /// library is tied to the thread that bound it.
    fn bind_inline(&self) -> Option<Result<Box<dyn PageRenderer + Send>, EngineInitError>> {
        None
    }
}

/// A bound library instance.
pub trait PageRenderer {
    fn load<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn LoadedDocument + 'a>, RasterError>;
}

/// A parsed document borrowed from its renderer.
pub trait LoadedDocument {
    fn page_count(&self) -> usize;

    /// Render the 0-based page `index` at `scale` × its natural size.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, RasterError>;
}

/// Output of a render job: the first page, plus how many pages the document
/// had in total.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: DynamicImage,
    pub source_pages: usize,
}

/// Load `bytes` and render page 1 only. Later pages are never touched.
pub fn render_first_page(
    renderer: &dyn PageRenderer,
    bytes: &[u8],
    scale: f32,
) -> Result<RenderedPage, RasterError> {
    let document = renderer.load(bytes)?;
    let source_pages = document.page_count();
    if source_pages == 0 {
        return Err(RasterError::DecodeFailure {
            detail: "document has no pages".into(),
        });
    }

    let image = document.render_page(0, scale)?;
    if source_pages > 1 {
        debug!("Document has {} pages; rendered page 1 only", source_pages);
    }
    Ok(RenderedPage {
        image,
        source_pages,
    })
}

// ── Engine handle ────────────────────────────────────────────────────────

struct RenderJob {
    bytes: Vec<u8>,
    scale: f32,
    reply: oneshot::Sender<Result<RenderedPage, RasterError>>,
}

enum EngineMode {
    Worker(mpsc::Sender<RenderJob>),
    Inline(Arc<Mutex<Box<dyn PageRenderer + Send>>>),
}

/// Handle to the initialised engine. Cheap to share; lives for the rest of
/// the process.
pub struct RenderEngine {
    backend: String,
    mode: EngineMode,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("backend", &self.backend)
            .field("worker", &self.is_worker())
            .finish()
    }
}

impl RenderEngine {
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// `false` when running in the degraded inline mode.
    pub fn is_worker(&self) -> bool {
        matches!(self.mode, EngineMode::Worker(_))
    }

    /// Render page 1 of `bytes` at `scale`.
    pub async fn render_first_page(
        &self,
        bytes: Vec<u8>,
        scale: f32,
    ) -> Result<RenderedPage, RasterError> {
        match &self.mode {
            EngineMode::Worker(jobs) => {
                let (reply, rx) = oneshot::channel();
                jobs.send(RenderJob {
                    bytes,
                    scale,
                    reply,
                })
                .map_err(|_| RasterError::NoRenderSurface {
                    detail: "render worker has stopped".into(),
                })?;
                rx.await.map_err(|_| RasterError::NoRenderSurface {
                    detail: "render worker dropped the job".into(),
                })?
            }
            EngineMode::Inline(renderer) => {
                let renderer = Arc::clone(renderer);
                tokio::task::spawn_blocking(move || {
                    let guard = renderer.lock().unwrap_or_else(PoisonError::into_inner);
                    render_first_page(&**guard, &bytes, scale)
                })
                .await
                .map_err(|e| RasterError::NoRenderSurface {
                    detail: format!("inline render task failed: {e}"),
                })?
            }
        }
    }
}

fn run_worker(
    backend: Arc<dyn RenderBackend>,
    jobs: mpsc::Receiver<RenderJob>,
    ready: oneshot::Sender<Result<(), EngineInitError>>,
) {
    let renderer = match backend.bind() {
        Ok(renderer) => renderer,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    while let Ok(job) = jobs.recv() {
        let started = Instant::now();
        let result = render_first_page(renderer.as_ref(), &job.bytes, job.scale);
        debug!(
            "Render job: {} bytes in, ok={}, {:?}",
            job.bytes.len(),
            result.is_ok(),
            started.elapsed()
        );
        // The caller may have been abandoned; nothing to do then.
        let _ = job.reply.send(result);
    }
    debug!("Render worker exiting: all engine handles dropped");
}

/// Starts the worker thread running `work`.
type SpawnWorker = fn(Box<dyn FnOnce() + Send>) -> io::Result<()>;

fn spawn_named_worker(work: Box<dyn FnOnce() + Send>) -> io::Result<()> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(work)
        .map(drop)
}

async fn initialize(
    backend: Arc<dyn RenderBackend>,
    spawn: SpawnWorker,
) -> Result<Arc<RenderEngine>, EngineInitError> {
    info!(backend = backend.name(), "Initialising render engine");
    let (jobs_tx, jobs_rx) = mpsc::channel::<RenderJob>();
    let (ready_tx, ready_rx) = oneshot::channel();

    let worker_backend = Arc::clone(&backend);
    let spawned = spawn(Box::new(move || run_worker(worker_backend, jobs_rx, ready_tx)));

    let mode = match spawned {
        Ok(()) => {
            ready_rx
                .await
                .map_err(|_| EngineInitError::new("render worker exited during start-up"))??;
            EngineMode::Worker(jobs_tx)
        }
        Err(e) => {
            warn!("Could not start render worker ({e}); trying inline rendering");
            let inline_backend = Arc::clone(&backend);
            let bound = tokio::task::spawn_blocking(move || inline_backend.bind_inline())
                .await
                .map_err(|e| EngineInitError::new(format!("inline bind task failed: {e}")))?;
            match bound {
                Some(renderer) => EngineMode::Inline(Arc::new(Mutex::new(renderer?))),
                None => {
                    return Err(EngineInitError::new(format!(
                        "could not start render worker and backend '{}' cannot render inline: {e}",
                        backend.name()
                    )));
                }
            }
        }
    };

    let engine = RenderEngine {
        backend: backend.name().to_string(),
        mode,
    };
    info!(
        backend = engine.backend(),
        worker = engine.is_worker(),
        "Render engine ready"
    );
    Ok(Arc::new(engine))
}

// ── Loader ───────────────────────────────────────────────────────────────

static GLOBAL_LOADER: Lazy<Arc<RenderEngineLoader>> =
    Lazy::new(|| Arc::new(RenderEngineLoader::new(Arc::new(PdfiumBackend::from_env()))));

type InitFuture = Shared<BoxFuture<'static, Result<Arc<RenderEngine>, EngineInitError>>>;

enum InitState {
    Idle,
    Pending(InitFuture),
    Ready(Arc<RenderEngine>),
    Failed { at: Instant, error: EngineInitError },
}

/// Lazily initialises a [`RenderEngine`] exactly once.
pub struct RenderEngineLoader {
    backend: Arc<dyn RenderBackend>,
    retry_after: Duration,
    spawn: SpawnWorker,
    state: Mutex<InitState>,
}

impl RenderEngineLoader {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            retry_after: DEFAULT_RETRY_AFTER,
            spawn: spawn_named_worker,
            state: Mutex::new(InitState::Idle),
        }
    }

    /// The process-wide pdfium loader. Nothing is bound until the first
    /// [`acquire`](Self::acquire).
    pub fn global() -> Arc<RenderEngineLoader> {
        Arc::clone(&GLOBAL_LOADER)
    }

    /// How long a failed initialisation is remembered.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    #[cfg(test)]
    fn with_spawn(mut self, spawn: SpawnWorker) -> Self {
        self.spawn = spawn;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// `true` once an engine has been initialised.
    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), InitState::Ready(_))
    }

    /// Return the engine, initialising it on first use.
    ///
    /// Idempotent and safe under concurrent calls: all callers receive the
    /// same `Arc<RenderEngine>` or the same error.
    pub async fn acquire(&self) -> Result<Arc<RenderEngine>, EngineInitError> {
        let pending = {
            let mut state = self.lock_state();
            let in_flight = match &*state {
                InitState::Ready(engine) => return Ok(Arc::clone(engine)),
                InitState::Pending(fut) => Some(fut.clone()),
                InitState::Failed { at, error } if at.elapsed() < self.retry_after => {
                    debug!("Render engine failed {:?} ago; not retrying yet", at.elapsed());
                    return Err(error.clone());
                }
                InitState::Idle | InitState::Failed { .. } => None,
            };
            match in_flight {
                Some(fut) => fut,
                None => {
                    let fut = self.start();
                    *state = InitState::Pending(fut.clone());
                    fut
                }
            }
        };

        let outcome = pending.clone().await;

        let mut state = self.lock_state();
        if let InitState::Pending(current) = &*state {
            if current.ptr_eq(&pending) {
                *state = match &outcome {
                    Ok(engine) => InitState::Ready(Arc::clone(engine)),
                    Err(error) => {
                        warn!("{error}");
                        InitState::Failed {
                            at: Instant::now(),
                            error: error.clone(),
                        }
                    }
                };
            }
        }
        outcome
    }

    fn start(&self) -> InitFuture {
        let task = tokio::spawn(initialize(Arc::clone(&self.backend), self.spawn));
        async move {
            task.await
                .map_err(|e| EngineInitError::new(format!("initialisation task failed: {e}")))?
        }
        .boxed()
        .shared()
    }

    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Test backend. Documents are `[page_count]`; a page renders as a 10×20
/// white image times the scale.
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct StubBackend {
        pub binds: AtomicUsize,
        fail: bool,
        inline: bool,
        pub rendered_on: Arc<Mutex<Vec<(usize, Option<String>)>>>,
    }

    impl StubBackend {
        pub fn new(fail: bool) -> Arc<Self> {
            Self::build(fail, false)
        }

        /// Like [`new`](Self::new), but also offers an inline renderer.
        pub fn with_inline(fail: bool) -> Arc<Self> {
            Self::build(fail, true)
        }

        fn build(fail: bool, inline: bool) -> Arc<Self> {
            Arc::new(Self {
                binds: AtomicUsize::new(0),
                fail,
                inline,
                rendered_on: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn open(&self) -> Result<StubRenderer, EngineInitError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            if self.fail {
                return Err(EngineInitError::new("stub library missing"));
            }
            Ok(StubRenderer {
                rendered_on: Arc::clone(&self.rendered_on),
            })
        }
    }

    impl RenderBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        fn bind(&self) -> Result<Box<dyn PageRenderer>, EngineInitError> {
            Ok(Box::new(self.open()?))
        }

        fn bind_inline(&self) -> Option<Result<Box<dyn PageRenderer + Send>, EngineInitError>> {
            self.inline
                .then(|| self.open().map(|r| Box::new(r) as Box<dyn PageRenderer + Send>))
        }
    }

    struct StubRenderer {
        rendered_on: Arc<Mutex<Vec<(usize, Option<String>)>>>,
    }

    struct StubDocument<'a> {
        pages: usize,
        renderer: &'a StubRenderer,
    }

    impl PageRenderer for StubRenderer {
        fn load<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn LoadedDocument + 'a>, RasterError> {
            let pages = *bytes.first().ok_or_else(|| RasterError::DecodeFailure {
                detail: "empty".into(),
            })? as usize;
            Ok(Box::new(StubDocument {
                pages,
                renderer: self,
            }))
        }
    }

    impl LoadedDocument for StubDocument<'_> {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, RasterError> {
            self.renderer
                .rendered_on
                .lock()
                .unwrap()
                .push((index, thread::current().name().map(str::to_string)));
            let w = (10.0 * scale) as u32;
            let h = (20.0 * scale) as u32;
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))))
        }
    }
}
