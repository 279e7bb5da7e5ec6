//! PDF rasterisation: page 1 of a [`Document`] → PNG [`RasterImage`].
//!
//! ## Why a fixed 3× scale?
//!
//! A letter-size page at its natural size is ~612 × 792 px, too small for a
//! vision model to read 9-pt body text reliably. Tripling it gives roughly
//! 1 836 × 2 376 px, inside the size range vision APIs accept at full detail.
//!
//! ## Why page 1 only?
//!
//! The analysis scores the page a recruiter sees first. Later pages are
//! never rendered; [`RasterImage::source_pages`] still reports how many
//! there were.

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::encode::encode_png;
use super::engine::{LoadedDocument, PageRenderer, RenderBackend, RenderEngineLoader};
use crate::document::{Document, RasterImage};
use crate::error::{EngineInitError, RasterError};

/// Upscale factor applied to page 1.
pub const RENDER_SCALE: f32 = 3.0;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders the first page of a PDF through a shared [`RenderEngineLoader`].
#[derive(Clone)]
pub struct Rasterizer {
    loader: Arc<RenderEngineLoader>,
}

impl Default for Rasterizer {
    /// Uses the process-wide pdfium loader.
    fn default() -> Self {
        Self::new(RenderEngineLoader::global())
    }
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("backend", &self.loader.backend_name())
            .field("scale", &RENDER_SCALE)
            .finish()
    }
}

impl Rasterizer {
    pub fn new(loader: Arc<RenderEngineLoader>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<RenderEngineLoader> {
        &self.loader
    }

    /// Render page 1 of `document` at [`RENDER_SCALE`] and encode it as PNG.
    ///
    /// Non-PDF input fails with [`RasterError::UnsupportedFormat`] before the
    /// engine is touched. The document is consumed; its bytes are handed to
    /// the render worker and dropped there.
    pub async fn rasterize(&self, document: Document) -> Result<RasterImage, RasterError> {
        if !document.is_supported() {
            return Err(RasterError::UnsupportedFormat {
                name: document.name().to_string(),
                media_type: document.media_type().to_string(),
            });
        }

        let file_name = document.raster_file_name();
        let engine = self.loader.acquire().await?;

        let started = Instant::now();
        let page = engine
            .render_first_page(document.into_bytes(), RENDER_SCALE)
            .await?;
        debug!(
            "Rendered page 1/{} → {}x{} px in {:?}",
            page.source_pages,
            page.image.width(),
            page.image.height(),
            started.elapsed()
        );

        let image = page.image;
        let (image, png) = tokio::task::spawn_blocking(move || {
            let png = encode_png(&image)?;
            Ok::<_, RasterError>((image, png))
        })
        .await
        .map_err(|e| RasterError::EncodeFailure {
            detail: format!("encode task failed: {e}"),
        })??;

        info!(
            file = %file_name,
            width = image.width(),
            height = image.height(),
            png_bytes = png.len(),
            "Rasterised first page"
        );

        Ok(RasterImage {
            image,
            png,
            file_name,
            source_pages: page.source_pages,
            scale: RENDER_SCALE,
        })
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Binds the pdfium shared library.
///
/// Lookup order: the explicit path (or `PDFIUM_LIB_PATH`), the platform
/// library name in the working directory, then the system library path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Honour `PDFIUM_LIB_PATH` when set.
    pub fn from_env() -> Self {
        Self {
            library_path: std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from),
        }
    }

    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

impl RenderBackend for PdfiumBackend {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn bind(&self) -> Result<Box<dyn PageRenderer>, EngineInitError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path).map_err(|e| {
                EngineInitError::new(format!("cannot load pdfium from {}: {e:?}", path.display()))
            })?,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| {
                    EngineInitError::new(format!(
                        "pdfium library not found ({e:?}); set {PDFIUM_LIB_PATH_ENV} to its location"
                    ))
                })?,
        };
        debug!("pdfium bound");
        Ok(Box::new(PdfiumRenderer {
            pdfium: Pdfium::new(bindings),
        }))
    }
}

struct PdfiumRenderer {
    pdfium: Pdfium,
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl PageRenderer for PdfiumRenderer {
    fn load<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn LoadedDocument + 'a>, RasterError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RasterError::DecodeFailure {
                detail: format!("{e:?}"),
            })?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

impl LoadedDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, RasterError> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| RasterError::DecodeFailure {
                detail: format!("page {}: {e:?}", index + 1),
            })?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RasterError::NoRenderSurface {
                detail: format!("{e:?}"),
            })?;
        Ok(bitmap.as_image())
    }
}
