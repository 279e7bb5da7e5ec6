//! Input and raster artefacts: the submitted [`Document`] and the
//! [`RasterImage`] produced from its first page.

use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// The only media type the rasterizer accepts.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Media type of the raster produced by the rasterizer.
pub const PNG_MEDIA_TYPE: &str = "image/png";

static RE_PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// A submitted resume: opaque bytes plus the caller's declared name and type.
///
/// Immutable once built. The pipeline uploads it and then hands it by value
/// to the rasterizer, which drops it after rendering.
#[derive(Clone)]
pub struct Document {
    name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Either the declared media type or the file name may be authoritative
    /// depending on the caller, so a match on either is accepted.
    pub fn is_supported(&self) -> bool {
        self.media_type.eq_ignore_ascii_case(PDF_MEDIA_TYPE) || RE_PDF_SUFFIX.is_match(&self.name)
    }

    /// Name of the raster derived from this document: `cv.PDF` → `cv.png`.
    pub fn raster_file_name(&self) -> String {
        let stem = RE_PDF_SUFFIX.replace(&self.name, "");
        format!("{stem}.png")
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// First page of a document rendered at the fixed upscale factor.
#[derive(Clone)]
pub struct RasterImage {
    /// Decoded pixels, kept for callers that post-process the bitmap.
    pub image: DynamicImage,
    /// PNG-encoded form; this is what gets uploaded.
    pub png: Vec<u8>,
    /// `<document stem>.png`
    pub file_name: String,
    /// Page count of the source document (only page 1 is rendered).
    pub source_pages: usize,
    /// Scale factor the page was rendered at.
    pub scale: f32,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Self-contained `data:` URI for showing the raster without a round
    /// trip through storage.
    pub fn preview_data_uri(&self) -> String {
        crate::pipeline::encode::data_uri(&self.png)
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("file_name", &self.file_name)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("png", &self.png.len())
            .field("source_pages", &self.source_pages)
            .field("scale", &self.scale)
            .finish()
    }
}
