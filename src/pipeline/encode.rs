//! Image encoding: `DynamicImage` → PNG bytes, and stored PNG bytes →
//! base64 `ImageData` for the vision request.
//!
//! PNG is lossless; resume text at small point sizes survives intact, which
//! matters more to the model than payload size.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use crate::document::PNG_MEDIA_TYPE;
use crate::error::RasterError;

/// Serialize a rendered page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, RasterError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| RasterError::EncodeFailure {
            detail: e.to_string(),
        })?;
    debug!(
        "Encoded {}x{} page → {} PNG bytes",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes for the multimodal API.
///
/// `detail: "high"` lets tiling models look at the full-resolution page;
/// the low-detail overview loses small print.
pub fn image_data(png: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(png), PNG_MEDIA_TYPE).with_detail("high")
}

/// `data:image/png;base64,…` for local previews.
pub fn data_uri(png: &[u8]) -> String {
    format!("data:{};base64,{}", PNG_MEDIA_TYPE, STANDARD.encode(png))
}
