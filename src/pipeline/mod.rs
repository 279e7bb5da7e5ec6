//! Pipeline stages for resume analysis.
//!
//! Each submodule implements one step; [`crate::analyze::AnalysisPipeline`]
//! drives them in order.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ normalize
//! (path/URL) (page 1)   (PNG)    (vision) (JSON recovery)
//!              │
//!           engine (one pdfium worker per process)
//! ```
//!
//! 1. [`input`]     — turn a path or URL into a [`crate::document::Document`]
//! 2. [`engine`]    — bind the PDF library once and own it on a worker thread
//! 3. [`render`]    — rasterise page 1 at a fixed 3× scale
//! 4. [`encode`]    — PNG bytes out, base64 `ImageData` for the request
//! 5. [`llm`]       — the AI feedback call; the only stage that talks to a model
//! 6. [`normalize`] — recover one feedback object from whatever shape came back

pub mod encode;
pub mod engine;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
