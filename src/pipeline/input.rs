//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! The whole file is read into memory; pdfium loads from a byte slice, so
//! there is no need for a temp file. The media type is sniffed from the
//! `%PDF` magic bytes rather than trusted from the extension. Non-PDF input
//! is not rejected here: the pipeline reports it as an unsupported format
//! at its first stage, before anything is uploaded.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::document::{Document, PDF_MEDIA_TYPE};
use crate::error::ResumeError;

const PDF_MAGIC: &[u8] = b"%PDF";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, ResumeError> {
    let input = input.trim();
    if input.is_empty() || (input.contains("://") && !is_url(input)) {
        return Err(ResumeError::InvalidInput {
            input: input.to_string(),
        });
    }

    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

/// `application/pdf` when the bytes carry the PDF magic, else `declared`.
pub fn sniff_media_type<'a>(bytes: &[u8], declared: Option<&'a str>) -> &'a str {
    if bytes.starts_with(PDF_MAGIC) {
        PDF_MEDIA_TYPE
    } else {
        declared.unwrap_or(FALLBACK_MEDIA_TYPE)
    }
}

async fn load_local(path: &Path) -> Result<Document, ResumeError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ResumeError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ResumeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ResumeError::Storage {
            target: path.display().to_string(),
            source: e,
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume.pdf".to_string());
    let media_type = sniff_media_type(&bytes, None);
    debug!("Loaded {} ({} bytes, {})", path.display(), bytes.len(), media_type);
    Ok(Document::new(name, media_type, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, ResumeError> {
    info!("Downloading resume from: {}", url);

    let download_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ResumeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ResumeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(download_err)?;

    let response = client.get(url).send().await.map_err(download_err)?;
    if !response.status().is_success() {
        return Err(ResumeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let name = file_name_from_url(url);
    let bytes = response.bytes().await.map_err(download_err)?.to_vec();

    let media_type = sniff_media_type(&bytes, declared.as_deref()).to_string();
    info!("Downloaded {} ({} bytes, {})", name, bytes.len(), media_type);
    Ok(Document::new(name, media_type, bytes))
}

/// Last path segment of the URL when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
