//! Storage collaborators: a blob store for the uploaded resume and its
//! raster, and a key-value store for analysis records.
//!
//! Only the contracts matter to the pipeline:
//!
//! * [`BlobStore::upload`] returns `Ok(None)` when the backend accepted the
//!   call but produced no addressable reference. The pipeline reports that
//!   as [`crate::error::FailureReason::NoPath`], not as an I/O error.
//! * [`KvStore::set`] returns `Ok(false)` when the backend rejected the
//!   write; the pipeline reports [`crate::error::FailureReason::WriteFailed`].
//!
//! Two backends ship with the crate: directory-backed stores for the CLI
//! and in-memory stores for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::error::ResumeError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `name`; returns the reference
    /// to read it back, or `None` if the backend produced none.
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<Option<String>, ResumeError>;

    async fn read(&self, reference: &str) -> Result<Vec<u8>, ResumeError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns `false` when the write was not accepted.
    async fn set(&self, key: &str, value: &str) -> Result<bool, ResumeError>;

    async fn get(&self, key: &str) -> Result<Option<String>, ResumeError>;
}

// ── Filesystem backends ──────────────────────────────────────────────────

/// Blobs stored as `<root>/<uuid>/<name>`; the reference is `/<uuid>/<name>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, ResumeError> {
        let relative = Path::new(reference.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ResumeError::MissingObject {
                reference: reference.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<Option<String>, ResumeError> {
        let file_name = sanitize_file_name(name);
        let reference = format!("/{}/{}", Uuid::new_v4(), file_name);
        let path = self.resolve(&reference)?;
        write_atomic(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), reference);
        Ok(Some(reference))
    }

    async fn read(&self, reference: &str) -> Result<Vec<u8>, ResumeError> {
        let path = self.resolve(reference)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResumeError::MissingObject {
                    reference: reference.to_string(),
                }
            } else {
                ResumeError::Storage {
                    target: reference.to_string(),
                    source: e,
                }
            }
        })
    }
}

/// One JSON file per key under `root`. Keys are escaped so `resume:<uuid>`
/// is a valid file name on every platform.
#[derive(Debug, Clone)]
pub struct FsKvStore {
    root: PathBuf,
}

impl FsKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", escape_key(key)))
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<bool, ResumeError> {
        write_atomic(&self.path_for(key), value.as_bytes()).await?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ResumeError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ResumeError::Storage {
                target: key.to_string(),
                source: e,
            }),
        }
    }
}

/// Write to a sibling temp file, then rename, so readers never observe a
/// partially written value.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ResumeError> {
    let storage_err = |source| ResumeError::Storage {
        target: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(storage_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(storage_err)?;
    Ok(())
}

fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

// ── In-memory backends ───────────────────────────────────────────────────

/// Blobs kept in a map; references look like `mem://<n>/<name>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<Option<String>, ResumeError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let reference = format!("mem://{}/{}", objects.len(), sanitize_file_name(name));
        objects.insert(reference.clone(), bytes.to_vec());
        Ok(Some(reference))
    }

    async fn read(&self, reference: &str) -> Result<Vec<u8>, ResumeError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
            .ok_or_else(|| ResumeError::MissingObject {
                reference: reference.to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<bool, ResumeError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ResumeError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let reference = store.upload(b"%PDF-1.7", "cv.pdf").await.unwrap().unwrap();
        assert!(reference.ends_with("/cv.pdf"), "got {reference}");
        assert_eq!(store.read(&reference).await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn fs_blob_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.read("/../etc/passwd").await.unwrap_err();
        assert!(matches!(err, ResumeError::MissingObject { .. }));
    }

    #[tokio::test]
    async fn fs_blob_strips_directories_from_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let reference = store.upload(b"x", "../../evil.png").await.unwrap().unwrap();
        assert!(reference.ends_with("/evil.png"));
        assert!(!reference.contains(".."));
    }

    #[tokio::test]
    async fn fs_kv_set_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKvStore::new(dir.path());
        assert_eq!(store.get("resume:1").await.unwrap(), None);
        assert!(store.set("resume:1", "{\"a\":1}").await.unwrap());
        assert!(store.set("resume:1", "{\"a\":2}").await.unwrap());
        assert_eq!(store.get("resume:1").await.unwrap().as_deref(), Some("{\"a\":2}"));
        assert!(dir.path().join("resume%3A1.json").exists());
    }

    #[tokio::test]
    async fn memory_stores() {
        let blobs = MemoryBlobStore::new();
        let r = blobs.upload(b"abc", "a.png").await.unwrap().unwrap();
        assert_eq!(blobs.read(&r).await.unwrap(), b"abc");
        assert!(blobs.read("mem://9/nope").await.is_err());

        let kv = MemoryKvStore::new();
        kv.set("k", "v").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(kv.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn escape_key_is_filesystem_safe() {
        assert_eq!(escape_key("resume:ab-c_1.x"), "resume%3Aab-c_1.x");
        assert_eq!(escape_key("a/b"), "a%2Fb");
    }
}
