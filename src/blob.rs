//! Blob storage keyed by `(namespace, path)`.
//!
//! The blob store is flat key/value storage: the path is an opaque string
//! produced by a [`NamingStrategy`](crate::naming::NamingStrategy), and
//! writing the same key twice simply replaces the object. Retries after a
//! partial failure are therefore always safe.
//!
//! [`FsBlobStore`] maps every namespace to a bucket directory under a root:
//!
//! ```text
//! <root>/
//! ├── photos/          ← bucket of namespace "photos"
//! │   └── 000/
//! │       └── 2.jpg
//! └── formatted/
//!     └── 000/
//!         └── 2_thumb.jpg
//! ```
//!
//! Writes go to a temp file next to the target and are renamed into place,
//! so readers never see a half-written object. The content type of each
//! object is kept in a `<file>.content-type` sidecar.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),
    #[error("blob not found: {namespace}/{path}")]
    NotFound { namespace: String, path: String },
    #[error("invalid blob path: {0:?}")]
    InvalidPath(String),
}

pub trait BlobStore: Send + Sync {
    fn read(&self, namespace: &str, path: &str) -> Result<Vec<u8>, BlobError>;

    /// Store `bytes`, replacing any existing object.
    fn write(
        &self,
        namespace: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError>;

    /// Remove an object. Removing a missing object is not an error.
    fn delete(&self, namespace: &str, path: &str) -> Result<(), BlobError>;

    fn exists(&self, namespace: &str, path: &str) -> Result<bool, BlobError>;

    /// The content type the object was last written with.
    fn content_type(&self, namespace: &str, path: &str) -> Result<Option<String>, BlobError>;
}

const CONTENT_TYPE_SUFFIX: &str = ".content-type";

fn sidecar(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Bucket directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    buckets: BTreeMap<String, String>,
}

impl FsBlobStore {
    /// `buckets` maps namespace names to directory names under `root`.
    pub fn new(root: impl Into<PathBuf>, buckets: BTreeMap<String, String>) -> Self {
        Self {
            root: root.into(),
            buckets,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a blob.
    pub fn locate(&self, namespace: &str, path: &str) -> Result<PathBuf, BlobError> {
        let bucket = self
            .buckets
            .get(namespace)
            .ok_or_else(|| BlobError::UnknownNamespace(namespace.to_string()))?;
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, namespace: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        let file = self.locate(namespace, path)?;
        std::fs::read(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound {
                    namespace: namespace.to_string(),
                    path: path.to_string(),
                }
            } else {
                BlobError::Io(e)
            }
        })
    }

    fn write(
        &self,
        namespace: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError> {
        let file = self.locate(namespace, path)?;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(sidecar(&file), content_type)?;

        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut temp = file.clone().into_os_string();
        temp.push(format!(".{}-{n}.tmp", std::process::id()));
        let temp = PathBuf::from(temp);

        std::fs::write(&temp, bytes)?;
        if let Err(e) = std::fs::rename(&temp, &file) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(
            namespace,
            path,
            size = bytes.len(),
            content_type,
            "wrote blob"
        );
        Ok(())
    }

    fn delete(&self, namespace: &str, path: &str) -> Result<(), BlobError> {
        let file = self.locate(namespace, path)?;
        for file in [sidecar(&file), file] {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn exists(&self, namespace: &str, path: &str) -> Result<bool, BlobError> {
        Ok(self.locate(namespace, path)?.is_file())
    }

    fn content_type(&self, namespace: &str, path: &str) -> Result<Option<String>, BlobError> {
        let file = self.locate(namespace, path)?;
        if !file.is_file() {
            return Ok(None);
        }
        match std::fs::read_to_string(sidecar(&file)) {
            Ok(content_type) => Ok(Some(content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
