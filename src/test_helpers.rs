//! Shared test utilities for the rendition test suite.
//!
//! Provides synthetic image encoders, an in-memory blob store, and a
//! [`Storage`] wired to the [`MockBackend`] so coordination tests run
//! without decoding a single pixel.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let storage = mock_storage();
//! let image = storage
//!     .add_image_from_blob("photos", b"bytes", None, None)
//!     .unwrap();
//! let thumb = storage
//!     .formatted_image(image.id, "thumb", &CancelToken::new())
//!     .unwrap();
//! assert_eq!(storage.backend().render_count(), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageEncoder, Rgba, RgbaImage};

use crate::blob::{BlobError, BlobStore};
use crate::catalog::SqliteCatalog;
use crate::config::{CoordinationConfig, NamespaceConfig, StorageConfig};
use crate::imaging::backend::tests::MockBackend;
use crate::imaging::{Color, FitType, Format, OutputFormat};
use crate::naming::NamingConfig;
use crate::storage::Storage;

// =========================================================================
// Synthetic images
// =========================================================================

/// Encode an RGBA PNG whose red channel is `x % 256` and green channel
/// `y % 256`, so tests can tell where a pixel came from.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// Encode a looping GIF of `frames` solid frames with distinct colors.
pub fn animated_gif_bytes(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for i in 0..frames {
            let shade = (i * 60 % 256) as u8;
            let img = RgbaImage::from_pixel(width, height, Rgba([shade, 255 - shade, 0, 255]));
            encoder
                .encode_frame(Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1)))
                .unwrap();
        }
    }
    buf
}

// =========================================================================
// In-memory blob store
// =========================================================================

/// Blob store backed by a map. Records the content type of every write;
/// writes can be made to fail with [`MemoryBlobStore::fail_writes`].
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, String)>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn key(namespace: &str, path: &str) -> (String, String) {
    (namespace.to_string(), path.to_string())
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, namespace: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(namespace, path))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| BlobError::NotFound {
                namespace: namespace.to_string(),
                path: path.to_string(),
            })
    }

    fn write(
        &self,
        namespace: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BlobError::Io(std::io::Error::other("disk full")));
        }
        self.objects.lock().unwrap().insert(
            key(namespace, path),
            (bytes.to_vec(), content_type.to_string()),
        );
        Ok(())
    }

    fn delete(&self, namespace: &str, path: &str) -> Result<(), BlobError> {
        self.objects.lock().unwrap().remove(&key(namespace, path));
        Ok(())
    }

    fn exists(&self, namespace: &str, path: &str) -> Result<bool, BlobError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&key(namespace, path)))
    }

    fn content_type(&self, namespace: &str, path: &str) -> Result<Option<String>, BlobError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&key(namespace, path))
            .map(|(_, content_type)| content_type.clone()))
    }
}

// =========================================================================
// Storage setup
// =========================================================================

pub type MockStorage = Storage<SqliteCatalog, MemoryBlobStore, MockBackend>;

/// Config with short coordination budgets.
///
/// | Namespace | Naming | Bucket |
/// |---|---|---|
/// | `photos` | serial, depth 0 | `photos`, public URL `https://cdn.example.com/photos` |
/// | `avatars` | pattern | `avatars` |
/// | `formatted` | pattern | `derivatives` |
///
/// | Format | Description |
/// |---|---|
/// | `thumb` | 100x100 inner, JPEG |
/// | `fit` | width 50 |
/// | `card` | 102x149 outer on red |
/// | `raw` | no resize, ignores the stored crop |
pub fn test_config() -> StorageConfig {
    let namespaces = BTreeMap::from([
        (
            "photos".to_string(),
            NamespaceConfig {
                public_url: Some("https://cdn.example.com/photos".to_string()),
                naming: NamingConfig::Serial { depth: 0 },
                ..NamespaceConfig::default()
            },
        ),
        (
            "avatars".to_string(),
            NamespaceConfig {
                naming: NamingConfig::Pattern,
                ..NamespaceConfig::default()
            },
        ),
        (
            "formatted".to_string(),
            NamespaceConfig {
                bucket: Some("derivatives".to_string()),
                naming: NamingConfig::Pattern,
                ..NamespaceConfig::default()
            },
        ),
    ]);
    let formats = BTreeMap::from([
        (
            "thumb".to_string(),
            Format {
                width: Some(100),
                height: Some(100),
                fit_type: Some(FitType::Inner),
                output: Some(OutputFormat::Jpeg),
                ..Format::default()
            },
        ),
        (
            "fit".to_string(),
            Format {
                width: Some(50),
                ..Format::default()
            },
        ),
        (
            "card".to_string(),
            Format {
                width: Some(102),
                height: Some(149),
                fit_type: Some(FitType::Outer),
                background: Some(Color([255, 0, 0, 255])),
                ..Format::default()
            },
        ),
        (
            "raw".to_string(),
            Format {
                ignore_crop: true,
                ..Format::default()
            },
        ),
    ]);
    StorageConfig {
        coordination: CoordinationConfig {
            poll_interval_ms: 10,
            max_poll_attempts: 5,
            max_insert_attempts: 5,
        },
        namespaces,
        formats,
        ..StorageConfig::default()
    }
}

/// In-memory catalog and blobs, mock imaging, [`test_config`].
pub fn mock_storage() -> MockStorage {
    mock_storage_with(test_config())
}

pub fn mock_storage_with(config: StorageConfig) -> MockStorage {
    Storage::new(
        SqliteCatalog::open_in_memory().unwrap(),
        MemoryBlobStore::new(),
        MockBackend::new(),
        config,
    )
    .unwrap()
}
