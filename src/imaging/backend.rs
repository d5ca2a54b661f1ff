//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four byte-level operations
//! [`Storage`](crate::storage::Storage) needs from an imaging library:
//!
//! | Operation | Input | Output |
//! |---|---|---|
//! | `identify` | encoded bytes | dimensions + container |
//! | `render` | encoded source, crop, [`Format`] | encoded derivative |
//! | `flop` | encoded bytes | horizontally mirrored bytes |
//! | `normalize` | encoded bytes | re-encoded bytes without metadata |
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), which decodes into a
//! [`Raster`](super::raster::Raster) and runs the
//! [`Sampler`](super::sampler::Sampler). Tests swap in the
//! [`MockBackend`](tests::MockBackend) to count and fail renders without
//! touching pixels.

use super::params::{Crop, Format, OutputFormat};
use super::sampler::SamplerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identified {
    pub dimensions: Dimensions,
    /// Container the image is served as.
    pub format: OutputFormat,
    /// The bytes already are in `format`. When `false` (TIFF, BMP, ...)
    /// they must be re-encoded before they can be served.
    pub native: bool,
}

/// Encoded output of a backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
    pub format: OutputFormat,
}

/// Trait for image processing backends.
///
/// Implementations must be callable from many threads at once; all state
/// lives in the arguments.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions and container.
    fn identify(&self, bytes: &[u8]) -> Result<Identified, BackendError>;

    /// Produce the derivative of `source` described by `format`.
    fn render(
        &self,
        source: &[u8],
        crop: Option<&Crop>,
        format: &Format,
    ) -> Result<Rendered, BackendError>;

    /// Mirror horizontally, keeping the container.
    fn flop(&self, source: &[u8]) -> Result<Rendered, BackendError>;

    /// Re-encode without embedded metadata, keeping the container.
    fn normalize(&self, source: &[u8]) -> Result<Rendered, BackendError>;
}
