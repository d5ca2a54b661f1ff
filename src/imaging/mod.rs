//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Decode / encode** | `image` codecs, GIF animations kept frame by frame |
//! | **Crop, trim, extend, fit** | [`Sampler`] over `image::imageops` (Lanczos3) |
//! | **Animated frames** | coalesce → per-frame work on `rayon` → deconstruct |
//!
//! The module is split into:
//! - **Parameters**: [`Format`], [`Crop`] and friends: what a derivative looks like
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Border**: Solid-edge detection for proportional extension
//! - **Raster**: Still or animated pixels, decode/encode
//! - **Sampler**: The fixed-order derivative algorithm
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`], the byte-level seam used by storage

pub mod backend;
mod border;
pub mod calculations;
pub mod params;
pub mod raster;
pub mod rust_backend;
pub mod sampler;

pub use backend::{BackendError, Dimensions, Identified, ImageBackend, Rendered};
pub use params::{Color, Crop, FitType, Format, OutputFormat, Quality};
pub use raster::Raster;
pub use rust_backend::RustBackend;
pub use sampler::{Sampler, SamplerError, Step};
