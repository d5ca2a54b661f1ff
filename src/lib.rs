//! # Rendition
//!
//! On-demand image derivatives for a content site: thumbnails, avatars,
//! gallery sizes. Source images are uploaded into namespaces; derivatives
//! are requested by format name and generated the first time someone asks.
//!
//! # Architecture: Pure Core, Coordinating Shell
//!
//! ```text
//! caller ─▶ Storage::formatted_image(id, "thumb")
//!             │
//!             ├─ catalog: association row present? ──▶ return target
//!             │
//!             └─ claim row (unique insert)
//!                  ├─ won:  blob read → Sampler → allocate path → blob write → complete row
//!                  └─ lost: poll the row until the winner settles it
//! ```
//!
//! Everything that touches pixels or paths is a pure function:
//! [`imaging::Sampler`] turns a raster, a crop and a [`imaging::Format`] into
//! a new raster, and [`naming`] turns a counter and a preferred name into a
//! path. [`storage::Storage`] owns every side effect and is generic over its
//! three collaborators, so tests swap in in-memory or mock versions:
//!
//! | Seam | Trait | Production implementation |
//! |------|-------|---------------------------|
//! | Catalog | [`catalog::Catalog`] | [`catalog::SqliteCatalog`] (rusqlite) |
//! | Blobs | [`blob::BlobStore`] | [`blob::FsBlobStore`] (bucket directories) |
//! | Pixels | [`imaging::ImageBackend`] | [`imaging::RustBackend`] (`image` crate) |
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Format descriptors, fit geometry, rasters, the Sampler, backends |
//! | [`naming`] | Serial and Pattern naming strategies, segment sanitizing |
//! | [`catalog`] | Image rows, derivative association rows, namespace counters |
//! | [`blob`] | Flat `(namespace, path)` blob storage |
//! | [`storage`] | Uploads, path allocation, the winner/waiter protocol, mutators |
//! | [`config`] | `rendition.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Catalog Is the Lock
//!
//! At-most-once generation of a derivative relies on nothing but the
//! catalog's unique key on `(source, format)`. Whoever inserts the
//! `processing` row renders; everyone else polls. There is no in-process
//! mutex, so the guarantee holds between processes that share the SQLite
//! file just as it does between threads. A waiter that outlives its budget
//! marks the row `failed`, so a crashed winner cannot wedge a derivative.
//!
//! ## Rows Before Blobs
//!
//! A path is claimed by inserting its catalog row; the blob is written
//! afterwards. A crash in between leaves a row whose blob is missing, which
//! readers treat as transient. Blob writes are idempotent overwrites, so
//! retrying is always safe.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling) for
//! every codec and transform, with rayon fanning out over animation frames.
//! No ImageMagick, no system libraries.

pub mod blob;
pub mod catalog;
pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;
