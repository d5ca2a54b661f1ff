//! The relational catalog: image rows, derivative associations, counters.
//!
//! The catalog is the only arbiter between concurrent writers. Two of its
//! unique constraints carry the coordination protocol in
//! [`storage`](crate::storage):
//!
//! | Table | Unique key | Used for |
//! |---|---|---|
//! | `images` | `(namespace, path)` | path allocation: a conflict means "pick another path" |
//! | `formatted_images` | `(source_id, format)` | derivative claims: the first insert wins |
//! | `dir_counters` | `namespace` | atomic per-namespace allocation counter |
//!
//! Every [`Catalog`] method is a single autocommit statement, so a
//! constraint violation is reported as [`CatalogError::UniqueViolation`]
//! and never leaves a half-applied change behind.

mod sqlite;

pub use sqlite::SqliteCatalog;

use crate::imaging::Crop;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type ImageId = i64;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("image {0} not found")]
    NotFound(ImageId),
    #[error("catalog error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("catalog connection poisoned by a panicked writer")]
    Poisoned,
}

/// A stored image: an upload or a derivative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    /// Set once the blob has been written.
    pub filesize: Option<u64>,
    pub namespace: String,
    pub path: String,
    /// Caller-declared region of interest.
    pub crop: Option<Crop>,
    /// The bytes live in the blob store (as opposed to an external URL).
    pub in_blob_store: bool,
}

/// Fields of an image row before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub width: u32,
    pub height: u32,
    pub namespace: String,
    pub path: String,
    pub crop: Option<Crop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormattedStatus {
    /// Claimed; a winner is generating it.
    Processing,
    /// Generated; `target_id` points at the derivative.
    Default,
    /// Generation failed or its winner vanished.
    Failed,
}

impl FormattedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FormattedStatus::Processing => "processing",
            FormattedStatus::Default => "default",
            FormattedStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FormattedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormattedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(FormattedStatus::Processing),
            "default" => Ok(FormattedStatus::Default),
            "failed" => Ok(FormattedStatus::Failed),
            other => Err(format!("unknown formatted status: {other:?}")),
        }
    }
}

/// Association between a source image and one of its derivatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedRecord {
    pub source_id: ImageId,
    pub format: String,
    pub status: FormattedStatus,
    pub target_id: Option<ImageId>,
}

/// Persistent catalog operations.
///
/// Implementations must be shareable across threads; separate instances
/// pointed at the same database must see each other's committed writes.
pub trait Catalog: Send + Sync {
    fn image(&self, id: ImageId) -> Result<Option<ImageRecord>, CatalogError>;

    /// Insert an image row. `UniqueViolation` if `(namespace, path)` is taken.
    fn insert_image(&self, image: &NewImage) -> Result<ImageRecord, CatalogError>;

    /// Move an image to a new path. `UniqueViolation` if the path is taken.
    fn update_image_path(&self, id: ImageId, path: &str) -> Result<(), CatalogError>;

    fn update_image_dimensions(
        &self,
        id: ImageId,
        width: u32,
        height: u32,
    ) -> Result<(), CatalogError>;

    fn set_image_filesize(&self, id: ImageId, filesize: u64) -> Result<(), CatalogError>;

    fn set_image_crop(&self, id: ImageId, crop: Option<&Crop>) -> Result<(), CatalogError>;

    fn delete_image(&self, id: ImageId) -> Result<(), CatalogError>;

    /// Atomically bump the namespace counter, creating it at 1 if absent.
    /// Returns the value after the increment.
    fn increment_dir_counter(&self, namespace: &str) -> Result<u64, CatalogError>;

    fn formatted(
        &self,
        source_id: ImageId,
        format: &str,
    ) -> Result<Option<FormattedRecord>, CatalogError>;

    fn formatted_for_source(&self, source_id: ImageId)
    -> Result<Vec<FormattedRecord>, CatalogError>;

    /// The association whose derivative is image `target_id`, if any.
    fn formatted_for_target(
        &self,
        target_id: ImageId,
    ) -> Result<Option<FormattedRecord>, CatalogError>;

    /// Insert a `Processing` association. `UniqueViolation` if any row for
    /// the pair exists, meaning another caller holds or held the claim.
    fn claim_formatted(&self, source_id: ImageId, format: &str) -> Result<(), CatalogError>;

    /// `Processing` → `Default`. Returns `false` if the row was no longer
    /// `Processing`.
    fn complete_formatted(
        &self,
        source_id: ImageId,
        format: &str,
        target_id: ImageId,
    ) -> Result<bool, CatalogError>;

    /// `Processing` → `Failed`. Returns `false` if the row was no longer
    /// `Processing`.
    fn fail_formatted(&self, source_id: ImageId, format: &str) -> Result<bool, CatalogError>;

    fn delete_formatted(&self, source_id: ImageId, format: &str) -> Result<(), CatalogError>;
}
