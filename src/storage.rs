//! Storage: the catalog, the blob store and the imaging backend, coordinated.
//!
//! [`Storage`] owns every side effect: catalog rows, blob writes, retries and
//! the winner/waiter protocol for on-demand derivatives. The imaging and
//! naming layers below it are pure.
//!
//! ## Derivatives
//!
//! A derivative is identified by `(source image, format name)`. Its catalog
//! association row is both the cache entry and the lock:
//!
//! ```text
//!             claim insert              success
//!   (none) ───────────────▶ processing ─────────▶ default(target)
//!                               │
//!                               │ failure / waiter timeout
//!                               ▼
//!                             failed
//! ```
//!
//! The caller whose claim insert succeeds is the **winner**: it reads the
//! source blob, renders, writes the result under the formatted namespace and
//! completes the row. Everyone else is a **waiter** and polls the row until it
//! leaves `processing`. A waiter that runs out of patience marks the row
//! `failed`, so a crashed winner never leaves a derivative stuck. `default`
//! and `failed` are terminal; [`Storage::regenerate_formatted_image`] deletes
//! the row and claims again.
//!
//! No in-process lock is involved: the protocol works the same between
//! threads and between processes sharing a catalog.
//!
//! ## Paths
//!
//! New rows get their path from [`Storage::allocate`]: bump the namespace
//! counter, ask the namespace's [`Dir`] for a path, insert. A unique
//! violation retries with a random disambiguation index drawn from a range
//! one digit wider per attempt. The catalog row is committed before the blob
//! is written; a blob write that fails afterwards leaves the row in place.

use crate::blob::{BlobError, BlobStore, FsBlobStore};
use crate::catalog::{
    Catalog, CatalogError, FormattedRecord, FormattedStatus, ImageId, ImageRecord, NewImage,
    SqliteCatalog,
};
use crate::config::{ConfigError, StorageConfig};
use crate::imaging::calculations::validate_crop;
use crate::imaging::{Crop, Format, ImageBackend, Rendered, RustBackend};
use crate::naming::{Dir, GenerateOptions, NamingConfig};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep while waiting; bounds cancellation latency.
const CANCEL_SLICE: Duration = Duration::from_millis(100);

/// Widest disambiguation range, in digits.
const MAX_INDEX_DIGITS: u32 = 18;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid crop: {0}")]
    Bounds(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("no free path in namespace {namespace:?} after {attempts} attempts")]
    CollisionExhausted { namespace: String, attempts: u32 },
    #[error("generating {format:?} for image {source_id} failed: {reason}")]
    GenerationFailed {
        source_id: ImageId,
        format: String,
        reason: String,
    },
    #[error("timed out waiting for {format:?} of image {source_id}")]
    Timeout { source_id: ImageId, format: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl From<ConfigError> for StorageError {
    fn from(e: ConfigError) -> Self {
        StorageError::Config(e.to_string())
    }
}

/// Cooperative cancellation for long-running calls.
///
/// Clones share the flag. Cancelling stops a waiter at its next poll and a
/// winner between steps; a cancelled winner marks its claim `failed`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` when
    /// cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_SLICE));
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Disambiguation index for allocation attempt `attempt`: 0 first, then a
/// uniform draw from `[10^(k-1), 10^k)` with `k = attempt`.
fn disambiguation_index(attempt: u32, rng: &mut impl Rng) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let digits = attempt.min(MAX_INDEX_DIGITS);
    let low = 10u64.pow(digits - 1);
    rng.random_range(low..low * 10)
}

/// `dir/name.ext` → `dir/name`. Dots in directory names are left alone.
fn strip_extension(path: &str) -> &str {
    let start = path.rfind('/').map_or(0, |i| i + 1);
    match path[start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..start + dot],
        _ => path,
    }
}

/// Path pattern of a derivative: `<source path without extension>_<format>`
/// plus the crop fingerprint when a crop applies.
pub fn formatted_name(source: &ImageRecord, format_name: &str, format: &Format) -> String {
    let stem = strip_extension(&source.path);
    match effective_crop(source, format) {
        Some(crop) => format!("{stem}_{format_name}_{}", crop.fingerprint()),
        None => format!("{stem}_{format_name}"),
    }
}

fn effective_crop<'a>(source: &'a ImageRecord, format: &Format) -> Option<&'a Crop> {
    source
        .crop
        .as_ref()
        .filter(|c| !c.is_empty() && !format.ignore_crop)
}

pub struct Storage<C, B, I = RustBackend> {
    catalog: C,
    blobs: B,
    backend: I,
    config: StorageConfig,
    dirs: BTreeMap<String, Dir>,
}

impl Storage<SqliteCatalog, FsBlobStore, RustBackend> {
    /// Storage backed by the SQLite file and blob directory named in
    /// `config`.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        let catalog = SqliteCatalog::open(Path::new(&config.catalog.path))?;
        let blobs = FsBlobStore::new(&config.blobs.root, config.buckets());
        Self::new(catalog, blobs, RustBackend::new(), config)
    }
}

impl<C: Catalog, B: BlobStore, I: ImageBackend> Storage<C, B, I> {
    pub fn new(catalog: C, blobs: B, backend: I, config: StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let dirs = config
            .namespaces
            .iter()
            .map(|(name, ns)| {
                // Derivative names are patterns built from the source path.
                let naming = if *name == config.formatted_namespace {
                    NamingConfig::Pattern
                } else {
                    ns.naming
                };
                (name.clone(), Dir::from_config(name.clone(), naming))
            })
            .collect();
        Ok(Self {
            catalog,
            blobs,
            backend,
            config,
            dirs,
        })
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn backend(&self) -> &I {
        &self.backend
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn image(&self, id: ImageId) -> Result<ImageRecord, StorageError> {
        self.catalog
            .image(id)?
            .ok_or_else(|| StorageError::NotFound(format!("image {id}")))
    }

    /// Every derivative association of an image.
    pub fn formatted_images(&self, id: ImageId) -> Result<Vec<FormattedRecord>, StorageError> {
        Ok(self.catalog.formatted_for_source(id)?)
    }

    /// Public location of an image: the namespace's `public_url` joined
    /// with the path, or `bucket/path` when none is configured.
    pub fn url(&self, image: &ImageRecord) -> String {
        let ns = self.config.namespaces.get(&image.namespace);
        match ns.and_then(|ns| ns.public_url.as_deref()) {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), image.path),
            None => {
                let bucket = self
                    .config
                    .bucket(&image.namespace)
                    .unwrap_or(&image.namespace);
                format!("{bucket}/{}", image.path)
            }
        }
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Store an encoded image in `namespace`.
    ///
    /// `name` is the preferred file name (serial) or path (pattern). The row
    /// is committed before the blob is written; if the write fails the error
    /// is returned and the row stays without a filesize.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn add_image_from_blob(
        &self,
        namespace: &str,
        bytes: &[u8],
        name: Option<&str>,
        crop: Option<Crop>,
    ) -> Result<ImageRecord, StorageError> {
        if !self.dirs.contains_key(namespace) {
            return Err(StorageError::NotFound(format!("namespace {namespace:?}")));
        }
        if namespace == self.config.formatted_namespace {
            return Err(StorageError::Config(format!(
                "namespace {namespace:?} is reserved for derivatives"
            )));
        }
        let identified = self
            .backend
            .identify(bytes)
            .map_err(|e| StorageError::InvalidImage(e.to_string()))?;

        let normalized;
        let (bytes, format, dims) = if identified.native {
            (bytes, identified.format, identified.dimensions)
        } else {
            normalized = self
                .backend
                .normalize(bytes)
                .map_err(|e| StorageError::InvalidImage(e.to_string()))?;
            (
                normalized.bytes.as_slice(),
                normalized.format,
                normalized.dimensions,
            )
        };

        let crop = match crop.filter(|c| !c.is_empty()) {
            Some(crop) => Some(
                validate_crop(crop, (dims.width, dims.height)).ok_or_else(|| {
                    StorageError::Bounds(format!(
                        "{crop} is out of bounds for a {}x{} image",
                        dims.width, dims.height
                    ))
                })?,
            ),
            None => None,
        };

        let image = self.allocate(namespace, name, format.extension(), |path| {
            self.catalog.insert_image(&NewImage {
                width: dims.width,
                height: dims.height,
                namespace: namespace.to_string(),
                path: path.to_string(),
                crop,
            })
        })?;

        self.blobs
            .write(namespace, &image.path, bytes, format.content_type())?;
        let filesize = bytes.len() as u64;
        self.catalog.set_image_filesize(image.id, filesize)?;

        info!(id = image.id, path = %image.path, "stored image");
        Ok(ImageRecord {
            filesize: Some(filesize),
            ..image
        })
    }

    /// Store an image file. The file stem is the preferred name unless
    /// `name` is given.
    pub fn add_image_from_file(
        &self,
        namespace: &str,
        file: &Path,
        name: Option<&str>,
        crop: Option<Crop>,
    ) -> Result<ImageRecord, StorageError> {
        let bytes = std::fs::read(file)?;
        let stem = file.file_stem().and_then(|s| s.to_str());
        self.add_image_from_blob(namespace, &bytes, name.or(stem), crop)
    }

    // =========================================================================
    // Path allocation
    // =========================================================================

    /// Find a free path in `namespace` and commit it with `commit`.
    ///
    /// `commit` runs the catalog write that claims the path; a
    /// `UniqueViolation` from it means the path is taken and triggers
    /// another attempt, up to `coordination.max_insert_attempts`.
    fn allocate<T>(
        &self,
        namespace: &str,
        name: Option<&str>,
        extension: &str,
        mut commit: impl FnMut(&str) -> Result<T, CatalogError>,
    ) -> Result<T, StorageError> {
        let dir = self
            .dirs
            .get(namespace)
            .ok_or_else(|| StorageError::NotFound(format!("namespace {namespace:?}")))?;
        let attempts = self.config.coordination.max_insert_attempts;
        let mut rng = rand::rng();

        for attempt in 0..attempts {
            let count = self.catalog.increment_dir_counter(dir.namespace())?;
            let path = dir.generate(&GenerateOptions {
                count,
                index: disambiguation_index(attempt, &mut rng),
                name,
                extension,
            });
            match commit(&path) {
                Ok(committed) => return Ok(committed),
                Err(CatalogError::UniqueViolation) => {
                    debug!(namespace, path, attempt, "path taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(namespace, attempts, "path allocation exhausted");
        Err(StorageError::CollisionExhausted {
            namespace: namespace.to_string(),
            attempts,
        })
    }

    // =========================================================================
    // Derivatives
    // =========================================================================

    /// The derivative of image `id` in format `format_name`, generating it
    /// if nobody has.
    ///
    /// Concurrent calls for the same pair, in this process or others
    /// sharing the catalog, render at most once. A call that finds another
    /// caller generating blocks for up to `poll_interval × max_poll_attempts`.
    #[tracing::instrument(skip(self, cancel))]
    pub fn formatted_image(
        &self,
        id: ImageId,
        format_name: &str,
        cancel: &CancelToken,
    ) -> Result<ImageRecord, StorageError> {
        let format = self.format(format_name)?;

        if let Some(row) = self.catalog.formatted(id, format_name)? {
            return match row.status {
                FormattedStatus::Default => self.resolve_target(&row),
                FormattedStatus::Failed => Err(self.failed_earlier(&row)),
                FormattedStatus::Processing => self.wait_for(id, format_name, cancel),
            };
        }

        let source = self.image(id)?;
        match self.catalog.claim_formatted(id, format_name) {
            Ok(()) => {
                debug!("claimed derivative");
                self.generate(&source, format_name, format, cancel)
            }
            Err(CatalogError::UniqueViolation) => {
                debug!("derivative claimed elsewhere, waiting");
                self.wait_for(id, format_name, cancel)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the derivative of image `id` in format `format_name` (whatever
    /// its state) and generate it again.
    #[tracing::instrument(skip(self, cancel))]
    pub fn regenerate_formatted_image(
        &self,
        id: ImageId,
        format_name: &str,
        cancel: &CancelToken,
    ) -> Result<ImageRecord, StorageError> {
        self.format(format_name)?;
        self.image(id)?;
        if let Some(row) = self.catalog.formatted(id, format_name)? {
            self.drop_derivative(&row)?;
        }
        self.formatted_image(id, format_name, cancel)
    }

    fn format(&self, name: &str) -> Result<&Format, StorageError> {
        self.config
            .format(name)
            .ok_or_else(|| StorageError::NotFound(format!("format {name:?}")))
    }

    fn resolve_target(&self, row: &FormattedRecord) -> Result<ImageRecord, StorageError> {
        let target = row.target_id.ok_or_else(|| StorageError::GenerationFailed {
            source_id: row.source_id,
            format: row.format.clone(),
            reason: "completed without a target image".to_string(),
        })?;
        self.image(target)
    }

    fn failed_earlier(&self, row: &FormattedRecord) -> StorageError {
        StorageError::GenerationFailed {
            source_id: row.source_id,
            format: row.format.clone(),
            reason: "an earlier generation failed; regenerate to retry".to_string(),
        }
    }

    /// Winner path: produce the derivative and settle the claim.
    fn generate(
        &self,
        source: &ImageRecord,
        format_name: &str,
        format: &Format,
        cancel: &CancelToken,
    ) -> Result<ImageRecord, StorageError> {
        let target = match self.produce(source, format_name, format, cancel) {
            Ok(target) => target,
            Err(err) => {
                warn!(error = %err, "derivative generation failed");
                if let Err(e) = self.catalog.fail_formatted(source.id, format_name) {
                    warn!(error = %e, "could not mark derivative failed");
                }
                return Err(err);
            }
        };

        if self
            .catalog
            .complete_formatted(source.id, format_name, target.id)?
        {
            info!(target_id = target.id, path = %target.path, "derivative ready");
            Ok(target)
        } else {
            // A waiter gave up on us and marked the claim failed.
            warn!(target_id = target.id, "claim expired before completion, derivative orphaned");
            Err(StorageError::Timeout {
                source_id: source.id,
                format: format_name.to_string(),
            })
        }
    }

    fn produce(
        &self,
        source: &ImageRecord,
        format_name: &str,
        format: &Format,
        cancel: &CancelToken,
    ) -> Result<ImageRecord, StorageError> {
        let failed = |reason: String| StorageError::GenerationFailed {
            source_id: source.id,
            format: format_name.to_string(),
            reason,
        };

        cancel.check()?;
        let bytes = self
            .blobs
            .read(&source.namespace, &source.path)
            .map_err(|e| failed(e.to_string()))?;

        cancel.check()?;
        let rendered = self
            .backend
            .render(&bytes, effective_crop(source, format), format)
            .map_err(|e| failed(e.to_string()))?;

        cancel.check()?;
        let namespace = self.config.formatted_namespace.as_str();
        let name = formatted_name(source, format_name, format);
        let target = self.allocate(
            namespace,
            Some(name.as_str()),
            rendered.format.extension(),
            |path| {
                self.catalog.insert_image(&NewImage {
                    width: rendered.dimensions.width,
                    height: rendered.dimensions.height,
                    namespace: namespace.to_string(),
                    path: path.to_string(),
                    crop: None,
                })
            },
        )?;

        self.blobs
            .write(
                namespace,
                &target.path,
                &rendered.bytes,
                rendered.format.content_type(),
            )
            .map_err(|e| failed(e.to_string()))?;
        let filesize = rendered.bytes.len() as u64;
        self.catalog.set_image_filesize(target.id, filesize)?;

        Ok(ImageRecord {
            filesize: Some(filesize),
            ..target
        })
    }

    /// Waiter path: poll until the winner settles the claim or the budget
    /// runs out.
    fn wait_for(
        &self,
        source_id: ImageId,
        format_name: &str,
        cancel: &CancelToken,
    ) -> Result<ImageRecord, StorageError> {
        let coordination = &self.config.coordination;
        let vanished = || StorageError::GenerationFailed {
            source_id,
            format: format_name.to_string(),
            reason: "the claim was removed while waiting".to_string(),
        };

        for attempt in 1..=coordination.max_poll_attempts {
            if !cancel.sleep(coordination.poll_interval()) {
                return Err(StorageError::Cancelled);
            }
            let row = self
                .catalog
                .formatted(source_id, format_name)?
                .ok_or_else(vanished)?;
            match row.status {
                FormattedStatus::Processing => debug!(attempt, "still processing"),
                FormattedStatus::Default => return self.resolve_target(&row),
                FormattedStatus::Failed => return Err(self.failed_earlier(&row)),
            }
        }

        if self.catalog.fail_formatted(source_id, format_name)? {
            warn!(
                attempts = coordination.max_poll_attempts,
                "derivative still processing, marked failed"
            );
            return Err(StorageError::Timeout {
                source_id,
                format: format_name.to_string(),
            });
        }

        // The winner settled the row between the last poll and now.
        let row = self
            .catalog
            .formatted(source_id, format_name)?
            .ok_or_else(vanished)?;
        match row.status {
            FormattedStatus::Default => self.resolve_target(&row),
            _ => Err(self.failed_earlier(&row)),
        }
    }

    /// Remove an association along with its target image and blob.
    fn drop_derivative(&self, row: &FormattedRecord) -> Result<(), StorageError> {
        if let Some(target) = row.target_id
            && let Some(image) = self.catalog.image(target)?
        {
            self.blobs.delete(&image.namespace, &image.path)?;
            self.catalog.delete_image(image.id)?;
        }
        self.catalog.delete_formatted(row.source_id, &row.format)?;
        Ok(())
    }

    /// Remove every derivative of an image.
    fn purge_derivatives(&self, id: ImageId) -> Result<usize, StorageError> {
        let rows = self.catalog.formatted_for_source(id)?;
        for row in &rows {
            self.drop_derivative(row)?;
        }
        if !rows.is_empty() {
            debug!(id, count = rows.len(), "purged derivatives");
        }
        Ok(rows.len())
    }

    // =========================================================================
    // Metadata mutators
    // =========================================================================

    /// Move an image to a path generated from `name` in its namespace.
    #[tracing::instrument(skip(self))]
    pub fn rename_image(&self, id: ImageId, name: &str) -> Result<ImageRecord, StorageError> {
        let image = self.image(id)?;
        let bytes = self.blobs.read(&image.namespace, &image.path)?;
        let content_type = self
            .backend
            .identify(&bytes)
            .map_err(|e| StorageError::InvalidImage(e.to_string()))?
            .format
            .content_type();
        let extension = image
            .path
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.contains('/'))
            .unwrap_or_default();

        let path = self.allocate(&image.namespace, Some(name), extension, |path| {
            self.catalog
                .update_image_path(id, path)
                .map(|()| path.to_string())
        })?;
        if path == image.path {
            return Ok(image);
        }

        self.blobs
            .write(&image.namespace, &path, &bytes, content_type)?;
        self.blobs.delete(&image.namespace, &image.path)?;
        info!(from = %image.path, to = %path, "renamed image");
        Ok(ImageRecord { path, ..image })
    }

    /// Replace the stored crop (or clear it with `None`) and drop the
    /// derivatives made with the old one.
    #[tracing::instrument(skip(self))]
    pub fn set_crop(&self, id: ImageId, crop: Option<Crop>) -> Result<ImageRecord, StorageError> {
        let image = self.image(id)?;
        let crop = match crop.filter(|c| !c.is_empty()) {
            Some(crop) => Some(
                validate_crop(crop, (image.width, image.height)).ok_or_else(|| {
                    StorageError::Bounds(format!(
                        "{crop} is out of bounds for a {}x{} image",
                        image.width, image.height
                    ))
                })?,
            ),
            None => None,
        };
        self.catalog.set_image_crop(id, crop.as_ref())?;
        self.purge_derivatives(id)?;
        Ok(ImageRecord { crop, ..image })
    }

    /// Delete an image, its blob and all of its derivatives. Removing a
    /// derivative also drops its association, so the next request renders
    /// it again.
    #[tracing::instrument(skip(self))]
    pub fn remove_image(&self, id: ImageId) -> Result<(), StorageError> {
        let image = self.image(id)?;
        self.purge_derivatives(id)?;
        if let Some(row) = self.catalog.formatted_for_target(id)? {
            self.catalog.delete_formatted(row.source_id, &row.format)?;
        }
        self.blobs.delete(&image.namespace, &image.path)?;
        self.catalog.delete_image(id)?;
        info!(path = %image.path, "removed image");
        Ok(())
    }

    /// Mirror an image horizontally in place. The stored crop is mirrored
    /// with it.
    #[tracing::instrument(skip(self))]
    pub fn flop_image(&self, id: ImageId) -> Result<ImageRecord, StorageError> {
        let image = self.image(id)?;
        let bytes = self.blobs.read(&image.namespace, &image.path)?;
        let flopped = self
            .backend
            .flop(&bytes)
            .map_err(|e| StorageError::InvalidImage(e.to_string()))?;

        let crop = image.crop.map(|c| Crop {
            left: image.width.saturating_sub(c.left + c.width),
            ..c
        });
        self.rewrite(image, flopped, crop)
    }

    /// Re-encode an image without metadata and correct its stored
    /// dimensions from the decoded pixels.
    #[tracing::instrument(skip(self))]
    pub fn normalize_image(&self, id: ImageId) -> Result<ImageRecord, StorageError> {
        let image = self.image(id)?;
        let bytes = self.blobs.read(&image.namespace, &image.path)?;
        let normalized = self
            .backend
            .normalize(&bytes)
            .map_err(|e| StorageError::InvalidImage(e.to_string()))?;
        let crop = image.crop;
        self.rewrite(image, normalized, crop)
    }

    /// Overwrite an image's blob with new pixels and bring its row in line.
    fn rewrite(
        &self,
        image: ImageRecord,
        rendered: Rendered,
        crop: Option<Crop>,
    ) -> Result<ImageRecord, StorageError> {
        let (width, height) = (rendered.dimensions.width, rendered.dimensions.height);
        // A crop that no longer fits is dropped rather than rejected.
        let crop = crop.and_then(|c| validate_crop(c, (width, height)));

        self.blobs.write(
            &image.namespace,
            &image.path,
            &rendered.bytes,
            rendered.format.content_type(),
        )?;
        let filesize = rendered.bytes.len() as u64;
        self.catalog.update_image_dimensions(image.id, width, height)?;
        self.catalog.set_image_filesize(image.id, filesize)?;
        self.catalog.set_image_crop(image.id, crop.as_ref())?;
        self.purge_derivatives(image.id)?;

        Ok(ImageRecord {
            width,
            height,
            filesize: Some(filesize),
            crop,
            ..image
        })
    }
}
