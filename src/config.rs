//! Storage configuration module.
//!
//! Handles loading, validating, and merging `rendition.toml`. Stock defaults
//! are the base layer; the user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! formatted_namespace = "formatted"  # Namespace derivatives are written to
//!
//! [catalog]
//! path = "rendition.db"     # SQLite catalog file
//!
//! [blobs]
//! root = "blobs"            # Directory holding one sub-directory per bucket
//!
//! [coordination]
//! poll_interval_ms = 1000   # How often a waiter re-reads a claimed derivative
//! max_poll_attempts = 15    # Waiter budget before the claim is declared dead
//! max_insert_attempts = 5   # Path allocation attempts before giving up
//!
//! [namespaces.images]
//! # bucket = "images"       # Bucket directory (defaults to the namespace name)
//! # public_url = "https://cdn.example.com/images"
//! naming = { strategy = "serial", depth = 2 }
//!
//! [namespaces.formatted]
//! naming = { strategy = "pattern" }
//!
//! [formats.thumb]
//! width = 200
//! height = 200
//! fit_type = "inner"        # inner | outer | maximum
//! quality = 85
//! ```
//!
//! ## Partial Configuration
//!
//! Namespaces and formats are merged by name: adding `[formats.avatar]`
//! keeps the stock formats, and `[formats.thumb] quality = 70` changes just
//! that value. A `naming` table replaces the stock one as a whole, since its
//! fields depend on the strategy.
//!
//! Unknown keys, fit types and naming strategies are rejected to catch
//! typos early.

use crate::imaging::{FitType, Format, OutputFormat, Quality};
use crate::naming::NamingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Storage configuration loaded from `rendition.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Reserved namespace that derivatives are written to.
    pub formatted_namespace: String,
    pub catalog: CatalogConfig,
    pub blobs: BlobsConfig,
    /// Winner/waiter and path allocation budgets.
    pub coordination: CoordinationConfig,
    pub namespaces: BTreeMap<String, NamespaceConfig>,
    /// Derivative descriptions, looked up by name.
    pub formats: BTreeMap<String, Format>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let namespaces = BTreeMap::from([
            (
                "formatted".to_string(),
                NamespaceConfig {
                    naming: NamingConfig::Pattern,
                    ..NamespaceConfig::default()
                },
            ),
            (
                "images".to_string(),
                NamespaceConfig {
                    naming: NamingConfig::Serial { depth: 2 },
                    ..NamespaceConfig::default()
                },
            ),
        ]);
        let formats = BTreeMap::from([
            (
                "thumb".to_string(),
                Format {
                    width: Some(200),
                    height: Some(200),
                    fit_type: Some(FitType::Inner),
                    quality: Some(Quality::new(85)),
                    ..Format::default()
                },
            ),
            (
                "large".to_string(),
                Format {
                    width: Some(1600),
                    height: Some(1600),
                    fit_type: Some(FitType::Maximum),
                    reduce_only: true,
                    output: Some(OutputFormat::Webp),
                    ..Format::default()
                },
            ),
        ]);
        Self {
            formatted_namespace: "formatted".to_string(),
            catalog: CatalogConfig::default(),
            blobs: BlobsConfig::default(),
            coordination: CoordinationConfig::default(),
            namespaces,
            formats,
        }
    }
}

impl StorageConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.coordination;
        if c.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "coordination.poll_interval_ms must be positive".into(),
            ));
        }
        if c.max_poll_attempts == 0 || c.max_insert_attempts == 0 {
            return Err(ConfigError::Validation(
                "coordination attempt budgets must be at least 1".into(),
            ));
        }

        match self.namespaces.get(&self.formatted_namespace) {
            None => {
                return Err(ConfigError::Validation(format!(
                    "formatted namespace {:?} is not configured under [namespaces]",
                    self.formatted_namespace
                )));
            }
            Some(ns) if ns.naming != NamingConfig::Pattern => {
                return Err(ConfigError::Validation(format!(
                    "namespaces.{}.naming must use the pattern strategy",
                    self.formatted_namespace
                )));
            }
            Some(_) => {}
        }
        for (name, ns) in &self.namespaces {
            if ns.bucket.as_deref().is_some_and(|b| b.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "namespaces.{name}.bucket must not be empty"
                )));
            }
        }

        for (name, format) in &self.formats {
            validate_format(name, format)?;
        }
        Ok(())
    }

    pub fn format(&self, name: &str) -> Option<&Format> {
        self.formats.get(name)
    }

    /// Bucket directory of a namespace.
    pub fn bucket<'a>(&'a self, namespace: &'a str) -> Option<&'a str> {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.bucket.as_deref().unwrap_or(namespace))
    }

    /// Namespace → bucket for every configured namespace.
    pub fn buckets(&self) -> BTreeMap<String, String> {
        self.namespaces
            .keys()
            .filter_map(|ns| Some((ns.clone(), self.bucket(ns)?.to_string())))
            .collect()
    }
}

fn validate_format(name: &str, format: &Format) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::Validation(format!("formats.{name}: {msg}")));
    if format.width == Some(0) || format.height == Some(0) {
        return invalid("width and height must be positive");
    }
    if format.fit_type.is_some() && format.target_box().is_none() {
        return invalid("fit_type needs both width and height");
    }
    for ratio in [format.widest, format.highest].into_iter().flatten() {
        if !(ratio.is_finite() && ratio > 0.0) {
            return invalid("widest and highest must be positive ratios");
        }
    }
    if let (Some(widest), Some(highest)) = (format.widest, format.highest)
        && widest < highest
    {
        return invalid("widest must not be smaller than highest");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// SQLite database file.
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "rendition.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlobsConfig {
    /// Directory containing one sub-directory per bucket.
    pub root: String,
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            root: "blobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinationConfig {
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub max_insert_attempts: u32,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_attempts: 15,
            max_insert_attempts: 5,
        }
    }
}

impl CoordinationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Bucket directory; the namespace name when absent.
    pub bucket: Option<String>,
    /// Base URL the bucket is served from.
    pub public_url: Option<String>,
    pub naming: NamingConfig,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(StorageConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Tables carrying a `strategy` tag replace the base table entirely.
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table))
            if !overlay_table.contains_key("strategy") =>
        {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<StorageConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: StorageConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Parse config text on top of the stock defaults.
pub fn parse_config(text: &str) -> Result<StorageConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(text)?;
    resolve_config(stock_defaults_value(), Some(overlay))
}

/// Load config from `path`, falling back to stock defaults when the file
/// does not exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<StorageConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `rendition.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Rendition Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Namespace that generated derivatives are written to. It must be listed
# under [namespaces] and use the pattern naming strategy.
formatted_namespace = "formatted"

# ---------------------------------------------------------------------------
# Catalog
# ---------------------------------------------------------------------------
[catalog]
# SQLite file holding image rows, derivative claims and namespace counters.
# Several processes may share it.
path = "rendition.db"

# ---------------------------------------------------------------------------
# Blob storage
# ---------------------------------------------------------------------------
[blobs]
# Directory containing one sub-directory per bucket.
root = "blobs"

# ---------------------------------------------------------------------------
# Coordination
# ---------------------------------------------------------------------------
[coordination]
# How often (milliseconds) a caller waiting for someone else's derivative
# checks whether it is done.
poll_interval_ms = 1000

# Number of checks before the other caller is presumed dead. The claim is
# then marked failed so the derivative can be regenerated.
max_poll_attempts = 15

# Attempts at finding a free path in a namespace before giving up.
max_insert_attempts = 5

# ---------------------------------------------------------------------------
# Namespaces
# ---------------------------------------------------------------------------
# Each namespace has its own bucket and naming strategy:
#   { strategy = "serial", depth = N }  numeric ids in N levels of
#                                       1000-entry directories
#   { strategy = "pattern" }            caller-supplied paths, sanitized
#
# Optional keys:
#   bucket = "name"                     bucket directory (default: namespace name)
#   public_url = "https://..."          base URL the bucket is served from

[namespaces.formatted]
naming = { strategy = "pattern" }

[namespaces.images]
naming = { strategy = "serial", depth = 2 }

# ---------------------------------------------------------------------------
# Formats
# ---------------------------------------------------------------------------
# Derivatives are requested by format name. Keys:
#   width, height        target box in pixels
#   fit_type             "inner"   crop to the box ratio, then scale to the exact box
#                        "outer"   scale to fit inside, then pad to the exact box
#                        "maximum" scale to fit inside, no crop, no padding
#   background           fill color: a name ("red") or "#rgb", "#rrggbb", "#rrggbbaa"
#   reduce_only          never upscale
#   proportional_crop    extend the canvas with a solid border instead of cropping
#   widest, highest      maximum / minimum width:height ratio, center-trimmed
#   strip                drop the embedded color profile
#   quality              1-100, for lossy outputs
#   output               jpeg | png | webp | gif | avif (default: source format)
#   ignore_crop          ignore the source image's stored crop

[formats.large]
width = 1600
height = 1600
fit_type = "maximum"
reduce_only = true
output = "webp"

[formats.thumb]
width = 200
height = 200
fit_type = "inner"
quality = 85
"##
}
