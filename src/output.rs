//! CLI output formatting for image records and derivatives.
//!
//! # Information-First Display
//!
//! Output is **image-centric, not file-centric**. The primary display for an
//! image is its catalog identity (id, namespace and path), with dimensions,
//! size, crop and URL as indented context lines underneath.
//!
//! # Output Format
//!
//! ## Image
//!
//! ```text
//! #1 photos/000/2.jpg
//!     Size: 800x600, 181.4 KB
//!     Crop: 400x300+10+20
//!     URL: https://cdn.example.com/photos/000/2.jpg
//! ```
//!
//! ## Derivatives
//!
//! ```text
//! Derivatives
//!     large: default → #4
//!     thumb: failed
//! ```
//!
//! # Architecture
//!
//! Each entity has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. `--json` output goes through
//! [`image_json`] instead.

use crate::catalog::{FormattedRecord, ImageRecord};
use serde_json::json;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Header line of an image: `#id namespace/path`.
fn image_header(image: &ImageRecord) -> String {
    format!("#{} {}/{}", image.id, image.namespace, image.path)
}

/// Format an image record with its public URL.
pub fn format_image(image: &ImageRecord, url: &str) -> Vec<String> {
    let ctx = indent(1);
    let size = match image.filesize {
        Some(bytes) => format_size(bytes),
        // Row committed, blob not written yet (or the write failed)
        None => "no blob".to_string(),
    };
    let mut lines = vec![
        image_header(image),
        format!("{ctx}Size: {}x{}, {size}", image.width, image.height),
    ];
    if let Some(crop) = image.crop {
        lines.push(format!("{ctx}Crop: {crop}"));
    }
    lines.push(format!("{ctx}URL: {url}"));
    lines
}

/// Format the derivative associations of an image.
pub fn format_derivatives(rows: &[FormattedRecord]) -> Vec<String> {
    if rows.is_empty() {
        return Vec::new();
    }
    let ctx = indent(1);
    let mut lines = vec!["Derivatives".to_string()];
    for row in rows {
        match row.target_id {
            Some(target) => lines.push(format!("{ctx}{}: {} → #{target}", row.format, row.status)),
            None => lines.push(format!("{ctx}{}: {}", row.format, row.status)),
        }
    }
    lines
}

/// Machine-readable form of an image and its derivatives.
pub fn image_json(image: &ImageRecord, url: &str, derivatives: &[FormattedRecord]) -> serde_json::Value {
    json!({
        "image": image,
        "url": url,
        "derivatives": derivatives,
    })
}

pub fn print_image(image: &ImageRecord, url: &str, derivatives: &[FormattedRecord]) {
    for line in format_image(image, url)
        .into_iter()
        .chain(format_derivatives(derivatives))
    {
        println!("{line}");
    }
}

pub fn print_image_json(image: &ImageRecord, url: &str, derivatives: &[FormattedRecord]) {
    println!("{:#}", image_json(image, url, derivatives));
}
