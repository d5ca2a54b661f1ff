//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between configuration (which names formats) and the
//! [`sampler`](super::sampler) (which does the actual pixel work). All of
//! them are plain immutable data: cloning a [`Format`] never shares state.
//!
//! ## Types
//!
//! - [`Format`]: Full description of a derivative: target box, fit policy, background, limits, encoding.
//! - [`Crop`]: A source sub-rectangle (the caller's region of interest).
//! - [`FitType`]: How a source is matched to a target box (Inner / Outer / Maximum).
//! - [`Color`]: An RGBA color parsed from a name or hex string.
//! - [`OutputFormat`]: Encoded container of the result (JPEG, PNG, WebP, GIF, AVIF).
//! - [`Quality`]: Lossy encoding quality (1-100, default 90). Clamped on construction.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// Policy for matching a source image to a target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitType {
    /// Crop to the target aspect ratio, then scale to the exact box.
    Inner,
    /// Scale to fit inside the box, then pad to the exact box. Never crops.
    Outer,
    /// Scale to fit inside the box. Never crops, never pads.
    Maximum,
}

impl fmt::Display for FitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FitType::Inner => "inner",
            FitType::Outer => "outer",
            FitType::Maximum => "maximum",
        })
    }
}

/// Encoded output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    Gif,
    Avif,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// Pick the output container for a decoded source format.
    ///
    /// Formats we can read but do not serve (TIFF, BMP, ...) become PNG so
    /// nothing is lost to a lossy re-encode.
    pub fn for_source(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => OutputFormat::Jpeg,
            ImageFormat::WebP => OutputFormat::Webp,
            ImageFormat::Gif => OutputFormat::Gif,
            ImageFormat::Avif => OutputFormat::Avif,
            _ => OutputFormat::Png,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Webp => ImageFormat::WebP,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Avif => ImageFormat::Avif,
        }
    }
}

/// An RGBA color, parsed from `"red"`, `"#f00"`, `"#ff0000"` or `"#ff000080"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);

    pub fn rgba(self) -> image::Rgba<u8> {
        image::Rgba(self.0)
    }

    fn named(name: &str) -> Option<Self> {
        let rgb = match name {
            "transparent" | "none" => return Some(Self::TRANSPARENT),
            "black" => [0, 0, 0],
            "white" => [255, 255, 255],
            "red" => [255, 0, 0],
            "green" => [0, 128, 0],
            "lime" => [0, 255, 0],
            "blue" => [0, 0, 255],
            "yellow" => [255, 255, 0],
            "cyan" => [0, 255, 255],
            "magenta" => [255, 0, 255],
            "gray" | "grey" => [128, 128, 128],
            "silver" => [192, 192, 192],
            "orange" => [255, 165, 0],
            _ => return None,
        };
        Some(Color([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn hex(digits: &str) -> Option<Self> {
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok();
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            3 => Some(Color([
                nibble(0)? * 17,
                nibble(1)? * 17,
                nibble(2)? * 17,
                255,
            ])),
            6 => Some(Color([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Color([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        }
    }
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let parsed = match trimmed.strip_prefix('#') {
            Some(digits) => Self::hex(digits),
            None => Self::named(&trimmed),
        };
        parsed.ok_or_else(|| format!("unknown color: {s:?}"))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        let [r, g, b, a] = color.0;
        if a == 255 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

/// A source sub-rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Crop {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// An all-zero rectangle means "no crop requested".
    pub fn is_empty(&self) -> bool {
        self.width == 0 && self.height == 0 && self.left == 0 && self.top == 0
    }

    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    /// Short stable fingerprint used to keep derivative paths of different
    /// crops of the same source apart.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"crop\0");
        hasher.update(self.left.to_le_bytes());
        hasher.update(self.top.to_le_bytes());
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..8].to_string()
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.left, self.top
        )
    }
}

impl std::str::FromStr for Crop {
    type Err = String;

    /// Parse `left,top,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid crop {s:?}: {e}"))?;
        match parts.as_slice() {
            [left, top, width, height] => Ok(Crop::new(*left, *top, *width, *height)),
            _ => Err(format!(
                "invalid crop {s:?}: expected left,top,width,height"
            )),
        }
    }
}

/// A derivative description, looked up by name from configuration.
///
/// Every field is optional. A format with neither `width` nor `height` only
/// re-encodes (after any crop and ratio limits).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Format {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit_type: Option<FitType>,
    /// Fill color for padding and for flattening onto opaque outputs.
    pub background: Option<Color>,
    /// Never upscale.
    pub reduce_only: bool,
    /// Extend the canvas with a synthesized border to reach the target
    /// aspect ratio instead of cropping.
    pub proportional_crop: bool,
    /// Maximum width/height ratio.
    pub widest: Option<f64>,
    /// Minimum width/height ratio.
    pub highest: Option<f64>,
    /// Drop embedded metadata (ICC profile) from the output.
    pub strip: bool,
    pub quality: Option<Quality>,
    /// Output container; defaults to the source's.
    pub output: Option<OutputFormat>,
    /// Ignore the source image's stored crop.
    pub ignore_crop: bool,
}

impl Format {
    /// Both target dimensions, if the format names a box.
    pub fn target_box(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    pub fn quality(&self) -> Quality {
        self.quality.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn color_parses_names_and_hex() {
        assert_eq!("red".parse::<Color>().unwrap(), Color([255, 0, 0, 255]));
        assert_eq!("#0f0".parse::<Color>().unwrap(), Color([0, 255, 0, 255]));
        assert_eq!(
            "#336699".parse::<Color>().unwrap(),
            Color([0x33, 0x66, 0x99, 255])
        );
        assert_eq!(
            "#33669980".parse::<Color>().unwrap(),
            Color([0x33, 0x66, 0x99, 0x80])
        );
        assert_eq!("Transparent".parse::<Color>().unwrap(), Color::TRANSPARENT);
    }

    #[test]
    fn color_rejects_garbage() {
        assert!("reddish".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
    }

    #[test]
    fn color_serializes_as_hex() {
        assert_eq!(String::from(Color([255, 0, 0, 255])), "#ff0000");
        assert_eq!(String::from(Color([1, 2, 3, 4])), "#01020304");
    }

    #[test]
    fn crop_parses_from_csv() {
        assert_eq!("1, 2,3,4".parse::<Crop>().unwrap(), Crop::new(1, 2, 3, 4));
        assert!("1,2,3".parse::<Crop>().is_err());
        assert!("a,b,c,d".parse::<Crop>().is_err());
    }

    #[test]
    fn crop_fingerprint_is_stable_and_distinct() {
        let a = Crop::new(0, 0, 10, 10);
        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
        assert_ne!(a.fingerprint(), Crop::new(0, 0, 10, 11).fingerprint());
    }

    #[test]
    fn format_deserializes_from_toml() {
        let format: Format = toml::from_str(
            r#"
            width = 102
            height = 149
            fit_type = "outer"
            background = "red"
            quality = 80
            output = "jpg"
            "#,
        )
        .unwrap();
        assert_eq!(format.target_box(), Some((102, 149)));
        assert_eq!(format.fit_type, Some(FitType::Outer));
        assert_eq!(format.background, Some(Color([255, 0, 0, 255])));
        assert_eq!(format.quality().value(), 80);
        assert_eq!(format.output, Some(OutputFormat::Jpeg));
    }

    #[test]
    fn unknown_fit_type_is_rejected() {
        let result: Result<Format, _> = toml::from_str(r#"fit_type = "sideways""#);
        assert!(result.is_err());
    }

    #[test]
    fn output_format_for_source() {
        assert_eq!(OutputFormat::for_source(ImageFormat::Jpeg), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::for_source(ImageFormat::Tiff), OutputFormat::Png);
        assert_eq!(OutputFormat::for_source(ImageFormat::Gif), OutputFormat::Gif);
    }
}
