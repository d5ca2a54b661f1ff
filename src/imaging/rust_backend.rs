//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only, no full decode) |
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image` crate via [`Raster::decode`] |
//! | Crop / trim / extend / fit | [`Sampler`] (`image::imageops`, `Lanczos3`) |
//! | Per-frame work on animations | `rayon` inside [`Raster::map_frames`] |
//! | Encode | `image` encoders via [`Raster::encode`] (AVIF through rav1e, speed 6) |
//!
//! AVIF is output-only: the `image` crate's `"avif"` feature enables the
//! rav1e encoder but no decoder, so AVIF sources fail to decode.

use super::backend::{BackendError, Dimensions, Identified, ImageBackend, Rendered};
use super::params::{Crop, Format, OutputFormat, Quality};
use super::raster::Raster;
use super::sampler::Sampler;
use image::ImageReader;
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(bytes: &[u8]) -> Result<Raster, BackendError> {
    Raster::decode(bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

fn encode(raster: &Raster, quality: Quality) -> Result<Rendered, BackendError> {
    let bytes = raster
        .encode(quality)
        .map_err(|e| BackendError::Encode(format!("{}: {e}", raster.format.extension())))?;
    let (width, height) = raster.dimensions();
    Ok(Rendered {
        bytes,
        dimensions: Dimensions { width, height },
        format: raster.format,
    })
}

/// Re-encode quality for operations that keep the source container.
fn keep_quality(format: OutputFormat) -> Quality {
    match format {
        OutputFormat::Jpeg | OutputFormat::Avif => Quality::new(95),
        _ => Quality::default(),
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Identified, BackendError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(BackendError::Io)?;
        let source_format = reader
            .format()
            .ok_or_else(|| BackendError::Decode("unrecognized image format".to_string()))?;
        let format = OutputFormat::for_source(source_format);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(BackendError::Decode(format!(
                "image has no pixels ({width}x{height})"
            )));
        }
        Ok(Identified {
            dimensions: Dimensions { width, height },
            format,
            native: format.image_format() == source_format,
        })
    }

    fn render(
        &self,
        source: &[u8],
        crop: Option<&Crop>,
        format: &Format,
    ) -> Result<Rendered, BackendError> {
        let raster = Sampler::convert(decode(source)?, crop, format)?;
        encode(&raster, format.quality())
    }

    fn flop(&self, source: &[u8]) -> Result<Rendered, BackendError> {
        let mut raster = decode(source)?.coalesce().map_frames(|img| img.fliph());
        if raster.is_animated() {
            raster = raster.deconstruct();
        }
        encode(&raster, keep_quality(raster.format))
    }

    fn normalize(&self, source: &[u8]) -> Result<Rendered, BackendError> {
        let mut raster = decode(source)?.coalesce();
        raster.icc_profile = None;
        if raster.is_animated() {
            raster = raster.deconstruct();
        }
        encode(&raster, keep_quality(raster.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::FitType;
    use crate::test_helpers::{animated_gif_bytes, png_bytes};
    use image::{ImageEncoder, RgbImage};

    /// Encode a small valid JPEG with the given dimensions.
    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut buf)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let backend = RustBackend::new();
        let id = backend.identify(&jpeg_bytes(200, 150)).unwrap();
        assert_eq!(
            id.dimensions,
            Dimensions {
                width: 200,
                height: 150
            }
        );
        assert_eq!(id.format, OutputFormat::Jpeg);
        assert!(id.native);
    }

    #[test]
    fn identify_tiff_is_not_native() {
        let img = image::RgbImage::from_pixel(12, 9, image::Rgb([1, 2, 3]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Tiff).unwrap();

        let id = RustBackend::new().identify(buf.get_ref()).unwrap();
        assert_eq!(id.format, OutputFormat::Png);
        assert!(!id.native);

        let normalized = RustBackend::new().normalize(buf.get_ref()).unwrap();
        assert_eq!(normalized.format, OutputFormat::Png);
        assert_eq!(
            image::guess_format(&normalized.bytes).unwrap(),
            image::ImageFormat::Png
        );
    }

    #[test]
    fn identify_garbage_errors() {
        let backend = RustBackend::new();
        assert!(matches!(
            backend.identify(b"not an image at all"),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn render_outer_to_exact_box() {
        let backend = RustBackend::new();
        let format = Format {
            width: Some(102),
            height: Some(149),
            fit_type: Some(FitType::Outer),
            background: Some("red".parse().unwrap()),
            ..Format::default()
        };
        let rendered = backend.render(&png_bytes(101, 150), None, &format).unwrap();
        assert_eq!(rendered.dimensions.width, 102);
        assert_eq!(rendered.dimensions.height, 149);

        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (102, 149));
    }

    #[test]
    fn render_changes_container() {
        let backend = RustBackend::new();
        let format = Format {
            width: Some(50),
            output: Some(OutputFormat::Jpeg),
            ..Format::default()
        };
        let rendered = backend.render(&png_bytes(100, 80), None, &format).unwrap();
        assert_eq!(rendered.format, OutputFormat::Jpeg);
        assert_eq!(
            image::guess_format(&rendered.bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
        assert_eq!(
            rendered.dimensions,
            Dimensions {
                width: 50,
                height: 40
            }
        );
    }

    #[test]
    fn render_surfaces_sampler_errors() {
        let backend = RustBackend::new();
        let crop = Crop::new(0, 0, 500, 10);
        let err = backend
            .render(&png_bytes(100, 100), Some(&crop), &Format::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Sampler(_)));
    }

    #[test]
    fn render_keeps_gif_animation() {
        let backend = RustBackend::new();
        let format = Format {
            width: Some(8),
            height: Some(8),
            fit_type: Some(FitType::Inner),
            ..Format::default()
        };
        let rendered = backend
            .render(&animated_gif_bytes(16, 12, 3), None, &format)
            .unwrap();
        assert_eq!(rendered.format, OutputFormat::Gif);
        let raster = Raster::decode(&rendered.bytes).unwrap();
        assert_eq!(raster.frame_count(), 3);
        assert_eq!(raster.dimensions(), (8, 8));
    }

    #[test]
    fn flop_mirrors_pixels() {
        let backend = RustBackend::new();
        let flopped = backend.flop(&png_bytes(10, 4)).unwrap();
        let img = image::load_from_memory(&flopped.bytes).unwrap().to_rgba8();
        // png_bytes paints the red channel with x
        assert_eq!(img.get_pixel(0, 0).0[0], 9);
        assert_eq!(img.get_pixel(9, 0).0[0], 0);
    }

    #[test]
    fn normalize_keeps_dimensions_and_container() {
        let backend = RustBackend::new();
        let normalized = backend.normalize(&jpeg_bytes(64, 48)).unwrap();
        assert_eq!(normalized.format, OutputFormat::Jpeg);
        assert_eq!(
            normalized.dimensions,
            Dimensions {
                width: 64,
                height: 48
            }
        );
    }
}
