//! Decoded images, still or animated.
//!
//! A [`Raster`] is what the [`Sampler`](super::sampler::Sampler) works on. It
//! is either a single [`DynamicImage`] or a list of animation frames; the
//! sampler never branches on which. Geometric edits go through
//! [`Raster::map_frames`], which applies one closure to every frame (in
//! parallel for animations).
//!
//! Animations are brought into a uniform shape before editing and back
//! afterwards:
//!
//! - [`Raster::coalesce`] turns every frame into a full canvas image with
//!   offset (0, 0), composited over the frames before it.
//! - [`Raster::deconstruct`] undoes that for encoding: every frame after the
//!   first is reduced to the bounding box of the pixels that changed, with
//!   unchanged pixels made transparent.
//!
//! | Container | Decode | Encode |
//! |---|---|---|
//! | JPEG, PNG, TIFF | `image` | JPEG, PNG |
//! | GIF | `GifDecoder::into_frames` | `GifEncoder::encode_frames` (animated) |
//! | WebP | `WebPDecoder` (animated when `has_animation`) | lossless, first frame |
//! | AVIF | none | `AvifEncoder` (rav1e, speed 6), first frame |

use super::params::{Color, OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::imageops;
use image::{
    AnimationDecoder, DynamicImage, Frame, ImageDecoder, ImageEncoder, ImageFormat, ImageReader,
    ImageResult, Rgba, RgbaImage,
};
use rayon::prelude::*;
use std::io::Cursor;

/// Pixel content of a raster.
#[derive(Clone)]
pub enum Frames {
    Still(DynamicImage),
    Animated(Vec<Frame>),
}

impl std::fmt::Debug for Frames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frames::Still(img) => write!(f, "Still({}x{})", img.width(), img.height()),
            Frames::Animated(frames) => write!(f, "Animated({} frames)", frames.len()),
        }
    }
}

/// A decoded image plus the encoding settings it will be written with.
#[derive(Debug, Clone)]
pub struct Raster {
    pub frames: Frames,
    /// Container the raster was decoded from or will be encoded to.
    pub format: OutputFormat,
    pub icc_profile: Option<Vec<u8>>,
    /// Color that transparent areas are flattened onto for opaque outputs.
    pub background: Option<Color>,
}

impl Raster {
    pub fn still(image: DynamicImage, format: OutputFormat) -> Self {
        Self {
            frames: Frames::Still(image),
            format,
            icc_profile: None,
            background: None,
        }
    }

    pub fn animated(frames: Vec<Frame>) -> Self {
        Self {
            frames: Frames::Animated(frames),
            format: OutputFormat::Gif,
            icc_profile: None,
            background: None,
        }
    }

    /// Decode an encoded image, keeping every frame of an animation.
    pub fn decode(bytes: &[u8]) -> ImageResult<Self> {
        let source_format = image::guess_format(bytes)?;
        let format = OutputFormat::for_source(source_format);

        match source_format {
            ImageFormat::Gif => {
                let decoder = GifDecoder::new(Cursor::new(bytes))?;
                let frames = decoder.into_frames().collect_frames()?;
                Ok(Self::from_frames(frames, format))
            }
            ImageFormat::WebP => {
                let mut decoder = WebPDecoder::new(Cursor::new(bytes))?;
                if decoder.has_animation() {
                    let frames = decoder.into_frames().collect_frames()?;
                    return Ok(Self::from_frames(frames, format));
                }
                let icc_profile = decoder.icc_profile()?;
                Ok(Self {
                    icc_profile,
                    ..Self::still(DynamicImage::from_decoder(decoder)?, format)
                })
            }
            _ => {
                let mut decoder =
                    ImageReader::with_format(Cursor::new(bytes), source_format).into_decoder()?;
                let icc_profile = decoder.icc_profile()?;
                Ok(Self {
                    icc_profile,
                    ..Self::still(DynamicImage::from_decoder(decoder)?, format)
                })
            }
        }
    }

    fn from_frames(mut frames: Vec<Frame>, format: OutputFormat) -> Self {
        if frames.len() == 1
            && let Some(frame) = frames.pop()
        {
            return Self::still(DynamicImage::ImageRgba8(frame.into_buffer()), format);
        }
        Self {
            format,
            ..Self::animated(frames)
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self.frames, Frames::Animated(_))
    }

    pub fn frame_count(&self) -> usize {
        match &self.frames {
            Frames::Still(_) => 1,
            Frames::Animated(frames) => frames.len(),
        }
    }

    /// Canvas size. For animations, the box covering every frame.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.frames {
            Frames::Still(img) => (img.width(), img.height()),
            Frames::Animated(frames) => frames.iter().fold((0, 0), |(w, h), f| {
                let (fw, fh) = f.buffer().dimensions();
                (w.max(f.left() + fw), h.max(f.top() + fh))
            }),
        }
    }

    /// First frame as a full-canvas RGBA image.
    pub fn first_frame(&self) -> RgbaImage {
        match &self.frames {
            Frames::Still(img) => img.to_rgba8(),
            Frames::Animated(frames) => frames
                .first()
                .map(|f| f.buffer().clone())
                .unwrap_or_default(),
        }
    }

    /// Apply `f` to every frame. Animations must be coalesced first so every
    /// frame covers the whole canvas.
    pub fn map_frames<F>(self, f: F) -> Self
    where
        F: Fn(DynamicImage) -> DynamicImage + Sync,
    {
        let frames = match self.frames {
            Frames::Still(img) => Frames::Still(f(img)),
            Frames::Animated(frames) => Frames::Animated(
                frames
                    .into_par_iter()
                    .map(|frame| {
                        let delay = frame.delay();
                        let edited = f(DynamicImage::ImageRgba8(frame.into_buffer()));
                        Frame::from_parts(edited.to_rgba8(), 0, 0, delay)
                    })
                    .collect(),
            ),
        };
        Self { frames, ..self }
    }

    /// Composite every animation frame onto the frames before it, producing
    /// independent full-canvas frames.
    pub fn coalesce(self) -> Self {
        let (w, h) = self.dimensions();
        let frames = match self.frames {
            Frames::Animated(frames) => {
                let mut canvas = RgbaImage::new(w, h);
                let coalesced = frames
                    .into_iter()
                    .map(|frame| {
                        let (left, top, delay) = (frame.left(), frame.top(), frame.delay());
                        imageops::overlay(&mut canvas, frame.buffer(), left as i64, top as i64);
                        Frame::from_parts(canvas.clone(), 0, 0, delay)
                    })
                    .collect();
                Frames::Animated(coalesced)
            }
            still => still,
        };
        Self { frames, ..self }
    }

    /// Reduce every frame after the first to the region that changed since
    /// the previous frame.
    ///
    /// A frame that turns an opaque pixel (partially) transparent cannot be
    /// expressed as a delta and is kept whole.
    pub fn deconstruct(self) -> Self {
        let frames = match self.frames {
            Frames::Animated(frames) if frames.len() > 1 => {
                let mut out = Vec::with_capacity(frames.len());
                let mut previous: Option<RgbaImage> = None;
                for frame in frames {
                    let delay = frame.delay();
                    let current = frame.into_buffer();
                    let delta = match &previous {
                        Some(prev) => frame_delta(prev, &current, delay),
                        None => Frame::from_parts(current.clone(), 0, 0, delay),
                    };
                    out.push(delta);
                    previous = Some(current);
                }
                Frames::Animated(out)
            }
            other => other,
        };
        Self { frames, ..self }
    }

    /// Encode with the raster's current format.
    ///
    /// Only GIF output keeps the animation; other containers get the first
    /// frame. Opaque containers flatten transparency onto the background
    /// (white when none is set).
    pub fn encode(&self, quality: Quality) -> ImageResult<Vec<u8>> {
        let mut buf = Vec::new();

        if let (OutputFormat::Gif, Frames::Animated(frames)) = (self.format, &self.frames) {
            {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder.set_repeat(Repeat::Infinite)?;
                encoder.encode_frames(frames.iter().cloned())?;
            }
            return Ok(buf);
        }

        let image = match &self.frames {
            Frames::Still(img) => img.clone(),
            Frames::Animated(_) => DynamicImage::ImageRgba8(self.first_frame()),
        };
        let q = quality.value() as u8;

        match self.format {
            OutputFormat::Jpeg => {
                let flattened = self.flatten(&image);
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, q);
                self.attach_icc(&mut encoder);
                flattened.write_with_encoder(encoder)?;
            }
            OutputFormat::Png => {
                let mut encoder = PngEncoder::new(&mut buf);
                self.attach_icc(&mut encoder);
                image.write_with_encoder(encoder)?;
            }
            OutputFormat::Webp => {
                let mut encoder = WebPEncoder::new_lossless(&mut buf);
                self.attach_icc(&mut encoder);
                DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)?;
            }
            OutputFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder.encode_frame(Frame::new(image.to_rgba8()))?;
            }
            OutputFormat::Avif => {
                let encoder = AvifEncoder::new_with_speed_quality(&mut buf, 6, q);
                image.write_with_encoder(encoder)?;
            }
        }
        Ok(buf)
    }

    fn attach_icc(&self, encoder: &mut impl ImageEncoder) {
        if let Some(profile) = &self.icc_profile {
            // Encoders without ICC support just drop it.
            let _ = encoder.set_icc_profile(profile.clone());
        }
    }

    fn flatten(&self, image: &DynamicImage) -> DynamicImage {
        if !image.color().has_alpha() {
            return DynamicImage::ImageRgb8(image.to_rgb8());
        }
        let background = self.background.unwrap_or(Color::WHITE).rgba();
        let mut canvas = RgbaImage::from_pixel(image.width(), image.height(), background);
        imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    }
}

fn frame_delta(previous: &RgbaImage, current: &RgbaImage, delay: image::Delay) -> Frame {
    if previous.dimensions() != current.dimensions() {
        return Frame::from_parts(current.clone(), 0, 0, delay);
    }

    let (w, h) = current.dimensions();
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in current.enumerate_pixels() {
        if px != previous.get_pixel(x, y) {
            if px.0[3] < 255 {
                return Frame::from_parts(current.clone(), 0, 0, delay);
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    let Some((x0, y0, x1, y1)) = bounds else {
        // Identical frame: a single transparent pixel keeps its delay.
        return Frame::from_parts(RgbaImage::new(1, 1), 0, 0, delay);
    };
    debug_assert!(x1 < w && y1 < h);

    let delta = RgbaImage::from_fn(x1 - x0 + 1, y1 - y0 + 1, |dx, dy| {
        let (x, y) = (x0 + dx, y0 + dy);
        let px = current.get_pixel(x, y);
        if px == previous.get_pixel(x, y) {
            Rgba([0, 0, 0, 0])
        } else {
            *px
        }
    });
    Frame::from_parts(delta, x0, y0, delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Delay;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    fn delay() -> Delay {
        Delay::from_numer_denom_ms(100, 1)
    }

    #[test]
    fn png_roundtrip_keeps_dimensions() {
        let raster = Raster::still(
            DynamicImage::ImageRgba8(solid(30, 20, [10, 20, 30, 255])),
            OutputFormat::Png,
        );
        let bytes = raster.encode(Quality::default()).unwrap();
        let decoded = Raster::decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (30, 20));
        assert_eq!(decoded.format, OutputFormat::Png);
        assert!(!decoded.is_animated());
    }

    #[test]
    fn jpeg_output_flattens_onto_background() {
        let mut raster = Raster::still(
            DynamicImage::ImageRgba8(solid(8, 8, [0, 0, 0, 0])),
            OutputFormat::Jpeg,
        );
        raster.background = Some(Color([255, 0, 0, 255]));
        let bytes = raster.encode(Quality::new(100)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(4, 4);
        assert!(px.0[0] > 240 && px.0[1] < 20 && px.0[2] < 20, "{px:?}");
    }

    #[test]
    fn animated_gif_roundtrip_keeps_frames() {
        let frames = vec![
            Frame::from_parts(solid(16, 16, [255, 0, 0, 255]), 0, 0, delay()),
            Frame::from_parts(solid(16, 16, [0, 0, 255, 255]), 0, 0, delay()),
            Frame::from_parts(solid(16, 16, [0, 255, 0, 255]), 0, 0, delay()),
        ];
        let bytes = Raster::animated(frames).encode(Quality::default()).unwrap();
        let decoded = Raster::decode(&bytes).unwrap();
        assert!(decoded.is_animated());
        assert_eq!(decoded.frame_count(), 3);
        assert_eq!(decoded.dimensions(), (16, 16));
    }

    #[test]
    fn coalesce_composites_offset_frames() {
        let frames = vec![
            Frame::from_parts(solid(10, 10, [255, 0, 0, 255]), 0, 0, delay()),
            Frame::from_parts(solid(2, 2, [0, 0, 255, 255]), 4, 4, delay()),
        ];
        let raster = Raster::animated(frames).coalesce();
        let Frames::Animated(frames) = &raster.frames else {
            panic!("expected animation");
        };
        let second = frames[1].buffer();
        assert_eq!(second.dimensions(), (10, 10));
        assert_eq!(*second.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*second.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
        assert_eq!((frames[1].left(), frames[1].top()), (0, 0));
    }

    #[test]
    fn deconstruct_crops_to_changed_region() {
        let first = solid(10, 10, [255, 0, 0, 255]);
        let mut second = first.clone();
        second.put_pixel(3, 4, Rgba([0, 255, 0, 255]));
        second.put_pixel(5, 6, Rgba([0, 255, 0, 255]));
        let raster = Raster::animated(vec![
            Frame::from_parts(first, 0, 0, delay()),
            Frame::from_parts(second, 0, 0, delay()),
        ])
        .deconstruct();

        let Frames::Animated(frames) = &raster.frames else {
            panic!("expected animation");
        };
        assert_eq!(frames[0].buffer().dimensions(), (10, 10));
        assert_eq!((frames[1].left(), frames[1].top()), (3, 4));
        assert_eq!(frames[1].buffer().dimensions(), (3, 3));
        // Unchanged pixel inside the box is transparent
        assert_eq!(frames[1].buffer().get_pixel(1, 0).0[3], 0);
    }

    #[test]
    fn map_frames_applies_to_every_frame() {
        let raster = Raster::animated(vec![
            Frame::from_parts(solid(10, 10, [1, 1, 1, 255]), 0, 0, delay()),
            Frame::from_parts(solid(10, 10, [2, 2, 2, 255]), 0, 0, delay()),
        ])
        .map_frames(|img| img.crop_imm(0, 0, 4, 3));
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.frame_count(), 2);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Raster::decode(b"definitely not an image").is_err());
    }
}
