//! The derivative algorithm: crop, trim, extend, fit.
//!
//! [`Sampler::convert`] turns a decoded [`Raster`] into the raster described by
//! a [`Format`]. It does no I/O and keeps no state, so it can run on any
//! number of threads at once as long as each call owns its raster.
//!
//! Steps run in a fixed order; an error names the step it came from:
//!
//! | # | Step | What happens |
//! |---|------|--------------|
//! | 1 | `crop` | Validate the caller's crop (extended to the target ratio for proportional formats) |
//! | 2 | `coalesce` | Animation frames become full canvases, then the crop is applied |
//! | 3 | `trim` | Center-crop to the `widest` / `highest` ratio limits |
//! | 4 | `extend` | Proportional formats grow the short axis with a solid border |
//! | 5 | `background` | Record the fill color for padding and flattening |
//! | 6 | `fit` | Inner / Outer / Maximum / single-dimension scaling |
//! | 7 | `deconstruct` | Animated output is diffed back into delta frames |
//! | 8 | `output` | Strip metadata, choose the output container |
//!
//! Geometry comes from [`calculations`](super::calculations) and is worked
//! out once per call from the canvas size, then applied to every frame.

use super::border::BorderPlan;
use super::calculations::{
    FitPlan, extend_crop_to_ratio, plan_fit, proportional_extension, ratio_trim, validate_crop,
};
use super::params::{Color, Crop, Format, OutputFormat};
use super::raster::Raster;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use std::fmt;
use thiserror::Error;

/// A step of the algorithm, used to tag errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Crop,
    Coalesce,
    Trim,
    Extend,
    Background,
    Fit,
    Deconstruct,
    Output,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Crop => "crop",
            Step::Coalesce => "coalesce",
            Step::Trim => "trim",
            Step::Extend => "extend",
            Step::Background => "background",
            Step::Fit => "fit",
            Step::Deconstruct => "deconstruct",
            Step::Output => "output",
        })
    }
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("{step}: crop {crop} is out of bounds for a {width}x{height} image")]
    Bounds {
        step: Step,
        crop: Crop,
        width: u32,
        height: u32,
    },
    #[error("{step}: {message}")]
    Config { step: Step, message: String },
}

impl SamplerError {
    pub fn step(&self) -> Step {
        match self {
            SamplerError::Bounds { step, .. } | SamplerError::Config { step, .. } => *step,
        }
    }

    fn config(step: Step, message: impl Into<String>) -> Self {
        SamplerError::Config {
            step,
            message: message.into(),
        }
    }
}

pub struct Sampler;

impl Sampler {
    /// Produce the derivative of `raster` described by `format`.
    ///
    /// `crop` is the source image's stored region of interest; an empty crop
    /// or a format with `ignore_crop` disables it.
    pub fn convert(
        raster: Raster,
        crop: Option<&Crop>,
        format: &Format,
    ) -> Result<Raster, SamplerError> {
        check_format(format)?;

        // 1. crop
        let source = raster.dimensions();
        let crop = match crop.filter(|c| !c.is_empty() && !format.ignore_crop) {
            Some(requested) => {
                let requested = match format.target_box() {
                    Some(target) if format.proportional_crop => {
                        extend_crop_to_ratio(*requested, source, target)
                    }
                    _ => *requested,
                };
                let valid = validate_crop(requested, source).ok_or(SamplerError::Bounds {
                    step: Step::Crop,
                    crop: requested,
                    width: source.0,
                    height: source.1,
                })?;
                Some(valid)
            }
            None => None,
        };

        // 2. coalesce
        let mut raster = raster.coalesce();
        if let Some(crop) = crop {
            raster = crop_frames(raster, crop);
        }

        // 3. trim
        if let Some(trim) = ratio_trim(raster.dimensions(), format.widest, format.highest) {
            raster = crop_frames(raster, trim);
        }

        // 4. extend
        if format.proportional_crop
            && let Some(target) = format.target_box()
            && let Some(extension) = proportional_extension(raster.dimensions(), target)
            && let Some(border) = BorderPlan::for_extension(&raster.first_frame(), extension)
        {
            raster = raster.map_frames(|img| DynamicImage::ImageRgba8(border.apply(&img.to_rgba8())));
        }

        // 5. background
        if format.background.is_some() {
            raster.background = format.background;
        }

        // 6. fit
        if let Some(plan) = plan_fit(raster.dimensions(), format) {
            let fill = raster.background.unwrap_or(Color::TRANSPARENT);
            raster = apply_fit(raster, plan, fill);
        }

        // 7. deconstruct
        let output = format.output.unwrap_or(raster.format);
        if raster.is_animated() && output == OutputFormat::Gif {
            raster = raster.deconstruct();
        }

        // 8. output
        raster.format = output;
        if format.strip {
            raster.icc_profile = None;
        }
        Ok(raster)
    }
}

fn check_format(format: &Format) -> Result<(), SamplerError> {
    if format.width == Some(0) || format.height == Some(0) {
        return Err(SamplerError::config(
            Step::Fit,
            "target dimensions must be positive",
        ));
    }
    for (name, ratio) in [("widest", format.widest), ("highest", format.highest)] {
        if let Some(r) = ratio
            && !(r.is_finite() && r > 0.0)
        {
            return Err(SamplerError::config(
                Step::Trim,
                format!("{name} must be a positive ratio, got {r}"),
            ));
        }
    }
    if let (Some(widest), Some(highest)) = (format.widest, format.highest)
        && widest < highest
    {
        return Err(SamplerError::config(
            Step::Trim,
            format!("widest ({widest}) is narrower than highest ({highest})"),
        ));
    }
    Ok(())
}

fn crop_frames(raster: Raster, crop: Crop) -> Raster {
    raster.map_frames(|img| img.crop_imm(crop.left, crop.top, crop.width, crop.height))
}

fn resize_to(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (img.width(), img.height()) == (width, height) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    }
}

fn apply_fit(raster: Raster, plan: FitPlan, fill: Color) -> Raster {
    match plan {
        FitPlan::Passthrough => raster,
        FitPlan::Resize { width, height } => {
            raster.map_frames(|img| resize_to(img, width, height))
        }
        FitPlan::CropResize {
            crop,
            width,
            height,
        } => raster.map_frames(|img| {
            let cropped = img.crop_imm(crop.left, crop.top, crop.width, crop.height);
            resize_to(cropped, width, height)
        }),
        FitPlan::ResizePad {
            width,
            height,
            canvas_width,
            canvas_height,
            x,
            y,
        } => raster.map_frames(|img| {
            let scaled = resize_to(img, width, height);
            let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, fill.rgba());
            imageops::replace(&mut canvas, &scaled.to_rgba8(), x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }),
    }
}
