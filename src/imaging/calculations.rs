//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images. The
//! [`sampler`](super::sampler) asks these for a plan, then applies the plan to
//! every frame of a raster. Ratios are compared with integer cross
//! multiplication wherever possible so that equal ratios really are equal.

use super::params::{Crop, FitType, Format};

/// Largest aspect mismatch tolerated before a proportional extension kicks in.
pub const ASPECT_TOLERANCE: f64 = 0.001;

fn scaled(value: u32, numerator: u32, denominator: u32) -> u32 {
    ((value as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
}

/// Grow `crop` symmetrically along its short axis until it has the target
/// aspect ratio, clamped to the source bounds.
///
/// The result is not validated; an out-of-range input stays out of range.
pub fn extend_crop_to_ratio(crop: Crop, source: (u32, u32), target: (u32, u32)) -> Crop {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    if crop.width == 0 || crop.height == 0 || tgt_w == 0 || tgt_h == 0 {
        return crop;
    }

    let crop_wide = crop.width as u64 * tgt_h as u64;
    let target_wide = tgt_w as u64 * crop.height as u64;

    if crop_wide < target_wide {
        // Too narrow: widen.
        let width = scaled(crop.height, tgt_w, tgt_h).min(src_w.max(crop.width));
        let grow = width - crop.width;
        let max_left = src_w.saturating_sub(width);
        let left = crop.left.saturating_sub(grow / 2).min(max_left);
        Crop { left, width, ..crop }
    } else if crop_wide > target_wide {
        // Too wide: heighten.
        let height = scaled(crop.width, tgt_h, tgt_w).min(src_h.max(crop.height));
        let grow = height - crop.height;
        let max_top = src_h.saturating_sub(height);
        let top = crop.top.saturating_sub(grow / 2).min(max_top);
        Crop { top, height, ..crop }
    } else {
        crop
    }
}

/// Check a crop against the source bounds.
///
/// A crop that overflows the bottom edge by exactly one pixel is corrected by
/// shrinking its height (rounding in callers' UIs produces this a lot).
/// Returns `None` for anything else out of range.
pub fn validate_crop(crop: Crop, source: (u32, u32)) -> Option<Crop> {
    let (src_w, src_h) = source;
    if crop.left >= src_w || crop.top >= src_h || crop.width == 0 || crop.height == 0 {
        return None;
    }
    if crop.right() > src_w as u64 {
        return None;
    }
    let mut crop = crop;
    if crop.bottom() == src_h as u64 + 1 {
        crop.height -= 1;
    }
    if crop.height == 0 || crop.bottom() > src_h as u64 {
        return None;
    }
    Some(crop)
}

/// Centered rectangle of the given size inside `source`.
pub fn centered(source: (u32, u32), size: (u32, u32)) -> Crop {
    let (w, h) = (size.0.min(source.0), size.1.min(source.1));
    Crop::new((source.0 - w) / 2, (source.1 - h) / 2, w, h)
}

/// Center crop that keeps the width/height ratio within `[highest, widest]`.
///
/// Returns `None` when the source already satisfies both limits.
pub fn ratio_trim(source: (u32, u32), widest: Option<f64>, highest: Option<f64>) -> Option<Crop> {
    let (w, h) = source;
    let ratio = w as f64 / h as f64;

    if let Some(widest) = widest.filter(|r| *r > 0.0)
        && ratio > widest
    {
        let width = ((h as f64 * widest).round() as u32).clamp(1, w);
        if width < w {
            return Some(centered(source, (width, h)));
        }
    }
    if let Some(highest) = highest.filter(|r| *r > 0.0)
        && ratio < highest
    {
        let height = ((w as f64 / highest).round() as u32).clamp(1, h);
        if height < h {
            return Some(centered(source, (w, height)));
        }
    }
    None
}

/// Axis along which a proportional extension adds pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Add this many columns, split between the left and right edges.
    Horizontal(u32),
    /// Add this many rows, split between the top and bottom edges.
    Vertical(u32),
}

/// How many pixels must be added (never removed) to give `source` the target
/// aspect ratio. `None` if the mismatch is within [`ASPECT_TOLERANCE`].
pub fn proportional_extension(source: (u32, u32), target: (u32, u32)) -> Option<Extension> {
    let (w, h) = source;
    let (tgt_w, tgt_h) = target;
    if tgt_w == 0 || tgt_h == 0 {
        return None;
    }
    let current = w as f64 / h as f64;
    let wanted = tgt_w as f64 / tgt_h as f64;
    if (current - wanted).abs() <= ASPECT_TOLERANCE {
        return None;
    }
    if current < wanted {
        let width = scaled(h, tgt_w, tgt_h);
        (width > w).then(|| Extension::Horizontal(width - w))
    } else {
        let height = scaled(w, tgt_h, tgt_w);
        (height > h).then(|| Extension::Vertical(height - h))
    }
}

/// Distribute `extra` pixels between two opposing edges.
///
/// Only edges whose strip is a solid color may grow. Both qualify: split
/// evenly (the odd pixel goes to the second edge). One qualifies: it takes
/// everything. Neither: `None`, the axis is left alone.
pub fn split_extension(extra: u32, first_solid: bool, second_solid: bool) -> Option<(u32, u32)> {
    match (first_solid, second_solid) {
        (true, true) => Some((extra / 2, extra - extra / 2)),
        (true, false) => Some((extra, 0)),
        (false, true) => Some((0, extra)),
        (false, false) => None,
    }
}

/// Geometric result of the main fit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPlan {
    /// Leave the frame as it is.
    Passthrough,
    /// Scale to exactly this size.
    Resize { width: u32, height: u32 },
    /// Crop, then scale the crop to this size (which may equal the crop).
    CropResize { crop: Crop, width: u32, height: u32 },
    /// Scale to `width`x`height`, then place it at (`x`, `y`) on a
    /// `canvas_width`x`canvas_height` canvas.
    ResizePad {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
        x: u32,
        y: u32,
    },
}

/// Largest size with the source's aspect ratio that fits inside `bounds`.
///
/// The limiting dimension matches `bounds` exactly; the other is rounded and
/// never exceeds its bound.
pub fn contain_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (w, h) = source;
    let (bw, bh) = bounds;
    if bw as u64 * h as u64 <= bh as u64 * w as u64 {
        (bw, scaled(h, bw, w).min(bh))
    } else {
        (scaled(w, bh, h).min(bw), bh)
    }
}

fn resize_or_pass(source: (u32, u32), width: u32, height: u32) -> FitPlan {
    if source == (width, height) {
        FitPlan::Passthrough
    } else {
        FitPlan::Resize { width, height }
    }
}

/// Plan the main fit step for a frame of size `source`.
///
/// Returns `None` if the format names no target dimension. A format with
/// both dimensions and no fit type behaves like [`FitType::Maximum`].
pub fn plan_fit(source: (u32, u32), format: &Format) -> Option<FitPlan> {
    let (w, h) = source;
    let plan = match (format.width, format.height) {
        (None, None) => return None,
        (Some(tw), None) => {
            if format.reduce_only && w <= tw {
                FitPlan::Passthrough
            } else {
                resize_or_pass(source, tw, scaled(h, tw, w))
            }
        }
        (None, Some(th)) => {
            if format.reduce_only && h <= th {
                FitPlan::Passthrough
            } else {
                resize_or_pass(source, scaled(w, th, h), th)
            }
        }
        (Some(tw), Some(th)) => {
            let already_fits = w <= tw && h <= th;
            match format.fit_type.unwrap_or(FitType::Maximum) {
                _ if format.reduce_only && already_fits => FitPlan::Passthrough,
                FitType::Inner => plan_inner(source, (tw, th), format.reduce_only),
                FitType::Outer => plan_outer(source, (tw, th), format.reduce_only),
                FitType::Maximum => {
                    let (out_w, out_h) = contain_dimensions(source, (tw, th));
                    resize_or_pass(source, out_w, out_h)
                }
            }
        }
    };
    Some(plan)
}

fn plan_inner(source: (u32, u32), target: (u32, u32), reduce_only: bool) -> FitPlan {
    let (w, h) = source;
    let (tw, th) = target;
    let crop = if w as u64 * th as u64 > tw as u64 * h as u64 {
        centered(source, (scaled(h, tw, th).min(w), h))
    } else {
        centered(source, (w, scaled(w, th, tw).min(h)))
    };
    let (width, height) = if reduce_only && crop.width <= tw && crop.height <= th {
        (crop.width, crop.height)
    } else {
        (tw, th)
    };
    if crop == Crop::new(0, 0, w, h) {
        resize_or_pass(source, width, height)
    } else {
        FitPlan::CropResize {
            crop,
            width,
            height,
        }
    }
}

fn plan_outer(source: (u32, u32), target: (u32, u32), reduce_only: bool) -> FitPlan {
    let (tw, th) = target;
    let (mut width, mut height) = contain_dimensions(source, target);
    if reduce_only && width >= source.0 && height >= source.1 {
        (width, height) = source;
    }
    if (width, height) == target {
        return resize_or_pass(source, width, height);
    }
    FitPlan::ResizePad {
        width,
        height,
        canvas_width: tw,
        canvas_height: th,
        x: (tw - width) / 2,
        y: (th - height) / 2,
    }
}

/// Output dimensions a plan produces for a frame of size `source`.
pub fn planned_dimensions(source: (u32, u32), plan: &FitPlan) -> (u32, u32) {
    match *plan {
        FitPlan::Passthrough => source,
        FitPlan::Resize { width, height } | FitPlan::CropResize { width, height, .. } => {
            (width, height)
        }
        FitPlan::ResizePad {
            canvas_width,
            canvas_height,
            ..
        } => (canvas_width, canvas_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(width: Option<u32>, height: Option<u32>, fit: Option<FitType>) -> Format {
        Format {
            width,
            height,
            fit_type: fit,
            ..Format::default()
        }
    }

    fn output(source: (u32, u32), format: &Format) -> (u32, u32) {
        let plan = plan_fit(source, format).expect("format has a target");
        planned_dimensions(source, &plan)
    }

    // =========================================================================
    // Crop extension and validation
    // =========================================================================

    #[test]
    fn extend_narrow_crop_widens_symmetrically() {
        // 100x200 crop in a 1000x1000 source, square target → 200x200
        let crop = extend_crop_to_ratio(Crop::new(400, 100, 100, 200), (1000, 1000), (50, 50));
        assert_eq!(crop, Crop::new(350, 100, 200, 200));
    }

    #[test]
    fn extend_wide_crop_heightens_symmetrically() {
        let crop = extend_crop_to_ratio(Crop::new(100, 400, 200, 100), (1000, 1000), (50, 50));
        assert_eq!(crop, Crop::new(100, 350, 200, 200));
    }

    #[test]
    fn extend_crop_clamps_to_source_edge() {
        // Crop hugging the left edge cannot grow leftwards
        let crop = extend_crop_to_ratio(Crop::new(0, 0, 100, 200), (1000, 1000), (1, 1));
        assert_eq!(crop, Crop::new(0, 0, 200, 200));
        // Extension larger than the source is capped at the source width
        let crop = extend_crop_to_ratio(Crop::new(0, 0, 100, 200), (150, 200), (1, 1));
        assert_eq!(crop, Crop::new(0, 0, 150, 200));
    }

    #[test]
    fn extend_crop_with_matching_ratio_is_untouched() {
        let crop = Crop::new(10, 10, 40, 20);
        assert_eq!(extend_crop_to_ratio(crop, (100, 100), (200, 100)), crop);
    }

    #[test]
    fn validate_accepts_in_bounds() {
        let crop = Crop::new(10, 10, 90, 90);
        assert_eq!(validate_crop(crop, (100, 100)), Some(crop));
    }

    #[test]
    fn validate_shrinks_one_pixel_height_overflow() {
        assert_eq!(
            validate_crop(Crop::new(0, 10, 50, 91), (100, 100)),
            Some(Crop::new(0, 10, 50, 90))
        );
    }

    #[test]
    fn validate_rejects_out_of_bounds() {
        assert_eq!(validate_crop(Crop::new(100, 0, 1, 1), (100, 100)), None);
        assert_eq!(validate_crop(Crop::new(0, 100, 1, 1), (100, 100)), None);
        assert_eq!(validate_crop(Crop::new(0, 0, 0, 10), (100, 100)), None);
        assert_eq!(validate_crop(Crop::new(0, 0, 10, 0), (100, 100)), None);
        assert_eq!(validate_crop(Crop::new(1, 0, 100, 10), (100, 100)), None);
        assert_eq!(validate_crop(Crop::new(0, 10, 10, 92), (100, 100)), None);
    }

    // =========================================================================
    // Ratio trim
    // =========================================================================

    #[test]
    fn trim_too_wide_center_crops_width() {
        assert_eq!(
            ratio_trim((400, 100), Some(2.0), None),
            Some(Crop::new(100, 0, 200, 100))
        );
    }

    #[test]
    fn trim_too_tall_center_crops_height() {
        assert_eq!(
            ratio_trim((100, 400), None, Some(0.5)),
            Some(Crop::new(0, 100, 100, 200))
        );
    }

    #[test]
    fn trim_within_limits_is_none() {
        assert_eq!(ratio_trim((150, 100), Some(2.0), Some(0.5)), None);
        assert_eq!(ratio_trim((150, 100), None, None), None);
    }

    // =========================================================================
    // Proportional extension
    // =========================================================================

    #[test]
    fn extension_adds_columns_for_narrow_source() {
        assert_eq!(
            proportional_extension((100, 200), (1, 1)),
            Some(Extension::Horizontal(100))
        );
    }

    #[test]
    fn extension_adds_rows_for_wide_source() {
        assert_eq!(
            proportional_extension((300, 100), (3, 2)),
            Some(Extension::Vertical(100))
        );
    }

    #[test]
    fn extension_within_tolerance_is_none() {
        assert_eq!(proportional_extension((1000, 1000), (1001, 1000)), None);
    }

    #[test]
    fn split_extension_rules() {
        assert_eq!(split_extension(11, true, true), Some((5, 6)));
        assert_eq!(split_extension(11, true, false), Some((11, 0)));
        assert_eq!(split_extension(11, false, true), Some((0, 11)));
        assert_eq!(split_extension(11, false, false), None);
    }

    // =========================================================================
    // Main fit
    // =========================================================================

    #[test]
    fn inner_output_matches_box_exactly() {
        let f = format(Some(150), Some(100), Some(FitType::Inner));
        for source in [(1000, 1000), (37, 913), (913, 37), (150, 100), (10, 10)] {
            assert_eq!(output(source, &f), (150, 100), "source {source:?}");
        }
    }

    #[test]
    fn inner_crops_center_before_scaling() {
        let f = format(Some(100), Some(100), Some(FitType::Inner));
        assert_eq!(
            plan_fit((400, 200), &f),
            Some(FitPlan::CropResize {
                crop: Crop::new(100, 0, 200, 200),
                width: 100,
                height: 100
            })
        );
    }

    #[test]
    fn outer_output_matches_box_exactly() {
        let f = format(Some(102), Some(149), Some(FitType::Outer));
        for source in [(101, 150), (1000, 10), (10, 1000), (102, 149), (5, 5)] {
            assert_eq!(output(source, &f), (102, 149), "source {source:?}");
        }
    }

    #[test]
    fn outer_pads_symmetrically() {
        let f = format(Some(102), Some(149), Some(FitType::Outer));
        assert_eq!(
            plan_fit((101, 150), &f),
            Some(FitPlan::ResizePad {
                width: 100,
                height: 149,
                canvas_width: 102,
                canvas_height: 149,
                x: 1,
                y: 0
            })
        );
    }

    #[test]
    fn maximum_fits_inside_box_preserving_aspect() {
        let f = format(Some(200), Some(100), Some(FitType::Maximum));
        assert_eq!(output((1000, 1000), &f), (100, 100));
        assert_eq!(output((4000, 1000), &f), (200, 50));
        assert_eq!(output((10, 10), &f), (100, 100));
        for source in [(333, 777), (777, 333), (1, 999), (999, 1)] {
            let (w, h) = output(source, &f);
            assert!(w == 200 || h == 100, "{source:?} → {w}x{h}");
            assert!(w <= 200 && h <= 100, "{source:?} → {w}x{h}");
        }
    }

    #[test]
    fn both_dimensions_without_fit_type_behaves_like_maximum() {
        let f = format(Some(200), Some(100), None);
        assert_eq!(output((4000, 1000), &f), (200, 50));
    }

    #[test]
    fn single_dimension_scales_proportionally() {
        assert_eq!(output((400, 300), &format(Some(200), None, None)), (200, 150));
        assert_eq!(output((400, 300), &format(None, Some(150), None)), (200, 150));
    }

    #[test]
    fn reduce_only_never_upscales() {
        for fit in [FitType::Inner, FitType::Outer, FitType::Maximum] {
            let f = Format {
                reduce_only: true,
                ..format(Some(500), Some(500), Some(fit))
            };
            assert_eq!(plan_fit((300, 200), &f), Some(FitPlan::Passthrough), "{fit}");
        }
        let f = Format {
            reduce_only: true,
            ..format(Some(500), None, None)
        };
        assert_eq!(plan_fit((300, 200), &f), Some(FitPlan::Passthrough));
    }

    #[test]
    fn reduce_only_inner_crops_without_upscaling_short_side() {
        // 50x400 into 100x100: crop to 50x50, do not blow it up to 100x100
        let f = Format {
            reduce_only: true,
            ..format(Some(100), Some(100), Some(FitType::Inner))
        };
        assert_eq!(output((50, 400), &f), (50, 50));
    }

    #[test]
    fn already_fitted_input_is_passthrough() {
        for fit in [FitType::Inner, FitType::Outer, FitType::Maximum] {
            let f = format(Some(120), Some(80), Some(fit));
            assert_eq!(plan_fit((120, 80), &f), Some(FitPlan::Passthrough), "{fit}");
        }
    }

    #[test]
    fn no_target_means_no_fit() {
        assert_eq!(plan_fit((100, 100), &Format::default()), None);
    }
}
