//! Solid-border detection and canvas extension.
//!
//! Proportional extension grows the canvas with a border that looks like it
//! was always there. That only works when the edge being continued is a flat
//! color, so every edge strip is measured first: an edge qualifies when each
//! channel's standard deviation (on a 0..1 scale) is below
//! [`SOLID_EDGE_MAX_DEVIATION`].

use super::calculations::{Extension, split_extension};
use image::{Rgba, RgbaImage};

pub const SOLID_EDGE_MAX_DEVIATION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

/// Mean color of a 1px edge strip, if the strip is solid.
pub fn solid_edge_color(img: &RgbaImage, edge: Edge) -> Option<Rgba<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let strip: Vec<&Rgba<u8>> = match edge {
        Edge::Left => (0..h).map(|y| img.get_pixel(0, y)).collect(),
        Edge::Right => (0..h).map(|y| img.get_pixel(w - 1, y)).collect(),
        Edge::Top => (0..w).map(|x| img.get_pixel(x, 0)).collect(),
        Edge::Bottom => (0..w).map(|x| img.get_pixel(x, h - 1)).collect(),
    };

    let n = strip.len() as f64;
    let mut mean = [0.0f64; 4];
    for px in &strip {
        for (c, m) in mean.iter_mut().enumerate() {
            *m += px.0[c] as f64 / 255.0;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = [0.0f64; 4];
    for px in &strip {
        for (c, v) in variance.iter_mut().enumerate() {
            let d = px.0[c] as f64 / 255.0 - mean[c];
            *v += d * d;
        }
    }
    if variance
        .iter()
        .any(|v| (v / n).sqrt() >= SOLID_EDGE_MAX_DEVIATION)
    {
        return None;
    }

    Some(Rgba(mean.map(|m| (m * 255.0).round().clamp(0.0, 255.0) as u8)))
}

/// Pixels to add on each side of a frame, with the fill color of each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderPlan {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub colors: [Rgba<u8>; 4],
}

impl BorderPlan {
    /// Work out where `extension` can go for `img`.
    ///
    /// `None` when neither edge of the extended axis is solid.
    pub fn for_extension(img: &RgbaImage, extension: Extension) -> Option<Self> {
        let transparent = Rgba([0, 0, 0, 0]);
        let (first, second, extra) = match extension {
            Extension::Horizontal(extra) => (Edge::Left, Edge::Right, extra),
            Extension::Vertical(extra) => (Edge::Top, Edge::Bottom, extra),
        };
        let first_color = solid_edge_color(img, first);
        let second_color = solid_edge_color(img, second);
        let (a, b) = split_extension(extra, first_color.is_some(), second_color.is_some())?;
        let first_color = first_color.unwrap_or(transparent);
        let second_color = second_color.unwrap_or(transparent);

        Some(match extension {
            Extension::Horizontal(_) => BorderPlan {
                left: a,
                right: b,
                top: 0,
                bottom: 0,
                colors: [first_color, second_color, transparent, transparent],
            },
            Extension::Vertical(_) => BorderPlan {
                left: 0,
                right: 0,
                top: a,
                bottom: b,
                colors: [transparent, transparent, first_color, second_color],
            },
        })
    }

    /// Paint the border around `img`.
    pub fn apply(&self, img: &RgbaImage) -> RgbaImage {
        let (w, h) = img.dimensions();
        let [left, right, top, bottom] = self.colors;
        RgbaImage::from_fn(
            w + self.left + self.right,
            h + self.top + self.bottom,
            |x, y| {
                if x < self.left {
                    left
                } else if x >= self.left + w {
                    right
                } else if y < self.top {
                    top
                } else if y >= self.top + h {
                    bottom
                } else {
                    *img.get_pixel(x - self.left, y - self.top)
                }
            },
        )
    }
}
