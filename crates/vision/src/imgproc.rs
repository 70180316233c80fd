//! Small image primitives used by the operators.

use std::f64::consts::PI;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops};
use imageproc::{
    contrast::{ThresholdType, threshold},
    filter::separable_filter_equal,
    region_labelling::{Connectivity, connected_components},
};

use crate::geometry::{PixelLine, PixelRect};

pub const MASK_ON: u8 = 255;

/// Dimensions after scaling by `factor`, never below one pixel.
pub fn scaled_dims(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * factor).round() as u32).max(1);
    (scale(width), scale(height))
}

pub fn resize_rgb(image: &RgbImage, factor: f64) -> RgbImage {
    let (w, h) = scaled_dims(image.width(), image.height(), factor);
    if (w, h) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, w, h, imageops::FilterType::Triangle)
}

/// Per-channel absolute difference; `None` when the shapes differ.
pub fn absdiff(a: &RgbImage, b: &RgbImage) -> Option<RgbImage> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    Some(ImageBuffer::from_fn(a.width(), a.height(), |x, y| {
        let (pa, pb) = (a.get_pixel(x, y).0, b.get_pixel(x, y).0);
        Rgb([
            pa[0].abs_diff(pb[0]),
            pa[1].abs_diff(pb[1]),
            pa[2].abs_diff(pb[2]),
        ])
    }))
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// 3×3 Gaussian blur (binomial 1 2 1) with replicated borders.
pub fn gaussian_blur3(image: &GrayImage) -> GrayImage {
    separable_filter_equal(image, &[0.25f32, 0.5, 0.25])
}

/// 5×5 Gaussian blur (binomial 1 4 6 4 1) with replicated borders.
pub fn gaussian_blur5(image: &GrayImage) -> GrayImage {
    separable_filter_equal(image, &[0.0625f32, 0.25, 0.375, 0.25, 0.0625])
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|v| **v != 0).count()
}

/// Keep the 8-connected components of `image > low` that contain at least one
/// pixel `> high`.
pub fn hysteresis(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    let weak = threshold(image, low, ThresholdType::Binary);
    let labels = connected_components(&weak, Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0);

    let mut strong = vec![false; count as usize + 1];
    for (label, value) in labels.pixels().zip(image.pixels()) {
        if label.0[0] != 0 && value.0[0] > high {
            strong[label.0[0] as usize] = true;
        }
    }
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        Luma([if label != 0 && strong[label] { MASK_ON } else { 0 }])
    })
}

/// Smallest rectangle holding every non-zero pixel; all zeros for an empty mask.
pub fn bounding_rect(mask: &GrayImage) -> PixelRect {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    match bounds {
        Some((x0, y0, x1, y1)) => PixelRect {
            x: x0,
            y: y0,
            w: x1 - x0 + 1,
            h: y1 - y0 + 1,
        },
        None => PixelRect::default(),
    }
}

pub fn crop(mask: &GrayImage, rect: PixelRect) -> GrayImage {
    let x = rect.x.min(mask.width());
    let y = rect.y.min(mask.height());
    let w = rect.w.min(mask.width() - x);
    let h = rect.h.min(mask.height() - y);
    imageops::crop_imm(mask, x, y, w, h).to_image()
}

/// Parameters of the segment Hough transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughParams {
    /// Distance resolution in pixels.
    pub rho: f64,
    /// Angle resolution in radians.
    pub theta: f64,
    /// Minimum accumulator votes for a line.
    pub threshold: u32,
    pub min_line_length: f64,
    pub max_line_gap: f64,
}

/// Strongest accumulator peaks examined per call. Keeps noisy masks from
/// stalling the pipeline loop.
pub const MAX_HOUGH_PEAKS: usize = 256;

/// Detect line segments among the non-zero pixels of `mask`.
///
/// Accumulator peaks are visited strongest first, at most [`MAX_HOUGH_PEAKS`] of
/// them. Pixels close to a peak's line are ordered along it and split wherever
/// consecutive pixels are more than `max_line_gap` apart; runs at least
/// `min_line_length` long become segments and their pixels stop voting for
/// later peaks.
pub fn hough_segments(mask: &GrayImage, params: &HoughParams) -> Vec<PixelLine> {
    let points: Vec<(f64, f64)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] != 0)
        .map(|(x, y, _)| (x as f64, y as f64))
        .collect();
    if points.is_empty() || params.rho <= 0.0 || params.theta <= 0.0 {
        return Vec::new();
    }

    let n_theta = (PI / params.theta).ceil().max(1.0) as usize;
    let trig: Vec<(f64, f64)> = (0..n_theta)
        .map(|i| {
            let angle = i as f64 * params.theta;
            (angle.cos(), angle.sin())
        })
        .collect();
    let rho_max = (mask.width() as f64).hypot(mask.height() as f64);
    let n_rho = (2.0 * rho_max / params.rho).ceil() as usize + 1;
    let cell = |(x, y): (f64, f64), t: usize| -> usize {
        let (c, s) = trig[t];
        let r = (((x * c + y * s) + rho_max) / params.rho).round() as usize;
        r * n_theta + t
    };

    let mut votes = vec![0u32; n_rho * n_theta];
    for point in &points {
        for t in 0..n_theta {
            votes[cell(*point, t)] += 1;
        }
    }

    // Point indices grouped by the cell they voted for, so a peak only looks
    // at the points near its line.
    let mut offsets = vec![0usize; votes.len() + 1];
    for (i, count) in votes.iter().enumerate() {
        offsets[i + 1] = offsets[i] + *count as usize;
    }
    let mut cursor = offsets.clone();
    let mut voters = vec![0u32; offsets[votes.len()]];
    for (i, point) in points.iter().enumerate() {
        for t in 0..n_theta {
            let slot = &mut cursor[cell(*point, t)];
            voters[*slot] = i as u32;
            *slot += 1;
        }
    }

    let mut peaks: Vec<(u32, usize)> = votes
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= params.threshold.max(1))
        .map(|(i, v)| (*v, i))
        .collect();
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    peaks.truncate(MAX_HOUGH_PEAKS);

    // Pixels within this distance of a peak's line count as on it; covers the
    // drift of lines whose angle falls between two accumulator columns.
    let band = 2.0 * params.rho.max(1.0);
    let reach = (band / params.rho).ceil() as usize;
    let mut used = vec![false; points.len()];
    let mut segments = Vec::new();
    for (_, peak) in peaks {
        let (r, t) = (peak / n_theta, peak % n_theta);
        let (c, s) = trig[t];
        let center = r as f64 * params.rho - rho_max;
        let rows = r.saturating_sub(reach)..=(r + reach).min(n_rho - 1);
        let mut members: Vec<(f64, usize)> = rows
            .flat_map(|row| {
                let cell = row * n_theta + t;
                &voters[offsets[cell]..offsets[cell + 1]]
            })
            .map(|i| *i as usize)
            .filter(|i| {
                let (x, y) = points[*i];
                !used[*i] && (x * c + y * s - center).abs() <= band
            })
            .map(|i| {
                let (x, y) = points[i];
                (-x * s + y * c, i)
            })
            .collect();
        if (members.len() as u32) < params.threshold {
            continue;
        }
        members.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut run_start = 0;
        for k in 1..=members.len() {
            let split = k == members.len() || members[k].0 - members[k - 1].0 > params.max_line_gap;
            if !split {
                continue;
            }
            let (first, last) = (points[members[run_start].1], points[members[k - 1].1]);
            let segment = PixelLine {
                x1: first.0,
                y1: first.1,
                x2: last.0,
                y2: last.1,
            };
            if segment.length() >= params.min_line_length {
                for (_, i) in &members[run_start..k] {
                    used[*i] = true;
                }
                segments.push(segment);
            }
            run_start = k;
        }
    }
    segments
}
