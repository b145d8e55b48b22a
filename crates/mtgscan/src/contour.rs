//! Candidate contour generation from thresholded images.
//!
//! Each [`ThresholdMode`] binarizes the contrast-adjusted image a different
//! way; contours are then traced with Suzuki–Abe border following and handed
//! to the shape characterizer largest-first. The driver walks the modes in a
//! fixed order and only falls through to the next one while more cards may
//! still be hiding in the frame.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::SegmentationConfig;
use crate::geometry::{Point, Polygon};
use crate::preprocess::{channel_plane, Clahe};

/// Thresholding strategy used to binarize the image before contour tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Fixed threshold on the grayscale image.
    Gray,
    /// Local-mean (Gaussian-weighted) adaptive threshold on grayscale.
    Adaptive,
    /// Per-channel fixed threshold after per-channel CLAHE; contour lists of
    /// the three channels are concatenated.
    Rgb,
    /// Concatenation of all of the above.
    All,
}

impl std::fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gray => "gray",
            Self::Adaptive => "adaptive",
            Self::Rgb => "rgb",
            Self::All => "all",
        };
        f.write_str(s)
    }
}

/// Binary threshold: strictly brighter than `level` becomes foreground.
fn threshold_fixed(plane: &GrayImage, level: u8) -> GrayImage {
    let mut out = GrayImage::new(plane.width(), plane.height());
    for (src, dst) in plane.pixels().zip(out.pixels_mut()) {
        *dst = Luma([if src[0] > level { 255 } else { 0 }]);
    }
    out
}

/// Adaptive threshold against a Gaussian-weighted local mean.
///
/// The window spans `1 + 2·(min(W,H)/20)` pixels; a pixel is foreground when
/// it is brighter than its local mean minus `offset`.
fn threshold_adaptive(plane: &GrayImage, offset: u8) -> GrayImage {
    let (w, h) = plane.dimensions();
    let window = 1 + 2 * (w.min(h) / 20);
    // OpenCV's kernel-size-to-sigma rule.
    let sigma = 0.3 * ((window as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = imageproc::filter::gaussian_blur_f32(plane, sigma.max(0.3));

    let mut out = GrayImage::new(w, h);
    for ((src, m), dst) in plane.pixels().zip(mean.pixels()).zip(out.pixels_mut()) {
        let fg = src[0] as i16 > m[0] as i16 - offset as i16;
        *dst = Luma([if fg { 255 } else { 0 }]);
    }
    out
}

/// Trace all borders (outer and hole, tree topology) of a binary image.
fn trace_contours(binary: &GrayImage) -> Vec<Polygon> {
    let contours: Vec<imageproc::contours::Contour<u32>> =
        imageproc::contours::find_contours(binary);
    contours
        .into_iter()
        .filter(|c| c.points.len() >= 3)
        .map(|c| {
            Polygon::new(
                c.points
                    .into_iter()
                    .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                    .collect(),
            )
        })
        .collect()
}

fn contours_gray(adjusted: &RgbImage, level: u8) -> Vec<Polygon> {
    trace_contours(&threshold_fixed(&image::imageops::grayscale(adjusted), level))
}

fn contours_adaptive(adjusted: &RgbImage, offset: u8) -> Vec<Polygon> {
    trace_contours(&threshold_adaptive(
        &image::imageops::grayscale(adjusted),
        offset,
    ))
}

fn contours_rgb(adjusted: &RgbImage, level: u8, clahe: &Clahe) -> Vec<Polygon> {
    let mut all = Vec::new();
    for channel in 0..3 {
        let plane = clahe.apply(&channel_plane(adjusted, channel));
        all.extend(trace_contours(&threshold_fixed(&plane, level)));
    }
    all
}

/// Generate candidate contours for one thresholding mode, sorted by enclosed
/// area descending and capped at `config.max_contours`.
pub fn generate_contours(
    adjusted: &RgbImage,
    mode: ThresholdMode,
    config: &SegmentationConfig,
    clahe: &Clahe,
) -> Vec<Polygon> {
    let mut contours = match mode {
        ThresholdMode::Gray => contours_gray(adjusted, config.gray_threshold),
        ThresholdMode::Adaptive => contours_adaptive(adjusted, config.adaptive_offset),
        ThresholdMode::Rgb => contours_rgb(adjusted, config.rgb_threshold, clahe),
        ThresholdMode::All => {
            let mut c = contours_gray(adjusted, config.gray_threshold);
            c.extend(contours_adaptive(adjusted, config.adaptive_offset));
            c.extend(contours_rgb(adjusted, config.rgb_threshold, clahe));
            c
        }
    };
    contours.sort_by(|a, b| {
        b.area()
            .partial_cmp(&a.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    contours.truncate(config.max_contours);
    contours
}
