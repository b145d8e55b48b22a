//! Typed configuration for the detection pipeline.
//!
//! One nested struct per pipeline stage; every field has a literal default
//! matching the tuned values of the recognizer. Construct with
//! `DetectConfig::default()` and override individual fields as needed.

use serde::{Deserialize, Serialize};

use crate::contour::ThresholdMode;
use crate::preprocess::Clahe;
use crate::recognize::{NameMode, RotationPolicy};

/// Image ingest controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Local-contrast enhancement applied to the CIELAB lightness channel.
    pub clahe: Clahe,
    /// Images with a shortest side above this are downscaled before the
    /// pipeline runs (pixels).
    pub max_input_dim: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe: Clahe::default(),
            max_input_dim: 1000,
        }
    }
}

/// Contour generation controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Thresholding modes attempted in order; later modes run only while the
    /// driver believes more cards may exist.
    pub mode_sequence: Vec<ThresholdMode>,
    /// Fixed threshold level for [`ThresholdMode::Gray`].
    pub gray_threshold: u8,
    /// Per-channel fixed threshold level for [`ThresholdMode::Rgb`].
    pub rgb_threshold: u8,
    /// Constant subtracted from the local mean in [`ThresholdMode::Adaptive`].
    pub adaptive_offset: u8,
    /// Safety ceiling on contours examined per mode.
    pub max_contours: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mode_sequence: vec![ThresholdMode::Adaptive, ThresholdMode::Rgb],
            gray_threshold: 70,
            rgb_threshold: 110,
            adaptive_offset: 10,
            max_contours: 100,
        }
    }
}

/// Card-shape acceptance gates applied to each contour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeFilterConfig {
    /// Edges shorter than this fraction of the perimeter are removed during
    /// polygon simplification.
    pub length_cutoff: f64,
    /// Maximum allowed corner-diff before a shape is rejected as rounded or
    /// non-rectangular.
    pub corner_diff_ceiling: f64,
    /// Accepted form-factor band; a 63:88 card rectangle scores ≈ 0.29.
    pub form_factor_range: (f64, f64),
    /// Slope of the corner-diff-driven crop: `1 − slope · qc_diff`.
    pub crop_slope: f64,
}

impl Default for ShapeFilterConfig {
    fn default() -> Self {
        Self {
            length_cutoff: 0.15,
            corner_diff_ceiling: 0.35,
            form_factor_range: (0.25, 0.33),
            crop_slope: 0.22,
        }
    }
}

/// Hash comparison and acceptance controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Separation-score threshold; a candidate is accepted only when the best
    /// match stands this many standard deviations out of the crowd.
    pub separation_threshold: f64,
    /// Perceptual hash edge length `H`; hashes are `H²` bits wide.
    pub hash_size: u32,
    /// How matched reference names are canonicalized.
    pub name_mode: NameMode,
    /// Whether rotation search short-circuits or scores all four rotations.
    pub rotation_policy: RotationPolicy,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            separation_threshold: 4.0,
            hash_size: 32,
            name_mode: NameMode::FirstToken,
            rotation_policy: RotationPolicy::FirstAcceptable,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Ingest controls.
    pub preprocess: PreprocessConfig,
    /// Contour generation controls.
    pub segmentation: SegmentationConfig,
    /// Shape acceptance gates.
    pub shape: ShapeFilterConfig,
    /// Hash comparison controls.
    pub recognition: RecognitionConfig,
    /// Early-exit ceiling: stop trying further modes once more than this many
    /// cards are recognized.
    pub max_recognized_cards: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            segmentation: SegmentationConfig::default(),
            shape: ShapeFilterConfig::default(),
            recognition: RecognitionConfig::default(),
            max_recognized_cards: 5,
        }
    }
}

impl DetectConfig {
    /// Default configuration with the standard mode sequence.
    pub fn new() -> Self {
        Self::default()
    }
}
