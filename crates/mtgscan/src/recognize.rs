//! Per-segment recognition: hash comparison against the reference library
//! with a four-rotation search and statistical separation scoring.
//!
//! A raw minimum Hamming distance is meaningless on its own — busy playmat
//! textures can land moderately close to everything. What marks a true match
//! is the best distance standing far outside the distribution of all the
//! other distances, measured in standard deviations.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::RecognitionConfig;
use crate::phash::phash;
use crate::refdb::ReferenceEntry;
use crate::warp::Rotation;

/// How the matched reference name is turned into the reported card name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMode {
    /// Keep the first whitespace-separated token, collapsing printing
    /// variants that share a base name.
    FirstToken,
    /// Report the reference name unchanged.
    FullName,
}

/// How the rotation search resolves to a final rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Stop at the first rotation whose score exceeds the threshold while
    /// being the running maximum of the scores seen so far.
    FirstAcceptable,
    /// Score all four rotations and take the global maximum.
    BestOfFour,
}

/// Outcome of recognizing one warped segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Whether the segment matched a reference with sufficient separation.
    pub is_recognized: bool,
    /// Separation score normalized so 1.0 equals the acceptance threshold;
    /// 0.0 when unrecognized.
    pub score: f64,
    /// Canonicalized matched name; empty when unrecognized.
    pub name: String,
}

impl Recognition {
    fn rejected() -> Self {
        Self {
            is_recognized: false,
            score: 0.0,
            name: String::new(),
        }
    }
}

fn canonicalize(name: &str, mode: NameMode) -> String {
    match mode {
        NameMode::FirstToken => name.split_whitespace().next().unwrap_or("").to_string(),
        NameMode::FullName => name.to_string(),
    }
}

/// Best reference match for one rotation of the segment.
struct RotationScore {
    /// Separation score `(μ_rest − d_min) / σ_rest`; 0 when degenerate.
    separation: f64,
    /// Index of the closest reference entry.
    best_index: usize,
}

fn score_rotation(segment: &RgbImage, rotation: Rotation, references: &[ReferenceEntry], hash_size: u32) -> RotationScore {
    let hash = phash(&rotation.apply(segment), hash_size);

    let mut best_index = 0usize;
    let mut d_min = u32::MAX;
    let distances: Vec<f64> = references
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let d = hash.distance(&entry.phash);
            if d < d_min {
                d_min = d;
                best_index = i;
            }
            d as f64
        })
        .collect();

    // Statistics over the strictly-worse distances only.
    let rest: Vec<f64> = distances
        .iter()
        .copied()
        .filter(|&d| d > d_min as f64)
        .collect();
    if rest.is_empty() {
        return RotationScore {
            separation: 0.0,
            best_index,
        };
    }
    let mean = rest.iter().sum::<f64>() / rest.len() as f64;
    let var = rest.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / rest.len() as f64;
    let std = var.sqrt();
    let separation = if std > 0.0 {
        (mean - d_min as f64) / std
    } else {
        0.0
    };
    RotationScore {
        separation,
        best_index,
    }
}

/// Compare a warped segment against the full reference library.
///
/// With fewer than two reference entries no separation statistic exists, so
/// recognition degrades gracefully to "not recognized".
pub fn recognize_segment(
    segment: &RgbImage,
    references: &[ReferenceEntry],
    config: &RecognitionConfig,
) -> Recognition {
    if references.is_empty() {
        return Recognition::rejected();
    }
    let threshold = config.separation_threshold;

    let accept = |score: &RotationScore| Recognition {
        is_recognized: true,
        score: score.separation / threshold,
        name: canonicalize(&references[score.best_index].name, config.name_mode),
    };

    match config.rotation_policy {
        RotationPolicy::FirstAcceptable => {
            let mut running_max = f64::NEG_INFINITY;
            for rotation in Rotation::ALL {
                let score = score_rotation(segment, rotation, references, config.hash_size);
                trace!(?rotation, separation = score.separation, "rotation scored");
                if score.separation > threshold && score.separation > running_max {
                    return accept(&score);
                }
                running_max = running_max.max(score.separation);
            }
            Recognition::rejected()
        }
        RotationPolicy::BestOfFour => {
            let best = Rotation::ALL
                .into_iter()
                .map(|rotation| score_rotation(segment, rotation, references, config.hash_size))
                .max_by(|a, b| {
                    a.separation
                        .partial_cmp(&b.separation)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            match best {
                Some(score) if score.separation > threshold => accept(&score),
                _ => Recognition::rejected(),
            }
        }
    }
}
