//! Per-image pipeline orchestration.
//!
//! This module owns call order and cross-pass state; the algorithmic stages
//! live in their own modules and are imported here. For one image:
//!
//! 1. Segment with the current thresholding mode (largest contour first,
//!    stopping at the size floor).
//! 2. Cheap containment dedup against already-recognized candidates.
//! 3. Recognize every surviving candidate.
//! 4. Overlap-based fragment marking, then compact to recognized cards.
//! 5. Fall through to the next mode only while the frame may still hold more
//!    cards and the early-exit card count is not reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidate::CardCandidate;
use crate::characterize::characterize_contour;
use crate::config::DetectConfig;
use crate::contour::{generate_contours, ThresholdMode};
use crate::geometry::{intersection_area, Polygon};
use crate::preprocess::{downscale_to_max, histogram_adjust};
use crate::recognize::recognize_segment;
use crate::refdb::ReferenceEntry;
use crate::warp::four_point_transform;

/// Sentinel for "no card accepted yet"; real card areas are always larger.
const NO_CARD_AREA: f64 = 0.01;

/// Cooperative cancellation token.
///
/// Checked at the start of each contour iteration and between thresholding
/// modes; cancelling mid-run yields whatever partial result was assembled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A photograph undergoing recognition, with its per-image candidate state.
#[derive(Debug, Clone)]
pub struct TestImage {
    /// Source identifier (typically the file stem).
    pub name: String,
    /// Working-size pixel buffer (downscaled when the input exceeded the
    /// ingest cap). All quad coordinates refer to this buffer.
    pub original: RgbImage,
    /// Contrast-adjusted buffer that segmentation operates on.
    pub adjusted: RgbImage,
    /// Candidate cards found so far.
    pub candidates: Vec<CardCandidate>,
}

impl TestImage {
    /// Ingest a photograph: downscale to the working size and contrast-adjust
    /// the CIELAB lightness channel.
    pub fn ingest(name: impl Into<String>, image: RgbImage, config: &DetectConfig) -> Self {
        let original = downscale_to_max(image, config.preprocess.max_input_dim);
        let adjusted = histogram_adjust(&original, &config.preprocess.clahe);
        Self {
            name: name.into(),
            original,
            adjusted,
            candidates: Vec::new(),
        }
    }

    /// Recognized, non-fragment candidates.
    pub fn recognized(&self) -> impl Iterator<Item = &CardCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.is_recognized && !c.is_fragment)
    }

    /// Drop everything but recognized, non-fragment candidates.
    pub fn discard_unrecognized(&mut self) {
        self.candidates.retain(|c| c.is_recognized && !c.is_fragment);
    }

    /// Area-based test for whether another segmentation pass could plausibly
    /// find more cards: the cards found so far plus a 50 %-margin copy of the
    /// smallest one must still fit in the frame.
    pub fn may_contain_more_cards(&self) -> bool {
        let mut total_area = 0.0;
        let mut min_area = 1.0f64;
        let mut any = false;
        for card in self.recognized() {
            any = true;
            total_area += card.image_area_fraction;
            min_area = min_area.min(card.image_area_fraction);
        }
        if !any {
            return true;
        }
        total_area + 1.5 * min_area < 1.0
    }
}

/// One recognized card in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedCard {
    /// Canonicalized card name.
    pub name: String,
    /// Separation score normalized to the acceptance threshold (≥ 1.0).
    pub score: f64,
    /// Bounding quadrilateral in working-image coordinates.
    pub bounding_quad: Polygon,
    /// Quad area as a fraction of the image area.
    pub image_area_fraction: f64,
}

/// Full recognition result for a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Source image identifier.
    pub image_name: String,
    /// Working image dimensions [width, height].
    pub image_size: [u32; 2],
    /// Recognized cards, in candidate order.
    pub cards: Vec<RecognizedCard>,
    /// Thresholding modes attempted, in order.
    pub modes_tried: Vec<ThresholdMode>,
}

impl RecognitionResult {
    /// Construct an empty result for an image with the provided dimensions.
    pub fn empty(image_name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            image_name: image_name.into(),
            image_size: [width, height],
            cards: Vec::new(),
            modes_tried: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Segmentation pass
// ---------------------------------------------------------------------------

/// Segment the adjusted image into card candidates with one thresholding
/// mode. Contours are processed largest-first; the per-contour characterizer
/// signals when the remaining contours are too small to matter.
fn segment_image(test: &mut TestImage, mode: ThresholdMode, config: &DetectConfig, cancel: &CancelToken) {
    let (w, h) = test.adjusted.dimensions();
    let image_area = w as f64 * h as f64;
    let mut max_segment_area = NO_CARD_AREA;

    let contours = generate_contours(
        &test.adjusted,
        mode,
        &config.segmentation,
        &config.preprocess.clahe,
    );
    debug!(%mode, n_contours = contours.len(), "tracing complete");

    for contour in &contours {
        if cancel.is_cancelled() {
            return;
        }
        let assessment = characterize_contour(contour, max_segment_area, image_area, &config.shape);
        if !assessment.continue_segmentation {
            break;
        }
        let Some(shape) = assessment.candidate else {
            continue;
        };
        if max_segment_area < 0.1 {
            // First accepted card anchors the size range for the rest.
            max_segment_area = shape.bounding_quad.area();
        }
        let cropped = shape.bounding_quad.scale_about_centroid(shape.crop_factor);
        match four_point_transform(&test.adjusted, &cropped) {
            Ok(warped) => {
                let fraction = shape.bounding_quad.area() / image_area;
                test.candidates
                    .push(CardCandidate::new(warped, shape.bounding_quad, fraction));
            }
            Err(err) => {
                debug!(%err, "skipping candidate that failed rectification");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fragment suppression
// ---------------------------------------------------------------------------

/// Overlap-based fragment marking across all candidate pairs.
///
/// Any pair overlapping by more than half the smaller quad loses its worse
/// member: lower recognition score when both are recognized, the
/// unrecognized one otherwise.
fn mark_fragments(candidates: &mut [CardCandidate]) {
    let n = candidates.len();
    for i in 0..n {
        for j in 0..n {
            if i == j || candidates[i].is_fragment || candidates[j].is_fragment {
                continue;
            }
            if !(candidates[i].is_recognized || candidates[j].is_recognized) {
                continue;
            }
            let overlap =
                intersection_area(&candidates[i].bounding_quad, &candidates[j].bounding_quad);
            let min_area = candidates[i]
                .bounding_quad
                .area()
                .min(candidates[j].bounding_quad.area());
            if overlap <= 0.5 * min_area {
                continue;
            }
            if candidates[i].is_recognized && candidates[j].is_recognized {
                if candidates[i].recognition_score < candidates[j].recognition_score {
                    candidates[i].is_fragment = true;
                } else {
                    candidates[j].is_fragment = true;
                }
            } else if candidates[i].is_recognized {
                candidates[j].is_fragment = true;
            } else {
                candidates[i].is_fragment = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Segment with one mode and recognize every surviving candidate.
fn recognize_with_mode(
    test: &mut TestImage,
    mode: ThresholdMode,
    references: &[ReferenceEntry],
    config: &DetectConfig,
    cancel: &CancelToken,
) {
    test.candidates.clear();
    segment_image(test, mode, config, cancel);
    info!(
        image = %test.name,
        %mode,
        n_candidates = test.candidates.len(),
        "segmentation done"
    );

    for i in 0..test.candidates.len() {
        if cancel.is_cancelled() {
            return;
        }
        // Cheap containment dedup against already-recognized candidates.
        let contained = test.candidates.iter().enumerate().any(|(j, other)| {
            j != i
                && other.is_recognized
                && !other.is_fragment
                && other.contains(&test.candidates[i])
        });
        if contained {
            test.candidates[i].is_fragment = true;
            continue;
        }
        let recognition = recognize_segment(&test.candidates[i].warped, references, &config.recognition);
        let candidate = &mut test.candidates[i];
        candidate.is_recognized = recognition.is_recognized;
        candidate.recognition_score = recognition.score;
        candidate.name = recognition.name;
    }

    mark_fragments(&mut test.candidates);
}

/// Run the full multi-mode pipeline over one ingested image.
///
/// `test.candidates` holds the final recognized, non-fragment candidates
/// (with their warped pixel buffers) when this returns.
pub fn run(
    test: &mut TestImage,
    references: &[ReferenceEntry],
    config: &DetectConfig,
    cancel: &CancelToken,
) -> RecognitionResult {
    let (w, h) = test.original.dimensions();
    let mut modes_tried = Vec::new();

    for &mode in &config.segmentation.mode_sequence {
        if cancel.is_cancelled() {
            break;
        }
        modes_tried.push(mode);
        recognize_with_mode(test, mode, references, config, cancel);
        test.discard_unrecognized();

        let n_recognized = test.candidates.len();
        info!(image = %test.name, %mode, n_recognized, "mode complete");
        if !test.may_contain_more_cards() || n_recognized > config.max_recognized_cards {
            break;
        }
    }

    let cards = test
        .recognized()
        .map(|c| RecognizedCard {
            name: c.name.clone(),
            score: c.recognition_score,
            bounding_quad: c.bounding_quad.clone(),
            image_area_fraction: c.image_area_fraction,
        })
        .collect();
    RecognitionResult {
        image_name: test.name.clone(),
        image_size: [w, h],
        cards,
        modes_tried,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn quad(x0: f64, y0: f64, w: f64, h: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x0 + w, y0),
            Point::new(x0 + w, y0 + h),
            Point::new(x0, y0 + h),
        ])
    }

    fn candidate(q: Polygon, recognized: bool, score: f64, name: &str) -> CardCandidate {
        let mut c = CardCandidate::new(RgbImage::new(1, 1), q, 0.1);
        c.is_recognized = recognized;
        c.recognition_score = score;
        c.name = name.to_string();
        c
    }

    #[test]
    fn overlapping_recognized_pair_keeps_higher_score() {
        let mut candidates = vec![
            candidate(quad(0.0, 0.0, 100.0, 140.0), true, 1.2, "shock"),
            candidate(quad(10.0, 10.0, 100.0, 140.0), true, 1.8, "shock"),
        ];
        mark_fragments(&mut candidates);
        assert!(candidates[0].is_fragment);
        assert!(!candidates[1].is_fragment);
    }

    #[test]
    fn equal_scores_break_ties_by_order() {
        let mut candidates = vec![
            candidate(quad(0.0, 0.0, 100.0, 140.0), true, 1.5, "shock"),
            candidate(quad(5.0, 5.0, 100.0, 140.0), true, 1.5, "shock"),
        ];
        mark_fragments(&mut candidates);
        // Scores equal: the later candidate loses.
        assert!(!candidates[0].is_fragment);
        assert!(candidates[1].is_fragment);
    }

    #[test]
    fn recognized_beats_unrecognized_on_overlap() {
        let mut candidates = vec![
            candidate(quad(0.0, 0.0, 100.0, 140.0), false, 0.0, ""),
            candidate(quad(10.0, 10.0, 100.0, 140.0), true, 1.1, "bolt"),
        ];
        mark_fragments(&mut candidates);
        assert!(candidates[0].is_fragment);
        assert!(!candidates[1].is_fragment);
    }

    #[test]
    fn disjoint_candidates_are_untouched() {
        let mut candidates = vec![
            candidate(quad(0.0, 0.0, 100.0, 140.0), true, 1.2, "shock"),
            candidate(quad(300.0, 300.0, 100.0, 140.0), true, 1.4, "bolt"),
        ];
        mark_fragments(&mut candidates);
        assert!(!candidates[0].is_fragment);
        assert!(!candidates[1].is_fragment);
    }

    #[test]
    fn unrecognized_pairs_are_ignored() {
        let mut candidates = vec![
            candidate(quad(0.0, 0.0, 100.0, 140.0), false, 0.0, ""),
            candidate(quad(10.0, 10.0, 100.0, 140.0), false, 0.0, ""),
        ];
        mark_fragments(&mut candidates);
        assert!(!candidates[0].is_fragment);
        assert!(!candidates[1].is_fragment);
    }

    #[test]
    fn may_contain_more_cards_logic() {
        let mut test = TestImage {
            name: "t".into(),
            original: RgbImage::new(10, 10),
            adjusted: RgbImage::new(10, 10),
            candidates: Vec::new(),
        };
        // Nothing recognized yet: always worth another pass.
        assert!(test.may_contain_more_cards());

        let mut big = candidate(quad(0.0, 0.0, 8.0, 9.0), true, 1.5, "a");
        big.image_area_fraction = 0.72;
        test.candidates.push(big);
        // 0.72 + 1.5 × 0.72 > 1: the frame is effectively full.
        assert!(!test.may_contain_more_cards());

        test.candidates[0].image_area_fraction = 0.2;
        // 0.2 + 0.3 < 1: more could fit.
        assert!(test.may_contain_more_cards());
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn empty_reference_run_returns_empty_result() {
        let img = RgbImage::from_pixel(120, 90, image::Rgb([40, 40, 40]));
        let config = DetectConfig::default();
        let mut test = TestImage::ingest("blank", img, &config);
        let result = run(&mut test, &[], &config, &CancelToken::new());
        assert_eq!(result.image_name, "blank");
        assert_eq!(result.image_size, [120, 90]);
        assert!(result.cards.is_empty());
        assert!(!result.modes_tried.is_empty());
    }
}
