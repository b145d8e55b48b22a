//! mtgscan — recognizes Magic: The Gathering cards in photographs.
//!
//! Given a photograph of a collection or playmat, the pipeline locates each
//! rectangular card, rectifies it to a canonical view, and matches it against
//! a pre-hashed reference library. The stages are:
//!
//! 1. **Preprocess** – downscale to working size, CLAHE contrast adjustment
//!    in the CIELAB lightness channel.
//! 2. **Contours** – multi-mode thresholding (adaptive local mean, then
//!    per-channel), Suzuki–Abe border following, largest-first ordering.
//! 3. **Characterize** – convex hull, minimum-area enclosing quadrilateral,
//!    corner-fill and form-factor gates.
//! 4. **Rectify** – four-point perspective transform of each accepted quad.
//! 5. **Recognize** – DCT perceptual hash compared against every reference
//!    over four rotations, accepted on statistical separation.
//! 6. **Dedup** – two-stage fragment suppression across overlapping
//!    detections, with a further segmentation mode attempted only while the
//!    frame may still hold more cards.
//!
//! # Public API
//! [`CardDetector`] is the primary entry point: construct it once from a
//! reference list and a [`DetectConfig`], then recognize many images.
//! [`refdb::load`] reads the persisted reference database.

mod annotate;
mod candidate;
mod characterize;
mod config;
mod contour;
pub mod geometry;
mod phash;
mod pipeline;
mod preprocess;
mod recognize;
pub mod refdb;
mod warp;

pub use annotate::annotate;
pub use candidate::CardCandidate;
pub use config::{
    DetectConfig, PreprocessConfig, RecognitionConfig, SegmentationConfig, ShapeFilterConfig,
};
pub use contour::ThresholdMode;
pub use phash::{phash, ParseHashError, PerceptualHash};
pub use pipeline::{CancelToken, RecognitionResult, RecognizedCard, TestImage};
pub use preprocess::Clahe;
pub use recognize::{NameMode, Recognition, RotationPolicy};
pub use refdb::{RefDbError, ReferenceEntry};
pub use warp::{four_point_transform, Rotation, WarpError};

use image::RgbImage;

/// Primary recognition interface.
///
/// Wraps the reference library and a [`DetectConfig`]. Create once, recognize
/// many images; the detector is immutable during recognition and may be
/// shared across threads for per-image parallelism.
///
/// # Examples
///
/// ```no_run
/// use mtgscan::{refdb, CardDetector};
/// use std::path::Path;
///
/// let references = refdb::load(Path::new("hashes.json")).unwrap();
/// let detector = CardDetector::new(references);
/// let photo = image::open("playmat.jpg").unwrap().to_rgb8();
/// let result = detector.recognize("playmat", photo);
/// println!("found {} cards", result.cards.len());
/// ```
pub struct CardDetector {
    config: DetectConfig,
    references: Vec<ReferenceEntry>,
}

impl CardDetector {
    /// Detector with the default configuration.
    pub fn new(references: Vec<ReferenceEntry>) -> Self {
        Self::with_config(references, DetectConfig::default())
    }

    /// Detector with full configuration control.
    pub fn with_config(references: Vec<ReferenceEntry>, config: DetectConfig) -> Self {
        Self { config, references }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut DetectConfig {
        &mut self.config
    }

    /// The loaded reference entries.
    pub fn references(&self) -> &[ReferenceEntry] {
        &self.references
    }

    /// Recognize cards in a photograph.
    pub fn recognize(&self, name: &str, image: RgbImage) -> RecognitionResult {
        let mut test = TestImage::ingest(name, image, &self.config);
        self.recognize_image(&mut test)
    }

    /// Recognize cards in an already-ingested [`TestImage`].
    ///
    /// On return `test.candidates` holds the final recognized candidates with
    /// their warped pixel buffers, for callers that want more than the
    /// serializable summary (e.g. [`annotate`]).
    pub fn recognize_image(&self, test: &mut TestImage) -> RecognitionResult {
        pipeline::run(test, &self.references, &self.config, &CancelToken::new())
    }

    /// Recognize with a cooperative cancellation token.
    ///
    /// Cancellation is observed between contours and between thresholding
    /// modes; a cancelled run returns the partial result assembled so far.
    pub fn recognize_with_cancel(
        &self,
        test: &mut TestImage,
        cancel: &CancelToken,
    ) -> RecognitionResult {
        pipeline::run(test, &self.references, &self.config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn detector_on_blank_image_finds_nothing() {
        let detector = CardDetector::new(Vec::new());
        let img = RgbImage::from_pixel(200, 150, Rgb([30, 30, 30]));
        let result = detector.recognize("blank", img);
        assert!(result.cards.is_empty());
        assert_eq!(result.image_size, [200, 150]);
        assert_eq!(
            result.modes_tried,
            vec![ThresholdMode::Adaptive, ThresholdMode::Rgb]
        );
    }

    #[test]
    fn cancelled_run_returns_partial_result() {
        let detector = CardDetector::new(Vec::new());
        let img = RgbImage::from_pixel(120, 100, Rgb([30, 30, 30]));
        let mut test = TestImage::ingest("t", img, detector.config());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = detector.recognize_with_cancel(&mut test, &cancel);
        assert!(result.cards.is_empty());
        assert!(result.modes_tried.is_empty());
    }

    #[test]
    fn config_mut_tunes_detection() {
        let mut detector = CardDetector::new(Vec::new());
        detector.config_mut().max_recognized_cards = 2;
        assert_eq!(detector.config().max_recognized_cards, 2);
    }
}
