//! Card candidate records tracked per test image.

use image::RgbImage;

use crate::geometry::Polygon;

/// A segmented region of the test image that may be a recognizable card.
///
/// Created by segmentation, filled in by the recognizer, and possibly marked
/// a fragment (a redundant overlap of a better detection) by the dedup
/// passes. Fragments never appear in final results.
#[derive(Debug, Clone)]
pub struct CardCandidate {
    /// Perspective-rectified view of the candidate region.
    pub warped: RgbImage,
    /// Bounding quadrilateral in (downscaled) image coordinates.
    pub bounding_quad: Polygon,
    /// Quad area divided by image area, in (0, 1].
    pub image_area_fraction: f64,
    /// Whether recognition accepted this candidate.
    pub is_recognized: bool,
    /// Normalized separation score; ≥ 1.0 exactly when recognized.
    pub recognition_score: f64,
    /// Whether a dedup pass marked this candidate redundant.
    pub is_fragment: bool,
    /// Canonicalized card name; empty while unrecognized.
    pub name: String,
}

impl CardCandidate {
    /// Fresh, unrecognized candidate.
    pub fn new(warped: RgbImage, bounding_quad: Polygon, image_area_fraction: f64) -> Self {
        Self {
            warped,
            bounding_quad,
            image_area_fraction,
            is_recognized: false,
            recognition_score: 0.0,
            is_fragment: false,
            name: String::new(),
        }
    }

    /// Whether this candidate's quad contains the other's and both carry the
    /// same card name. Used by the cheap containment dedup pass.
    pub fn contains(&self, other: &CardCandidate) -> bool {
        self.name == other.name && self.bounding_quad.contains_polygon(&other.bounding_quad)
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

    fn candidate(q: Polygon, name: &str) -> CardCandidate {
        let mut c = CardCandidate::new(RgbImage::new(1, 1), q, 0.1);
        c.name = name.to_string();
        c
    }

    #[test]
    fn containment_requires_matching_name() {
        let outer = candidate(quad(0.0, 0.0, 100.0, 140.0), "shock");
        let inner_same = candidate(quad(10.0, 10.0, 50.0, 70.0), "shock");
        let inner_other = candidate(quad(10.0, 10.0, 50.0, 70.0), "bolt");
        assert!(outer.contains(&inner_same));
        assert!(!outer.contains(&inner_other));
        assert!(!inner_same.contains(&outer));
    }

    #[test]
    fn new_candidate_starts_unrecognized() {
        let c = CardCandidate::new(RgbImage::new(1, 1), quad(0.0, 0.0, 10.0, 14.0), 0.5);
        assert!(!c.is_recognized);
        assert!(!c.is_fragment);
        assert_eq!(c.recognition_score, 0.0);
        assert!(c.name.is_empty());
    }
}
