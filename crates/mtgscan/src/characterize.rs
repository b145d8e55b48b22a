//! Contour-to-card characterization: decide whether a contour looks like a
//! card and fit its bounding quadrilateral.

use tracing::debug;

use crate::config::ShapeFilterConfig;
use crate::geometry::{
    bounding_quad, convex_hull, polygon_form_factor, quad_corner_diff, Polygon,
};

/// Corner probe extent used by the corner-diff test.
const QC_REGION_SIZE: f64 = 0.9;

/// Accepted card shape for one contour.
#[derive(Debug, Clone)]
pub struct CandidateShape {
    /// Minimum-area quadrilateral enclosing the contour's convex hull, in
    /// original-image coordinates.
    pub bounding_quad: Polygon,
    /// Shrink factor applied to the quad before rectification, trimming
    /// background bleed at rounded card corners.
    pub crop_factor: f64,
}

/// Outcome of characterizing one contour.
#[derive(Debug, Clone)]
pub struct ContourAssessment {
    /// Whether segmentation should keep going. Contours arrive largest-first,
    /// so a hull below the size floor means no larger ones remain.
    pub continue_segmentation: bool,
    /// Fitted shape when the contour passed all card gates.
    pub candidate: Option<CandidateShape>,
}

impl ContourAssessment {
    fn stop() -> Self {
        Self {
            continue_segmentation: false,
            candidate: None,
        }
    }

    fn skip() -> Self {
        Self {
            continue_segmentation: true,
            candidate: None,
        }
    }

    fn accept(shape: CandidateShape) -> Self {
        Self {
            continue_segmentation: true,
            candidate: Some(shape),
        }
    }
}

/// Characterize a raw contour against the current size context.
///
/// `max_segment_area` is the area of the largest card accepted so far (a
/// small sentinel before any acceptance); `image_area` the full frame area.
pub fn characterize_contour(
    contour: &Polygon,
    max_segment_area: f64,
    image_area: f64,
    config: &ShapeFilterConfig,
) -> ContourAssessment {
    let hull = convex_hull(contour.vertices());
    let floor = (0.1 * max_segment_area).max(image_area / 1000.0);
    if hull.area() < floor {
        return ContourAssessment::stop();
    }

    let quad = match bounding_quad(&hull, config.length_cutoff) {
        Ok(q) => q,
        Err(err) => {
            debug!(%err, "dropping contour without a bounding quad");
            return ContourAssessment::skip();
        }
    };
    let Some(qc_diff) = quad_corner_diff(&hull, &quad, QC_REGION_SIZE) else {
        debug!("dropping contour with degenerate corner probes");
        return ContourAssessment::skip();
    };
    let crop_factor = (1.0 - config.crop_slope * qc_diff).min(1.0);

    let quad_area = quad.area();
    let form_factor = polygon_form_factor(&quad);
    let (ff_lo, ff_hi) = config.form_factor_range;
    let is_card = 0.1 * max_segment_area < quad_area
        && quad_area < 0.99 * image_area
        && qc_diff < config.corner_diff_ceiling
        && ff_lo < form_factor
        && form_factor < ff_hi;

    if is_card {
        ContourAssessment::accept(CandidateShape {
            bounding_quad: quad,
            crop_factor,
        })
    } else {
        ContourAssessment::skip()
    }
}
