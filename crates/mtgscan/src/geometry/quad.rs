//! Polygon simplification and minimum-area enclosing quadrilateral fitting.
//!
//! Thresholded card outlines come back as convex hulls with 5–10 sides from
//! corner rounding and noise. The fitter first removes the shortest edges by
//! extending their neighbors, then enumerates enclosing quadrilaterals from
//! 4-subsets of the remaining edges and keeps the one with minimum area.

use super::{line_intersection, Point, Polygon};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors that can occur while fitting a bounding quadrilateral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuadFitError {
    /// The input ring has fewer vertices than a quadrilateral.
    Degenerate {
        /// Number of vertices in the offending ring.
        vertices: usize,
    },
    /// No candidate quadrilateral encloses the simplified polygon.
    NoEnclosingQuad,
}

impl std::fmt::Display for QuadFitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degenerate { vertices } => {
                write!(f, "degenerate polygon with {} vertices", vertices)
            }
            Self::NoEnclosingQuad => write!(f, "no enclosing quadrilateral found"),
        }
    }
}

impl std::error::Error for QuadFitError {}

// ── Simplification ─────────────────────────────────────────────────────────

/// Iteratively remove the shortest edge of a polygon while more than four
/// vertices remain and that edge is shorter than `length_cutoff` times the
/// perimeter. Removal replaces the edge's two endpoints with the intersection
/// of the two neighboring edges extended as lines; simplification stops if
/// those neighbors are parallel.
///
/// `max_iter` caps the number of removals. `segment_to_remove` forces a single
/// removal of the named edge instead of the shortest one.
pub fn simplify_polygon(
    poly: &Polygon,
    length_cutoff: f64,
    max_iter: Option<usize>,
    segment_to_remove: Option<usize>,
) -> Polygon {
    let mut verts: Vec<Point> = poly.vertices().to_vec();
    let max_iter = if segment_to_remove.is_some() {
        Some(1)
    } else {
        max_iter
    };
    let mut n_iter = 0usize;

    while verts.len() > 4 {
        let n = verts.len();
        let edge_len =
            |i: usize| -> f64 { verts[i % n].distance(&verts[(i + 1) % n]) };
        let total: f64 = (0..n).map(edge_len).sum();

        let k = match segment_to_remove {
            Some(seg) => seg % n,
            None => (0..n)
                .min_by(|&a, &b| {
                    edge_len(a)
                        .partial_cmp(&edge_len(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(0),
        };
        if edge_len(k) >= length_cutoff * total {
            break;
        }

        // Neighboring edges of edge k, extended as infinite lines.
        let prev = (
            verts[(k + n - 1) % n],
            verts[k % n],
        );
        let next = (
            verts[(k + 1) % n],
            verts[(k + 2) % n],
        );
        let Some(x) = line_intersection(prev.0, prev.1, next.0, next.1) else {
            break;
        };
        verts[k] = x;
        verts.remove((k + 1) % n);

        n_iter += 1;
        if let Some(cap) = max_iter {
            if n_iter >= cap {
                break;
            }
        }
    }

    Polygon::new(verts)
}

// ── Enclosing quad enumeration ─────────────────────────────────────────────

/// Corner points of the quadrilateral formed by the edges `i`, `j`, `k`, `l`
/// of the ring, extended as lines and intersected consecutively.
fn quad_corners(
    verts: &[Point],
    (i, j, k, l): (usize, usize, usize, usize),
) -> Option<[Point; 4]> {
    let n = verts.len();
    let edge = |m: usize| (verts[m % n], verts[(m + 1) % n]);
    let (e_i, e_j, e_k, e_l) = (edge(i), edge(j), edge(k), edge(l));
    Some([
        line_intersection(e_i.0, e_i.1, e_j.0, e_j.1)?,
        line_intersection(e_j.0, e_j.1, e_k.0, e_k.1)?,
        line_intersection(e_k.0, e_k.1, e_l.0, e_l.1)?,
        line_intersection(e_l.0, e_l.1, e_i.0, e_i.1)?,
    ])
}

/// Minimum-area quadrilateral enclosing a convex hull polygon.
///
/// The hull is simplified first; candidate quads are generated from all
/// 4-subsets of the simplified edges and must enclose a 0.9999-scaled copy of
/// the polygon (the shrink avoids numerical ties on coincident edges).
pub fn bounding_quad(hull: &Polygon, length_cutoff: f64) -> Result<Polygon, QuadFitError> {
    if hull.len() < 4 {
        return Err(QuadFitError::Degenerate {
            vertices: hull.len(),
        });
    }
    let simple = simplify_polygon(hull, length_cutoff, None, None);
    let ordered = simple.order_by_angle();
    if ordered.len() < 4 {
        return Err(QuadFitError::Degenerate {
            vertices: ordered.len(),
        });
    }
    let shrunk = ordered.scale_about_centroid(0.9999);
    let verts = ordered.vertices();
    let n = verts.len();

    let mut best: Option<Polygon> = None;
    let mut best_area = f64::INFINITY;
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                for l in (k + 1)..n {
                    let Some(corners) = quad_corners(verts, (i, j, k, l)) else {
                        continue;
                    };
                    let quad = Polygon::new(corners.to_vec()).order_by_angle();
                    if !quad.contains_polygon(&shrunk) {
                        continue;
                    }
                    let area = quad.area();
                    if area < best_area {
                        best_area = area;
                        best = Some(quad);
                    }
                }
            }
        }
    }
    best.ok_or(QuadFitError::NoEnclosingQuad)
}

// ── Shape statistics ───────────────────────────────────────────────────────

/// Fraction of the bounding quad's corner regions that the hull fails to
/// cover, in [0, 1]. Card shapes fill their corners; rounded or non-card
/// blobs do not.
///
/// For each corner a triangular probe region is bounded by the corner, the
/// two adjacent quad edges, and a chord through the `region_size`
/// toward-center interior point orthogonal to the corner-to-center vector.
/// Returns `None` when a probe chord degenerates.
pub fn quad_corner_diff(hull: &Polygon, quad: &Polygon, region_size: f64) -> Option<f64> {
    let corners = quad.vertices();
    if corners.len() != 4 {
        return None;
    }
    let c = quad.centroid();

    let mut quad_corner_area = 0.0;
    let mut hull_corner_area = 0.0;
    for corner in corners {
        let interior = Point::new(
            c.x + region_size * (corner.x - c.x),
            c.y + region_size * (corner.y - c.y),
        );
        // Chord direction orthogonal to corner-to-center, spanning the quad.
        let p0 = Point::new(interior.x + (corner.y - c.y), interior.y - (corner.x - c.x));
        let p1 = Point::new(interior.x - (corner.y - c.y), interior.y + (corner.x - c.x));
        let (q0, q1) = super::clip_segment_to_convex(quad, p0, p1)?;
        let triangle = Polygon::new(vec![q0, q1, *corner]);
        quad_corner_area += triangle.area();
        hull_corner_area += super::intersection_area(&triangle, hull);
    }
    if quad_corner_area <= 0.0 {
        return None;
    }
    Some(1.0 - hull_corner_area / quad_corner_area)
}

/// Area over perimeter, scaled by the shortest edge length.
///
/// A rectangle with the 63:88 card aspect ratio scores ≈ 0.29 regardless of
/// scale, which is what the candidate filter keys on.
pub fn polygon_form_factor(poly: &Polygon) -> f64 {
    let perimeter = poly.perimeter();
    let min_edge = poly.min_edge_length();
    if perimeter <= 0.0 || min_edge <= 0.0 {
        return 0.0;
    }
    poly.area() / (perimeter * min_edge)
}
