//! Planar geometry primitives for card outline processing.
//!
//! Everything downstream of contour extraction works on [`Polygon`] rings of
//! `f64` points: angular vertex ordering, Shoelace areas, convex hulls, and
//! convex clipping for the overlap tests used by fragment suppression.

mod quad;

pub use quad::{
    bounding_quad, polygon_form_factor, quad_corner_diff, simplify_polygon, QuadFitError,
};

use serde::{Deserialize, Serialize};

/// A 2D point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate (pixels).
    pub x: f64,
    /// Y coordinate (pixels).
    pub y: f64,
}

impl Point {
    /// Construct a point from coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An ordered ring of 2D points, assumed simple (non-self-intersecting).
///
/// The ring is not closed explicitly: the edge from the last vertex back to
/// the first is implied. No vertex is semantically distinguished as "first".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// Build a polygon from a vertex ring.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Vertex ring accessor.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// True when the polygon has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex mean, used as the reference center for angular ordering and
    /// centroid-anchored scaling.
    pub fn centroid(&self) -> Point {
        let n = self.vertices.len().max(1) as f64;
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }

    /// Signed Shoelace area. Positive for counterclockwise rings in a y-up
    /// frame; image consumers should use [`Polygon::area`].
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        0.5 * acc
    }

    /// Absolute enclosed area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Sum of edge lengths.
    pub fn perimeter(&self) -> f64 {
        let n = self.vertices.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.vertices[i].distance(&self.vertices[(i + 1) % n]))
            .sum()
    }

    /// Length of the shortest edge.
    pub fn min_edge_length(&self) -> f64 {
        let n = self.vertices.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.vertices[i].distance(&self.vertices[(i + 1) % n]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Reorder vertices by ascending angle `atan2(y - ȳ, x - x̄)` around the
    /// vertex mean. Yields a consistent ring orientation but does not single
    /// out a canonical first vertex.
    pub fn order_by_angle(&self) -> Polygon {
        let c = self.centroid();
        let mut ordered = self.vertices.clone();
        ordered.sort_by(|a, b| {
            let aa = (a.y - c.y).atan2(a.x - c.x);
            let ab = (b.y - c.y).atan2(b.x - c.x);
            aa.partial_cmp(&ab).unwrap_or(std::cmp::Ordering::Equal)
        });
        Polygon::new(ordered)
    }

    /// Scale the polygon about its vertex mean by `factor`.
    pub fn scale_about_centroid(&self, factor: f64) -> Polygon {
        let c = self.centroid();
        Polygon::new(
            self.vertices
                .iter()
                .map(|p| Point::new(c.x + factor * (p.x - c.x), c.y + factor * (p.y - c.y)))
                .collect(),
        )
    }

    /// Ray-casting point-in-polygon test.
    pub fn contains_point(&self, p: &Point) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// All-vertices-inside containment test. Adequate for the convex and
    /// near-convex rings produced by hull extraction and quad fitting.
    pub fn contains_polygon(&self, other: &Polygon) -> bool {
        !other.is_empty() && other.vertices.iter().all(|p| self.contains_point(p))
    }

    /// Ring with counterclockwise (positive signed area) orientation.
    fn ccw(&self) -> Polygon {
        if self.signed_area() < 0.0 {
            let mut v = self.vertices.clone();
            v.reverse();
            Polygon::new(v)
        } else {
            self.clone()
        }
    }
}

/// Intersection point of the infinite lines through `(a1, a2)` and
/// `(b1, b2)`. Returns `None` when the lines are parallel.
pub fn line_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let d1x = a1.x - a2.x;
    let d1y = a1.y - a2.y;
    let d2x = b1.x - b2.x;
    let d2y = b1.y - b2.y;
    let denom = d1x * d2y - d1y * d2x;
    if denom == 0.0 {
        return None;
    }
    let c1 = a1.x * a2.y - a1.y * a2.x;
    let c2 = b1.x * b2.y - b1.y * b2.x;
    Some(Point::new(
        (c1 * d2x - d1x * c2) / denom,
        (c1 * d2y - d1y * c2) / denom,
    ))
}

/// Convex hull of a point set by Andrew's monotone chain.
///
/// Returns a counterclockwise ring without collinear interior points.
pub fn convex_hull(points: &[Point]) -> Polygon {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup_by(|a, b| a.x == b.x && a.y == b.y);
    let n = pts.len();
    if n < 3 {
        return Polygon::new(pts);
    }

    let cross = |o: &Point, a: &Point, b: &Point| -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    let mut hull: Vec<Point> = Vec::with_capacity(2 * n);
    for p in pts.iter() {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    Polygon::new(hull)
}

/// Sutherland–Hodgman clip of `subject` against convex `clip`.
///
/// Exact for convex inputs, which covers every caller here (bounding quads,
/// convex hulls, corner triangles).
pub fn convex_clip(subject: &Polygon, clip: &Polygon) -> Polygon {
    if subject.len() < 3 || clip.len() < 3 {
        return Polygon::new(Vec::new());
    }
    let clip = clip.ccw();
    let mut output = subject.vertices.clone();

    let nc = clip.vertices.len();
    for i in 0..nc {
        if output.is_empty() {
            break;
        }
        let e1 = clip.vertices[i];
        let e2 = clip.vertices[(i + 1) % nc];
        let inside = |p: &Point| (e2.x - e1.x) * (p.y - e1.y) - (e2.y - e1.y) * (p.x - e1.x) >= 0.0;

        let input = std::mem::take(&mut output);
        let n = input.len();
        for j in 0..n {
            let cur = input[j];
            let prev = input[(j + n - 1) % n];
            let cur_in = inside(&cur);
            let prev_in = inside(&prev);
            if cur_in {
                if !prev_in {
                    if let Some(x) = line_intersection(prev, cur, e1, e2) {
                        output.push(x);
                    }
                }
                output.push(cur);
            } else if prev_in {
                if let Some(x) = line_intersection(prev, cur, e1, e2) {
                    output.push(x);
                }
            }
        }
    }
    Polygon::new(output)
}

/// Area of the intersection of two convex polygons.
pub fn intersection_area(a: &Polygon, b: &Polygon) -> f64 {
    convex_clip(a, b).area()
}

/// Clip the segment `a..b` to the interior of a convex polygon.
///
/// Returns the surviving sub-segment endpoints, or `None` when the segment
/// misses the polygon entirely.
pub fn clip_segment_to_convex(poly: &Polygon, a: Point, b: Point) -> Option<(Point, Point)> {
    if poly.len() < 3 {
        return None;
    }
    let poly = poly.ccw();
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t_min = 0.0f64;
    let mut t_max = 1.0f64;

    let n = poly.vertices.len();
    for i in 0..n {
        let e1 = poly.vertices[i];
        let e2 = poly.vertices[(i + 1) % n];
        // Inward normal of edge e1->e2 for a CCW ring.
        let nx = -(e2.y - e1.y);
        let ny = e2.x - e1.x;
        let denom = nx * dx + ny * dy;
        let dist = nx * (a.x - e1.x) + ny * (a.y - e1.y);
        if denom == 0.0 {
            if dist < 0.0 {
                return None;
            }
            continue;
        }
        let t = -dist / denom;
        if denom > 0.0 {
            // entering
            t_min = t_min.max(t);
        } else {
            t_max = t_max.min(t);
        }
        if t_min > t_max {
            return None;
        }
    }

    Some((
        Point::new(a.x + t_min * dx, a.y + t_min * dy),
        Point::new(a.x + t_max * dx, a.y + t_max * dy),
    ))
}
