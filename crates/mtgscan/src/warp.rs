//! Perspective rectification: four-point transform onto a canonical
//! rectangle, plus the exact cardinal rotations used by the recognizer.
//!
//! Vertex ordering is by angle about the vertex mean, which gives consistent
//! relative positions but no canonical "top-left" corner; the recognizer
//! compensates by searching all four rotations of the warped segment.

use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Polygon};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors from the four-point transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarpError {
    /// The source polygon does not have exactly four vertices.
    NotAQuad {
        /// Number of vertices supplied.
        vertices: usize,
    },
    /// The corner correspondence does not define an invertible homography
    /// (collinear or coincident vertices).
    SingularHomography,
}

impl std::fmt::Display for WarpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAQuad { vertices } => {
                write!(f, "four-point transform needs 4 vertices, got {}", vertices)
            }
            Self::SingularHomography => write!(f, "degenerate quad: homography is singular"),
        }
    }
}

impl std::error::Error for WarpError {}

// ── Cardinal rotations ─────────────────────────────────────────────────────

/// A multiple-of-90° rotation.
///
/// Restricting to cardinal rotations keeps the rotation search lossless — no
/// interpolation happens between hashing attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation.
    R0,
    /// 90° clockwise.
    R90,
    /// 180°.
    R180,
    /// 270° clockwise.
    R270,
}

impl Rotation {
    /// Rotation search order used by the recognizer.
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    /// Apply the rotation to an image buffer.
    pub fn apply(self, img: &RgbImage) -> RgbImage {
        match self {
            Rotation::R0 => img.clone(),
            Rotation::R90 => image::imageops::rotate90(img),
            Rotation::R180 => image::imageops::rotate180(img),
            Rotation::R270 => image::imageops::rotate270(img),
        }
    }
}

// ── Homography ─────────────────────────────────────────────────────────────

/// Direct linear transform for four point correspondences: solves the 8×8
/// system for the homography with `h₂₂ = 1`.
fn homography_from_corners(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;
        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }
    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

#[inline]
fn bilinear_sample(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let max_x = (w - 1) as f64;
    let max_y = (h - 1) as f64;
    if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p01 = img.get_pixel(x1, y0);
    let p10 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p01[c] as f64 * fx;
        let bottom = p10[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp the region bounded by a quadrilateral to a canonical rectangle.
///
/// Target width and height are the longer of the two opposing edge pairs of
/// the angle-ordered quad, clamped to at least one pixel. Destination pixels
/// whose back-projection falls outside the source receive black.
pub fn four_point_transform(image: &RgbImage, quad: &Polygon) -> Result<RgbImage, WarpError> {
    if quad.len() != 4 {
        return Err(WarpError::NotAQuad {
            vertices: quad.len(),
        });
    }
    let ordered = quad.order_by_angle();
    let v = ordered.vertices();

    let width_a = v[0].distance(&v[1]);
    let width_b = v[3].distance(&v[2]);
    let height_a = v[0].distance(&v[3]);
    let height_b = v[1].distance(&v[2]);
    let dst_w = (width_a as u32).max(width_b as u32).max(1);
    let dst_h = (height_a as u32).max(height_b as u32).max(1);

    let src = [v[0], v[1], v[2], v[3]];
    let dst = [
        Point::new(0.0, 0.0),
        Point::new((dst_w - 1) as f64, 0.0),
        Point::new((dst_w - 1) as f64, (dst_h - 1) as f64),
        Point::new(0.0, (dst_h - 1) as f64),
    ];
    let h = homography_from_corners(&src, &dst).ok_or(WarpError::SingularHomography)?;
    let h_inv = h.try_inverse().ok_or(WarpError::SingularHomography)?;

    let mut out = RgbImage::new(dst_w, dst_h);
    for y in 0..dst_h {
        for x in 0..dst_w {
            let p = h_inv * nalgebra::Vector3::new(x as f64, y as f64, 1.0);
            if p[2].abs() < f64::EPSILON {
                continue;
            }
            let sx = p[0] / p[2];
            let sy = p[1] / p[2];
            out.put_pixel(x, y, bilinear_sample(image, sx, sy));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]))
    }

    #[test]
    fn axis_aligned_quad_is_a_crop() {
        let img = gradient_image(100, 100);
        let quad = Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(60.0, 10.0),
            Point::new(60.0, 80.0),
            Point::new(10.0, 80.0),
        ]);
        let warped = four_point_transform(&img, &quad).unwrap();
        assert_eq!(warped.dimensions(), (50, 70));
        // Quad corners land exactly on destination corners.
        assert_eq!(*warped.get_pixel(0, 0), *img.get_pixel(10, 10));
        assert_eq!(*warped.get_pixel(49, 0), *img.get_pixel(60, 10));
        assert_eq!(*warped.get_pixel(49, 69), *img.get_pixel(60, 80));
        // Interior pixels are a near-unit resampling of the crop.
        let mid = warped.get_pixel(25, 35);
        assert!((mid[0] as i32 - 35).abs() <= 1);
        assert!((mid[1] as i32 - 45).abs() <= 1);
    }

    #[test]
    fn vertex_order_does_not_matter() {
        let img = gradient_image(100, 100);
        let a = Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(60.0, 10.0),
            Point::new(60.0, 80.0),
            Point::new(10.0, 80.0),
        ]);
        let b = Polygon::new(vec![
            Point::new(60.0, 80.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 80.0),
            Point::new(60.0, 10.0),
        ]);
        let wa = four_point_transform(&img, &a).unwrap();
        let wb = four_point_transform(&img, &b).unwrap();
        assert_eq!(wa.as_raw(), wb.as_raw());
    }

    #[test]
    fn collinear_quad_is_rejected() {
        let img = gradient_image(50, 50);
        let quad = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(30.0, 0.0),
        ]);
        assert!(four_point_transform(&img, &quad).is_err());
    }

    #[test]
    fn non_quad_is_rejected() {
        let img = gradient_image(50, 50);
        let tri = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 10.0),
        ]);
        assert!(matches!(
            four_point_transform(&img, &tri),
            Err(WarpError::NotAQuad { vertices: 3 })
        ));
    }

    #[test]
    fn cardinal_rotations_are_exact() {
        let img = gradient_image(30, 20);
        assert_eq!(Rotation::R90.apply(&img).dimensions(), (20, 30));
        assert_eq!(Rotation::R180.apply(&img).dimensions(), (30, 20));

        let back = Rotation::R90.apply(&Rotation::R90.apply(&Rotation::R180.apply(&img)));
        assert_eq!(back.as_raw(), img.as_raw());
    }
}
