//! Result visualization: quad overlays on the working image.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::candidate::CardCandidate;

const QUAD_COLOR: Rgb<u8> = Rgb([40, 220, 70]);

/// Copy of the working image with each recognized, non-fragment candidate's
/// bounding quad drawn on top. Purely a consumer convenience; recognition
/// results never depend on it.
pub fn annotate(original: &RgbImage, candidates: &[CardCandidate]) -> RgbImage {
    let mut out = original.clone();
    for candidate in candidates {
        if candidate.is_fragment || !candidate.is_recognized {
            continue;
        }
        let verts = candidate.bounding_quad.vertices();
        let n = verts.len();
        for i in 0..n {
            let a = verts[i];
            let b = verts[(i + 1) % n];
            draw_line_segment_mut(
                &mut out,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                QUAD_COLOR,
            );
        }
    }
    out
}
