//! Image ingest and local-contrast enhancement.
//!
//! Test photographs are downscaled to a working size, then contrast-enhanced
//! with CLAHE on the lightness channel of CIELAB. The same CLAHE engine is
//! reused per-channel by the `rgb` contour mode.

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Contrast-limited adaptive histogram equalization parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Clahe {
    /// Histogram clip limit relative to a uniform distribution.
    pub clip_limit: f64,
    /// Tile grid columns.
    pub tiles_x: u32,
    /// Tile grid rows.
    pub tiles_y: u32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

impl Clahe {
    /// Equalize a single 8-bit plane.
    ///
    /// Per-tile histograms are clipped at `clip_limit × uniform`, the excess
    /// redistributed, and each output pixel is blended bilinearly between the
    /// mappings of the four surrounding tiles.
    pub fn apply(&self, plane: &GrayImage) -> GrayImage {
        let (w, h) = plane.dimensions();
        if w == 0 || h == 0 {
            return plane.clone();
        }
        let gx = self.tiles_x.max(1).min(w) as usize;
        let gy = self.tiles_y.max(1).min(h) as usize;

        // One 256-entry mapping per tile; tiles partition the image evenly so
        // none is ever empty.
        let mut luts = vec![[0u8; 256]; gx * gy];
        for ty in 0..gy {
            for tx in 0..gx {
                let x0 = tx as u32 * w / gx as u32;
                let x1 = (tx as u32 + 1) * w / gx as u32;
                let y0 = ty as u32 * h / gy as u32;
                let y1 = (ty as u32 + 1) * h / gy as u32;

                let mut hist = [0u32; 256];
                for y in y0..y1 {
                    for x in x0..x1 {
                        hist[plane.get_pixel(x, y)[0] as usize] += 1;
                    }
                }
                let n_pixels = ((x1 - x0) * (y1 - y0)).max(1);
                let limit = ((self.clip_limit * n_pixels as f64 / 256.0) as u32).max(1);

                let mut excess = 0u32;
                for bin in hist.iter_mut() {
                    if *bin > limit {
                        excess += *bin - limit;
                        *bin = limit;
                    }
                }
                let bonus = excess / 256;
                let residual = (excess % 256) as usize;
                for (i, bin) in hist.iter_mut().enumerate() {
                    *bin += bonus + u32::from(i < residual);
                }

                let lut = &mut luts[ty * gx + tx];
                let mut cdf = 0u64;
                for (v, bin) in hist.iter().enumerate() {
                    cdf += *bin as u64;
                    lut[v] = ((cdf * 255) / n_pixels as u64).min(255) as u8;
                }
            }
        }

        let mut out = GrayImage::new(w, h);
        let gx_f = gx as f64;
        let gy_f = gy as f64;
        for y in 0..h {
            // Position in tile-center coordinates.
            let fy = (y as f64 + 0.5) * gy_f / h as f64 - 0.5;
            let ty0 = fy.floor().clamp(0.0, gy_f - 1.0) as usize;
            let ty1 = (ty0 + 1).min(gy - 1);
            let wy = (fy - fy.floor()).clamp(0.0, 1.0);
            for x in 0..w {
                let fx = (x as f64 + 0.5) * gx_f / w as f64 - 0.5;
                let tx0 = fx.floor().clamp(0.0, gx_f - 1.0) as usize;
                let tx1 = (tx0 + 1).min(gx - 1);
                let wx = (fx - fx.floor()).clamp(0.0, 1.0);

                let v = plane.get_pixel(x, y)[0] as usize;
                let v00 = luts[ty0 * gx + tx0][v] as f64;
                let v01 = luts[ty0 * gx + tx1][v] as f64;
                let v10 = luts[ty1 * gx + tx0][v] as f64;
                let v11 = luts[ty1 * gx + tx1][v] as f64;
                let top = v00 * (1.0 - wx) + v01 * wx;
                let bottom = v10 * (1.0 - wx) + v11 * wx;
                let blended = top * (1.0 - wy) + bottom * wy;
                out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }
}

// ── sRGB ↔ CIELAB (D65) ────────────────────────────────────────────────────

const XN: f64 = 0.950_47;
const ZN: f64 = 1.088_83;

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

fn rgb_to_lab(px: Rgb<u8>) -> [f64; 3] {
    let r = srgb_to_linear(px[0] as f64 / 255.0);
    let g = srgb_to_linear(px[1] as f64 / 255.0);
    let b = srgb_to_linear(px[2] as f64 / 255.0);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let fx = lab_f(x / XN);
    let fy = lab_f(y);
    let fz = lab_f(z / ZN);
    [
        116.0 * fy - 16.0,
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    ]
}

fn lab_to_rgb(lab: [f64; 3]) -> Rgb<u8> {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let x = XN * lab_f_inv(fx);
    let y = lab_f_inv(fy);
    let z = ZN * lab_f_inv(fz);

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    let to_u8 = |c: f64| (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0).round() as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

// ── Public entry points ────────────────────────────────────────────────────

/// Contrast-enhance an RGB image via CLAHE on the CIELAB lightness channel.
///
/// Chroma is carried through unchanged, so colors keep their hue while local
/// lighting differences across the playmat are flattened.
pub fn histogram_adjust(rgb: &RgbImage, clahe: &Clahe) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let mut l_plane = GrayImage::new(w, h);
    let mut chroma = Vec::with_capacity((w * h) as usize);
    for (src, dst) in rgb.pixels().zip(l_plane.pixels_mut()) {
        let lab = rgb_to_lab(*src);
        *dst = Luma([(lab[0] * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8]);
        chroma.push([lab[1], lab[2]]);
    }

    let equalized = clahe.apply(&l_plane);

    let mut out = RgbImage::new(w, h);
    for (i, px) in out.pixels_mut().enumerate() {
        let l = equalized.as_raw()[i] as f64 * 100.0 / 255.0;
        *px = lab_to_rgb([l, chroma[i][0], chroma[i][1]]);
    }
    out
}

/// Extract one channel of an RGB image as a grayscale plane.
pub fn channel_plane(rgb: &RgbImage, channel: usize) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut out = GrayImage::new(w, h);
    for (src, dst) in rgb.pixels().zip(out.pixels_mut()) {
        *dst = Luma([src[channel]]);
    }
    out
}

/// Downscale proportionally with area averaging when the shortest image side
/// exceeds `max_dim` pixels. Smaller images pass through untouched.
pub fn downscale_to_max(img: RgbImage, max_dim: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let shortest = w.min(h);
    if shortest <= max_dim || max_dim == 0 {
        return img;
    }
    let scale = max_dim as f64 / shortest as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::thumbnail(&img, new_w, new_h)
}
