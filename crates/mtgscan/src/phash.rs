//! DCT-based perceptual hashing of warped card segments.
//!
//! A segment is resized to `H×H`, converted to grayscale, transformed with a
//! 2D type-II DCT, and thresholded against the median coefficient (DC
//! excluded) into an `H²`-bit string. Visually similar segments land within a
//! small Hamming distance of each other; the recognizer works purely on these
//! bit-strings.

use image::RgbImage;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A fixed-width perceptual hash bit-string.
///
/// Bit `i` corresponds to the row-major DCT coefficient `i` of the hashed
/// segment. Consumers only compare hashes of equal width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualHash {
    words: Vec<u64>,
    n_bits: u32,
}

impl PerceptualHash {
    /// Number of bits in the hash.
    pub fn len_bits(&self) -> u32 {
        self.n_bits
    }

    /// Hamming distance to another hash of the same width.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        debug_assert_eq!(self.n_bits, other.n_bits, "comparing hashes of unequal width");
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    fn from_bits(bits: impl ExactSizeIterator<Item = bool>) -> Self {
        let n_bits = bits.len() as u32;
        let mut words = vec![0u64; (n_bits as usize).div_ceil(64)];
        for (i, bit) in bits.enumerate() {
            if bit {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Self { words, n_bits }
    }

    /// Lowercase hex encoding, one nibble per four bits, LSB-first per word.
    pub fn to_hex(&self) -> String {
        let n_nibbles = (self.n_bits as usize).div_ceil(4);
        let mut out = String::with_capacity(n_nibbles);
        for i in 0..n_nibbles {
            let word = self.words[i / 16];
            let nibble = ((word >> ((i % 16) * 4)) & 0xF) as u32;
            out.push(char::from_digit(nibble, 16).unwrap_or('0'));
        }
        out
    }

    /// Parse the [`PerceptualHash::to_hex`] encoding.
    pub fn from_hex(s: &str) -> Result<Self, ParseHashError> {
        let mut words = vec![0u64; s.len().div_ceil(16)];
        for (i, c) in s.chars().enumerate() {
            let nibble = c
                .to_digit(16)
                .ok_or(ParseHashError::InvalidDigit { position: i })? as u64;
            words[i / 16] |= nibble << ((i % 16) * 4);
        }
        Ok(Self {
            words,
            n_bits: (s.len() * 4) as u32,
        })
    }
}

impl std::fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PerceptualHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PerceptualHash::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Error parsing a hex-encoded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseHashError {
    /// A character was not a hexadecimal digit.
    InvalidDigit {
        /// Offset of the offending character.
        position: usize,
    },
}

impl std::fmt::Display for ParseHashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDigit { position } => {
                write!(f, "invalid hex digit at position {}", position)
            }
        }
    }
}

impl std::error::Error for ParseHashError {}

// ── Hash computation ───────────────────────────────────────────────────────

/// Unnormalized 1D type-II DCT of each row of an `n × n` matrix, via a
/// precomputed cosine table.
fn dct_rows(data: &[f64], n: usize, table: &[f64], out: &mut [f64]) {
    for row in 0..n {
        let src = &data[row * n..(row + 1) * n];
        for k in 0..n {
            let cosines = &table[k * n..(k + 1) * n];
            let mut acc = 0.0;
            for m in 0..n {
                acc += src[m] * cosines[m];
            }
            out[row * n + k] = acc;
        }
    }
}

fn transpose(data: &[f64], n: usize, out: &mut [f64]) {
    for r in 0..n {
        for c in 0..n {
            out[c * n + r] = data[r * n + c];
        }
    }
}

/// Perceptual hash of an image segment.
///
/// `hash_size` is the resized edge length `H`; the result is `H²` bits wide.
pub fn phash(segment: &RgbImage, hash_size: u32) -> PerceptualHash {
    let n = hash_size.max(1) as usize;
    let resized = image::imageops::resize(
        segment,
        n as u32,
        n as u32,
        image::imageops::FilterType::Lanczos3,
    );
    let gray = image::imageops::grayscale(&resized);
    let pixels: Vec<f64> = gray.as_raw().iter().map(|&v| v as f64).collect();

    // cos(π k (2m + 1) / 2N) for the row/column passes.
    let mut table = vec![0.0f64; n * n];
    for k in 0..n {
        for m in 0..n {
            table[k * n + m] =
                (std::f64::consts::PI * k as f64 * (2 * m + 1) as f64 / (2 * n) as f64).cos();
        }
    }

    let mut stage = vec![0.0f64; n * n];
    let mut transposed = vec![0.0f64; n * n];
    let mut coeffs = vec![0.0f64; n * n];
    dct_rows(&pixels, n, &table, &mut stage);
    transpose(&stage, n, &mut transposed);
    dct_rows(&transposed, n, &table, &mut stage);
    transpose(&stage, n, &mut coeffs);

    // Median over everything but the DC coefficient.
    let mut rest: Vec<f64> = coeffs[1..].to_vec();
    rest.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if rest.is_empty() {
        0.0
    } else if rest.len() % 2 == 1 {
        rest[rest.len() / 2]
    } else {
        0.5 * (rest[rest.len() / 2 - 1] + rest[rest.len() / 2])
    };

    PerceptualHash::from_bits(coeffs.iter().map(|&c| c > median))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Coarse hashed-block mosaic; different seeds give unrelated layouts.
    fn textured(seed: u32, w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = (x / 12)
                .wrapping_mul(73_856_093)
                .wrapping_add((y / 12).wrapping_mul(19_349_663))
                .wrapping_add(seed.wrapping_mul(83_492_791));
            let v = v ^ (v >> 13);
            Rgb([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8])
        })
    }

    #[test]
    fn hash_is_deterministic_and_self_distance_zero() {
        let img = textured(1, 120, 160);
        let a = phash(&img, 32);
        let b = phash(&img, 32);
        assert_eq!(a.len_bits(), 1024);
        assert_eq!(a, b);
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn different_textures_are_far_apart() {
        let a = phash(&textured(1, 120, 160), 32);
        let b = phash(&textured(97, 160, 120), 32);
        assert!(a.distance(&b) > 100, "distance {}", a.distance(&b));
    }

    #[test]
    fn distance_is_symmetric() {
        let a = phash(&textured(5, 90, 90), 32);
        let b = phash(&textured(50, 90, 90), 32);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn hex_round_trip() {
        let a = phash(&textured(9, 64, 64), 32);
        let hex = a.to_hex();
        assert_eq!(hex.len(), 256);
        let back = PerceptualHash::from_hex(&hex).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(matches!(
            PerceptualHash::from_hex("00zz"),
            Err(ParseHashError::InvalidDigit { position: 2 })
        ));
    }

    #[test]
    fn json_round_trip() {
        let a = phash(&textured(3, 64, 64), 32);
        let json = serde_json::to_string(&a).unwrap();
        let back: PerceptualHash = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn flat_image_sets_only_the_dc_bit() {
        // Every AC coefficient of a constant image is zero, so only the DC
        // term survives the median threshold.
        let img = RgbImage::from_pixel(64, 64, Rgb([120, 120, 120]));
        let h = phash(&img, 32);
        let expected = PerceptualHash::from_bits((0..1024).map(|i| i == 0));
        assert_eq!(h, expected);
    }
}
