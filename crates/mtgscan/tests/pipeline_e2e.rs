//! End-to-end pipeline scenarios on synthetic card scenes.
//!
//! Each scene renders one or more "cards" — bright-bordered rectangles with a
//! per-seed mosaic artwork — onto a dark playmat, and the reference library
//! holds hashes of the same artworks rendered at canonical size. Artwork is
//! defined in normalized card coordinates so any rendering size produces the
//! same pattern.

use image::{Rgb, RgbImage};

use mtgscan::{phash, CardDetector, DetectConfig, RecognitionResult, ReferenceEntry, TestImage};

const LIBRARY_SIZE: u32 = 100;
const HERO_SEED: u32 = 17;

fn block_hash(bx: u32, by: u32, seed: u32) -> u32 {
    let v = bx
        .wrapping_mul(73_856_093)
        .wrapping_add(by.wrapping_mul(19_349_663))
        .wrapping_add(seed.wrapping_mul(83_492_791));
    v ^ (v >> 13)
}

/// Card appearance at normalized coordinates (u, v) ∈ [0, 1)².
///
/// A bright solid frame surrounds a 10×14 mosaic of bright blocks; keeping
/// every block above mid-gray makes the card pop against the dark playmat
/// under every thresholding mode.
fn card_pixel(seed: u32, u: f64, v: f64) -> Rgb<u8> {
    if !(0.06..0.94).contains(&u) || !(0.06..0.94).contains(&v) {
        return Rgb([235, 232, 228]);
    }
    let bx = ((u * 10.0) as u32).min(9);
    let by = ((v * 14.0) as u32).min(13);
    let h = block_hash(bx, by, seed);
    Rgb([
        128 + (h & 0x7F) as u8,
        128 + ((h >> 8) & 0x7F) as u8,
        128 + ((h >> 16) & 0x7F) as u8,
    ])
}

fn reference_image(seed: u32) -> RgbImage {
    RgbImage::from_fn(320, 440, |x, y| {
        card_pixel(seed, (x as f64 + 0.5) / 320.0, (y as f64 + 0.5) / 440.0)
    })
}

fn reference_library() -> Vec<ReferenceEntry> {
    (0..LIBRARY_SIZE)
        .map(|i| ReferenceEntry {
            name: if i == HERO_SEED {
                "dragon_whelp".to_string()
            } else {
                format!("card_{:03}", i)
            },
            phash: phash(&reference_image(i), 32),
        })
        .collect()
}

fn playmat(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([25, 28, 32]))
}

fn draw_card(scene: &mut RgbImage, seed: u32, x0: u32, y0: u32, w: u32, h: u32) {
    for y in 0..h {
        for x in 0..w {
            let px = card_pixel(seed, (x as f64 + 0.5) / w as f64, (y as f64 + 0.5) / h as f64);
            scene.put_pixel(x0 + x, y0 + y, px);
        }
    }
}

fn detect(scene: RgbImage) -> RecognitionResult {
    CardDetector::new(reference_library()).recognize("scene", scene)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_centered_card_is_recognized() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);
    let result = detect(scene);

    assert_eq!(result.cards.len(), 1, "expected exactly one card");
    let card = &result.cards[0];
    assert_eq!(card.name, "dragon_whelp");
    assert!(card.score >= 1.2, "score {}", card.score);
    assert!(
        (0.40..0.65).contains(&card.image_area_fraction),
        "area fraction {}",
        card.image_area_fraction
    );
}

#[test]
fn rotated_scene_finds_the_same_card() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);
    let rotated = image::imageops::rotate90(&scene);
    let result = detect(rotated);

    assert_eq!(result.cards.len(), 1);
    assert_eq!(result.cards[0].name, "dragon_whelp");
    assert!(
        (0.40..0.65).contains(&result.cards[0].image_area_fraction),
        "area fraction {}",
        result.cards[0].image_area_fraction
    );
}

#[test]
fn two_separate_cards_are_both_recognized() {
    let mut scene = playmat(1200, 900);
    draw_card(&mut scene, HERO_SEED, 60, 100, 380, 532);
    draw_card(&mut scene, 42, 640, 300, 380, 532);
    let result = detect(scene);

    let mut names: Vec<&str> = result.cards.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["card_042", "dragon_whelp"]);
    let total: f64 = result.cards.iter().map(|c| c.image_area_fraction).sum();
    assert!((0.3..0.6).contains(&total), "total area fraction {}", total);
}

#[test]
fn duplicate_card_in_two_places_is_reported_twice() {
    let mut scene = playmat(1200, 900);
    draw_card(&mut scene, HERO_SEED, 60, 100, 380, 532);
    draw_card(&mut scene, HERO_SEED, 640, 300, 380, 532);
    let result = detect(scene);

    assert_eq!(result.cards.len(), 2);
    assert!(result.cards.iter().all(|c| c.name == "dragon_whelp"));
}

#[test]
fn empty_reference_library_yields_empty_result() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);
    let result = CardDetector::new(Vec::new()).recognize("scene", scene);

    assert!(result.cards.is_empty());
    assert_eq!(result.modes_tried.len(), 2, "both modes should be attempted");
}

#[test]
fn scene_without_rectangles_finds_nothing() {
    let mut scene = playmat(800, 600);
    // A large bright disc: plenty of contrast, no card shape.
    for y in 0..600u32 {
        for x in 0..800u32 {
            let dx = x as f64 - 400.0;
            let dy = y as f64 - 300.0;
            if (dx * dx + dy * dy).sqrt() < 200.0 {
                scene.put_pixel(x, y, Rgb([220, 215, 210]));
            }
        }
    }
    let result = detect(scene);
    assert!(result.cards.is_empty());
}

#[test]
fn heavily_occluded_card_is_at_most_one_match() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);
    // Cover the top 35 % of the card with playmat again.
    for y in 20..216u32 {
        for x in 200..600u32 {
            scene.put_pixel(x, y, Rgb([25, 28, 32]));
        }
    }
    let result = detect(scene);
    assert!(result.cards.len() <= 1);
    if let Some(card) = result.cards.first() {
        assert_eq!(card.name, "dragon_whelp");
    }
}

#[test]
fn oversized_input_is_downscaled_and_still_recognized() {
    // Same layout at 2× scale; ingest caps the shortest side at 1000 px.
    let mut scene = playmat(1600, 1200);
    draw_card(&mut scene, HERO_SEED, 400, 40, 800, 1120);
    let result = detect(scene);

    assert_eq!(result.image_size, [1333, 1000]);
    assert_eq!(result.cards.len(), 1);
    assert_eq!(result.cards[0].name, "dragon_whelp");
}

#[test]
fn results_are_deterministic() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);
    let a = detect(scene.clone());
    let b = detect(scene);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn reference_order_does_not_change_recognition() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);

    let forward = CardDetector::new(reference_library()).recognize("scene", scene.clone());
    let mut reversed_refs = reference_library();
    reversed_refs.reverse();
    let reversed = CardDetector::new(reversed_refs).recognize("scene", scene);

    let names = |r: &RecognitionResult| {
        let mut v: Vec<String> = r.cards.iter().map(|c| c.name.clone()).collect();
        v.sort_unstable();
        v
    };
    assert_eq!(names(&forward), names(&reversed));
}

#[test]
fn final_candidates_expose_warped_buffers() {
    let mut scene = playmat(800, 600);
    draw_card(&mut scene, HERO_SEED, 200, 20, 400, 560);

    let detector = CardDetector::new(reference_library());
    let mut test = TestImage::ingest("scene", scene, &DetectConfig::default());
    let result = detector.recognize_image(&mut test);

    assert_eq!(result.cards.len(), 1);
    assert_eq!(test.candidates.len(), 1);
    let candidate = &test.candidates[0];
    assert!(candidate.is_recognized && !candidate.is_fragment);
    assert!(candidate.recognition_score >= 1.0);
    // The warped view is roughly portrait card shaped.
    let (w, h) = candidate.warped.dimensions();
    let aspect = h as f64 / w as f64;
    assert!((1.1..1.8).contains(&aspect), "aspect {}", aspect);
}
