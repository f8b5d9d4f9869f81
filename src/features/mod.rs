use image::{DynamicImage, GrayImage, imageops};
use imageproc::contrast::equalize_histogram;

use crate::config::{DetectorKind, RegistrationConfig};
use crate::types::{FeatureSet, Keypoint};

pub mod binary;
pub mod gradient;

pub use binary::OrbDetector;
pub use gradient::GradientDetector;

/// Keypoint + descriptor extraction for one image.
///
/// Implementations never fail: an image with no detectable structure yields an
/// empty [`FeatureSet`], which callers must treat as a distinct case.
pub trait FeatureDetector: Send + Sync {
    fn detect(&self, img: &GrayImage) -> FeatureSet;
}

/// Builds the configured detector strategy.
pub fn build_detector(config: &RegistrationConfig) -> Box<dyn FeatureDetector> {
    match config.detector {
        DetectorKind::Gradient => Box::new(GradientDetector::new(
            config.max_features,
            config.contrast_threshold,
        )),
        DetectorKind::Binary => Box::new(OrbDetector::new(
            config.max_features,
            config.contrast_threshold,
        )),
    }
}

/// Grayscale conversion + histogram equalization. Run on both images of a pair
/// before detection to compensate for visual/thermal intensity differences.
pub fn preprocess(img: &DynamicImage) -> GrayImage {
    equalize_histogram(&img.to_luma8())
}

pub(crate) const PYRAMID_LEVELS: usize = 8;
pub(crate) const PYRAMID_SCALE_FACTOR: f32 = 1.2;
const MIN_LEVEL_DIM: u32 = 40;
const FAST_ARC_LEN: usize = 9;
const NMS_RADIUS: f32 = 5.0;

const FAST_OFFSETS: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Downscaled copies of `img` paired with the multiplier that maps their
/// coordinates back to the original image.
pub(crate) fn build_pyramid(img: &GrayImage, levels: usize, factor: f32) -> Vec<(GrayImage, f32)> {
    let mut pyramid = vec![(img.clone(), 1.0)];
    let mut current = img.clone();
    let mut scale = 1.0f32;
    for _ in 1..levels {
        let w = (current.width() as f32 / factor) as u32;
        let h = (current.height() as f32 / factor) as u32;
        if w < MIN_LEVEL_DIM || h < MIN_LEVEL_DIM {
            break;
        }
        scale *= factor;
        current = imageops::resize(&current, w, h, imageops::FilterType::Gaussian);
        pyramid.push((current.clone(), scale));
    }
    pyramid
}

fn fast_pre_check(img: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);
    let cardinal = [
        img.get_pixel(x, y - 3)[0],
        img.get_pixel(x + 3, y)[0],
        img.get_pixel(x, y + 3)[0],
        img.get_pixel(x - 3, y)[0],
    ];
    let n_bright = cardinal.iter().filter(|&&p| p > bright).count();
    let n_dark = cardinal.iter().filter(|&&p| p < dark).count();
    n_bright >= 3 || n_dark >= 3
}

fn is_fast_corner(img: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);
    let mut run_bright = 0usize;
    let mut run_dark = 0usize;
    let mut best_bright = 0usize;
    let mut best_dark = 0usize;
    // Walk the circle twice to catch arcs that wrap around.
    for i in 0..FAST_OFFSETS.len() * 2 {
        let (dx, dy) = FAST_OFFSETS[i % FAST_OFFSETS.len()];
        let p = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
        if p > bright {
            run_bright += 1;
            run_dark = 0;
            best_bright = best_bright.max(run_bright);
        } else if p < dark {
            run_dark += 1;
            run_bright = 0;
            best_dark = best_dark.max(run_dark);
        } else {
            run_bright = 0;
            run_dark = 0;
        }
    }
    best_bright >= FAST_ARC_LEN || best_dark >= FAST_ARC_LEN
}

/// Local intensity standard deviation, used to rank corners.
fn corner_response(img: &GrayImage, x: u32, y: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut count = 0u32;
    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
                let v = img.get_pixel(px as u32, py as u32)[0] as f32;
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }
    }
    let mean = sum / count as f32;
    ((sum_sq / count as f32) - mean * mean).max(0.0).sqrt()
}

/// FAST segment-test corners on one pyramid level, in level coordinates.
pub(crate) fn detect_fast(img: &GrayImage, threshold: u8) -> Vec<Keypoint> {
    let (w, h) = (img.width(), img.height());
    if w < 7 || h < 7 {
        return Vec::new();
    }
    let mut corners = Vec::new();
    for y in 3..h - 3 {
        for x in 3..w - 3 {
            let center = img.get_pixel(x, y)[0];
            if !fast_pre_check(img, x, y, center, threshold) {
                continue;
            }
            if is_fast_corner(img, x, y, center, threshold) {
                corners.push(Keypoint {
                    pos: glam::Vec2::new(x as f32, y as f32),
                    scale: 1.0,
                    angle: 0.0,
                    response: corner_response(img, x, y),
                });
            }
        }
    }
    corners
}

/// A keypoint candidate remembering which pyramid level it came from, so the
/// descriptor can be sampled on that level.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub level: usize,
    /// Position in the level's own coordinates.
    pub level_pos: glam::Vec2,
    /// Keypoint in original-image coordinates.
    pub kp: Keypoint,
}

/// Grid-based non-maximum suppression across all pyramid levels:
/// strongest-first occupancy of coarse cells, capped at `max_keypoints`.
pub(crate) fn grid_nms(mut candidates: Vec<Candidate>, max_keypoints: usize) -> Vec<Candidate> {
    if candidates.is_empty() {
        return candidates;
    }
    candidates.sort_by(|a, b| {
        b.kp
            .response
            .partial_cmp(&a.kp.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut occupied = std::collections::HashSet::new();
    let mut selected = Vec::new();
    for cand in candidates {
        let gx = (cand.kp.pos.x / NMS_RADIUS) as i32;
        let gy = (cand.kp.pos.y / NMS_RADIUS) as i32;
        let mut free = true;
        'outer: for dy in -1..=1 {
            for dx in -1..=1 {
                if occupied.contains(&(gx + dx, gy + dy)) {
                    free = false;
                    break 'outer;
                }
            }
        }
        if free {
            occupied.insert((gx, gy));
            selected.push(cand);
            if selected.len() >= max_keypoints {
                break;
            }
        }
    }
    selected
}

/// Pyramid FAST detection + orientation assignment shared by both detectors.
pub(crate) fn detect_candidates(pyramid: &[(GrayImage, f32)], threshold: u8) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (level, (level_img, scale)) in pyramid.iter().enumerate() {
        for corner in detect_fast(level_img, threshold) {
            let angle =
                intensity_centroid_angle(level_img, corner.pos.x as u32, corner.pos.y as u32);
            candidates.push(Candidate {
                level,
                level_pos: corner.pos,
                kp: Keypoint {
                    pos: corner.pos * *scale,
                    scale: *scale,
                    angle,
                    response: corner.response,
                },
            });
        }
    }
    candidates
}

/// Orientation by intensity centroid over a disc around the keypoint.
pub(crate) fn intensity_centroid_angle(img: &GrayImage, x: u32, y: u32) -> f32 {
    let radius = 15i32;
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0
                && py >= 0
                && (px as u32) < img.width()
                && (py as u32) < img.height()
                && dx * dx + dy * dy <= radius * radius
            {
                let v = img.get_pixel(px as u32, py as u32)[0] as f32;
                m01 += v * dy as f32;
                m10 += v * dx as f32;
            }
        }
    }
    m01.atan2(m10)
}

/// Bilinear sample with clamping at the image border.
pub(crate) fn bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x0 = x.floor();
    let y0 = y.floor();
    if x0 < 0.0 || y0 < 0.0 || x0 + 1.0 >= w || y0 + 1.0 >= h {
        let cx = x.round().clamp(0.0, w - 1.0) as u32;
        let cy = y.round().clamp(0.0, h - 1.0) as u32;
        return img.get_pixel(cx, cy)[0] as f32;
    }
    let dx = x - x0;
    let dy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let p00 = img.get_pixel(x0, y0)[0] as f32;
    let p10 = img.get_pixel(x0 + 1, y0)[0] as f32;
    let p01 = img.get_pixel(x0, y0 + 1)[0] as f32;
    let p11 = img.get_pixel(x0 + 1, y0 + 1)[0] as f32;
    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;
    top * (1.0 - dy) + bottom * dy
}
