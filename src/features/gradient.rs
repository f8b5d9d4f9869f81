use image::GrayImage;
use rayon::prelude::*;

use super::{
    FeatureDetector, PYRAMID_LEVELS, PYRAMID_SCALE_FACTOR, bilinear, build_pyramid, Candidate,
    detect_candidates, grid_nms,
};
use crate::types::{DescriptorSet, FeatureSet};

/// Dimensionality of the gradient-histogram descriptor: 4x4 spatial cells of
/// 8 orientation bins each.
pub const DESCRIPTOR_DIM: usize = 128;

const GRID_CELLS: usize = 4;
const ORIENTATION_BINS: usize = 8;
const SAMPLES_PER_AXIS: usize = 16;
const CLAMP: f32 = 0.2;

/// Primary detector: pyramid FAST corners with a rotation-normalized
/// gradient-orientation-histogram descriptor. Configured for high keypoint
/// yield to compensate for the low similarity between visual and thermal
/// imagery.
pub struct GradientDetector {
    max_features: usize,
    fast_threshold: u8,
}

impl GradientDetector {
    pub fn new(max_features: usize, fast_threshold: u8) -> Self {
        GradientDetector {
            max_features,
            fast_threshold,
        }
    }

    /// Gradient histogram sampled over a 16x16 grid in the keypoint's rotated
    /// frame, binned into 4x4 spatial cells of 8 orientation bins. Samples are
    /// Gaussian-weighted by distance from the keypoint and soft-assigned to
    /// the two nearest orientation bins and four surrounding cells, so small
    /// orientation or localization errors shift weight instead of flipping a
    /// whole bin.
    fn describe(&self, img: &GrayImage, cand: &Candidate) -> [f32; DESCRIPTOR_DIM] {
        let (sin_a, cos_a) = cand.kp.angle.sin_cos();
        let cx = cand.level_pos.x;
        let cy = cand.level_pos.y;
        let mut hist = [0.0f32; DESCRIPTOR_DIM];
        let half = SAMPLES_PER_AXIS as f32 / 2.0 - 0.5;
        let sigma = SAMPLES_PER_AXIS as f32 / 2.0;
        let cell_span = SAMPLES_PER_AXIS as f32 / GRID_CELLS as f32;

        for j in 0..SAMPLES_PER_AXIS {
            for i in 0..SAMPLES_PER_AXIS {
                let u = i as f32 - half;
                let v = j as f32 - half;
                let rx = cx + cos_a * u - sin_a * v;
                let ry = cy + sin_a * u + cos_a * v;
                // Derivatives along the rotated axes, so the orientation bin is
                // already relative to the keypoint frame.
                let du = bilinear(img, rx + cos_a, ry + sin_a) - bilinear(img, rx - cos_a, ry - sin_a);
                let dv = bilinear(img, rx - sin_a, ry + cos_a) - bilinear(img, rx + sin_a, ry - cos_a);
                let mag = (du * du + dv * dv).sqrt();
                if mag <= f32::EPSILON {
                    continue;
                }
                let weight = (-(u * u + v * v) / (2.0 * sigma * sigma)).exp();
                let theta = dv.atan2(du);

                let fbin = (theta + std::f32::consts::PI) / (2.0 * std::f32::consts::PI)
                    * ORIENTATION_BINS as f32;
                let ob = fbin.floor();
                let wo = fbin - ob;
                let ob = ob as usize;

                let fcx = (i as f32 + 0.5) / cell_span - 0.5;
                let fcy = (j as f32 + 0.5) / cell_span - 0.5;
                let wx = fcx - fcx.floor();
                let wy = fcy - fcy.floor();
                let cx0 = fcx.floor() as i32;
                let cy0 = fcy.floor() as i32;

                for (dcy, wyk) in [(0i32, 1.0 - wy), (1, wy)] {
                    let cell_y = cy0 + dcy;
                    if cell_y < 0 || cell_y >= GRID_CELLS as i32 {
                        continue;
                    }
                    for (dcx, wxk) in [(0i32, 1.0 - wx), (1, wx)] {
                        let cell_x = cx0 + dcx;
                        if cell_x < 0 || cell_x >= GRID_CELLS as i32 {
                            continue;
                        }
                        let base = (cell_y as usize * GRID_CELLS + cell_x as usize)
                            * ORIENTATION_BINS;
                        let w = mag * weight * wxk * wyk;
                        hist[base + ob % ORIENTATION_BINS] += w * (1.0 - wo);
                        hist[base + (ob + 1) % ORIENTATION_BINS] += w * wo;
                    }
                }
            }
        }

        // L2-normalize, clamp dominant bins, renormalize.
        let norm = hist.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in hist.iter_mut() {
                *x = (*x / norm).min(CLAMP);
            }
            let norm2 = hist.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm2 > f32::EPSILON {
                for x in hist.iter_mut() {
                    *x /= norm2;
                }
            }
        }
        hist
    }
}

impl FeatureDetector for GradientDetector {
    fn detect(&self, img: &GrayImage) -> FeatureSet {
        let pyramid = build_pyramid(img, PYRAMID_LEVELS, PYRAMID_SCALE_FACTOR);
        let candidates = detect_candidates(&pyramid, self.fast_threshold);
        let candidates = grid_nms(candidates, self.max_features);
        if candidates.is_empty() {
            return FeatureSet::empty_float(DESCRIPTOR_DIM);
        }

        let descriptors: Vec<[f32; DESCRIPTOR_DIM]> = candidates
            .par_iter()
            .map(|cand| self.describe(&pyramid[cand.level].0, cand))
            .collect();

        let mut data = Vec::with_capacity(descriptors.len() * DESCRIPTOR_DIM);
        for d in &descriptors {
            data.extend_from_slice(d);
        }
        FeatureSet {
            keypoints: candidates.iter().map(|c| c.kp).collect(),
            descriptors: DescriptorSet::Float {
                dim: DESCRIPTOR_DIM,
                data,
            },
        }
    }
}
