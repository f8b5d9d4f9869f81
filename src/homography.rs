use glam::Vec2;
use nalgebra as na;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::config::RegistrationConfig;
use crate::types::{Homography, RegistrationError};

const MIN_SAMPLE: usize = 4;
const COLLINEAR_EPS: f64 = 1e-6;

/// RANSAC output: the fitted matrix plus the per-correspondence inlier mask.
#[derive(Debug, Clone)]
pub struct RansacReport {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub inliers: usize,
}

/// Hartley normalization: translate to the centroid and scale so the mean
/// distance from it is sqrt(2). Returns the normalized points and the
/// similarity transform that produced them.
fn normalize_points(pts: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, na::Matrix3<f64>)> {
    let n = pts.len() as f64;
    let mx = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.0 - mx).powi(2) + (p.1 - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = na::Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0);
    let out = pts.iter().map(|p| (s * (p.0 - mx), s * (p.1 - my))).collect();
    Some((out, t))
}

/// Direct linear transform on >=4 correspondences, with Hartley normalization
/// on both sides. Returns `None` for degenerate configurations.
fn dlt(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
    debug_assert_eq!(src.len(), dst.len());
    if src.len() < MIN_SAMPLE {
        return None;
    }
    let (ns, t1) = normalize_points(src)?;
    let (nd, t2) = normalize_points(dst)?;

    let n = ns.len();
    let mut a = na::DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (x, y) = ns[i];
        let (u, v) = nd[i];
        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Null space of A via the eigenvector of A^T A with the smallest
    // eigenvalue. A thin SVD of the 2n x 9 system does not expose the null
    // vector when 2n < 9, so the 9x9 normal matrix is decomposed instead.
    let ata = a.transpose() * &a;
    let eig = ata.symmetric_eigen();
    let mut min_idx = 0;
    for i in 1..eig.eigenvalues.len() {
        if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let hvec = eig.eigenvectors.column(min_idx);
    let h_norm = na::Matrix3::new(
        hvec[0], hvec[1], hvec[2], hvec[3], hvec[4], hvec[5], hvec[6], hvec[7], hvec[8],
    );

    let t2_inv = t2.try_inverse()?;
    let h = t2_inv * h_norm * t1;
    if h[(2, 2)].abs() <= 1e-12 {
        return None;
    }
    Some(h / h[(2, 2)])
}

/// Squared reprojection error of one correspondence under `h`.
fn reproj_error_sq(h: &Homography, src: (f64, f64), dst: (f64, f64)) -> f64 {
    let p = h * na::Vector3::new(src.0, src.1, 1.0);
    if p[2].abs() <= 1e-12 {
        return f64::INFINITY;
    }
    let dx = p[0] / p[2] - dst.0;
    let dy = p[1] / p[2] - dst.1;
    dx * dx + dy * dy
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    ((b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)).abs()
}

/// A 4-point sample is degenerate when any 3 of its points are collinear.
fn sample_degenerate(pts: &[(f64, f64)]) -> bool {
    for i in 0..pts.len() {
        for j in i + 1..pts.len() {
            for k in j + 1..pts.len() {
                if triangle_area(pts[i], pts[j], pts[k]) < COLLINEAR_EPS {
                    return true;
                }
            }
        }
    }
    false
}

fn count_inliers(
    h: &Homography,
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    thr_sq: f64,
) -> (Vec<bool>, usize) {
    let mut mask = vec![false; src.len()];
    let mut count = 0usize;
    for i in 0..src.len() {
        if reproj_error_sq(h, src[i], dst[i]) <= thr_sq {
            mask[i] = true;
            count += 1;
        }
    }
    (mask, count)
}

/// Robust projective-transform fit: RANSAC over 4-point minimal samples with a
/// reprojection-error inlier test, adaptive early termination at the
/// configured confidence, and a final refit on the full inlier set.
///
/// Sampling is seeded from `config.ransac_seed`, so a batch run is
/// reproducible.
pub fn estimate_homography(
    src: &[Vec2],
    dst: &[Vec2],
    config: &RegistrationConfig,
) -> Result<RansacReport, RegistrationError> {
    if src.len() != dst.len() {
        return Err(RegistrationError::EstimationFailed(format!(
            "point count mismatch: {} vs {}",
            src.len(),
            dst.len()
        )));
    }
    if src.len() < MIN_SAMPLE {
        return Err(RegistrationError::EstimationFailed(format!(
            "need at least {MIN_SAMPLE} correspondences, got {}",
            src.len()
        )));
    }

    let src: Vec<(f64, f64)> = src.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let dst: Vec<(f64, f64)> = dst.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let n = src.len();
    let thr_sq = config.ransac_reproj_threshold * config.ransac_reproj_threshold;

    let mut rng = ChaCha8Rng::seed_from_u64(config.ransac_seed);
    let mut indices: Vec<usize> = (0..n).collect();

    let mut best_h: Option<Homography> = None;
    let mut best_mask = vec![false; n];
    let mut best_count = 0usize;
    let mut max_iters = config.ransac_max_iters;
    let mut iter = 0usize;

    while iter < max_iters {
        iter += 1;
        indices.shuffle(&mut rng);
        let sample_src: Vec<(f64, f64)> = indices[..MIN_SAMPLE].iter().map(|&i| src[i]).collect();
        let sample_dst: Vec<(f64, f64)> = indices[..MIN_SAMPLE].iter().map(|&i| dst[i]).collect();
        if sample_degenerate(&sample_src) || sample_degenerate(&sample_dst) {
            continue;
        }
        let Some(h) = dlt(&sample_src, &sample_dst) else {
            continue;
        };
        let (mask, count) = count_inliers(&h, &src, &dst, thr_sq);
        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_h = Some(h);

            // Shrink the iteration budget once a strong consensus shows up.
            let w = count as f64 / n as f64;
            if w >= 1.0 {
                break;
            }
            let denom = (1.0 - w.powi(MIN_SAMPLE as i32)).ln();
            if denom < 0.0 {
                let needed = ((1.0 - config.ransac_confidence).ln() / denom).ceil() as usize;
                max_iters = max_iters.min(needed.max(iter));
            }
        }
    }

    let Some(mut h) = best_h else {
        return Err(RegistrationError::EstimationFailed(
            "no consensus model found".to_string(),
        ));
    };
    if best_count < MIN_SAMPLE {
        return Err(RegistrationError::EstimationFailed(format!(
            "consensus set too small: {best_count} inliers"
        )));
    }

    // Refit on all inliers of the best model.
    let in_src: Vec<(f64, f64)> = src
        .iter()
        .zip(best_mask.iter())
        .filter_map(|(p, &m)| m.then_some(*p))
        .collect();
    let in_dst: Vec<(f64, f64)> = dst
        .iter()
        .zip(best_mask.iter())
        .filter_map(|(p, &m)| m.then_some(*p))
        .collect();
    if let Some(refined) = dlt(&in_src, &in_dst) {
        let (mask, count) = count_inliers(&refined, &src, &dst, thr_sq);
        if count >= best_count {
            h = refined;
            best_mask = mask;
            best_count = count;
        }
    }

    log::debug!(
        "homography: {best_count}/{n} inliers after {iter} iterations",
    );
    Ok(RansacReport {
        homography: h,
        inlier_mask: best_mask,
        inliers: best_count,
    })
}
