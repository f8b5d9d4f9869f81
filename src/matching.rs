use rayon::prelude::*;

use crate::config::RegistrationConfig;
use crate::types::{DescriptorSet, FeatureMatch, FeatureSet, RegistrationError};

/// Filters raw descriptor correspondences down to "good" matches.
///
/// Float descriptors go through exact 2-nearest-neighbour search with the Lowe
/// ratio test; binary descriptors through Hamming distance with a strict
/// one-to-one cross-check, keeping only the best-scoring fraction. Matches are
/// returned sorted by ascending distance.
///
/// Requires at least `min_keypoints` per image; below that the pair is
/// reported feature-insufficient and downstream estimation is skipped.
pub fn match_features(
    source: &FeatureSet,
    target: &FeatureSet,
    config: &RegistrationConfig,
) -> Result<Vec<FeatureMatch>, RegistrationError> {
    if source.len() < config.min_keypoints || target.len() < config.min_keypoints {
        return Err(RegistrationError::FeatureInsufficient {
            source_count: source.len(),
            target_count: target.len(),
            required: config.min_keypoints,
        });
    }

    let mut matches = match (&source.descriptors, &target.descriptors) {
        (DescriptorSet::Float { .. }, DescriptorSet::Float { .. }) => {
            ratio_test_matches(source, target, config.ratio_test)
        }
        (DescriptorSet::Binary(a), DescriptorSet::Binary(b)) => {
            cross_check_matches(a, b, config.keep_best_fraction)
        }
        _ => {
            log::warn!("source and target descriptor kinds differ; no matches produced");
            Vec::new()
        }
    };

    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(matches)
}

fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// For each source descriptor find its two nearest targets; accept only when
/// the nearest is clearly better than the runner-up. Rejects ambiguous matches
/// where two target descriptors are nearly equidistant.
fn ratio_test_matches(source: &FeatureSet, target: &FeatureSet, ratio: f32) -> Vec<FeatureMatch> {
    let n_target = target.len();
    let ratio_sq = ratio * ratio;
    (0..source.len())
        .into_par_iter()
        .filter_map(|si| {
            let sd = source.descriptors.float_row(si);
            let mut best = f32::MAX;
            let mut second = f32::MAX;
            let mut best_idx = 0usize;
            for ti in 0..n_target {
                let d = l2_squared(sd, target.descriptors.float_row(ti));
                if d < best {
                    second = best;
                    best = d;
                    best_idx = ti;
                } else if d < second {
                    second = d;
                }
            }
            // Compared on squared distances: d1 < r * d2  <=>  d1^2 < r^2 * d2^2.
            if second > 0.0 && best < ratio_sq * second {
                Some(FeatureMatch {
                    source_idx: si,
                    target_idx: best_idx,
                    distance: best.sqrt(),
                })
            } else {
                None
            }
        })
        .collect()
}

fn hamming(a: &[u8; 32], b: &[u8; 32]) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

fn nearest_by_hamming(query: &[u8; 32], pool: &[[u8; 32]]) -> (usize, u32) {
    let mut best = u32::MAX;
    let mut best_idx = 0usize;
    for (i, d) in pool.iter().enumerate() {
        let dist = hamming(query, d);
        if dist < best {
            best = dist;
            best_idx = i;
        }
    }
    (best_idx, best)
}

/// Exact Hamming matching with a one-to-one cross-check; keeps only the
/// best-scoring `keep_fraction` of the surviving matches.
fn cross_check_matches(
    source: &[[u8; 32]],
    target: &[[u8; 32]],
    keep_fraction: f32,
) -> Vec<FeatureMatch> {
    let forward: Vec<(usize, u32)> = source
        .par_iter()
        .map(|d| nearest_by_hamming(d, target))
        .collect();
    let backward: Vec<usize> = target
        .par_iter()
        .map(|d| nearest_by_hamming(d, source).0)
        .collect();

    let mut matches: Vec<FeatureMatch> = forward
        .iter()
        .enumerate()
        .filter_map(|(si, &(ti, dist))| {
            if backward[ti] == si {
                Some(FeatureMatch {
                    source_idx: si,
                    target_idx: ti,
                    distance: dist as f32,
                })
            } else {
                None
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let keep = (matches.len() as f32 * keep_fraction) as usize;
    matches.truncate(keep.max(1).min(matches.len()));
    matches
}
