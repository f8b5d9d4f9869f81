use std::path::Path;

use glam::Vec2;
use image::{GrayImage, Rgb};
use indicatif::ParallelProgressIterator;
use nalgebra as na;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::RegistrationConfig;
use crate::data_loader::{FramePair, load_image};
use crate::features::{FeatureDetector, build_detector, preprocess};
use crate::homography::estimate_homography;
use crate::labels;
use crate::matching::match_features;
use crate::types::{
    FeatureMatch, FeatureSet, Homography, Quality, RegistrationError, RegistrationResult,
};
use crate::visualization;

const MAX_FAILED_EXAMPLES: usize = 20;

/// Everything produced while registering one pair, kept around so callers can
/// render diagnostics without re-running detection.
pub struct PairRegistration {
    pub result: RegistrationResult,
    pub matches: Vec<FeatureMatch>,
    pub inlier_mask: Vec<bool>,
    pub source_features: FeatureSet,
    pub target_features: FeatureSet,
}

/// Registers one preprocessed pair: detect on both images, filter matches,
/// fit the transform, grade the fit against the inlier-ratio gate.
///
/// With too few good matches the pair fails as
/// [`RegistrationError::MatchInsufficient`] unless sparse matching is allowed,
/// in which case estimation proceeds but the result is forced to
/// [`Quality::LowConfidence`].
pub fn register_pair(
    source: &GrayImage,
    target: &GrayImage,
    detector: &dyn FeatureDetector,
    config: &RegistrationConfig,
) -> Result<PairRegistration, RegistrationError> {
    let source_features = detector.detect(source);
    let target_features = detector.detect(target);
    log::debug!(
        "detected {} source / {} target keypoints",
        source_features.len(),
        target_features.len()
    );

    let matches = match_features(&source_features, &target_features, config)?;

    let sparse = matches.len() < config.min_good_matches;
    if sparse && !config.allow_sparse_matches {
        return Err(RegistrationError::MatchInsufficient {
            found: matches.len(),
            required: config.min_good_matches,
        });
    }

    let src_pts: Vec<Vec2> = matches
        .iter()
        .map(|m| source_features.keypoints[m.source_idx].pos)
        .collect();
    let dst_pts: Vec<Vec2> = matches
        .iter()
        .map(|m| target_features.keypoints[m.target_idx].pos)
        .collect();
    let report = estimate_homography(&src_pts, &dst_pts, config)?;

    let inlier_ratio = report.inliers as f64 / matches.len() as f64;
    let quality = if sparse || inlier_ratio < config.inlier_ratio_gate {
        Quality::LowConfidence
    } else {
        Quality::Accepted
    };

    Ok(PairRegistration {
        result: RegistrationResult {
            homography: report.homography,
            inliers: report.inliers,
            good_matches: matches.len(),
            inlier_ratio,
            quality,
        },
        matches,
        inlier_mask: report.inlier_mask,
        source_features,
        target_features,
    })
}

/// Per-frame line item for the machine-readable summary.
#[derive(Debug, Clone, Serialize)]
pub struct PairStat {
    pub frame_id: String,
    pub good_matches: usize,
    pub inliers: usize,
    pub inlier_ratio: f64,
    pub accepted: bool,
}

/// Aggregate counts over one batch run. Pair-level failures are bucketed by
/// error kind; the run itself only fails on an empty batch or an unwritable
/// output directory.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    /// Thresholds the run was executed with, kept alongside the outcomes so a
    /// report is reproducible on its own.
    pub config: RegistrationConfig,
    pub attempted: usize,
    pub accepted: usize,
    pub low_confidence: usize,
    pub missing_input: usize,
    pub feature_insufficient: usize,
    pub match_insufficient: usize,
    pub estimation_failed: usize,
    pub other_failures: usize,
    /// Frame ids of failed pairs, capped to a handful of examples.
    pub failed_frames: Vec<String>,
    pub pair_stats: Vec<PairStat>,
    /// Mean inlier ratio over accepted pairs only.
    pub mean_inlier_ratio: Option<f64>,
}

pub struct BatchOutput {
    pub summary: RunSummary,
    /// Elementwise mean of the accepted transforms. `None` when no pair was
    /// accepted; never substituted with identity.
    pub mean_homography: Option<Homography>,
}

fn artifact_path(output_dir: &Path, frame_id: &str, suffix: &str) -> std::path::PathBuf {
    output_dir.join(format!("{frame_id}{suffix}"))
}

/// Runs the full per-frame pipeline and writes its diagnostic artifacts.
fn process_pair(
    pair: &FramePair,
    detector: &dyn FeatureDetector,
    config: &RegistrationConfig,
    output_dir: &Path,
) -> Result<RegistrationResult, RegistrationError> {
    let source_img = load_image(&pair.source_path)?;
    let target_img = load_image(&pair.target_path)?;
    let source = preprocess(&source_img);
    let target = preprocess(&target_img);

    let reg = register_pair(&source, &target, detector, config)?;

    let match_img = visualization::draw_matches(
        &source,
        &target,
        &reg.source_features.keypoints,
        &reg.target_features.keypoints,
        &reg.matches,
        config.max_drawn_matches,
    );
    match_img.save(artifact_path(output_dir, &pair.frame_id, "_matches.png"))?;

    if let Some(warped) =
        visualization::warp_perspective(&source, &reg.result.homography, target.dimensions())
    {
        warped.save(artifact_path(output_dir, &pair.frame_id, "_warped.png"))?;
    }

    let transfer = reg.result.quality == Quality::Accepted || config.transfer_low_confidence;
    if transfer && let Some(label_path) = &pair.label_path {
        match labels::load_labels(label_path) {
            Ok(boxes) => {
                let transformed = labels::transform_labels(
                    &reg.result.homography,
                    &boxes,
                    source.dimensions(),
                    target.dimensions(),
                );
                labels::save_labels(
                    &artifact_path(output_dir, &pair.frame_id, "_registered.txt"),
                    &transformed,
                )?;

                // Both overlays go on the target frame: untransformed boxes
                // show the misalignment, transferred boxes the correction.
                let target_rgb = target_img.to_rgb8();
                let before =
                    visualization::draw_box_overlay(&target_rgb, &boxes, Rgb([255, 0, 0]));
                before.save(artifact_path(output_dir, &pair.frame_id, "_before.png"))?;
                let after =
                    visualization::draw_box_overlay(&target_rgb, &transformed, Rgb([0, 255, 0]));
                after.save(artifact_path(output_dir, &pair.frame_id, "_after.png"))?;
            }
            Err(RegistrationError::MissingInput(p)) => {
                log::debug!("{}: no label file ({p})", pair.frame_id);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(reg.result)
}

/// Processes every frame pair in parallel, writes per-frame artifacts into
/// `output_dir`, and folds the outcomes into a [`BatchOutput`].
///
/// A failed pair never aborts the batch; its error is counted and the next
/// pair proceeds.
pub fn run_batch(
    pairs: &[FramePair],
    config: &RegistrationConfig,
    output_dir: &Path,
) -> Result<BatchOutput, RegistrationError> {
    if pairs.is_empty() {
        return Err(RegistrationError::EmptyBatch);
    }
    std::fs::create_dir_all(output_dir)?;
    let detector = build_detector(config);

    let outcomes: Vec<(String, Result<RegistrationResult, RegistrationError>)> = pairs
        .par_iter()
        .progress_count(pairs.len() as u64)
        .map(|pair| {
            let outcome = process_pair(pair, detector.as_ref(), config, output_dir);
            if let Err(e) = &outcome {
                log::warn!("{}: {e}", pair.frame_id);
            }
            (pair.frame_id.clone(), outcome)
        })
        .collect();

    let mut summary = RunSummary {
        config: config.clone(),
        attempted: pairs.len(),
        ..Default::default()
    };
    let mut h_sum = na::Matrix3::<f64>::zeros();

    for (frame_id, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                let accepted = result.quality == Quality::Accepted;
                if accepted {
                    summary.accepted += 1;
                    h_sum += result.homography;
                } else {
                    summary.low_confidence += 1;
                }
                summary.pair_stats.push(PairStat {
                    frame_id,
                    good_matches: result.good_matches,
                    inliers: result.inliers,
                    inlier_ratio: result.inlier_ratio,
                    accepted,
                });
            }
            Err(e) => {
                match e {
                    RegistrationError::MissingInput(_) => summary.missing_input += 1,
                    RegistrationError::FeatureInsufficient { .. } => {
                        summary.feature_insufficient += 1
                    }
                    RegistrationError::MatchInsufficient { .. } => {
                        summary.match_insufficient += 1
                    }
                    RegistrationError::EstimationFailed(_) => summary.estimation_failed += 1,
                    _ => summary.other_failures += 1,
                }
                if summary.failed_frames.len() < MAX_FAILED_EXAMPLES {
                    summary.failed_frames.push(frame_id);
                }
            }
        }
    }

    let mean_homography = if summary.accepted > 0 {
        summary.mean_inlier_ratio = Some(
            summary
                .pair_stats
                .iter()
                .filter(|s| s.accepted)
                .map(|s| s.inlier_ratio)
                .sum::<f64>()
                / summary.accepted as f64,
        );
        Some(h_sum / summary.accepted as f64)
    } else {
        None
    };

    Ok(BatchOutput {
        summary,
        mean_homography,
    })
}
