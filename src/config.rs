use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Feature detection strategy, chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// High-recall float-descriptor detector (gradient orientation histograms).
    Gradient,
    /// Binary rotated-BRIEF fallback with the same interface contract.
    Binary,
}

/// Tunable parameters of the registration pipeline. Every threshold the
/// pipeline consults lives here; the CLI exposes each as a flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub detector: DetectorKind,
    /// Keypoint yield cap across all pyramid octaves.
    pub max_features: usize,
    /// FAST intensity threshold. Kept low so weakly textured thermal frames
    /// still produce corners.
    pub contrast_threshold: u8,
    /// Minimum keypoints per image before matching is attempted.
    pub min_keypoints: usize,
    /// Lowe ratio-test factor for the float descriptor path.
    pub ratio_test: f32,
    /// Fraction of cross-checked matches kept on the binary path.
    pub keep_best_fraction: f32,
    /// Minimum good matches after filtering.
    pub min_good_matches: usize,
    /// Attempt estimation below `min_good_matches`, forcing the result to
    /// low confidence. Off by default.
    pub allow_sparse_matches: bool,
    /// RANSAC reprojection-error inlier threshold in pixels.
    pub ransac_reproj_threshold: f64,
    pub ransac_max_iters: usize,
    /// Target probability that the returned model is outlier free.
    pub ransac_confidence: f64,
    pub ransac_seed: u64,
    /// Inlier ratio below which a fitted model is flagged low confidence.
    pub inlier_ratio_gate: f64,
    /// Use low-confidence transforms for label transfer. Off by default: a
    /// matrix that failed the gate is kept out of both the aggregate and the
    /// transferred labels.
    pub transfer_low_confidence: bool,
    /// Correspondence lines drawn in the match visualization.
    pub max_drawn_matches: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        RegistrationConfig {
            detector: DetectorKind::Gradient,
            max_features: 10_000,
            contrast_threshold: 10,
            min_keypoints: 4,
            ratio_test: 0.7,
            keep_best_fraction: 0.3,
            min_good_matches: 20,
            allow_sparse_matches: false,
            ransac_reproj_threshold: 3.0,
            ransac_max_iters: 5000,
            ransac_confidence: 0.995,
            ransac_seed: 42,
            inlier_ratio_gate: 0.3,
            transfer_low_confidence: false,
            max_drawn_matches: 50,
        }
    }
}
