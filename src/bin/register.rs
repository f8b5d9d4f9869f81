use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use cross_modal_registration::config::{DetectorKind, RegistrationConfig};
use cross_modal_registration::data_loader::discover_pairs;
use cross_modal_registration::driver::run_batch;
use cross_modal_registration::io::{
    write_homography_json, write_summary_json, write_summary_report,
};
use cross_modal_registration::types::RegistrationError;

#[derive(Parser)]
#[command(version, about, author)]
struct XmregCli {
    /// path to the source-modality image folder
    source_dir: PathBuf,

    /// path to the target-modality image folder
    target_dir: PathBuf,

    /// path to the YOLO label folder for the source images
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, default_value = "registration_output")]
    output: PathBuf,

    /// filename suffix of source-modality frames
    #[arg(long, default_value = "_v")]
    source_suffix: String,

    /// filename suffix of target-modality frames
    #[arg(long, default_value = "_th")]
    target_suffix: String,

    #[arg(long, value_enum, default_value = "gradient")]
    detector: DetectorKind,

    /// process only the first N pairs
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, default_value_t = 10_000)]
    max_features: usize,

    /// FAST intensity threshold for corner detection
    #[arg(long, default_value_t = 10)]
    contrast_threshold: u8,

    /// minimum keypoints per image before matching is attempted
    #[arg(long, default_value_t = 4)]
    min_keypoints: usize,

    #[arg(long, default_value_t = 0.7)]
    ratio_test: f32,

    /// fraction of cross-checked matches kept on the binary path
    #[arg(long, default_value_t = 0.3)]
    keep_best_fraction: f32,

    #[arg(long, default_value_t = 20)]
    min_matches: usize,

    /// attempt estimation below --min-matches, forcing low confidence
    #[arg(long, action)]
    allow_sparse_matches: bool,

    /// RANSAC inlier threshold in pixels
    #[arg(long, default_value_t = 3.0)]
    reproj_threshold: f64,

    #[arg(long, default_value_t = 5000)]
    max_iters: usize,

    /// target probability that the fitted model is outlier free
    #[arg(long, default_value_t = 0.995)]
    confidence: f64,

    /// inlier ratio below which a pair is graded low confidence
    #[arg(long, default_value_t = 0.3)]
    inlier_gate: f64,

    /// correspondence lines drawn in the match visualization
    #[arg(long, default_value_t = 50)]
    max_drawn_matches: usize,

    /// use low-confidence transforms for label transfer
    #[arg(long, action)]
    transfer_low_confidence: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<(), RegistrationError> {
    env_logger::init();
    let cli = XmregCli::parse();

    let config = RegistrationConfig {
        detector: cli.detector,
        max_features: cli.max_features,
        contrast_threshold: cli.contrast_threshold,
        min_keypoints: cli.min_keypoints,
        ratio_test: cli.ratio_test,
        keep_best_fraction: cli.keep_best_fraction,
        min_good_matches: cli.min_matches,
        allow_sparse_matches: cli.allow_sparse_matches,
        ransac_reproj_threshold: cli.reproj_threshold,
        ransac_max_iters: cli.max_iters,
        ransac_confidence: cli.confidence,
        ransac_seed: cli.seed,
        inlier_ratio_gate: cli.inlier_gate,
        transfer_low_confidence: cli.transfer_low_confidence,
        max_drawn_matches: cli.max_drawn_matches,
    };

    let mut pairs = discover_pairs(
        &cli.source_dir,
        &cli.target_dir,
        cli.labels.as_deref(),
        &cli.source_suffix,
        &cli.target_suffix,
    )?;
    if let Some(limit) = cli.limit {
        pairs.truncate(limit);
    }
    println!("found {} frame pairs", pairs.len());

    let now = Instant::now();
    let output = run_batch(&pairs, &config, &cli.output)?;
    let duration_sec = now.elapsed().as_secs_f64();
    println!("registration took {:.6} sec", duration_sec);
    println!("avg: {} sec", duration_sec / pairs.len() as f64);

    let summary = &output.summary;
    println!(
        "accepted {}/{} pairs ({} low confidence, {} failed)",
        summary.accepted,
        summary.attempted,
        summary.low_confidence,
        summary.attempted - summary.accepted - summary.low_confidence,
    );

    write_summary_report(&cli.output.join("report.txt"), summary)?;
    write_summary_json(&cli.output.join("report.json"), summary)?;

    match output.mean_homography {
        Some(h) => {
            write_homography_json(&cli.output.join("homography_matrix.json"), &h)?;
            Ok(())
        }
        None => Err(RegistrationError::EstimationFailed(
            "no pair passed the inlier-ratio gate; no aggregate homography".to_string(),
        )),
    }
}
