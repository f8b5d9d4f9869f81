use cross_modal_registration::driver::{PairStat, RunSummary};
use cross_modal_registration::io::{
    read_homography_json, write_homography_json, write_summary_json, write_summary_report,
};
use nalgebra as na;
use tempfile::TempDir;

#[test]
fn test_homography_json_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("homography_matrix.json");
    let h = na::Matrix3::new(1.02, -0.15, 24.5, 0.14, 0.99, -11.25, 1e-5, -2e-5, 1.0);

    write_homography_json(&path, &h).unwrap();
    let loaded = read_homography_json(&path).unwrap();
    assert!((h - loaded).abs().max() < 1e-12);
}

#[test]
fn test_read_rejects_wrong_shape() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.json");
    std::fs::write(
        &path,
        r#"{"rows": 2, "cols": 3, "data": [1,0,0,0,1,0,0,0,1]}"#,
    )
    .unwrap();
    assert!(read_homography_json(&path).is_err());
}

fn sample_summary() -> RunSummary {
    RunSummary {
        attempted: 4,
        accepted: 2,
        low_confidence: 1,
        missing_input: 1,
        failed_frames: vec!["0004".to_string()],
        pair_stats: vec![
            PairStat {
                frame_id: "0001".to_string(),
                good_matches: 120,
                inliers: 96,
                inlier_ratio: 0.8,
                accepted: true,
            },
            PairStat {
                frame_id: "0002".to_string(),
                good_matches: 80,
                inliers: 48,
                inlier_ratio: 0.6,
                accepted: true,
            },
        ],
        mean_inlier_ratio: Some(0.7),
        ..Default::default()
    }
}

#[test]
fn test_summary_report_contents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("report.txt");
    write_summary_report(&path, &sample_summary()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("Frame pairs attempted: 4"));
    assert!(text.contains("low confidence:       1"));
    assert!(text.contains("0.7000"));
    assert!(text.contains("0004"));
}

#[test]
fn test_summary_json_is_parseable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("report.json");
    write_summary_json(&path, &sample_summary()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["attempted"], 4);
    assert_eq!(value["pair_stats"][0]["frame_id"], "0001");
}
