use cross_modal_registration::config::RegistrationConfig;
use cross_modal_registration::data_loader::discover_pairs;
use cross_modal_registration::driver::{register_pair, run_batch};
use cross_modal_registration::features::build_detector;
use cross_modal_registration::types::{Quality, RegistrationError};
use cross_modal_registration::visualization::warp_perspective;
use image::imageops::{self, FilterType};
use image::GrayImage;
use nalgebra as na;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

/// Band-limited random texture: two octaves of low-resolution noise upsampled
/// with a smooth filter. Densely corner-rich, every neighborhood distinct, and
/// smooth enough to survive warp resampling.
fn corner_scene(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut coarse = GrayImage::new(width / 16, height / 16);
    for p in coarse.pixels_mut() {
        p.0 = [rng.random()];
    }
    let mut fine = GrayImage::new(width / 4, height / 4);
    for p in fine.pixels_mut() {
        p.0 = [rng.random()];
    }
    let coarse = imageops::resize(&coarse, width, height, FilterType::CatmullRom);
    let fine = imageops::resize(&fine, width, height, FilterType::CatmullRom);

    let mut img = GrayImage::new(width, height);
    for (x, y, p) in img.enumerate_pixels_mut() {
        let v = 0.65 * coarse.get_pixel(x, y)[0] as f32 + 0.35 * fine.get_pixel(x, y)[0] as f32;
        p.0 = [v.round().clamp(0.0, 255.0) as u8];
    }
    img
}

/// Rotation by `angle_deg` and uniform `scale` about the image center.
fn center_transform(angle_deg: f64, scale: f64, w: u32, h: u32) -> na::Matrix3<f64> {
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (s, c) = angle_deg.to_radians().sin_cos();
    let (a, b) = (scale * c, scale * s);
    na::Matrix3::new(
        a,
        -b,
        cx - a * cx + b * cy,
        b,
        a,
        cy - b * cx - a * cy,
        0.0,
        0.0,
        1.0,
    )
}

fn project(h: &na::Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = h * na::Vector3::new(x, y, 1.0);
    (p[0] / p[2], p[1] / p[2])
}

#[test]
fn test_self_registration_is_identity() {
    let img = corner_scene(640, 480, 21);
    let config = RegistrationConfig::default();
    let detector = build_detector(&config);

    let reg = register_pair(&img, &img, detector.as_ref(), &config).unwrap();
    assert_eq!(reg.result.quality, Quality::Accepted);
    assert!(reg.result.inlier_ratio > 0.9, "ratio {}", reg.result.inlier_ratio);

    // Interior points must map (almost) onto themselves.
    for &(x, y) in &[(100.0, 100.0), (320.0, 240.0), (540.0, 380.0)] {
        let (px, py) = project(&reg.result.homography, x, y);
        assert!((px - x).abs() < 1.0 && (py - y).abs() < 1.0);
    }
}

#[test]
fn test_rotation_scale_recovery() {
    // 640x480 pair related by a 10 degree rotation and 5% scale change.
    let source = corner_scene(640, 480, 22);
    let h_true = center_transform(10.0, 1.05, 640, 480);
    let target = warp_perspective(&source, &h_true, (640, 480)).unwrap();

    let config = RegistrationConfig::default();
    let detector = build_detector(&config);
    let reg = register_pair(&source, &target, detector.as_ref(), &config).unwrap();

    assert!(
        reg.result.good_matches >= 150,
        "only {} good matches",
        reg.result.good_matches
    );
    assert!(
        reg.result.inlier_ratio >= 0.9,
        "inlier ratio {}",
        reg.result.inlier_ratio
    );
    for &(x, y) in &[(160.0, 120.0), (320.0, 240.0), (480.0, 360.0), (200.0, 350.0)] {
        let (ex, ey) = project(&reg.result.homography, x, y);
        let (tx, ty) = project(&h_true, x, y);
        let err = ((ex - tx).powi(2) + (ey - ty).powi(2)).sqrt();
        assert!(err < 2.0, "reprojection error {err} px at ({x}, {y})");
    }
}

#[test]
fn test_match_insufficient_without_sparse_override() {
    let img = corner_scene(320, 240, 23);
    let config = RegistrationConfig {
        min_good_matches: 1_000_000,
        ..Default::default()
    };
    let detector = build_detector(&config);
    let result = register_pair(&img, &img, detector.as_ref(), &config);
    assert!(matches!(
        result,
        Err(RegistrationError::MatchInsufficient { .. })
    ));
}

#[test]
fn test_sparse_override_forces_low_confidence() {
    let img = corner_scene(320, 240, 23);
    let config = RegistrationConfig {
        min_good_matches: 1_000_000,
        allow_sparse_matches: true,
        ..Default::default()
    };
    let detector = build_detector(&config);
    let reg = register_pair(&img, &img, detector.as_ref(), &config).unwrap();
    assert_eq!(reg.result.quality, Quality::LowConfidence);
}

fn write_frame(dir: &std::path::Path, name: &str, img: &GrayImage) {
    img.save(dir.join(name)).unwrap();
}

#[test]
fn test_run_batch_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let source_dir = tmp.path().join("visual");
    let target_dir = tmp.path().join("thermal");
    let label_dir = tmp.path().join("labels");
    let output_dir = tmp.path().join("out");
    for d in [&source_dir, &target_dir, &label_dir] {
        std::fs::create_dir(d).unwrap();
    }

    // Two complete pairs plus one with a missing target image.
    for (i, seed) in [(1u32, 31u64), (2, 32)] {
        let img = corner_scene(320, 240, seed);
        write_frame(&source_dir, &format!("{i:04}_v.png"), &img);
        write_frame(&target_dir, &format!("{i:04}_th.png"), &img);
        std::fs::write(
            label_dir.join(format!("{i:04}_v.txt")),
            "0 0.5 0.5 0.2 0.2\n1 0.3 0.4 0.1 0.1\n",
        )
        .unwrap();
    }
    write_frame(&source_dir, "0003_v.png", &corner_scene(320, 240, 33));

    let pairs = discover_pairs(&source_dir, &target_dir, Some(&label_dir), "_v", "_th").unwrap();
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].frame_id, "0001");

    let config = RegistrationConfig::default();
    let output = run_batch(&pairs, &config, &output_dir).unwrap();
    let summary = &output.summary;

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.missing_input, 1);
    assert_eq!(summary.failed_frames, vec!["0003".to_string()]);
    assert!(summary.mean_inlier_ratio.unwrap() > 0.5);

    // Identity pairs: the aggregate transform stays near identity.
    let mean_h = output.mean_homography.unwrap();
    assert!((mean_h - na::Matrix3::identity()).abs().max() < 0.1);

    for i in 1..=2 {
        assert!(output_dir.join(format!("{i:04}_matches.png")).exists());
        assert!(output_dir.join(format!("{i:04}_warped.png")).exists());
        assert!(output_dir.join(format!("{i:04}_registered.txt")).exists());
        assert!(output_dir.join(format!("{i:04}_before.png")).exists());
        assert!(output_dir.join(format!("{i:04}_after.png")).exists());
    }
    assert!(!output_dir.join("0003_matches.png").exists());
}

#[test]
fn test_run_batch_empty() {
    let tmp = TempDir::new().unwrap();
    let config = RegistrationConfig::default();
    let result = run_batch(&[], &config, tmp.path());
    assert!(matches!(result, Err(RegistrationError::EmptyBatch)));
}
