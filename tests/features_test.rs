use cross_modal_registration::config::{DetectorKind, RegistrationConfig};
use cross_modal_registration::features::{build_detector, preprocess};
use cross_modal_registration::types::DescriptorSet;
use image::{DynamicImage, GrayImage, Luma};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Reproducible random-blob image with plenty of corner-like structure.
fn textured_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = GrayImage::from_pixel(width, height, Luma([32]));
    for _ in 0..120 {
        let cx = rng.random_range(20..width - 20);
        let cy = rng.random_range(20..height - 20);
        let r = rng.random_range(4..14);
        let v: u8 = rng.random_range(96..=255);
        for y in cy.saturating_sub(r)..(cy + r).min(height) {
            for x in cx.saturating_sub(r)..(cx + r).min(width) {
                let dx = x as i32 - cx as i32;
                let dy = y as i32 - cy as i32;
                if dx * dx + dy * dy <= (r * r) as i32 {
                    img.put_pixel(x, y, Luma([v]));
                }
            }
        }
    }
    img
}

#[test]
fn test_flat_image_yields_no_features() {
    let img = GrayImage::from_pixel(320, 240, Luma([128]));
    let config = RegistrationConfig::default();

    for detector_kind in [DetectorKind::Gradient, DetectorKind::Binary] {
        let detector = build_detector(&RegistrationConfig {
            detector: detector_kind,
            ..config.clone()
        });
        let features = detector.detect(&img);
        assert!(features.is_empty(), "{detector_kind:?} found corners in a flat image");
        assert!(features.descriptors.is_empty());
    }
}

#[test]
fn test_textured_image_yields_features() {
    let img = textured_image(320, 240, 1);
    let config = RegistrationConfig::default();
    let detector = build_detector(&config);
    let features = detector.detect(&img);

    assert!(features.len() >= 50, "only {} keypoints", features.len());
    assert_eq!(features.descriptors.len(), features.keypoints.len());
    for k in &features.keypoints {
        assert!(k.pos.x >= 0.0 && k.pos.x < 320.0);
        assert!(k.pos.y >= 0.0 && k.pos.y < 240.0);
        assert!(k.scale >= 1.0);
    }
}

#[test]
fn test_gradient_descriptors_are_normalized() {
    let img = textured_image(320, 240, 2);
    let detector = build_detector(&RegistrationConfig::default());
    let features = detector.detect(&img);

    match &features.descriptors {
        DescriptorSet::Float { dim, .. } => {
            assert_eq!(*dim, 128);
            let mut unit_rows = 0;
            for i in 0..features.len() {
                let row = features.descriptors.float_row(i);
                let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
                // All-zero rows are allowed (no gradient signal at all);
                // everything else must be unit length.
                if norm > 0.0 {
                    assert!((norm - 1.0).abs() < 1e-3, "descriptor {i} has norm {norm}");
                    unit_rows += 1;
                }
                assert!(row.iter().all(|&v| v >= 0.0));
            }
            assert!(unit_rows > 0);
        }
        DescriptorSet::Binary(_) => panic!("gradient detector must emit float descriptors"),
    }
}

#[test]
fn test_binary_detector_emits_binary_descriptors() {
    let img = textured_image(320, 240, 3);
    let detector = build_detector(&RegistrationConfig {
        detector: DetectorKind::Binary,
        ..Default::default()
    });
    let features = detector.detect(&img);

    assert!(!features.is_empty());
    match &features.descriptors {
        DescriptorSet::Binary(descs) => assert_eq!(descs.len(), features.len()),
        DescriptorSet::Float { .. } => panic!("binary detector must emit binary descriptors"),
    }
}

#[test]
fn test_max_features_cap() {
    let img = textured_image(640, 480, 4);
    let detector = build_detector(&RegistrationConfig {
        max_features: 30,
        ..Default::default()
    });
    let features = detector.detect(&img);
    assert!(features.len() <= 30);
    assert!(!features.is_empty());
}

#[test]
fn test_preprocess_equalizes_any_input() {
    let img = DynamicImage::ImageLuma8(textured_image(64, 48, 5));
    let gray = preprocess(&img);
    assert_eq!(gray.dimensions(), (64, 48));

    let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(64, 48, image::Rgb([10, 200, 40])));
    let gray2 = preprocess(&rgb);
    assert_eq!(gray2.dimensions(), (64, 48));
}
