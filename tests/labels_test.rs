use cross_modal_registration::labels::{
    format_label, load_labels, parse_label_line, save_labels, transform_box, transform_labels,
};
use cross_modal_registration::types::{BoundingBox, RegistrationError};
use nalgebra as na;
use tempfile::TempDir;

#[test]
fn test_parse_label_line() {
    let b = parse_label_line("2 0.5 0.25 0.1 0.2").unwrap();
    assert_eq!(b.class_id, 2);
    assert!((b.cx - 0.5).abs() < 1e-12);
    assert!((b.cy - 0.25).abs() < 1e-12);
    assert!((b.w - 0.1).abs() < 1e-12);
    assert!((b.h - 0.2).abs() < 1e-12);
}

#[test]
fn test_parse_rejects_malformed() {
    assert!(parse_label_line("").is_none());
    assert!(parse_label_line("1 0.5 0.5 0.1").is_none()); // 4 fields
    assert!(parse_label_line("1 0.5 0.5 0.1 0.1 0.1").is_none()); // 6 fields
    assert!(parse_label_line("x 0.5 0.5 0.1 0.1").is_none());
    assert!(parse_label_line("-1 0.5 0.5 0.1 0.1").is_none());
    assert!(parse_label_line("1.5 0.5 0.5 0.1 0.1").is_none()); // fractional class
    assert!(parse_label_line("1 nan 0.5 0.1 0.1").is_none());
}

#[test]
fn test_format_label() {
    let b = BoundingBox {
        class_id: 0,
        cx: 0.5,
        cy: 0.5,
        w: 0.2,
        h: 0.3,
    };
    assert_eq!(format_label(&b), "0 0.500000 0.500000 0.200000 0.300000");
}

#[test]
fn test_identity_transform_round_trip() {
    let h = na::Matrix3::identity();
    let b = BoundingBox {
        class_id: 3,
        cx: 0.4,
        cy: 0.6,
        w: 0.2,
        h: 0.1,
    };
    let out = transform_box(&h, &b, (640, 480), (640, 480));
    assert_eq!(out.class_id, 3);
    assert!((out.cx - b.cx).abs() < 1e-9);
    assert!((out.cy - b.cy).abs() < 1e-9);
    assert!((out.w - b.w).abs() < 1e-9);
    assert!((out.h - b.h).abs() < 1e-9);
}

#[test]
fn test_translation_transform() {
    // +64 px x shift on a 640-wide image moves cx by 0.1.
    let h = na::Matrix3::new(1.0, 0.0, 64.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
    let b = BoundingBox {
        class_id: 0,
        cx: 0.5,
        cy: 0.5,
        w: 0.2,
        h: 0.2,
    };
    let out = transform_box(&h, &b, (640, 480), (640, 480));
    assert!((out.cx - 0.6).abs() < 1e-9);
    assert!((out.cy - 0.5).abs() < 1e-9);
    assert!((out.w - 0.2).abs() < 1e-9);
}

#[test]
fn test_rotation_grows_enclosing_box() {
    // 45 degree rotation about the image center: the enclosing axis-aligned
    // rectangle of a square grows by sqrt(2).
    let (cx, cy) = (320.0f64, 240.0f64);
    let (s, c) = std::f64::consts::FRAC_PI_4.sin_cos();
    let h = na::Matrix3::new(
        c,
        -s,
        cx - c * cx + s * cy,
        s,
        c,
        cy - s * cx - c * cy,
        0.0,
        0.0,
        1.0,
    );
    let b = BoundingBox {
        class_id: 0,
        cx: 0.5,
        cy: 0.5,
        w: 0.2,
        h: 0.2 * 640.0 / 480.0, // square in pixels
    };
    let out = transform_box(&h, &b, (640, 480), (640, 480));
    let side_px = 0.2 * 640.0;
    assert!((out.w * 640.0 - side_px * std::f64::consts::SQRT_2).abs() < 1e-6);
    assert!((out.h * 480.0 - side_px * std::f64::consts::SQRT_2).abs() < 1e-6);
}

#[test]
fn test_no_clipping_outside_unit_range() {
    let h = na::Matrix3::new(1.0, 0.0, 600.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
    let b = BoundingBox {
        class_id: 0,
        cx: 0.9,
        cy: 0.5,
        w: 0.1,
        h: 0.1,
    };
    let out = transform_box(&h, &b, (640, 480), (640, 480));
    assert!(out.cx > 1.0, "transformed center must not be clipped");
    assert!((out.w - 0.1).abs() < 1e-9);
}

#[test]
fn test_load_skips_malformed_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("frame_v.txt");
    std::fs::write(
        &path,
        "0 0.5 0.5 0.2 0.2\nnot a label\n1 0.1 0.1 0.05 0.05\n\n2 0.9\n",
    )
    .unwrap();
    let boxes = load_labels(&path).unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].class_id, 0);
    assert_eq!(boxes[1].class_id, 1);
}

#[test]
fn test_load_missing_file() {
    let tmp = TempDir::new().unwrap();
    let result = load_labels(&tmp.path().join("nope.txt"));
    assert!(matches!(result, Err(RegistrationError::MissingInput(_))));
}

#[test]
fn test_save_load_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("out.txt");
    let boxes = vec![
        BoundingBox { class_id: 0, cx: 0.5, cy: 0.5, w: 0.2, h: 0.3 },
        BoundingBox { class_id: 7, cx: 0.125, cy: 0.25, w: 0.0625, h: 0.5 },
    ];
    save_labels(&path, &boxes).unwrap();
    let loaded = load_labels(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    for (a, b) in boxes.iter().zip(&loaded) {
        assert_eq!(a.class_id, b.class_id);
        assert!((a.cx - b.cx).abs() < 1e-6);
        assert!((a.w - b.w).abs() < 1e-6);
    }
}

#[test]
fn test_transform_labels_maps_all() {
    let h = na::Matrix3::identity();
    let boxes = vec![
        BoundingBox { class_id: 0, cx: 0.3, cy: 0.3, w: 0.1, h: 0.1 },
        BoundingBox { class_id: 1, cx: 0.7, cy: 0.7, w: 0.2, h: 0.2 },
    ];
    let out = transform_labels(&h, &boxes, (640, 480), (320, 240));
    assert_eq!(out.len(), 2);
    // Identity in pixel space keeps normalized centers when dims halve both axes.
    assert!((out[0].cx - 0.6).abs() < 1e-9);
    assert!((out[0].cy - 0.6).abs() < 1e-9);
}
