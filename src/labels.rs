use std::io::Write;
use std::path::Path;

use nalgebra as na;

use crate::types::{BoundingBox, Homography, RegistrationError};

/// Parses one `class_id x_center y_center width height` label line, all values
/// normalized to [0,1]. Returns `None` for lines that do not fit the format.
pub fn parse_label_line(line: &str) -> Option<BoundingBox> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 5 {
        return None;
    }
    let class_id = parts[0].parse::<f64>().ok()?;
    if class_id < 0.0 || class_id.fract() != 0.0 {
        return None;
    }
    let mut vals = [0.0f64; 4];
    for (v, p) in vals.iter_mut().zip(&parts[1..]) {
        *v = p.parse::<f64>().ok()?;
        if !v.is_finite() {
            return None;
        }
    }
    Some(BoundingBox {
        class_id: class_id as u32,
        cx: vals[0],
        cy: vals[1],
        w: vals[2],
        h: vals[3],
    })
}

/// Loads a label file, skipping malformed lines with a warning. A malformed
/// line is never fatal for the file.
pub fn load_labels(path: &Path) -> Result<Vec<BoundingBox>, RegistrationError> {
    if !path.exists() {
        return Err(RegistrationError::MissingInput(path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    let mut boxes = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_label_line(line) {
            Some(b) => boxes.push(b),
            None => log::warn!(
                "{}:{}: skipping malformed label line: {:?}",
                path.display(),
                lineno + 1,
                line
            ),
        }
    }
    Ok(boxes)
}

pub fn format_label(b: &BoundingBox) -> String {
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        b.class_id, b.cx, b.cy, b.w, b.h
    )
}

pub fn save_labels(path: &Path, boxes: &[BoundingBox]) -> Result<(), RegistrationError> {
    let mut file = std::fs::File::create(path)?;
    for b in boxes {
        writeln!(file, "{}", format_label(b))?;
    }
    Ok(())
}

/// Applies `h` to a pixel coordinate, dividing by the homogeneous w.
pub fn project_point(h: &Homography, x: f64, y: f64) -> (f64, f64) {
    let p = h * na::Vector3::new(x, y, 1.0);
    (p[0] / p[2], p[1] / p[2])
}

/// Carries one normalized box from source image space to target image space:
/// the 4 pixel-space corners are projected through `h` and enclosed by their
/// axis-aligned bounding rectangle (a rotated/sheared quadrilateral is
/// deliberately approximated by its enclosing rectangle), then renormalized by
/// the target dimensions.
///
/// No clipping to [0,1] is performed; boxes that land partially or fully
/// outside the target frame are surfaced as-is.
pub fn transform_box(
    h: &Homography,
    b: &BoundingBox,
    src_dims: (u32, u32),
    dst_dims: (u32, u32),
) -> BoundingBox {
    let (sw, sh) = (src_dims.0 as f64, src_dims.1 as f64);
    let (dw, dh) = (dst_dims.0 as f64, dst_dims.1 as f64);

    let cx = b.cx * sw;
    let cy = b.cy * sh;
    let half_w = b.w * sw / 2.0;
    let half_h = b.h * sh / 2.0;
    let corners = [
        (cx - half_w, cy - half_h),
        (cx + half_w, cy - half_h),
        (cx + half_w, cy + half_h),
        (cx - half_w, cy + half_h),
    ];

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(x, y) in &corners {
        let (px, py) = project_point(h, x, y);
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    BoundingBox {
        class_id: b.class_id,
        cx: (min_x + max_x) / 2.0 / dw,
        cy: (min_y + max_y) / 2.0 / dh,
        w: (max_x - min_x) / dw,
        h: (max_y - min_y) / dh,
    }
}

/// Transforms a whole label set. Pure function of its inputs.
pub fn transform_labels(
    h: &Homography,
    boxes: &[BoundingBox],
    src_dims: (u32, u32),
    dst_dims: (u32, u32),
) -> Vec<BoundingBox> {
    boxes
        .iter()
        .map(|b| transform_box(h, b, src_dims, dst_dims))
        .collect()
}
