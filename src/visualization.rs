use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use nalgebra as na;

use crate::features::bilinear;
use crate::types::{BoundingBox, FeatureMatch, Homography, Keypoint};

pub fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        out.put_pixel(x, y, Rgb([p[0], p[0], p[0]]));
    }
    out
}

/// Side-by-side source/target canvas with keypoint circles and up to `limit`
/// correspondence lines, colored along a gradient by match rank.
pub fn draw_matches(
    source: &GrayImage,
    target: &GrayImage,
    source_kps: &[Keypoint],
    target_kps: &[Keypoint],
    matches: &[FeatureMatch],
    limit: usize,
) -> RgbImage {
    let w = source.width() + target.width();
    let h = source.height().max(target.height());
    let offset = source.width() as f32;

    let mut canvas = RgbImage::new(w, h);
    for (x, y, p) in source.enumerate_pixels() {
        canvas.put_pixel(x, y, Rgb([p[0], p[0], p[0]]));
    }
    for (x, y, p) in target.enumerate_pixels() {
        canvas.put_pixel(x + source.width(), y, Rgb([p[0], p[0], p[0]]));
    }

    let drawn = matches.len().min(limit);
    for (i, m) in matches.iter().take(drawn).enumerate() {
        let c = colorous::TURBO.eval_rational(i, drawn.max(2));
        let color = Rgb([c.r, c.g, c.b]);
        let a = source_kps[m.source_idx].pos;
        let b = target_kps[m.target_idx].pos;
        draw_hollow_circle_mut(&mut canvas, (a.x as i32, a.y as i32), 3, color);
        draw_hollow_circle_mut(
            &mut canvas,
            ((b.x + offset) as i32, b.y as i32),
            3,
            color,
        );
        draw_line_segment_mut(&mut canvas, (a.x, a.y), (b.x + offset, b.y), color);
    }
    canvas
}

/// Draws hollow rectangles for a normalized label set onto a copy of `img`.
/// Boxes outside the frame are clipped by the drawing routine, not by the
/// label data.
pub fn draw_box_overlay(img: &RgbImage, boxes: &[BoundingBox], color: Rgb<u8>) -> RgbImage {
    let mut out = img.clone();
    let (w, h) = (img.width() as f64, img.height() as f64);
    for b in boxes {
        let x = ((b.cx - b.w / 2.0) * w).round() as i32;
        let y = ((b.cy - b.h / 2.0) * h).round() as i32;
        let bw = ((b.w * w).round() as i64).max(1) as u32;
        let bh = ((b.h * h).round() as i64).max(1) as u32;
        draw_hollow_rect_mut(&mut out, Rect::at(x, y).of_size(bw, bh), color);
    }
    out
}

/// Resamples `src` into the target frame under `h` (source-to-target), i.e.
/// each output pixel is bilinearly sampled at the inverse-mapped source
/// location. Returns `None` when `h` is not invertible.
pub fn warp_perspective(
    src: &GrayImage,
    h: &Homography,
    out_dims: (u32, u32),
) -> Option<GrayImage> {
    let inv = h.try_inverse()?;
    let mut out = GrayImage::new(out_dims.0, out_dims.1);
    for y in 0..out_dims.1 {
        for x in 0..out_dims.0 {
            let p = inv * na::Vector3::new(x as f64, y as f64, 1.0);
            if p[2].abs() <= 1e-12 {
                continue;
            }
            let sx = (p[0] / p[2]) as f32;
            let sy = (p[1] / p[2]) as f32;
            if sx < 0.0 || sy < 0.0 || sx >= src.width() as f32 || sy >= src.height() as f32 {
                continue;
            }
            out.put_pixel(x, y, Luma([bilinear(src, sx, sy).round() as u8]));
        }
    }
    Some(out)
}
