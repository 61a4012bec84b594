//! Geometry helpers used when composing a recorded frame.

use std::time::Duration;

use crate::models::frame::{Rect, Rgba, Rotation};
use crate::pipeline::frame_gate::GateStats;
use crate::traits::canvas::Canvas;

const PANEL_COLOR: Rgba = Rgba([0, 0, 0, 160]);
const RATIO_COLOR: Rgba = Rgba([64, 200, 96, 255]);
const LATENCY_COLOR: Rgba = Rgba([240, 160, 32, 255]);

/// Source and destination rects that fill `dst` completely, cropping the
/// source around its center. Never letterboxes.
pub fn aspect_fill_rects(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (Rect, Rect) {
    let dst = Rect::from_size(dst_w as f32, dst_h as f32);
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return (Rect::from_size(src_w as f32, src_h as f32), dst);
    }

    let (sw, sh) = (src_w as f32, src_h as f32);
    let src_ar = sw / sh;
    let dst_ar = dst_w as f32 / dst_h as f32;

    let src = if src_ar > dst_ar {
        // crop width
        let new_w = sh * dst_ar;
        let left = (sw - new_w) * 0.5;
        Rect::new(left, 0.0, left + new_w, sh)
    } else {
        // crop height
        let new_h = sw / dst_ar;
        let top = (sh - new_h) * 0.5;
        Rect::new(0.0, top, sw, top + new_h)
    };

    (src, dst)
}

/// Transform `canvas` so that content laid out in the rotated frame
/// (`rotation.rotated_dimensions(width, height)`) lands upright on the
/// `width`×`height` surface.
pub fn apply_rotation(canvas: &mut dyn Canvas, width: u32, height: u32, rotation: Rotation) {
    let (w, h) = (width as f32, height as f32);
    match rotation {
        Rotation::Deg0 => {}
        Rotation::Deg90 => {
            canvas.translate(0.0, h);
            canvas.rotate_degrees(-90.0);
        }
        Rotation::Deg180 => {
            canvas.translate(w, h);
            canvas.rotate_degrees(180.0);
        }
        Rotation::Deg270 => {
            canvas.translate(w, 0.0);
            canvas.rotate_degrees(90.0);
        }
    }
}

/// Small panel with two bars: share of frames submitted, and last submit
/// latency relative to one frame interval (full bar = a whole interval).
pub fn draw_diagnostics(
    canvas: &mut dyn Canvas,
    width: u32,
    height: u32,
    stats: &GateStats,
    frame_interval: Duration,
) {
    let margin = (width.min(height) as f32 * 0.02).max(2.0);
    let panel_w = (width as f32 * 0.3).max(8.0);
    let bar_h = (height as f32 * 0.03).max(2.0);
    let panel = Rect::new(
        margin,
        margin,
        margin + panel_w,
        margin + bar_h * 2.0 + margin * 3.0,
    );
    canvas.fill_rect(panel, PANEL_COLOR);

    let inner_w = panel_w - margin * 2.0;
    let ratio = stats.submit_ratio().clamp(0.0, 1.0);
    let x0 = panel.left + margin;
    let y0 = panel.top + margin;
    canvas.fill_rect(Rect::new(x0, y0, x0 + inner_w * ratio, y0 + bar_h), RATIO_COLOR);

    let load = if frame_interval.is_zero() {
        0.0
    } else {
        (stats.last_submit_latency.as_secs_f32() / frame_interval.as_secs_f32()).clamp(0.0, 1.0)
    };
    let y1 = y0 + bar_h + margin;
    canvas.fill_rect(Rect::new(x0, y1, x0 + inner_w * load, y1 + bar_h), LATENCY_COLOR);
}
