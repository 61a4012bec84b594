use video_capture_core::{Canvas, CameraFrame, Rect, Rgba};

/// 2D affine transform mapping `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Affine {
    const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translation(dx: f32, dy: f32) -> Self {
        Self {
            e: dx,
            f: dy,
            ..Self::IDENTITY
        }
    }

    fn rotation(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        // snap so quarter turns land on exact pixel grids
        let snap = |v: f32| if v.abs() < 1e-6 { 0.0 } else { v };
        let (sin, cos) = (snap(sin), snap(cos));
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self ∘ other`: apply `other` first.
    fn then(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }
}

/// RGBA8 raster implementing `Canvas` for the software encoder.
///
/// Drawing maps each covered device pixel centre back through the inverse of
/// the current transform, so rotated and scaled draws leave no holes.
pub struct SoftwareCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    transform: Affine,
    stack: Vec<Affine>,
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
            transform: Affine::IDENTITY,
            stack: Vec::new(),
        };
        canvas.clear(Rgba::BLACK);
        canvas
    }

    pub fn clear(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color.0);
        }
    }

    /// Clear to black and drop any transform state left by the previous frame.
    pub fn reset(&mut self) {
        self.clear(Rgba::BLACK);
        self.transform = Affine::IDENTITY;
        self.stack.clear();
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[i..i + 4]);
        Some(Rgba(px))
    }

    /// Transformed bounds of `rect`, clipped to the raster, as pixel ranges.
    fn device_bounds(&self, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
        let corners = [
            self.transform.apply(rect.left, rect.top),
            self.transform.apply(rect.right, rect.top),
            self.transform.apply(rect.left, rect.bottom),
            self.transform.apply(rect.right, rect.bottom),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().max(0.0) as u32).min(self.width);
        let y1 = (max_y.ceil().max(0.0) as u32).min(self.height);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    /// Visit every device pixel whose centre maps inside `rect` in user space.
    fn for_each_covered(&mut self, rect: Rect, mut paint: impl FnMut(&mut [u8], f32, f32)) {
        if rect.is_empty() {
            return;
        }
        let Some(inverse) = self.transform.inverse() else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.device_bounds(&rect) else {
            return;
        };

        let stride = self.width as usize * 4;
        for y in y0..y1 {
            for x in x0..x1 {
                let (ux, uy) = inverse.apply(x as f32 + 0.5, y as f32 + 0.5);
                if !rect.contains(ux, uy) {
                    continue;
                }
                let i = y as usize * stride + x as usize * 4;
                paint(&mut self.pixels[i..i + 4], ux, uy);
            }
        }
    }
}

fn blend(dst: &mut [u8], src: [u8; 4]) {
    match src[3] {
        255 => dst.copy_from_slice(&src),
        0 => {}
        alpha => {
            let a = alpha as u32;
            let inv = 255 - a;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = (a + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
        }
    }
}

impl Canvas for SoftwareCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
    }

    fn restore(&mut self) {
        if let Some(transform) = self.stack.pop() {
            self.transform = transform;
        }
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.transform = self.transform.then(&Affine::translation(dx, dy));
    }

    fn rotate_degrees(&mut self, degrees: f32) {
        self.transform = self.transform.then(&Affine::rotation(degrees));
    }

    fn draw_frame(&mut self, frame: &CameraFrame, src: Rect, dst: Rect) {
        if src.is_empty() || frame.width == 0 || frame.height == 0 {
            return;
        }
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.pixels.len() < expected {
            log::warn!(
                "Skipping short camera frame: {} bytes for {}x{}",
                frame.pixels.len(),
                frame.width,
                frame.height
            );
            return;
        }

        let scale_x = src.width() / dst.width();
        let scale_y = src.height() / dst.height();
        let max_x = frame.width - 1;
        let max_y = frame.height - 1;
        let stride = frame.width as usize * 4;

        self.for_each_covered(dst, |px, ux, uy| {
            let sx = (src.left + (ux - dst.left) * scale_x).floor().max(0.0) as u32;
            let sy = (src.top + (uy - dst.top) * scale_y).floor().max(0.0) as u32;
            let i = sy.min(max_y) as usize * stride + sx.min(max_x) as usize * 4;
            let mut sample = [0u8; 4];
            sample.copy_from_slice(&frame.pixels[i..i + 4]);
            blend(px, sample);
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.for_each_covered(rect, |px, _, _| blend(px, color.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RED: Rgba = Rgba([255, 0, 0, 255]);

    #[test]
    fn new_canvas_is_opaque_black() {
        let canvas = SoftwareCanvas::new(3, 2);
        assert_eq!(canvas.pixels().len(), 24);
        assert_eq!(canvas.pixel(2, 1), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(3, 0), None);
    }

    #[test]
    fn fill_respects_bounds() {
        let mut canvas = SoftwareCanvas::new(4, 4);
        canvas.fill_rect(Rect::new(1.0, 1.0, 3.0, 2.0), RED);
        assert_eq!(canvas.pixel(1, 1), Some(RED));
        assert_eq!(canvas.pixel(2, 1), Some(RED));
        assert_eq!(canvas.pixel(0, 1), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(1, 2), Some(Rgba::BLACK));
    }

    #[test]
    fn fill_outside_raster_is_clipped() {
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.fill_rect(Rect::new(-10.0, -10.0, 1.0, 1.0), RED);
        canvas.fill_rect(Rect::new(5.0, 5.0, 9.0, 9.0), RED);
        assert_eq!(canvas.pixel(0, 0), Some(RED));
        assert_eq!(canvas.pixel(1, 1), Some(Rgba::BLACK));
    }

    #[test]
    fn half_alpha_blends() {
        let mut canvas = SoftwareCanvas::new(1, 1);
        canvas.clear(Rgba::WHITE);
        canvas.fill_rect(Rect::from_size(1.0, 1.0), Rgba::new(0, 0, 0, 128));
        let px = canvas.pixel(0, 0).unwrap();
        assert_eq!(px.alpha(), 255);
        assert!((126..=128).contains(&px.0[0]));
    }

    #[test]
    fn translate_then_restore() {
        let mut canvas = SoftwareCanvas::new(4, 4);
        canvas.save();
        canvas.translate(2.0, 2.0);
        canvas.fill_rect(Rect::from_size(1.0, 1.0), RED);
        canvas.restore();
        canvas.fill_rect(Rect::from_size(1.0, 1.0), Rgba::WHITE);

        assert_eq!(canvas.pixel(2, 2), Some(RED));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::WHITE));
        canvas.restore();
    }

    #[test]
    fn quarter_turn_maps_user_space_into_device() {
        // translate(0, h) + rotate(-90) is the portrait transform used for 90° locks
        let mut canvas = SoftwareCanvas::new(4, 2);
        canvas.translate(0.0, 2.0);
        canvas.rotate_degrees(-90.0);
        // user space is 2 wide and 4 tall; its top-left pixel lands bottom-left
        canvas.fill_rect(Rect::from_size(1.0, 1.0), RED);
        assert_eq!(canvas.pixel(0, 1), Some(RED));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::BLACK));
        assert_eq!(canvas.pixel(1, 1), Some(Rgba::BLACK));
    }

    #[test]
    fn affine_inverse_round_trips() {
        let t = Affine::translation(3.0, -1.0).then(&Affine::rotation(30.0));
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(1.5, 2.5);
        let (bx, by) = inv.apply(x, y);
        assert_relative_eq!(bx, 1.5, epsilon = 1e-4);
        assert_relative_eq!(by, 2.5, epsilon = 1e-4);
    }

    #[test]
    fn draw_frame_scales_nearest_neighbour() {
        // 2x1 source: red | white, drawn into 4x2
        let frame = CameraFrame::new(2, 1, vec![255, 0, 0, 255, 255, 255, 255, 255]);
        let mut canvas = SoftwareCanvas::new(4, 2);
        canvas.draw_frame(&frame, Rect::from_size(2.0, 1.0), Rect::from_size(4.0, 2.0));

        assert_eq!(canvas.pixel(0, 0), Some(RED));
        assert_eq!(canvas.pixel(1, 1), Some(RED));
        assert_eq!(canvas.pixel(2, 0), Some(Rgba::WHITE));
        assert_eq!(canvas.pixel(3, 1), Some(Rgba::WHITE));
    }

    #[test]
    fn draw_frame_crops_source() {
        let frame = CameraFrame::new(2, 1, vec![255, 0, 0, 255, 255, 255, 255, 255]);
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.draw_frame(&frame, Rect::new(1.0, 0.0, 2.0, 1.0), Rect::from_size(2.0, 2.0));
        assert!((0..2).all(|y| (0..2).all(|x| canvas.pixel(x, y) == Some(Rgba::WHITE))));
    }

    #[test]
    fn short_frame_is_ignored() {
        let frame = CameraFrame::new(4, 4, vec![255; 8]);
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.draw_frame(&frame, Rect::from_size(4.0, 4.0), Rect::from_size(2.0, 2.0));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::BLACK));
    }

    #[test]
    fn reset_clears_transform_stack() {
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.save();
        canvas.translate(1.0, 1.0);
        canvas.fill_rect(Rect::from_size(1.0, 1.0), RED);
        canvas.reset();
        canvas.fill_rect(Rect::from_size(1.0, 1.0), RED);
        assert_eq!(canvas.pixel(0, 0), Some(RED));
        assert_eq!(canvas.pixel(1, 1), Some(Rgba::BLACK));
    }
}
