use crate::models::frame::{CameraFrame, Rect, Rgba};

/// Drawing surface handed out by `FrameEncoder::begin_frame`.
///
/// Coordinates pass through a current transform; `save`/`restore` push and
/// pop it. Implementations draw into the encoder's pending frame.
pub trait Canvas {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Push the current transform.
    fn save(&mut self);

    /// Pop back to the last saved transform. No-op when nothing was saved.
    fn restore(&mut self);

    fn translate(&mut self, dx: f32, dy: f32);

    /// Rotate clockwise around the current origin (y axis pointing down).
    fn rotate_degrees(&mut self, degrees: f32);

    /// Draw the `src` region of `frame` into `dst`, scaling as needed.
    fn draw_frame(&mut self, frame: &CameraFrame, src: Rect, dst: Rect);

    /// Blend `color` over `rect`.
    fn fill_rect(&mut self, rect: Rect, color: Rgba);
}
