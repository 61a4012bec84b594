use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Camera position used for recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Back,
    Front,
    External,
}

impl Default for CameraFacing {
    fn default() -> Self {
        Self::Back
    }
}

/// Quarter-turn orientation applied to overlays and recorded with the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[serde(rename = "0")]
    Deg0,
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "180")]
    Deg180,
    #[serde(rename = "270")]
    Deg270,
}

impl Rotation {
    /// Normalizes any angle into [0, 360) and snaps it to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        match ((normalized + 45) / 90) % 4 {
            1 => Self::Deg90,
            2 => Self::Deg180,
            3 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether this rotation swaps width and height.
    pub fn is_transposed(&self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Frame dimensions as seen by content drawn under this rotation.
    pub fn rotated_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if self.is_transposed() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::Deg0
    }
}

/// Axis-aligned rectangle in canvas units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

/// A camera frame handed out by a `FrameSource`.
///
/// Ownership transfers to the caller; dropping the frame releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, row-major, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl CameraFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, color: Rgba) -> Self {
        let pixels = color
            .0
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = self.pixels.get(i..i + 4)?;
        Some(Rgba([p[0], p[1], p[2], p[3]]))
    }
}

/// Geometry and timing of the surface handed out by `FrameEncoder::begin_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Media time of this frame, relative to the start of the segment.
    pub timestamp: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(100), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(136), Rotation::Deg180);
        assert_eq!(Rotation::from_degrees(350), Rotation::Deg0);
    }

    #[test]
    fn rotated_dimensions_swap_for_quarter_turns() {
        assert_eq!(Rotation::Deg90.rotated_dimensions(1920, 1080), (1080, 1920));
        assert_eq!(Rotation::Deg180.rotated_dimensions(1920, 1080), (1920, 1080));
        assert_eq!(Rotation::Deg270.rotated_dimensions(4, 2), (2, 4));
    }

    #[test]
    fn solid_frame_pixels() {
        let frame = CameraFrame::solid(3, 2, Rgba::new(1, 2, 3, 4));
        assert_eq!(frame.pixels.len(), 24);
        assert_eq!(frame.pixel(2, 1), Some(Rgba::new(1, 2, 3, 4)));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn rect_geometry() {
        let r = Rect::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(r.width(), 20.0);
        assert_eq!(r.height(), 40.0);
        assert!(r.contains(10.0, 20.0));
        assert!(!r.contains(30.0, 20.0));
        assert!(Rect::from_size(0.0, 5.0).is_empty());
    }
}
