//! Normalized boxes and lines, independent of the resolution they came from.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Segment in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelLine {
    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }
}

/// Box in `[0, 1]` coordinates relative to an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub fn from_pixel(rect: PixelRect, width: u32, height: u32) -> Self {
        let (fw, fh) = (width.max(1) as f64, height.max(1) as f64);
        Self {
            x: rect.x as f64 / fw,
            y: rect.y as f64 / fh,
            w: rect.w as f64 / fw,
            h: rect.h as f64 / fh,
        }
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> PixelRect {
        let scale = |v: f64, dim: u32| (v * dim as f64).round().clamp(0.0, dim as f64) as u32;
        PixelRect {
            x: scale(self.x, width),
            y: scale(self.y, height),
            w: scale(self.w, width),
            h: scale(self.h, height),
        }
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }
}

/// Segment in `[0, 1]` coordinates relative to an image or region of interest.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Line {
    pub fn from_pixel(line: PixelLine, width: u32, height: u32) -> Self {
        let (fw, fh) = (width.max(1) as f64, height.max(1) as f64);
        Self {
            x1: line.x1 / fw,
            y1: line.y1 / fh,
            x2: line.x2 / fw,
            y2: line.y2 / fh,
        }
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> PixelLine {
        let (fw, fh) = (width as f64, height as f64);
        PixelLine {
            x1: self.x1 * fw,
            y1: self.y1 * fh,
            x2: self.x2 * fw,
            y2: self.y2 * fh,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn pixel_boxes_survive_normalization() {
        for (rect, width, height) in [
            (PixelRect { x: 0, y: 0, w: 640, h: 480 }, 640, 480),
            (PixelRect { x: 13, y: 7, w: 101, h: 3 }, 640, 480),
            (PixelRect { x: 1919, y: 1079, w: 1, h: 1 }, 1920, 1080),
        ] {
            let normalized = BBox::from_pixel(rect, width, height);
            assert!(normalized.x >= 0.0 && normalized.x + normalized.w <= 1.0 + 1e-12);
            assert_eq!(normalized.to_pixel(width, height), rect);

            let again = BBox::from_pixel(normalized.to_pixel(width, height), width, height);
            assert_relative_eq!(again.x, normalized.x);
            assert_relative_eq!(again.h, normalized.h);
        }
    }

    #[test]
    fn lines_scale_with_their_region() {
        let pixel = PixelLine { x1: 10.0, y1: 20.0, x2: 30.0, y2: 60.0 };
        let line = Line::from_pixel(pixel, 40, 80);
        assert_relative_eq!(line.x1, 0.25);
        assert_relative_eq!(line.y2, 0.75);
        let back = line.to_pixel(40, 80);
        assert_relative_eq!(back.x2, 30.0);
        assert_relative_eq!(back.length(), pixel.length());
    }

    #[test]
    fn empty_boxes_have_zero_area() {
        let bbox = BBox::from_pixel(PixelRect::default(), 100, 100);
        assert!(bbox.is_empty());
        assert_eq!(bbox.area(), 0.0);
    }
}
