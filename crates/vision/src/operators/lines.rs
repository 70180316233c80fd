use std::f64::consts::PI;

use image::GrayImage;

use crate::{
    blackboard::Payload,
    config::{ConfigParameter, ConfigSet},
    geometry::{BBox, Line},
    imgproc::{HoughParams, crop, hough_segments},
    operator::{Call, Operator, Publish, Schema},
};

const RHO: &str = "rho";
const THETA: &str = "theta";
const THRESHOLD: &str = "threshold";
const MIN_LINE_LENGTH: &str = "min_line_length";
const MAX_LINE_GAP: &str = "max_line_gap";

/// Mask plus the region of interest to search, normalized to the mask.
pub struct LineInput<'a> {
    pub mask: &'a GrayImage,
    pub roi: BBox,
}

impl Publish for Line {
    fn payload(&self) -> Option<Payload> {
        serde_json::to_value(self).ok().map(Payload::Json)
    }
}

/// Longest Hough segment inside the region of interest, normalized to the region.
pub struct HoughLineDetector {
    params: ConfigSet,
}

impl Schema for HoughLineDetector {
    const NAME: &'static str = "HoughLineDetector";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::float(RHO, 1.0, 0.1, 10.0).describe("distance resolution in pixels"),
            ConfigParameter::int(THETA, 45, 1, 360).describe("angle resolution is pi / theta"),
            ConfigParameter::int(THRESHOLD, 10, 1, 1000),
            ConfigParameter::int(MIN_LINE_LENGTH, 70, 0, 2000),
            ConfigParameter::int(MAX_LINE_GAP, 20, 0, 1000),
        ]
    }
}

impl Default for HoughLineDetector {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
        }
    }
}

impl HoughLineDetector {
    fn hough_params(&self) -> HoughParams {
        let int = |name, fallback| self.params.int(name).unwrap_or(fallback);
        HoughParams {
            rho: self.params.float(RHO).unwrap_or(1.0),
            theta: PI / int(THETA, 45).max(1) as f64,
            threshold: int(THRESHOLD, 10).max(1) as u32,
            min_line_length: int(MIN_LINE_LENGTH, 70) as f64,
            max_line_gap: int(MAX_LINE_GAP, 20) as f64,
        }
    }
}

impl Operator for HoughLineDetector {
    config_accessors!();
}

impl<'a> Call<LineInput<'a>> for HoughLineDetector {
    type Output = Option<Line>;

    fn call(&mut self, input: LineInput<'a>) -> Option<Line> {
        if input.roi.is_empty() {
            return None;
        }
        let (w, h) = input.mask.dimensions();
        let region = crop(input.mask, input.roi.to_pixel(w, h));
        let (rw, rh) = region.dimensions();
        if rw == 0 || rh == 0 {
            return None;
        }

        hough_segments(&region, &self.hough_params())
            .into_iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .map(|segment| Line::from_pixel(segment, rw, rh))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        config::ConfigRecord,
        geometry::PixelRect,
        operators::testing::mask,
    };

    #[test]
    fn finds_the_dart_shaft_inside_the_roi() {
        // Vertical shaft at x = 60, rows 20..119, plus noise outside the ROI.
        let image = mask(200, 200, |x, y| (x == 60 && (20..120).contains(&y)) || (x > 150 && y < 5));
        let roi = BBox::from_pixel(PixelRect { x: 50, y: 10, w: 20, h: 120 }, 200, 200);

        let mut detector = HoughLineDetector::default();
        let line = detector
            .call(LineInput { mask: &image, roi })
            .expect("line");
        let (ys, ye) = (line.y1.min(line.y2), line.y1.max(line.y2));
        assert_relative_eq!(line.x1, 0.5);
        assert_relative_eq!(line.x2, 0.5);
        assert_relative_eq!(ys, 10.0 / 120.0, epsilon = 1e-9);
        assert_relative_eq!(ye, 109.0 / 120.0, epsilon = 1e-9);
    }

    #[test]
    fn short_segments_are_ignored() {
        let image = mask(100, 100, |x, y| x == 10 && (0..30).contains(&y));
        let roi = BBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 };
        let mut detector = HoughLineDetector::default();
        assert!(detector.call(LineInput { mask: &image, roi }).is_none());

        detector
            .configure(&[ConfigRecord::int("min_line_length", 20)])
            .unwrap();
        assert!(detector.call(LineInput { mask: &image, roi }).is_some());
    }

    #[test]
    fn empty_roi_has_no_line() {
        let image = mask(10, 10, |_, _| true);
        let mut detector = HoughLineDetector::default();
        assert!(detector
            .call(LineInput { mask: &image, roi: BBox::default() })
            .is_none());
    }
}
