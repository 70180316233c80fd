use image::{GrayImage, RgbImage};
use video_ingest::Frame;

use crate::{
    config::{ConfigParameter, ConfigSet},
    imgproc::{absdiff, gaussian_blur5, hysteresis, resize_rgb, rgb_to_gray},
    operator::{Call, Operator, Schema},
};

/// An operator that turns a frame into a binary change mask.
pub trait ChangeDetector: Operator {
    fn detect(&mut self, frame: &Frame) -> GrayImage;
}

impl Operator for Box<dyn ChangeDetector> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn params(&self) -> &ConfigSet {
        (**self).params()
    }

    fn params_mut(&mut self) -> &mut ConfigSet {
        (**self).params_mut()
    }

    fn on_configured(&mut self) {
        (**self).on_configured()
    }

    fn reset(&mut self, frame: &Frame) {
        (**self).reset(frame)
    }

    fn teardown(&mut self) {
        (**self).teardown()
    }
}

impl<'a> Call<&'a Frame> for Box<dyn ChangeDetector> {
    type Output = GrayImage;

    fn call(&mut self, frame: &'a Frame) -> GrayImage {
        self.detect(frame)
    }
}

const RESIZE: &str = "resize";
const HIGH_THRESH: &str = "high_thresh";
const LOW_THRESH: &str = "low_thresh";

/// Hysteresis change detector against a background that only moves on `reset`.
///
/// Runs at full resolution by default and serves as the dart segmentor.
pub struct CustomChangeDetector {
    params: ConfigSet,
    background: Option<RgbImage>,
}

impl Schema for CustomChangeDetector {
    const NAME: &'static str = "CustomChangeDetector";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::float(RESIZE, 1.0, 0.05, 1.0).describe("scale factor before diffing"),
            ConfigParameter::int(HIGH_THRESH, 100, 0, 255)
                .describe("a region is kept only if it reaches this difference"),
            ConfigParameter::int(LOW_THRESH, 50, 0, 255).describe("difference marking a pixel"),
        ]
    }
}

impl Default for CustomChangeDetector {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            background: None,
        }
    }
}

impl CustomChangeDetector {
    fn prepare(&self, frame: &Frame) -> RgbImage {
        resize_rgb(&frame.to_rgb(), self.params.float(RESIZE).unwrap_or(1.0))
    }
}

impl Operator for CustomChangeDetector {
    config_accessors!();

    fn on_configured(&mut self) {
        // A new scale invalidates the stored background.
        self.background = None;
    }

    fn reset(&mut self, frame: &Frame) {
        self.background = Some(self.prepare(frame));
    }
}

impl ChangeDetector for CustomChangeDetector {
    fn detect(&mut self, frame: &Frame) -> GrayImage {
        let image = self.prepare(frame);
        let (w, h) = image.dimensions();
        let diff = match self.background.as_ref() {
            Some(background) => absdiff(&image, background),
            None => None,
        };
        let Some(diff) = diff else {
            self.background = Some(image);
            return GrayImage::new(w, h);
        };

        let low = self.params.int(LOW_THRESH).unwrap_or(50).clamp(0, 255) as u8;
        let high = self.params.int(HIGH_THRESH).unwrap_or(100).clamp(0, 255) as u8;
        hysteresis(&gaussian_blur5(&rgb_to_gray(&diff)), low, high.max(low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConfigRecord,
        imgproc::{bounding_rect, count_nonzero},
        operators::testing::{solid, with_rect},
    };

    #[test]
    fn first_frame_becomes_the_background() {
        let mut detector = CustomChangeDetector::default();
        let mask = detector.detect(&with_rect(40, 40, (5, 5, 10, 10), 255));
        assert_eq!(count_nonzero(&mask), 0);
    }

    #[test]
    fn detects_a_new_object_until_reset() {
        let mut detector = CustomChangeDetector::default();
        let empty = solid(40, 40, 0);
        detector.reset(&empty);

        let dart = with_rect(40, 40, (10, 20, 12, 4), 255);
        let mask = detector.detect(&dart);
        let rect = bounding_rect(&mask);
        assert!(rect.x <= 10 && rect.x + rect.w >= 22, "{rect:?}");
        assert!(detector.detect(&dart).pixels().any(|p| p.0[0] == 255));

        detector.reset(&dart);
        assert_eq!(count_nonzero(&detector.detect(&dart)), 0);
    }

    #[test]
    fn resize_changes_mask_resolution() {
        let mut detector = CustomChangeDetector::default();
        detector
            .configure(&[ConfigRecord::float("resize", 0.5)])
            .unwrap();
        detector.reset(&solid(40, 20, 0));
        let mask = detector.detect(&with_rect(40, 20, (0, 0, 20, 20), 255));
        assert_eq!(mask.dimensions(), (20, 10));
        assert!(count_nonzero(&mask) > 0);
    }
}
