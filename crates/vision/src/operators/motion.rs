use std::collections::VecDeque;

use image::{GrayImage, RgbImage};
use video_ingest::Frame;

use super::ChangeDetector;
use crate::{
    config::{ConfigParameter, ConfigSet},
    imgproc::{absdiff, count_nonzero, gaussian_blur3, hysteresis, resize_rgb, rgb_to_gray},
    operator::{Operator, Schema},
};

const RESIZE: &str = "resize";
const THRESHOLD: &str = "threshold";
const HIGH_THRESHOLD: &str = "high_threshold";
const CONSISTENCY_FRAMES: &str = "consistency_frames";

/// Downscaled frame differencing with a consistency window.
///
/// Motion is reported only once the last `consistency_frames` masks all show
/// change; the reporting frame then becomes the new background. Until then the
/// output is an empty mask.
pub struct MotionDetector {
    params: ConfigSet,
    background: Option<RgbImage>,
    history: VecDeque<bool>,
}

impl Schema for MotionDetector {
    const NAME: &'static str = "MotionDetector";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::float(RESIZE, 0.25, 0.01, 1.0).describe("scale factor before diffing"),
            ConfigParameter::int(THRESHOLD, 50, 0, 255).describe("difference marking a pixel"),
            ConfigParameter::int(HIGH_THRESHOLD, 80, 0, 255)
                .describe("a region is kept only if it reaches this difference"),
            ConfigParameter::int(CONSISTENCY_FRAMES, 5, 1, 30)
                .describe("consecutive frames with motion before reporting"),
        ]
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            background: None,
            history: VecDeque::new(),
        }
    }
}

impl MotionDetector {
    fn prepare(&self, frame: &Frame) -> RgbImage {
        resize_rgb(&frame.to_rgb(), self.params.float(RESIZE).unwrap_or(0.25))
    }

    fn window(&self) -> usize {
        self.params.int(CONSISTENCY_FRAMES).unwrap_or(5).max(1) as usize
    }
}

impl Operator for MotionDetector {
    config_accessors!();

    fn on_configured(&mut self) {
        let window = self.window();
        while self.history.len() > window {
            self.history.pop_front();
        }
    }

    fn reset(&mut self, frame: &Frame) {
        self.background = Some(self.prepare(frame));
        self.history.clear();
    }
}

impl ChangeDetector for MotionDetector {
    fn detect(&mut self, frame: &Frame) -> GrayImage {
        let image = self.prepare(frame);
        let (w, h) = image.dimensions();
        let diff = match self.background.as_ref() {
            Some(background) => absdiff(&image, background),
            None => None,
        };
        let Some(diff) = diff else {
            // First frame, or the resolution changed: rebase.
            self.background = Some(image);
            self.history.clear();
            return GrayImage::new(w, h);
        };

        let low = self.params.int(THRESHOLD).unwrap_or(50).clamp(0, 255) as u8;
        let high = self.params.int(HIGH_THRESHOLD).unwrap_or(80).clamp(0, 255) as u8;
        let mask = hysteresis(&gaussian_blur3(&rgb_to_gray(&diff)), low, high.max(low));

        let window = self.window();
        self.history.push_back(count_nonzero(&mask) > 0);
        while self.history.len() > window {
            self.history.pop_front();
        }

        if self.history.len() == window && self.history.iter().all(|moved| *moved) {
            self.background = Some(image);
            mask
        } else {
            GrayImage::new(w, h)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConfigRecord,
        operators::testing::{solid, with_rect},
    };

    #[test]
    fn motion_needs_a_consistent_window() {
        let mut detector = MotionDetector::default();
        assert_eq!(count_nonzero(&detector.detect(&solid(64, 64, 0))), 0);

        let bright = solid(64, 64, 255);
        for _ in 0..4 {
            assert_eq!(count_nonzero(&detector.detect(&bright)), 0);
        }
        let mask = detector.detect(&bright);
        assert_eq!(mask.dimensions(), (16, 16));
        assert_eq!(count_nonzero(&mask), 16 * 16);

        // The reporting frame became the background.
        assert_eq!(count_nonzero(&detector.detect(&bright)), 0);
    }

    #[test]
    fn a_still_frame_breaks_the_window() {
        let mut detector = MotionDetector::default();
        detector
            .configure(&[ConfigRecord::int("consistency_frames", 2)])
            .unwrap();
        let dark = solid(32, 32, 0);
        let moved = with_rect(32, 32, (8, 8, 16, 16), 255);
        detector.detect(&dark);
        detector.detect(&moved);
        detector.detect(&dark);
        assert_eq!(count_nonzero(&detector.detect(&moved)), 0);
        assert!(count_nonzero(&detector.detect(&moved)) > 0);
    }

    #[test]
    fn reset_rebases_and_clears_history() {
        let mut detector = MotionDetector::default();
        detector
            .configure(&[ConfigRecord::int("consistency_frames", 1)])
            .unwrap();
        detector.detect(&solid(32, 32, 0));
        let bright = solid(32, 32, 255);
        detector.reset(&bright);
        assert_eq!(count_nonzero(&detector.detect(&bright)), 0);
        assert!(count_nonzero(&detector.detect(&solid(32, 32, 0))) > 0);
    }
}
