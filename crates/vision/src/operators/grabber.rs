use std::time::{Duration, Instant};

use video_ingest::{CaptureError, Frame, FrameSource, ImageSize};

use crate::{
    config::{ConfigParameter, ConfigSet},
    operator::{Call, Operator, Schema},
};

const MAX_FPS: &str = "max_fps";
const SKIP_FRAMES: &str = "skip_frames";

/// Pulls frames from a [`FrameSource`] for a pipeline.
pub struct FrameGrabber {
    params: ConfigSet,
    source: Box<dyn FrameSource>,
    running: bool,
    last_frame: Option<Instant>,
}

impl Schema for FrameGrabber {
    const NAME: &'static str = "FrameGrabber";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::float(MAX_FPS, 0.0, 0.0, 240.0)
                .describe("upper bound on delivered frames per second, 0 disables"),
            ConfigParameter::int(SKIP_FRAMES, 0, 0, 30)
                .describe("frames dropped before each delivered frame"),
        ]
    }
}

impl FrameGrabber {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            params: Self::config_set(),
            source,
            running: false,
            last_frame: None,
        }
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.running {
            self.source.start()?;
            self.running = true;
        }
        Ok(())
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.source.image_size()
    }

    fn throttle(&mut self) {
        let max_fps = self.params.float(MAX_FPS).unwrap_or(0.0);
        if max_fps > 0.0 {
            if let Some(last) = self.last_frame {
                let interval = Duration::from_secs_f64(1.0 / max_fps);
                if let Some(wait) = interval.checked_sub(last.elapsed()) {
                    std::thread::sleep(wait);
                }
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl Operator for FrameGrabber {
    config_accessors!();

    fn teardown(&mut self) {
        if self.running {
            self.source.stop();
            self.running = false;
        }
    }
}

impl Call<()> for FrameGrabber {
    type Output = Result<Frame, CaptureError>;

    fn call(&mut self, _: ()) -> Result<Frame, CaptureError> {
        if !self.running {
            return Err(CaptureError::NotStarted);
        }
        for _ in 0..self.params.int(SKIP_FRAMES).unwrap_or(0) {
            self.source.get_frame()?;
        }
        self.throttle();
        self.source.get_frame()
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::Replay;

    use super::*;
    use crate::{config::ConfigRecord, operators::testing::solid};

    fn grabber(values: &[u8]) -> FrameGrabber {
        let frames = values.iter().map(|v| solid(2, 2, *v)).collect();
        FrameGrabber::new(Box::new(Replay::new(frames, false)))
    }

    #[test]
    fn requires_start_and_stops_on_teardown() {
        let mut grabber = grabber(&[1, 2]);
        assert!(matches!(grabber.call(()), Err(CaptureError::NotStarted)));

        grabber.start().unwrap();
        assert_eq!(grabber.call(()).unwrap().data[0], 1);

        grabber.teardown();
        grabber.teardown();
        assert!(matches!(grabber.call(()), Err(CaptureError::NotStarted)));
    }

    #[test]
    fn skips_frames_and_reports_end_of_stream() {
        let mut grabber = grabber(&[1, 2, 3, 4, 5]);
        grabber.configure(&[ConfigRecord::int("skip_frames", 1)]).unwrap();
        grabber.start().unwrap();

        assert_eq!(grabber.call(()).unwrap().data[0], 2);
        assert_eq!(grabber.call(()).unwrap().data[0], 4);
        assert!(matches!(grabber.call(()), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn rate_limit_spaces_frames() {
        let mut grabber = grabber(&[1, 2, 3]);
        grabber.configure(&[ConfigRecord::float("max_fps", 20.0)]).unwrap();
        grabber.start().unwrap();

        let started = Instant::now();
        for _ in 0..3 {
            grabber.call(()).unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(95));
    }
}
