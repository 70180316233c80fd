use crate::{
    source::FrameSource,
    types::{CaptureError, Frame, ImageSize},
};

/// Replays frames held in memory, optionally forever.
pub struct Replay {
    frames: Vec<Frame>,
    cursor: usize,
    looped: bool,
    started: bool,
}

impl Replay {
    pub fn new(frames: Vec<Frame>, looped: bool) -> Self {
        Self {
            frames,
            cursor: 0,
            looped,
            started: false,
        }
    }
}

impl FrameSource for Replay {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn get_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }
        if self.cursor >= self.frames.len() {
            if !self.looped || self.frames.is_empty() {
                return Err(CaptureError::EndOfStream);
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Ok(frame)
    }

    fn image_size(&self) -> Option<ImageSize> {
        self.frames.first().map(Frame::size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameFormat;

    fn gray(value: u8) -> Frame {
        Frame::new(vec![value; 4], 2, 2, FrameFormat::Gray8, 0).unwrap()
    }

    #[test]
    fn looped_replay_wraps_around() {
        let mut replay = Replay::new(vec![gray(1), gray(2)], true);
        replay.start().unwrap();
        let values: Vec<u8> = (0..5).map(|_| replay.get_frame().unwrap().data[0]).collect();
        assert_eq!(values, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn finite_replay_ends() {
        let mut replay = Replay::new(vec![gray(1)], false);
        replay.start().unwrap();
        replay.get_frame().unwrap();
        assert!(matches!(replay.get_frame(), Err(CaptureError::EndOfStream)));
    }
}
