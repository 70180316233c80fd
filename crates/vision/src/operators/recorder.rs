use std::path::{Path, PathBuf};

use image::ImageError;
use tracing::debug;
use video_ingest::Frame;

use crate::{
    config::{ConfigParameter, ConfigSet},
    operator::{Call, Operator, Schema},
};

const EVERY_N: &str = "every_n";

/// Dumps frames as numbered PNGs for offline debugging.
///
/// The recordings can be fed back through an `ImageSequence` source.
pub struct FrameRecorder {
    params: ConfigSet,
    dir: PathBuf,
    seen: u64,
    written: u64,
}

impl Schema for FrameRecorder {
    const NAME: &'static str = "FrameRecorder";

    fn schema() -> Vec<ConfigParameter> {
        vec![ConfigParameter::int(EVERY_N, 1, 1, 1000).describe("keep every n-th frame")]
    }
}

impl FrameRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            params: Self::config_set(),
            dir: dir.into(),
            seen: 0,
            written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Operator for FrameRecorder {
    config_accessors!();
}

impl<'a> Call<&'a Frame> for FrameRecorder {
    type Output = Result<(), ImageError>;

    fn call(&mut self, frame: &'a Frame) -> Result<(), ImageError> {
        let every = self.params.int(EVERY_N).unwrap_or(1).max(1) as u64;
        let index = self.seen;
        self.seen += 1;
        if index % every != 0 {
            return Ok(());
        }

        if self.written == 0 {
            std::fs::create_dir_all(&self.dir).map_err(ImageError::IoError)?;
        }
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame.to_rgb().save(&path)?;
        self.written += 1;
        debug!(path = %path.display(), "recorded frame");
        Ok(())
    }
}
