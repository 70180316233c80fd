use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;

use crate::{
    source::FrameSource,
    types::{CaptureError, Frame, ImageSize},
};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Reads a directory of still images in lexical order, like a slow video.
pub struct ImageSequence {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    looped: bool,
    frame_interval: Option<Duration>,
    last_emit: Option<Instant>,
    size: Option<ImageSize>,
    started: bool,
}

impl ImageSequence {
    /// `fps` of zero (or `None`) disables pacing.
    pub fn new(dir: impl Into<PathBuf>, looped: bool, fps: Option<f64>) -> Self {
        let frame_interval = fps
            .filter(|fps| *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps));
        Self {
            dir: dir.into(),
            paths: Vec::new(),
            cursor: 0,
            looped,
            frame_interval,
            last_emit: None,
            size: None,
            started: false,
        }
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_emit) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for ImageSequence {
    fn start(&mut self) -> Result<(), CaptureError> {
        let paths = Self::list_images(&self.dir)?;
        if paths.is_empty() {
            return Err(CaptureError::Open {
                uri: self.dir.display().to_string(),
            });
        }
        tracing::debug!(dir = %self.dir.display(), images = paths.len(), "image sequence opened");
        self.paths = paths;
        self.cursor = 0;
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
        if self.cursor >= self.paths.len() {
            if !self.looped {
                return Err(CaptureError::EndOfStream);
            }
            self.cursor = 0;
        }
        let image = image::open(&self.paths[self.cursor])?.to_rgb8();
        self.cursor += 1;
        self.pace();

        let frame = Frame::from_rgb(image, Utc::now().timestamp_millis());
        self.size = Some(frame.size());
        Ok(frame)
    }

    fn image_size(&self) -> Option<ImageSize> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("video-ingest-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sequence_reads_images_in_order_and_loops() {
        let dir = scratch_dir("loop");
        for (i, value) in [10u8, 20, 30].iter().enumerate() {
            RgbImage::from_pixel(4, 3, Rgb([*value; 3]))
                .save(dir.join(format!("{i:03}.png")))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequence::new(&dir, true, None);
        source.start().unwrap();
        let values: Vec<u8> = (0..4).map(|_| source.get_frame().unwrap().data[0]).collect();
        assert_eq!(values, vec![10, 20, 30, 10]);
        assert_eq!(
            source.image_size(),
            Some(ImageSize {
                height: 3,
                width: 4,
                channels: 3
            })
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = scratch_dir("empty");
        let mut source = ImageSequence::new(&dir, false, Some(15.0));
        assert!(matches!(source.start(), Err(CaptureError::Open { .. })));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
