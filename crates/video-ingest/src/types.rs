use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use thiserror::Error;

/// Pixel layout of the bytes carried by a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Gray8,
    Rgb8,
    Bgr8,
}

impl FrameFormat {
    pub fn channels(self) -> u32 {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Rgb8 | FrameFormat::Bgr8 => 3,
        }
    }
}

/// Shape reported by a frame source, `(height, width, channels)` ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

/// Raw 8-bit frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Wrap raw bytes, rejecting buffers that do not hold exactly one frame.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * format.channels() as usize;
        if data.len() != expected {
            return Err(CaptureError::Truncated {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format,
        })
    }

    pub fn from_gray(image: GrayImage, timestamp_ms: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Gray8,
        }
    }

    pub fn from_rgb(image: RgbImage, timestamp_ms: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Rgb8,
        }
    }

    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    pub fn size(&self) -> ImageSize {
        ImageSize {
            height: self.height,
            width: self.width,
            channels: self.channels(),
        }
    }

    /// Luma conversion with the usual 0.299/0.587/0.114 weights.
    pub fn to_gray(&self) -> GrayImage {
        match self.format {
            FrameFormat::Gray8 => {
                ImageBuffer::from_fn(self.width, self.height, |x, y| {
                    Luma([self.data[self.index(x, y)]])
                })
            }
            FrameFormat::Rgb8 | FrameFormat::Bgr8 => {
                ImageBuffer::from_fn(self.width, self.height, |x, y| {
                    let [r, g, b] = self.rgb_at(x, y);
                    let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
                    Luma([luma.min(255) as u8])
                })
            }
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| Rgb(self.rgb_at(x, y)))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels() as usize
    }

    fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y);
        match self.format {
            FrameFormat::Gray8 => [self.data[i]; 3],
            FrameFormat::Rgb8 => [self.data[i], self.data[i + 1], self.data[i + 2]],
            FrameFormat::Bgr8 => [self.data[i + 2], self.data[i + 1], self.data[i]],
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source is not started")]
    NotStarted,
    #[error("video source reached the end of the stream")]
    EndOfStream,
    #[error("short frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffers_are_rejected() {
        let err = Frame::new(vec![0; 11], 2, 2, FrameFormat::Rgb8, 0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Truncated {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn bgr_frames_convert_to_rgb_and_gray() {
        let frame = Frame::new(vec![255, 0, 0], 1, 1, FrameFormat::Bgr8, 0).unwrap();
        assert_eq!(frame.to_rgb().get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(frame.to_gray().get_pixel(0, 0).0, [29]);
        assert_eq!(
            frame.size(),
            ImageSize {
                height: 1,
                width: 1,
                channels: 3
            }
        );
    }
}
