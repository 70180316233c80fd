//! Frame acquisition for the dart detection pipelines.
//!
//! Every concrete input (image sequences, in-memory replays, ffmpeg-decoded
//! video files or devices, OpenCV cameras) is exposed through the
//! [`FrameSource`] capability so pipelines never care where frames come from.

#[cfg(feature = "with-opencv")]
pub mod camera;
pub mod ffmpeg;
pub mod replay;
pub mod sequence;
pub mod source;
pub mod types;

#[cfg(feature = "with-opencv")]
pub use camera::opencv_camera_source;
pub use ffmpeg::{FfmpegOptions, ffmpeg_source};
pub use replay::Replay;
pub use sequence::ImageSequence;
pub use source::{ChannelSource, FrameReceiver, FrameSource};
pub use types::{CaptureError, Frame, FrameFormat, ImageSize};

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}
