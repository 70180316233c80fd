//! OpenCV-backed camera capture.

use std::thread;

use chrono::Utc;
use crossbeam_channel::{Sender, bounded};
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};

use crate::{
    parse_device_index,
    source::{ChannelSource, FrameReceiver},
    types::{CaptureError, Frame, FrameFormat, ImageSize},
};

/// Camera source reading `uri` through OpenCV, resized to `target_size` (width, height).
pub fn opencv_camera_source(uri: &str, target_size: (u32, u32), fps: f64) -> ChannelSource {
    let uri = uri.to_string();
    let size = ImageSize {
        height: target_size.1,
        width: target_size.0,
        channels: 3,
    };
    ChannelSource::new(uri.clone(), Some(size), move || {
        spawn_camera_reader(&uri, target_size, fps)
    })
}

fn spawn_camera_reader(
    uri: &str,
    target_size: (u32, u32),
    fps: f64,
) -> Result<FrameReceiver, CaptureError> {
    let (tx, rx) = bounded(2);
    let uri = uri.to_string();

    thread::Builder::new()
        .name("opencv-reader".into())
        .spawn(move || {
            if let Err(err) = capture_loop(&uri, target_size, fps, tx.clone()) {
                let _ = tx.send(Err(err));
            }
        })?;

    Ok(rx)
}

fn capture_loop(
    uri: &str,
    target_size: (u32, u32),
    fps: f64,
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let mut cap = open_video_capture(uri)?;
    configure_camera(&mut cap, target_size, fps);

    let mut frame = Mat::default();
    let mut scratch = Mat::default();
    let (target_w, target_h) = (target_size.0 as i32, target_size.1 as i32);

    loop {
        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(CaptureError::EndOfStream);
        }

        let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 {
            continue;
        }

        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &frame,
                &mut scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &scratch
        } else {
            &frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        let frame = Frame::new(
            data,
            target_size.0,
            target_size.1,
            FrameFormat::Bgr8,
            Utc::now().timestamp_millis(),
        )?;
        if tx.send(Ok(frame)).is_err() {
            break;
        }
    }

    Ok(())
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    tracing::warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    match VideoCapture::from_file(uri, videoio::CAP_ANY) {
        Ok(cap) => {
            if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                return Ok(cap);
            }
        }
        Err(err) => tracing::warn!("failed to open {uri}: {err}"),
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply resolution, frame rate and preferred pixel format.
fn configure_camera(cap: &mut VideoCapture, target_size: (u32, u32), fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
