use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::anyhow;
use chrono::Utc;
use crossbeam_channel::{Sender, bounded};

use crate::{
    parse_device_index,
    source::{ChannelSource, FrameReceiver},
    types::{CaptureError, Frame, FrameFormat, ImageSize},
};

/// How an ffmpeg child process should decode a file, stream, or V4L device.
#[derive(Clone, Debug)]
pub struct FfmpegOptions {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    /// Restart a file from the beginning when it ends.
    pub looped: bool,
    /// Output frame rate cap; `None` keeps the input rate.
    pub fps: Option<f64>,
    /// Optional V4L input format such as `mjpeg`.
    pub input_format: Option<String>,
}

impl FfmpegOptions {
    fn command(&self) -> Command {
        let (is_v4l, input) = match parse_device_index(&self.uri) {
            Some(index) => (true, format!("/dev/video{index}")),
            None => (false, self.uri.clone()),
        };

        let mut filters = format!("scale={}:{}", self.width, self.height);
        if let Some(fps) = self.fps.filter(|fps| *fps > 0.0) {
            filters.push_str(&format!(",fps={fps}"));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        if is_v4l {
            cmd.arg("-f").arg("video4linux2");
            if let Some(format) = &self.input_format {
                cmd.arg("-input_format").arg(format);
            }
        } else {
            // Pace file playback at its native rate instead of decoding as fast as possible.
            cmd.arg("-re");
            if self.looped {
                cmd.arg("-stream_loop").arg("-1");
            }
        }

        cmd.arg("-i")
            .arg(&input)
            .arg("-an")
            .arg("-vf")
            .arg(&filters)
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd
    }
}

/// Build a [`ChannelSource`] that decodes `options.uri` through an ffmpeg child process.
pub fn ffmpeg_source(options: FfmpegOptions) -> ChannelSource {
    let size = ImageSize {
        height: options.height,
        width: options.width,
        channels: 3,
    };
    let label = options.uri.clone();
    ChannelSource::new(label, Some(size), move || {
        spawn_ffmpeg_reader(options.command(), (options.width, options.height), 2)
    })
}

fn spawn_ffmpeg_reader(
    mut cmd: Command,
    target_size: (u32, u32),
    queue_size: usize,
) -> Result<FrameReceiver, CaptureError> {
    let (tx, rx) = bounded(queue_size);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    thread::Builder::new()
        .name("ffmpeg-reader".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, child, target_size, tx.clone()) {
                let _ = tx.send(Err(err));
            }
        })?;

    Ok(rx)
}

fn ffmpeg_loop(
    mut stdout: impl Read,
    mut child: Child,
    target_size: (u32, u32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let frame_bytes = target_size.0 as usize * target_size.1 as usize * 3;
    let mut buffer = vec![0u8; frame_bytes];
    let mut result = Ok(());

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let frame = Frame {
                    data: buffer.clone(),
                    width: target_size.0,
                    height: target_size.1,
                    timestamp_ms: Utc::now().timestamp_millis(),
                    format: FrameFormat::Rgb8,
                };
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                result = Err(CaptureError::EndOfStream);
                break;
            }
            Err(err) => {
                result = Err(CaptureError::Io(err));
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    result
}
