use crossbeam_channel::Receiver;

use crate::types::{CaptureError, Frame, ImageSize};

/// Channel end handed out by the threaded readers.
pub type FrameReceiver = Receiver<Result<Frame, CaptureError>>;

/// Anything that produces frames for a pipeline.
///
/// `get_frame` blocks until a complete frame is available. End of stream and
/// device faults are reported as errors; a source never yields a partial frame.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Release the underlying device. Must be safe to call more than once.
    fn stop(&mut self);

    fn get_frame(&mut self) -> Result<Frame, CaptureError>;

    /// `(height, width, channels)` of the produced frames, once known.
    fn image_size(&self) -> Option<ImageSize>;
}

type SpawnFn = Box<dyn FnMut() -> Result<FrameReceiver, CaptureError> + Send>;

/// Source backed by a reader thread that pushes frames into a bounded channel.
///
/// Stopping drops the receiver; the reader notices the closed channel on its
/// next send and shuts its device down.
pub struct ChannelSource {
    label: String,
    spawn: SpawnFn,
    rx: Option<FrameReceiver>,
    size: Option<ImageSize>,
}

impl ChannelSource {
    pub fn new<F>(label: impl Into<String>, size: Option<ImageSize>, spawn: F) -> Self
    where
        F: FnMut() -> Result<FrameReceiver, CaptureError> + Send + 'static,
    {
        Self {
            label: label.into(),
            spawn: Box::new(spawn),
            rx: None,
            size,
        }
    }
}

impl FrameSource for ChannelSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.rx.is_none() {
            tracing::debug!(source = %self.label, "starting threaded frame reader");
            self.rx = Some((self.spawn)()?);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!(source = %self.label, "stopped threaded frame reader");
        }
    }

    fn get_frame(&mut self) -> Result<Frame, CaptureError> {
        let rx = self.rx.as_ref().ok_or(CaptureError::NotStarted)?;
        let frame = rx.recv().map_err(|_| CaptureError::EndOfStream)??;
        self.size = Some(frame.size());
        Ok(frame)
    }

    fn image_size(&self) -> Option<ImageSize> {
        self.size
    }
}
