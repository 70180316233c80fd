//! Procedures: the per-camera processing loops run by the task manager.

mod recorder;
mod standard;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::Deserialize;
use video_ingest::{FfmpegOptions, FrameSource, ImageSequence, ffmpeg_source};

use crate::{
    blackboard::{Blackboard, PendingConfig},
    config::ConfigParameter,
    descriptors::CameraDescriptor,
    error::{ConfigError, PipelineError},
    operator::{Operator, Schema, Stage},
    operators::{ChangeDetector, CustomChangeDetector, MotionDetector},
    registry::{Kwargs, Registry, parse_kwargs},
    tasks::AbortHandle,
    watchdog::Heartbeat,
};

pub use recorder::DebugRecorder;
pub use standard::StandardProcedure;

/// Declared parameters of every operator a procedure runs, keyed by operator name.
pub type ConfigSchema = BTreeMap<String, Vec<ConfigParameter>>;

/// Everything a procedure needs for one run.
pub struct RunContext<'a> {
    pub camera: &'a CameraDescriptor,
    pub board: Arc<dyn Blackboard>,
    pub registries: &'a Registries,
    pub abort: AbortHandle,
    pub heartbeat: Heartbeat,
}

pub trait Procedure: Send {
    fn name(&self) -> &'static str;

    fn get_config(&self, registries: &Registries) -> Result<ConfigSchema, ConfigError>;

    /// Run until aborted or until the source faults. Stages are torn down on every exit path.
    fn run(&mut self, ctx: RunContext<'_>) -> Result<(), PipelineError>;
}

/// Factory tables for everything built from JSON descriptors.
pub struct Registries {
    pub sources: Registry<Box<dyn FrameSource>>,
    pub detectors: Registry<Box<dyn ChangeDetector>>,
    pub procedures: Registry<Box<dyn Procedure>>,
}

impl Default for Registries {
    fn default() -> Self {
        let mut registries = Self::empty();
        registries.register_defaults();
        registries
    }
}

#[derive(Deserialize)]
struct SequenceArgs {
    dir: PathBuf,
    #[serde(default, alias = "loop")]
    looped: bool,
    #[serde(default)]
    fps: Option<f64>,
}

#[derive(Deserialize)]
struct VideoFileArgs {
    path: String,
    #[serde(default, alias = "loop")]
    looped: bool,
    #[serde(default = "default_video_fps")]
    fps: f64,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

#[derive(Deserialize)]
struct UsbCamArgs {
    #[serde(default = "default_device")]
    device: String,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
    #[serde(default = "default_camera_fps")]
    fps: f64,
    #[serde(default)]
    input_format: Option<String>,
}

fn default_video_fps() -> f64 {
    15.0
}

fn default_camera_fps() -> f64 {
    30.0
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_device() -> String {
    "/dev/video0".to_string()
}

impl Registries {
    /// Registries without any factory, for callers wiring their own.
    pub fn empty() -> Self {
        Self {
            sources: Registry::new("frame source"),
            detectors: Registry::new("change detector"),
            procedures: Registry::new("procedure"),
        }
    }

    fn register_defaults(&mut self) {
        self.sources
            .register("ImageSequence", |kwargs| {
                let args: SequenceArgs = parse_kwargs("ImageSequence", kwargs)?;
                Ok(Box::new(ImageSequence::new(args.dir, args.looped, args.fps)) as Box<dyn FrameSource>)
            })
            .register("VideoFile", |kwargs| {
                let args: VideoFileArgs = parse_kwargs("VideoFile", kwargs)?;
                Ok(Box::new(ffmpeg_source(FfmpegOptions {
                    uri: args.path,
                    width: args.width,
                    height: args.height,
                    looped: args.looped,
                    fps: Some(args.fps),
                    input_format: None,
                })) as Box<dyn FrameSource>)
            })
            .register("UsbCam", |kwargs| {
                let args: UsbCamArgs = parse_kwargs("UsbCam", kwargs)?;
                Ok(usb_camera(args))
            });

        self.detectors
            .register(MotionDetector::NAME, |_| {
                Ok(Box::new(MotionDetector::default()) as Box<dyn ChangeDetector>)
            })
            .register(CustomChangeDetector::NAME, |_| {
                Ok(Box::new(CustomChangeDetector::default()) as Box<dyn ChangeDetector>)
            });

        self.procedures
            .register(StandardProcedure::NAME, |kwargs| {
                Ok(Box::new(StandardProcedure::from_kwargs(kwargs)?) as Box<dyn Procedure>)
            })
            .register(DebugRecorder::NAME, |kwargs| {
                Ok(Box::new(DebugRecorder::from_kwargs(kwargs)?) as Box<dyn Procedure>)
            });
    }

    /// Build a change detector by tag, with no arguments.
    pub fn detector(&self, tag: &str) -> Result<Box<dyn ChangeDetector>, ConfigError> {
        self.detectors.build_tagged(tag, Kwargs::new())
    }
}

#[cfg(feature = "with-opencv")]
fn usb_camera(args: UsbCamArgs) -> Box<dyn FrameSource> {
    Box::new(video_ingest::opencv_camera_source(
        &args.device,
        (args.width, args.height),
        args.fps,
    ))
}

#[cfg(not(feature = "with-opencv"))]
fn usb_camera(args: UsbCamArgs) -> Box<dyn FrameSource> {
    Box::new(ffmpeg_source(FfmpegOptions {
        uri: args.device,
        width: args.width,
        height: args.height,
        looped: false,
        fps: Some(args.fps),
        input_format: args.input_format,
    }))
}

/// Apply the initial configuration a camera descriptor carries for `stage`.
pub(crate) fn configure_initial<O: Operator>(
    stage: &mut Stage<O>,
    camera: &CameraDescriptor,
) -> Result<(), ConfigError> {
    match camera.op_configs.get(stage.name()) {
        Some(records) => stage.configure(records),
        None => Ok(()),
    }
}

/// Hand each stage the records queued for it.
pub(crate) fn dispatch_config<O: Operator>(stage: &mut Stage<O>, pending: &mut PendingConfig) {
    if let Some(records) = pending.remove(stage.name()) {
        stage.queue_config(records);
    }
}

pub(crate) fn schema_entry<S: Schema>(schema: &mut ConfigSchema) {
    schema.insert(S::NAME.to_string(), S::schema());
}
