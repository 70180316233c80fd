//! Multi-camera dart detection core.
//!
//! Camera pipelines ([`procedure`]) chain stateful [`operators`] over frames
//! from a `video_ingest` source and publish every intermediate result to a
//! shared [`blackboard`]. Per dartboard, a [`collector`] fuses the camera
//! verdicts into one consensus result. [`tasks::TaskManager`] runs both on
//! their own threads with cooperative cancellation.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod blackboard;
pub mod collector;
pub mod config;
pub mod dartboard;
pub mod descriptors;
pub mod error;
pub mod geometry;
pub mod homography;
pub mod imgproc;
pub mod messages;
pub mod operator;
pub mod operators;
pub mod procedure;
pub mod registry;
pub mod tasks;
pub mod telemetry;
pub mod watchdog;

pub use blackboard::{Blackboard, MemoryBlackboard};
pub use collector::{Collector, CollectorSettings, ConsensusTracker};
pub use config::{ConfigParameter, ConfigRecord, ConfigSet};
pub use dartboard::{DartboardModel, Score};
pub use descriptors::{CameraDescriptor, DartboardDescriptor};
pub use error::{BlackboardError, CalibrationError, ConfigError, PipelineError};
pub use messages::{Class, ClassificationResult, ConsensusResult, DartThrow};
pub use procedure::{ConfigSchema, Procedure, Registries};
pub use tasks::{AbortHandle, TaskId, TaskManager, TaskState};
