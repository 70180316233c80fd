//! The operator contract and the uniform invocation wrapper.
//!
//! Every processing step of a pipeline is an [`Operator`] with a typed
//! [`Call`] implementation. Pipelines never call operators directly; they go
//! through a [`Stage`], which applies pending configuration, invokes the
//! operator and publishes its output under `cam_{camera}_{Operator}`.

use std::{sync::Arc, time::Instant};

use image::{GrayImage, RgbImage};
use serde_json::json;
use tracing::{error, trace};
use video_ingest::Frame;

use crate::{
    blackboard::{Blackboard, Payload, operator_key},
    config::{ConfigParameter, ConfigRecord, ConfigSet},
    error::{ConfigError, PipelineError},
    imgproc::count_nonzero,
    messages::{Class, ClassificationResult},
};

/// Static description of an operator type.
pub trait Schema {
    const NAME: &'static str;

    /// Declared parameters with their defaults, independent of any instance.
    fn schema() -> Vec<ConfigParameter>;

    fn config_set() -> ConfigSet {
        ConfigSet::new(Self::NAME, Self::schema())
    }
}

pub trait Operator: Send {
    fn name(&self) -> &'static str;

    fn params(&self) -> &ConfigSet;

    fn params_mut(&mut self) -> &mut ConfigSet;

    fn get_config(&self) -> Vec<ConfigParameter> {
        self.params().get_config()
    }

    /// Validate and apply `records`; nothing changes if any record is invalid.
    fn configure(&mut self, records: &[ConfigRecord]) -> Result<(), ConfigError> {
        if self.params_mut().configure(records)? > 0 {
            self.on_configured();
        }
        Ok(())
    }

    /// Called after live parameters changed.
    fn on_configured(&mut self) {}

    /// Drop accumulated history and rebase on `frame`.
    fn reset(&mut self, _frame: &Frame) {}

    /// Release held resources. Must be idempotent.
    fn teardown(&mut self) {}
}

/// Typed invocation of an operator.
pub trait Call<I>: Operator {
    type Output: Publish;

    fn call(&mut self, input: I) -> Self::Output;
}

/// How an operator output appears on the blackboard. `None` skips publication.
pub trait Publish {
    fn payload(&self) -> Option<Payload>;
}

/// Masks are published only when something is set.
impl Publish for GrayImage {
    fn payload(&self) -> Option<Payload> {
        if count_nonzero(self) == 0 {
            return None;
        }
        Some(Payload::Array {
            height: self.height(),
            width: self.width(),
            channels: 1,
            data: self.as_raw().clone(),
        })
    }
}

impl Publish for RgbImage {
    fn payload(&self) -> Option<Payload> {
        Some(Payload::Array {
            height: self.height(),
            width: self.width(),
            channels: 3,
            data: self.as_raw().clone(),
        })
    }
}

impl Publish for Frame {
    fn payload(&self) -> Option<Payload> {
        None
    }
}

impl Publish for () {
    fn payload(&self) -> Option<Payload> {
        None
    }
}

impl Publish for f64 {
    fn payload(&self) -> Option<Payload> {
        Some(Payload::Json(json!(self)))
    }
}

impl Publish for Class {
    fn payload(&self) -> Option<Payload> {
        serde_json::to_value(self).ok().map(Payload::Json)
    }
}

impl Publish for ClassificationResult {
    fn payload(&self) -> Option<Payload> {
        serde_json::to_value(self).ok().map(Payload::Json)
    }
}

impl<T: Publish> Publish for Option<T> {
    fn payload(&self) -> Option<Payload> {
        self.as_ref().and_then(Publish::payload)
    }
}

impl<T: Publish, E> Publish for Result<T, E> {
    fn payload(&self) -> Option<Payload> {
        self.as_ref().ok().and_then(Publish::payload)
    }
}

/// One operator bound to a camera and its blackboard.
pub struct Stage<O> {
    op: O,
    camera: String,
    key: String,
    board: Option<Arc<dyn Blackboard>>,
    pending: Vec<ConfigRecord>,
}

impl<O: Operator> Stage<O> {
    pub fn new(op: O, camera: &str, board: Arc<dyn Blackboard>) -> Self {
        let key = operator_key(camera, op.name());
        Self {
            op,
            camera: camera.to_string(),
            key,
            board: Some(board),
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    pub fn op(&self) -> &O {
        &self.op
    }

    pub fn op_mut(&mut self) -> &mut O {
        &mut self.op
    }

    /// Queue records for the next invocation.
    pub fn queue_config(&mut self, records: Vec<ConfigRecord>) {
        self.pending.extend(records);
    }

    /// Apply records immediately, reporting validation failures to the caller.
    pub fn configure(&mut self, records: &[ConfigRecord]) -> Result<(), ConfigError> {
        self.op.configure(records)
    }

    pub fn reset(&mut self, frame: &Frame) {
        self.op.reset(frame);
    }

    /// Apply pending configuration, run the operator and publish its output.
    pub fn call<I>(&mut self, input: I) -> Result<O::Output, PipelineError>
    where
        O: Call<I>,
    {
        self.apply_pending();

        let started = Instant::now();
        let output = self.op.call(input);
        metrics::histogram!(
            "dartvision_stage_latency_seconds",
            "operator" => self.op.name()
        )
        .record(started.elapsed().as_secs_f64());

        if let (Some(board), Some(payload)) = (self.board.as_ref(), output.payload()) {
            board.set(&self.key, payload.encode()?)?;
            trace!(key = %self.key, "published operator output");
        }
        Ok(output)
    }

    fn apply_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.pending);
        // A rejected batch is dropped; the stage keeps running on its current values.
        if let Err(err) = self.op.configure(&records) {
            error!(
                camera = %self.camera,
                operator = self.op.name(),
                "rejected configuration update: {err}"
            );
        }
    }

    /// Tear the operator down and stop publishing.
    pub fn teardown(&mut self) {
        self.op.teardown();
        self.board = None;
    }
}
