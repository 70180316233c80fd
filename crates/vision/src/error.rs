use thiserror::Error;
use video_ingest::CaptureError;

/// Rejected configuration: bad records, bad registry specs, bad descriptors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter {name:?} is declared as {expected} but the record is {actual}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("parameter {name:?} value {value} is outside [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: String,
        min: String,
        max: String,
    },
    #[error("parameter {name:?} value {value:?} is not one of {allowed:?}")]
    NotAllowed {
        name: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("no {kind} registered under type {tag:?}")]
    UnknownType { kind: &'static str, tag: String },
    #[error("{kind} spec must be a mapping with a \"type\" key, got {spec}")]
    MalformedSpec { kind: &'static str, spec: String },
    #[error("invalid arguments for {tag}: {source}")]
    InvalidArguments {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Problems mapping calibration labels or fitting the board homography.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("Wrong format: {0:?}")]
    WrongFormat(String),
    #[error("Out of range: {0:?}")]
    OutOfRange(String),
    #[error("Invalid label: {0:?}")]
    InvalidLabel(String),
    #[error("need at least {needed} calibration points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("homography estimation failed: {0}")]
    Degenerate(String),
}

#[derive(Debug, Error)]
pub enum BlackboardError {
    #[error("blackboard lock poisoned")]
    Poisoned,
    #[error("malformed array payload under {key:?}: {reason}")]
    MalformedArray { key: String, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything that can end a pipeline or collector run early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("frame source fault: {0}")]
    Source(#[from] CaptureError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Blackboard(#[from] BlackboardError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
