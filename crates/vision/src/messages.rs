use serde::{Deserialize, Serialize};

/// Coarse verdict of one camera or of the whole board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Class {
    None,
    Hand,
    Dart,
}

/// Details of a scored dart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DartThrow {
    /// Score label such as `"T 20"` or `"D BULL"`.
    pub score: String,
    pub value: u32,
    /// In `(0, 1]`; lower when the homography stretches the tip neighbourhood.
    pub confidence: f64,
    /// Tip position on the board model, in millimetres.
    pub point: [f64; 2],
}

/// Message published by a camera pipeline and, fused, by the collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "result")]
pub struct ClassificationResult {
    pub class: Class,
    #[serde(default)]
    pub content: Option<DartThrow>,
}

/// The board-level verdict has the same shape as a camera verdict.
pub type ConsensusResult = ClassificationResult;

impl ClassificationResult {
    pub fn bare(class: Class) -> Self {
        Self {
            class,
            content: None,
        }
    }

    pub fn dart(throw: DartThrow) -> Self {
        Self {
            class: Class::Dart,
            content: Some(throw),
        }
    }
}
