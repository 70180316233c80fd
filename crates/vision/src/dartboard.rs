//! Fixed geometric model of a standard dartboard, in millimetres from the centre.
//!
//! +y points at the 20 segment, +x at the 6 segment.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

pub const OUTER_DOUBLE_RING: f64 = 170.0;
pub const INNER_DOUBLE_RING: f64 = 162.0;
pub const OUTER_TRIPLE_RING: f64 = 107.0;
pub const INNER_TRIPLE_RING: f64 = 99.0;
pub const BULL: f64 = 15.9;
pub const DOUBLE_BULL: f64 = 6.35;

const START_DEGREE: f64 = 9.0;
const SEGMENT_DEGREES: f64 = 18.0;
/// Segment numbers clockwise, starting at the top.
pub const SEGMENTS: [u32; 20] = [
    20, 1, 18, 4, 13, 6, 10, 15, 2, 17, 3, 19, 7, 16, 8, 11, 14, 9, 12, 5,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ring {
    Miss,
    Double,
    Triple,
    Single,
    Bull,
    DoubleBull,
}

/// A scored location: the ring it landed in and the segment number under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Score {
    pub ring: Ring,
    pub segment: u32,
}

impl Score {
    /// `"T 20"`, `"M 5"`, `"BULL"`, `"D BULL"`, ...
    pub fn label(&self) -> String {
        match self.ring {
            Ring::Miss => format!("M {}", self.segment),
            Ring::Double => format!("D {}", self.segment),
            Ring::Triple => format!("T {}", self.segment),
            Ring::Single => format!("S {}", self.segment),
            Ring::Bull => "BULL".to_string(),
            Ring::DoubleBull => "D BULL".to_string(),
        }
    }

    pub fn value(&self) -> u32 {
        match self.ring {
            Ring::Miss => 0,
            Ring::Double => 2 * self.segment,
            Ring::Triple => 3 * self.segment,
            Ring::Single => self.segment,
            Ring::Bull => 25,
            Ring::DoubleBull => 50,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DartboardModel;

impl DartboardModel {
    /// Point where the boundary between adjacent segments `a` and `b` meets the outer
    /// double ring. `label` has the form `"a | b"`.
    pub fn get_outer_point(&self, label: &str) -> Result<[f64; 2], CalibrationError> {
        let (a, b) = parse_label(label)?;
        let index = |n: u32| SEGMENTS.iter().position(|s| *s == n);
        let (Some(a_idx), Some(b_idx)) = (index(a), index(b)) else {
            return Err(CalibrationError::OutOfRange(label.to_string()));
        };
        let len = SEGMENTS.len();
        let boundary = if (a_idx + 1) % len == b_idx {
            a_idx
        } else if (a_idx + len - 1) % len == b_idx {
            b_idx
        } else {
            return Err(CalibrationError::InvalidLabel(label.to_string()));
        };
        let radians = (START_DEGREE + SEGMENT_DEGREES * boundary as f64).to_radians();
        Ok([
            OUTER_DOUBLE_RING * radians.sin(),
            OUTER_DOUBLE_RING * radians.cos(),
        ])
    }

    pub fn get_score(&self, point: [f64; 2]) -> Score {
        let [x, y] = point;
        let distance = x.hypot(y);
        let degree = x.atan2(y).to_degrees().rem_euclid(360.0);
        let sector = ((degree + START_DEGREE) / SEGMENT_DEGREES) as usize % SEGMENTS.len();
        let segment = SEGMENTS[sector];

        let ring = if distance > OUTER_DOUBLE_RING {
            Ring::Miss
        } else if distance > INNER_DOUBLE_RING {
            Ring::Double
        } else if distance > INNER_TRIPLE_RING && distance < OUTER_TRIPLE_RING {
            Ring::Triple
        } else if distance > DOUBLE_BULL && distance < BULL {
            Ring::Bull
        } else if distance < DOUBLE_BULL {
            Ring::DoubleBull
        } else {
            Ring::Single
        };
        Score { ring, segment }
    }
}

fn parse_label(label: &str) -> Result<(u32, u32), CalibrationError> {
    let wrong_format = || CalibrationError::WrongFormat(label.to_string());
    let (a, b) = label.split_once(" | ").ok_or_else(wrong_format)?;
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if !is_number(a) || !is_number(b) {
        return Err(wrong_format());
    }
    let parse = |s: &str| {
        s.parse::<u32>()
            .ok()
            .filter(|n| (1..=20).contains(n))
            .ok_or_else(|| CalibrationError::OutOfRange(label.to_string()))
    };
    Ok((parse(a)?, parse(b)?))
}
