use std::collections::VecDeque;

use crate::{
    config::{ConfigParameter, ConfigSet},
    messages::Class,
    operator::{Call, Operator, Schema},
};

const DART_MIN: &str = "dart_min";
const DART_MAX: &str = "dart_max";
const HAND_MIN: &str = "hand_min";
const HAND_MAX: &str = "hand_max";
const HISTORY: usize = 15;

/// Classifies a change region by its area ratio.
///
/// A dart is only reported when no hand was seen in the last 15 frames, which
/// suppresses the tail of a hand pulling darts out of the board.
pub struct SizeClassifier {
    params: ConfigSet,
    history: VecDeque<Class>,
}

impl Schema for SizeClassifier {
    const NAME: &'static str = "SizeClassifier";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::float(DART_MIN, 0.005, 0.0, 1.0),
            ConfigParameter::float(DART_MAX, 0.1, 0.0, 1.0),
            ConfigParameter::float(HAND_MIN, 0.3, 0.0, 1.0),
            ConfigParameter::float(HAND_MAX, 1.0, 0.0, 1.0),
        ]
    }
}

impl Default for SizeClassifier {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            history: VecDeque::with_capacity(HISTORY),
        }
    }
}

impl SizeClassifier {
    fn band(&self, min: &str, max: &str, fallback: (f64, f64)) -> (f64, f64) {
        (
            self.params.float(min).unwrap_or(fallback.0),
            self.params.float(max).unwrap_or(fallback.1),
        )
    }
}

impl Operator for SizeClassifier {
    config_accessors!();
}

impl Call<f64> for SizeClassifier {
    type Output = Class;

    fn call(&mut self, ratio: f64) -> Class {
        let (hand_min, hand_max) = self.band(HAND_MIN, HAND_MAX, (0.3, 1.0));
        let (dart_min, dart_max) = self.band(DART_MIN, DART_MAX, (0.005, 0.1));

        let class = if hand_min <= ratio && ratio <= hand_max {
            Class::Hand
        } else if dart_min <= ratio
            && ratio <= dart_max
            && !self.history.contains(&Class::Hand)
        {
            Class::Dart
        } else {
            Class::None
        };

        if self.history.len() == HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(class);
        class
    }
}
