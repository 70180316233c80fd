use serde_json::json;

use crate::{
    blackboard::Payload,
    config::{ConfigParameter, ConfigSet},
    dartboard::{DartboardModel, Score},
    operator::{Call, Operator, Publish, Schema},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreOutput {
    pub score: Score,
    pub confidence: f64,
}

impl Publish for ScoreOutput {
    fn payload(&self) -> Option<Payload> {
        Some(Payload::Json(json!({
            "score": self.score.label(),
            "value": self.score.value(),
            "confidence": self.confidence,
        })))
    }
}

/// Scores a model-plane tip.
///
/// Takes the tip and the warp of the pixel diagonally next to it; the farther apart they
/// land, the less a one-pixel error in the tip is worth, so the lower the confidence.
pub struct ScoreCalculator {
    params: ConfigSet,
    model: DartboardModel,
}

impl Schema for ScoreCalculator {
    const NAME: &'static str = "ScoreCalculator";

    fn schema() -> Vec<ConfigParameter> {
        Vec::new()
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            model: DartboardModel,
        }
    }
}

impl Operator for ScoreCalculator {
    config_accessors!();
}

impl Call<([f64; 2], [f64; 2])> for ScoreCalculator {
    type Output = ScoreOutput;

    fn call(&mut self, (point, neighbour): ([f64; 2], [f64; 2])) -> ScoreOutput {
        let spread = (point[0] - neighbour[0]).hypot(point[1] - neighbour[1]);
        ScoreOutput {
            score: self.model.get_score(point),
            confidence: 1.0 / spread.max(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::dartboard::Ring;

    #[test]
    fn scores_the_tip_and_derives_confidence_from_the_spread() {
        let mut calculator = ScoreCalculator::default();

        let out = calculator.call(([0.0, 103.0], [0.5, 103.5]));
        assert_eq!(out.score.ring, Ring::Triple);
        assert_eq!(out.score.label(), "T 20");
        assert_relative_eq!(out.confidence, 1.0);

        let out = calculator.call(([0.0, 0.0], [3.0, 4.0]));
        assert_eq!(out.score.label(), "D BULL");
        assert_relative_eq!(out.confidence, 0.2);
    }

    #[test]
    fn publishes_label_value_and_confidence() {
        let out = ScoreCalculator::default().call(([0.0, 10.0], [0.0, 12.0]));
        let Some(Payload::Json(value)) = out.payload() else {
            panic!("score output should publish json");
        };
        assert_eq!(value, json!({"score": "BULL", "value": 25, "confidence": 0.5}));
    }
}
