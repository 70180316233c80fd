//! Camera and dartboard descriptions handed to the task manager.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{config::ConfigRecord, operators::CalibrationPoint};

/// Initial configuration per operator name.
pub type OpConfigs = BTreeMap<String, Vec<ConfigRecord>>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraDescriptor {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    /// `{"type": tag, ...kwargs}` resolved through the source registry.
    pub source: Value,
    #[serde(default)]
    pub op_configs: OpConfigs,
    #[serde(default)]
    pub calibration_points: Vec<CalibrationPoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DartboardDescriptor {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    /// Camera ids in fusion order.
    #[serde(deserialize_with = "ids_from_any")]
    pub cams: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn ids_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Vec::<RawId>::deserialize(deserializer).map(|ids| ids.into_iter().map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_accept_numbers_and_strings() {
        let board: DartboardDescriptor =
            serde_json::from_value(json!({"id": 7, "cams": [1, "left"]})).unwrap();
        assert_eq!(board.id, "7");
        assert_eq!(board.cams, vec!["1", "left"]);
    }

    #[test]
    fn camera_defaults_to_no_configuration() {
        let camera: CameraDescriptor = serde_json::from_value(json!({
            "id": "a",
            "source": {"type": "ImageSequence", "dir": "frames"},
        }))
        .unwrap();
        assert!(camera.op_configs.is_empty());
        assert!(camera.calibration_points.is_empty());

        let camera: CameraDescriptor = serde_json::from_value(json!({
            "id": 2,
            "source": {"type": "UsbCam"},
            "op_configs": {"SizeClassifier": [{"name": "hand_min", "type": "float", "value": 0.4}]},
            "calibration_points": [{"x": 0.5, "y": 0.1, "label": "20 | 1"}],
        }))
        .unwrap();
        assert_eq!(camera.op_configs["SizeClassifier"], vec![ConfigRecord::float("hand_min", 0.4)]);
        assert_eq!(camera.calibration_points[0].label, "20 | 1");
    }
}
