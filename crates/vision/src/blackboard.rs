//! Shared key/value store connecting pipelines, the collector and clients.
//!
//! Keys:
//! - `cam_{id}_{Operator}`: latest output of an operator on a camera.
//! - `cam_{id}_config`: pending configuration, `{operator: [records]}`.
//! - `dartboard_{id}_result`: fused consensus result.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use crate::{config::ConfigRecord, error::BlackboardError};

pub trait Blackboard: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlackboardError>;

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BlackboardError>;

    fn delete(&self, key: &str) -> Result<(), BlackboardError>;

    /// Read and remove `key`. Stores with an atomic primitive should override this.
    fn take(&self, key: &str) -> Result<Option<Vec<u8>>, BlackboardError> {
        let value = self.get(key)?;
        if value.is_some() {
            self.delete(key)?;
        }
        Ok(value)
    }
}

/// In-process blackboard.
#[derive(Default)]
pub struct MemoryBlackboard {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        match self.entries.lock() {
            Ok(entries) => {
                let mut keys: Vec<String> = entries.keys().cloned().collect();
                keys.sort();
                keys
            }
            Err(_) => Vec::new(),
        }
    }
}

impl Blackboard for MemoryBlackboard {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlackboardError> {
        let entries = self.entries.lock().map_err(|_| BlackboardError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BlackboardError> {
        let mut entries = self.entries.lock().map_err(|_| BlackboardError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BlackboardError> {
        let mut entries = self.entries.lock().map_err(|_| BlackboardError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>, BlackboardError> {
        let mut entries = self.entries.lock().map_err(|_| BlackboardError::Poisoned)?;
        Ok(entries.remove(key))
    }
}

pub fn operator_key(camera: &str, operator: &str) -> String {
    format!("cam_{camera}_{operator}")
}

pub fn config_key(camera: &str) -> String {
    format!("cam_{camera}_config")
}

pub fn dartboard_result_key(dartboard: &str) -> String {
    format!("dartboard_{dartboard}_result")
}

/// What an operator publishes.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// 8-bit image data, stored as a `>III` (height, width, channels) header plus raw bytes.
    Array {
        height: u32,
        width: u32,
        channels: u32,
        data: Vec<u8>,
    },
    Json(Value),
}

const ARRAY_HEADER_LEN: usize = 12;

impl Payload {
    pub fn encode(&self) -> Result<Vec<u8>, BlackboardError> {
        match self {
            Payload::Array {
                height,
                width,
                channels,
                data,
            } => {
                let mut bytes = Vec::with_capacity(ARRAY_HEADER_LEN + data.len());
                bytes.extend_from_slice(&height.to_be_bytes());
                bytes.extend_from_slice(&width.to_be_bytes());
                bytes.extend_from_slice(&channels.to_be_bytes());
                bytes.extend_from_slice(data);
                Ok(bytes)
            }
            Payload::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}

/// Decode an array payload written by [`Payload::encode`].
pub fn decode_array(key: &str, bytes: &[u8]) -> Result<Payload, BlackboardError> {
    let malformed = |reason: String| BlackboardError::MalformedArray {
        key: key.to_string(),
        reason,
    };
    if bytes.len() < ARRAY_HEADER_LEN {
        return Err(malformed(format!("{} bytes is shorter than the header", bytes.len())));
    }
    let field = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    let (height, width, channels) = (field(0), field(4), field(8));
    let data = &bytes[ARRAY_HEADER_LEN..];
    let expected = height as usize * width as usize * channels as usize;
    if data.len() != expected {
        return Err(malformed(format!(
            "header {height}x{width}x{channels} needs {expected} bytes, got {}",
            data.len()
        )));
    }
    Ok(Payload::Array {
        height,
        width,
        channels,
        data: data.to_vec(),
    })
}

pub fn get_json<T: DeserializeOwned>(
    board: &dyn Blackboard,
    key: &str,
) -> Result<Option<T>, BlackboardError> {
    match board.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(
    board: &dyn Blackboard,
    key: &str,
    value: &T,
) -> Result<(), BlackboardError> {
    board.set(key, serde_json::to_vec(value)?)
}

/// Pending configuration for one camera, keyed by operator name.
pub type PendingConfig = BTreeMap<String, Vec<ConfigRecord>>;

/// Consume every pending configuration record of `camera`.
///
/// The key is written by outside clients. Records that do not decode are logged
/// and dropped; the rest still apply.
pub fn take_config(board: &dyn Blackboard, camera: &str) -> Result<PendingConfig, BlackboardError> {
    Ok(board
        .take(&config_key(camera))?
        .map(|bytes| decode_pending(camera, &bytes))
        .unwrap_or_default())
}

/// Queue `records` for `operator` on `camera`, after any records already pending.
pub fn push_config(
    board: &dyn Blackboard,
    camera: &str,
    operator: &str,
    records: Vec<ConfigRecord>,
) -> Result<(), BlackboardError> {
    let key = config_key(camera);
    let mut pending = board
        .get(&key)?
        .map(|bytes| decode_pending(camera, &bytes))
        .unwrap_or_default();
    pending.entry(operator.to_string()).or_default().extend(records);
    set_json(board, &key, &pending)
}

fn decode_pending(camera: &str, bytes: &[u8]) -> PendingConfig {
    let operators = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(operators)) => operators,
        Ok(other) => {
            warn!(camera, "dropping configuration payload that is not a mapping: {other}");
            return PendingConfig::new();
        }
        Err(err) => {
            warn!(camera, "dropping unreadable configuration payload: {err}");
            return PendingConfig::new();
        }
    };

    let mut pending = PendingConfig::new();
    for (operator, records) in operators {
        let Value::Array(records) = records else {
            warn!(camera, operator = %operator, "configuration is not a list of records");
            continue;
        };
        let decoded: Vec<ConfigRecord> = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(camera, operator = %operator, "dropping malformed record: {err}");
                    None
                }
            })
            .collect();
        if !decoded.is_empty() {
            pending.insert(operator, decoded);
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn array_payloads_carry_a_big_endian_shape_header() {
        let payload = Payload::Array {
            height: 2,
            width: 3,
            channels: 1,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        let bytes = payload.encode().unwrap();
        assert_eq!(&bytes[..12], &[0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 1]);
        assert_eq!(decode_array("k", &bytes).unwrap(), payload);
    }

    #[test]
    fn truncated_arrays_are_rejected() {
        let mut bytes = Payload::Array {
            height: 2,
            width: 2,
            channels: 3,
            data: vec![0; 12],
        }
        .encode()
        .unwrap();
        bytes.pop();
        assert!(matches!(
            decode_array("cam_1_Warper", &bytes),
            Err(BlackboardError::MalformedArray { .. })
        ));
        assert!(decode_array("k", &[0, 1]).is_err());
    }

    #[test]
    fn config_is_queued_per_operator_and_consumed_once() {
        let board = MemoryBlackboard::new();
        push_config(&board, "7", "MotionDetector", vec![ConfigRecord::int("threshold", 40)])
            .unwrap();
        push_config(&board, "7", "MotionDetector", vec![ConfigRecord::float("resize", 0.5)])
            .unwrap();
        push_config(&board, "7", "SizeClassifier", vec![ConfigRecord::delete("dart_min")])
            .unwrap();

        let pending = take_config(&board, "7").unwrap();
        assert_eq!(pending["MotionDetector"].len(), 2);
        assert_eq!(pending["SizeClassifier"], vec![ConfigRecord::delete("dart_min")]);
        assert!(take_config(&board, "7").unwrap().is_empty());
        assert!(board.get("cam_7_config").unwrap().is_none());
    }

    #[test]
    fn malformed_config_records_are_dropped_individually() {
        let board = MemoryBlackboard::new();
        let payload = json!({
            "MotionDetector": [
                {"name": "threshold", "type": "integer", "value": 3},
                {"name": "resize", "type": "float", "value": 0.5}
            ],
            "SizeClassifier": "hand_min=0.2",
            "BBoxDetector": [{"type": "int"}]
        });
        board.set("cam_4_config", serde_json::to_vec(&payload).unwrap()).unwrap();

        let pending = take_config(&board, "4").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending["MotionDetector"], vec![ConfigRecord::float("resize", 0.5)]);

        board.set("cam_4_config", b"{not json".to_vec()).unwrap();
        assert!(take_config(&board, "4").unwrap().is_empty());
        assert!(board.get("cam_4_config").unwrap().is_none());

        board.set("cam_4_config", b"[1, 2]".to_vec()).unwrap();
        push_config(&board, "4", "SizeClassifier", vec![ConfigRecord::float("hand_min", 0.2)])
            .unwrap();
        let pending = take_config(&board, "4").unwrap();
        assert_eq!(pending["SizeClassifier"], vec![ConfigRecord::float("hand_min", 0.2)]);
    }

    #[test]
    fn json_helpers_round_trip_through_the_store() {
        let board = MemoryBlackboard::new();
        set_json(&board, &dartboard_result_key("3"), &json!({"class": "hand"})).unwrap();
        let value: Value = get_json(&board, "dartboard_3_result").unwrap().unwrap();
        assert_eq!(value["class"], "hand");
        assert_eq!(board.keys(), vec!["dartboard_3_result".to_string()]);
        board.delete("dartboard_3_result").unwrap();
        assert!(get_json::<Value>(&board, "dartboard_3_result").unwrap().is_none());
    }
}
