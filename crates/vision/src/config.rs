//! Typed, bounded operator parameters and the records used to change them.
//!
//! An operator type declares its schema as a list of [`ConfigParameter`]s. A
//! [`ConfigSet`] holds the live values for one operator instance and only
//! changes through [`ConfigSet::configure`], which validates a whole batch of
//! [`ConfigRecord`]s before applying any of them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// One declared parameter. `value` is the live value once instantiated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: ParamKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParamKind {
    #[serde(rename = "int")]
    Integer {
        default_value: i64,
        min_value: i64,
        max_value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<i64>,
    },
    #[serde(rename = "float")]
    Float {
        default_value: f64,
        min_value: f64,
        max_value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    #[serde(rename = "bool")]
    Boolean {
        default_value: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<bool>,
    },
    #[serde(rename = "select")]
    Selection {
        default_value: String,
        data: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ParamKind {
    fn label(&self) -> &'static str {
        match self {
            ParamKind::Integer { .. } => "int",
            ParamKind::Float { .. } => "float",
            ParamKind::Boolean { .. } => "bool",
            ParamKind::Selection { .. } => "select",
        }
    }

    fn reset(&mut self) {
        match self {
            ParamKind::Integer {
                default_value,
                value,
                ..
            } => *value = Some(*default_value),
            ParamKind::Float {
                default_value,
                value,
                ..
            } => *value = Some(*default_value),
            ParamKind::Boolean {
                default_value,
                value,
            } => *value = Some(*default_value),
            ParamKind::Selection {
                default_value,
                value,
                ..
            } => *value = Some(default_value.clone()),
        }
    }
}

impl ConfigParameter {
    pub fn int(name: &str, default_value: i64, min_value: i64, max_value: i64) -> Self {
        Self::with_kind(
            name,
            ParamKind::Integer {
                default_value,
                min_value,
                max_value,
                value: None,
            },
        )
    }

    pub fn float(name: &str, default_value: f64, min_value: f64, max_value: f64) -> Self {
        Self::with_kind(
            name,
            ParamKind::Float {
                default_value,
                min_value,
                max_value,
                value: None,
            },
        )
    }

    pub fn boolean(name: &str, default_value: bool) -> Self {
        Self::with_kind(
            name,
            ParamKind::Boolean {
                default_value,
                value: None,
            },
        )
    }

    pub fn select(name: &str, default_value: &str, data: &[&str]) -> Self {
        Self::with_kind(
            name,
            ParamKind::Selection {
                default_value: default_value.to_string(),
                data: data.iter().map(|s| s.to_string()).collect(),
                value: None,
            },
        )
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    fn with_kind(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            kind,
        }
    }

    /// Record that would set this parameter to its current value.
    pub fn to_record(&self) -> ConfigRecord {
        let value = match &self.kind {
            ParamKind::Integer { value, .. } => RecordValue::Integer { value: *value },
            ParamKind::Float { value, .. } => RecordValue::Float { value: *value },
            ParamKind::Boolean { value, .. } => RecordValue::Boolean { value: *value },
            ParamKind::Selection { value, .. } => RecordValue::Selection {
                value: value.clone(),
            },
        };
        ConfigRecord {
            name: self.name.clone(),
            value,
        }
    }

    /// Validate `record` against this declaration and return the kind it would produce.
    fn validate(&self, record: &RecordValue) -> Result<ParamKind, ConfigError> {
        let mut next = self.kind.clone();
        if matches!(record, RecordValue::Delete) {
            next.reset();
            return Ok(next);
        }
        match (&mut next, record) {
            (
                ParamKind::Integer {
                    default_value,
                    min_value,
                    max_value,
                    value,
                },
                RecordValue::Integer { value: requested },
            ) => {
                let v = requested.unwrap_or(*default_value);
                if v < *min_value || v > *max_value {
                    return Err(self.out_of_bounds(v, *min_value, *max_value));
                }
                *value = Some(v);
            }
            (
                ParamKind::Float {
                    default_value,
                    min_value,
                    max_value,
                    value,
                },
                RecordValue::Float { value: requested },
            ) => {
                let v = requested.unwrap_or(*default_value);
                if !(v >= *min_value && v <= *max_value) {
                    return Err(self.out_of_bounds(v, *min_value, *max_value));
                }
                *value = Some(v);
            }
            (
                ParamKind::Boolean {
                    default_value,
                    value,
                },
                RecordValue::Boolean { value: requested },
            ) => *value = Some(requested.unwrap_or(*default_value)),
            (
                ParamKind::Selection {
                    default_value,
                    data,
                    value,
                },
                RecordValue::Selection { value: requested },
            ) => {
                let v = requested.clone().unwrap_or_else(|| default_value.clone());
                if !data.contains(&v) {
                    return Err(ConfigError::NotAllowed {
                        name: self.name.clone(),
                        value: v,
                        allowed: data.clone(),
                    });
                }
                *value = Some(v);
            }
            (declared, requested) => {
                return Err(ConfigError::KindMismatch {
                    name: self.name.clone(),
                    expected: declared.label(),
                    actual: requested.label(),
                });
            }
        }
        Ok(next)
    }

    fn out_of_bounds<T: ToString>(&self, value: T, min: T, max: T) -> ConfigError {
        ConfigError::OutOfBounds {
            name: self.name.clone(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

/// A requested change to one parameter, as sent over the configuration channel.
///
/// Full [`ConfigParameter`] JSON is accepted as well; bounds carried by a record
/// are ignored in favour of the declared ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub name: String,
    #[serde(flatten)]
    pub value: RecordValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecordValue {
    #[serde(rename = "int")]
    Integer {
        #[serde(default)]
        value: Option<i64>,
    },
    #[serde(rename = "float")]
    Float {
        #[serde(default)]
        value: Option<f64>,
    },
    #[serde(rename = "bool")]
    Boolean {
        #[serde(default)]
        value: Option<bool>,
    },
    #[serde(rename = "select")]
    Selection {
        #[serde(default)]
        value: Option<String>,
    },
    /// Reset the named parameter to its default.
    #[serde(rename = "_delete_")]
    Delete,
}

impl RecordValue {
    fn label(&self) -> &'static str {
        match self {
            RecordValue::Integer { .. } => "int",
            RecordValue::Float { .. } => "float",
            RecordValue::Boolean { .. } => "bool",
            RecordValue::Selection { .. } => "select",
            RecordValue::Delete => "_delete_",
        }
    }
}

impl ConfigRecord {
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: RecordValue::Integer { value: Some(value) },
        }
    }

    pub fn float(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: RecordValue::Float { value: Some(value) },
        }
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            value: RecordValue::Boolean { value: Some(value) },
        }
    }

    pub fn select(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: RecordValue::Selection {
                value: Some(value.to_string()),
            },
        }
    }

    pub fn delete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: RecordValue::Delete,
        }
    }
}

/// Live parameter values of one operator instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSet {
    owner: String,
    params: Vec<ConfigParameter>,
}

impl ConfigSet {
    /// Instantiate `schema` with every value at its default.
    pub fn new(owner: impl Into<String>, schema: Vec<ConfigParameter>) -> Self {
        let params = schema
            .into_iter()
            .map(|mut param| {
                param.kind.reset();
                param
            })
            .collect();
        Self {
            owner: owner.into(),
            params,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Current parameters, values included.
    pub fn get_config(&self) -> Vec<ConfigParameter> {
        self.params.clone()
    }

    /// Validate every record, then apply them all. Unknown names are skipped with
    /// a warning; any invalid record rejects the whole batch. Returns the number of
    /// parameters changed.
    pub fn configure(&mut self, records: &[ConfigRecord]) -> Result<usize, ConfigError> {
        let mut staged = Vec::with_capacity(records.len());
        for record in records {
            let Some(index) = self.params.iter().position(|p| p.name == record.name) else {
                warn!(
                    operator = %self.owner,
                    parameter = %record.name,
                    "ignoring configuration for unknown parameter"
                );
                continue;
            };
            staged.push((index, self.params[index].validate(&record.value)?));
        }

        let mut changed = 0;
        for (index, kind) in staged {
            if self.params[index].kind != kind {
                changed += 1;
            }
            self.params[index].kind = kind;
        }
        Ok(changed)
    }

    fn kind(&self, name: &str) -> Option<&ParamKind> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.kind)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.kind(name)? {
            ParamKind::Integer {
                value,
                default_value,
                ..
            } => Some(value.unwrap_or(*default_value)),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.kind(name)? {
            ParamKind::Float {
                value,
                default_value,
                ..
            } => Some(value.unwrap_or(*default_value)),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.kind(name)? {
            ParamKind::Boolean {
                value,
                default_value,
            } => Some(value.unwrap_or(*default_value)),
            _ => None,
        }
    }

    pub fn selection(&self, name: &str) -> Option<&str> {
        match self.kind(name)? {
            ParamKind::Selection {
                value,
                default_value,
                ..
            } => Some(value.as_deref().unwrap_or(default_value)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion_like() -> ConfigSet {
        ConfigSet::new(
            "Motion",
            vec![
                ConfigParameter::float("resize", 0.25, 0.0, 1.0),
                ConfigParameter::int("threshold", 50, 0, 255),
                ConfigParameter::boolean("enabled", true),
                ConfigParameter::select("mode", "fast", &["fast", "accurate"]),
            ],
        )
    }

    #[test]
    fn instances_start_at_defaults() {
        let set = motion_like();
        assert_eq!(set.float("resize"), Some(0.25));
        assert_eq!(set.int("threshold"), Some(50));
        assert_eq!(set.boolean("enabled"), Some(true));
        assert_eq!(set.selection("mode"), Some("fast"));
        assert_eq!(set.int("resize"), None);
    }

    #[test]
    fn out_of_bounds_values_are_rejected_without_partial_apply() {
        let mut set = motion_like();
        let err = set
            .configure(&[
                ConfigRecord::int("threshold", 60),
                ConfigRecord::float("resize", 1.5),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfBounds { ref name, .. } if name == "resize"));
        assert_eq!(set.int("threshold"), Some(50));
    }

    #[test]
    fn selection_must_be_allowed_and_kinds_must_match() {
        let mut set = motion_like();
        assert!(matches!(
            set.configure(&[ConfigRecord::select("mode", "turbo")]),
            Err(ConfigError::NotAllowed { .. })
        ));
        assert!(matches!(
            set.configure(&[ConfigRecord::boolean("threshold", true)]),
            Err(ConfigError::KindMismatch {
                expected: "int",
                actual: "bool",
                ..
            })
        ));
    }

    #[test]
    fn unknown_names_are_skipped_and_delete_resets() {
        let mut set = motion_like();
        let changed = set
            .configure(&[
                ConfigRecord::int("threshold", 80),
                ConfigRecord::int("no_such_param", 1),
            ])
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(set.int("threshold"), Some(80));

        set.configure(&[ConfigRecord::delete("threshold")]).unwrap();
        assert_eq!(set.int("threshold"), Some(50));
    }

    #[test]
    fn missing_value_falls_back_to_default() {
        let mut set = motion_like();
        set.configure(&[ConfigRecord::int("threshold", 0)]).unwrap();
        assert_eq!(set.int("threshold"), Some(0));
        set.configure(&[ConfigRecord {
            name: "threshold".into(),
            value: RecordValue::Integer { value: None },
        }])
        .unwrap();
        assert_eq!(set.int("threshold"), Some(50));
    }

    #[test]
    fn get_apply_get_is_idempotent() {
        let mut set = motion_like();
        set.configure(&[
            ConfigRecord::float("resize", 0.5),
            ConfigRecord::select("mode", "accurate"),
        ])
        .unwrap();
        let before = set.get_config();
        let records: Vec<ConfigRecord> = before.iter().map(ConfigParameter::to_record).collect();
        assert_eq!(set.configure(&records).unwrap(), 0);
        assert_eq!(set.get_config(), before);
    }

    #[test]
    fn records_parse_from_wire_json() {
        let records: Vec<ConfigRecord> = serde_json::from_str(
            r#"[
                {"name": "resize", "type": "float", "value": 1},
                {"name": "threshold", "type": "int", "min_value": 0, "max_value": 9, "value": 70},
                {"name": "mode", "type": "_delete_", "default_value": "fast"}
            ]"#,
        )
        .unwrap();
        assert_eq!(records[0], ConfigRecord::float("resize", 1.0));
        assert_eq!(records[2], ConfigRecord::delete("mode"));

        let mut set = motion_like();
        set.configure(&records).unwrap();
        assert_eq!(set.float("resize"), Some(1.0));
        assert_eq!(set.int("threshold"), Some(70));
    }

    #[test]
    fn schema_serializes_with_type_tags() {
        let param = ConfigParameter::int("threshold", 50, 0, 255).describe("binary threshold");
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["type"], "int");
        assert_eq!(json["default_value"], 50);
        assert_eq!(json["description"], "binary threshold");
        let back: ConfigParameter = serde_json::from_value(json).unwrap();
        assert_eq!(back, param);
    }
}
