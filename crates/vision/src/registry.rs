//! Tag → factory tables used to build sources, detectors and procedures from JSON.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Keyword arguments handed to a factory: the spec mapping without its `type` key.
pub type Kwargs = Map<String, Value>;

type Factory<T> = Box<dyn Fn(Kwargs) -> Result<T, ConfigError> + Send + Sync>;

/// Either a `{"type": tag, ...}` mapping to build, or an object that is already built.
pub enum BuildSpec<T> {
    Config(Value),
    Built(T),
}

impl<T> From<Value> for BuildSpec<T> {
    fn from(value: Value) -> Self {
        BuildSpec::Config(value)
    }
}

pub struct Registry<T> {
    kind: &'static str,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T> Registry<T> {
    /// `kind` names what the registry builds, for error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `tag`; a later registration replaces an earlier one.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Kwargs) -> Result<T, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, spec: impl Into<BuildSpec<T>>) -> Result<T, ConfigError> {
        match spec.into() {
            BuildSpec::Built(object) => Ok(object),
            BuildSpec::Config(value) => self.build_value(&value),
        }
    }

    pub fn build_value(&self, spec: &Value) -> Result<T, ConfigError> {
        let malformed = || ConfigError::MalformedSpec {
            kind: self.kind,
            spec: spec.to_string(),
        };
        let mut kwargs = spec.as_object().cloned().ok_or_else(malformed)?;
        let tag = match kwargs.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(malformed()),
        };
        self.build_tagged(&tag, kwargs)
    }

    pub fn build_tagged(&self, tag: &str, kwargs: Kwargs) -> Result<T, ConfigError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| ConfigError::UnknownType {
                kind: self.kind,
                tag: tag.to_string(),
            })?;
        tracing::debug!(kind = self.kind, tag, "building from registry");
        factory(kwargs)
    }
}

/// Deserialize factory arguments into a typed struct.
pub fn parse_kwargs<A: DeserializeOwned>(tag: &str, kwargs: Kwargs) -> Result<A, ConfigError> {
    serde_json::from_value(Value::Object(kwargs)).map_err(|source| ConfigError::InvalidArguments {
        tag: tag.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Widget {
        size: u32,
    }

    #[derive(Deserialize)]
    struct WidgetArgs {
        #[serde(default = "default_size")]
        size: u32,
    }

    fn default_size() -> u32 {
        3
    }

    fn registry() -> Registry<Widget> {
        let mut registry = Registry::new("widget");
        registry.register("Widget", |kwargs| {
            let args: WidgetArgs = parse_kwargs("Widget", kwargs)?;
            Ok(Widget { size: args.size })
        });
        registry
    }

    #[test]
    fn mappings_are_built_with_their_kwargs() {
        let registry = registry();
        assert_eq!(
            registry.build(json!({"type": "Widget", "size": 9})).unwrap(),
            Widget { size: 9 }
        );
        assert_eq!(
            registry.build(json!({"type": "Widget"})).unwrap(),
            Widget { size: 3 }
        );
    }

    #[test]
    fn built_objects_pass_through_unchanged() {
        let registry = registry();
        let built = registry.build(BuildSpec::Built(Widget { size: 42 })).unwrap();
        assert_eq!(built, Widget { size: 42 });
    }

    #[test]
    fn unknown_and_malformed_specs_are_configuration_errors() {
        let registry = registry();
        assert!(matches!(
            registry.build(json!({"type": "Gadget"})),
            Err(ConfigError::UnknownType { kind: "widget", ref tag }) if tag == "Gadget"
        ));
        assert!(matches!(
            registry.build(json!({"size": 1})),
            Err(ConfigError::MalformedSpec { .. })
        ));
        assert!(matches!(
            registry.build(json!({"type": "Widget", "size": "big"})),
            Err(ConfigError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = registry();
        registry.register("Widget", |_| Ok(Widget { size: 0 }));
        assert_eq!(registry.build(json!({"type": "Widget", "size": 9})).unwrap().size, 0);
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["Widget"]);
    }
}
