use crate::{
    config::{ConfigParameter, ConfigSet},
    messages::{Class, ClassificationResult, DartThrow},
    operator::{Call, Operator, Schema},
};

/// Publishes the per-camera verdict read by the collector.
pub struct ResultPublisher {
    params: ConfigSet,
}

impl Schema for ResultPublisher {
    const NAME: &'static str = "ResultPublisher";

    fn schema() -> Vec<ConfigParameter> {
        Vec::new()
    }
}

impl ResultPublisher {
    pub fn new() -> Self {
        Self {
            params: Self::config_set(),
        }
    }
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for ResultPublisher {
    config_accessors!();
}

impl Call<(Class, Option<DartThrow>)> for ResultPublisher {
    type Output = ClassificationResult;

    fn call(&mut self, (class, content): (Class, Option<DartThrow>)) -> ClassificationResult {
        ClassificationResult { class, content }
    }
}
