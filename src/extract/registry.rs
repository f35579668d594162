//! Registry of named extensions resolved at plan-compile time.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{InputField, Literal, RequestParameter, ResultColumn, ValueExtractor};
use crate::error::{PlanError, PlanResult};
use crate::model::{CompareOp, SqlValue};
use crate::rules::{Comparison, Condition};

/// Builds an extractor from its declared parameters.
pub type ExtractorFactory =
    Arc<dyn Fn(&[String]) -> PlanResult<Arc<dyn ValueExtractor>> + Send + Sync>;

/// Builds a rule condition from its declared parameters.
pub type ConditionFactory = Arc<dyn Fn(&[String]) -> PlanResult<Arc<dyn Condition>> + Send + Sync>;

/// Maps extension identifiers to their implementations.
///
/// Lookups happen while compiling a plan; an unknown identifier fails the
/// compilation, never a request.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extractors: HashMap<String, ExtractorFactory>,
    conditions: HashMap<String, ConditionFactory>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `sys_*` extensions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_extractor("sys_Literal", |params| {
            let text = params.first().cloned().unwrap_or_default();
            Ok(Arc::new(Literal(SqlValue::Text(text))) as Arc<dyn ValueExtractor>)
        });
        registry.register_extractor("sys_RequestParameter", |params| {
            let name = required_param("sys_RequestParameter", params, 0)?;
            let mut extractor = RequestParameter::new(name);
            if let Some(default) = params.get(1) {
                extractor = extractor.with_default(Value::String(default.clone()));
            }
            Ok(Arc::new(extractor) as Arc<dyn ValueExtractor>)
        });
        registry.register_extractor("sys_InputField", |params| {
            let name = required_param("sys_InputField", params, 0)?;
            let mut extractor = InputField::new(name);
            if let Some(default) = params.get(1) {
                extractor = extractor.with_default(Value::String(default.clone()));
            }
            Ok(Arc::new(extractor) as Arc<dyn ValueExtractor>)
        });
        registry.register_extractor("sys_ResultColumn", |params| {
            let name = required_param("sys_ResultColumn", params, 0)?;
            Ok(Arc::new(ResultColumn::new(name)) as Arc<dyn ValueExtractor>)
        });

        // sys_ParameterEquals(name, value)
        registry.register_condition("sys_ParameterEquals", |params| {
            let name = required_param("sys_ParameterEquals", params, 0)?;
            let expected = required_param("sys_ParameterEquals", params, 1)?;
            Ok(Arc::new(Comparison::new(
                Arc::new(RequestParameter::new(name).with_default(Value::Null)),
                CompareOp::Eq,
                Some(Arc::new(Literal(SqlValue::Text(expected.to_string()))) as Arc<dyn ValueExtractor>),
            )) as Arc<dyn Condition>)
        });
        // sys_ParameterExists(name)
        registry.register_condition("sys_ParameterExists", |params| {
            let name = required_param("sys_ParameterExists", params, 0)?;
            Ok(Arc::new(Comparison::new(
                Arc::new(RequestParameter::new(name).with_default(Value::Null)),
                CompareOp::IsNotNull,
                None,
            )) as Arc<dyn Condition>)
        });

        registry
    }

    pub fn register_extractor<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&[String]) -> PlanResult<Arc<dyn ValueExtractor>> + Send + Sync + 'static,
    {
        self.extractors.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_condition<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&[String]) -> PlanResult<Arc<dyn Condition>> + Send + Sync + 'static,
    {
        self.conditions.insert(name.to_string(), Arc::new(factory));
    }

    pub fn extractor(&self, name: &str, params: &[String]) -> PlanResult<Arc<dyn ValueExtractor>> {
        let factory = self
            .extractors
            .get(name)
            .ok_or_else(|| PlanError::UnsupportedExtension(name.to_string()))?;
        factory(params)
    }

    pub fn condition(&self, name: &str, params: &[String]) -> PlanResult<Arc<dyn Condition>> {
        let factory = self
            .conditions
            .get(name)
            .ok_or_else(|| PlanError::UnsupportedExtension(name.to_string()))?;
        factory(params)
    }

    pub fn has_extractor(&self, name: &str) -> bool {
        self.extractors.contains_key(name)
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }
}

fn required_param<'a>(extension: &str, params: &'a [String], index: usize) -> PlanResult<&'a str> {
    params.get(index).map(String::as_str).ok_or_else(|| {
        PlanError::IllegalArgument(format!(
            "extension '{}' requires parameter #{}",
            extension,
            index + 1
        ))
    })
}
