//! Value extraction: where the values bound into statements come from.
//!
//! Extractors read the request's parameters, the current input row of an update
//! batch, or the current row of the most recent result set. Extensions registered
//! in an [`ExtensionRegistry`] supply the rest.

mod registry;

pub use registry::{ConditionFactory, ExtensionRegistry, ExtractorFactory};

use std::fmt;

use serde_json::Value;

use crate::error::{ExtractionError, ExtractionErrorCode};
use crate::exec::ExecutionData;
use crate::model::{SqlType, SqlValue};

/// Resolves one value against the current execution data.
///
/// Implementations are shared by every request running a plan and must not keep
/// per-request state.
pub trait ValueExtractor: Send + Sync + fmt::Debug {
    /// Resolve the value, coerced towards `target` where the source is untyped.
    fn extract(&self, data: &ExecutionData, target: SqlType) -> Result<SqlValue, ExtractionError>;

    /// The value when it is the same for every request.
    fn constant(&self) -> Option<&SqlValue> {
        None
    }
}

/// A constant.
#[derive(Debug, Clone)]
pub struct Literal(pub SqlValue);

impl ValueExtractor for Literal {
    fn extract(&self, _data: &ExecutionData, _target: SqlType) -> Result<SqlValue, ExtractionError> {
        Ok(self.0.clone())
    }

    fn constant(&self) -> Option<&SqlValue> {
        Some(&self.0)
    }
}

/// A named request parameter.
#[derive(Debug, Clone)]
pub struct RequestParameter {
    pub name: String,
    /// Used when the parameter is absent; without one, absence is an error.
    pub default: Option<Value>,
}

impl RequestParameter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

impl ValueExtractor for RequestParameter {
    fn extract(&self, data: &ExecutionData, target: SqlType) -> Result<SqlValue, ExtractionError> {
        match data.param(&self.name).or(self.default.as_ref()) {
            Some(value) => SqlValue::from_json(value, target),
            None => Err(ExtractionError::missing_parameter(&self.name)),
        }
    }
}

/// A field of the input row currently being written.
#[derive(Debug, Clone)]
pub struct InputField {
    pub name: String,
    pub default: Option<Value>,
}

impl InputField {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

impl ValueExtractor for InputField {
    fn extract(&self, data: &ExecutionData, target: SqlType) -> Result<SqlValue, ExtractionError> {
        match data.input_field(&self.name).or(self.default.as_ref()) {
            Some(value) => SqlValue::from_json(value, target),
            None => Err(ExtractionError::new(
                ExtractionErrorCode::MissingInputField,
                vec![self.name.clone()],
            )),
        }
    }
}

/// A column of the current row of the top-most open result set.
#[derive(Debug, Clone)]
pub struct ResultColumn {
    pub name: String,
}

impl ResultColumn {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ValueExtractor for ResultColumn {
    fn extract(&self, data: &ExecutionData, _target: SqlType) -> Result<SqlValue, ExtractionError> {
        let row = data.current_row().ok_or_else(|| {
            ExtractionError::new(ExtractionErrorCode::NoCurrentRow, vec![self.name.clone()])
        })?;
        row.get(&self.name).cloned().ok_or_else(|| {
            ExtractionError::new(ExtractionErrorCode::UnknownColumn, vec![self.name.clone()])
        })
    }
}
