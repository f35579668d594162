//! Error types for docsql.
//!
//! Three failure families reach callers: driver failures ([`SqlError`]), failures to
//! resolve a bound value from the request ([`ExtractionError`]), and plan-compile
//! misuse (illegal arguments, configuration gaps, unknown extensions).

use std::fmt;

use thiserror::Error;

use crate::driver::ConnectionKey;

/// Failure reported by the underlying database driver.
///
/// Errors raised while cleaning up after a failure (closing statements, releasing LOB
/// buffers) are chained onto the primary error instead of replacing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlError {
    pub message: String,
    pub sql_state: Option<String>,
    pub vendor_code: i32,
    pub chained: Vec<SqlError>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: 0,
            chained: Vec::new(),
        }
    }

    pub fn with_state(mut self, sql_state: impl Into<String>, vendor_code: i32) -> Self {
        self.sql_state = Some(sql_state.into());
        self.vendor_code = vendor_code;
        self
    }

    /// Attach a secondary failure (warning or cleanup error) to this one.
    pub fn chain(mut self, other: SqlError) -> Self {
        self.chained.push(other);
        self
    }

    /// This error followed by every chained error, depth first.
    pub fn flatten(&self) -> Vec<&SqlError> {
        let mut out = vec![self];
        for next in &self.chained {
            out.extend(next.flatten());
        }
        out
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "[{}:{}] {}", state, self.vendor_code, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if !self.chained.is_empty() {
            write!(f, " (+{} chained)", self.chained.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for SqlError {}

/// Result type for driver calls
pub type SqlResult<T> = Result<T, SqlError>;

/// Reason a bound value could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorCode {
    MissingParameter = 1001,
    MissingInputField = 1002,
    NoCurrentRow = 1003,
    UnknownColumn = 1004,
    Conversion = 1005,
    ExtensionFailed = 1006,
}

/// A bound value could not be resolved from the execution context.
///
/// Carries a code plus positional arguments so the host can produce a localized
/// message.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionError {
    pub code: ExtractionErrorCode,
    pub args: Vec<String>,
}

impl ExtractionError {
    pub fn new(code: ExtractionErrorCode, args: Vec<String>) -> Self {
        Self { code, args }
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(ExtractionErrorCode::MissingParameter, vec![name.to_string()])
    }

    pub fn conversion(value: impl fmt::Display, target: impl fmt::Debug) -> Self {
        Self::new(
            ExtractionErrorCode::Conversion,
            vec![value.to_string(), format!("{:?}", target)],
        )
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data extraction error {:?} ({}): {}",
            self.code,
            self.code as u32,
            self.args.join(", ")
        )
    }
}

impl std::error::Error for ExtractionError {}

/// docsql error type
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("Connection {0} is not open in this execution context")]
    MissingConnection(ConnectionKey),

    #[error("Cannot locate rows for LOB fill of {0}: every locating value is NULL")]
    UnlocatedLobFill(String),
}

/// Result type for plan compilation and execution
pub type PlanResult<T> = Result<T, PlanError>;

impl PlanError {
    /// True for failures raised by the database driver.
    pub fn is_sql(&self) -> bool {
        matches!(self, PlanError::Sql(_))
    }

    /// True when a bound value could not be resolved.
    pub fn is_extraction(&self) -> bool {
        matches!(self, PlanError::Extraction(_))
    }
}

impl serde::Serialize for PlanError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
