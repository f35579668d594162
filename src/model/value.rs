//! Typed values exchanged with the database driver.

use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionError;

/// Column data type, modelled on the JDBC type codes reported by database metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Bit,
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Decimal,
    Numeric,
    Char,
    Varchar,
    LongVarchar,
    Clob,
    NClob,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Date,
    Time,
    Timestamp,
    RowId,
    Other,
}

impl SqlType {
    /// Large-object types need the two-phase placeholder/fill write.
    pub fn is_lob(&self) -> bool {
        matches!(self, SqlType::Clob | SqlType::NClob | SqlType::Blob)
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self,
            SqlType::Char | SqlType::Varchar | SqlType::LongVarchar | SqlType::Clob | SqlType::NClob
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt | SqlType::Bit
        )
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, SqlType::Real | SqlType::Float | SqlType::Double)
    }

    /// Map a native type name as reported by the driver to a type code.
    pub fn from_native(name: &str) -> SqlType {
        let upper = name.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BIT" => SqlType::Bit,
            "BOOL" | "BOOLEAN" => SqlType::Boolean,
            "SMALLINT" | "TINYINT" => SqlType::SmallInt,
            "INT" | "INTEGER" => SqlType::Integer,
            "BIGINT" => SqlType::BigInt,
            "REAL" => SqlType::Real,
            "FLOAT" | "BINARY_FLOAT" => SqlType::Float,
            "DOUBLE" | "DOUBLE PRECISION" | "BINARY_DOUBLE" => SqlType::Double,
            "DECIMAL" => SqlType::Decimal,
            "NUMBER" | "NUMERIC" => SqlType::Numeric,
            "CHAR" | "NCHAR" => SqlType::Char,
            "VARCHAR" | "VARCHAR2" | "NVARCHAR" | "NVARCHAR2" => SqlType::Varchar,
            "LONG" | "TEXT" | "LONG VARCHAR" => SqlType::LongVarchar,
            "CLOB" => SqlType::Clob,
            "NCLOB" => SqlType::NClob,
            "BINARY" | "RAW" => SqlType::Binary,
            "VARBINARY" => SqlType::VarBinary,
            "LONG RAW" | "IMAGE" => SqlType::LongVarBinary,
            "BLOB" => SqlType::Blob,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "TIMESTAMP" | "DATETIME" => SqlType::Timestamp,
            "ROWID" | "UROWID" => SqlType::RowId,
            _ => SqlType::Other,
        }
    }
}

/// A value read from or written to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its textual form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Physical row identity (e.g. Oracle ROWID).
    RowId(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Coerce request data into a value suitable for a column of type `target`.
    pub fn from_json(value: &Value, target: SqlType) -> Result<SqlValue, ExtractionError> {
        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => {
                if target.is_integral() {
                    Ok(SqlValue::Int(i64::from(*b)))
                } else if target.is_character() {
                    Ok(SqlValue::Text(b.to_string()))
                } else {
                    Ok(SqlValue::Bool(*b))
                }
            }
            Value::Number(n) => {
                if target.is_character() {
                    Ok(SqlValue::Text(n.to_string()))
                } else if target.is_approximate() {
                    n.as_f64()
                        .map(SqlValue::Float)
                        .ok_or_else(|| ExtractionError::conversion(n, target))
                } else if matches!(target, SqlType::Decimal | SqlType::Numeric) {
                    Ok(SqlValue::Decimal(n.to_string()))
                } else if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Int(i))
                } else if target.is_integral() {
                    Err(ExtractionError::conversion(n, target))
                } else {
                    n.as_f64()
                        .map(SqlValue::Float)
                        .ok_or_else(|| ExtractionError::conversion(n, target))
                }
            }
            Value::String(s) => Self::from_text(s, target),
            Value::Array(_) | Value::Object(_) => {
                if target.is_character() {
                    Ok(SqlValue::Text(value.to_string()))
                } else {
                    Err(ExtractionError::conversion(value, target))
                }
            }
        }
    }

    fn from_text(s: &str, target: SqlType) -> Result<SqlValue, ExtractionError> {
        match target {
            t if t.is_integral() => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|_| ExtractionError::conversion(s, target)),
            t if t.is_approximate() => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|_| ExtractionError::conversion(s, target)),
            SqlType::Decimal | SqlType::Numeric => {
                let trimmed = s.trim();
                trimmed
                    .parse::<f64>()
                    .map(|_| SqlValue::Decimal(trimmed.to_string()))
                    .map_err(|_| ExtractionError::conversion(s, target))
            }
            SqlType::Boolean => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "no" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(ExtractionError::conversion(s, target)),
            },
            SqlType::Date => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|_| ExtractionError::conversion(s, target)),
            SqlType::Timestamp => parse_timestamp(s.trim())
                .map(SqlValue::Timestamp)
                .ok_or_else(|| ExtractionError::conversion(s, target)),
            // binary content travels through JSON as base64
            t if t.is_binary() => general_purpose::STANDARD
                .decode(s.trim())
                .map(SqlValue::Bytes)
                .map_err(|_| ExtractionError::conversion(s, target)),
            SqlType::RowId => Ok(SqlValue::RowId(s.to_string())),
            _ => Ok(SqlValue::Text(s.to_string())),
        }
    }

    /// Render for the document pipeline.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Decimal(d) => Value::String(d.clone()),
            SqlValue::Text(s) | SqlValue::RowId(s) => Value::String(s.clone()),
            SqlValue::Bytes(b) => Value::String(general_purpose::STANDARD.encode(b)),
            SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(t) => Value::String(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    /// Plain textual form used by rule comparisons.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) | SqlValue::RowId(s) | SqlValue::Decimal(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(general_purpose::STANDARD.encode(b)),
            other => match other.to_json() {
                Value::String(s) => Some(s),
                v => Some(v.to_string()),
            },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Decimal(d) | SqlValue::Text(d) => d.trim().parse().ok(),
            SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A value ready to be bound: the driver needs the declared type for typed NULLs.
#[derive(Debug, Clone, PartialEq)]
pub struct BindValue {
    pub value: SqlValue,
    pub sql_type: SqlType,
}

impl BindValue {
    pub fn new(value: SqlValue, sql_type: SqlType) -> Self {
        Self { value, sql_type }
    }

    pub fn null(sql_type: SqlType) -> Self {
        Self::new(SqlValue::Null, sql_type)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}
