//! Columns and the metadata the driver reports for them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::table::Table;
use super::value::SqlType;

/// A column of a back-end table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub table: Table,
    pub name: String,
}

impl Column {
    pub fn new(table: &Table, name: &str) -> Self {
        Self {
            table: table.clone(),
            name: name.to_string(),
        }
    }

    /// `table.column` using the table's reference name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table.reference(), self.name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// Column description as loaded from database metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: SqlType,
    pub native_type: String,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub scale: u32,
    pub nullable: Nullability,
    #[serde(default = "default_searchable")]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_suffix: Option<String>,
}

fn default_searchable() -> bool {
    true
}

impl ColumnMeta {
    /// Metadata derived from the native type name alone.
    pub fn new(name: &str, native_type: &str) -> Self {
        let sql_type = SqlType::from_native(native_type);
        let (prefix, suffix) = if sql_type.is_character() {
            (Some("'".to_string()), Some("'".to_string()))
        } else {
            (None, None)
        };
        Self {
            name: name.to_string(),
            sql_type,
            native_type: native_type.to_string(),
            precision: 0,
            scale: 0,
            nullable: Nullability::Unknown,
            searchable: !sql_type.is_lob(),
            literal_prefix: prefix,
            literal_suffix: suffix,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = Nullability::NoNulls;
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn is_lob(&self) -> bool {
        self.sql_type.is_lob()
    }

    /// Quote a literal using the driver-reported affixes.
    pub fn quote_literal(&self, literal: &str) -> String {
        format!(
            "{}{}{}",
            self.literal_prefix.as_deref().unwrap_or(""),
            literal,
            self.literal_suffix.as_deref().unwrap_or("")
        )
    }
}
