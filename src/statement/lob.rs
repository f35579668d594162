//! Large-object placeholders for dialects that fill LOB columns in a second pass.

use std::fmt;

use crate::model::{BindValue, SqlType};

/// Supplies the SQL text written in place of a LOB column's bind marker.
///
/// The row is first written with this placeholder; the LOB content is then
/// streamed into the row by a positioned follow-up statement.
pub trait LobColumnInitializer: Send + Sync + fmt::Debug {
    fn placeholder(&self, sql_type: SqlType, is_null: bool) -> String;
}

/// Oracle: `EMPTY_CLOB()` / `EMPTY_BLOB()`, or `null` when there is no content.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleLobInitializer;

impl LobColumnInitializer for OracleLobInitializer {
    fn placeholder(&self, sql_type: SqlType, is_null: bool) -> String {
        if is_null {
            return "null".to_string();
        }
        if sql_type.is_binary() {
            "EMPTY_BLOB()".to_string()
        } else {
            "EMPTY_CLOB()".to_string()
        }
    }
}

/// LOB content waiting for the positioned fill.
#[derive(Debug, Clone, PartialEq)]
pub struct LobValue {
    pub column: String,
    pub value: BindValue,
}
