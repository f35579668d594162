//! Database driver contract.
//!
//! The engine talks to databases through these JDBC-like traits. Connection pooling
//! is external: a [`ConnectionPool`] hands out connections per request and takes them
//! back when the request's execution data is closed.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SqlResult;
use crate::model::{BindValue, ColumnMeta, SqlValue, Table};

pub use memory::{ExecKind, ExecutedStatement, MemoryPool};

/// Key under which an open connection is registered in the execution data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey(pub u32);

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// SQL dialect family, derived from the driver name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Generic,
    Oracle,
}

impl Dialect {
    pub fn from_driver_name(driver: &str) -> Dialect {
        if driver.to_ascii_lowercase().contains("oracle") {
            Dialect::Oracle
        } else {
            Dialect::Generic
        }
    }

    /// Dialects that cannot bind LOB streams alongside other columns.
    pub fn has_lob_semantics(&self) -> bool {
        matches!(self, Dialect::Oracle)
    }
}

/// Source of pooled connections.
pub trait ConnectionPool: Send + Sync {
    /// Borrow a connection for the named datasource (`None` = default).
    fn acquire(&self, datasource: Option<&str>) -> SqlResult<Box<dyn Connection>>;

    /// Return a connection to the pool.
    fn release(&self, connection: Box<dyn Connection>) -> SqlResult<()>;
}

/// An open database connection.
pub trait Connection: Send {
    /// Driver identification, used to pick vendor-specific statement builders.
    fn driver_name(&self) -> &str;

    fn prepare(&mut self, sql: &str) -> SqlResult<Box<dyn PreparedStatement>>;

    /// Column metadata for a table, in table order.
    fn table_columns(&mut self, table: &Table) -> SqlResult<Vec<ColumnMeta>>;
}

/// A statement with positional (1-based) parameters.
pub trait PreparedStatement: Send {
    fn sql(&self) -> &str;

    fn bind(&mut self, position: usize, value: &BindValue) -> SqlResult<()>;

    /// Name the cursor opened by `execute_query`, for `WHERE CURRENT OF`.
    fn set_cursor_name(&mut self, name: &str) -> SqlResult<()>;

    fn execute_query(&mut self) -> SqlResult<Box<dyn RowCursor>>;

    /// Execute a data-modification statement, returning the affected row count.
    fn execute_update(&mut self) -> SqlResult<u64>;

    fn close(&mut self) -> SqlResult<()>;
}

/// Forward-only cursor over query results.
pub trait RowCursor: Send {
    fn columns(&self) -> Arc<[String]>;

    fn next_row(&mut self) -> SqlResult<Option<Row>>;

    fn close(&mut self) -> SqlResult<()>;
}

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Case-insensitive lookup; accepts `table.column` and matches on the column part.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let short = name.rsplit('.').next().unwrap_or(name);
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name) || c.eq_ignore_ascii_case(short))
            .and_then(|i| self.values.get(i))
    }

    /// Row as a JSON object for the document pipeline.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}
