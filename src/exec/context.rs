use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::{Connection, ConnectionKey, ConnectionPool, PreparedStatement, Row, RowCursor};
use crate::error::{PlanError, PlanResult, SqlError, SqlResult};

/// Request parameters keyed by name
pub type BindVars = HashMap<String, Value>;

/// What the current caller may do to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLevel {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl AccessLevel {
    pub fn full() -> Self {
        Self {
            create: true,
            update: true,
            delete: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            create: false,
            update: false,
            delete: false,
        }
    }

    /// May update existing rows but never create new ones
    pub fn update_only() -> Self {
        Self {
            update: true,
            ..Self::read_only()
        }
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::full()
    }
}

/// Statistics about the statements a request executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub rows_selected: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub statements_executed: u64,
    /// Statements not executed because rendering left nothing to do
    pub statements_skipped: u64,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_modified(&self) -> u64 {
        self.rows_inserted + self.rows_updated + self.rows_deleted
    }

    pub fn has_mutations(&self) -> bool {
        self.total_modified() > 0
    }

    pub(crate) fn record(&mut self, action: TableChangeAction, rows: u64) {
        match action {
            TableChangeAction::Insert => self.rows_inserted += rows,
            TableChangeAction::Update => self.rows_updated += rows,
            TableChangeAction::Delete => self.rows_deleted += rows,
        }
    }
}

/// Kind of row change reported to listeners
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TableChangeAction {
    Insert,
    Update,
    Delete,
}

impl TableChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableChangeAction::Insert => "insert",
            TableChangeAction::Update => "update",
            TableChangeAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChangeEvent {
    pub table: String,
    pub action: TableChangeAction,
    pub rows: u64,
}

/// Receives row-change notifications, e.g. to invalidate cached documents.
pub trait TableChangeListener: Send + Sync {
    fn table_changed(&self, event: &TableChangeEvent);
}

/// Handle of a prepared statement registered in an [`ExecutionData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementHandle(u64);

struct OpenStatement {
    connection: ConnectionKey,
    statement: Box<dyn PreparedStatement>,
}

struct OpenResultSet {
    statement: StatementHandle,
    cursor: Box<dyn RowCursor>,
    current: Option<Row>,
}

/// Per-request execution scope.
///
/// Holds everything one request's steps share: open connections, prepared
/// statements, the stack of open result sets, statistics, and the request's
/// parameters. Never shared between requests. Dropping it releases every
/// connection back to the pool.
pub struct ExecutionData {
    pool: Arc<dyn ConnectionPool>,
    connections: HashMap<ConnectionKey, Box<dyn Connection>>,
    statements: HashMap<StatementHandle, OpenStatement>,
    next_statement: u64,
    result_sets: Vec<OpenResultSet>,
    params: BindVars,
    input_row: Option<Map<String, Value>>,
    access: AccessLevel,
    stats: ExecutionStats,
    listeners: Vec<Arc<dyn TableChangeListener>>,
    warnings: Vec<SqlError>,
    next_cursor: u64,
    closed: bool,
}

impl fmt::Debug for ExecutionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionData")
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("statements", &self.statements.len())
            .field("result_sets", &self.result_sets.len())
            .field("params", &self.params)
            .field("access", &self.access)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ExecutionData {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            connections: HashMap::new(),
            statements: HashMap::new(),
            next_statement: 0,
            result_sets: Vec::new(),
            params: BindVars::new(),
            input_row: None,
            access: AccessLevel::default(),
            stats: ExecutionStats::default(),
            listeners: Vec::new(),
            warnings: Vec::new(),
            next_cursor: 0,
            closed: false,
        }
    }

    pub fn with_params(mut self, params: BindVars) -> Self {
        self.params = params;
        self
    }

    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    // ==================== Request values ====================

    pub fn set_param(&mut self, name: &str, value: Value) {
        self.params.insert(name.to_string(), value);
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn params(&self) -> &BindVars {
        &self.params
    }

    /// Set the input row of an update batch; `None` clears it.
    pub fn set_input_row(&mut self, row: Option<Map<String, Value>>) {
        self.input_row = row;
    }

    pub fn input_field(&self, name: &str) -> Option<&Value> {
        self.input_row.as_ref().and_then(|row| row.get(name))
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    pub fn set_access(&mut self, access: AccessLevel) {
        self.access = access;
    }

    // ==================== Connections ====================

    /// Make sure a connection is open under `key`. Reuses an already open one.
    ///
    /// Opening after [`close`](Self::close) re-arms teardown, so the new connection
    /// is still released on the next close or on drop.
    pub fn open_connection(&mut self, key: ConnectionKey, datasource: Option<&str>) -> PlanResult<()> {
        if self.connections.contains_key(&key) {
            return Ok(());
        }
        let connection = self.pool.acquire(datasource)?;
        self.closed = false;
        tracing::debug!(
            "Opened {} ({}) for datasource {}",
            key,
            connection.driver_name(),
            datasource.unwrap_or("<default>")
        );
        self.connections.insert(key, connection);
        Ok(())
    }

    pub fn has_connection(&self, key: ConnectionKey) -> bool {
        self.connections.contains_key(&key)
    }

    pub fn connection(&mut self, key: ConnectionKey) -> PlanResult<&mut (dyn Connection + 'static)> {
        self.connections
            .get_mut(&key)
            .map(|c| c.as_mut())
            .ok_or(PlanError::MissingConnection(key))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ==================== Statements ====================

    /// Prepare `sql` on the connection under `key` and register the statement.
    pub fn prepare(&mut self, key: ConnectionKey, sql: &str) -> PlanResult<StatementHandle> {
        let statement = self.connection(key)?.prepare(sql)?;
        let handle = StatementHandle(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(
            handle,
            OpenStatement {
                connection: key,
                statement,
            },
        );
        Ok(handle)
    }

    pub fn statement(&mut self, handle: StatementHandle) -> PlanResult<&mut (dyn PreparedStatement + 'static)> {
        self.statements
            .get_mut(&handle)
            .map(|s| s.statement.as_mut())
            .ok_or_else(|| {
                PlanError::IllegalArgument(format!("statement {:?} is not registered", handle))
            })
    }

    /// Deregister and close a statement. Unknown handles are ignored.
    pub fn close_statement(&mut self, handle: StatementHandle) -> SqlResult<()> {
        match self.statements.remove(&handle) {
            Some(mut open) => open.statement.close(),
            None => Ok(()),
        }
    }

    /// Close `handle` after a failure, attaching any close error and pending
    /// warnings to `error`.
    pub(crate) fn abandon_statement(&mut self, handle: StatementHandle, error: PlanError) -> PlanError {
        let close = self.close_statement(handle);
        let error = match (error, close) {
            (PlanError::Sql(primary), Err(close)) => PlanError::Sql(primary.chain(close)),
            (error, Err(close)) => {
                tracing::warn!("Failed to close statement after error: {}", close);
                error
            }
            (error, Ok(())) => error,
        };
        match error {
            PlanError::Sql(mut primary) => {
                for warning in self.take_warnings() {
                    primary = primary.chain(warning);
                }
                PlanError::Sql(primary)
            }
            other => other,
        }
    }

    pub fn open_statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Cursor name unique within this request.
    pub fn next_cursor_name(&mut self, prefix: &str) -> String {
        self.next_cursor += 1;
        format!("{}_{}", prefix, self.next_cursor)
    }

    // ==================== Result sets ====================

    /// Push an open cursor; it becomes the source of `ResultColumn` values.
    pub(crate) fn push_result_set(&mut self, statement: StatementHandle, cursor: Box<dyn RowCursor>) {
        self.result_sets.push(OpenResultSet {
            statement,
            cursor,
            current: None,
        });
    }

    pub fn result_set_depth(&self) -> usize {
        self.result_sets.len()
    }

    /// Advance the top-most result set; `None` when it is exhausted or there is none.
    pub fn next_row(&mut self) -> PlanResult<Option<&Row>> {
        let Some(top) = self.result_sets.last_mut() else {
            return Ok(None);
        };
        top.current = top.cursor.next_row()?;
        if top.current.is_some() {
            self.stats.rows_selected += 1;
        }
        Ok(top.current.as_ref())
    }

    /// Current row of the top-most result set.
    pub fn current_row(&self) -> Option<&Row> {
        self.result_sets.last().and_then(|rs| rs.current.as_ref())
    }

    /// Pop the top-most result set, returning its not yet consumed rows as JSON
    /// documents. Its cursor and statement are closed.
    pub fn pop_result_set(&mut self) -> PlanResult<Option<Vec<Value>>> {
        let Some(mut top) = self.result_sets.pop() else {
            return Ok(None);
        };
        let mut docs = Vec::new();
        let drained = loop {
            match top.cursor.next_row() {
                Ok(Some(row)) => docs.push(row.to_json()),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stats.rows_selected += docs.len() as u64;

        let closed = top.cursor.close();
        let statement = self.close_statement(top.statement);
        match (drained, closed.and(statement)) {
            (Ok(()), Ok(())) => Ok(Some(docs)),
            (Err(primary), Err(close)) => Err(PlanError::Sql(primary.chain(close))),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(PlanError::Sql(e)),
        }
    }

    // ==================== Statistics & notifications ====================

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ExecutionStats {
        &mut self.stats
    }

    pub fn add_listener(&mut self, listener: Arc<dyn TableChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) fn notify(&self, event: TableChangeEvent) {
        for listener in &self.listeners {
            listener.table_changed(&event);
        }
    }

    pub fn add_warning(&mut self, warning: SqlError) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[SqlError] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<SqlError> {
        std::mem::take(&mut self.warnings)
    }

    // ==================== Teardown ====================

    /// Close every result set and statement and release all connections.
    ///
    /// Every resource is released even when some fail; the first failure is
    /// returned with the others chained to it.
    pub fn close(&mut self) -> PlanResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut failure: Option<SqlError> = None;
        let mut record = |result: SqlResult<()>, what: &str| {
            if let Err(e) = result {
                tracing::warn!("Failed to close {}: {}", what, e);
                failure = Some(match failure.take() {
                    Some(primary) => primary.chain(e),
                    None => e,
                });
            }
        };

        while let Some(mut rs) = self.result_sets.pop() {
            record(rs.cursor.close(), "cursor");
        }
        for (_, mut open) in self.statements.drain() {
            tracing::debug!("Closing leftover statement on {}", open.connection);
            record(open.statement.close(), "statement");
        }
        for (key, connection) in self.connections.drain() {
            tracing::debug!("Releasing {}", key);
            record(self.pool.release(connection), "connection");
        }

        match failure {
            Some(e) => Err(PlanError::Sql(e)),
            None => Ok(()),
        }
    }
}

impl Drop for ExecutionData {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Execution data closed with errors: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryPool;
    use crate::model::SqlValue;
    use serde_json::json;

    #[test]
    fn test_connections_released_on_drop() {
        let pool = MemoryPool::new("generic");
        {
            let mut data = ExecutionData::new(Arc::new(pool.clone()));
            data.open_connection(ConnectionKey(1), None).unwrap();
            data.open_connection(ConnectionKey(1), None).unwrap();
            data.open_connection(ConnectionKey(2), Some("archive")).unwrap();
            assert_eq!(data.connection_count(), 2);
        }
        assert_eq!(pool.acquired(), 2);
        assert_eq!(pool.released(), 2);
    }

    #[test]
    fn test_missing_connection() {
        let mut data = ExecutionData::new(Arc::new(MemoryPool::new("generic")));
        let err = data.prepare(ConnectionKey(9), "SELECT 1").unwrap_err();
        assert!(matches!(err, PlanError::MissingConnection(ConnectionKey(9))));
    }

    #[test]
    fn test_result_set_stack() {
        let pool = MemoryPool::new("generic");
        pool.on_query(
            "FROM CONTENT",
            &["ID", "TITLE"],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("a".into())],
                vec![SqlValue::Int(2), SqlValue::Text("b".into())],
            ],
        );
        let mut data = ExecutionData::new(Arc::new(pool.clone()));
        data.open_connection(ConnectionKey(1), None).unwrap();
        let handle = data.prepare(ConnectionKey(1), "SELECT ID, TITLE FROM CONTENT").unwrap();
        let cursor = data.statement(handle).unwrap().execute_query().unwrap();
        data.push_result_set(handle, cursor);

        assert!(data.current_row().is_none());
        let row = data.next_row().unwrap().unwrap();
        assert_eq!(row.get("ID"), Some(&SqlValue::Int(1)));
        assert_eq!(data.current_row().unwrap().get("TITLE"), Some(&SqlValue::Text("a".into())));

        let docs = data.pop_result_set().unwrap().unwrap();
        assert_eq!(docs, vec![json!({"ID": 2, "TITLE": "b"})]);
        assert_eq!(data.stats().rows_selected, 2);
        assert_eq!(data.open_statement_count(), 0);
        assert_eq!(pool.open_statements(), 0);
        assert_eq!(pool.open_cursors(), 0);
        assert!(data.pop_result_set().unwrap().is_none());
    }

    #[test]
    fn test_close_releases_leftovers() {
        let pool = MemoryPool::new("generic");
        let mut data = ExecutionData::new(Arc::new(pool.clone()));
        data.open_connection(ConnectionKey(1), None).unwrap();
        data.prepare(ConnectionKey(1), "DELETE FROM CONTENT").unwrap();
        assert_eq!(pool.open_statements(), 1);
        data.close().unwrap();
        assert_eq!(pool.open_statements(), 0);
        assert_eq!(pool.released(), 1);
        data.close().unwrap();
        assert_eq!(pool.released(), 1);
    }

    #[test]
    fn test_reopen_after_close_is_released_on_drop() {
        let pool = MemoryPool::new("generic");
        {
            let mut data = ExecutionData::new(Arc::new(pool.clone()));
            data.open_connection(ConnectionKey(1), None).unwrap();
            data.close().unwrap();
            assert_eq!(pool.released(), 1);

            data.open_connection(ConnectionKey(1), None).unwrap();
            assert_eq!(data.connection_count(), 1);
        }
        assert_eq!(pool.acquired(), 2);
        assert_eq!(pool.released(), 2);
    }

    #[test]
    fn test_cursor_names_unique() {
        let mut data = ExecutionData::new(Arc::new(MemoryPool::new("generic")));
        let a = data.next_cursor_name("CUR");
        let b = data.next_cursor_name("CUR");
        assert_ne!(a, b);
        assert!(a.starts_with("CUR_"));
    }
}
