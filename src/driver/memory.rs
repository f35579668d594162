//! Scriptable in-memory driver.
//!
//! Records every statement the engine prepares, binds and executes, and answers
//! with scripted update counts, result rows or failures. Responses are matched by
//! SQL fragment (first registered match wins).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connection, ConnectionPool, PreparedStatement, Row, RowCursor};
use crate::error::{SqlError, SqlResult};
use crate::model::{BindValue, ColumnMeta, SqlValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    Query,
    Update,
}

/// One executed statement as seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub binds: Vec<(usize, BindValue)>,
    pub kind: ExecKind,
    pub cursor_name: Option<String>,
}

impl ExecutedStatement {
    pub fn bind_values(&self) -> Vec<SqlValue> {
        self.binds.iter().map(|(_, b)| b.value.clone()).collect()
    }
}

struct ScriptedQuery {
    fragment: String,
    columns: Arc<[String]>,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Default)]
struct MemoryState {
    driver_name: String,
    tables: HashMap<String, Vec<ColumnMeta>>,
    updates: Vec<(String, VecDeque<u64>)>,
    default_update_count: u64,
    queries: Vec<ScriptedQuery>,
    failures: Vec<(String, SqlError)>,
    prepared: Vec<String>,
    executed: Vec<ExecutedStatement>,
    open_statements: usize,
    open_cursors: usize,
    acquired: usize,
    released: usize,
    metadata_lookups: usize,
}

impl MemoryState {
    fn failure_for(&self, sql: &str) -> Option<SqlError> {
        self.failures
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, err)| err.clone())
    }
}

/// Connection pool backed by shared in-memory state.
#[derive(Clone)]
pub struct MemoryPool {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPool {
    pub fn new(driver_name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                driver_name: driver_name.to_string(),
                default_update_count: 1,
                ..Default::default()
            })),
        }
    }

    /// Register table metadata returned by `table_columns`.
    pub fn add_table(&self, table: &str, columns: Vec<ColumnMeta>) {
        self.state
            .lock()
            .tables
            .insert(table.to_ascii_uppercase(), columns);
    }

    /// Update count returned by statements matching no scripted fragment.
    pub fn set_default_update_count(&self, count: u64) {
        self.state.lock().default_update_count = count;
    }

    /// Script the update count of statements containing `fragment`.
    pub fn on_update(&self, fragment: &str, count: u64) {
        self.on_update_sequence(fragment, vec![count]);
    }

    /// Script successive update counts; the last one repeats.
    pub fn on_update_sequence(&self, fragment: &str, counts: Vec<u64>) {
        self.state
            .lock()
            .updates
            .push((fragment.to_string(), counts.into_iter().collect()));
    }

    /// Script the rows returned by queries containing `fragment`.
    pub fn on_query(&self, fragment: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        self.state.lock().queries.push(ScriptedQuery {
            fragment: fragment.to_string(),
            columns,
            rows,
        });
    }

    /// Fail execution of statements containing `fragment`.
    pub fn fail_on(&self, fragment: &str, error: SqlError) {
        self.state
            .lock()
            .failures
            .push((fragment.to_string(), error));
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.lock().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .executed
            .iter()
            .map(|e| e.sql.clone())
            .collect()
    }

    pub fn prepared_sql(&self) -> Vec<String> {
        self.state.lock().prepared.clone()
    }

    pub fn open_statements(&self) -> usize {
        self.state.lock().open_statements
    }

    pub fn open_cursors(&self) -> usize {
        self.state.lock().open_cursors
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    pub fn metadata_lookups(&self) -> usize {
        self.state.lock().metadata_lookups
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.prepared.clear();
        state.executed.clear();
    }
}

impl ConnectionPool for MemoryPool {
    fn acquire(&self, _datasource: Option<&str>) -> SqlResult<Box<dyn Connection>> {
        let mut state = self.state.lock();
        state.acquired += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            driver_name: state.driver_name.clone(),
        }))
    }

    fn release(&self, _connection: Box<dyn Connection>) -> SqlResult<()> {
        self.state.lock().released += 1;
        Ok(())
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    driver_name: String,
}

impl Connection for MemoryConnection {
    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn prepare(&mut self, sql: &str) -> SqlResult<Box<dyn PreparedStatement>> {
        let mut state = self.state.lock();
        state.prepared.push(sql.to_string());
        state.open_statements += 1;
        Ok(Box::new(MemoryStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
            params: sql.matches('?').count(),
            binds: BTreeMap::new(),
            cursor_name: None,
            closed: false,
        }))
    }

    fn table_columns(&mut self, table: &Table) -> SqlResult<Vec<ColumnMeta>> {
        let mut state = self.state.lock();
        state.metadata_lookups += 1;
        state
            .tables
            .get(&table.name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| SqlError::new(format!("table or view does not exist: {}", table.name)))
    }
}

struct MemoryStatement {
    state: Arc<Mutex<MemoryState>>,
    sql: String,
    params: usize,
    binds: BTreeMap<usize, BindValue>,
    cursor_name: Option<String>,
    closed: bool,
}

impl MemoryStatement {
    fn check_open(&self) -> SqlResult<()> {
        if self.closed {
            return Err(SqlError::new("statement is closed"));
        }
        Ok(())
    }

    fn record(&self, state: &mut MemoryState, kind: ExecKind) {
        state.executed.push(ExecutedStatement {
            sql: self.sql.clone(),
            binds: self.binds.iter().map(|(p, v)| (*p, v.clone())).collect(),
            kind,
            cursor_name: self.cursor_name.clone(),
        });
    }
}

impl PreparedStatement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, position: usize, value: &BindValue) -> SqlResult<()> {
        self.check_open()?;
        if position == 0 || position > self.params {
            return Err(SqlError::new(format!(
                "parameter index out of range: {} (statement has {})",
                position, self.params
            ))
            .with_state("07009", 17003));
        }
        self.binds.insert(position, value.clone());
        Ok(())
    }

    fn set_cursor_name(&mut self, name: &str) -> SqlResult<()> {
        self.check_open()?;
        self.cursor_name = Some(name.to_string());
        Ok(())
    }

    fn execute_query(&mut self) -> SqlResult<Box<dyn RowCursor>> {
        self.check_open()?;
        let mut state = self.state.lock();
        if let Some(err) = state.failure_for(&self.sql) {
            return Err(err);
        }
        self.record(&mut state, ExecKind::Query);
        let (columns, rows) = state
            .queries
            .iter()
            .find(|q| self.sql.contains(q.fragment.as_str()))
            .map(|q| (Arc::clone(&q.columns), q.rows.clone()))
            .unwrap_or_else(|| (Arc::from(Vec::<String>::new()), Vec::new()));
        state.open_cursors += 1;
        Ok(Box::new(MemoryCursor {
            state: Arc::clone(&self.state),
            columns,
            rows: rows.into(),
            closed: false,
        }))
    }

    fn execute_update(&mut self) -> SqlResult<u64> {
        self.check_open()?;
        let mut state = self.state.lock();
        if let Some(err) = state.failure_for(&self.sql) {
            return Err(err);
        }
        self.record(&mut state, ExecKind::Update);
        let default = state.default_update_count;
        let count = state
            .updates
            .iter_mut()
            .find(|(fragment, _)| self.sql.contains(fragment.as_str()))
            .map(|(_, counts)| {
                if counts.len() > 1 {
                    counts.pop_front().unwrap_or(default)
                } else {
                    counts.front().copied().unwrap_or(default)
                }
            })
            .unwrap_or(default);
        Ok(count)
    }

    fn close(&mut self) -> SqlResult<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.state.lock();
            state.open_statements = state.open_statements.saturating_sub(1);
        }
        Ok(())
    }
}

struct MemoryCursor {
    state: Arc<Mutex<MemoryState>>,
    columns: Arc<[String]>,
    rows: VecDeque<Vec<SqlValue>>,
    closed: bool,
}

impl RowCursor for MemoryCursor {
    fn columns(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    fn next_row(&mut self) -> SqlResult<Option<Row>> {
        if self.closed {
            return Err(SqlError::new("cursor is closed"));
        }
        Ok(self
            .rows
            .pop_front()
            .map(|values| Row::new(Arc::clone(&self.columns), values)))
    }

    fn close(&mut self) -> SqlResult<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.state.lock();
            state.open_cursors = state.open_cursors.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServerKey, SqlType};

    #[test]
    fn test_scripted_update_and_log() {
        let pool = MemoryPool::new("generic");
        pool.on_update("UPDATE ITEMS", 3);
        let mut conn = pool.acquire(None).unwrap();
        let mut stmt = conn.prepare("UPDATE ITEMS SET A = ? WHERE ID = ?").unwrap();
        stmt.bind(1, &BindValue::new(SqlValue::Int(1), SqlType::Integer))
            .unwrap();
        stmt.bind(2, &BindValue::null(SqlType::Integer)).unwrap();
        assert!(stmt
            .bind(3, &BindValue::null(SqlType::Integer))
            .is_err());
        assert_eq!(stmt.execute_update().unwrap(), 3);
        assert_eq!(pool.open_statements(), 1);
        stmt.close().unwrap();
        assert_eq!(pool.open_statements(), 0);

        let executed = pool.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].binds.len(), 2);
        pool.release(conn).unwrap();
        assert_eq!(pool.acquired(), pool.released());
    }

    #[test]
    fn test_scripted_query_and_failure() {
        let pool = MemoryPool::new("generic");
        pool.on_query("FROM ITEMS", &["ID"], vec![vec![SqlValue::Int(1)]]);
        pool.fail_on("FROM BROKEN", SqlError::new("boom"));
        let mut conn = pool.acquire(None).unwrap();

        let mut stmt = conn.prepare("SELECT ID FROM ITEMS").unwrap();
        let mut cursor = stmt.execute_query().unwrap();
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_none());
        cursor.close().unwrap();

        let mut broken = conn.prepare("SELECT ID FROM BROKEN").unwrap();
        assert_eq!(broken.execute_query().err().unwrap().message, "boom");

        let table = Table::new("missing", ServerKey::new("generic", "db"));
        assert!(conn.table_columns(&table).is_err());
    }
}
