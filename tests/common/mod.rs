//! Common test utilities for docsql tests
//!
//! Provides shared helper functions for:
//! - Creating in-memory driver pools with registered tables
//! - Creating plan compilers bound to those pools
//! - Building column bindings and execution data

#![allow(dead_code)]

use std::sync::Arc;

use docsql::extract::{InputField, Literal, RequestParameter};
use docsql::model::ColumnMeta;
use docsql::{
    BindVars, Column, ColumnBindings, ConnectionKey, EngineConfig, ExecutionData, Login,
    MemoryPool, PlanCompiler, ServerKey, SqlValue, Table, ValueExtractor, WriteSpec,
};
use serde_json::Value;

pub const CONTENT_KEY: ConnectionKey = ConnectionKey(1);

pub fn oracle_server() -> ServerKey {
    ServerKey::new("oracle.jdbc.OracleDriver", "content")
}

pub fn generic_server() -> ServerKey {
    ServerKey::new("postgresql", "content")
}

pub fn docs(server: &ServerKey) -> Table {
    Table::new("DOCS", server.clone())
}

pub fn authors(server: &ServerKey) -> Table {
    Table::new("AUTHORS", server.clone())
}

/// Pool knowing the DOCS and AUTHORS tables.
pub fn create_test_pool(driver: &str) -> MemoryPool {
    let pool = MemoryPool::new(driver);
    pool.add_table(
        "DOCS",
        vec![
            ColumnMeta::new("ID", "NUMBER").not_null(),
            ColumnMeta::new("TITLE", "VARCHAR2"),
            ColumnMeta::new("AUTHOR_ID", "NUMBER"),
            ColumnMeta::new("BODY", "CLOB"),
            ColumnMeta::new("IMAGE", "BLOB"),
        ],
    );
    pool.add_table(
        "AUTHORS",
        vec![
            ColumnMeta::new("ID", "NUMBER").not_null(),
            ColumnMeta::new("NAME", "VARCHAR2"),
        ],
    );
    pool
}

/// Compiler with a login registered for `server`.
pub fn create_test_compiler(pool: &MemoryPool, server: &ServerKey) -> PlanCompiler {
    create_configured_compiler(pool, server, EngineConfig::default())
}

pub fn create_configured_compiler(
    pool: &MemoryPool,
    server: &ServerKey,
    config: EngineConfig,
) -> PlanCompiler {
    let mut compiler = PlanCompiler::new(config, Arc::new(pool.clone()));
    compiler.register_login(Login::new(CONTENT_KEY, server.clone()).with_datasource("content"));
    compiler
}

pub fn create_execution_data(pool: &MemoryPool, params: Value) -> ExecutionData {
    let params: BindVars = params
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    ExecutionData::new(Arc::new(pool.clone())).with_params(params)
}

pub fn param(name: &str) -> Arc<dyn ValueExtractor> {
    Arc::new(RequestParameter::new(name).with_default(Value::Null))
}

pub fn field(name: &str) -> Arc<dyn ValueExtractor> {
    Arc::new(InputField::new(name))
}

pub fn literal(value: SqlValue) -> Arc<dyn ValueExtractor> {
    Arc::new(Literal(value))
}

/// Bind each named column of `table` to the request parameter of the same name
/// in lower case.
pub fn bind_params(table: &Table, columns: &[&str]) -> ColumnBindings {
    let mut bindings = ColumnBindings::new();
    for name in columns {
        bindings
            .insert(Column::new(table, name), param(&name.to_ascii_lowercase()))
            .unwrap();
    }
    bindings
}

pub fn write_spec(table: &Table, keys: &[&str], columns: &[&str]) -> WriteSpec {
    WriteSpec::new(bind_params(table, keys), bind_params(table, columns))
}
