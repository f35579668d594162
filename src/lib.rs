//! docsql: request-time SQL execution plans for document-serving applications.
//!
//! A declarative mapping between documents and relational tables is compiled once
//! into an [`ExecutionPlan`] of steps (connect, query, insert/update/delete,
//! positioned update, update-then-insert, conditional blocks). Each request runs
//! the shared plan against its own [`ExecutionData`], binding values taken from
//! the request and from earlier result sets.

pub mod builder;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod error;
pub mod exec;
pub mod extract;
pub mod join_tree;
pub mod logging;
pub mod model;
pub mod rules;
pub mod statement;

pub use builder::{
    select_statement_builder, ColumnBindings, OperationType, Predicate, SelectSpec, SortOrder,
    StatementBuilder, StatementRequest, WriteSpec,
};
pub use compiler::PlanCompiler;
pub use config::EngineConfig;
pub use driver::{ConnectionKey, ConnectionPool, Dialect, MemoryPool};
pub use error::{ExtractionError, ExtractionErrorCode, PlanError, PlanResult, SqlError, SqlResult};
pub use exec::{
    AccessLevel, BindVars, ExecutionData, ExecutionPlan, ExecutionStats, ExecutionStep,
    TableChangeAction, TableChangeEvent, TableChangeListener,
};
pub use extract::{ExtensionRegistry, ValueExtractor};
pub use join_tree::JoinTree;
pub use model::{Column, Join, JoinKind, Login, ServerKey, SqlType, SqlValue, Table};
pub use rules::{BoolOp, RuleDefinition, RuleEvaluator};
