//! Statement builders.
//!
//! A builder turns one table (or, for queries, one join graph) plus the columns to
//! read or write into a compiled execution step. Column types come from the shared
//! metadata cache, so a compiled step never queries database metadata again.

mod delete;
mod insert;
mod oracle;
mod query;
mod update;
mod upsert;

pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use oracle::OracleLobBuilder;
pub use query::{Predicate, QueryBuilder, SelectSpec, SortOrder};
pub use update::UpdateBuilder;
pub use upsert::UpsertBuilder;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::driver::ConnectionPool;
use crate::error::{PlanError, PlanResult};
use crate::exec::ExecutionStep;
use crate::extract::ValueExtractor;
use crate::model::{Column, ColumnMetadataCache, Login, Table, TableMetadata};
use crate::statement::{
    BlockList, LobColumnInitializer, OptionalBlock, StatementBlock, StatementColumn,
};

/// Kind of statement a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Query,
    Insert,
    Update,
    Delete,
    /// UPDATE, falling back to INSERT when no row was updated
    UpdateThenInsert,
}

/// A written (or key) column and the source of its value.
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    pub column: Column,
    pub extractor: Arc<dyn ValueExtractor>,
}

/// Ordered column bindings, at most one per column name.
#[derive(Debug, Clone, Default)]
pub struct ColumnBindings {
    entries: Vec<ColumnBinding>,
}

impl ColumnBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding; binding the same column twice is an error.
    pub fn insert(&mut self, column: Column, extractor: Arc<dyn ValueExtractor>) -> PlanResult<()> {
        if self.contains(&column) {
            return Err(PlanError::IllegalArgument(format!(
                "column {} is bound more than once",
                column
            )));
        }
        self.entries.push(ColumnBinding { column, extractor });
        Ok(())
    }

    pub fn with(mut self, column: Column, extractor: Arc<dyn ValueExtractor>) -> PlanResult<Self> {
        self.insert(column, extractor)?;
        Ok(self)
    }

    pub fn contains(&self, column: &Column) -> bool {
        self.entries.iter().any(|b| {
            b.column.table == column.table && b.column.name.eq_ignore_ascii_case(&column.name)
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnBinding> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ColumnBindings {
    type Item = &'a ColumnBinding;
    type IntoIter = std::slice::Iter<'a, ColumnBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Key columns (row selection) and value columns of a write.
#[derive(Debug, Clone, Default)]
pub struct WriteSpec {
    pub keys: ColumnBindings,
    pub columns: ColumnBindings,
}

impl WriteSpec {
    pub fn new(keys: ColumnBindings, columns: ColumnBindings) -> Self {
        Self { keys, columns }
    }

    /// Keys first, then value columns.
    pub fn all(&self) -> impl Iterator<Item = &ColumnBinding> {
        self.keys.iter().chain(self.columns.iter())
    }
}

/// Input handed to [`StatementBuilder::build`].
#[derive(Debug, Clone)]
pub enum StatementRequest {
    Select(SelectSpec),
    Write(WriteSpec),
}

impl From<SelectSpec> for StatementRequest {
    fn from(spec: SelectSpec) -> Self {
        StatementRequest::Select(spec)
    }
}

impl From<WriteSpec> for StatementRequest {
    fn from(spec: WriteSpec) -> Self {
        StatementRequest::Write(spec)
    }
}

/// Shared compile-time collaborators.
pub struct BuildContext<'a> {
    pub pool: &'a dyn ConnectionPool,
    pub metadata: &'a ColumnMetadataCache,
    pub config: &'a EngineConfig,
    pub lob_initializer: Arc<dyn LobColumnInitializer>,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("config", self.config)
            .field("lob_initializer", &self.lob_initializer)
            .finish()
    }
}

impl BuildContext<'_> {
    pub(crate) fn metadata_for(&self, login: &Login, table: &Table) -> PlanResult<Arc<TableMetadata>> {
        self.metadata.lookup(self.pool, login, table)
    }
}

/// A builder selected for one operation, table and dialect.
#[derive(Debug, Clone)]
pub enum StatementBuilder {
    Query(QueryBuilder),
    Insert(InsertBuilder),
    Update(UpdateBuilder),
    Delete(DeleteBuilder),
    UpdateThenInsert(UpsertBuilder),
    OracleLob(OracleLobBuilder),
}

impl StatementBuilder {
    pub fn operation(&self) -> OperationType {
        match self {
            StatementBuilder::Query(_) => OperationType::Query,
            StatementBuilder::Insert(_) => OperationType::Insert,
            StatementBuilder::Update(_) => OperationType::Update,
            StatementBuilder::Delete(_) => OperationType::Delete,
            StatementBuilder::UpdateThenInsert(_) => OperationType::UpdateThenInsert,
            StatementBuilder::OracleLob(b) => b.operation(),
        }
    }

    pub fn is_vendor_specific(&self) -> bool {
        matches!(self, StatementBuilder::OracleLob(_))
    }

    /// Compile `request` into an execution step.
    pub fn build(&self, request: &StatementRequest, ctx: &BuildContext<'_>) -> PlanResult<ExecutionStep> {
        match (self, request) {
            (StatementBuilder::Query(b), StatementRequest::Select(spec)) => {
                Ok(b.build(spec, ctx)?.into())
            }
            (StatementBuilder::Insert(b), StatementRequest::Write(spec)) => {
                Ok(b.build(spec, ctx)?.into())
            }
            (StatementBuilder::Update(b), StatementRequest::Write(spec)) => {
                Ok(b.build(spec, ctx)?.into())
            }
            (StatementBuilder::Delete(b), StatementRequest::Write(spec)) => {
                Ok(b.build(spec, ctx)?.into())
            }
            (StatementBuilder::UpdateThenInsert(b), StatementRequest::Write(spec)) => {
                Ok(b.build(spec, ctx)?.into())
            }
            (StatementBuilder::OracleLob(b), StatementRequest::Write(spec)) => b.build(spec, ctx),
            (builder, _) => Err(PlanError::IllegalArgument(format!(
                "{:?} builder cannot build this request",
                builder.operation()
            ))),
        }
    }

    /// Compile a positioned (`WHERE CURRENT OF`) UPDATE or DELETE.
    pub fn build_positioned(
        &self,
        spec: &WriteSpec,
        ctx: &BuildContext<'_>,
    ) -> PlanResult<ExecutionStep> {
        match self {
            StatementBuilder::Update(b) => Ok(b.build_positioned(spec, ctx)?.into()),
            StatementBuilder::Delete(b) => Ok(b.build_positioned(spec, ctx)?.into()),
            StatementBuilder::OracleLob(b) => Ok(b.build_positioned(spec, ctx)?.into()),
            other => Err(PlanError::IllegalArgument(format!(
                "positioned statements are not supported for {:?}",
                other.operation()
            ))),
        }
    }
}

/// Pick the builder for `op` on `table`.
///
/// Dialects with vendor LOB semantics get the vendor builder for INSERT and
/// UPDATE (and the update-then-insert combination); DELETE and queries always use
/// the generic builders. `allow_inserts` turns an UPDATE into an update-then-insert
/// and must be set for INSERT.
pub fn select_statement_builder(
    op: OperationType,
    table: &Table,
    login: &Login,
    allow_inserts: bool,
) -> PlanResult<StatementBuilder> {
    if table.server != login.server {
        return Err(PlanError::Config(format!(
            "table {} lives on {} but the login connects to {}",
            table.name, table.server, login.server
        )));
    }

    let op = match (op, allow_inserts) {
        (OperationType::Insert, false) => {
            return Err(PlanError::IllegalArgument(format!(
                "inserts into {} are not allowed",
                table.name
            )))
        }
        (OperationType::Update, true) => OperationType::UpdateThenInsert,
        (op, _) => op,
    };

    let vendor = login.dialect.has_lob_semantics()
        && matches!(
            op,
            OperationType::Insert | OperationType::Update | OperationType::UpdateThenInsert
        );
    if vendor {
        tracing::trace!("Using {:?} builder for {:?} on {}", login.dialect, op, table.name);
        return Ok(StatementBuilder::OracleLob(OracleLobBuilder::new(
            op,
            table.clone(),
            login.clone(),
        )));
    }

    Ok(match op {
        OperationType::Query => StatementBuilder::Query(QueryBuilder::new(table.clone(), login.clone())),
        OperationType::Insert => StatementBuilder::Insert(InsertBuilder::new(table.clone(), login.clone())),
        OperationType::Update => StatementBuilder::Update(UpdateBuilder::new(table.clone(), login.clone())),
        OperationType::Delete => StatementBuilder::Delete(DeleteBuilder::new(table.clone(), login.clone())),
        OperationType::UpdateThenInsert => {
            StatementBuilder::UpdateThenInsert(UpsertBuilder::new(table.clone(), login.clone()))
        }
    })
}

/// Every binding must target `table`.
pub(crate) fn check_single_table<'a>(
    table: &Table,
    bindings: impl IntoIterator<Item = &'a ColumnBinding>,
) -> PlanResult<()> {
    for binding in bindings {
        if &binding.column.table != table {
            return Err(PlanError::IllegalArgument(format!(
                "builder for {} is single table only; column {} belongs to {}",
                table.name, binding.column.name, binding.column.table.name
            )));
        }
    }
    Ok(())
}

/// Typed statement column for `binding`.
pub(crate) fn statement_column(
    metadata: &TableMetadata,
    binding: &ColumnBinding,
) -> PlanResult<StatementColumn> {
    let meta = metadata.require(&binding.column.name)?;
    Ok(StatementColumn::new(
        binding.column.clone(),
        Arc::clone(&binding.extractor),
        meta.sql_type,
    ))
}

/// ` WHERE k1 = ? AND k2 = ?` over `keys` (unqualified column names).
pub(crate) fn key_predicates(metadata: &TableMetadata, keys: &ColumnBindings) -> PlanResult<BlockList> {
    let mut list = BlockList::new(" AND ").with_prefix(" WHERE ");
    for key in keys {
        let mut item = OptionalBlock::new();
        item.add_text(&format!("{} = ", key.column.name));
        item.add_replacement_field(statement_column(metadata, key)?);
        list.push(StatementBlock::Optional(item));
    }
    Ok(list)
}

pub(crate) fn require_keys(table: &Table, spec: &WriteSpec, what: &str) -> PlanResult<()> {
    if spec.keys.is_empty() {
        return Err(PlanError::IllegalArgument(format!(
            "{} on {} needs at least one key column",
            what, table.name
        )));
    }
    Ok(())
}
