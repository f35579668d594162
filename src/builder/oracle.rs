//! Oracle builder: large-object columns are written as `EMPTY_CLOB()`/`EMPTY_BLOB()`
//! placeholders and filled afterwards through the row's `ROWID`.

use std::sync::Arc;

use super::{
    key_predicates, statement_column, BuildContext, InsertBuilder, OperationType, UpdateBuilder,
    UpsertBuilder, WriteSpec,
};
use crate::error::{PlanError, PlanResult};
use crate::exec::{ExecutionStep, LobFill, LockedUpdateStep};
use crate::model::{Login, Table, TableMetadata};
use crate::statement::{BlockList, BlockSequence, OptionalBlock, StatementBlock};

#[derive(Debug, Clone)]
pub struct OracleLobBuilder {
    op: OperationType,
    table: Table,
    login: Login,
}

impl OracleLobBuilder {
    pub fn new(op: OperationType, table: Table, login: Login) -> Self {
        Self { op, table, login }
    }

    pub fn operation(&self) -> OperationType {
        self.op
    }

    /// Uses the LOB path only when a bound column is a LOB; otherwise the
    /// statement is identical to the generic one.
    pub fn build(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<ExecutionStep> {
        let lob = if ctx.config.lob.enabled && self.binds_lob(spec, ctx)? {
            tracing::debug!("Compiling {:?} on {} with deferred LOB columns", self.op, self.table.name);
            Some(&ctx.lob_initializer)
        } else {
            None
        };

        let table = self.table.clone();
        let login = self.login.clone();
        match self.op {
            OperationType::Insert => Ok(InsertBuilder::new(table, login).build_with(spec, ctx, lob)?.into()),
            OperationType::Update => Ok(UpdateBuilder::new(table, login)
                .build_with(spec, ctx, ctx.config.omit_null_update_columns, lob)?
                .into()),
            OperationType::UpdateThenInsert => {
                Ok(UpsertBuilder::new(table, login).build_with(spec, ctx, lob)?.into())
            }
            op => Err(PlanError::IllegalArgument(format!(
                "no LOB builder for {:?}",
                op
            ))),
        }
    }

    /// Positioned updates bind LOB columns directly.
    pub fn build_positioned(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<LockedUpdateStep> {
        match self.op {
            OperationType::Update => {
                UpdateBuilder::new(self.table.clone(), self.login.clone()).build_positioned(spec, ctx)
            }
            op => Err(PlanError::IllegalArgument(format!(
                "positioned statements are not supported for {:?}",
                op
            ))),
        }
    }

    fn binds_lob(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<bool> {
        let metadata = ctx.metadata_for(&self.login, &self.table)?;
        if !metadata.has_lob() {
            return Ok(false);
        }
        for binding in spec.all() {
            if metadata.require(&binding.column.name)?.is_lob() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Fill pass for a LOB write: rows are located by key, or by the written non-LOB
/// values when the table has no key bound.
pub(crate) fn lob_fill(
    table: &Table,
    metadata: &Arc<TableMetadata>,
    spec: &WriteSpec,
    ctx: &BuildContext<'_>,
) -> PlanResult<LobFill> {
    let row_id = &ctx.config.lob.row_id_column;
    let mut locate = BlockSequence::new();
    locate.add_text(&format!("SELECT {} FROM {}", row_id, table.qualified_name()));

    if spec.keys.is_empty() {
        let mut list = BlockList::new(" AND ").with_prefix(" WHERE ").required();
        for binding in &spec.columns {
            let column = statement_column(metadata, binding)?;
            if column.sql_type().is_lob() {
                continue;
            }
            let mut item = OptionalBlock::new().omit_when_null(true);
            item.add_text(&format!("{} = ", binding.column.name));
            item.add_replacement_field(column);
            list.push(StatementBlock::Optional(item));
        }
        if list.is_empty() {
            return Err(PlanError::IllegalArgument(format!(
                "cannot locate rows of {} for the LOB fill: no key or non-LOB column bound",
                table.name
            )));
        }
        locate.add_block(StatementBlock::List(list));
    } else {
        locate.add_block(StatementBlock::List(key_predicates(metadata, &spec.keys)?));
    }
    locate.add_text(" FOR UPDATE");

    Ok(LobFill::new(table.clone(), locate, row_id))
}
