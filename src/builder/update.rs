use std::sync::Arc;

use super::{check_single_table, key_predicates, oracle, require_keys, statement_column, BuildContext, WriteSpec};
use crate::error::{PlanError, PlanResult};
use crate::exec::{LockedUpdateStep, ModifyStep, TableChangeAction};
use crate::model::{Login, Table, TableMetadata};
use crate::statement::{BlockList, BlockSequence, LobColumnInitializer, OptionalBlock, StatementBlock};

/// `UPDATE t SET c = ?, .. WHERE k = ? AND ..`.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: Table,
    login: Login,
}

impl UpdateBuilder {
    pub fn new(table: Table, login: Login) -> Self {
        Self { table, login }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// NULL SET values are left out when the engine is configured to do so; an
    /// update left with no SET column is skipped at run time.
    pub fn build(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<ModifyStep> {
        self.build_with(spec, ctx, ctx.config.omit_null_update_columns, None)
    }

    pub(crate) fn build_with(
        &self,
        spec: &WriteSpec,
        ctx: &BuildContext<'_>,
        omit_nulls: bool,
        lob: Option<&Arc<dyn LobColumnInitializer>>,
    ) -> PlanResult<ModifyStep> {
        check_single_table(&self.table, spec.all())?;
        require_keys(&self.table, spec, "update")?;
        let metadata = ctx.metadata_for(&self.login, &self.table)?;

        let mut sequence = BlockSequence::new();
        sequence.add_text(&format!("UPDATE {} SET ", self.table.qualified_name()));
        let (assignments, has_lob) = self.assignments(&metadata, spec, omit_nulls, lob)?;
        sequence.add_block(StatementBlock::List(assignments));
        sequence.add_block(StatementBlock::List(key_predicates(&metadata, &spec.keys)?));

        let mut step = ModifyStep::new(
            self.login.key,
            self.table.clone(),
            TableChangeAction::Update,
            sequence,
        );
        if has_lob {
            step = step.with_lob_fill(oracle::lob_fill(&self.table, &metadata, spec, ctx)?);
        }
        Ok(step)
    }

    /// Lock the rows matching the keys, then update each through its cursor.
    pub fn build_positioned(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<LockedUpdateStep> {
        check_single_table(&self.table, spec.all())?;
        require_keys(&self.table, spec, "positioned update")?;
        let metadata = ctx.metadata_for(&self.login, &self.table)?;

        let select = locking_select(&self.table, &metadata, spec)?;
        let mut modify = BlockSequence::new();
        modify.add_text(&format!("UPDATE {} SET ", self.table.qualified_name()));
        let (assignments, _) =
            self.assignments(&metadata, spec, ctx.config.omit_null_update_columns, None)?;
        modify.add_block(StatementBlock::List(assignments));
        modify.add_text(" WHERE CURRENT OF ");

        Ok(LockedUpdateStep::new(
            self.login.key,
            self.table.clone(),
            TableChangeAction::Update,
            select,
            modify,
            &ctx.config.cursor_prefix,
        ))
    }

    fn assignments(
        &self,
        metadata: &TableMetadata,
        spec: &WriteSpec,
        omit_nulls: bool,
        lob: Option<&Arc<dyn LobColumnInitializer>>,
    ) -> PlanResult<(BlockList, bool)> {
        if spec.columns.is_empty() {
            return Err(PlanError::IllegalArgument(format!(
                "update of {} sets no columns",
                self.table.name
            )));
        }

        let mut list = BlockList::new(", ").required();
        let mut has_lob = false;
        for binding in &spec.columns {
            let mut column = statement_column(metadata, binding)?;
            if let Some(initializer) = lob.filter(|_| column.sql_type().is_lob()) {
                column = column.with_lob_initializer(Arc::clone(initializer));
                has_lob = true;
            }
            let mut item = OptionalBlock::new().omit_when_null(omit_nulls);
            item.add_text(&format!("{} = ", binding.column.name));
            item.add_replacement_field(column);
            list.push(StatementBlock::Optional(item));
        }
        Ok((list, has_lob))
    }
}

/// `SELECT k.. FROM t WHERE k = ? .. FOR UPDATE`, the cursor of a positioned statement.
pub(crate) fn locking_select(table: &Table, metadata: &TableMetadata, spec: &WriteSpec) -> PlanResult<BlockSequence> {
    let keys = spec
        .keys
        .iter()
        .map(|k| k.column.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut select = BlockSequence::new();
    select.add_text(&format!("SELECT {} FROM {}", keys, table.qualified_name()));
    select.add_block(StatementBlock::List(key_predicates(metadata, &spec.keys)?));
    select.add_text(" FOR UPDATE");
    Ok(select)
}
