use super::update::locking_select;
use super::{check_single_table, key_predicates, require_keys, BuildContext, WriteSpec};
use crate::error::PlanResult;
use crate::exec::{LockedUpdateStep, ModifyStep, TableChangeAction};
use crate::model::{Login, Table};
use crate::statement::{BlockSequence, StatementBlock};

/// `DELETE FROM t WHERE k = ? AND ..`. Value columns are ignored.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: Table,
    login: Login,
}

impl DeleteBuilder {
    pub fn new(table: Table, login: Login) -> Self {
        Self { table, login }
    }

    pub fn build(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<ModifyStep> {
        check_single_table(&self.table, spec.all())?;
        require_keys(&self.table, spec, "delete")?;
        let metadata = ctx.metadata_for(&self.login, &self.table)?;

        let mut sequence = BlockSequence::new();
        sequence.add_text(&format!("DELETE FROM {}", self.table.qualified_name()));
        sequence.add_block(StatementBlock::List(key_predicates(&metadata, &spec.keys)?));
        Ok(ModifyStep::new(
            self.login.key,
            self.table.clone(),
            TableChangeAction::Delete,
            sequence,
        ))
    }

    pub fn build_positioned(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<LockedUpdateStep> {
        check_single_table(&self.table, spec.all())?;
        require_keys(&self.table, spec, "positioned delete")?;
        let metadata = ctx.metadata_for(&self.login, &self.table)?;

        let mut modify = BlockSequence::new();
        modify.add_text(&format!(
            "DELETE FROM {} WHERE CURRENT OF ",
            self.table.qualified_name()
        ));
        Ok(LockedUpdateStep::new(
            self.login.key,
            self.table.clone(),
            TableChangeAction::Delete,
            locking_select(&self.table, &metadata, spec)?,
            modify,
            &ctx.config.cursor_prefix,
        ))
    }
}
