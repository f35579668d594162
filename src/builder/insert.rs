use std::sync::Arc;

use super::{check_single_table, oracle, statement_column, BuildContext, WriteSpec};
use crate::error::{PlanError, PlanResult};
use crate::exec::{ModifyStep, TableChangeAction};
use crate::model::{Login, Table};
use crate::statement::{BlockSequence, LobColumnInitializer};

/// `INSERT INTO t (k.., c..) VALUES (?, ..)`.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: Table,
    login: Login,
}

impl InsertBuilder {
    pub fn new(table: Table, login: Login) -> Self {
        Self { table, login }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn build(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<ModifyStep> {
        self.build_with(spec, ctx, None)
    }

    /// With `lob`, LOB columns get the initializer's placeholder and the step
    /// fills them in a second pass.
    pub(crate) fn build_with(
        &self,
        spec: &WriteSpec,
        ctx: &BuildContext<'_>,
        lob: Option<&Arc<dyn LobColumnInitializer>>,
    ) -> PlanResult<ModifyStep> {
        check_single_table(&self.table, spec.all())?;
        if spec.keys.is_empty() && spec.columns.is_empty() {
            return Err(PlanError::IllegalArgument(format!(
                "insert into {} has no columns",
                self.table.name
            )));
        }
        let metadata = ctx.metadata_for(&self.login, &self.table)?;

        let mut sequence = BlockSequence::new();
        let names = spec
            .all()
            .map(|b| b.column.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        sequence.add_text(&format!(
            "INSERT INTO {} ({}) VALUES (",
            self.table.qualified_name(),
            names
        ));

        let mut has_lob = false;
        for (i, binding) in spec.all().enumerate() {
            if i > 0 {
                sequence.add_text(", ");
            }
            let mut column = statement_column(&metadata, binding)?;
            if let Some(initializer) = lob.filter(|_| column.sql_type().is_lob()) {
                column = column.with_lob_initializer(Arc::clone(initializer));
                has_lob = true;
            }
            sequence.add_replacement_field(column);
        }
        sequence.add_text(")");

        let mut step = ModifyStep::new(
            self.login.key,
            self.table.clone(),
            TableChangeAction::Insert,
            sequence,
        );
        if has_lob {
            step = step.with_lob_fill(oracle::lob_fill(&self.table, &metadata, spec, ctx)?);
        }
        Ok(step)
    }
}
