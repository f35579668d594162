use std::sync::Arc;

use super::{BuildContext, InsertBuilder, UpdateBuilder, WriteSpec};
use crate::error::PlanResult;
use crate::exec::UpdateThenInsertStep;
use crate::model::{Login, Table};
use crate::statement::LobColumnInitializer;

/// UPDATE by key, falling back to INSERT of keys and columns.
#[derive(Debug, Clone)]
pub struct UpsertBuilder {
    update: UpdateBuilder,
    insert: InsertBuilder,
}

impl UpsertBuilder {
    pub fn new(table: Table, login: Login) -> Self {
        Self {
            update: UpdateBuilder::new(table.clone(), login.clone()),
            insert: InsertBuilder::new(table, login),
        }
    }

    pub fn build(&self, spec: &WriteSpec, ctx: &BuildContext<'_>) -> PlanResult<UpdateThenInsertStep> {
        self.build_with(spec, ctx, None)
    }

    /// The update writes NULLs too, so the row matches what the insert would
    /// have written.
    pub(crate) fn build_with(
        &self,
        spec: &WriteSpec,
        ctx: &BuildContext<'_>,
        lob: Option<&Arc<dyn LobColumnInitializer>>,
    ) -> PlanResult<UpdateThenInsertStep> {
        let update = self.update.build_with(spec, ctx, false, lob)?;
        let insert = self.insert.build_with(spec, ctx, lob)?;
        Ok(UpdateThenInsertStep::new(update, insert))
    }
}
