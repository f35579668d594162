use crate::driver::ConnectionKey;
use crate::error::{PlanError, PlanResult};
use crate::model::Table;
use crate::statement::BlockSequence;

use super::{prepare_bound, run_update, ExecutionData, TableChangeAction, TableChangeEvent};

/// Positioned modification: lock candidate rows with a `FOR UPDATE` select, then
/// modify each one through `WHERE CURRENT OF <cursor>`.
///
/// While the step runs, the locked rows are the top-most result set, so the
/// modification can bind values from the row it is positioned on.
#[derive(Debug, Clone)]
pub struct LockedUpdateStep {
    connection: ConnectionKey,
    table: Table,
    action: TableChangeAction,
    select: BlockSequence,
    modify: BlockSequence,
    cursor_prefix: String,
}

impl LockedUpdateStep {
    /// `modify` is completed with the cursor name at run time and must end with
    /// `WHERE CURRENT OF `.
    pub fn new(
        connection: ConnectionKey,
        table: Table,
        action: TableChangeAction,
        select: BlockSequence,
        modify: BlockSequence,
        cursor_prefix: &str,
    ) -> Self {
        Self {
            connection,
            table,
            action,
            select,
            modify,
            cursor_prefix: cursor_prefix.to_string(),
        }
    }

    pub fn select(&self) -> &BlockSequence {
        &self.select
    }

    pub fn modify(&self) -> &BlockSequence {
        &self.modify
    }

    /// Returns the total affected row count.
    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<u64> {
        let cursor_name = data.next_cursor_name(&self.cursor_prefix);
        let select = self.select.build_statement(Some(&*data))?;
        let handle = prepare_bound(data, self.connection, &select)?;

        let opened = data.statement(handle).and_then(|stmt| {
            stmt.set_cursor_name(&cursor_name)?;
            Ok(stmt.execute_query()?)
        });
        let cursor = match opened {
            Ok(cursor) => cursor,
            Err(e) => return Err(data.abandon_statement(handle, e)),
        };
        data.stats_mut().statements_executed += 1;
        data.push_result_set(handle, cursor);

        let depth = data.result_set_depth();
        let result = self.modify_rows(data, &cursor_name);
        let popped = if data.result_set_depth() == depth {
            data.pop_result_set().map(|_| ())
        } else {
            Ok(())
        };

        match (result, popped) {
            (Ok(total), Ok(())) => Ok(total),
            (Err(PlanError::Sql(primary)), Err(PlanError::Sql(close))) => {
                Err(PlanError::Sql(primary.chain(close)))
            }
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    fn modify_rows(&self, data: &mut ExecutionData, cursor_name: &str) -> PlanResult<u64> {
        let mut total = 0;
        while data.next_row()?.is_some() {
            let mut rendered = self.modify.build_statement(Some(&*data))?;
            if !rendered.has_effect() {
                data.stats_mut().statements_skipped += 1;
                continue;
            }
            rendered.sql.push_str(cursor_name);

            let count = run_update(data, self.connection, &rendered)?;
            rendered.release_column_data();
            data.stats_mut().record(self.action, count);
            total += count;

            if count > 0 && data.has_listeners() {
                data.notify(TableChangeEvent {
                    table: self.table.name.clone(),
                    action: self.action,
                    rows: count,
                });
            }
        }
        if total == 0 {
            tracing::debug!("No {} rows locked by {}", self.table.name, cursor_name);
        }
        Ok(total)
    }
}
