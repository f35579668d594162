use crate::driver::ConnectionKey;
use crate::error::PlanResult;
use crate::model::Table;
use crate::statement::BlockSequence;

use super::{run_update, ExecutionData, LobFill, TableChangeAction, TableChangeEvent};

/// Runs one INSERT, UPDATE or DELETE.
#[derive(Debug, Clone)]
pub struct ModifyStep {
    connection: ConnectionKey,
    table: Table,
    action: TableChangeAction,
    statement: BlockSequence,
    lob_fill: Option<LobFill>,
}

impl ModifyStep {
    pub fn new(
        connection: ConnectionKey,
        table: Table,
        action: TableChangeAction,
        statement: BlockSequence,
    ) -> Self {
        Self {
            connection,
            table,
            action,
            statement,
            lob_fill: None,
        }
    }

    /// Fill deferred LOB values after the statement wrote its placeholders.
    pub fn with_lob_fill(mut self, fill: LobFill) -> Self {
        self.lob_fill = Some(fill);
        self
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn action(&self) -> TableChangeAction {
        self.action
    }

    pub fn statement(&self) -> &BlockSequence {
        &self.statement
    }

    pub fn lob_fill(&self) -> Option<&LobFill> {
        self.lob_fill.as_ref()
    }

    /// Returns the affected row count.
    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<u64> {
        let mut rendered = self.statement.build_statement(Some(&*data))?;
        if !rendered.has_effect() {
            tracing::debug!(
                "Skipping {} on {}: nothing to write",
                self.action.as_str(),
                self.table.name
            );
            data.stats_mut().statements_skipped += 1;
            return Ok(0);
        }

        let count = run_update(data, self.connection, &rendered)?;
        data.stats_mut().record(self.action, count);

        if count > 0 {
            if let Some(fill) = &self.lob_fill {
                fill.execute(data, self.connection, &rendered)?;
            }
            if data.has_listeners() {
                data.notify(TableChangeEvent {
                    table: self.table.name.clone(),
                    action: self.action,
                    rows: count,
                });
            }
        }
        rendered.release_column_data();
        Ok(count)
    }
}
