use crate::driver::ConnectionKey;
use crate::error::PlanResult;
use crate::statement::BlockSequence;

use super::{prepare_bound, ExecutionData};

/// Runs a SELECT and pushes its cursor onto the result-set stack.
#[derive(Debug, Clone)]
pub struct QueryStep {
    connection: ConnectionKey,
    statement: BlockSequence,
}

impl QueryStep {
    pub fn new(connection: ConnectionKey, statement: BlockSequence) -> Self {
        Self {
            connection,
            statement,
        }
    }

    pub fn connection(&self) -> ConnectionKey {
        self.connection
    }

    pub fn statement(&self) -> &BlockSequence {
        &self.statement
    }

    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        let rendered = self.statement.build_statement(Some(&*data))?;
        let handle = prepare_bound(data, self.connection, &rendered)?;
        let cursor = match data
            .statement(handle)
            .and_then(|stmt| stmt.execute_query().map_err(Into::into))
        {
            Ok(cursor) => cursor,
            Err(e) => return Err(data.abandon_statement(handle, e)),
        };
        data.stats_mut().statements_executed += 1;
        data.push_result_set(handle, cursor);
        Ok(())
    }
}
