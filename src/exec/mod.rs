//! Execution steps and the per-request execution context.
//!
//! A compiled [`ExecutionPlan`] is immutable and shared by every request. Each
//! request runs it against its own [`ExecutionData`], which owns the connections,
//! statements and result sets the steps open.

mod conditional;
mod connect;
mod context;
mod lob_fill;
mod locked;
mod modify;
mod query;
mod upsert;

pub use conditional::ConditionalBlock;
pub use connect::ConnectStep;
pub use context::{
    AccessLevel, BindVars, ExecutionData, ExecutionStats, StatementHandle, TableChangeAction,
    TableChangeEvent, TableChangeListener,
};
pub use lob_fill::LobFill;
pub use locked::LockedUpdateStep;
pub use modify::ModifyStep;
pub use query::QueryStep;
pub use upsert::UpdateThenInsertStep;

use serde_json::{Map, Value};

use crate::driver::ConnectionKey;
use crate::error::PlanResult;
use crate::statement::RenderedStatement;

/// One node of a compiled plan.
#[derive(Debug, Clone)]
pub enum ExecutionStep {
    Connect(ConnectStep),
    Query(QueryStep),
    Modify(ModifyStep),
    LockedUpdate(LockedUpdateStep),
    UpdateThenInsert(UpdateThenInsertStep),
    Conditional(ConditionalBlock),
}

impl ExecutionStep {
    pub fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        match self {
            ExecutionStep::Connect(step) => step.execute(data),
            ExecutionStep::Query(step) => step.execute(data),
            ExecutionStep::Modify(step) => step.execute(data).map(|_| ()),
            ExecutionStep::LockedUpdate(step) => step.execute(data).map(|_| ()),
            ExecutionStep::UpdateThenInsert(step) => step.execute(data),
            ExecutionStep::Conditional(step) => step.execute(data),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionStep::Connect(_) => "connect",
            ExecutionStep::Query(_) => "query",
            ExecutionStep::Modify(_) => "modify",
            ExecutionStep::LockedUpdate(_) => "locked_update",
            ExecutionStep::UpdateThenInsert(_) => "update_then_insert",
            ExecutionStep::Conditional(_) => "conditional",
        }
    }
}

impl From<ConnectStep> for ExecutionStep {
    fn from(step: ConnectStep) -> Self {
        ExecutionStep::Connect(step)
    }
}

impl From<QueryStep> for ExecutionStep {
    fn from(step: QueryStep) -> Self {
        ExecutionStep::Query(step)
    }
}

impl From<ModifyStep> for ExecutionStep {
    fn from(step: ModifyStep) -> Self {
        ExecutionStep::Modify(step)
    }
}

impl From<LockedUpdateStep> for ExecutionStep {
    fn from(step: LockedUpdateStep) -> Self {
        ExecutionStep::LockedUpdate(step)
    }
}

impl From<UpdateThenInsertStep> for ExecutionStep {
    fn from(step: UpdateThenInsertStep) -> Self {
        ExecutionStep::UpdateThenInsert(step)
    }
}

impl From<ConditionalBlock> for ExecutionStep {
    fn from(step: ConditionalBlock) -> Self {
        ExecutionStep::Conditional(step)
    }
}

/// Ordered top-level steps of one compiled plan.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: impl Into<ExecutionStep>) {
        self.steps.push(step.into());
    }

    pub fn with_step(mut self, step: impl Into<ExecutionStep>) -> Self {
        self.push(step);
        self
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order; the first failure stops the plan.
    pub fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        for step in &self.steps {
            tracing::trace!("Executing {} step", step.name());
            step.execute(data)?;
        }
        Ok(())
    }

    /// Run the whole plan once per input row of an update batch.
    pub fn execute_rows<I>(&self, data: &mut ExecutionData, rows: I) -> PlanResult<()>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let result = rows.into_iter().try_for_each(|row| {
            data.set_input_row(Some(row));
            self.execute(data)
        });
        data.set_input_row(None);
        result
    }
}

/// Prepare `rendered` on `connection` and bind its values from position 1.
pub(crate) fn prepare_bound(
    data: &mut ExecutionData,
    connection: ConnectionKey,
    rendered: &RenderedStatement,
) -> PlanResult<StatementHandle> {
    tracing::debug!("Preparing on {}: {} [{} binds]", connection, rendered.sql, rendered.bind_count());
    let handle = data.prepare(connection, &rendered.sql)?;
    let bound = data
        .statement(handle)
        .and_then(|stmt| rendered.set_column_data(stmt, 1));
    match bound {
        Ok(_) => Ok(handle),
        Err(e) => Err(data.abandon_statement(handle, e)),
    }
}

/// Prepare, bind and run an update statement; the statement is always closed.
pub(crate) fn run_update(
    data: &mut ExecutionData,
    connection: ConnectionKey,
    rendered: &RenderedStatement,
) -> PlanResult<u64> {
    let handle = prepare_bound(data, connection, rendered)?;
    let count = match data
        .statement(handle)
        .and_then(|stmt| stmt.execute_update().map_err(Into::into))
    {
        Ok(count) => count,
        Err(e) => return Err(data.abandon_statement(handle, e)),
    };
    data.stats_mut().statements_executed += 1;
    data.close_statement(handle)?;
    tracing::debug!("{} row(s) affected", count);
    Ok(count)
}
