use crate::error::PlanResult;

use super::{ExecutionData, ModifyStep};

/// UPDATE first; INSERT only when the update touched no row and the caller may
/// create rows.
#[derive(Debug, Clone)]
pub struct UpdateThenInsertStep {
    update: ModifyStep,
    insert: ModifyStep,
}

impl UpdateThenInsertStep {
    pub fn new(update: ModifyStep, insert: ModifyStep) -> Self {
        Self { update, insert }
    }

    pub fn update(&self) -> &ModifyStep {
        &self.update
    }

    pub fn insert(&self) -> &ModifyStep {
        &self.insert
    }

    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        let before = data.stats().rows_updated;
        self.update.execute(data)?;
        if data.stats().rows_updated != before {
            return Ok(());
        }

        if !data.access().create {
            tracing::debug!(
                "No {} row updated and row creation is not permitted",
                self.update.table().name
            );
            return Ok(());
        }
        self.insert.execute(data)?;
        Ok(())
    }
}
