use std::sync::Arc;

use crate::error::PlanResult;
use crate::rules::RuleEvaluator;

use super::{ExecutionData, ExecutionStep};

/// Steps run only when the attached rules match.
#[derive(Debug, Clone)]
pub struct ConditionalBlock {
    rules: Arc<RuleEvaluator>,
    steps: Vec<ExecutionStep>,
}

impl ConditionalBlock {
    pub fn new(rules: Arc<RuleEvaluator>) -> Self {
        Self {
            rules,
            steps: Vec::new(),
        }
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

    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        if !self.rules.is_match(data)? {
            tracing::trace!("Conditional block skipped ({} steps)", self.steps.len());
            return Ok(());
        }
        for step in &self.steps {
            step.execute(data)?;
        }
        Ok(())
    }
}
