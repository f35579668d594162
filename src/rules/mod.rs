//! Rule evaluation.
//!
//! A rule list is an OR of AND-chains. Each rule carries the operator that links it
//! to the rule after it; consecutive rules linked by AND form one chain. Rules not
//! part of any chain are standalone OR terms. An empty list always matches.

mod condition;

pub use condition::{Comparison, Condition};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlanResult;
use crate::exec::ExecutionData;
use crate::extract::{ExtensionRegistry, ValueExtractor};
use crate::model::CompareOp;

/// Operator linking a rule to the next one in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    And,
    #[default]
    Or,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub condition: Arc<dyn Condition>,
    pub op: BoolOp,
}

impl Rule {
    pub fn new(condition: Arc<dyn Condition>, op: BoolOp) -> Self {
        Self { condition, op }
    }
}

/// Declarative form of a rule condition, as handed over by the model loader.
#[derive(Debug, Clone)]
pub enum ConditionDefinition {
    Comparison {
        left: Arc<dyn ValueExtractor>,
        op: CompareOp,
        right: Option<Arc<dyn ValueExtractor>>,
    },
    Extension {
        name: String,
        params: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub condition: ConditionDefinition,
    pub op: BoolOp,
}

/// Compiled OR-of-AND-chains evaluator.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    and_groups: Vec<Vec<Rule>>,
    or_rules: Vec<Rule>,
}

impl RuleEvaluator {
    /// Resolve definitions (extensions through `registry`) and group them.
    pub fn compile(
        definitions: &[RuleDefinition],
        registry: &ExtensionRegistry,
    ) -> PlanResult<RuleEvaluator> {
        let rules = definitions
            .iter()
            .map(|def| {
                let condition: Arc<dyn Condition> = match &def.condition {
                    ConditionDefinition::Comparison { left, op, right } => Arc::new(
                        Comparison::new(Arc::clone(left), *op, right.clone()),
                    ),
                    ConditionDefinition::Extension { name, params } => {
                        registry.condition(name, params)?
                    }
                };
                Ok(Rule::new(condition, def.op))
            })
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(Self::from_rules(rules))
    }

    /// Group already-compiled rules.
    pub fn from_rules(rules: Vec<Rule>) -> RuleEvaluator {
        let mut and_groups = Vec::new();
        let mut or_rules = Vec::new();
        let mut group: Vec<Rule> = Vec::new();

        for rule in rules {
            match rule.op {
                BoolOp::And => group.push(rule),
                BoolOp::Or if !group.is_empty() => {
                    group.push(rule);
                    and_groups.push(std::mem::take(&mut group));
                }
                BoolOp::Or => or_rules.push(rule),
            }
        }
        // a trailing AND has nothing to its right; close the chain
        if !group.is_empty() {
            and_groups.push(group);
        }

        RuleEvaluator {
            and_groups,
            or_rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.and_groups.is_empty() && self.or_rules.is_empty()
    }

    pub fn and_group_count(&self) -> usize {
        self.and_groups.len()
    }

    pub fn or_rule_count(&self) -> usize {
        self.or_rules.len()
    }

    /// Evaluate against the current request, short-circuiting.
    pub fn is_match(&self, data: &ExecutionData) -> PlanResult<bool> {
        if self.is_empty() {
            return Ok(true);
        }

        for group in &self.and_groups {
            let mut matched = true;
            for rule in group {
                if !rule.condition.is_match(data)? {
                    matched = false;
                    break;
                }
            }
            if matched {
                return Ok(true);
            }
        }

        for rule in &self.or_rules {
            if rule.condition.is_match(data)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
