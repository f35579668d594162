//! Boolean conditions evaluated against execution data.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::PlanResult;
use crate::exec::ExecutionData;
use crate::extract::ValueExtractor;
use crate::model::{CompareOp, SqlType, SqlValue};

/// A single boolean test. Extensions implement this to gate blocks and steps.
pub trait Condition: Send + Sync + fmt::Debug {
    fn is_match(&self, data: &ExecutionData) -> PlanResult<bool>;
}

/// `left <op> right` over two extracted values.
#[derive(Debug, Clone)]
pub struct Comparison {
    left: Arc<dyn ValueExtractor>,
    op: CompareOp,
    right: Option<Arc<dyn ValueExtractor>>,
    /// LIKE pattern compiled up front when the right side is a constant.
    pattern: Option<Regex>,
}

impl Comparison {
    pub fn new(
        left: Arc<dyn ValueExtractor>,
        op: CompareOp,
        right: Option<Arc<dyn ValueExtractor>>,
    ) -> Self {
        let pattern = match op {
            CompareOp::Like | CompareOp::NotLike => right
                .as_ref()
                .and_then(|r| r.constant())
                .and_then(SqlValue::as_text)
                .and_then(|p| like_regex(&p)),
            _ => None,
        };
        Self {
            left,
            op,
            right,
            pattern,
        }
    }

    fn like(&self, value: &SqlValue, pattern: &SqlValue) -> bool {
        let Some(value) = value.as_text() else {
            return false;
        };
        match &self.pattern {
            Some(re) => re.is_match(&value),
            None => pattern
                .as_text()
                .and_then(|p| like_regex(&p))
                .is_some_and(|re| re.is_match(&value)),
        }
    }
}

impl Condition for Comparison {
    fn is_match(&self, data: &ExecutionData) -> PlanResult<bool> {
        let left = self.left.extract(data, SqlType::Other)?;
        match self.op {
            CompareOp::IsNull => return Ok(left.is_null()),
            CompareOp::IsNotNull => return Ok(!left.is_null()),
            _ => {}
        }
        let right = match &self.right {
            Some(extractor) => extractor.extract(data, SqlType::Other)?,
            None => SqlValue::Null,
        };
        if left.is_null() || right.is_null() {
            return Ok(match self.op {
                CompareOp::Eq => left.is_null() && right.is_null(),
                CompareOp::Ne => left.is_null() != right.is_null(),
                _ => false,
            });
        }

        Ok(match self.op {
            CompareOp::Like => self.like(&left, &right),
            CompareOp::NotLike => !self.like(&left, &right),
            op => {
                let ordering = compare_values(&left, &right);
                match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    _ => false,
                }
            }
        })
    }
}

/// Numeric comparison when both sides are numbers, text comparison otherwise.
fn compare_values(left: &SqlValue, right: &SqlValue) -> Ordering {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    let l = left.as_text().unwrap_or_default();
    let r = right.as_text().unwrap_or_default();
    l.cmp(&r)
}

/// SQL LIKE: `%` matches any run, `_` any single character.
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}
