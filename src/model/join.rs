//! Join edges between back-end columns.

use serde::{Deserialize, Serialize};

use super::column::Column;
use super::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
        }
    }

    /// The same join seen from the right-hand table.
    pub fn reversed(&self) -> JoinKind {
        match self {
            JoinKind::Inner => JoinKind::Inner,
            JoinKind::LeftOuter => JoinKind::RightOuter,
            JoinKind::RightOuter => JoinKind::LeftOuter,
        }
    }
}

/// An equality join between a left and a right column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Join {
    pub left: Column,
    pub right: Column,
    pub kind: JoinKind,
}

impl Join {
    pub fn new(left: Column, right: Column) -> Self {
        Self {
            left,
            right,
            kind: JoinKind::Inner,
        }
    }

    pub fn with_kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn left_table(&self) -> &Table {
        &self.left.table
    }

    pub fn right_table(&self) -> &Table {
        &self.right.table
    }

    /// The endpoint opposite `table`, if `table` participates in this join.
    pub fn other_side(&self, table: &Table) -> Option<&Table> {
        if self.left_table() == table {
            Some(self.right_table())
        } else if self.right_table() == table {
            Some(self.left_table())
        } else {
            None
        }
    }

    /// `left = right` predicate text.
    pub fn predicate(&self) -> String {
        format!("{} = {}", self.left.qualified(), self.right.qualified())
    }
}
