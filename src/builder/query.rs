//! SELECT builder.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::BuildContext;
use crate::error::{PlanError, PlanResult};
use crate::exec::QueryStep;
use crate::extract::ValueExtractor;
use crate::join_tree::JoinTree;
use crate::model::{Column, ColumnMeta, CompareOp, Join, Login, Table, TableMetadata};
use crate::rules::RuleEvaluator;
use crate::statement::{BlockList, BlockSequence, OptionalBlock, StatementBlock, StatementColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One WHERE condition: `column <op> value`.
#[derive(Debug, Clone)]
pub struct Predicate {
    column: Column,
    op: CompareOp,
    value: Option<Arc<dyn ValueExtractor>>,
    omit_when_null: bool,
    rules: Option<Arc<RuleEvaluator>>,
}

impl Predicate {
    pub fn new(column: Column, op: CompareOp, value: Arc<dyn ValueExtractor>) -> Self {
        Self {
            column,
            op,
            value: Some(value),
            omit_when_null: false,
            rules: None,
        }
    }

    /// `IS NULL` / `IS NOT NULL`.
    pub fn unary(column: Column, op: CompareOp) -> Self {
        Self {
            column,
            op,
            value: None,
            omit_when_null: false,
            rules: None,
        }
    }

    /// Leave the condition out when its value resolves to NULL.
    pub fn omit_when_null(mut self) -> Self {
        self.omit_when_null = true;
        self
    }

    /// Apply the condition only when `rules` match.
    pub fn gated_by(mut self, rules: Arc<RuleEvaluator>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn column(&self) -> &Column {
        &self.column
    }
}

/// What a query reads.
#[derive(Debug, Clone, Default)]
pub struct SelectSpec {
    pub columns: Vec<Column>,
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<(Column, SortOrder)>,
    pub distinct: bool,
    pub for_update: bool,
}

impl SelectSpec {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: Column, order: SortOrder) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    fn referenced_tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = Vec::new();
        let candidates = self
            .columns
            .iter()
            .chain(self.predicates.iter().map(|p| &p.column))
            .chain(self.order_by.iter().map(|(c, _)| c))
            .map(|c| &c.table)
            .chain(self.joins.iter().flat_map(|j| [j.left_table(), j.right_table()]));
        for table in candidates {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: Table,
    login: Login,
}

impl QueryBuilder {
    pub fn new(table: Table, login: Login) -> Self {
        Self { table, login }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn build(&self, spec: &SelectSpec, ctx: &BuildContext<'_>) -> PlanResult<QueryStep> {
        let sequence = self.build_sequence(spec, ctx)?;
        tracing::debug!(
            "Compiled query on {} ({} columns, {} joins)",
            self.table.name,
            spec.columns.len(),
            spec.joins.len()
        );
        Ok(QueryStep::new(self.login.key, sequence))
    }

    pub(crate) fn build_sequence(&self, spec: &SelectSpec, ctx: &BuildContext<'_>) -> PlanResult<BlockSequence> {
        if spec.columns.is_empty() {
            return Err(PlanError::IllegalArgument(format!(
                "query on {} selects no columns",
                self.table.name
            )));
        }

        let mut tables = spec.referenced_tables();
        if !tables.contains(&&self.table) {
            tables.push(&self.table);
        }
        for table in &tables {
            if table.server != self.login.server {
                return Err(PlanError::IllegalArgument(format!(
                    "query on {} spans servers: {} is on {}",
                    self.table.name, table.name, table.server
                )));
            }
        }

        let mut metadata: HashMap<&Table, Arc<TableMetadata>> = HashMap::new();
        for table in &tables {
            metadata.insert(*table, ctx.metadata_for(&self.login, table)?);
        }

        let mut sequence = BlockSequence::new();
        sequence.add_text(if spec.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        let mut select_list = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            column_meta(&metadata, column)?;
            select_list.push(column.qualified());
        }
        sequence.add_text(&select_list.join(", "));

        let mut where_list = BlockList::new(" AND ").with_prefix(" WHERE ");
        sequence.add_text(" FROM ");
        if spec.joins.is_empty() {
            if let Some(other) = tables.iter().find(|t| ***t != self.table) {
                return Err(PlanError::IllegalArgument(format!(
                    "table {} is referenced but not joined to {}",
                    other.name, self.table.name
                )));
            }
            sequence.add_text(&self.table.from_clause_entry());
        } else {
            let tree = JoinTree::build(&spec.joins);
            if !tree.is_connected() {
                return Err(PlanError::IllegalArgument(
                    "join graph is not connected".to_string(),
                ));
            }
            if let Some(missing) = tables.iter().find(|t| !tree.contains(t)) {
                return Err(PlanError::IllegalArgument(format!(
                    "table {} is not part of the join graph",
                    missing.name
                )));
            }
            let traversal = tree.traversal().ok_or_else(|| {
                PlanError::IllegalArgument("join graph has no root".to_string())
            })?;
            sequence.add_text(&traversal.root.from_clause_entry());
            for step in &traversal.steps {
                let on = step
                    .joins
                    .iter()
                    .map(|j| j.predicate())
                    .collect::<Vec<_>>()
                    .join(" AND ");
                sequence.add_text(&format!(
                    " {} {} ON {}",
                    step.kind.keyword(),
                    step.table.from_clause_entry(),
                    on
                ));
            }
            for join in &traversal.root_predicates {
                where_list.push(StatementBlock::text(&join.predicate()));
            }
        }

        for predicate in &spec.predicates {
            let meta = column_meta(&metadata, &predicate.column)?;
            if !meta.searchable {
                return Err(PlanError::IllegalArgument(format!(
                    "column {} cannot be used in a WHERE clause",
                    predicate.column
                )));
            }

            let mut block = OptionalBlock::new().omit_when_null(predicate.omit_when_null);
            if let Some(rules) = &predicate.rules {
                block = block.gated_by(Arc::clone(rules));
            }
            match (&predicate.value, predicate.op.is_unary()) {
                (_, true) => {
                    block.add_text(&format!("{} {}", predicate.column.qualified(), predicate.op.sql()));
                }
                (Some(value), false) => {
                    block.add_text(&format!("{} {} ", predicate.column.qualified(), predicate.op.sql()));
                    block.add_replacement_field(StatementColumn::new(
                        predicate.column.clone(),
                        Arc::clone(value),
                        meta.sql_type,
                    ));
                }
                (None, false) => {
                    return Err(PlanError::IllegalArgument(format!(
                        "operator {} on {} needs a value",
                        predicate.op.sql(),
                        predicate.column
                    )));
                }
            }
            where_list.push(StatementBlock::Optional(block));
        }
        sequence.add_block(StatementBlock::List(where_list));

        if !spec.order_by.is_empty() {
            let mut order = Vec::with_capacity(spec.order_by.len());
            for (column, direction) in &spec.order_by {
                column_meta(&metadata, column)?;
                order.push(format!("{} {}", column.qualified(), direction.keyword()));
            }
            sequence.add_text(&format!(" ORDER BY {}", order.join(", ")));
        }

        if spec.for_update {
            sequence.add_text(" FOR UPDATE");
        }
        Ok(sequence)
    }
}

fn column_meta<'m>(
    metadata: &'m HashMap<&Table, Arc<TableMetadata>>,
    column: &Column,
) -> PlanResult<&'m ColumnMeta> {
    metadata
        .get(&column.table)
        .ok_or_else(|| PlanError::IllegalArgument(format!("no metadata for {}", column.table.name)))?
        .require(&column.name)
}
