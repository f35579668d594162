//! Statement blocks: the text/value spans one SQL statement is assembled from.
//!
//! Blocks are added in SQL left-to-right order. Rendering walks them in that same
//! order, so bind positions are assigned 1, 2, 3... exactly as the `?` markers appear.

use std::sync::{Arc, OnceLock};

use super::column::{FunctionCall, StatementColumn};
use super::rendered::{RenderBuffer, RenderedStatement};
use crate::error::{PlanError, PlanResult};
use crate::exec::ExecutionData;
use crate::rules::RuleEvaluator;

pub(crate) fn require_data(data: Option<&ExecutionData>) -> PlanResult<&ExecutionData> {
    data.ok_or_else(|| {
        PlanError::IllegalArgument(
            "statement has replaceable blocks and needs execution data to render".to_string(),
        )
    })
}

/// A span of one statement.
#[derive(Debug, Clone)]
pub enum StatementBlock {
    /// Fixed SQL text.
    Text(String),
    /// One bound value.
    Column(StatementColumn),
    /// Database function call with optional bound arguments.
    Function(FunctionCall),
    /// Blocks dropped as a unit when a NULL is bound inside them or a rule fails.
    Optional(OptionalBlock),
    /// Blocks joined by a separator, skipping those that are omitted.
    List(BlockList),
}

impl StatementBlock {
    pub fn text(text: &str) -> Self {
        StatementBlock::Text(text.to_string())
    }

    /// True when the block renders identically for every request.
    pub fn is_static_block(&self) -> bool {
        match self {
            StatementBlock::Text(_) => true,
            StatementBlock::Column(_) => false,
            StatementBlock::Function(call) => call.is_static(),
            StatementBlock::Optional(block) => block.is_static(),
            StatementBlock::List(list) => list.items.iter().all(StatementBlock::is_static_block),
        }
    }

    fn render(&self, data: Option<&ExecutionData>, out: &mut RenderBuffer) -> PlanResult<bool> {
        match self {
            StatementBlock::Text(text) => {
                out.sql.push_str(text);
                Ok(true)
            }
            StatementBlock::Column(column) => {
                column.render(require_data(data)?, out)?;
                Ok(true)
            }
            StatementBlock::Function(call) => {
                call.render(data, out)?;
                Ok(true)
            }
            StatementBlock::Optional(block) => block.render(data, out),
            StatementBlock::List(list) => list.render(data, out),
        }
    }
}

/// Group of blocks emitted all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct OptionalBlock {
    blocks: Vec<StatementBlock>,
    omit_when_null: bool,
    rules: Option<Arc<RuleEvaluator>>,
}

impl OptionalBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Omit the whole group when any value bound inside it is NULL.
    pub fn omit_when_null(mut self, omit: bool) -> Self {
        self.omit_when_null = omit;
        self
    }

    /// Emit the group only when `rules` match the current request.
    pub fn gated_by(mut self, rules: Arc<RuleEvaluator>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn add_text(&mut self, text: &str) {
        self.blocks.push(StatementBlock::text(text));
    }

    pub fn add_replacement_field(&mut self, column: StatementColumn) {
        self.blocks.push(StatementBlock::Column(column));
    }

    pub fn add_block(&mut self, block: StatementBlock) {
        self.blocks.push(block);
    }

    fn is_static(&self) -> bool {
        self.rules.is_none() && self.blocks.iter().all(StatementBlock::is_static_block)
    }

    fn render(&self, data: Option<&ExecutionData>, out: &mut RenderBuffer) -> PlanResult<bool> {
        if let Some(rules) = &self.rules {
            if !rules.is_match(require_data(data)?)? {
                return Ok(false);
            }
        }

        let mut scratch = RenderBuffer::default();
        for block in &self.blocks {
            block.render(data, &mut scratch)?;
        }
        if self.omit_when_null && scratch.nulls > 0 {
            // discarded: neither its text nor its binds reach the statement
            return Ok(false);
        }
        out.append(scratch);
        Ok(true)
    }
}

/// Items separated by `separator`; omitted items leave no separator behind.
#[derive(Debug, Clone)]
pub struct BlockList {
    items: Vec<StatementBlock>,
    prefix: String,
    separator: String,
    required: bool,
}

impl BlockList {
    pub fn new(separator: &str) -> Self {
        Self {
            items: Vec::new(),
            prefix: String::new(),
            separator: separator.to_string(),
            required: false,
        }
    }

    /// Text emitted before the first rendered item, e.g. `" WHERE "`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// When no item renders, the statement is marked as having no effect.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn push(&mut self, item: StatementBlock) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn render(&self, data: Option<&ExecutionData>, out: &mut RenderBuffer) -> PlanResult<bool> {
        let mut emitted = 0;
        for item in &self.items {
            let mut scratch = RenderBuffer::default();
            if !item.render(data, &mut scratch)? {
                continue;
            }
            if emitted == 0 {
                out.sql.push_str(&self.prefix);
            } else {
                out.sql.push_str(&self.separator);
            }
            out.append(scratch);
            emitted += 1;
        }
        if emitted == 0 && self.required {
            out.no_effect = true;
        }
        Ok(emitted > 0)
    }
}

/// The ordered blocks of one SQL statement.
///
/// Fully static sequences are rendered once and the text reused afterwards.
#[derive(Debug, Clone, Default)]
pub struct BlockSequence {
    blocks: Vec<StatementBlock>,
    static_sql: OnceLock<Option<String>>,
}

impl BlockSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str) {
        self.add_block(StatementBlock::text(text));
    }

    pub fn add_replacement_field(&mut self, column: StatementColumn) {
        self.add_block(StatementBlock::Column(column));
    }

    pub fn add_block(&mut self, block: StatementBlock) {
        // coalesce adjacent text runs
        if let (Some(StatementBlock::Text(last)), StatementBlock::Text(text)) =
            (self.blocks.last_mut(), &block)
        {
            last.push_str(text);
        } else {
            self.blocks.push(block);
        }
        self.static_sql = OnceLock::new();
    }

    pub fn blocks(&self) -> &[StatementBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True when every block is static.
    pub fn has_static_sql(&self) -> bool {
        self.static_sql().is_some()
    }

    /// Pre-rendered text of a fully static sequence.
    pub fn static_sql(&self) -> Option<&str> {
        self.static_sql
            .get_or_init(|| {
                if !self.blocks.iter().all(StatementBlock::is_static_block) {
                    return None;
                }
                let mut buffer = RenderBuffer::default();
                for block in &self.blocks {
                    // static blocks never touch execution data
                    block.render(None, &mut buffer).ok()?;
                }
                Some(buffer.sql)
            })
            .as_deref()
    }

    /// Render text and resolve bind values for one execution.
    ///
    /// `data` may be `None` only for static sequences.
    pub fn build_statement(&self, data: Option<&ExecutionData>) -> PlanResult<RenderedStatement> {
        if let Some(sql) = self.static_sql() {
            return Ok(RenderedStatement::fixed(sql));
        }
        let mut buffer = RenderBuffer::default();
        for block in &self.blocks {
            block.render(data, &mut buffer)?;
        }
        Ok(RenderedStatement::from_buffer(buffer))
    }
}
