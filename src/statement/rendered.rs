//! Per-request output of rendering a block sequence.
//!
//! Rendering resolves every bound value once, in block order, so the SQL text and
//! the bind list can never disagree about positions. Everything here belongs to one
//! execution; compiled blocks stay untouched.

use super::lob::LobValue;
use crate::driver::PreparedStatement;
use crate::error::PlanResult;
use crate::model::BindValue;

/// Scratch buffer one block (or block group) renders into.
#[derive(Debug, Default)]
pub(crate) struct RenderBuffer {
    pub sql: String,
    pub binds: Vec<BindValue>,
    pub lobs: Vec<LobValue>,
    /// NULL values resolved inside this buffer.
    pub nulls: usize,
    /// Set when a required block list rendered no items.
    pub no_effect: bool,
}

impl RenderBuffer {
    /// Move a child buffer's content to the end of this one.
    pub fn append(&mut self, child: RenderBuffer) {
        self.sql.push_str(&child.sql);
        self.binds.extend(child.binds);
        self.lobs.extend(child.lobs);
        self.nulls += child.nulls;
        self.no_effect |= child.no_effect;
    }
}

/// SQL text plus the values to bind, in position order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub sql: String,
    binds: Vec<BindValue>,
    lobs: Vec<LobValue>,
    has_effect: bool,
}

impl RenderedStatement {
    pub(crate) fn from_buffer(buffer: RenderBuffer) -> Self {
        Self {
            sql: buffer.sql,
            binds: buffer.binds,
            lobs: buffer.lobs,
            has_effect: !buffer.no_effect,
        }
    }

    pub(crate) fn fixed(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            binds: Vec::new(),
            lobs: Vec::new(),
            has_effect: true,
        }
    }

    /// Statement assembled outside the block model, e.g. a LOB fill.
    pub(crate) fn with_binds(sql: String, binds: Vec<BindValue>) -> Self {
        Self {
            sql,
            binds,
            lobs: Vec::new(),
            has_effect: true,
        }
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    pub fn bind_count(&self) -> usize {
        self.binds.len()
    }

    /// LOB content deferred to the positioned fill pass.
    pub fn lobs(&self) -> &[LobValue] {
        &self.lobs
    }

    /// False when every optional item of a required list was omitted, e.g. an
    /// UPDATE whose SET columns were all NULL. Such a statement is not executed.
    pub fn has_effect(&self) -> bool {
        self.has_effect
    }

    /// Bind all values starting at `start`; returns the next free position.
    pub fn set_column_data(
        &self,
        statement: &mut dyn PreparedStatement,
        start: usize,
    ) -> PlanResult<usize> {
        let mut position = start;
        for bind in &self.binds {
            tracing::trace!("bind {} = {:?}", position, bind.value);
            statement.bind(position, bind)?;
            position += 1;
        }
        Ok(position)
    }

    /// Drop per-execution buffers (bound values and LOB content).
    pub fn release_column_data(&mut self) {
        self.binds.clear();
        self.binds.shrink_to_fit();
        self.lobs.clear();
        self.lobs.shrink_to_fit();
    }
}
