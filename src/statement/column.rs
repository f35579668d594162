//! Value-bound blocks: statement columns and database function calls.

use std::sync::Arc;

use super::lob::{LobColumnInitializer, LobValue};
use super::rendered::RenderBuffer;
use crate::error::PlanResult;
use crate::exec::ExecutionData;
use crate::extract::ValueExtractor;
use crate::model::{BindValue, Column, SqlType};

/// One value bound into the statement, rendered as `?` or as a LOB placeholder.
#[derive(Debug, Clone)]
pub struct StatementColumn {
    column: Column,
    extractor: Arc<dyn ValueExtractor>,
    sql_type: SqlType,
    lob: Option<Arc<dyn LobColumnInitializer>>,
}

impl StatementColumn {
    pub fn new(column: Column, extractor: Arc<dyn ValueExtractor>, sql_type: SqlType) -> Self {
        Self {
            column,
            extractor,
            sql_type,
            lob: None,
        }
    }

    /// Render a vendor placeholder instead of a bind marker; the value is deferred
    /// to the LOB fill pass.
    pub fn with_lob_initializer(mut self, initializer: Arc<dyn LobColumnInitializer>) -> Self {
        self.lob = Some(initializer);
        self
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_deferred_lob(&self) -> bool {
        self.lob.is_some()
    }

    pub(crate) fn render(&self, data: &ExecutionData, out: &mut RenderBuffer) -> PlanResult<()> {
        let value = self.extractor.extract(data, self.sql_type)?;
        let is_null = value.is_null();
        if is_null {
            out.nulls += 1;
        }
        match &self.lob {
            Some(initializer) => {
                out.sql.push_str(&initializer.placeholder(self.sql_type, is_null));
                if !is_null {
                    out.lobs.push(LobValue {
                        column: self.column.name.clone(),
                        value: BindValue::new(value, self.sql_type),
                    });
                }
            }
            None => {
                out.sql.push('?');
                out.binds.push(BindValue::new(value, self.sql_type));
            }
        }
        Ok(())
    }
}

/// Argument of a database function call.
#[derive(Debug, Clone)]
pub enum FunctionParam {
    /// SQL text written as-is.
    Literal(String),
    /// A value bound through its own `?`.
    Bound {
        extractor: Arc<dyn ValueExtractor>,
        sql_type: SqlType,
    },
}

/// `NAME(arg, ?, arg)`: each bound argument takes one bind slot, in argument order.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    name: String,
    params: Vec<FunctionParam>,
}

impl FunctionCall {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn literal(mut self, text: &str) -> Self {
        self.params.push(FunctionParam::Literal(text.to_string()));
        self
    }

    pub fn bound(mut self, extractor: Arc<dyn ValueExtractor>, sql_type: SqlType) -> Self {
        self.params.push(FunctionParam::Bound {
            extractor,
            sql_type,
        });
        self
    }

    pub fn is_static(&self) -> bool {
        self.params
            .iter()
            .all(|p| matches!(p, FunctionParam::Literal(_)))
    }

    pub fn bound_param_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| matches!(p, FunctionParam::Bound { .. }))
            .count()
    }

    pub(crate) fn render(
        &self,
        data: Option<&ExecutionData>,
        out: &mut RenderBuffer,
    ) -> PlanResult<()> {
        out.sql.push_str(&self.name);
        out.sql.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.sql.push_str(", ");
            }
            match param {
                FunctionParam::Literal(text) => out.sql.push_str(text),
                FunctionParam::Bound {
                    extractor,
                    sql_type,
                } => {
                    let data = super::block::require_data(data)?;
                    let value = extractor.extract(data, *sql_type)?;
                    if value.is_null() {
                        out.nulls += 1;
                    }
                    out.sql.push('?');
                    out.binds.push(BindValue::new(value, *sql_type));
                }
            }
        }
        out.sql.push(')');
        Ok(())
    }
}
