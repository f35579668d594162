//! Second phase of a LOB write: locate the written rows and stream the content in.

use crate::driver::ConnectionKey;
use crate::error::{PlanError, PlanResult, SqlError};
use crate::model::{BindValue, SqlType, SqlValue, Table};
use crate::statement::{BlockSequence, RenderedStatement};

use super::{prepare_bound, run_update, ExecutionData};

/// Locates rows just written with LOB placeholders and fills them by row identity.
#[derive(Debug, Clone)]
pub struct LobFill {
    table: Table,
    locate: BlockSequence,
    row_id_column: String,
}

impl LobFill {
    /// `locate` must select the row identity column, locking the rows.
    pub fn new(table: Table, locate: BlockSequence, row_id_column: &str) -> Self {
        Self {
            table,
            locate,
            row_id_column: row_id_column.to_string(),
        }
    }

    pub fn locate(&self) -> &BlockSequence {
        &self.locate
    }

    /// Fill the LOB values deferred by `written`. Returns the number of rows filled.
    pub(crate) fn execute(
        &self,
        data: &mut ExecutionData,
        connection: ConnectionKey,
        written: &RenderedStatement,
    ) -> PlanResult<u64> {
        if written.lobs().is_empty() {
            return Ok(0);
        }

        let row_ids = self.locate_rows(data, connection)?;
        if row_ids.is_empty() {
            tracing::warn!("No {} rows located for LOB fill", self.table.name);
            return Ok(0);
        }

        let assignments = written
            .lobs()
            .iter()
            .map(|lob| format!("{} = ?", lob.column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table.qualified_name(),
            assignments,
            self.row_id_column
        );

        let mut filled = 0;
        for row_id in row_ids {
            let mut binds: Vec<BindValue> = written.lobs().iter().map(|l| l.value.clone()).collect();
            binds.push(BindValue::new(row_id, SqlType::RowId));
            let mut fill = RenderedStatement::with_binds(sql.clone(), binds);
            let result = run_update(data, connection, &fill);
            fill.release_column_data();
            filled += result?;
        }
        Ok(filled)
    }

    fn locate_rows(&self, data: &mut ExecutionData, connection: ConnectionKey) -> PlanResult<Vec<SqlValue>> {
        let rendered = self.locate.build_statement(Some(&*data))?;
        if !rendered.has_effect() {
            // an unconstrained locate would lock and overwrite the whole table
            return Err(PlanError::UnlocatedLobFill(self.table.name.clone()));
        }
        let handle = prepare_bound(data, connection, &rendered)?;

        let mut cursor = match data
            .statement(handle)
            .and_then(|stmt| stmt.execute_query().map_err(Into::into))
        {
            Ok(cursor) => cursor,
            Err(e) => return Err(data.abandon_statement(handle, e)),
        };
        data.stats_mut().statements_executed += 1;

        let mut row_ids = Vec::new();
        let fetched: Result<(), PlanError> = loop {
            match cursor.next_row() {
                Ok(Some(row)) => match row.get(&self.row_id_column) {
                    Some(value) => row_ids.push(value.clone()),
                    None => {
                        break Err(PlanError::Sql(SqlError::new(format!(
                            "row identity column {} missing from locate result",
                            self.row_id_column
                        ))))
                    }
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };

        let closed = cursor.close();
        match (fetched, closed) {
            (Ok(()), Ok(())) => {
                data.close_statement(handle)?;
                Ok(row_ids)
            }
            (Err(e), closed) => {
                let e = match (e, closed) {
                    (PlanError::Sql(primary), Err(close)) => PlanError::Sql(primary.chain(close)),
                    (e, _) => e,
                };
                Err(data.abandon_statement(handle, e))
            }
            (Ok(()), Err(close)) => Err(data.abandon_statement(handle, close.into())),
        }
    }
}
