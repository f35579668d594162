//! Statement block model: SQL text with deferred, position-ordered value binding.

mod block;
mod column;
mod lob;
mod rendered;

pub(crate) use block::require_data;
pub use block::{BlockList, BlockSequence, OptionalBlock, StatementBlock};
pub use column::{FunctionCall, FunctionParam, StatementColumn};
pub use lob::{LobColumnInitializer, LobValue, OracleLobInitializer};
pub use rendered::RenderedStatement;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ConnectionPool, MemoryPool};
    use crate::error::PlanError;
    use crate::exec::ExecutionData;
    use crate::extract::{Literal, RequestParameter, ValueExtractor};
    use crate::model::{Column, ServerKey, SqlType, SqlValue, Table};
    use crate::rules::{BoolOp, Comparison, Rule, RuleEvaluator};
    use crate::model::CompareOp;
    use serde_json::json;
    use std::sync::Arc;

    fn table() -> Table {
        Table::new("CONTENT", ServerKey::new("generic", "db1"))
    }

    fn param_column(name: &str, sql_type: SqlType) -> StatementColumn {
        StatementColumn::new(
            Column::new(&table(), name),
            Arc::new(RequestParameter::new(name).with_default(json!(null))),
            sql_type,
        )
    }

    fn data() -> ExecutionData {
        let mut data = ExecutionData::new(Arc::new(MemoryPool::new("generic")));
        data.set_param("ID", json!(7));
        data.set_param("TITLE", json!("Home"));
        data
    }

    #[test]
    fn test_static_sequence_renders_without_data() {
        let mut seq = BlockSequence::new();
        seq.add_text("SELECT ID ");
        seq.add_text("FROM CONTENT");
        seq.add_block(StatementBlock::Function(FunctionCall::new("SYSDATE_FN")));
        assert!(seq.has_static_sql());
        assert_eq!(seq.blocks().len(), 2);

        let first = seq.build_statement(None).unwrap();
        let second = seq.build_statement(None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sql, "SELECT ID FROM CONTENTSYSDATE_FN()");
        assert_eq!(first.bind_count(), 0);
    }

    #[test]
    fn test_dynamic_sequence_needs_data() {
        let mut seq = BlockSequence::new();
        seq.add_text("SELECT * FROM CONTENT WHERE ID = ");
        seq.add_replacement_field(param_column("ID", SqlType::Integer));
        assert!(!seq.has_static_sql());
        let err = seq.build_statement(None).unwrap_err();
        assert!(matches!(err, PlanError::IllegalArgument(_)));
    }

    #[test]
    fn test_binds_follow_text_order() {
        let mut seq = BlockSequence::new();
        seq.add_text("UPDATE CONTENT SET TITLE = ");
        seq.add_replacement_field(param_column("TITLE", SqlType::Varchar));
        seq.add_text(", MODIFIED = ");
        seq.add_block(StatementBlock::Function(
            FunctionCall::new("TO_DATE")
                .bound(Arc::new(Literal(SqlValue::Text("2024-01-01".into()))), SqlType::Varchar)
                .literal("'YYYY-MM-DD'"),
        ));
        seq.add_text(" WHERE ID = ");
        seq.add_replacement_field(param_column("ID", SqlType::Integer));

        let rendered = seq.build_statement(Some(&data())).unwrap();
        assert_eq!(
            rendered.sql,
            "UPDATE CONTENT SET TITLE = ?, MODIFIED = TO_DATE(?, 'YYYY-MM-DD') WHERE ID = ?"
        );
        assert_eq!(rendered.sql.matches('?').count(), rendered.bind_count());
        let values: Vec<_> = rendered.binds().iter().map(|b| b.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                SqlValue::Text("Home".into()),
                SqlValue::Text("2024-01-01".into()),
                SqlValue::Int(7)
            ]
        );
    }

    #[test]
    fn test_set_column_data_positions() {
        let mut seq = BlockSequence::new();
        seq.add_text("DELETE FROM CONTENT WHERE ID = ");
        seq.add_replacement_field(param_column("ID", SqlType::Integer));
        seq.add_text(" AND TITLE = ");
        seq.add_replacement_field(param_column("TITLE", SqlType::Varchar));
        let rendered = seq.build_statement(Some(&data())).unwrap();

        let pool = MemoryPool::new("generic");
        let mut conn = pool.acquire(None).unwrap();
        let mut stmt = conn.prepare(&rendered.sql).unwrap();
        let next = rendered.set_column_data(stmt.as_mut(), 1).unwrap();
        assert_eq!(next, 3);
        stmt.execute_update().unwrap();
        let executed = pool.executed();
        assert_eq!(executed[0].binds[0].0, 1);
        assert_eq!(executed[0].binds[1].0, 2);
    }

    #[test]
    fn test_optional_block_omitted_on_null() {
        let mut list = BlockList::new(", ").required();
        for name in ["TITLE", "SUMMARY"] {
            let mut item = OptionalBlock::new().omit_when_null(true);
            item.add_text(&format!("{} = ", name));
            item.add_replacement_field(param_column(name, SqlType::Varchar));
            list.push(StatementBlock::Optional(item));
        }
        let mut seq = BlockSequence::new();
        seq.add_text("UPDATE CONTENT SET ");
        seq.add_block(StatementBlock::List(list));

        let rendered = seq.build_statement(Some(&data())).unwrap();
        assert_eq!(rendered.sql, "UPDATE CONTENT SET TITLE = ?");
        assert_eq!(rendered.bind_count(), 1);
        assert!(rendered.has_effect());

        let empty = ExecutionData::new(Arc::new(MemoryPool::new("generic")));
        let rendered = seq.build_statement(Some(&empty)).unwrap();
        assert_eq!(rendered.sql, "UPDATE CONTENT SET ");
        assert_eq!(rendered.bind_count(), 0);
        assert!(!rendered.has_effect());
    }

    #[test]
    fn test_rule_gated_block() {
        let gate = RuleEvaluator::from_rules(vec![Rule::new(
            Arc::new(Comparison::new(
                Arc::new(RequestParameter::new("MODE").with_default(json!(null))),
                CompareOp::Eq,
                Some(Arc::new(Literal(SqlValue::Text("full".into()))) as Arc<dyn ValueExtractor>),
            )),
            BoolOp::Or,
        )]);
        let mut optional = OptionalBlock::new().gated_by(Arc::new(gate));
        optional.add_text(" AND ID = ");
        optional.add_replacement_field(param_column("ID", SqlType::Integer));

        let mut seq = BlockSequence::new();
        seq.add_text("SELECT * FROM CONTENT WHERE 1 = 1");
        seq.add_block(StatementBlock::Optional(optional));

        let mut data = data();
        assert_eq!(
            seq.build_statement(Some(&data)).unwrap().sql,
            "SELECT * FROM CONTENT WHERE 1 = 1"
        );
        data.set_param("MODE", json!("full"));
        let rendered = seq.build_statement(Some(&data)).unwrap();
        assert_eq!(rendered.sql, "SELECT * FROM CONTENT WHERE 1 = 1 AND ID = ?");
        assert_eq!(rendered.bind_count(), 1);
    }

    #[test]
    fn test_lob_column_defers_value() {
        let lob = StatementColumn::new(
            Column::new(&table(), "BODY"),
            Arc::new(RequestParameter::new("BODY").with_default(json!(null))),
            SqlType::Clob,
        )
        .with_lob_initializer(Arc::new(OracleLobInitializer));
        let mut seq = BlockSequence::new();
        seq.add_text("INSERT INTO CONTENT (ID, BODY) VALUES (");
        seq.add_replacement_field(param_column("ID", SqlType::Integer));
        seq.add_text(", ");
        seq.add_replacement_field(lob);
        seq.add_text(")");

        let mut data = data();
        let rendered = seq.build_statement(Some(&data)).unwrap();
        assert_eq!(rendered.sql, "INSERT INTO CONTENT (ID, BODY) VALUES (?, null)");
        assert!(rendered.lobs().is_empty());

        data.set_param("BODY", json!("<p>hello</p>"));
        let mut rendered = seq.build_statement(Some(&data)).unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO CONTENT (ID, BODY) VALUES (?, EMPTY_CLOB())"
        );
        assert_eq!(rendered.bind_count(), 1);
        assert_eq!(rendered.lobs()[0].column, "BODY");

        rendered.release_column_data();
        assert!(rendered.lobs().is_empty());
        assert_eq!(rendered.bind_count(), 0);
    }
}
