//! Plan execution tests against the scripted in-memory driver

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use docsql::exec::ConditionalBlock;
use docsql::extract::ResultColumn;
use docsql::model::CompareOp;
use docsql::rules::ConditionDefinition;
use docsql::{
    AccessLevel, BoolOp, Column, ColumnBindings, ExecutionPlan, ExecutionStats, ExecutionStep,
    MemoryPool, OperationType, PlanCompiler, PlanError, RuleDefinition, SqlError, SqlValue,
    TableChangeAction, TableChangeEvent, TableChangeListener, WriteSpec,
};
use serde_json::json;

fn plan_for(compiler: &PlanCompiler, step: ExecutionStep) -> ExecutionPlan {
    let table = [generic_server(), oracle_server()]
        .iter()
        .map(docs)
        .find(|t| compiler.login_for(t).is_ok())
        .unwrap();
    ExecutionPlan::new()
        .with_step(compiler.connect_step(&table).unwrap())
        .with_step(step)
}

fn generic_setup() -> (MemoryPool, PlanCompiler) {
    let pool = create_test_pool("postgresql");
    let compiler = create_test_compiler(&pool, &generic_server());
    (pool, compiler)
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<TableChangeEvent>>,
}

impl TableChangeListener for RecordingListener {
    fn table_changed(&self, event: &TableChangeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ==================== Modify Tests ====================

#[test]
fn test_insert_executes_and_counts() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "Intro"}));
    plan.execute(&mut data).unwrap();

    let executed = pool.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, "INSERT INTO DOCS (ID, TITLE) VALUES (?, ?)");
    assert_eq!(
        executed[0].bind_values(),
        vec![SqlValue::Decimal("1".to_string()), SqlValue::Text("Intro".to_string())]
    );
    assert_eq!(data.stats().rows_inserted, 1);
    assert_eq!(data.stats().statements_executed, 1);
    assert_eq!(pool.open_statements(), 0);
}

#[test]
fn test_update_with_nothing_to_set_is_skipped() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Update, &table, false, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1}));
    plan.execute(&mut data).unwrap();

    assert!(pool.executed().is_empty());
    assert!(pool.prepared_sql().is_empty());
    assert_eq!(data.stats().statements_skipped, 1);
    assert_eq!(data.stats().statements_executed, 0);
}

#[test]
fn test_modify_without_connection() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Delete, &table, false, write_spec(&table, &["ID"], &[]))
        .unwrap();

    let mut data = create_execution_data(&pool, json!({"id": 1}));
    let err = step.execute(&mut data).unwrap_err();
    assert!(matches!(err, PlanError::MissingConnection(_)));
}

#[test]
fn test_sql_failure_closes_statement() {
    let (pool, compiler) = generic_setup();
    pool.fail_on(
        "INSERT INTO DOCS",
        SqlError::new("ORA-00001: unique constraint violated").with_state("23000", 1),
    );
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
    let err = plan.execute(&mut data).unwrap_err();
    assert!(err.is_sql());
    assert_eq!(pool.open_statements(), 0);
    assert_eq!(data.open_statement_count(), 0);
    assert_eq!(data.stats().rows_inserted, 0);
}

#[test]
fn test_missing_parameter_is_extraction_error() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let mut keys = ColumnBindings::new();
    keys.insert(
        Column::new(&table, "ID"),
        Arc::new(docsql::extract::RequestParameter::new("id")),
    )
    .unwrap();
    let step = compiler
        .compile(OperationType::Delete, &table, false, WriteSpec::new(keys, ColumnBindings::new()))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({}));
    let err = plan.execute(&mut data).unwrap_err();
    assert!(err.is_extraction());
    assert!(pool.prepared_sql().is_empty());
}

// ==================== Update-Then-Insert Tests ====================

fn upsert_plan(compiler: &PlanCompiler) -> ExecutionPlan {
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Update, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    plan_for(compiler, step)
}

#[test]
fn test_upsert_inserts_when_nothing_updated() {
    let (pool, compiler) = generic_setup();
    pool.on_update("UPDATE DOCS", 0);
    let plan = upsert_plan(&compiler);

    let mut data = create_execution_data(&pool, json!({"id": 9, "title": "New"}));
    plan.execute(&mut data).unwrap();

    let sql = pool.executed_sql();
    assert_eq!(sql.len(), 2);
    assert!(sql[0].starts_with("UPDATE DOCS SET TITLE = ?"));
    assert!(sql[1].starts_with("INSERT INTO DOCS"));
    assert_eq!(data.stats().rows_updated, 0);
    assert_eq!(data.stats().rows_inserted, 1);
}

#[test]
fn test_upsert_never_inserts_after_update() {
    let (pool, compiler) = generic_setup();
    pool.on_update("UPDATE DOCS", 2);
    let plan = upsert_plan(&compiler);

    let mut data = create_execution_data(&pool, json!({"id": 9, "title": "New"}));
    plan.execute(&mut data).unwrap();

    let sql = pool.executed_sql();
    assert_eq!(sql.len(), 1);
    assert_eq!(data.stats().rows_updated, 2);
    assert_eq!(data.stats().rows_inserted, 0);
}

#[test]
fn test_upsert_requires_create_access() {
    let (pool, compiler) = generic_setup();
    pool.on_update("UPDATE DOCS", 0);
    let plan = upsert_plan(&compiler);

    let mut data = create_execution_data(&pool, json!({"id": 9, "title": "New"}))
        .with_access(AccessLevel::update_only());
    plan.execute(&mut data).unwrap();

    assert_eq!(pool.executed_sql().len(), 1);
    assert_eq!(data.stats().rows_inserted, 0);
}

#[test]
fn test_upsert_update_writes_nulls() {
    let (pool, compiler) = generic_setup();
    pool.on_update("UPDATE DOCS", 1);
    let plan = upsert_plan(&compiler);

    let mut data = create_execution_data(&pool, json!({"id": 9}));
    plan.execute(&mut data).unwrap();

    let executed = pool.executed();
    assert_eq!(executed[0].sql, "UPDATE DOCS SET TITLE = ? WHERE ID = ?");
    assert_eq!(executed[0].bind_values()[0], SqlValue::Null);
}

// ==================== Locked Update Tests ====================

#[test]
fn test_locked_update_without_rows_prepares_no_modify() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile_positioned(OperationType::Update, &table, &write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
    plan.execute(&mut data).unwrap();

    let prepared = pool.prepared_sql();
    assert_eq!(prepared, vec!["SELECT ID FROM DOCS WHERE ID = ? FOR UPDATE".to_string()]);
    assert_eq!(data.stats().rows_updated, 0);
    assert_eq!(data.result_set_depth(), 0);
    assert_eq!(pool.open_cursors(), 0);
    assert_eq!(pool.open_statements(), 0);
}

#[test]
fn test_locked_update_modifies_each_row_through_cursor() {
    let (pool, compiler) = generic_setup();
    pool.on_query(
        "FOR UPDATE",
        &["ID"],
        vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
    );
    let table = docs(&generic_server());
    let mut columns = ColumnBindings::new();
    columns
        .insert(Column::new(&table, "AUTHOR_ID"), Arc::new(ResultColumn::new("ID")))
        .unwrap();
    let spec = WriteSpec::new(bind_params(&table, &["ID"]), columns);
    let step = compiler
        .compile_positioned(OperationType::Update, &table, &spec)
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1}));
    plan.execute(&mut data).unwrap();

    let executed = pool.executed();
    assert_eq!(executed.len(), 3);
    let cursor = executed[0].cursor_name.clone().unwrap();
    assert!(cursor.starts_with("DOCSQL_CUR_"));
    assert_eq!(
        executed[1].sql,
        format!("UPDATE DOCS SET AUTHOR_ID = ? WHERE CURRENT OF {}", cursor)
    );
    assert_eq!(executed[1].bind_values(), vec![SqlValue::Int(1)]);
    assert_eq!(executed[2].bind_values(), vec![SqlValue::Int(2)]);
    assert_eq!(data.stats().rows_selected, 2);
    assert_eq!(data.stats().rows_updated, 2);
    assert_eq!(pool.open_cursors(), 0);
}

#[test]
fn test_locked_delete() {
    let (pool, compiler) = generic_setup();
    pool.on_query("FOR UPDATE", &["ID"], vec![vec![SqlValue::Int(5)]]);
    let table = docs(&generic_server());
    let step = compiler
        .compile_positioned(OperationType::Delete, &table, &write_spec(&table, &["ID"], &[]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 5}));
    plan.execute(&mut data).unwrap();
    assert_eq!(data.stats().rows_deleted, 1);
    assert!(pool.executed_sql()[1].starts_with("DELETE FROM DOCS WHERE CURRENT OF DOCSQL_CUR_"));
}

// ==================== Conditional Tests ====================

#[test]
fn test_conditional_never_matching_leaves_stats_unchanged() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let rules = compiler
        .compile_rule_evaluator(&[RuleDefinition {
            condition: ConditionDefinition::Comparison {
                left: literal(SqlValue::Int(1)),
                op: CompareOp::Eq,
                right: Some(literal(SqlValue::Int(2))),
            },
            op: BoolOp::Or,
        }])
        .unwrap();
    let modify = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let block = ConditionalBlock::new(Arc::new(rules)).with_step(modify);
    let plan = plan_for(&compiler, block.into());

    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
    plan.execute(&mut data).unwrap();

    assert_eq!(data.stats(), &ExecutionStats::default());
    assert!(pool.executed().is_empty());
}

#[test]
fn test_conditional_matching_runs_steps() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let rules = compiler
        .compile_rule_evaluator(&[RuleDefinition {
            condition: ConditionDefinition::Extension {
                name: "sys_ParameterExists".to_string(),
                params: vec!["title".to_string()],
            },
            op: BoolOp::Or,
        }])
        .unwrap();
    let modify = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(
        &compiler,
        ConditionalBlock::new(Arc::new(rules)).with_step(modify).into(),
    );

    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
    plan.execute(&mut data).unwrap();
    assert_eq!(data.stats().rows_inserted, 1);

    let mut data = create_execution_data(&pool, json!({"id": 2}));
    plan.execute(&mut data).unwrap();
    assert_eq!(data.stats().rows_inserted, 0);
}

// ==================== Query Tests ====================

#[test]
fn test_query_result_feeds_next_step() {
    let (pool, compiler) = generic_setup();
    pool.on_query(
        "FROM DOCS",
        &["ID", "TITLE"],
        vec![
            vec![SqlValue::Int(1), SqlValue::Text("a".to_string())],
            vec![SqlValue::Int(2), SqlValue::Text("b".to_string())],
            vec![SqlValue::Int(3), SqlValue::Text("c".to_string())],
        ],
    );
    let d = docs(&generic_server());
    let query = compiler
        .compile(
            OperationType::Query,
            &d,
            false,
            docsql::SelectSpec::new(vec![Column::new(&d, "ID"), Column::new(&d, "TITLE")]),
        )
        .unwrap();
    let mut keys = ColumnBindings::new();
    keys.insert(Column::new(&d, "ID"), Arc::new(ResultColumn::new("ID")))
        .unwrap();
    let delete = compiler
        .compile(OperationType::Delete, &d, false, WriteSpec::new(keys, ColumnBindings::new()))
        .unwrap();

    let mut data = create_execution_data(&pool, json!({}));
    plan_for(&compiler, query).execute(&mut data).unwrap();
    assert_eq!(data.result_set_depth(), 1);

    let row = data.next_row().unwrap().unwrap();
    assert_eq!(row.get("TITLE"), Some(&SqlValue::Text("a".to_string())));
    delete.execute(&mut data).unwrap();
    assert_eq!(pool.executed().last().unwrap().bind_values(), vec![SqlValue::Int(1)]);

    let rest = data.pop_result_set().unwrap().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0]["TITLE"], json!("b"));
    assert_eq!(data.stats().rows_selected, 3);
    assert_eq!(pool.open_cursors(), 0);
}

// ==================== LOB Fill Tests ====================

#[test]
fn test_oracle_lob_fill_by_rowid() {
    let pool = create_test_pool("oracle");
    pool.on_query(
        "SELECT ROWID FROM DOCS",
        &["ROWID"],
        vec![vec![SqlValue::RowId("AAAR3sAAEAAAACXAAA".to_string())]],
    );
    let compiler = create_test_compiler(&pool, &oracle_server());
    let table = docs(&oracle_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["BODY"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1, "body": "long text"}));
    plan.execute(&mut data).unwrap();

    let executed = pool.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[0].sql, "INSERT INTO DOCS (ID, BODY) VALUES (?, EMPTY_CLOB())");
    assert_eq!(executed[1].sql, "SELECT ROWID FROM DOCS WHERE ID = ? FOR UPDATE");
    assert_eq!(executed[2].sql, "UPDATE DOCS SET BODY = ? WHERE ROWID = ?");
    assert_eq!(
        executed[2].bind_values(),
        vec![
            SqlValue::Text("long text".to_string()),
            SqlValue::RowId("AAAR3sAAEAAAACXAAA".to_string())
        ]
    );
    assert_eq!(data.stats().rows_inserted, 1);
    assert_eq!(pool.open_statements(), 0);
    assert_eq!(pool.open_cursors(), 0);
}

#[test]
fn test_oracle_lob_fill_by_written_columns() {
    let pool = create_test_pool("oracle");
    pool.on_query(
        "SELECT ROWID FROM DOCS",
        &["ROWID"],
        vec![vec![SqlValue::RowId("AAAR3sAAEAAAACXAAB".to_string())]],
    );
    let compiler = create_test_compiler(&pool, &oracle_server());
    let table = docs(&oracle_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &[], &["TITLE", "BODY"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"title": "Intro", "body": "long text"}));
    plan.execute(&mut data).unwrap();

    let executed = pool.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[1].sql, "SELECT ROWID FROM DOCS WHERE TITLE = ? FOR UPDATE");
    assert_eq!(executed[2].sql, "UPDATE DOCS SET BODY = ? WHERE ROWID = ?");
}

#[test]
fn test_oracle_lob_fill_refuses_unconstrained_locate() {
    let pool = create_test_pool("oracle");
    pool.on_query(
        "SELECT ROWID FROM DOCS",
        &["ROWID"],
        vec![
            vec![SqlValue::RowId("AAAR3sAAEAAAACXAAA".to_string())],
            vec![SqlValue::RowId("AAAR3sAAEAAAACXAAB".to_string())],
            vec![SqlValue::RowId("AAAR3sAAEAAAACXAAC".to_string())],
        ],
    );
    let compiler = create_test_compiler(&pool, &oracle_server());
    let table = docs(&oracle_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &[], &["TITLE", "BODY"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"body": "secret"}));
    let err = plan.execute(&mut data).unwrap_err();
    assert!(matches!(err, PlanError::UnlocatedLobFill(ref name) if name == "DOCS"));

    // only the placeholder insert ran; no row was locked or overwritten
    let executed = pool.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, "INSERT INTO DOCS (TITLE, BODY) VALUES (?, EMPTY_CLOB())");
    assert_eq!(pool.open_statements(), 0);
}

#[test]
fn test_oracle_null_lob_needs_no_fill() {
    let pool = create_test_pool("oracle");
    let compiler = create_test_compiler(&pool, &oracle_server());
    let table = docs(&oracle_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["BODY"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let mut data = create_execution_data(&pool, json!({"id": 1}));
    plan.execute(&mut data).unwrap();

    assert_eq!(pool.executed_sql(), vec!["INSERT INTO DOCS (ID, BODY) VALUES (?, null)".to_string()]);
}

// ==================== Batch & Lifecycle Tests ====================

#[test]
fn test_execute_rows_binds_input_fields() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let mut columns = ColumnBindings::new();
    columns
        .insert(Column::new(&table, "ID"), field("id"))
        .unwrap();
    columns
        .insert(Column::new(&table, "TITLE"), field("title"))
        .unwrap();
    let step = compiler
        .compile(OperationType::Insert, &table, true, WriteSpec::new(ColumnBindings::new(), columns))
        .unwrap();
    let plan = plan_for(&compiler, step);

    let rows = vec![json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})]
        .into_iter()
        .filter_map(|v| v.as_object().cloned());
    let mut data = create_execution_data(&pool, json!({}));
    plan.execute_rows(&mut data, rows).unwrap();

    let executed = pool.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[1].bind_values()[1], SqlValue::Text("b".to_string()));
    assert_eq!(data.stats().rows_inserted, 2);
    assert!(data.input_field("id").is_none());
    assert_eq!(pool.acquired() - pool.metadata_lookups(), 1);
}

#[test]
fn test_listener_notified_on_change() {
    let (pool, compiler) = generic_setup();
    pool.on_update("DELETE FROM DOCS", 0);
    let table = docs(&generic_server());
    let insert = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let delete = compiler
        .compile(OperationType::Delete, &table, false, write_spec(&table, &["ID"], &[]))
        .unwrap();
    let plan = plan_for(&compiler, insert).with_step(delete);

    let listener = Arc::new(RecordingListener::default());
    let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
    data.add_listener(listener.clone());
    plan.execute(&mut data).unwrap();

    let events = listener.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].table, "DOCS");
    assert_eq!(events[0].action, TableChangeAction::Insert);
    assert_eq!(events[0].rows, 1);
}

#[test]
fn test_connections_released_on_drop() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    {
        let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
        plan.execute(&mut data).unwrap();
        assert_eq!(data.connection_count(), 1);
        assert_eq!(pool.acquired(), pool.released() + 1);
    }
    assert_eq!(pool.acquired(), pool.released());
}

#[test]
fn test_connections_released_after_failure() {
    let (pool, compiler) = generic_setup();
    pool.fail_on("INSERT", SqlError::new("connection reset"));
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = plan_for(&compiler, step);

    {
        let mut data = create_execution_data(&pool, json!({"id": 1, "title": "x"}));
        assert!(plan.execute(&mut data).is_err());
    }
    assert_eq!(pool.acquired(), pool.released());
    assert_eq!(pool.open_statements(), 0);
}

#[test]
fn test_plan_shared_between_requests() {
    let (pool, compiler) = generic_setup();
    let table = docs(&generic_server());
    let step = compiler
        .compile(OperationType::Insert, &table, true, write_spec(&table, &["ID"], &["TITLE"]))
        .unwrap();
    let plan = Arc::new(plan_for(&compiler, step));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let plan = Arc::clone(&plan);
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut data = create_execution_data(&pool, json!({"id": i, "title": format!("t{}", i)}));
                plan.execute(&mut data).unwrap();
                data.stats().rows_inserted
            })
        })
        .collect();
    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 4);
    assert_eq!(pool.executed().len(), 4);
}
