//! Orchestration tests for `TableSync` against the scripted mock transport.

use avsync_client::{
    LoadPhase, NotificationLevel, NotificationLog, PollPolicy, PreconditionError, SourceConfig,
    SyncContext, SyncError, SyncSettings, TableSync,
};
use avsync_core::construction::local_midnight_millis;
use avsync_core::{
    ColumnType, FieldRoles, FieldUpdate, RowFilter, ReportRange, TaskPatch, TransportError,
    ValidationError, WriteResponse,
};
use avsync_test_utils::fixtures::{self, SOURCE_ID};
use avsync_test_utils::{Call, ContentUnit, MockTransport};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn source() -> SourceConfig {
    SourceConfig {
        av_id: SOURCE_ID.to_string(),
        view_id: Some("v-gantt".to_string()),
        roles: fixtures::roles(),
    }
}

fn setup(mock: MockTransport) -> (Arc<MockTransport>, Arc<NotificationLog>, TableSync) {
    setup_with(mock, source())
}

fn setup_with(
    mock: MockTransport,
    source: SourceConfig,
) -> (Arc<MockTransport>, Arc<NotificationLog>, TableSync) {
    let mock = Arc::new(mock);
    let log = Arc::new(NotificationLog::new());
    let settings = SyncSettings {
        poll: PollPolicy::new(3, Duration::from_millis(600)),
        reload_after_write: true,
    };
    let ctx = SyncContext::new(mock.clone(), log.clone(), source).with_settings(settings);
    (mock, log, TableSync::new(ctx))
}

fn seeded() -> MockTransport {
    MockTransport::with_table(fixtures::keys_array(), fixtures::rows_view(fixtures::task_rows()))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// LOADING
// ============================================================================

#[tokio::test]
async fn test_init_loads_configured_view() {
    let (mock, _log, sync) = setup(seeded());
    sync.init().await.unwrap();

    let table = sync.snapshot().await;
    assert_eq!(table.columns.len(), 6);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(sync.state().await.phase, LoadPhase::Ready);
    assert!(!sync.state().await.busy);

    let query = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::FetchRows { query, .. } => Some(query),
            _ => None,
        })
        .unwrap();
    assert_eq!(query.view_id.as_deref(), Some("v-gantt"));
    assert_eq!(query.page, 1);
    assert_eq!(query.page_size, -1);

    let child = sync.task("item-2").await.unwrap();
    assert_eq!(child.title, "Build");
    assert_eq!(child.parent_id.as_deref(), Some("blk-1"));
    assert_eq!(child.start.as_deref(), Some("2024-03-06"));
}

#[tokio::test]
async fn test_failed_load_keeps_previous_table() {
    let (mock, _log, sync) = setup(seeded());
    sync.reload().await.unwrap();

    mock.fail_loads(TransportError::Http {
        endpoint: "/api/av/getAttributeViewKeysByAvID".to_string(),
        reason: "connection refused".to_string(),
    });
    let err = sync.reload().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(TransportError::Http { .. })));

    let state = sync.state().await;
    assert_eq!(state.phase, LoadPhase::Error);
    assert!(!state.busy);
    assert!(state.last_error.unwrap().contains("connection refused"));
    assert_eq!(sync.snapshot().await.rows.len(), 2);

    mock.clear_load_failure();
    sync.reload().await.unwrap();
    let state = sync.state().await;
    assert_eq!(state.phase, LoadPhase::Ready);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_load_through_alternative_envelopes() {
    let rows = || {
        vec![
            fixtures::row_cells_map("item-a", "Alpha", "Doing"),
            fixtures::row_key_values("item-b", "Beta", "Todo"),
            fixtures::row_cell_values("item-c", "Gamma", "Done"),
        ]
    };
    let envelopes = [
        (fixtures::keys_in_data(), fixtures::rows_data_view(rows())),
        (fixtures::keys_map(), fixtures::rows_view(rows())),
        (fixtures::keys_nested(), fixtures::rows_data_view(rows())),
    ];

    for (keys, rows) in envelopes {
        let (_mock, _log, sync) = setup(MockTransport::with_table(keys, rows));
        let table = sync.load(SOURCE_ID, None).await.unwrap();

        let key_ids: Vec<&str> = table.columns.iter().map(|c| c.key_id.as_str()).collect();
        assert_eq!(
            key_ids,
            vec!["k-name", "k-start", "k-end", "k-status", "k-parent", "k-progress"]
        );
        assert_eq!(table.column_type("k-status"), Some(&ColumnType::Select));

        let titles: Vec<(&str, Option<&str>, Option<&str>)> = table
            .rows
            .iter()
            .map(|r| (r.item_id.as_str(), r.text("k-name"), r.text("k-status")))
            .collect();
        assert_eq!(
            titles,
            vec![
                ("item-a", Some("Alpha"), Some("Doing")),
                ("item-b", Some("Beta"), Some("Todo")),
                ("item-c", Some("Gamma"), Some("Done")),
            ]
        );
        let beta = table.row("item-b").unwrap();
        assert_eq!(beta.cell("k-name").unwrap().cell_id.as_deref(), Some("c-1"));
        assert!(beta.cell("k-start").unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_init_rejects_unknown_role_column() {
    let mut source = source();
    source.roles.start = Some("k-gone".to_string());
    let (_mock, _log, sync) = setup_with(seeded(), source);

    let err = sync.init().await.unwrap_err();
    match err {
        SyncError::Validation(ValidationError::UnknownColumn { role, key_id }) => {
            assert_eq!(role, "start");
            assert_eq!(key_id, "k-gone");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(sync.snapshot().await.rows.len(), 2);
    assert_eq!(sync.state().await.phase, LoadPhase::Ready);
}

#[tokio::test]
async fn test_teardown_resets() {
    let (_mock, _log, sync) = setup(seeded());
    sync.init().await.unwrap();
    sync.teardown().await;
    assert!(sync.snapshot().await.is_empty());
    assert_eq!(sync.state().await.phase, LoadPhase::Idle);
}

#[tokio::test]
async fn test_list_views() {
    let mock = seeded();
    mock.set_views(fixtures::views());
    let (_mock, _log, sync) = setup(mock);
    let views = sync.list_views().await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[1].view_id, "v-gantt");
    assert_eq!(views[1].layout, "gantt");
}

#[tokio::test]
async fn test_report_over_loaded_tasks() {
    let (_mock, _log, sync) = setup(seeded());
    sync.init().await.unwrap();
    let summary = sync
        .report(&RowFilter::all(), &ReportRange::new("2024-03-01", "2024-03-05"))
        .await;
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.pending.len(), 1);
}

// ============================================================================
// BATCH UPDATE
// ============================================================================

#[tokio::test]
async fn test_relation_second_encoding_succeeds_with_one_reload() {
    let mock = seeded();
    mock.push_write_response(fixtures::write_rejected());
    mock.push_write_response(fixtures::write_rejected());
    mock.push_write_response(fixtures::write_ok());
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();
    let fetches_before = mock.row_fetches();

    let updates = vec![
        FieldUpdate::new("k-parent", "blk-1"),
        FieldUpdate::new("k-status", "Doing"),
    ];
    sync.batch_update("item-2", updates).await.unwrap();

    let writes = mock.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0][0].value, json!({"relation": [{"content": "blk-1"}]}));
    assert_eq!(writes[1][0].value, json!({"relation": [{"content": "blk-1"}]}));
    assert_eq!(writes[2][0].value, json!({"relation": [{"id": "blk-1"}]}));
    for batch in &writes {
        assert_eq!(batch[1].value, json!({"mSelect": [{"content": "Doing"}]}));
        assert!(batch.iter().all(|w| w.item_id == "item-2"));
    }

    assert_eq!(mock.row_fetches(), fetches_before + 1);
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_rejection_without_relation_is_not_retried() {
    let mock = seeded();
    mock.push_write_response(fixtures::write_rejected());
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();
    let fetches_before = mock.row_fetches();

    let err = sync
        .batch_update("item-1", vec![FieldUpdate::new("k-progress", 50)])
        .await
        .unwrap_err();
    match err {
        SyncError::WriteRejected { code, response, .. } => {
            assert_eq!(code, -1);
            assert_eq!(response.msg, "invalid attribute value");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(mock.writes().len(), 1);
    assert_eq!(mock.row_fetches(), fetches_before);
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("invalid attribute value"));
}

#[tokio::test]
async fn test_relation_retries_exhausted() {
    let mock = seeded();
    for _ in 0..4 {
        mock.push_write_response(fixtures::write_rejected());
    }
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let result = sync
        .batch_update("item-2", vec![FieldUpdate::new("k-parent", "blk-1")])
        .await;
    assert!(matches!(result, Err(SyncError::WriteRejected { .. })));

    let writes = mock.writes();
    assert_eq!(writes.len(), 4);
    assert_eq!(writes[3][0].value, json!({"relation": {"blockIDs": ["blk-1"]}}));
    assert_eq!(log.errors().len(), 1);
}

#[tokio::test]
async fn test_explicit_type_overrides_table() {
    let (mock, _log, sync) = setup(seeded());
    sync.reload().await.unwrap();
    let update = FieldUpdate::new("k-status", "a, b").with_type(avsync_core::ColumnType::MultiSelect);
    sync.batch_update_with_reload("item-1", vec![update], false)
        .await
        .unwrap();
    assert_eq!(
        mock.writes()[0][0].value,
        json!({"mSelect": [{"content": "a"}, {"content": "b"}]})
    );
}

#[tokio::test]
async fn test_unknown_key_is_written_as_text() {
    let (mock, _log, sync) = setup(seeded());
    sync.reload().await.unwrap();
    sync.batch_update_with_reload("item-1", vec![FieldUpdate::new("k-other", 7)], false)
        .await
        .unwrap();
    assert_eq!(mock.writes()[0][0].value, json!({"text": {"content": "7"}}));
}

#[tokio::test]
async fn test_missing_source_is_precondition() {
    let mock = Arc::new(seeded());
    let ctx = SyncContext::new(mock.clone(), Arc::new(NotificationLog::new()), SourceConfig::new(""));
    let sync = TableSync::new(ctx);
    let err = sync
        .batch_update("item-1", vec![FieldUpdate::new("k-status", "Done")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Precondition(PreconditionError::MissingSource(None))
    ));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_empty_patch_only_reloads() {
    let (mock, _log, sync) = setup(seeded());
    sync.reload().await.unwrap();
    sync.update_task_fields("item-1", TaskPatch::default())
        .await
        .unwrap();
    assert!(mock.writes().is_empty());
    assert_eq!(mock.row_fetches(), 2);
}

#[tokio::test]
async fn test_write_raw_fields_rejected() {
    let mock = seeded();
    mock.push_write_response(fixtures::write_rejected());
    let (mock, log, sync) = setup(mock);

    let raw = vec![("k-status".to_string(), json!({"mSelect": [{"content": "Done"}]}))];
    let err = sync.write_raw_fields("item-1", raw).await.unwrap_err();
    assert!(matches!(err, SyncError::WriteRejected { .. }));
    assert_eq!(mock.writes()[0][0].value, json!({"mSelect": [{"content": "Done"}]}));
    assert_eq!(mock.row_fetches(), 0);
    assert_eq!(log.errors().len(), 1);
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn test_create_task_on_empty_table_fails_fast() {
    let mock = MockTransport::with_table(fixtures::keys_array(), fixtures::rows_view(vec![]));
    let (mock, _log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let err = sync
        .create_task("New", None, date(2024, 3, 1), 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Precondition(PreconditionError::EmptyTable)
    ));
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_create_task_as_sibling_of_first_row() {
    let mock = seeded();
    let mut rows = fixtures::task_rows();
    rows.push(fixtures::task_row(
        "item-new", "blk-new", "Write docs", "", "", "Todo", None,
    ));
    mock.push_rows(fixtures::rows_view(rows));
    mock.set_created_unit(fixtures::created_unit("blk-new"));
    mock.add_content_unit(ContentUnit {
        id: "blk-1".to_string(),
        parent_id: Some("doc-1".to_string()),
    });
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let item_id = sync
        .create_task("Write docs", None, date(2024, 3, 10), 3)
        .await
        .unwrap();

    let calls = mock.calls();
    assert!(calls.contains(&Call::CreateContentUnit {
        body: "Write docs".to_string(),
        parent_id: "doc-1".to_string(),
    }));
    let attached = calls
        .iter()
        .find_map(|call| match call {
            Call::AttachRows { sources, .. } => Some(sources.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].id, "blk-new");
    assert!(!attached[0].is_detached);
    assert_eq!(attached[0].item_id.as_deref(), Some(item_id.as_str()));

    let writes = mock.writes();
    assert_eq!(writes.len(), 1);
    let batch = &writes[0];
    assert!(batch.iter().all(|w| w.item_id == item_id));
    let by_key = |key: &str| batch.iter().find(|w| w.key_id == key).unwrap().value.clone();
    assert_eq!(
        by_key("k-start")["date"]["content"],
        json!(local_midnight_millis(date(2024, 3, 10)).unwrap())
    );
    assert_eq!(
        by_key("k-end")["date"]["content"],
        json!(local_midnight_millis(date(2024, 3, 12)).unwrap())
    );
    assert_eq!(by_key("k-parent"), json!({"relation": [{"content": ""}]}));
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_create_task_under_known_row() {
    let mock = seeded();
    mock.set_created_unit(json!([{"id": "blk-new"}]));
    let (mock, _log, sync) = setup(mock);
    sync.reload().await.unwrap();

    tokio::time::pause();
    sync.create_task("Child", Some("blk-1"), date(2024, 3, 1), 1)
        .await
        .unwrap();

    let calls = mock.calls();
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::FetchContentUnit { .. })));
    assert!(calls.iter().any(|call| matches!(
        call,
        Call::CreateContentUnit { parent_id, .. } if parent_id == "blk-1"
    )));
    let parent = mock.writes()[0]
        .iter()
        .find(|w| w.key_id == "k-parent")
        .unwrap()
        .value
        .clone();
    assert_eq!(parent, json!({"relation": [{"content": "blk-1"}]}));
}

#[tokio::test(start_paused = true)]
async fn test_polling_timeout_still_writes_fields() {
    let mock = seeded();
    mock.set_created_unit(fixtures::created_unit("blk-ghost"));
    let (mock, _log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let item_id = sync
        .create_task("Ghost", Some("raw-parent"), date(2024, 3, 1), 2)
        .await
        .unwrap();

    // initial load, three polls, reload after the field write
    assert_eq!(mock.row_fetches(), 5);
    let writes = mock.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].iter().all(|w| w.item_id == item_id));
    assert!(mock.calls().iter().any(|call| matches!(
        call,
        Call::CreateContentUnit { parent_id, .. } if parent_id == "raw-parent"
    )));
}

#[tokio::test]
async fn test_create_task_without_block_id() {
    let mock = seeded();
    mock.set_created_unit(json!([{"doOperations": []}]));
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let err = sync
        .create_task("X", Some("blk-1"), date(2024, 3, 1), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Precondition(PreconditionError::MissingNewBlockId)
    ));
    assert!(!mock
        .calls()
        .iter()
        .any(|call| matches!(call, Call::AttachRows { .. })));
    assert_eq!(log.errors().len(), 1);

    mock.set_created_unit(json!(null));
    let err = sync
        .create_task("X", Some("blk-1"), date(2024, 3, 1), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Precondition(PreconditionError::ContentUnitCreationFailed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_create_task_field_write_failure_notifies_once() {
    let mock = seeded();
    mock.set_created_unit(fixtures::created_unit("blk-late"));
    mock.push_write_response(fixtures::write_rejected());
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    let err = sync
        .create_task("Late", None, date(2024, 3, 1), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::WriteRejected { .. }));
    assert_eq!(mock.writes().len(), 1);

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Create task failed"));
    assert!(errors[0].message.contains("invalid attribute value"));
}

#[tokio::test]
async fn test_out_of_range_duration_is_rejected_before_mutation() {
    let (mock, log, sync) = setup(seeded());
    sync.reload().await.unwrap();
    mock.reset_calls();

    let err = sync
        .create_task("Forever", Some("blk-1"), date(2024, 3, 1), i64::MAX / 1000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::InvalidValue { .. })
    ));

    let err = sync
        .create_detached_record("Forever", date(2024, 3, 1), i64::MAX, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert!(mock.calls().is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_create_detached_record() {
    let (mock, _log, sync) = setup(seeded());
    sync.reload().await.unwrap();

    let fields = vec![
        ("k-progress".to_string(), json!(40)),
        ("k-start".to_string(), json!("2024-03-02 09:30")),
    ];
    sync.create_detached_record("Outcome", date(2024, 3, 1), 2, fields)
        .await
        .unwrap();

    let rows = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::AppendDetachedRows { rows, .. } => Some(rows),
            _ => None,
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    let keys: Vec<&str> = rows[0].iter().map(|f| f.key_id.as_str()).collect();
    assert_eq!(keys, vec!["k-progress", "k-start", "k-name", "k-end"]);
    assert_eq!(rows[0][0].fields["number"]["content"], json!(40));
    assert_eq!(rows[0][1].fields["date"]["isNotTime"], json!(false));
    assert_eq!(rows[0][2].fields["block"]["content"], json!("Outcome"));
    assert_eq!(mock.row_fetches(), 2);
}

// ============================================================================
// DELETE
// ============================================================================

#[tokio::test]
async fn test_delete_then_reload() {
    let mock = seeded();
    mock.push_rows(fixtures::rows_view(vec![fixtures::task_rows().remove(0)]));
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    sync.delete_task("item-2").await.unwrap();
    assert!(mock.calls().contains(&Call::RemoveRows {
        source_id: SOURCE_ID.to_string(),
        item_ids: vec!["item-2".to_string()],
    }));
    assert_eq!(sync.snapshot().await.rows.len(), 1);
    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, NotificationLevel::Info);
}

#[tokio::test]
async fn test_failed_delete_keeps_table() {
    let mock = seeded();
    mock.fail_removals(TransportError::Api {
        endpoint: "/api/av/removeAttributeViewBlocks".to_string(),
        code: -1,
        message: "no such row".to_string(),
    });
    let (mock, log, sync) = setup(mock);
    sync.reload().await.unwrap();

    assert!(sync.delete_task("item-9").await.is_err());
    assert_eq!(sync.snapshot().await.rows.len(), 2);
    assert_eq!(mock.row_fetches(), 1);
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("no such row"));
}

// ============================================================================
// ROLE COLUMNS
// ============================================================================

#[tokio::test]
async fn test_ensure_role_columns_keeps_configured_roles() {
    let (mock, _log, sync) = setup(seeded());

    let roles = sync.ensure_role_columns().await.unwrap();
    assert_eq!(roles, fixtures::roles());
    assert!(!mock
        .calls()
        .iter()
        .any(|call| matches!(call, Call::AddColumn { .. })));
    assert_eq!(mock.row_fetches(), 1);
}

#[tokio::test]
async fn test_ensure_role_columns_reuses_and_creates() {
    let keys = json!({"keys": [
        {"id": "k-name", "name": "Name", "type": "block"},
        {"id": "k-when", "name": "start date", "type": "date"},
    ]});
    let mock = MockTransport::with_table(keys, fixtures::rows_view(vec![]));
    mock.push_column_response(Ok(WriteResponse::ok()));
    mock.push_column_response(Ok(fixtures::write_rejected()));
    mock.push_column_response(Ok(WriteResponse {
        code: 0,
        msg: String::new(),
        data: Some(json!({"id": "k-parent-remote"})),
    }));
    mock.push_column_response(Err(TransportError::Http {
        endpoint: "/api/av/addAttributeViewKey".to_string(),
        reason: "timeout".to_string(),
    }));
    let (mock, log, sync) = setup_with(mock, SourceConfig::new(SOURCE_ID));

    let roles = sync.ensure_role_columns().await.unwrap();

    let added: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::AddColumn { column, .. } => Some(column),
            _ => None,
        })
        .collect();
    let names: Vec<&str> = added.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["End date", "Status", "Parent task", "Progress"]);
    assert_eq!(added[1].column_type, ColumnType::MultiSelect);
    assert_eq!(added[1].options, vec!["In progress", "Done", "Paused"]);
    assert!(added[0].options.is_empty());

    let expected = FieldRoles {
        start: Some("k-when".to_string()),
        end: Some(added[0].key_id.clone()),
        parent: Some("k-parent-remote".to_string()),
        ..Default::default()
    };
    assert_eq!(roles, expected);

    let errors = log.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.starts_with("Create column Status failed"));
    assert!(errors[1].message.contains("timeout"));
    assert_eq!(log.entries().len(), 4);
    assert_eq!(mock.row_fetches(), 1);
}
