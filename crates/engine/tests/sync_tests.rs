//! End-to-end reconciliation passes against mocked backends

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notidav_caldav::{CalDavClient, CalDavConfig};
use notidav_core::{canonical_task_hash, Task};
use notidav_engine::{SyncEngine, SyncOptions};
use notidav_notion::{NotionClient, NotionConfig};
use notidav_store::{MappingRecord, MemoryStore, StateStore};

fn engine(notion_server: &MockServer) -> (SyncEngine, StateStore) {
    let store = StateStore::new(Arc::new(MemoryStore::new()));
    let caldav = CalDavClient::new(CalDavConfig::new("apple@example.com", "pw"))
        .expect("caldav client");
    let notion = NotionClient::new(
        NotionConfig::new("token").with_base_url(notion_server.uri()),
    )
    .expect("notion client");
    (SyncEngine::new(store.clone(), caldav, notion), store)
}

async fn seed_settings(store: &StateStore, caldav_uri: &str) {
    store
        .update_settings(&[
            ("calendar_href", Some(json!(format!("{caldav_uri}/home")))),
            ("calendar_color", Some(json!("#FF7F00"))),
        ])
        .await;
}

async fn mount_notion(server: &MockServer, pages: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"object": "data_source", "id": "ds1", "title": [{"plain_text": "Tasks"}]}],
            "has_more": false
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/data_sources/ds1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "data_source",
            "id": "ds1",
            "title": [{"plain_text": "Tasks"}],
            "properties": {
                "Title": {"type": "title", "title": {}},
                "Status": {"type": "status", "status": {"options": [
                    {"name": "Todo"}, {"name": "In progress"}, {"name": "Completed"}
                ]}},
                "Due date": {"type": "date", "date": {}}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/data_sources/ds1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": pages,
            "has_more": false
        })))
        .mount(server)
        .await;
}

fn page_json(id: &str, title: &str, status: &str, start: &str, last_edited: &str) -> Value {
    json!({
        "id": id,
        "url": format!("https://www.notion.so/{id}"),
        "last_edited_time": last_edited,
        "parent": {"data_source_id": "ds1"},
        "properties": {
            "Title": {"type": "title", "title": [{"plain_text": title}]},
            "Status": {"type": "status", "status": {"name": status}},
            "Due date": {"type": "date", "date": {"start": start, "end": null}}
        }
    })
}

fn timed_event_ics(id: &str, summary: &str, start: &str, end: &str, last_modified: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:notion-{id}@sync\r\n\
         SUMMARY:{summary}\r\nDTSTART:{start}\r\nDTEND:{end}\r\n\
         LAST-MODIFIED:{last_modified}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    )
}

fn empty_multistatus() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/home/</d:href>
    <d:propstat><d:status>HTTP/1.1 200 OK</d:status></d:propstat>
  </d:response>
</d:multistatus>"#
}

fn listing_multistatus(names: &[&str]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<d:multistatus xmlns:d=\"DAV:\">\n",
    );
    for name in names {
        body.push_str(&format!(
            "  <d:response>\n    <d:href>/home/{name}.ics</d:href>\n    <d:propstat>\n      \
             <d:prop><d:getetag>\"etag-{name}\"</d:getetag></d:prop>\n      \
             <d:status>HTTP/1.1 200 OK</d:status>\n    </d:propstat>\n  </d:response>\n"
        ));
    }
    body.push_str("</d:multistatus>\n");
    body
}

#[tokio::test]
async fn test_fresh_create_notion_to_caldav() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    mount_notion(
        &notion_server,
        json!([page_json("P", "Plan", "Todo", "2025-06-01", "2025-06-02T10:00:00.000Z")]),
    )
    .await;

    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(empty_multistatus()))
        .mount(&caldav_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/home/P.ics"))
        .and(body_string_contains("UID:notion-P@sync"))
        .and(body_string_contains("DTSTART;VALUE=DATE:20250601"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"e1\""))
        .expect(1)
        .mount(&caldav_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");

    assert_eq!(report.create_caldav, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.synced, 1);

    let mapping = store.mapping_by_notion("P").await.expect("mapping stored");
    assert_eq!(mapping.caldav_uid, "notion-P@sync");
    assert_eq!(mapping.caldav_etag.as_deref(), Some("\"e1\""));
    assert!(mapping.notion_hash.is_some());
    assert_eq!(mapping.notion_hash, mapping.caldav_hash);

    // The Notion cursor advances to the newest edit seen
    assert_eq!(
        store.load_notion_sync_token().await.as_deref(),
        Some("2025-06-02T10:00:00.000Z")
    );
}

#[tokio::test]
async fn test_fresh_create_caldav_to_notion() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    mount_notion(&notion_server, json!([])).await;

    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(listing_multistatus(&["X"])))
        .mount(&caldav_server)
        .await;

    let all_day = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:notion-X@sync\r\n\
                   SUMMARY:○ Buy milk\r\nDTSTART;VALUE=DATE:20250601\r\n\
                   DTEND;VALUE=DATE:20250602\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    Mock::given(method("GET"))
        .and(path("/home/X.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(all_day))
        .mount(&caldav_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_string_contains("Buy milk"))
        .and(body_string_contains("Todo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "new1"})))
        .expect(1)
        .mount(&notion_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");

    assert_eq!(report.create_notion, 1);
    assert_eq!(report.errors, 0);

    let mapping = store.mapping_by_notion("X").await.expect("mapping stored");
    assert_eq!(mapping.notion_hash, mapping.caldav_hash);
}

#[tokio::test]
async fn test_conflict_notion_wins() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    // Stored mapping reflects the old aligned content
    let old_task = Task {
        notion_id: "P".into(),
        title: "Plan".into(),
        status: Some("Todo".into()),
        start_date: Some("2025-06-01T10:00:00Z".into()),
        end_date: Some("2025-06-01T11:00:00Z".into()),
        ..Task::default()
    };
    let mut record = MappingRecord::new("P");
    record.notion_hash = Some(canonical_task_hash(&old_task));
    record.caldav_hash = Some(canonical_task_hash(&old_task));
    store.save_mapping(&record).await;

    // Notion edited at 10:00 (title), calendar edited at 09:00 (description)
    let page = json!({
        "id": "P",
        "last_edited_time": "2025-06-02T10:00:00.000Z",
        "parent": {"data_source_id": "ds1"},
        "properties": {
            "Title": {"type": "title", "title": [{"plain_text": "Plan v2"}]},
            "Status": {"type": "status", "status": {"name": "Todo"}},
            "Due date": {"type": "date", "date": {
                "start": "2025-06-01T10:00:00.000Z",
                "end": "2025-06-01T11:00:00.000Z"
            }}
        }
    });
    mount_notion(&notion_server, json!([page])).await;

    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(listing_multistatus(&["P"])))
        .mount(&caldav_server)
        .await;

    let event = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:notion-P@sync\r\n\
                 SUMMARY:○ Plan\r\nDESCRIPTION:edited on the phone\r\n\
                 DTSTART:20250601T100000Z\r\nDTEND:20250601T110000Z\r\n\
                 LAST-MODIFIED:20250602T090000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    Mock::given(method("GET"))
        .and(path("/home/P.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(event))
        .mount(&caldav_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/home/P.ics"))
        .and(body_string_contains("Plan v2"))
        .respond_with(ResponseTemplate::new(204).insert_header("ETag", "\"e2\""))
        .expect(1)
        .mount(&caldav_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");

    assert_eq!(report.update_caldav, 1);
    assert_eq!(report.update_notion, 0);
    assert_eq!(report.errors, 0);

    // Both stored hashes now reflect the winning Notion payload
    let mapping = store.mapping_by_notion("P").await.expect("mapping kept");
    let winner = Task {
        title: "Plan v2".into(),
        url: Some("https://www.notion.so/P".into()),
        last_edited_time: Some("2025-06-02T10:00:00.000Z".into()),
        ..old_task
    };
    assert_eq!(mapping.notion_hash.as_deref(), Some(canonical_task_hash(&winner).as_str()));
    assert_eq!(mapping.notion_hash, mapping.caldav_hash);
}

#[tokio::test]
async fn test_recalibrate_and_convergence() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    // Same content on both sides, but the stored notion hash is stale
    let mut record = MappingRecord::new("P");
    record.notion_hash = Some("stale".into());
    let aligned = Task {
        notion_id: "P".into(),
        title: "Plan".into(),
        status: Some("Todo".into()),
        start_date: Some("2025-06-01T10:00:00Z".into()),
        end_date: Some("2025-06-01T11:00:00Z".into()),
        ..Task::default()
    };
    record.caldav_hash = Some(canonical_task_hash(&aligned));
    store.save_mapping(&record).await;

    let page = json!({
        "id": "P",
        "last_edited_time": "2025-06-01T12:00:00.000Z",
        "parent": {"data_source_id": "ds1"},
        "properties": {
            "Title": {"type": "title", "title": [{"plain_text": "Plan"}]},
            "Status": {"type": "status", "status": {"name": "Todo"}},
            "Due date": {"type": "date", "date": {
                "start": "2025-06-01T10:00:00.000Z",
                "end": "2025-06-01T11:00:00.000Z"
            }}
        }
    });
    mount_notion(&notion_server, json!([page])).await;

    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(listing_multistatus(&["P"])))
        .mount(&caldav_server)
        .await;

    let event = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:notion-P@sync\r\n\
                 SUMMARY:○ Plan\r\nDTSTART:20250601T100000Z\r\nDTEND:20250601T110000Z\r\n\
                 LAST-MODIFIED:20250601T120000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    Mock::given(method("GET"))
        .and(path("/home/P.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(event))
        .mount(&caldav_server)
        .await;

    // No PUT/PATCH mocks: any write attempt would surface as an error
    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");
    assert_eq!(report.recalibrate, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.applied(), 0);

    // A second pass over the now-aligned state is a pure noop
    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");
    assert_eq!(report.noop, 1);
    assert_eq!(report.recalibrate, 0);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn test_incremental_suppresses_delete_then_authoritative_deletes() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;
    store.persist_notion_sync_token(Some("2025-06-01T00:00:00Z")).await;
    store.save_mapping(&MappingRecord::new("Y")).await;

    mount_notion(&notion_server, json!([])).await;

    // Incremental CalDAV round still reports the event as present
    let report_body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/home/Y.ics</d:href>
    <d:propstat>
      <d:prop><d:getetag>"ey"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:sync-token>{}/sync/7</d:sync-token>
</d:multistatus>"#,
        caldav_server.uri()
    );
    store.persist_caldav_sync_token(Some("tok-6")).await;
    Mock::given(method("REPORT"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(report_body))
        .mount(&caldav_server)
        .await;

    let event = timed_event_ics(
        "Y",
        "○ Lingering",
        "20250601T100000Z",
        "20250601T110000Z",
        "20250601T100000Z",
    );
    Mock::given(method("GET"))
        .and(path("/home/Y.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(event))
        .mount(&caldav_server)
        .await;

    // Incremental pass: absence from the filtered Notion result set must
    // not delete anything
    let report = engine
        .run_sync(SyncOptions::bidirectional(true))
        .await
        .expect("pass failed");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.delete_caldav, 0);
    assert!(store.mapping_by_notion("Y").await.is_some());

    // Authoritative pass: the task is genuinely gone, so the event goes too
    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(listing_multistatus(&["Y"])))
        .mount(&caldav_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/home/Y.ics"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&caldav_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");
    assert_eq!(report.delete_caldav, 1);
    assert!(store.mapping_by_notion("Y").await.is_none());
}

#[tokio::test]
async fn test_tombstone_drops_mapping_without_notion_write() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;
    store.persist_caldav_sync_token(Some("tok-1")).await;
    store.save_mapping(&MappingRecord::new("Z")).await;

    mount_notion(&notion_server, json!([])).await;

    let report_body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/home/Z.ics</d:href>
    <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:response>
  <d:sync-token>{}/sync/2</d:sync-token>
</d:multistatus>"#,
        caldav_server.uri()
    );
    Mock::given(method("REPORT"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(report_body))
        .mount(&caldav_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(true))
        .await
        .expect("pass failed");

    assert_eq!(report.errors, 0);
    assert!(store.mapping_by_notion("Z").await.is_none());
    // The rotated token is committed
    assert_eq!(
        store.load_caldav_sync_token().await,
        Some(format!("{}/sync/2", caldav_server.uri()))
    );
}

#[tokio::test]
async fn test_overdue_status_synthesized_on_emit_only() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339_opts(SecondsFormat::Secs, true);
    mount_notion(
        &notion_server,
        json!([page_json("L", "Late", "In progress", yesterday.as_str(), "2025-06-02T10:00:00.000Z")]),
    )
    .await;

    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(empty_multistatus()))
        .mount(&caldav_server)
        .await;

    // Summary carries the Overdue glyph; no Notion write happens at all
    Mock::given(method("PUT"))
        .and(path("/home/L.ics"))
        .and(body_string_contains("SUMMARY:⊜ Late"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&caldav_server)
        .await;

    let report = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect("pass failed");
    assert_eq!(report.create_caldav, 1);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn test_direction_flag_downgrades_to_skipped() {
    let notion_server = MockServer::start().await;
    let caldav_server = MockServer::start().await;
    let (engine, store) = engine(&notion_server);
    seed_settings(&store, &caldav_server.uri()).await;

    mount_notion(
        &notion_server,
        json!([page_json("P", "Plan", "Todo", "2025-06-01", "2025-06-02T10:00:00.000Z")]),
    )
    .await;
    Mock::given(method("PROPFIND"))
        .and(path("/home/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(empty_multistatus()))
        .mount(&caldav_server)
        .await;

    // Notion-only direction forbids the calendar create
    let report = engine
        .run_sync(SyncOptions::caldav_to_notion())
        .await
        .expect("pass failed");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.create_caldav, 0);
}

#[tokio::test]
async fn test_concurrent_pass_is_rejected() {
    let notion_server = MockServer::start().await;
    let (engine, _) = engine(&notion_server);

    let _guard = engine.gate().try_acquire().expect("gate free");
    let err = engine
        .run_sync(SyncOptions::bidirectional(false))
        .await
        .expect_err("gate should be busy");
    assert!(err.to_string().contains("already running"));
}
