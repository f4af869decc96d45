//! Alertmanager client tests against a mock `/api/v2/silences` endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use silencer_core::{
    AlertmanagerClient, FixedClock, Matcher, MatcherTemplate, Silence, SilenceReconciler,
    SilenceStore, SilencerError,
};

#[derive(Clone, Default)]
struct MockAlertmanager {
    silences: Arc<Mutex<Vec<Value>>>,
    filters: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MockAlertmanager {
    fn matches(silence: &Value, name: &str, value: &str) -> bool {
        silence["matchers"]
            .as_array()
            .is_some_and(|ms| ms.iter().any(|m| m["name"] == name && m["value"] == value))
    }
}

async fn list_silences(
    State(mock): State<MockAlertmanager>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    if mock.failing.load(Ordering::SeqCst) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string()));
    }
    let filter = query.get("filter").cloned().unwrap_or_default();
    mock.filters.lock().push(filter.clone());

    let Some((name, value)) = filter.split_once('=') else {
        return Err((StatusCode::BAD_REQUEST, "bad matcher format".to_string()));
    };
    let found = mock
        .silences
        .lock()
        .iter()
        .filter(|s| MockAlertmanager::matches(s, name, value))
        .cloned()
        .collect();
    Ok(Json(found))
}

async fn post_silence(
    State(mock): State<MockAlertmanager>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if mock.failing.load(Ordering::SeqCst) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string()));
    }
    let mut silences = mock.silences.lock();
    let id = format!("silence-{}", silences.len() + 1);
    body["id"] = json!(id);
    body["status"] = json!({"state": "active"});
    silences.push(body);
    Ok(Json(json!({ "silenceID": id })))
}

async fn start(mock: MockAlertmanager) -> SocketAddr {
    let app = Router::new()
        .route("/api/v2/silences", get(list_silences).post(post_silence))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn silence(value: &str) -> Silence {
    let start = Utc::now();
    Silence::new(
        vec![Matcher::equal("instance", value)],
        start,
        start + TimeDelta::hours(1),
        "kured-alert-silencer",
        format!("Silencing during node reboot: {value}"),
    )
    .unwrap()
}

#[tokio::test]
async fn lists_and_creates_silences() {
    let mock = MockAlertmanager::default();
    let addr = start(mock.clone()).await;
    let client = AlertmanagerClient::new(&format!("http://{addr}")).unwrap();

    assert!(client.list_silences("instance=node1").await.unwrap().is_empty());

    let id = client.create_silence(&silence("node1")).await.unwrap();
    assert_eq!(id, "silence-1");

    let found = client.list_silences("instance=node1").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "silence-1");
    assert_eq!(found[0].matchers, vec![Matcher::equal("instance", "node1")]);
    assert_eq!(found[0].created_by, "kured-alert-silencer");

    assert!(client.list_silences("instance=node2").await.unwrap().is_empty());
    assert_eq!(
        *mock.filters.lock(),
        vec!["instance=node1", "instance=node1", "instance=node2"]
    );
}

#[tokio::test]
async fn posted_body_uses_alertmanager_fields() {
    let mock = MockAlertmanager::default();
    let addr = start(mock.clone()).await;
    let client = AlertmanagerClient::new(&format!("http://{addr}/")).unwrap();

    client.create_silence(&silence("node1")).await.unwrap();

    let stored = mock.silences.lock()[0].clone();
    assert_eq!(stored["createdBy"], "kured-alert-silencer");
    assert_eq!(stored["comment"], "Silencing during node reboot: node1");
    assert_eq!(stored["matchers"][0]["isRegex"], false);
    assert!(stored["startsAt"].is_string());
    assert!(stored["endsAt"].is_string());
}

#[tokio::test]
async fn server_errors_surface_as_store_errors() {
    let mock = MockAlertmanager::default();
    mock.failing.store(true, Ordering::SeqCst);
    let addr = start(mock.clone()).await;
    let client = AlertmanagerClient::new(&format!("http://{addr}")).unwrap();

    match client.list_silences("instance=node1").await {
        Err(SilencerError::StoreQuery { filter, reason }) => {
            assert_eq!(filter, "instance=node1");
            assert!(reason.contains("500"));
            assert!(reason.contains("store unavailable"));
        }
        other => panic!("expected query error, got {other:?}"),
    }

    assert!(matches!(
        client.create_silence(&silence("node1")).await,
        Err(SilencerError::StoreCreate { .. })
    ));
}

#[tokio::test]
async fn unreachable_alertmanager_is_a_query_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AlertmanagerClient::new(&format!("http://{addr}")).unwrap();
    let err = client.list_silences("instance=node1").await.unwrap_err();
    assert!(err.is_store_error());
}

#[tokio::test]
async fn reconciling_twice_over_http_creates_one_silence() {
    let mock = MockAlertmanager::default();
    let addr = start(mock.clone()).await;
    let client = AlertmanagerClient::new(&format!("http://{addr}")).unwrap();

    let now = Utc.with_ymd_and_hms(2024, 5, 31, 6, 33, 0).unwrap();
    let reconciler = SilenceReconciler::new(
        client,
        MatcherTemplate::parse(
            r#"[{"name": "instance", "value": "{{NodeName}}", "isRegex": false}, {"name": "alertname", "value": "node_reboot", "isRegex": false}]"#,
        )
        .unwrap(),
        Arc::new(FixedClock::new(now)),
    );
    let end = now + TimeDelta::hours(1) + TimeDelta::nanoseconds(735_905_893);

    let first = reconciler.reconcile("node1", end).await.unwrap();
    let second = reconciler.reconcile("node1", end).await.unwrap();

    assert_eq!(first.created.len(), 2);
    assert!(second.created.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(mock.silences.lock().len(), 2);
}
