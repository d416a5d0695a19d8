use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ingest_sink::{EventStore, SinkState, build_router};
use security::{IngestClaims, JwtSigner};
use serde_json::{Value, json};
use time::Duration;
use tower::ServiceExt;

const SECRET: &str = "ingest-secret";

fn app(dir: &Path, allow: &[&str], max_batch: usize) -> Router {
    build_router(SinkState {
        verifier: JwtSigner::hs256(SECRET),
        store: Arc::new(EventStore::new(dir.join("events.jsonl"))),
        max_batch,
        allowlist: Arc::new(allow.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()),
    })
}

fn token() -> String {
    JwtSigner::hs256(SECRET)
        .sign(&IngestClaims::bridge(Duration::seconds(120)))
        .unwrap()
}

fn post(body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ingest/wa")
        .header("content-type", "application/json");
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {bearer}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn batch(bridge_id: &str, ids: &[&str]) -> Value {
    let events: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "type": "message",
                "chat": {"jid": "1@s.whatsapp.net", "title": "", "type": "dm"},
                "msg": {"id": id, "ts": 1_700_000_000_000i64, "text": "hi", "has_media": false}
            })
        })
        .collect();
    json!({"bridge_id": bridge_id, "ts": 1_700_000_000_500i64, "events": events})
}

#[tokio::test]
async fn stores_events_and_exposes_stats_and_tail() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), &[], 1000);
    let token = token();

    let (status, body) = call(&app, post(batch("wa-bridge", &["A", "B", "C"]), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "stored": 3}));

    let (status, body) = call(&app, get("/ingest/_stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events_total"], 3);
    assert!(body["file"].as_str().unwrap().ends_with("events.jsonl"));

    let (_, body) = call(&app, get("/ingest/_tail?n=2")).await;
    let last = body["last"].as_array().unwrap();
    assert_eq!(last.len(), 2);
    assert_eq!(last[0]["msg"]["id"], "B");
    assert_eq!(last[1]["msg"]["id"], "C");
    assert!(last[1]["ts_server"].as_i64().unwrap() > 0);

    let (_, body) = call(&app, get("/ingest/_tail")).await;
    assert_eq!(body["last"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = call(&app(dir.path(), &[], 10), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn missing_or_bad_credentials_are_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), &[], 10);

    let (status, body) = call(&app, post(batch("wa-bridge", &["A"]), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "missing bearer");

    let forged = JwtSigner::hs256("other")
        .sign(&IngestClaims::bridge(Duration::seconds(120)))
        .unwrap();
    let (status, _) = call(&app, post(batch("wa-bridge", &["A"]), Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong_subject = JwtSigner::hs256(SECRET)
        .sign(&IngestClaims::new("someone", "ingest", Duration::seconds(120)))
        .unwrap();
    let (status, _) = call(&app, post(batch("wa-bridge", &["A"]), Some(&wrong_subject))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, stats) = call(&app, get("/ingest/_stats")).await;
    assert_eq!(stats["events_total"], 0);
}

#[tokio::test]
async fn allowlist_rejects_unknown_bridges() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), &["laptop"], 10);
    let token = token();

    let (status, body) = call(&app, post(batch("wa-bridge", &["A"]), Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "bridge \"wa-bridge\" not allowed");

    let (status, _) = call(&app, post(batch("laptop", &["A"]), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_and_oversized_batches_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), &[], 2);
    let token = token();

    let (status, body) = call(
        &app,
        post(json!({"bridge_id": "wa-bridge", "events": {"not": "a list"}}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "events must be a list");

    let (status, _) = call(&app, post(batch("wa-bridge", &["A", "B", "C"]), Some(&token))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, body) = call(&app, post(json!({"bridge_id": "wa-bridge"}), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], 0);
}
