use std::collections::BTreeSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use security::{BRIDGE_SUBJECT, INGEST_AUDIENCE, JwtSigner};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::SinkConfig;
use crate::error::IngestError;
use crate::store::EventStore;

const DEFAULT_TAIL: usize = 10;

#[derive(Clone)]
pub struct SinkState {
    pub verifier: JwtSigner,
    pub store: Arc<EventStore>,
    pub max_batch: usize,
    pub allowlist: Arc<BTreeSet<String>>,
}

impl SinkState {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            verifier: JwtSigner::hs256(config.jwt_secret.as_bytes()),
            store: Arc::new(EventStore::new(config.events_path.clone())),
            max_batch: config.max_batch,
            allowlist: Arc::new(config.allowlist.clone()),
        }
    }
}

pub fn build_router(state: SinkState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ingest/wa", post(ingest))
        .route("/ingest/_stats", get(stats))
        .route("/ingest/_tail", get(tail))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn ingest(
    State(state): State<SinkState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, IngestError> {
    match accept_batch(&state, &headers, &body).await {
        Ok((bridge_id, stored)) => {
            counter!("sink_events_stored_total").increment(stored as u64);
            info!(stored, bridge_id = %bridge_id, "stored events");
            Ok(Json(json!({"ok": true, "stored": stored})))
        }
        Err(err) => {
            counter!("sink_batches_rejected_total", "reason" => err.reason()).increment(1);
            warn!(status = err.status().as_u16(), error = %err, "rejected batch");
            Err(err)
        }
    }
}

async fn accept_batch(
    state: &SinkState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(String, usize), IngestError> {
    let token = bearer_token(headers).ok_or(IngestError::MissingBearer)?;
    state
        .verifier
        .verify(token, INGEST_AUDIENCE, BRIDGE_SUBJECT)
        .map_err(|err| IngestError::InvalidToken(err.to_string()))?;

    let batch: Value = serde_json::from_slice(body)
        .map_err(|_| IngestError::BadRequest("body must be a JSON object"))?;
    let bridge_id = batch
        .get("bridge_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if !state.allowlist.is_empty() && !state.allowlist.contains(&bridge_id) {
        return Err(IngestError::BridgeNotAllowed(bridge_id));
    }

    let events = match batch.get("events") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(events)) => events.as_slice(),
        Some(_) => return Err(IngestError::BadRequest("events must be a list")),
    };
    if events.len() > state.max_batch {
        return Err(IngestError::TooLarge {
            size: events.len(),
            limit: state.max_batch,
        });
    }

    let ts_server = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let records = events
        .iter()
        .map(|event| stamp(event, ts_server))
        .collect::<Option<Vec<_>>>()
        .ok_or(IngestError::BadRequest("events must be objects"))?;
    let stored = state
        .store
        .append(&records)
        .await
        .map_err(IngestError::Storage)?;
    Ok((bridge_id, stored))
}

/// `ts_server` first, then the event's own fields, which win on conflict.
fn stamp(event: &Value, ts_server: i64) -> Option<Value> {
    let fields = event.as_object()?;
    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert("ts_server".into(), ts_server.into());
    record.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    Some(Value::Object(record))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|token| !token.is_empty())
}

async fn stats(State(state): State<SinkState>) -> Result<Json<Value>, IngestError> {
    let total = state.store.count().await.map_err(IngestError::Storage)?;
    Ok(Json(json!({
        "events_total": total,
        "file": state.store.path().display().to_string(),
    })))
}

#[derive(Deserialize)]
struct TailQuery {
    n: Option<usize>,
}

async fn tail(
    State(state): State<SinkState>,
    Query(query): Query<TailQuery>,
) -> Result<Json<Value>, IngestError> {
    let last = state
        .store
        .tail(query.n.unwrap_or(DEFAULT_TAIL))
        .await
        .map_err(IngestError::Storage)?;
    Ok(Json(json!({"last": last})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn event_fields_override_server_stamp() {
        let record = stamp(&json!({"type": "message", "ts_server": 1}), 99).unwrap();
        assert_eq!(record["ts_server"], 1);
        assert_eq!(record["type"], "message");
        assert!(stamp(&json!("not an object"), 99).is_none());
    }
}
