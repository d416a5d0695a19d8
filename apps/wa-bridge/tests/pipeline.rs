use std::sync::Arc;
use std::time::Duration;

use bridge_dispatch::testkit::{Outcome, ScriptedDelivery};
use bridge_dispatch::{DispatchSettings, FlushReport};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing_test::traced_test;
use wa_bridge::{Pipeline, StopReason, TransportEvent, decode_line};

const GROUP: &str = "120363041234@g.us";
const DANA: &str = "4915100000001@s.whatsapp.net";

fn line(value: Value) -> TransportEvent {
    decode_line(&value.to_string())
        .expect("decodes")
        .expect("supported event")
}

fn upsert(ids: &[&str]) -> TransportEvent {
    let messages: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "key": {"remoteJid": GROUP, "id": id, "participant": DANA},
                "messageTimestamp": 1_700_000_000,
                "message": {"conversation": format!("hello {id}")}
            })
        })
        .collect();
    line(json!({"event": "messages.upsert", "data": {"type": "notify", "messages": messages}}))
}

fn settings(batch_size: usize) -> DispatchSettings {
    DispatchSettings {
        bridge_id: "pipeline-test".into(),
        batch_size,
        flush_interval: Duration::from_millis(1500),
        ..Default::default()
    }
}

fn pipeline(batch_size: usize, delivery: &ScriptedDelivery) -> Pipeline {
    Pipeline::new(settings(batch_size), Arc::new(delivery.clone()))
}

#[tokio::test(start_paused = true)]
async fn roster_names_reach_the_sink() {
    let delivery = ScriptedDelivery::new();
    let mut pipeline = pipeline(200, &delivery);
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(line(json!({
        "event": "chats.upsert",
        "data": [{"id": GROUP, "subject": "Family"}]
    })))
    .await
    .unwrap();
    tx.send(line(json!({
        "event": "contacts.upsert",
        "data": [{"id": DANA, "notify": "Dana"}]
    })))
    .await
    .unwrap();
    tx.send(upsert(&["M1"])).await.unwrap();
    drop(tx);

    let (reason, report) = pipeline.run(&mut rx, std::future::pending()).await;
    assert_eq!(reason, StopReason::EndOfInput);
    assert_eq!(report, Some(FlushReport::Delivered { events: 1 }));

    let sent = delivery.sent();
    assert_eq!(sent.len(), 1);
    let body = serde_json::to_value(&sent[0]).unwrap();
    assert_eq!(body["bridge_id"], "pipeline-test");
    let event = &body["events"][0];
    assert_eq!(event["chat"]["title"], "Family");
    assert_eq!(event["chat"]["type"], "group");
    assert_eq!(event["msg"]["sender"]["name"], "Dana");
    assert_eq!(event["msg"]["ts"], 1_700_000_000_000i64);
    assert_eq!(pipeline.directory().len_contacts(), 1);
}

#[tokio::test(start_paused = true)]
async fn size_trigger_sends_the_whole_snapshot() {
    let delivery = ScriptedDelivery::new();
    let mut pipeline = pipeline(2, &delivery);
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let producer = async move {
        tx.send(upsert(&["M1", "M2", "M3"])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop_tx.send(()).unwrap();
        tx
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    let (_tx, (reason, report)) = tokio::join!(producer, pipeline.run(&mut rx, shutdown));

    assert_eq!(reason, StopReason::Signal);
    assert_eq!(report, None, "nothing left to drain");
    assert_eq!(
        delivery.sent_ids(),
        vec![
            vec!["M1".to_string(), "M2".to_string(), "M3".to_string()],
        ],
        "one upsert lands before the loop polls, so all three go together"
    );
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn failed_batch_is_retried_after_one_interval() {
    let delivery = ScriptedDelivery::with_script([Outcome::Reject(502)]);
    let mut pipeline = pipeline(200, &delivery);
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let producer = async move {
        tx.send(upsert(&["M1"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        tx.send(upsert(&["M2"])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop_tx.send(()).unwrap();
        tx
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    let (_tx, _) = tokio::join!(producer, pipeline.run(&mut rx, shutdown));

    assert_eq!(
        delivery.sent_ids(),
        vec![
            vec!["M1".to_string()],
            vec!["M1".to_string(), "M2".to_string()],
        ]
    );
    assert!(logs_contain("batch delivery failed"));
    assert!(logs_contain("posted batch"));
}

#[tokio::test(start_paused = true)]
async fn empty_messages_and_edits_are_not_forwarded() {
    let delivery = ScriptedDelivery::new();
    let mut pipeline = pipeline(200, &delivery);
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(line(json!({
        "event": "messages.upsert",
        "data": [
            {"key": {"remoteJid": DANA, "id": "P1"}, "message": {"protocolMessage": {"type": 0}}},
            {"key": {"remoteJid": DANA, "id": "P2"}, "message": null}
        ]
    })))
    .await
    .unwrap();
    tx.send(line(json!({"event": "messages.update", "data": [{"key": {"id": "P1"}}]})))
        .await
        .unwrap();
    drop(tx);

    let (_, report) = pipeline.run(&mut rx, std::future::pending()).await;
    assert_eq!(report, None);
    assert_eq!(delivery.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_events_once() {
    let delivery = ScriptedDelivery::with_script([Outcome::Timeout]);
    let mut pipeline = pipeline(200, &delivery);
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let producer = async move {
        tx.send(upsert(&["M1", "M2"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();
        tx
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    let (_tx, (reason, report)) = tokio::join!(producer, pipeline.run(&mut rx, shutdown));

    assert_eq!(reason, StopReason::Signal);
    assert!(matches!(report, Some(FlushReport::Failed { requeued: 2, .. })));
    assert_eq!(delivery.attempts(), 1);
}
