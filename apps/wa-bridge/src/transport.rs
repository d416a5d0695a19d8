//! Decoding of transport notifications.
//!
//! The provider session runs in a sidecar that writes one JSON object per
//! line: `{"event": "messages.upsert", "data": {...}}`. Lines are decoded on a
//! dedicated reader thread and handed to the pipeline over a bounded channel.

use std::io::BufRead;
use std::thread;

use bridge_core::{ChatMeta, ContactMeta, RawMessage};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterKind {
    Upsert,
    Update,
}

/// Connection lifecycle report; informational only.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default, rename = "qr")]
    pub pairing_code: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Messages(Vec<RawMessage>),
    /// Edits and deletions; carried so they can be counted, never forwarded.
    MessageUpdates(usize),
    Chats {
        kind: RosterKind,
        chats: Vec<ChatMeta>,
    },
    Contacts {
        kind: RosterKind,
        contacts: Vec<ContactMeta>,
    },
    Connection(ConnectionUpdate),
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Messages(_) => "messages.upsert",
            TransportEvent::MessageUpdates(_) => "messages.update",
            TransportEvent::Chats {
                kind: RosterKind::Upsert,
                ..
            } => "chats.upsert",
            TransportEvent::Chats {
                kind: RosterKind::Update,
                ..
            } => "chats.update",
            TransportEvent::Contacts {
                kind: RosterKind::Upsert,
                ..
            } => "contacts.upsert",
            TransportEvent::Contacts {
                kind: RosterKind::Update,
                ..
            } => "contacts.update",
            TransportEvent::Connection(_) => "connection.update",
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line is not a transport notification")]
    Malformed(#[from] serde_json::Error),
    #[error("{event} payload has an unexpected shape")]
    UnexpectedPayload { event: String },
}

#[derive(Deserialize)]
struct Notification {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UpsertPayload {
    Wrapped { messages: Vec<RawMessage> },
    Bare(Vec<RawMessage>),
}

/// Decodes one line. `Ok(None)` means the event is not one the bridge
/// consumes.
pub fn decode_line(line: &str) -> Result<Option<TransportEvent>, DecodeError> {
    let Notification { event, data } = serde_json::from_str(line)?;
    let decoded = match event.as_str() {
        "messages.upsert" => match serde_json::from_value::<UpsertPayload>(data) {
            Ok(UpsertPayload::Wrapped { messages }) | Ok(UpsertPayload::Bare(messages)) => {
                TransportEvent::Messages(messages)
            }
            Err(_) => return Err(DecodeError::UnexpectedPayload { event }),
        },
        "messages.update" => {
            TransportEvent::MessageUpdates(data.as_array().map(Vec::len).unwrap_or(1))
        }
        "chats.upsert" => TransportEvent::Chats {
            kind: RosterKind::Upsert,
            chats: lenient_list(data),
        },
        "chats.update" => TransportEvent::Chats {
            kind: RosterKind::Update,
            chats: lenient_list(data),
        },
        "contacts.upsert" => TransportEvent::Contacts {
            kind: RosterKind::Upsert,
            contacts: lenient_list(data),
        },
        "contacts.update" => TransportEvent::Contacts {
            kind: RosterKind::Update,
            contacts: lenient_list(data),
        },
        "connection.update" => {
            TransportEvent::Connection(serde_json::from_value(data).unwrap_or_default())
        }
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Roster payloads keep every record that decodes and skip the rest.
fn lenient_list<T: DeserializeOwned>(data: Value) -> Vec<T> {
    let items = match data {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Reads notifications until end of input or until the pipeline hangs up.
/// Returns how many notifications were forwarded.
///
/// Blocks the calling thread; run it via [`spawn_reader`] or `spawn_blocking`.
pub fn pump_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<TransportEvent>) -> usize {
    let mut forwarded = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "transport input failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode_line(line) {
            Ok(Some(event)) => {
                if tx.blocking_send(event).is_err() {
                    debug!("pipeline closed, stop reading transport input");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => debug!(line = index + 1, "ignoring unsupported transport event"),
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping undecodable transport line")
            }
        }
    }
    info!(forwarded, "transport input ended");
    forwarded
}

/// Starts a detached reader thread over `reader`. Dropping the returned
/// handle does not stop the thread; it ends with its input or the channel.
pub fn spawn_reader<R>(
    reader: R,
    tx: mpsc::Sender<TransportEvent>,
) -> std::io::Result<thread::JoinHandle<usize>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("transport-reader".into())
        .spawn(move || pump_lines(reader, &tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn wrapped_and_bare_upserts_decode() {
        let wrapped = r#"{"event":"messages.upsert","data":{"type":"notify","messages":[{"key":{"id":"A"}}]}}"#;
        let Some(TransportEvent::Messages(messages)) = decode_line(wrapped).unwrap() else {
            panic!("expected messages");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), "A");

        let bare = r#"{"event":"messages.upsert","data":[{"key":{"id":"B"}},{"key":{"id":"C"}}]}"#;
        let Some(TransportEvent::Messages(messages)) = decode_line(bare).unwrap() else {
            panic!("expected messages");
        };
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn roster_records_that_do_not_decode_are_skipped() {
        let line = r#"{"event":"contacts.update","data":[{"id":"1@s.whatsapp.net","notify":"Sam"},{"id":42},"junk"]}"#;
        let Some(TransportEvent::Contacts { kind, contacts }) = decode_line(line).unwrap() else {
            panic!("expected contacts");
        };
        assert_eq!(kind, RosterKind::Update);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].display_name(), Some("Sam"));
    }

    #[test]
    fn unsupported_and_malformed_lines() {
        assert!(decode_line(r#"{"event":"creds.update","data":{}}"#).unwrap().is_none());
        assert!(matches!(decode_line("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode_line(r#"{"event":"messages.upsert","data":{"messages":7}}"#),
            Err(DecodeError::UnexpectedPayload { .. })
        ));
    }

    #[test]
    fn edits_and_connection_updates_are_recognised() {
        let update = decode_line(r#"{"event":"messages.update","data":[{},{}]}"#).unwrap();
        assert!(matches!(update, Some(TransportEvent::MessageUpdates(2))));

        let conn = decode_line(r#"{"event":"connection.update","data":{"connection":"open"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(conn.name(), "connection.update");
        let TransportEvent::Connection(conn) = conn else {
            panic!("expected connection update");
        };
        assert_eq!(conn.connection.as_deref(), Some("open"));
    }

    #[tokio::test]
    async fn pump_forwards_decodable_lines_in_order() {
        let input = concat!(
            r#"{"event":"chats.upsert","data":[{"id":"g@g.us","subject":"Family"}]}"#,
            "\n\n",
            "garbage\n",
            r#"{"event":"messages.upsert","data":[{"key":{"id":"X"}}]}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        let forwarded = tokio::task::spawn_blocking(move || pump_lines(Cursor::new(input), &tx))
            .await
            .unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await.unwrap().name(), "chats.upsert");
        assert_eq!(rx.recv().await.unwrap().name(), "messages.upsert");
        assert!(rx.recv().await.is_none());
    }
}
