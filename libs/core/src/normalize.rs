//! Maps raw provider messages onto [`CanonicalEvent`]s.
//!
//! Raw messages are kept as loosely-typed JSON. Every field is probed through
//! `Option` chains so malformed or partial input degrades to defaults instead
//! of failing the whole notification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::directory::DirectoryCache;
use crate::types::{CanonicalEvent, ChatKind, ChatRef, MessageBody, Sender};

/// Caption-bearing media, in text fallback order.
const CAPTION_FIELDS: [&str; 3] = ["imageMessage", "videoMessage", "documentMessage"];
/// Content fields that count as media regardless of caption.
const MEDIA_FIELDS: [&str; 5] = [
    "imageMessage",
    "videoMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
];
/// Wrappers whose `message` field carries the real content.
const WRAPPER_FIELDS: [&str; 4] = [
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "documentWithCaptionMessage",
];
const MAX_WRAPPER_DEPTH: usize = 4;

/// One raw message as emitted by the transport session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMessage(pub Value);

impl From<Value> for RawMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl RawMessage {
    fn key_str(&self, field: &str) -> Option<&str> {
        self.0.get("key")?.get(field)?.as_str()
    }

    pub fn remote_jid(&self) -> &str {
        self.key_str("remoteJid").unwrap_or("")
    }

    pub fn participant(&self) -> Option<&str> {
        self.key_str("participant").filter(|p| !p.is_empty())
    }

    pub fn id(&self) -> &str {
        self.key_str("id").unwrap_or("")
    }

    /// Provider timestamp in seconds; 0 when absent or unreadable.
    pub fn timestamp_secs(&self) -> i64 {
        self.0
            .get("messageTimestamp")
            .and_then(parse_timestamp)
            .unwrap_or(0)
    }

    /// The content object with ephemeral/view-once wrappers peeled off.
    pub fn content(&self) -> Option<&Value> {
        let mut content = self.0.get("message").filter(|v| v.is_object())?;
        for _ in 0..MAX_WRAPPER_DEPTH {
            let inner = WRAPPER_FIELDS
                .iter()
                .find_map(|field| content.get(*field)?.get("message"))
                .filter(|v| v.is_object());
            match inner {
                Some(inner) => content = inner,
                None => break,
            }
        }
        Some(content)
    }
}

fn present<'a>(content: &'a Value, field: &str) -> Option<&'a Value> {
    content.get(field).filter(|v| !v.is_null())
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value?.as_str().filter(|s| !s.is_empty())
}

/// Accepts integers, numeric strings, and the `{low, high}` long encoding.
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(map) => {
            let low = map.get("low")?.as_i64()?;
            let high = map.get("high").and_then(Value::as_i64).unwrap_or(0);
            Some((high << 32) | (low & 0xffff_ffff))
        }
        _ => None,
    }
}

/// Plain body, then extended text, then media captions; first non-empty wins.
pub fn extract_text(content: &Value) -> &str {
    non_empty_str(content.get("conversation"))
        .or_else(|| non_empty_str(content.get("extendedTextMessage")?.get("text")))
        .or_else(|| {
            CAPTION_FIELDS
                .iter()
                .find_map(|field| non_empty_str(content.get(*field)?.get("caption")))
        })
        .unwrap_or("")
}

pub fn has_media(content: &Value) -> bool {
    MEDIA_FIELDS
        .iter()
        .any(|field| present(content, field).is_some())
}

/// Quoted message id from the first `contextInfo.stanzaId` found.
pub fn reply_target(content: &Value) -> Option<String> {
    std::iter::once("extendedTextMessage")
        .chain(MEDIA_FIELDS)
        .find_map(|field| {
            non_empty_str(
                content
                    .get(field)?
                    .get("contextInfo")?
                    .get("stanzaId"),
            )
        })
        .map(str::to_string)
}

/// Produces at most one canonical event for `raw`.
///
/// Messages without text and without media are dropped.
///
/// ```
/// use bridge_core::{DirectoryCache, RawMessage, normalize_message};
/// use serde_json::json;
///
/// let raw = RawMessage(json!({
///     "key": {"remoteJid": "4915100000000@s.whatsapp.net", "id": "ABC"},
///     "messageTimestamp": 1700000000,
///     "message": {"conversation": "hello"}
/// }));
/// let event = normalize_message(&raw, &DirectoryCache::new()).unwrap();
/// let json = serde_json::to_value(&event).unwrap();
/// assert_eq!(json["msg"]["ts"], 1700000000000i64);
/// assert_eq!(json["msg"]["sender"]["name"], "");
/// ```
pub fn normalize_message(raw: &RawMessage, directory: &DirectoryCache) -> Option<CanonicalEvent> {
    let jid = raw.remote_jid();
    let kind = ChatKind::from_jid(jid);
    let title = directory.lookup_chat_title(jid);

    let content = raw.content();
    let text = content.map(extract_text).unwrap_or("");
    let media = content.is_some_and(has_media);
    if text.is_empty() && !media {
        return None;
    }

    let sender_jid = raw.participant().unwrap_or(jid);
    let sender_name = directory.lookup_contact_name(sender_jid);

    Some(CanonicalEvent::Message {
        chat: ChatRef {
            jid: jid.to_string(),
            title: title.to_string(),
            kind,
        },
        msg: MessageBody {
            id: raw.id().to_string(),
            ts: raw.timestamp_secs().saturating_mul(1000),
            sender: Sender {
                jid: sender_jid.to_string(),
                name: sender_name.to_string(),
            },
            text: text.to_string(),
            has_media: media,
            reply_to: content.and_then(reply_target),
            links: Vec::new(),
        },
    })
}

/// Normalizes a whole `messages.upsert` notification, keeping input order.
pub fn normalize_batch<'a, I>(messages: I, directory: &DirectoryCache) -> Vec<CanonicalEvent>
where
    I: IntoIterator<Item = &'a RawMessage>,
{
    messages
        .into_iter()
        .filter_map(|raw| normalize_message(raw, directory))
        .collect()
}
