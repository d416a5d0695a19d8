use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Routing-key suffix the provider uses for group conversations.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Conversation kind derived from the routing key.
///
/// ```
/// use bridge_core::ChatKind;
///
/// assert_eq!(ChatKind::from_jid("120363@g.us"), ChatKind::Group);
/// assert_eq!(ChatKind::from_jid("4915100000000@s.whatsapp.net"), ChatKind::Direct);
/// assert_eq!(ChatKind::Direct.as_str(), "dm");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChatKind {
    #[serde(rename = "dm")]
    Direct,
    #[serde(rename = "group")]
    Group,
}

impl ChatKind {
    pub fn from_jid(jid: &str) -> Self {
        if jid.ends_with(GROUP_JID_SUFFIX) {
            ChatKind::Group
        } else {
            ChatKind::Direct
        }
    }

    /// Returns the identifier used on the wire and in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Direct => "dm",
            ChatKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRef {
    pub jid: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub jid: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    pub id: String,
    /// Epoch milliseconds.
    pub ts: i64,
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    pub has_media: bool,
    pub reply_to: Option<String>,
    /// Reserved; always empty today.
    #[serde(default)]
    pub links: Vec<String>,
}

/// Transport-agnostic representation of one conversational message.
///
/// Only `message` events exist today; the `type` tag is kept so the ingest
/// side can branch on it once edits or deletions are forwarded.
///
/// ```
/// use bridge_core::{CanonicalEvent, ChatKind, ChatRef, MessageBody, Sender};
///
/// let event = CanonicalEvent::Message {
///     chat: ChatRef { jid: "1@s.whatsapp.net".into(), title: String::new(), kind: ChatKind::Direct },
///     msg: MessageBody {
///         id: "ABC".into(),
///         ts: 1_700_000_000_000,
///         sender: Sender { jid: "1@s.whatsapp.net".into(), name: String::new() },
///         text: "hi".into(),
///         has_media: false,
///         reply_to: None,
///         links: Vec::new(),
///     },
/// };
/// let json = serde_json::to_value(&event).unwrap();
/// assert_eq!(json["type"], "message");
/// assert_eq!(json["chat"]["type"], "dm");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    Message { chat: ChatRef, msg: MessageBody },
}

impl CanonicalEvent {
    pub fn chat(&self) -> &ChatRef {
        match self {
            CanonicalEvent::Message { chat, .. } => chat,
        }
    }

    pub fn msg_id(&self) -> &str {
        match self {
            CanonicalEvent::Message { msg, .. } => &msg.id,
        }
    }
}

/// The unit handed to the sink in one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchEnvelope {
    pub bridge_id: String,
    /// Send time in epoch milliseconds, stamped once per batch.
    pub ts: i64,
    pub events: Vec<CanonicalEvent>,
}

impl BatchEnvelope {
    pub fn new(bridge_id: impl Into<String>, events: Vec<CanonicalEvent>) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            ts: now_millis(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
