//! Best-effort display-name directory fed by roster notifications.
//!
//! The cache is owned by the pipeline and lent to the normalizer; it is never
//! shared across threads, so it carries no locking of its own.

use std::collections::HashMap;

use serde::Deserialize;

/// Chat metadata as delivered by `chats.upsert` / `chats.update`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ChatMeta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl ChatMeta {
    pub fn title(&self) -> Option<&str> {
        first_non_empty([self.name.as_deref(), self.subject.as_deref()])
    }
}

/// Contact metadata as delivered by `contacts.upsert` / `contacts.update`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactMeta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notify: Option<String>,
    #[serde(default)]
    pub verified_name: Option<String>,
}

impl ContactMeta {
    pub fn display_name(&self) -> Option<&str> {
        first_non_empty([
            self.name.as_deref(),
            self.notify.as_deref(),
            self.verified_name.as_deref(),
        ])
    }
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

/// Chat-title and contact-name lookup tables.
///
/// ```
/// use bridge_core::DirectoryCache;
///
/// let mut dir = DirectoryCache::new();
/// dir.record_contact_name("1@s.whatsapp.net", "Dana");
/// dir.record_contact_name("1@s.whatsapp.net", "");
/// assert_eq!(dir.lookup_contact_name("1@s.whatsapp.net"), "Dana");
/// assert_eq!(dir.lookup_chat_title("unknown@g.us"), "");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectoryCache {
    chat_titles: HashMap<String, String>,
    contact_names: HashMap<String, String>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `title` for `chat_id`. Empty titles never replace a known one.
    pub fn record_chat_title(&mut self, chat_id: &str, title: &str) {
        record(&mut self.chat_titles, chat_id, title);
    }

    /// Stores `name` for `contact_id`. Empty names never replace a known one.
    pub fn record_contact_name(&mut self, contact_id: &str, name: &str) {
        record(&mut self.contact_names, contact_id, name);
    }

    pub fn lookup_chat_title(&self, chat_id: &str) -> &str {
        self.chat_titles.get(chat_id).map(String::as_str).unwrap_or("")
    }

    pub fn lookup_contact_name(&self, contact_id: &str) -> &str {
        self.contact_names
            .get(contact_id)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Applies a chat roster notification. Returns how many titles were recorded.
    pub fn absorb_chats(&mut self, chats: &[ChatMeta]) -> usize {
        let mut recorded = 0;
        for chat in chats {
            let (Some(id), Some(title)) = (chat.id.as_deref(), chat.title()) else {
                continue;
            };
            if id.is_empty() {
                continue;
            }
            self.record_chat_title(id, title);
            recorded += 1;
        }
        recorded
    }

    /// Applies a contact roster notification. Returns how many names were recorded.
    pub fn absorb_contacts(&mut self, contacts: &[ContactMeta]) -> usize {
        let mut recorded = 0;
        for contact in contacts {
            let (Some(id), Some(name)) = (contact.id.as_deref(), contact.display_name()) else {
                continue;
            };
            if id.is_empty() {
                continue;
            }
            self.record_contact_name(id, name);
            recorded += 1;
        }
        recorded
    }

    pub fn len_chats(&self) -> usize {
        self.chat_titles.len()
    }

    pub fn len_contacts(&self) -> usize {
        self.contact_names.len()
    }
}

fn record(map: &mut HashMap<String, String>, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    match map.get_mut(key) {
        Some(existing) if existing == value => {}
        Some(existing) => *existing = value.to_string(),
        None => {
            map.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_default_to_empty() {
        let dir = DirectoryCache::new();
        assert_eq!(dir.lookup_chat_title("120363@g.us"), "");
        assert_eq!(dir.lookup_contact_name("1@s.whatsapp.net"), "");
    }

    #[test]
    fn newer_names_overwrite_older_ones() {
        let mut dir = DirectoryCache::new();
        dir.record_chat_title("120363@g.us", "Family");
        dir.record_chat_title("120363@g.us", "Family 2024");
        assert_eq!(dir.lookup_chat_title("120363@g.us"), "Family 2024");
    }

    #[test]
    fn empty_values_never_downgrade() {
        let mut dir = DirectoryCache::new();
        dir.record_chat_title("120363@g.us", "Family");
        dir.record_chat_title("120363@g.us", "");
        assert_eq!(dir.lookup_chat_title("120363@g.us"), "Family");

        dir.record_contact_name("2@s.whatsapp.net", "");
        assert_eq!(dir.len_contacts(), 0);
    }

    #[test]
    fn absorb_chats_prefers_name_over_subject() {
        let mut dir = DirectoryCache::new();
        let recorded = dir.absorb_chats(&[
            ChatMeta {
                id: Some("a@g.us".into()),
                name: Some("Named".into()),
                subject: Some("Subject".into()),
            },
            ChatMeta {
                id: Some("b@g.us".into()),
                name: Some(String::new()),
                subject: Some("Only subject".into()),
            },
            ChatMeta {
                id: Some("c@g.us".into()),
                name: None,
                subject: None,
            },
            ChatMeta {
                id: None,
                name: Some("orphan".into()),
                subject: None,
            },
        ]);
        assert_eq!(recorded, 2);
        assert_eq!(dir.lookup_chat_title("a@g.us"), "Named");
        assert_eq!(dir.lookup_chat_title("b@g.us"), "Only subject");
        assert_eq!(dir.lookup_chat_title("c@g.us"), "");
        assert_eq!(dir.len_chats(), 2);
    }

    #[test]
    fn absorb_contacts_falls_back_through_notify_and_verified_name() {
        let mut dir = DirectoryCache::new();
        let contacts: Vec<ContactMeta> = serde_json::from_value(serde_json::json!([
            {"id": "1@s.whatsapp.net", "name": "Dana", "notify": "D"},
            {"id": "2@s.whatsapp.net", "notify": "Sam"},
            {"id": "3@s.whatsapp.net", "verifiedName": "Bakery Ltd"},
            {"id": "4@s.whatsapp.net"}
        ]))
        .unwrap();
        assert_eq!(dir.absorb_contacts(&contacts), 3);
        assert_eq!(dir.lookup_contact_name("1@s.whatsapp.net"), "Dana");
        assert_eq!(dir.lookup_contact_name("2@s.whatsapp.net"), "Sam");
        assert_eq!(dir.lookup_contact_name("3@s.whatsapp.net"), "Bakery Ltd");
        assert_eq!(dir.lookup_contact_name("4@s.whatsapp.net"), "");
    }
}
