use serde::{Deserialize, Serialize};

pub const ZAP_REQUEST_KIND: u64 = 9734;
pub const ZAP_RECEIPT_KIND: u64 = 9735;

/// A Nostr tag, kept verbatim as an array of strings.
///
/// The first element names the tag (`p`, `e`, `a`, `amount`, `relays`, ...),
/// the rest are its values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<N, I, V>(name: N, values: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut tag = vec![name.into()];
        tag.extend(values.into_iter().map(Into::into));
        Self(tag)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn first_value(&self) -> Option<&str> {
        self.values().first().map(String::as_str)
    }
}

/// A signed Nostr event as it travels on the wire.
///
/// Zap requests arrive from clients without any guarantee about
/// `created_at`/`content`, so both default when absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    #[serde(default)]
    pub created_at: u64,
    pub kind: u64,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    pub sig: String,
}

impl Event {
    pub fn count_tags(&self, name: &str) -> usize {
        self.tags.iter().filter(|tag| tag.name() == Some(name)).count()
    }

    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.name() == Some(name))
    }
}

/// Event fields that make up the NIP-01 id, before signing.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Canonical serialization hashed into the event id.
    pub fn canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]))
    }

    pub fn into_event(self, id: String, sig: String) -> Event {
        Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}
