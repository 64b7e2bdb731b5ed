mod nostr_engine;

pub use crate::nostr_engine::{send_to_relay, NostrEngine, RelayOutcome};

use core_types::nostr::Event;
use core_types::ZapNote;
use serde::{Deserialize, Serialize};
use slog as log;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NostrEngineSettings {
    #[serde(default = "default_relays")]
    pub default_relays: Vec<String>,
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,
    /// Relays with self-signed certificates still get the receipt.
    #[serde(default = "default_relay_accept_invalid_certs")]
    pub relay_accept_invalid_certs: bool,
}

fn default_relays() -> Vec<String> {
    [
        "wss://nostr.mom",
        "wss://nostr-pub.wellorder.net",
        "wss://relay.damus.io",
        "wss://nos.lol",
    ]
    .iter()
    .map(|relay| relay.to_string())
    .collect()
}

fn default_relay_timeout_secs() -> u64 {
    10
}

fn default_relay_accept_invalid_certs() -> bool {
    true
}

impl Default for NostrEngineSettings {
    fn default() -> Self {
        Self {
            default_relays: default_relays(),
            relay_timeout_secs: default_relay_timeout_secs(),
            relay_accept_invalid_certs: default_relay_accept_invalid_certs(),
        }
    }
}

/// Relays named by the zap request first, then the defaults it did not
/// already list. Duplicates are dropped, first occurrence wins.
pub fn resolve_relays(request: &Event, defaults: &[String]) -> Vec<String> {
    let mut relays: Vec<String> = Vec::new();
    for relay in utils::nostr::request_relays(request).into_iter().chain(defaults.iter().cloned()) {
        if !relay.is_empty() && !relays.contains(&relay) {
            relays.push(relay);
        }
    }
    relays
}

/// Publishes a receipt for every zap note coming out of the settlement
/// listener, each on its own task.
pub fn spawn_events_handler(
    engine: Arc<NostrEngine>,
    mut zap_notes_rx: tokio::sync::mpsc::Receiver<ZapNote>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(note) = zap_notes_rx.recv().await {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.publish_zap_receipt(&note).await {
                    log::error!(
                        engine.logger(),
                        "Failed to publish zap receipt for invoice {}: {}",
                        note.invoice.add_index,
                        err
                    );
                }
            });
        }
        log::info!(engine.logger(), "Zap note channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::nostr::{Tag, UnsignedEvent, ZAP_REQUEST_KIND};
    use utils::nostr::Signer;

    fn request_with_tags(tags: Vec<Tag>) -> Event {
        let signer = Signer::from_slice(&[1u8; 32]).unwrap();
        signer
            .sign(UnsignedEvent {
                pubkey: signer.public_key_hex(),
                created_at: 1_680_000_000,
                kind: ZAP_REQUEST_KIND,
                tags,
                content: String::new(),
            })
            .unwrap()
    }

    #[test]
    fn request_relays_come_first() {
        let request = request_with_tags(vec![
            Tag::new("p", ["3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d"]),
            Tag::new("relays", ["wss://a", "wss://b"]),
        ]);
        let defaults = vec!["wss://b".to_string(), "wss://c".to_string()];
        assert_eq!(resolve_relays(&request, &defaults), vec!["wss://a", "wss://b", "wss://c"]);
    }

    #[test]
    fn defaults_without_relays_tag() {
        let request = request_with_tags(vec![Tag::new(
            "p",
            ["3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d"],
        )]);
        let defaults = NostrEngineSettings::default().default_relays;
        assert_eq!(resolve_relays(&request, &defaults), defaults);
    }

    #[test]
    fn duplicate_request_relays_are_dropped() {
        let request = request_with_tags(vec![Tag::new("relays", ["wss://a", "wss://a", "", "wss://b"])]);
        assert_eq!(resolve_relays(&request, &[]), vec!["wss://a", "wss://b"]);
    }

    #[test]
    fn only_first_relays_tag_counts() {
        let request = request_with_tags(vec![
            Tag::new("relays", ["wss://a"]),
            Tag::new("relays", ["wss://b"]),
        ]);
        let defaults = vec!["wss://c".to_string()];
        assert_eq!(resolve_relays(&request, &defaults), vec!["wss://a", "wss://c"]);
    }
}
