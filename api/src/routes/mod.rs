use actix_web::web;

pub mod lnd;
pub mod lnurl;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(lnurl::lnurl_pay_address)
        .service(lnurl::invoice)
        .service(lnd::lnd_state)
        .service(lnd::set_clearnet);
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{build_zapper, ApiSettings, Zapper};
    use core_types::nostr::{Tag, UnsignedEvent, ZAP_REQUEST_KIND};
    use lnd_connector::LndConnectorSettings;
    use nostr_engine::NostrEngineSettings;
    use utils::nostr::Signer;

    pub const RECIPIENT: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";

    pub fn settings(lnd_addr: &str) -> ApiSettings {
        ApiSettings {
            bind_address: "127.0.0.1:0".to_string(),
            lnurl_origin: "https://zaps.example.com/".to_string(),
            min_sendable: 1000,
            max_sendable: 1_000_000_000,
            users_path: "users.json".to_string(),
            zapper_key: "02".repeat(32),
            dynip_secret: None,
            lnd: LndConnectorSettings {
                rest_addr: lnd_addr.to_string(),
                macaroon: "0201036c6e64".to_string(),
                socks5h_proxy: None,
                tls_verify: "true".to_string(),
                dynip_port: 8080,
                request_timeout_secs: 5,
            },
            nostr: NostrEngineSettings {
                default_relays: vec![],
                ..Default::default()
            },
            cache: Default::default(),
            logging: Default::default(),
        }
    }

    pub fn zapper_with(settings: &ApiSettings) -> Zapper {
        let users = ["alice", "bob"].iter().map(|user| user.to_string()).collect();
        build_zapper(settings, users, utils::xlogging::discard()).unwrap()
    }

    pub fn zapper(lnd_addr: &str) -> Zapper {
        zapper_with(&settings(lnd_addr))
    }

    pub fn zap_request(amount: u64) -> String {
        let sender = Signer::from_slice(&[1u8; 32]).unwrap();
        let request = sender
            .sign(UnsignedEvent {
                pubkey: sender.public_key_hex(),
                created_at: 1_680_000_000,
                kind: ZAP_REQUEST_KIND,
                tags: vec![
                    Tag::new("p", [RECIPIENT]),
                    Tag::new("amount", [amount.to_string()]),
                    Tag::new("relays", ["wss://relay.example.com"]),
                ],
                content: "zap zap".to_string(),
            })
            .unwrap();
        serde_json::to_string(&request).unwrap()
    }

    /// Percent-encodes everything but unreserved characters.
    pub fn encode(value: &str) -> String {
        value
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
                _ => format!("%{:02X}", b),
            })
            .collect()
    }
}
