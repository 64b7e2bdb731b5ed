use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use serde::{Deserialize, Serialize};
use slog as log;
use slog::Logger;
use tokio::sync::mpsc;

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use core_types::ZapNote;
use lnd_connector::{
    spawn_invoice_janitor, InvoiceCache, InvoiceCacheSettings, LndConnector, LndConnectorSettings, SettlementListener,
};
use nostr_engine::{spawn_events_handler, NostrEngine, NostrEngineSettings};
use utils::nostr::Signer;
use utils::xlogging::LoggingSettings;

pub mod routes;

pub const SERVER_VERSION: &str = concat!("nip57_server ", env!("CARGO_PKG_VERSION"));

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_lnurl_origin")]
    pub lnurl_origin: String,
    #[serde(default = "default_min_sendable")]
    pub min_sendable: u64,
    #[serde(default = "default_max_sendable")]
    pub max_sendable: u64,
    #[serde(default = "default_users_path")]
    pub users_path: String,
    /// Hex secret key signing the zap receipts.
    pub zapper_key: String,
    /// Unset disables `/lnurlp/set_clearnet`.
    #[serde(default)]
    pub dynip_secret: Option<String>,
    pub lnd: LndConnectorSettings,
    #[serde(default)]
    pub nostr: NostrEngineSettings,
    #[serde(default)]
    pub cache: InvoiceCacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_lnurl_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_min_sendable() -> u64 {
    1000
}

fn default_max_sendable() -> u64 {
    1_000_000_000
}

fn default_users_path() -> String {
    "users.json".to_string()
}

/// Shared by all request handlers.
pub struct AppState {
    pub lnurl_origin: String,
    pub min_sendable: u64,
    pub max_sendable: u64,
    pub users: HashSet<String>,
    pub nostr_pubkey: String,
    pub dynip_secret: Option<String>,
    pub connector: Arc<LndConnector>,
    pub cache: InvoiceCache,
    pub listener: SettlementListener,
    pub logger: Logger,
}

/// Everything `start` wires together, split out so it can be driven
/// without binding a socket.
pub struct Zapper {
    pub state: Data<AppState>,
    pub engine: Arc<NostrEngine>,
    pub zap_notes_rx: mpsc::Receiver<ZapNote>,
}

fn invalid_data<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Known usernames are the keys of a JSON object.
pub fn load_users(path: &str) -> io::Result<HashSet<String>> {
    let raw = std::fs::read_to_string(path)?;
    parse_users(&raw)
}

fn parse_users(raw: &str) -> io::Result<HashSet<String>> {
    let users: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw).map_err(invalid_data)?;
    Ok(users.into_iter().map(|(name, _)| name).collect())
}

fn truncated(value: &str, keep: usize) -> String {
    format!("{}...", value.chars().take(keep).collect::<String>())
}

fn log_settings(settings: &ApiSettings, logger: &Logger) {
    log::info!(logger, "Config LNURL_ORIGIN: {}", settings.lnurl_origin);
    log::info!(logger, "Config MIN_SENDABLE: {}", settings.min_sendable);
    log::info!(logger, "Config MAX_SENDABLE: {}", settings.max_sendable);
    log::info!(logger, "Config DEFAULT_RELAYS: {:?}", settings.nostr.default_relays);
    log::info!(logger, "Config SOCKS5H_PROXY: {:?}", settings.lnd.socks5h_proxy);
    log::info!(logger, "Config LND_RESTADDR: {}", truncated(&settings.lnd.rest_addr, 16));
    log::info!(logger, "Config INVOICE_MACAROON: {}", truncated(&settings.lnd.macaroon, 14));
    log::info!(logger, "Config ZAPPER_KEY: {}", truncated(&settings.zapper_key, 14));
    log::info!(
        logger,
        "Config DYNIP_SECRET: {}",
        truncated(settings.dynip_secret.as_deref().unwrap_or_default(), 3)
    );
    log::info!(logger, "Config TLS_VERIFY: {}", settings.lnd.tls_verify);
}

pub fn build_zapper(settings: &ApiSettings, users: HashSet<String>, logger: Logger) -> io::Result<Zapper> {
    let signer = Signer::from_hex(&settings.zapper_key).map_err(invalid_data)?;
    let nostr_pubkey = signer.public_key_hex();
    let connector = Arc::new(LndConnector::new(settings.lnd.clone(), logger.clone()).map_err(invalid_data)?);
    let cache = InvoiceCache::new();

    let (zap_notes_tx, zap_notes_rx) = mpsc::channel(1024);
    let listener = SettlementListener::new(connector.clone(), cache.clone(), zap_notes_tx, logger.clone());
    let engine = Arc::new(NostrEngine::new(signer, settings.nostr.clone(), logger.clone()));

    let state = AppState {
        lnurl_origin: settings.lnurl_origin.trim_end_matches('/').to_string(),
        min_sendable: settings.min_sendable,
        max_sendable: settings.max_sendable,
        users,
        nostr_pubkey,
        dynip_secret: settings.dynip_secret.clone().filter(|secret| !secret.is_empty()),
        connector,
        cache,
        listener,
        logger,
    };
    Ok(Zapper {
        state: Data::new(state),
        engine,
        zap_notes_rx,
    })
}

pub async fn start(settings: ApiSettings) -> io::Result<()> {
    let logger = utils::xlogging::init_log(&settings.logging)?;
    log::info!(logger, "{} starting on {}", SERVER_VERSION, settings.bind_address);
    log_settings(&settings, &logger);

    let users = load_users(&settings.users_path)?;
    log::debug!(logger, "Found {} users in {}", users.len(), settings.users_path);

    let Zapper {
        state,
        engine,
        zap_notes_rx,
    } = build_zapper(&settings, users, logger.clone())?;

    spawn_events_handler(engine, zap_notes_rx);
    spawn_invoice_janitor(state.cache.clone(), settings.cache.clone(), logger.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(&settings.bind_address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_are_object_keys() {
        let users = parse_users(r#"{"alice": {}, "bob": {"note": "x"}}"#).unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.contains("alice"));
        assert!(users.contains("bob"));
        assert!(parse_users(r#"["alice"]"#).is_err());
    }

    #[test]
    fn secrets_are_truncated() {
        assert_eq!(truncated("0201036c6e640258030a10", 14), "0201036c6e6402...");
        assert_eq!(truncated("", 3), "...");
    }
}
