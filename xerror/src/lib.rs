pub mod api;
pub mod lnd_connector;
pub mod nostr_engine;
pub mod zap;
