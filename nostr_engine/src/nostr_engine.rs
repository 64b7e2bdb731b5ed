use crate::{resolve_relays, NostrEngineSettings};
use core_types::nostr::Event;
use core_types::ZapNote;
use utils::nostr::{create_zap_note, Signer};
use xerror::nostr_engine::RelayError;
use xerror::zap::ZapError;

use futures::future::join_all;
use futures::SinkExt;
use serde_json::json;
use slog as log;
use slog::Logger;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub relay: String,
    pub result: Result<(), RelayError>,
}

pub struct NostrEngine {
    signer: Signer,
    settings: NostrEngineSettings,
    logger: Logger,
}

impl NostrEngine {
    pub fn new(signer: Signer, settings: NostrEngineSettings, logger: Logger) -> Self {
        Self {
            signer,
            settings,
            logger,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    /// Signs the kind 9735 receipt for a settled zap and sends it to every
    /// resolved relay. Relay failures are reported per relay, never as an
    /// error of the whole publish.
    pub async fn publish_zap_receipt(&self, note: &ZapNote) -> Result<Vec<RelayOutcome>, ZapError> {
        log::info!(self.logger, "Creating event kind 9735 for idx {}", note.invoice.add_index);
        log::debug!(self.logger, "Have 9734 event: {}", note.request);
        log::debug!(self.logger, "Have LND invoice: {}", note.invoice.raw);

        let request: Event = serde_json::from_str(&note.request).map_err(|_| ZapError::InvalidJson)?;
        let receipt = create_zap_note(
            &self.signer,
            &note.request,
            &request,
            &note.invoice.payment_request,
            note.invoice.settle_date,
        )?;
        let message = json!(["EVENT", receipt]).to_string();
        log::debug!(self.logger, "{}", message);

        let relays = resolve_relays(&request, &self.settings.default_relays);
        log::info!(self.logger, "Sending 9735 event {} to {} relays", receipt.id, relays.len());
        let outcomes = self.broadcast(relays, message).await;
        for outcome in outcomes.iter() {
            match &outcome.result {
                Ok(()) => log::debug!(self.logger, "Receipt sent to {}", outcome.relay),
                Err(err) => log::warn!(self.logger, "Receipt not sent to {}: {}", outcome.relay, err),
            }
        }
        Ok(outcomes)
    }

    async fn broadcast(&self, relays: Vec<String>, message: String) -> Vec<RelayOutcome> {
        let relay_timeout = Duration::from_secs(self.settings.relay_timeout_secs);
        let accept_invalid_certs = self.settings.relay_accept_invalid_certs;

        let tasks = relays.into_iter().map(|relay| {
            let message = message.clone();
            async move {
                let sent = tokio::spawn({
                    let relay = relay.clone();
                    async move {
                        match timeout(relay_timeout, send_to_relay(&relay, message, accept_invalid_certs)).await {
                            Ok(result) => result,
                            Err(_) => Err(RelayError::Timeout),
                        }
                    }
                })
                .await;
                let result = sent.unwrap_or_else(|err| Err(RelayError::Send(err.to_string())));
                RelayOutcome { relay, result }
            }
        });
        join_all(tasks).await
    }
}

/// Opens a websocket to `url`, sends one text frame and closes.
pub async fn send_to_relay(url: &str, message: String, accept_invalid_certs: bool) -> Result<(), RelayError> {
    let request = url
        .into_client_request()
        .map_err(|err| RelayError::InvalidUrl(format!("{}: {}", url, err)))?;
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|err| RelayError::Tls(err.to_string()))?;

    let (mut ws, _) = connect_async_tls_with_config(request, None, false, Some(Connector::NativeTls(tls)))
        .await
        .map_err(|err| RelayError::Connect(err.to_string()))?;
    ws.send(Message::Text(message))
        .await
        .map_err(|err| RelayError::Send(err.to_string()))?;
    let _ = ws.close(None).await;
    Ok(())
}
