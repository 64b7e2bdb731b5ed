use actix_web::http::Uri;
use actix_web::web::{Data, Path, Query};
use actix_web::{get, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use slog as log;

use utils::nostr::validate_zap_request;
use xerror::api::*;
use xerror::lnd_connector::LndConnectorError;

use crate::{AppState, SERVER_VERSION};

const COMMENT_ALLOWED: u64 = 255;

fn identifier_host(lnurl_origin: &str) -> String {
    lnurl_origin
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_else(|| lnurl_origin.to_string())
}

#[get("/.well-known/lnurlp/{username}")]
pub async fn lnurl_pay_address(path: Path<String>, state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    log::debug!(state.logger, "got lnurlp request for: {}", username);

    if !state.users.contains(&username) {
        return Err(ApiError::Request(RequestError::UnknownUser));
    }

    let callback = format!("{}/lnurlp/invoice/{}", state.lnurl_origin, username);
    let metadata = json!([
        ["text/identifier", format!("{}@{}", username, identifier_host(&state.lnurl_origin))],
        ["text/plain", format!("Sats for {}", username)],
    ]);

    let resp = json!({
        "callback": callback,
        "maxSendable": state.max_sendable,
        "minSendable": state.min_sendable,
        "metadata": metadata.to_string(),
        "tag": "payRequest",
        "allowsNostr": true,
        "commentAllowed": COMMENT_ALLOWED,
        "status": "OK",
        "nostrPubkey": state.nostr_pubkey,
        "server_version": SERVER_VERSION,
    });

    Ok(HttpResponse::Ok().json(resp))
}

#[derive(Deserialize, Debug)]
pub struct InvoiceParams {
    amount: Option<String>,
    nostr: Option<String>,
}

#[get("/lnurlp/invoice/{username}")]
pub async fn invoice(
    path: Path<String>,
    query: Query<InvoiceParams>,
    state: Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    if !state.users.contains(&username) {
        return Err(ApiError::Request(RequestError::UnknownUser));
    }

    let amount = query
        .amount
        .as_deref()
        .and_then(|amount| amount.trim().parse::<u64>().ok())
        .ok_or(ApiError::Request(RequestError::InvalidAmount))?;
    if amount < state.min_sendable || amount > state.max_sendable {
        return Err(ApiError::Request(RequestError::AmountOutOfRange));
    }
    log::info!(state.logger, "got invoice request for {} amount {} msats", username, amount);

    // already URL-decoded once by the extractor; hashed exactly as received
    let nostr = query
        .nostr
        .as_deref()
        .filter(|nostr| !nostr.is_empty())
        .ok_or(ApiError::Request(RequestError::MissingEvent))?;

    validate_zap_request(nostr, amount).map_err(|err| {
        log::info!(state.logger, "Rejected zap request for {}: {}", username, err);
        ApiError::Zap(err)
    })?;

    let invoice = state.connector.create_invoice(amount, nostr).await.map_err(|err| {
        log::error!(state.logger, "Invoice for {} failed: {}", username, err);
        ApiError::Lnd(LndConnectorError::InvalidResponse)
    })?;

    log::info!(state.logger, "caching open invoice {}", invoice.add_index);
    state.cache.put(&invoice.add_index, nostr);
    log::info!(state.logger, "Invoice cache length is {}", state.cache.len());
    state.listener.ensure_running();

    Ok(HttpResponse::Ok().json(json!({
        "status": "OK",
        "pr": invoice.payment_request,
        "routes": [],
    })))
}
