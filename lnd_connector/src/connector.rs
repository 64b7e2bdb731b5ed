use core_types::lnd::AddInvoiceResponse;
use xerror::lnd_connector::*;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use slog as log;
use slog::Logger;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
/// Keeps NAT mappings of the idle invoice subscription alive.
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// One JSON document per item, as pushed by `/v1/invoices/subscribe`.
pub type InvoiceLines = BoxStream<'static, Result<String, LndConnectorError>>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LndConnectorSettings {
    pub rest_addr: String,
    pub macaroon: String,
    #[serde(default)]
    pub socks5h_proxy: Option<String>,
    /// `true`, `false` or the path of a PEM CA bundle (usually LND's tls.cert).
    #[serde(default = "default_tls_verify")]
    pub tls_verify: String,
    #[serde(default = "default_dynip_port")]
    pub dynip_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_tls_verify() -> String {
    "./tls.cert".to_string()
}

fn default_dynip_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsVerify {
    Enabled,
    Disabled,
    CaBundle(PathBuf),
}

impl FromStr for TlsVerify {
    type Err = LndConnectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            v if v.eq_ignore_ascii_case("false") => Ok(TlsVerify::Disabled),
            v if v.is_empty() || v.eq_ignore_ascii_case("true") => Ok(TlsVerify::Enabled),
            path => Ok(TlsVerify::CaBundle(PathBuf::from(path))),
        }
    }
}

impl std::fmt::Display for TlsVerify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVerify::Enabled => write!(f, "true"),
            TlsVerify::Disabled => write!(f, "false"),
            TlsVerify::CaBundle(path) => write!(f, "{}", path.display()),
        }
    }
}

struct Endpoint {
    rest_addr: String,
    tls_verify: TlsVerify,
    dynip_port: u16,
    client: reqwest::Client,
}

/// REST client for the LND endpoints the zap server needs.
pub struct LndConnector {
    settings: LndConnectorSettings,
    endpoint: RwLock<Endpoint>,
    logger: Logger,
}

impl LndConnector {
    pub fn new(settings: LndConnectorSettings, logger: Logger) -> Result<Self, LndConnectorError> {
        let tls_verify = settings.tls_verify.parse::<TlsVerify>()?;
        let proxy = settings.socks5h_proxy.as_deref().filter(|proxy| !proxy.is_empty());
        let client = build_client(proxy, &tls_verify)?;
        let endpoint = Endpoint {
            rest_addr: settings.rest_addr.trim_end_matches('/').to_string(),
            tls_verify,
            dynip_port: settings.dynip_port,
            client,
        };
        Ok(Self {
            settings,
            endpoint: RwLock::new(endpoint),
            logger,
        })
    }

    pub fn rest_addr(&self) -> String {
        self.endpoint.read().unwrap_or_else(PoisonError::into_inner).rest_addr.clone()
    }

    pub fn tls_verify(&self) -> TlsVerify {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tls_verify
            .clone()
    }

    pub fn dynip_port(&self) -> u16 {
        self.endpoint.read().unwrap_or_else(PoisonError::into_inner).dynip_port
    }

    /// Points the connector at `https://{ip}:{port}`, bypassing the proxy.
    /// Returns whether the address changed, in which case an open invoice
    /// subscription needs a reconnect.
    pub fn set_clearnet(&self, ip: IpAddr, port: u16, tls_verify: TlsVerify) -> Result<bool, LndConnectorError> {
        let client = build_client(None, &tls_verify)?;
        let rest_addr = format!("https://{}", SocketAddr::new(ip, port));
        let mut endpoint = self.endpoint.write().unwrap_or_else(PoisonError::into_inner);
        let changed = endpoint.rest_addr != rest_addr;
        *endpoint = Endpoint {
            rest_addr,
            tls_verify,
            dynip_port: port,
            client,
        };
        log::info!(self.logger, "LND rest addr set to {}", endpoint.rest_addr);
        Ok(changed)
    }

    fn endpoint(&self) -> (String, reqwest::Client) {
        let endpoint = self.endpoint.read().unwrap_or_else(PoisonError::into_inner);
        (endpoint.rest_addr.clone(), endpoint.client.clone())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    pub async fn create_invoice(
        &self,
        amount_msat: u64,
        description: &str,
    ) -> Result<AddInvoiceResponse, LndConnectorError> {
        let (rest_addr, client) = self.endpoint();
        let data = json!({
            "value_msat": amount_msat,
            "description_hash": description_hash(description),
        });
        log::debug!(self.logger, "Sending to LND: {}", data);

        let response = client
            .post(format!("{}/v1/invoices", rest_addr))
            .header(MACAROON_HEADER, &self.settings.macaroon)
            .json(&data)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|err| {
                log::error!(self.logger, "LND connection error at {}: {}", rest_addr, err);
                LndConnectorError::Unreachable(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(self.logger, "No 200 from lnd: {} {}", status, body);
            return Err(LndConnectorError::UnexpectedStatus(status.as_u16()));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|_| LndConnectorError::InvalidResponse)?;
        log::debug!(self.logger, "LND response {}", body);
        AddInvoiceResponse::from_json(&body).ok_or(LndConnectorError::InvalidResponse)
    }

    /// Opens the invoice subscription. The returned stream ends when LND
    /// closes the body and yields `StreamFailed` on transport errors.
    pub async fn subscribe_invoices(&self) -> Result<InvoiceLines, LndConnectorError> {
        let (rest_addr, client) = self.endpoint();
        log::info!(self.logger, "Sending invoice subscribe to LND");
        let response = client
            .get(format!("{}/v1/invoices/subscribe", rest_addr))
            .header(MACAROON_HEADER, &self.settings.macaroon)
            .send()
            .await
            .map_err(|err| LndConnectorError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LndConnectorError::UnexpectedStatus(status.as_u16()));
        }
        Ok(invoice_lines(response.bytes_stream()))
    }

    /// `GET /v1/state`, status and body passed through as they are. A body
    /// that is not JSON comes back as a JSON string.
    pub async fn get_state(&self) -> Result<(u16, Value), LndConnectorError> {
        let (rest_addr, client) = self.endpoint();
        log::debug!(self.logger, "Requesting LND state");
        let response = client
            .get(format!("{}/v1/state", rest_addr))
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|err| {
                log::error!(self.logger, "LND connection error at {}", rest_addr);
                LndConnectorError::Unreachable(err.to_string())
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| LndConnectorError::Unreachable(err.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }
}

fn build_client(proxy: Option<&str>, tls_verify: &TlsVerify) -> Result<reqwest::Client, LndConnectorError> {
    let mut builder = reqwest::Client::builder().tcp_keepalive(TCP_KEEPALIVE);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy).map_err(|err| LndConnectorError::InvalidSettings(err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder = match tls_verify {
        TlsVerify::Enabled => builder,
        TlsVerify::Disabled => builder.danger_accept_invalid_certs(true),
        TlsVerify::CaBundle(path) => {
            let pem = std::fs::read(path)
                .map_err(|err| LndConnectorError::InvalidSettings(format!("{}: {}", path.display(), err)))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|err| LndConnectorError::InvalidSettings(err.to_string()))?;
            builder.add_root_certificate(cert)
        }
    };
    builder
        .build()
        .map_err(|err| LndConnectorError::InvalidSettings(err.to_string()))
}

/// Base64 of the SHA-256 of the exact zap request string. Wallets recompute
/// this from the description, so the bytes must not be re-encoded.
pub fn description_hash(description: &str) -> String {
    base64::encode(Sha256::digest(description.as_bytes()))
}

struct LineBuffer<S> {
    chunks: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Splits a chunked body into newline separated, non-empty lines.
pub fn invoice_lines<S, E>(chunks: S) -> InvoiceLines
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineBuffer {
        chunks: Box::pin(chunks),
        buffer: Vec::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Some((Ok(line), state));
            }
            if state.finished {
                let rest = String::from_utf8_lossy(&state.buffer).trim().to_string();
                state.buffer.clear();
                if rest.is_empty() {
                    return None;
                }
                return Some((Ok(rest), state));
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(LndConnectorError::StreamFailed(err.to_string())), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
