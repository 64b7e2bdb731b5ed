use actix_web::http::StatusCode;
use actix_web::web::{Data, Query};
use actix_web::{get, HttpResponse};
use serde::Deserialize;
use slog as log;

use lnd_connector::TlsVerify;
use std::net::IpAddr;
use xerror::api::*;

use crate::AppState;

/// Proxies the node's `/v1/state`.
#[get("/lnurlp/state")]
pub async fn lnd_state(state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    let (status, body) = state.connector.get_state().await.map_err(ApiError::Lnd)?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok(HttpResponse::build(status).json(body))
}

#[derive(Deserialize, Debug)]
pub struct SetClearnetParams {
    secret: Option<String>,
    ipv4: Option<String>,
    port: Option<String>,
    tls_verify: Option<String>,
}

/// Switches the node connection to `https://{ipv4}:{port}` without proxy,
/// for nodes behind a dynamic IP.
#[get("/lnurlp/set_clearnet")]
pub async fn set_clearnet(query: Query<SetClearnetParams>, state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    log::debug!(state.logger, "got set_clearnet request");

    let secret = query
        .secret
        .as_deref()
        .ok_or(ApiError::DynIp(DynIpError::NoSecret))?;
    let ipv4 = query
        .ipv4
        .as_deref()
        .ok_or(ApiError::Request(RequestError::InvalidIp))?;
    let port = query
        .port
        .as_deref()
        .and_then(|port| port.trim().parse::<u16>().ok())
        .unwrap_or_else(|| state.connector.dynip_port());
    let tls_verify = match query.tls_verify.as_deref() {
        Some(tls_verify) => tls_verify
            .parse::<TlsVerify>()
            .map_err(|_| ApiError::DynIp(DynIpError::InvalidTls))?,
        None => state.connector.tls_verify(),
    };

    let expected = state
        .dynip_secret
        .as_deref()
        .ok_or(ApiError::DynIp(DynIpError::FeatureUnavailable))?;
    if expected != secret {
        log::warn!(state.logger, "set_clearnet with wrong secret");
        return Err(ApiError::DynIp(DynIpError::Denied));
    }
    let ip: IpAddr = ipv4.trim().parse().map_err(|_| ApiError::DynIp(DynIpError::Denied))?;

    let changed = state.connector.set_clearnet(ip, port, tls_verify).map_err(|err| {
        log::error!(state.logger, "set_clearnet failed: {}", err);
        ApiError::DynIp(DynIpError::InvalidTls)
    })?;
    if changed {
        state.listener.reconnect();
    }

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::routes::configure;
    use crate::routes::testing::{settings, zapper, zapper_with};
    use actix_http::Request;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[actix_web::test]
    async fn state_is_proxied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "SERVER_ACTIVE"})))
            .mount(&server)
            .await;
        let zapper = zapper(&server.uri());
        let app = test::init_service(App::new().app_data(zapper.state.clone()).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/lnurlp/state").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"state": "SERVER_ACTIVE"}));
    }

    #[actix_web::test]
    async fn state_of_unreachable_node() {
        let zapper = zapper("http://127.0.0.1:1");
        let app = test::init_service(App::new().app_data(zapper.state.clone()).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/lnurlp/state").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "ERROR", "reason": "LND unreachable"}));
    }

    async fn call<S>(app: &S, uri: &str) -> (StatusCode, Option<Value>)
    where
        S: Service<Request, Response = ServiceResponse, Error = actix_web::Error>,
    {
        let resp = test::call_service(app, test::TestRequest::get().uri(uri).to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, serde_json::from_slice(&body).ok())
    }

    #[actix_web::test]
    async fn clearnet_disabled_without_secret() {
        let zapper = zapper("https://10.0.0.1:8080");
        let app = test::init_service(App::new().app_data(zapper.state.clone()).configure(configure)).await;

        let (status, body) = call(&app, "/lnurlp/set_clearnet?secret=s3cret&ipv4=1.2.3.4").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.unwrap()["reason"], "Feature not available");
        assert_eq!(zapper.state.connector.rest_addr(), "https://10.0.0.1:8080");
    }

    #[actix_web::test]
    async fn clearnet_switch() {
        let mut settings = settings("https://10.0.0.1:8080");
        settings.dynip_secret = Some("s3cret".to_string());
        let zapper = zapper_with(&settings);
        let app = test::init_service(App::new().app_data(zapper.state.clone()).configure(configure)).await;

        let (status, body) = call(&app, "/lnurlp/set_clearnet?ipv4=1.2.3.4").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.unwrap()["reason"], "No secret given");

        let (status, body) = call(&app, "/lnurlp/set_clearnet?secret=s3cret").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.unwrap()["reason"], "No valid IP given");

        let (status, body) = call(&app, "/lnurlp/set_clearnet?secret=wrong&ipv4=1.2.3.4").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.unwrap()["reason"], "Denied");

        let (status, _) = call(&app, "/lnurlp/set_clearnet?secret=s3cret&ipv4=1.2.3").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(zapper.state.connector.rest_addr(), "https://10.0.0.1:8080");

        let uri = "/lnurlp/set_clearnet?secret=s3cret&ipv4=1.2.3.4&port=9000&tls_verify=false";
        let (status, body) = call(&app, uri).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_none());
        assert_eq!(zapper.state.connector.rest_addr(), "https://1.2.3.4:9000");

        let (status, _) = call(&app, "/lnurlp/set_clearnet?secret=s3cret&ipv4=5.6.7.8").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(zapper.state.connector.rest_addr(), "https://5.6.7.8:9000");
    }
}
