use err_derive::Error;
use serde::Serialize;
use serde_json::json;

use actix_web::{error, http::StatusCode, HttpResponse};

use crate::lnd_connector::LndConnectorError;
use crate::zap::ZapError;

#[derive(Debug, Error, Serialize)]
pub enum RequestError {
    #[error(display = "User unknown")]
    UnknownUser,
    #[error(display = "No valid amount given")]
    InvalidAmount,
    #[error(display = "Amount out of range")]
    AmountOutOfRange,
    #[error(display = "No valid nostr given")]
    MissingEvent,
    #[error(display = "No valid IP given")]
    InvalidIp,
}

#[derive(Debug, Error, Serialize)]
pub enum DynIpError {
    #[error(display = "Feature not available")]
    FeatureUnavailable,
    #[error(display = "No secret given")]
    NoSecret,
    #[error(display = "Denied")]
    Denied,
    #[error(display = "Invalid tls setting")]
    InvalidTls,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(display = "Request error.")]
    Request(RequestError),
    #[error(display = "Zap error.")]
    Zap(ZapError),
    #[error(display = "Lnd error.")]
    Lnd(LndConnectorError),
    #[error(display = "Dynamic ip error.")]
    DynIp(DynIpError),
}

impl ApiError {
    /// Machine readable reason sent back in the error body.
    pub fn reason(&self) -> String {
        match self {
            ApiError::Request(err) => err.to_string(),
            ApiError::Zap(err) => format!("nostr event is not a valid kind 9734: {}", err),
            ApiError::Lnd(err) => err.to_string(),
            ApiError::DynIp(err) => err.to_string(),
        }
    }
}

impl error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "ERROR",
            "reason": self.reason(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Request(request) => match request {
                RequestError::UnknownUser => StatusCode::NOT_FOUND,
                RequestError::InvalidAmount => StatusCode::BAD_REQUEST,
                RequestError::AmountOutOfRange => StatusCode::BAD_REQUEST,
                RequestError::MissingEvent => StatusCode::BAD_REQUEST,
                RequestError::InvalidIp => StatusCode::BAD_REQUEST,
            },
            ApiError::Zap(_) => StatusCode::BAD_REQUEST,
            ApiError::Lnd(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DynIp(dyn_ip) => match dyn_ip {
                DynIpError::FeatureUnavailable => StatusCode::FORBIDDEN,
                DynIpError::NoSecret => StatusCode::FORBIDDEN,
                DynIpError::Denied => StatusCode::FORBIDDEN,
                DynIpError::InvalidTls => StatusCode::BAD_REQUEST,
            },
        }
    }
}
