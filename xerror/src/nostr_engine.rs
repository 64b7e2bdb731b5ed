use err_derive::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(display = "invalid relay url {}", _0)]
    InvalidUrl(String),
    #[error(display = "tls setup failed: {}", _0)]
    Tls(String),
    #[error(display = "could not connect: {}", _0)]
    Connect(String),
    #[error(display = "could not send: {}", _0)]
    Send(String),
    #[error(display = "timed out")]
    Timeout,
}
