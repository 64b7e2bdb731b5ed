#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LndConnectorError {
    InvalidSettings(String),
    Unreachable(String),
    UnexpectedStatus(u16),
    InvalidResponse,
    StreamFailed(String),
}

impl std::fmt::Display for LndConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LndConnectorError::InvalidSettings(reason) => write!(f, "invalid LND settings: {}", reason),
            LndConnectorError::Unreachable(_) => write!(f, "LND unreachable"),
            LndConnectorError::UnexpectedStatus(status) => write!(f, "LND responded with status {}", status),
            LndConnectorError::InvalidResponse => write!(f, "LND did not provide an invoice"),
            LndConnectorError::StreamFailed(reason) => write!(f, "LND invoice stream failed: {}", reason),
        }
    }
}

impl std::error::Error for LndConnectorError {}
