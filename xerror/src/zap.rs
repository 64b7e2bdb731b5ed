use err_derive::Error;
use serde::Serialize;

/// Reasons a zap request (kind 9734) is rejected, in the order they are checked.
#[derive(Debug, Error, Serialize, Clone, PartialEq, Eq)]
pub enum ZapError {
    #[error(display = "payload is not valid json")]
    InvalidJson,
    #[error(display = "missing field '{}'", _0)]
    MissingField(&'static str),
    #[error(display = "malformed event")]
    MalformedEvent,
    #[error(display = "event kind is not 9734")]
    NotZapRequest,
    #[error(display = "expected exactly one 'p' tag, found {}", _0)]
    InvalidPubkeyTagCount(usize),
    #[error(display = "expected at most one 'e' tag, found {}", _0)]
    InvalidEventTagCount(usize),
    #[error(display = "expected at most one 'amount' tag, found {}", _0)]
    InvalidAmountTagCount(usize),
    #[error(display = "'amount' tag is not an integer")]
    InvalidAmountTag,
    #[error(display = "'amount' tag {} does not match requested amount {}", found, expected)]
    AmountMismatch { expected: u64, found: u64 },
    #[error(display = "invalid pubkey")]
    InvalidPubkey,
    #[error(display = "invalid signature")]
    InvalidSignature,
    #[error(display = "could not create zap note")]
    CouldNotCreateZapNote,
}
