use serde::Serialize;

pub mod lnd;
pub mod nostr;

use lnd::SettledInvoice;

/// Handed from the settlement listener to the nostr engine once a cached
/// invoice settles.
#[derive(Debug, Clone, Serialize)]
pub struct ZapNote {
    /// The zap request JSON exactly as it was hashed into the invoice.
    pub request: String,
    pub invoice: SettledInvoice,
}
