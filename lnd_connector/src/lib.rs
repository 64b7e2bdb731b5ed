pub mod connector;
pub mod invoice_cache;
pub mod listener;

pub use connector::{LndConnector, LndConnectorSettings, TlsVerify};
pub use invoice_cache::{spawn_invoice_janitor, InvoiceCache, InvoiceCacheSettings, PendingInvoice};
pub use listener::{ListenerExit, ListenerState, SettlementListener};
