use serde::Serialize;
use serde_json::Value;

/// LND's REST gateway encodes 64-bit integers as JSON strings.
fn int_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => Some(s.clone()),
        Value::Number(n) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn int_u64(value: &Value) -> Option<u64> {
    int_string(value).and_then(|s| s.parse().ok())
}

/// Response of `POST /v1/invoices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddInvoiceResponse {
    pub add_index: String,
    pub payment_request: String,
}

impl AddInvoiceResponse {
    pub fn from_json(value: &Value) -> Option<Self> {
        let add_index = value.get("add_index").and_then(int_string)?;
        let payment_request = value.get("payment_request")?.as_str()?;
        if payment_request.is_empty() {
            return None;
        }
        Some(Self {
            add_index,
            payment_request: payment_request.to_string(),
        })
    }
}

/// A settled invoice as reported by the invoice subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettledInvoice {
    pub add_index: String,
    pub payment_request: String,
    pub settle_date: u64,
    /// The invoice object exactly as LND pushed it.
    pub raw: Value,
}

/// One decoded line of `GET /v1/invoices/subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementNotification {
    Settled(SettledInvoice),
    Unsettled { add_index: Option<String> },
    Error(Value),
    Malformed(String),
}

impl SettlementNotification {
    pub fn decode(line: &str) -> Self {
        let update: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => return Self::Malformed(format!("not json: {err}")),
        };
        if let Some(error) = update.get("error") {
            return Self::Error(error.clone());
        }
        let invoice = match update.get("result") {
            Some(invoice) if invoice.is_object() => invoice,
            _ => return Self::Malformed("no 'result' object".to_string()),
        };
        let settled = match invoice.get("settled").and_then(Value::as_bool) {
            Some(settled) => settled,
            None => return Self::Malformed("no 'settled' flag".to_string()),
        };
        let add_index = invoice.get("add_index").and_then(int_string);
        if !settled {
            return Self::Unsettled { add_index };
        }
        let add_index = match add_index {
            Some(add_index) => add_index,
            None => return Self::Malformed("no 'add_index'".to_string()),
        };
        let payment_request = match invoice.get("payment_request").and_then(Value::as_str) {
            Some(pr) => pr.to_string(),
            None => return Self::Malformed("no 'payment_request'".to_string()),
        };
        let settle_date = match invoice.get("settle_date").and_then(int_u64) {
            Some(date) => date,
            None => return Self::Malformed("no 'settle_date'".to_string()),
        };
        Self::Settled(SettledInvoice {
            add_index,
            payment_request,
            settle_date,
            raw: invoice.clone(),
        })
    }
}
