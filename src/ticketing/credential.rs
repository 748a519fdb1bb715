//! Ticket Credentials
//!
//! A credential is a derived view over a Completed transaction and its
//! event, never stored. Losing a rendered ticket costs nothing: the holder
//! re-fetches by receipt number and gets an equivalent credential.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::ticketing::error::TicketingError;
use crate::ticketing::types::{
    EventRecord, TicketCredential, TransactionRecord, TransactionStatus,
};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Credential serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Turns a credential into the payload a QR rasterizer consumes. Pure CPU,
/// so the seam is a plain sync trait.
pub trait CredentialEncoder: Send + Sync {
    fn encode(&self, credential: &TicketCredential) -> Result<String, EncodeError>;
}

/// Default encoder: compact JSON of the credential fields.
pub struct JsonCredentialEncoder;

impl CredentialEncoder for JsonCredentialEncoder {
    fn encode(&self, credential: &TicketCredential) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(&WirePayload::from(credential))?)
    }
}

/// Short-keyed wire form keeps the QR payload small.
#[derive(Serialize)]
struct WirePayload<'a> {
    r: &'a str,
    e: String,
    n: &'a str,
    h: &'a str,
    t: u32,
    at: i64,
}

impl<'a> From<&'a TicketCredential> for WirePayload<'a> {
    fn from(c: &'a TicketCredential) -> Self {
        Self {
            r: &c.receipt_number,
            e: c.event_id.to_string(),
            n: &c.event_name,
            h: &c.holder_name,
            t: c.ticket_count,
            at: c.issued_at.timestamp(),
        }
    }
}

pub struct TicketIssuer;

impl TicketIssuer {
    /// Mint the credential view for a paid transaction. Only Completed rows
    /// carry a receipt; anything else is refused as unpaid.
    pub fn issue(
        txn: &TransactionRecord,
        event: &EventRecord,
    ) -> Result<TicketCredential, TicketingError> {
        let receipt_number = match (txn.status, &txn.receipt_number) {
            (TransactionStatus::Completed, Some(receipt)) => receipt.clone(),
            _ => return Err(TicketingError::NotPaid),
        };

        Ok(TicketCredential {
            receipt_number,
            event_id: event.id,
            event_name: event.name.clone(),
            holder_name: txn
                .customer_name
                .clone()
                .unwrap_or_else(|| "Customer".to_string()),
            ticket_count: txn.ticket_count,
            issued_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticketing::types::{EventId, PaymentRequest};
    use rust_decimal_macros::dec;

    fn completed_txn(event_id: EventId, name: Option<&str>) -> TransactionRecord {
        let mut req = PaymentRequest::new("0712345678", dec!(2500), event_id);
        req.customer_name = name.map(str::to_string);
        let mut txn =
            TransactionRecord::pending("ws_CO_1", None, "TICKET_X_1", "254712345678", &req);
        txn.status = TransactionStatus::Completed;
        txn.receipt_number = Some("NLJ7RT61SV".to_string());
        txn.completed_at = Some(Utc::now());
        txn
    }

    fn event() -> EventRecord {
        EventRecord::new(
            "Nairobi Jazz Festival",
            "",
            "Uhuru Gardens",
            "Nairobi",
            Utc::now(),
            dec!(2500),
            100,
        )
    }

    #[test]
    fn test_issue_from_completed_transaction() {
        let event = event();
        let txn = completed_txn(event.id, Some("Jane Wanjiku"));

        let credential = TicketIssuer::issue(&txn, &event).unwrap();
        assert_eq!(credential.receipt_number, "NLJ7RT61SV");
        assert_eq!(credential.event_name, "Nairobi Jazz Festival");
        assert_eq!(credential.holder_name, "Jane Wanjiku");
        assert_eq!(credential.ticket_count, 1);
    }

    #[test]
    fn test_anonymous_holder_fallback() {
        let event = event();
        let txn = completed_txn(event.id, None);

        let credential = TicketIssuer::issue(&txn, &event).unwrap();
        assert_eq!(credential.holder_name, "Customer");
    }

    #[test]
    fn test_issue_refuses_unpaid() {
        let event = event();
        let req = PaymentRequest::new("0712345678", dec!(2500), event.id);
        let pending =
            TransactionRecord::pending("ws_CO_2", None, "TICKET_X_2", "254712345678", &req);

        assert!(matches!(
            TicketIssuer::issue(&pending, &event),
            Err(TicketingError::NotPaid)
        ));
    }

    #[test]
    fn test_json_encoding_carries_receipt() {
        let event = event();
        let txn = completed_txn(event.id, Some("Jane Wanjiku"));
        let credential = TicketIssuer::issue(&txn, &event).unwrap();

        let encoded = JsonCredentialEncoder.encode(&credential).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["r"], "NLJ7RT61SV");
        assert_eq!(value["t"], 1);
        assert_eq!(value["e"], event.id.to_string());
    }
}
