//! Ticketing Core Types
//!
//! Type definitions for events, payment transactions and ticket credentials.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event ID - ULID-based unique identifier
///
/// ULIDs are sortable and need no coordination, so events minted on any
/// node (or seeded at startup) can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(ulid::Ulid);

impl EventId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Transaction ID - internal primary key for payment transactions
///
/// Distinct from the gateway's correlation id: the correlation id is assigned
/// by the gateway at push time and is what webhooks are matched on; this id
/// exists before the gateway ever answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Payment transaction lifecycle state.
///
/// Transitions are one-directional: Pending -> Completed or Pending -> Failed.
/// Both Completed and Failed are terminal; nothing ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// STK push accepted by the gateway, awaiting the confirmation webhook
    Pending,
    /// Payment confirmed, inventory committed, credential issuable
    Completed,
    /// Payment declined/cancelled/timed out, or sold out before confirmation
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event visibility state. Only Active events are listed and sellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Closed,
}

/// An event with a fixed ticket capacity.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: EventId,
    pub name: String,
    pub description: String,
    pub venue: String,
    pub city: String,
    pub starts_at: DateTime<Utc>,
    /// Price per ticket in KES
    pub price: Decimal,
    pub capacity: u32,
    /// Tickets durably sold. Invariant: tickets_sold <= capacity, enforced by
    /// the store's guarded commit, never by callers.
    pub tickets_sold: u32,
    /// Featured events sort first in the catalog listing
    pub featured: bool,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        venue: impl Into<String>,
        city: impl Into<String>,
        starts_at: DateTime<Utc>,
        price: Decimal,
        capacity: u32,
    ) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            description: description.into(),
            venue: venue.into(),
            city: city.into(),
            starts_at,
            price,
            capacity,
            tickets_sold: 0,
            featured: false,
            status: EventStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Derived, never stored.
    #[inline]
    pub fn tickets_available(&self) -> u32 {
        self.capacity.saturating_sub(self.tickets_sold)
    }

    #[inline]
    pub fn has_capacity_for(&self, count: u32) -> bool {
        self.tickets_sold + count <= self.capacity
    }
}

/// A payment attempt and, once confirmed, a sold ticket.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    /// Gateway-assigned CheckoutRequestID. Unique; the only key webhook
    /// reconciliation trusts.
    pub correlation_id: String,
    pub merchant_request_id: Option<String>,
    /// Caller reference, `TICKET_{event}_{millis}`
    pub reference: String,
    /// Normalized payer phone
    pub phone: String,
    pub amount: Decimal,
    pub event_id: EventId,
    pub ticket_count: u32,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub status: TransactionStatus,
    /// Gateway receipt, set exactly once at completion
    pub receipt_number: Option<String>,
    /// Gateway result description or internal reason, set at failure
    pub failure_reason: Option<String>,
    /// Redemption flag; flips false -> true exactly once, only while Completed
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Create a Pending transaction for an accepted STK push.
    pub fn pending(
        correlation_id: impl Into<String>,
        merchant_request_id: Option<String>,
        reference: impl Into<String>,
        phone: impl Into<String>,
        req: &PaymentRequest,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            correlation_id: correlation_id.into(),
            merchant_request_id,
            reference: reference.into(),
            phone: phone.into(),
            amount: req.amount,
            event_id: req.event_id,
            ticket_count: req.ticket_count,
            customer_name: req.customer_name.clone(),
            customer_email: req.customer_email.clone(),
            status: TransactionStatus::Pending,
            receipt_number: None,
            failure_reason: None,
            used: false,
            used_at: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Txn[{}] ref={} event={} tickets={} amount={} status={}",
            self.correlation_id,
            self.reference,
            self.event_id,
            self.ticket_count,
            self.amount,
            self.status
        )
    }
}

/// Payment initiation input, already past REST validation.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Raw phone as entered; normalized by the initiator
    pub phone: String,
    pub amount: Decimal,
    pub event_id: EventId,
    pub ticket_count: u32,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

impl PaymentRequest {
    pub fn new(phone: impl Into<String>, amount: Decimal, event_id: EventId) -> Self {
        Self {
            phone: phone.into(),
            amount,
            event_id,
            ticket_count: 1,
            customer_name: None,
            customer_email: None,
        }
    }
}

/// What the caller gets back from a successful initiation: the push is on the
/// customer's phone, the transaction is Pending under `correlation_id`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHandle {
    pub transaction_id: TransactionId,
    pub reference: String,
    pub correlation_id: String,
    pub customer_message: String,
}

/// Derived ticket view for QR encoding. Never persisted: regenerable at any
/// time from a Completed transaction and its event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCredential {
    pub receipt_number: String,
    pub event_id: EventId,
    pub event_name: String,
    pub holder_name: String,
    pub ticket_count: u32,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_id_uniqueness() {
        assert_ne!(EventId::new(), EventId::new());
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn test_id_string_roundtrip() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);

        assert!("not-a-ulid!".parse::<EventId>().is_err());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_event_capacity_arithmetic() {
        let mut event = EventRecord::new(
            "Test Gig",
            "",
            "Uhuru Gardens",
            "Nairobi",
            Utc::now(),
            dec!(1000),
            100,
        );
        assert_eq!(event.tickets_available(), 100);
        assert!(event.has_capacity_for(100));
        assert!(!event.has_capacity_for(101));

        event.tickets_sold = 98;
        assert_eq!(event.tickets_available(), 2);
        assert!(event.has_capacity_for(2));
        assert!(!event.has_capacity_for(3));
    }

    #[test]
    fn test_pending_transaction_defaults() {
        let req = PaymentRequest::new("0712345678", dec!(2500), EventId::new());
        let txn = TransactionRecord::pending(
            "ws_CO_191220191020363925",
            Some("29115-34620561-1".to_string()),
            "TICKET_X_1",
            "254712345678",
            &req,
        );

        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.ticket_count, 1);
        assert!(txn.receipt_number.is_none());
        assert!(!txn.used);
        assert!(txn.completed_at.is_none());
    }
}
