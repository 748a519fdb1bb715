//! Ticketing Error Taxonomy
//!
//! One enum for the whole payment/issuance/redemption surface. Callers that
//! must always acknowledge (the webhook path) log these instead of
//! propagating them to the gateway.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TicketingError {
    /// Rejected before any external call: bad phone, bad amount, zero ticket
    /// count, unknown or closed event.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough tickets left at initiation or confirmation time.
    #[error("Insufficient capacity: {available} tickets left")]
    InsufficientCapacity { available: u32 },

    /// The push could not be submitted; nothing was persisted.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A notice arrived for a correlation id we never issued.
    #[error("No transaction matches correlation id {0}")]
    ReconciliationMismatch(String),

    /// The transaction already reached a terminal state.
    #[error("Transaction already resolved")]
    AlreadyResolved,

    /// Redemption: ticket was already consumed.
    #[error("Ticket already used at {used_at}")]
    AlreadyUsed { used_at: DateTime<Utc> },

    /// Redemption: transaction exists but never completed payment.
    #[error("Ticket is not paid for")]
    NotPaid,

    /// Unknown receipt number, reference or transaction.
    #[error("Not found")]
    NotFound,

    /// Credential payload could not be serialized.
    #[error("Credential encoding failed: {0}")]
    Encode(#[from] crate::ticketing::credential::EncodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TicketingError {
    /// Stable machine-readable code, used by the REST layer's error mapping.
    pub fn code(&self) -> &'static str {
        match self {
            TicketingError::InvalidInput(_) => "INVALID_INPUT",
            TicketingError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            TicketingError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            TicketingError::ReconciliationMismatch(_) => "RECONCILIATION_MISMATCH",
            TicketingError::AlreadyResolved => "ALREADY_RESOLVED",
            TicketingError::AlreadyUsed { .. } => "ALREADY_USED",
            TicketingError::NotPaid => "NOT_PAID",
            TicketingError::NotFound => "NOT_FOUND",
            TicketingError::Encode(_) => "ENCODE_ERROR",
            TicketingError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            TicketingError::InvalidInput(_) => 400,
            TicketingError::InsufficientCapacity { .. } => 409,
            TicketingError::GatewayUnavailable(_) => 502,
            TicketingError::ReconciliationMismatch(_) => 404,
            TicketingError::AlreadyResolved => 409,
            TicketingError::AlreadyUsed { .. } => 409,
            TicketingError::NotPaid => 409,
            TicketingError::NotFound => 404,
            TicketingError::Encode(_) => 500,
            TicketingError::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TicketingError::InvalidInput("bad".into()).http_status(),
            400
        );
        assert_eq!(
            TicketingError::InsufficientCapacity { available: 0 }.http_status(),
            409
        );
        assert_eq!(
            TicketingError::GatewayUnavailable("down".into()).http_status(),
            502
        );
        assert_eq!(TicketingError::NotFound.http_status(), 404);
        assert_eq!(TicketingError::NotPaid.code(), "NOT_PAID");
    }
}
