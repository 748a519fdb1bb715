//! Ticketing Core
//!
//! Payment initiation, webhook reconciliation, credential issuance, gate
//! redemption and sales reporting, tied together by [`TicketingService`].
//! The flow of a sale:
//!
//! 1. `initiate_payment` pushes the prompt and persists a Pending
//!    transaction keyed by the gateway's correlation id.
//! 2. The gateway later posts a notice; `handle_gateway_notice` resolves the
//!    row exactly once, committing inventory in the same atomic step.
//! 3. A Completed transaction's receipt mints credentials on demand and is
//!    consumed at the gate exactly once.

pub mod credential;
pub mod error;
pub mod initiation;
pub mod inventory;
pub mod reconcile;
pub mod redemption;
pub mod report;
pub mod service;
pub mod types;

pub use credential::{CredentialEncoder, EncodeError, JsonCredentialEncoder, TicketIssuer};
pub use error::TicketingError;
pub use initiation::PaymentInitiator;
pub use inventory::InventoryLedger;
pub use reconcile::{ReconcileOutcome, ReconciliationEngine};
pub use redemption::{RedemptionGuard, TicketStatusView};
pub use report::{EventSales, SalesReporter, SalesStats};
pub use service::{IssuedTicket, NewEvent, TicketingService};
pub use types::{
    EventId, EventRecord, EventStatus, PaymentHandle, PaymentRequest, TicketCredential,
    TransactionId, TransactionRecord, TransactionStatus,
};
