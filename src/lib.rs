//! Tiketi - Event Ticketing Backend
//!
//! Ticket sales over M-Pesa STK push: the customer gets a payment prompt on
//! their phone, the gateway confirms asynchronously over a webhook, and
//! confirmed payments become QR-encodable ticket credentials redeemed once
//! at the gate.
//!
//! # Modules
//!
//! - [`ticketing`] - Payment initiation, webhook reconciliation, issuance,
//!   redemption, reporting
//! - [`daraja`] - Safaricom Daraja (M-Pesa) client and callback wire types
//! - [`store`] - Persistence trait and the in-memory implementation
//! - [`notify`] - Ticket/verification delivery behind a trait
//! - [`accounts`] - Customer registration, verification, login
//! - [`rest`] - Axum HTTP surface
//! - [`phone`] - Subscriber number normalization
//!
//! The whole payment lifecycle hangs on one identifier: the gateway's
//! CheckoutRequestID, assigned at push time and carried by every webhook.
//! Reconciliation trusts nothing else.

pub mod accounts;
pub mod config;
pub mod daraja;
pub mod logging;
pub mod notify;
pub mod phone;
pub mod rest;
pub mod store;
pub mod ticketing;

// Convenient re-exports at crate root
pub use accounts::{AccountRecord, AccountService};
pub use config::AppConfig;
pub use daraja::{DarajaClient, MockGateway, PaymentGateway, StkCallback};
pub use notify::{LogNotifier, MockNotifier, TicketNotifier};
pub use phone::PhoneNormalizer;
pub use store::{MemoryStore, TicketStore};
pub use ticketing::{
    EventId, EventRecord, JsonCredentialEncoder, PaymentHandle, PaymentRequest, ReconcileOutcome,
    TicketCredential, TicketingError, TicketingService, TransactionId, TransactionRecord,
    TransactionStatus,
};
