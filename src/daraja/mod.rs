//! Daraja (M-Pesa) Gateway Module
//!
//! Outbound STK push client and inbound confirmation-webhook types for the
//! Safaricom Daraja API. The rest of the crate talks to the gateway only
//! through the [`PaymentGateway`] trait; the HTTP client and the sandbox
//! quirks stay in here.

pub mod callback;
pub mod client;

pub use callback::{CallbackAck, CallbackEnvelope, CallbackError, CallbackMetadata, StkCallback};
pub use client::{DarajaClient, DarajaError, MockGateway, PaymentGateway, StkPushResponse};
