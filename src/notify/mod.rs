//! Ticket Delivery
//!
//! Outbound customer messaging behind a trait so the reconciliation path can
//! hand off a confirmed ticket without caring about the transport. Delivery
//! is fire-and-forget from the caller's point of view: a slow or failing
//! notifier must never hold up or roll back a confirmed payment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Everything a delivery template needs, assembled at issuance time so the
/// notifier never reaches back into the store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TicketNotice {
    pub holder_name: String,
    pub event_name: String,
    pub event_date: DateTime<Utc>,
    pub venue: String,
    pub ticket_count: u32,
    pub amount_paid: Decimal,
    pub receipt_number: String,
    /// Encoded credential payload, rendered as a QR code downstream.
    pub credential: String,
}

#[async_trait]
pub trait TicketNotifier: Send + Sync {
    /// Deliver an issued ticket to the buyer.
    async fn send_ticket(&self, recipient: &str, notice: &TicketNotice) -> Result<(), NotifyError>;

    /// Deliver an account verification link token.
    async fn send_verification(&self, recipient: &str, token: &str) -> Result<(), NotifyError>;
}

/// Default transport: writes the message to the structured log. Stands in
/// for a real mail/SMS integration in dev and sandbox environments.
pub struct LogNotifier;

#[async_trait]
impl TicketNotifier for LogNotifier {
    async fn send_ticket(&self, recipient: &str, notice: &TicketNotice) -> Result<(), NotifyError> {
        info!(
            recipient = %recipient,
            event = %notice.event_name,
            receipt = %notice.receipt_number,
            tickets = notice.ticket_count,
            amount = %notice.amount_paid,
            "Ticket delivered"
        );
        Ok(())
    }

    async fn send_verification(&self, recipient: &str, token: &str) -> Result<(), NotifyError> {
        info!(recipient = %recipient, token = %token, "Verification message delivered");
        Ok(())
    }
}

/// Test notifier with failure and hang injection.
pub struct MockNotifier {
    should_fail: AtomicBool,
    should_hang: AtomicBool,
    ticket_count: AtomicUsize,
    verification_count: AtomicUsize,
    sent: Mutex<Vec<(String, TicketNotice)>>,
    verification_tokens: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            should_hang: AtomicBool::new(false),
            ticket_count: AtomicUsize::new(0),
            verification_count: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            verification_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// When set, sends park for a minute before completing. Callers that
    /// correctly detach delivery stay fast; callers that await it stall.
    pub fn set_hang(&self, hang: bool) {
        self.should_hang.store(hang, Ordering::SeqCst);
    }

    pub fn tickets_sent(&self) -> usize {
        self.ticket_count.load(Ordering::SeqCst)
    }

    pub fn verifications_sent(&self) -> usize {
        self.verification_count.load(Ordering::SeqCst)
    }

    pub fn sent_notices(&self) -> Vec<(String, TicketNotice)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_verification_token(&self) -> Option<String> {
        self.verification_tokens
            .lock()
            .unwrap()
            .last()
            .map(|(_, token)| token.clone())
    }

    async fn gate(&self) -> Result<(), NotifyError> {
        if self.should_hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("mock transport down".to_string()));
        }
        Ok(())
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketNotifier for MockNotifier {
    async fn send_ticket(&self, recipient: &str, notice: &TicketNotice) -> Result<(), NotifyError> {
        self.gate().await?;
        self.ticket_count.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), notice.clone()));
        Ok(())
    }

    async fn send_verification(&self, recipient: &str, token: &str) -> Result<(), NotifyError> {
        self.gate().await?;
        self.verification_count.fetch_add(1, Ordering::SeqCst);
        self.verification_tokens
            .lock()
            .unwrap()
            .push((recipient.to_string(), token.to_string()));
        Ok(())
    }
}
