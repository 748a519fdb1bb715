//! Gate Redemption
//!
//! Consumes tickets at the venue door. Exactly-once: the store applies
//! redemption as one conditional update, so two scanners racing on the same
//! receipt produce one success and one AlreadyUsed, never two entries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::store::{RedeemOutcome, TicketStore};
use crate::ticketing::error::TicketingError;
use crate::ticketing::types::{EventId, TransactionRecord, TransactionStatus};

/// Read-only ticket state for the validation endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TicketStatusView {
    pub receipt_number: String,
    pub event_id: EventId,
    pub holder_name: String,
    pub ticket_count: u32,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

pub struct RedemptionGuard {
    store: Arc<dyn TicketStore>,
}

impl RedemptionGuard {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Consume the ticket. Returns the post-update snapshot on the one call
    /// that wins; every other call gets a discriminated refusal.
    pub async fn redeem(&self, receipt_number: &str) -> Result<TransactionRecord, TicketingError> {
        match self.store.redeem(receipt_number, Utc::now()).await? {
            RedeemOutcome::Redeemed(txn) => {
                info!(
                    receipt = %receipt_number,
                    event_id = %txn.event_id,
                    tickets = txn.ticket_count,
                    "Ticket redeemed"
                );
                Ok(txn)
            }
            RedeemOutcome::NotFound => Err(TicketingError::NotFound),
            RedeemOutcome::NotPaid => Err(TicketingError::NotPaid),
            RedeemOutcome::AlreadyUsed { used_at } => Err(TicketingError::AlreadyUsed { used_at }),
        }
    }

    /// Peek without consuming. A used ticket is reported in the view, not
    /// as an error; scanners decide what to do with it.
    pub async fn validate(&self, receipt_number: &str) -> Result<TicketStatusView, TicketingError> {
        let txn = self
            .store
            .transaction_by_receipt(receipt_number)
            .await?
            .ok_or(TicketingError::NotFound)?;

        if txn.status != TransactionStatus::Completed {
            return Err(TicketingError::NotPaid);
        }

        Ok(TicketStatusView {
            receipt_number: receipt_number.to_string(),
            event_id: txn.event_id,
            holder_name: txn
                .customer_name
                .unwrap_or_else(|| "Customer".to_string()),
            ticket_count: txn.ticket_count,
            used: txn.used,
            used_at: txn.used_at,
        })
    }
}
