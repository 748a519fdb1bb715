//! In-Memory Ticket Store
//!
//! DashMap-backed [`TicketStore`] used by the dev server and the test
//! harness. Each conditional primitive runs inside a single row guard, so
//! its check-and-write is atomic per key. Lock order for the one cross-map
//! step (`complete_pending`) is transaction -> event -> receipt index;
//! no other path acquires a second guard while holding one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{CompletionOutcome, RedeemOutcome, StoreError, TicketStore};
use crate::accounts::AccountRecord;
use crate::ticketing::types::{EventId, EventRecord, TransactionRecord, TransactionStatus};

pub struct MemoryStore {
    events: DashMap<EventId, EventRecord>,
    /// Keyed by gateway correlation id (the webhook lookup key)
    transactions: DashMap<String, TransactionRecord>,
    /// receipt number -> correlation id, maintained at completion
    receipts: DashMap<String, String>,
    /// Keyed by lowercase email
    accounts: DashMap<String, AccountRecord>,
    /// verification token -> email
    verification_tokens: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            transactions: DashMap::new(),
            receipts: DashMap::new(),
            accounts: DashMap::new(),
            verification_tokens: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_event(&self, event: EventRecord) -> Result<(), StoreError> {
        self.events.insert(event.id, event);
        Ok(())
    }

    async fn event(&self, id: EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.events.get(&id).map(|e| e.value().clone()))
    }

    async fn active_events(&self) -> Result<Vec<EventRecord>, StoreError> {
        let mut events: Vec<EventRecord> = self
            .events
            .iter()
            .filter(|e| e.status == crate::ticketing::types::EventStatus::Active)
            .map(|e| e.value().clone())
            .collect();
        events.sort_by(|a, b| {
            b.featured
                .cmp(&a.featured)
                .then(a.starts_at.cmp(&b.starts_at))
        });
        Ok(events)
    }

    async fn all_events(&self) -> Result<Vec<EventRecord>, StoreError> {
        let mut events: Vec<EventRecord> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(events)
    }

    async fn event_count(&self) -> Result<usize, StoreError> {
        Ok(self.events.len())
    }

    async fn commit_tickets(&self, event_id: EventId, count: u32) -> Result<bool, StoreError> {
        match self.events.get_mut(&event_id) {
            Some(mut event) => {
                if event.has_capacity_for(count) {
                    event.tickets_sold += count;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => Ok(false),
        }
    }

    async fn insert_transaction(&self, txn: TransactionRecord) -> Result<(), StoreError> {
        match self.transactions.entry(txn.correlation_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::DuplicateCorrelation(txn.correlation_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(txn);
                Ok(())
            }
        }
    }

    async fn transaction_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self
            .transactions
            .get(correlation_id)
            .map(|t| t.value().clone()))
    }

    async fn transaction_by_receipt(
        &self,
        receipt_number: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let correlation_id = self
            .receipts
            .get(receipt_number)
            .map(|r| r.value().clone());
        match correlation_id {
            Some(cid) => self.transaction_by_correlation(&cid).await,
            None => Ok(None),
        }
    }

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self
            .transactions
            .iter()
            .find(|t| t.reference == reference)
            .map(|t| t.value().clone()))
    }

    async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut txns: Vec<TransactionRecord> =
            self.transactions.iter().map(|t| t.value().clone()).collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txns.truncate(limit);
        Ok(txns)
    }

    async fn transactions_by_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut txns: Vec<TransactionRecord> = self
            .transactions
            .iter()
            .filter(|t| t.phone == phone)
            .map(|t| t.value().clone())
            .collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txns)
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self.transactions.iter().map(|t| t.value().clone()).collect())
    }

    async fn complete_pending(
        &self,
        correlation_id: &str,
        receipt_number: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut txn = match self.transactions.get_mut(correlation_id) {
            Some(t) => t,
            None => return Ok(CompletionOutcome::NotFound),
        };

        // The row guard is held for the whole check-and-write, so duplicate
        // notices racing here serialize and exactly one sees Pending.
        if txn.status != TransactionStatus::Pending {
            return Ok(CompletionOutcome::AlreadyResolved);
        }

        let mut event = match self.events.get_mut(&txn.event_id) {
            Some(e) => e,
            None => {
                txn.status = TransactionStatus::Failed;
                txn.failure_reason = Some("event missing at confirmation".to_string());
                return Ok(CompletionOutcome::EventMissing);
            }
        };

        if !event.has_capacity_for(txn.ticket_count) {
            // First-confirmed-wins: earlier confirmations took the last
            // seats, this payment fails and must be refunded out of band.
            txn.status = TransactionStatus::Failed;
            txn.failure_reason = Some("sold out before confirmation".to_string());
            return Ok(CompletionOutcome::SoldOut);
        }

        event.tickets_sold += txn.ticket_count;
        txn.status = TransactionStatus::Completed;
        txn.receipt_number = Some(receipt_number.to_string());
        txn.completed_at = Some(completed_at);

        self.receipts
            .insert(receipt_number.to_string(), correlation_id.to_string());

        Ok(CompletionOutcome::Applied {
            transaction: txn.clone(),
            event: event.clone(),
        })
    }

    async fn fail_pending(&self, correlation_id: &str, reason: &str) -> Result<bool, StoreError> {
        match self.transactions.get_mut(correlation_id) {
            Some(mut txn) if txn.status == TransactionStatus::Pending => {
                txn.status = TransactionStatus::Failed;
                txn.failure_reason = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn redeem(
        &self,
        receipt_number: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        // Copy the correlation id out so no receipts guard is held while the
        // transaction guard is taken.
        let correlation_id = self
            .receipts
            .get(receipt_number)
            .map(|r| r.value().clone());
        let Some(correlation_id) = correlation_id else {
            return Ok(RedeemOutcome::NotFound);
        };

        let mut txn = match self.transactions.get_mut(&correlation_id) {
            Some(t) => t,
            None => return Ok(RedeemOutcome::NotFound),
        };

        if txn.status != TransactionStatus::Completed {
            return Ok(RedeemOutcome::NotPaid);
        }
        if txn.used {
            return Ok(RedeemOutcome::AlreadyUsed {
                used_at: txn.used_at.unwrap_or(at),
            });
        }

        txn.used = true;
        txn.used_at = Some(at);
        Ok(RedeemOutcome::Redeemed(txn.clone()))
    }

    async fn insert_account(&self, account: AccountRecord) -> Result<(), StoreError> {
        let key = account.email.to_lowercase();
        match self.accounts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::DuplicateEmail(account.email))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                if let Some(token) = &account.verification_token {
                    self.verification_tokens
                        .insert(token.clone(), account.email.to_lowercase());
                }
                slot.insert(account);
                Ok(())
            }
        }
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.value().clone()))
    }

    async fn verify_account(&self, token: &str) -> Result<bool, StoreError> {
        // remove() makes the token single-use even under concurrent calls
        let Some((_, email)) = self.verification_tokens.remove(token) else {
            return Ok(false);
        };
        match self.accounts.get_mut(&email) {
            Some(mut account) => {
                account.verified = true;
                account.verification_token = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut account) = self.accounts.get_mut(&email.to_lowercase()) {
            account.last_login = Some(at);
        }
        Ok(())
    }
}
