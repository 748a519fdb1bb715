//! Ticket Store
//!
//! Persistence contract for events, transactions and accounts. The concrete
//! backend is swappable; what is NOT negotiable is the conditional-update
//! primitives: `complete_pending`, `fail_pending`, `redeem` and
//! `commit_tickets` must each be a single atomic check-and-write (one SQL
//! conditional UPDATE, or an equivalent single-writer step). Reconciliation
//! correctness rests on them, not on any in-process locking.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::accounts::AccountRecord;
use crate::ticketing::types::{EventId, EventRecord, TransactionRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-key violation on the gateway correlation id.
    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelation(String),

    #[error("Duplicate email: {0}")]
    DuplicateEmail(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result of the confirmation-time atomic step.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Status flipped Pending -> Completed and the tickets were committed to
    /// the event in the same step. Carries post-update snapshots for
    /// issuance and notification.
    Applied {
        transaction: TransactionRecord,
        event: EventRecord,
    },
    /// The row was already terminal; nothing changed.
    AlreadyResolved,
    /// Earlier confirmations exhausted capacity first. The row was flipped
    /// Pending -> Failed in the same step (first-confirmed-wins); the payment
    /// needs an out-of-band refund.
    SoldOut,
    /// The transaction references an event that no longer exists; the row was
    /// flipped Pending -> Failed.
    EventMissing,
    /// No transaction under this correlation id.
    NotFound,
}

/// Result of the redemption conditional update.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    /// This call consumed the ticket. Carries the post-update snapshot.
    Redeemed(TransactionRecord),
    NotFound,
    /// Receipt exists but the transaction never completed payment.
    NotPaid,
    AlreadyUsed { used_at: DateTime<Utc> },
}

/// Persistence operations required by the ticketing core.
#[async_trait]
pub trait TicketStore: Send + Sync {
    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    async fn insert_event(&self, event: EventRecord) -> Result<(), StoreError>;

    async fn event(&self, id: EventId) -> Result<Option<EventRecord>, StoreError>;

    /// Active events, featured first then soonest start date.
    async fn active_events(&self) -> Result<Vec<EventRecord>, StoreError>;

    /// Every event regardless of status, soonest start date first. Reporting
    /// needs closed events too.
    async fn all_events(&self) -> Result<Vec<EventRecord>, StoreError>;

    async fn event_count(&self) -> Result<usize, StoreError>;

    /// Guarded increment: `tickets_sold += count` only while
    /// `tickets_sold + count <= capacity`. Returns whether it applied.
    async fn commit_tickets(&self, event_id: EventId, count: u32) -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Insert keyed by correlation id; a duplicate is
    /// [`StoreError::DuplicateCorrelation`].
    async fn insert_transaction(&self, txn: TransactionRecord) -> Result<(), StoreError>;

    async fn transaction_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn transaction_by_receipt(
        &self,
        receipt_number: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// Newest first.
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Newest first, exact match on the normalized phone.
    async fn transactions_by_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError>;

    // ------------------------------------------------------------------
    // Conditional primitives
    // ------------------------------------------------------------------

    /// The confirmation step: in one atomic unit, require `status == Pending`,
    /// re-validate event capacity, increment `tickets_sold`, and set
    /// Completed + receipt + completed_at. When capacity is already gone the
    /// same unit flips the row to Failed instead. Concurrent duplicate
    /// notices must resolve to exactly one `Applied`.
    async fn complete_pending(
        &self,
        correlation_id: &str,
        receipt_number: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StoreError>;

    /// Conditional `Pending -> Failed` with a reason. Returns whether it
    /// applied; false means the row was missing or already terminal.
    async fn fail_pending(&self, correlation_id: &str, reason: &str) -> Result<bool, StoreError>;

    /// Conditional redemption: `used = true, used_at = at` only where
    /// `receipt_number` matches, status is Completed and `used` is false.
    /// Zero-match is discriminated for reporting.
    async fn redeem(
        &self,
        receipt_number: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError>;

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert keyed by email; a duplicate is [`StoreError::DuplicateEmail`].
    async fn insert_account(&self, account: AccountRecord) -> Result<(), StoreError>;

    async fn account_by_email(&self, email: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Single-use verification: marks the account verified and clears the
    /// token. Returns false for an unknown (or already spent) token.
    async fn verify_account(&self, token: &str) -> Result<bool, StoreError>;

    async fn touch_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}
