//! Webhook Reconciliation
//!
//! Applies asynchronous payment notices to pending transactions. Notices are
//! at-least-once and unordered, so every expected condition (duplicate,
//! unknown correlation id, malformed payload) is a reported outcome rather
//! than an error, and the caller acknowledges the gateway no matter what.
//!
//! The race that matters: two notices for one correlation id, or two
//! confirmations competing for the last ticket. Both are settled by the
//! store's conditional `complete_pending` step, never by the advisory reads
//! here.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::daraja::StkCallback;
use crate::notify::{TicketNotice, TicketNotifier};
use crate::store::{CompletionOutcome, TicketStore};
use crate::ticketing::credential::{CredentialEncoder, TicketIssuer};
use crate::ticketing::error::TicketingError;
use crate::ticketing::types::{EventRecord, TransactionRecord};

/// What a notice did. Everything here is an expected condition of an
/// at-least-once webhook feed; none of them fail the HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Pending -> Completed: inventory committed, credential issuable,
    /// delivery dispatched.
    Completed { receipt_number: String },
    /// Pending -> Failed on a non-zero result code.
    Failed,
    /// The transaction was already terminal; nothing changed.
    Duplicate,
    /// No transaction under this correlation id.
    Unmatched,
    /// Confirmed payment lost the capacity race; row Failed, refund owed.
    SoldOut,
    /// Success notice missing its receipt; row left Pending for a retry.
    Malformed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Completed { .. } => "completed",
            ReconcileOutcome::Failed => "failed",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Unmatched => "unmatched",
            ReconcileOutcome::SoldOut => "sold_out",
            ReconcileOutcome::Malformed => "malformed",
        }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn TicketNotifier>,
    encoder: Arc<dyn CredentialEncoder>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn TicketNotifier>,
        encoder: Arc<dyn CredentialEncoder>,
    ) -> Self {
        Self {
            store,
            notifier,
            encoder,
        }
    }

    /// Apply one notice. `Err` means the store itself failed; every payment
    /// condition comes back as an outcome.
    pub async fn process(&self, notice: &StkCallback) -> Result<ReconcileOutcome, TicketingError> {
        let correlation_id = notice.checkout_request_id.as_str();

        let Some(txn) = self.store.transaction_by_correlation(correlation_id).await? else {
            warn!(
                correlation_id = %correlation_id,
                result_code = notice.result_code,
                "Notice for unknown correlation id"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        // Advisory fast path; the conditional update below is the real gate.
        if txn.status.is_terminal() {
            debug!(
                correlation_id = %correlation_id,
                status = %txn.status,
                "Duplicate notice for resolved transaction"
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        if notice.is_success() {
            self.apply_success(notice, &txn).await
        } else {
            self.apply_failure(notice).await
        }
    }

    async fn apply_success(
        &self,
        notice: &StkCallback,
        txn: &TransactionRecord,
    ) -> Result<ReconcileOutcome, TicketingError> {
        let correlation_id = notice.checkout_request_id.as_str();

        let receipt = match notice.receipt_number() {
            Ok(receipt) => receipt,
            Err(err) => {
                error!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "Success notice without a usable receipt, leaving transaction pending"
                );
                return Ok(ReconcileOutcome::Malformed);
            }
        };

        // The gateway is the authority on money moved; a mismatch is flagged
        // for audit but does not block the ticket.
        if let Ok(confirmed) = notice.amount()
            && confirmed != txn.amount
        {
            warn!(
                correlation_id = %correlation_id,
                initiated = %txn.amount,
                confirmed = %confirmed,
                "Confirmed amount differs from initiated amount"
            );
        }

        match self
            .store
            .complete_pending(correlation_id, &receipt, Utc::now())
            .await?
        {
            CompletionOutcome::Applied { transaction, event } => {
                info!(
                    correlation_id = %correlation_id,
                    receipt = %receipt,
                    event = %event.name,
                    tickets = transaction.ticket_count,
                    sold = event.tickets_sold,
                    "Payment confirmed, tickets committed"
                );
                self.dispatch_ticket(transaction, event);
                Ok(ReconcileOutcome::Completed {
                    receipt_number: receipt,
                })
            }
            CompletionOutcome::AlreadyResolved => Ok(ReconcileOutcome::Duplicate),
            CompletionOutcome::SoldOut => {
                error!(
                    correlation_id = %correlation_id,
                    receipt = %receipt,
                    "Confirmed payment lost the capacity race, refund required"
                );
                Ok(ReconcileOutcome::SoldOut)
            }
            CompletionOutcome::EventMissing => {
                error!(
                    correlation_id = %correlation_id,
                    receipt = %receipt,
                    "Confirmed payment references a missing event, refund required"
                );
                Ok(ReconcileOutcome::Failed)
            }
            CompletionOutcome::NotFound => Ok(ReconcileOutcome::Unmatched),
        }
    }

    async fn apply_failure(&self, notice: &StkCallback) -> Result<ReconcileOutcome, TicketingError> {
        let correlation_id = notice.checkout_request_id.as_str();

        if self
            .store
            .fail_pending(correlation_id, &notice.result_desc)
            .await?
        {
            info!(
                correlation_id = %correlation_id,
                result_code = notice.result_code,
                reason = %notice.result_desc,
                "Payment failed"
            );
            Ok(ReconcileOutcome::Failed)
        } else {
            Ok(ReconcileOutcome::Duplicate)
        }
    }

    /// Fire-and-forget delivery. A failing or hanging notifier must never
    /// touch the completed transaction or delay the webhook ack.
    fn dispatch_ticket(&self, txn: TransactionRecord, event: EventRecord) {
        let Some(recipient) = txn.customer_email.clone() else {
            debug!(
                correlation_id = %txn.correlation_id,
                "No customer email on file, skipping delivery"
            );
            return;
        };

        let credential = match TicketIssuer::issue(&txn, &event) {
            Ok(credential) => credential,
            Err(err) => {
                error!(correlation_id = %txn.correlation_id, error = %err, "Credential mint failed");
                return;
            }
        };
        let encoded = match self.encoder.encode(&credential) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(correlation_id = %txn.correlation_id, error = %err, "Credential encode failed");
                return;
            }
        };

        let notice = TicketNotice {
            holder_name: credential.holder_name,
            event_name: event.name,
            event_date: event.starts_at,
            venue: event.venue,
            ticket_count: txn.ticket_count,
            amount_paid: txn.amount,
            receipt_number: credential.receipt_number,
            credential: encoded,
        };

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.send_ticket(&recipient, &notice).await {
                warn!(
                    receipt = %notice.receipt_number,
                    error = %err,
                    "Ticket delivery failed, credential remains issuable"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;
    use crate::store::MemoryStore;
    use crate::ticketing::credential::JsonCredentialEncoder;
    use crate::ticketing::types::{
        EventId, PaymentRequest, TransactionStatus,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<MockNotifier>,
        engine: ReconciliationEngine,
        event_id: EventId,
    }

    async fn fixture(capacity: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let event = crate::ticketing::types::EventRecord::new(
            "Nairobi Jazz Festival",
            "",
            "Uhuru Gardens",
            "Nairobi",
            Utc::now(),
            dec!(2500),
            capacity,
        );
        let event_id = event.id;
        store.insert_event(event).await.unwrap();

        let engine = ReconciliationEngine::new(
            Arc::clone(&store) as Arc<dyn TicketStore>,
            Arc::clone(&notifier) as Arc<dyn TicketNotifier>,
            Arc::new(JsonCredentialEncoder),
        );
        Fixture {
            store,
            notifier,
            engine,
            event_id,
        }
    }

    async fn seed_pending(fx: &Fixture, correlation_id: &str, amount: Decimal) {
        let mut req = PaymentRequest::new("0712345678", amount, fx.event_id);
        req.customer_name = Some("Jane Wanjiku".to_string());
        req.customer_email = Some("jane@example.com".to_string());
        let txn = TransactionRecord::pending(
            correlation_id,
            Some("29115-1-1".to_string()),
            format!("TICKET_{}_1", fx.event_id),
            "254712345678",
            &req,
        );
        fx.store.insert_transaction(txn).await.unwrap();
    }

    async fn wait_for_delivery(notifier: &MockNotifier, expected: usize) {
        for _ in 0..100 {
            if notifier.tickets_sent() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("delivery never reached {expected}");
    }

    #[tokio::test]
    async fn test_success_notice_completes_and_commits() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        let outcome = fx.engine.process(&notice).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed {
                receipt_number: "NLJ7RT61SV".to_string()
            }
        );

        let txn = fx
            .store
            .transaction_by_correlation("ws_CO_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.receipt_number.as_deref(), Some("NLJ7RT61SV"));
        assert!(txn.completed_at.is_some());

        let event = fx.store.event(fx.event_id).await.unwrap().unwrap();
        assert_eq!(event.tickets_sold, 1);

        wait_for_delivery(&fx.notifier, 1).await;
        let sent = fx.notifier.sent_notices();
        assert_eq!(sent[0].0, "jane@example.com");
        assert_eq!(sent[0].1.receipt_number, "NLJ7RT61SV");
    }

    #[tokio::test]
    async fn test_duplicate_notice_is_noop() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        fx.engine.process(&notice).await.unwrap();
        wait_for_delivery(&fx.notifier, 1).await;

        let outcome = fx.engine.process(&notice).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Duplicate);

        let event = fx.store.event(fx.event_id).await.unwrap().unwrap();
        assert_eq!(event.tickets_sold, 1);
        // Small grace period: no second delivery may sneak in
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fx.notifier.tickets_sent(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_notices_complete_once() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let engine = Arc::new(fx.engine);
        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let notice = notice.clone();
            handles.push(tokio::spawn(
                async move { engine.process(&notice).await },
            ));
        }

        let completed = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(ReconcileOutcome::Completed { .. }))))
            .count();
        assert_eq!(completed, 1);

        let event = fx.store.event(fx.event_id).await.unwrap().unwrap();
        assert_eq!(event.tickets_sold, 1);
        wait_for_delivery(&fx.notifier, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fx.notifier.tickets_sent(), 1);
    }

    #[tokio::test]
    async fn test_failure_notice_fails_without_commit() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let notice = StkCallback::failure("ws_CO_1", 1032, "Request cancelled by user.");
        assert_eq!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Failed
        );

        let txn = fx
            .store
            .transaction_by_correlation("ws_CO_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(txn.status, TransactionStatus::Failed);
        assert_eq!(
            txn.failure_reason.as_deref(),
            Some("Request cancelled by user.")
        );
        assert!(txn.receipt_number.is_none());

        let event = fx.store.event(fx.event_id).await.unwrap().unwrap();
        assert_eq!(event.tickets_sold, 0);
        assert_eq!(fx.notifier.tickets_sent(), 0);
    }

    #[tokio::test]
    async fn test_unknown_correlation_is_unmatched() {
        let fx = fixture(100).await;
        let notice = StkCallback::success("ws_CO_GHOST", "NLJ7RT61SV", dec!(2500));
        assert_eq!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Unmatched
        );
    }

    #[tokio::test]
    async fn test_malformed_success_leaves_pending_for_retry() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let mut notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        if let Some(meta) = notice.callback_metadata.as_mut() {
            meta.item
                .retain(|i| i.name != crate::daraja::callback::FIELD_RECEIPT);
        }
        assert_eq!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Malformed
        );

        let txn = fx
            .store
            .transaction_by_correlation("ws_CO_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(txn.status, TransactionStatus::Pending);

        // A well-formed retry still lands
        let retry = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        assert!(matches!(
            fx.engine.process(&retry).await.unwrap(),
            ReconcileOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_sold_out_at_confirmation_fails_row() {
        let fx = fixture(1).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;
        seed_pending(&fx, "ws_CO_2", dec!(2500)).await;

        let first = StkCallback::success("ws_CO_1", "RKT001", dec!(2500));
        assert!(matches!(
            fx.engine.process(&first).await.unwrap(),
            ReconcileOutcome::Completed { .. }
        ));

        let second = StkCallback::success("ws_CO_2", "RKT002", dec!(2500));
        assert_eq!(
            fx.engine.process(&second).await.unwrap(),
            ReconcileOutcome::SoldOut
        );

        let loser = fx
            .store
            .transaction_by_correlation("ws_CO_2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loser.status, TransactionStatus::Failed);
        assert!(loser.failure_reason.is_some());

        let event = fx.store.event(fx.event_id).await.unwrap().unwrap();
        assert_eq!(event.tickets_sold, 1);
    }

    #[tokio::test]
    async fn test_amount_mismatch_still_completes() {
        let fx = fixture(100).await;
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        // Gateway says 2400 moved; logged, not blocking
        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2400));
        assert!(matches!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_block_completion() {
        let fx = fixture(100).await;
        fx.notifier.set_fail(true);
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        assert!(matches!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Completed { .. }
        ));

        let txn = fx
            .store
            .transaction_by_correlation("ws_CO_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(fx.notifier.tickets_sent(), 0);
    }

    #[tokio::test]
    async fn test_hanging_notifier_does_not_delay_reconciliation() {
        let fx = fixture(100).await;
        fx.notifier.set_hang(true);
        seed_pending(&fx, "ws_CO_1", dec!(2500)).await;

        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        let outcome = tokio::time::timeout(Duration::from_secs(1), fx.engine.process(&notice))
            .await
            .expect("reconciliation must not wait on delivery")
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_no_email_skips_delivery() {
        let fx = fixture(100).await;
        let req = PaymentRequest::new("0712345678", dec!(2500), fx.event_id);
        let txn = TransactionRecord::pending("ws_CO_1", None, "TICKET_X_1", "254712345678", &req);
        fx.store.insert_transaction(txn).await.unwrap();

        let notice = StkCallback::success("ws_CO_1", "NLJ7RT61SV", dec!(2500));
        assert!(matches!(
            fx.engine.process(&notice).await.unwrap(),
            ReconcileOutcome::Completed { .. }
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fx.notifier.tickets_sent(), 0);
    }
}
