//! Sales Reporting
//!
//! Read-only aggregation over the store. Numbers are computed on demand;
//! nothing here caches or mutates.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::store::TicketStore;
use crate::ticketing::error::TicketingError;
use crate::ticketing::types::{EventId, TransactionRecord, TransactionStatus};

/// Transaction counts by status plus confirmed revenue.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SalesStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub used: usize,
    /// Sum of confirmed (Completed) transaction amounts, KES
    pub total_amount: Decimal,
}

/// Per-event sales line.
#[derive(Debug, Clone, Serialize)]
pub struct EventSales {
    pub event_id: EventId,
    pub name: String,
    pub tickets_sold: u32,
    pub capacity: u32,
    /// Confirmed revenue attributed to this event
    pub revenue: Decimal,
}

pub struct SalesReporter {
    store: Arc<dyn TicketStore>,
}

impl SalesReporter {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> Result<SalesStats, TicketingError> {
        let txns = self.store.all_transactions().await?;

        let mut stats = SalesStats {
            total: txns.len(),
            completed: 0,
            pending: 0,
            failed: 0,
            used: 0,
            total_amount: Decimal::ZERO,
        };
        for txn in &txns {
            match txn.status {
                TransactionStatus::Completed => {
                    stats.completed += 1;
                    stats.total_amount += txn.amount;
                }
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Failed => stats.failed += 1,
            }
            if txn.used {
                stats.used += 1;
            }
        }
        Ok(stats)
    }

    /// One line per event, closed events included, soonest start first.
    pub async fn event_sales(&self) -> Result<Vec<EventSales>, TicketingError> {
        let events = self.store.all_events().await?;
        let txns = self.store.all_transactions().await?;

        let mut revenue: HashMap<EventId, Decimal> = HashMap::new();
        for txn in txns
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
        {
            *revenue.entry(txn.event_id).or_default() += txn.amount;
        }

        Ok(events
            .into_iter()
            .map(|event| EventSales {
                event_id: event.id,
                revenue: revenue.get(&event.id).copied().unwrap_or_default(),
                name: event.name,
                tickets_sold: event.tickets_sold,
                capacity: event.capacity,
            })
            .collect())
    }

    pub async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, TicketingError> {
        Ok(self.store.recent_transactions(limit).await?)
    }

    pub async fn transactions_by_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<TransactionRecord>, TicketingError> {
        Ok(self.store.transactions_by_phone(phone).await?)
    }

    pub async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<TransactionRecord, TicketingError> {
        self.store
            .transaction_by_reference(reference)
            .await?
            .ok_or(TicketingError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::ticketing::types::{EventRecord, PaymentRequest};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn populated() -> (Arc<MemoryStore>, SalesReporter, EventId) {
        let store = Arc::new(MemoryStore::new());
        let event = EventRecord::new(
            "Nairobi Jazz Festival",
            "",
            "Uhuru Gardens",
            "Nairobi",
            Utc::now(),
            dec!(2500),
            100,
        );
        let event_id = event.id;
        store.insert_event(event).await.unwrap();

        // Two completed (one redeemed), one pending, one failed
        for (correlation, outcome) in [
            ("ws_CO_1", Some("RKT001")),
            ("ws_CO_2", Some("RKT002")),
            ("ws_CO_3", None),
            ("ws_CO_4", None),
        ] {
            let req = PaymentRequest::new("0712345678", dec!(2500), event_id);
            let txn = TransactionRecord::pending(
                correlation,
                None,
                format!("TICKET_{event_id}_{correlation}"),
                "254712345678",
                &req,
            );
            store.insert_transaction(txn).await.unwrap();
            if let Some(receipt) = outcome {
                store
                    .complete_pending(correlation, receipt, Utc::now())
                    .await
                    .unwrap();
            }
        }
        store.fail_pending("ws_CO_4", "Request cancelled by user.").await.unwrap();
        store.redeem("RKT001", Utc::now()).await.unwrap();

        let reporter = SalesReporter::new(Arc::clone(&store) as Arc<dyn TicketStore>);
        (store, reporter, event_id)
    }

    #[tokio::test]
    async fn test_stats_counts_and_revenue() {
        let (_store, reporter, _event_id) = populated().await;

        let stats = reporter.stats().await.unwrap();
        assert_eq!(
            stats,
            SalesStats {
                total: 4,
                completed: 2,
                pending: 1,
                failed: 1,
                used: 1,
                total_amount: dec!(5000),
            }
        );
    }

    #[tokio::test]
    async fn test_event_sales_attributes_revenue() {
        let (_store, reporter, event_id) = populated().await;

        let sales = reporter.event_sales().await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].event_id, event_id);
        assert_eq!(sales[0].tickets_sold, 2);
        assert_eq!(sales[0].revenue, dec!(5000));
    }

    #[tokio::test]
    async fn test_reference_lookup() {
        let (_store, reporter, event_id) = populated().await;

        let txn = reporter
            .transaction_by_reference(&format!("TICKET_{event_id}_ws_CO_1"))
            .await
            .unwrap();
        assert_eq!(txn.correlation_id, "ws_CO_1");

        assert!(matches!(
            reporter.transaction_by_reference("TICKET_GHOST").await,
            Err(TicketingError::NotFound)
        ));
    }
}
