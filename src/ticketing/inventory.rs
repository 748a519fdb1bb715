//! Inventory Ledger
//!
//! Two-phase capacity handling. `reserve` is an advisory read at initiation
//! time: most pushes are never confirmed (cancelled, timed out, no funds),
//! and the gateway gives the customer minutes to act, so holding tickets for
//! every push would starve the catalog. `commit` is the durable side and
//! rides on the store's guarded increment; the confirmation path gets the
//! same guard fused into `complete_pending` so the status flip and the
//! inventory commit are one atomic step.

use std::sync::Arc;

use crate::store::TicketStore;
use crate::ticketing::error::TicketingError;
use crate::ticketing::types::{EventId, EventRecord, EventStatus};

pub struct InventoryLedger {
    store: Arc<dyn TicketStore>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Advisory availability check. No mutation; a passing reserve can still
    /// lose the race at confirmation time. Returns the event snapshot so the
    /// caller does not re-read.
    pub async fn reserve(
        &self,
        event_id: EventId,
        count: u32,
    ) -> Result<EventRecord, TicketingError> {
        if count == 0 {
            return Err(TicketingError::InvalidInput(
                "ticket count must be at least 1".to_string(),
            ));
        }

        let event = self
            .store
            .event(event_id)
            .await?
            .ok_or_else(|| TicketingError::InvalidInput(format!("unknown event {event_id}")))?;

        if event.status != EventStatus::Active {
            return Err(TicketingError::InvalidInput(format!(
                "event {} is not open for sale",
                event.name
            )));
        }

        let available = event.tickets_available();
        if available < count {
            return Err(TicketingError::InsufficientCapacity { available });
        }

        Ok(event)
    }

    /// Durable `tickets_sold += count`, refused when it would exceed
    /// capacity. Safe under concurrent callers: the store applies it as one
    /// conditional update.
    pub async fn commit(&self, event_id: EventId, count: u32) -> Result<(), TicketingError> {
        if self.store.commit_tickets(event_id, count).await? {
            return Ok(());
        }
        let available = self
            .store
            .event(event_id)
            .await?
            .map(|e| e.tickets_available())
            .unwrap_or(0);
        Err(TicketingError::InsufficientCapacity { available })
    }
}
