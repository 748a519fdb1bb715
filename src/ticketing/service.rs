//! Ticketing Service Facade
//!
//! One object owning the payment, reconciliation, issuance, redemption and
//! reporting components. The REST layer and tests talk only to this surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::daraja::{PaymentGateway, StkCallback};
use crate::notify::TicketNotifier;
use crate::phone::PhoneNormalizer;
use crate::store::TicketStore;
use crate::ticketing::credential::{CredentialEncoder, TicketIssuer};
use crate::ticketing::error::TicketingError;
use crate::ticketing::initiation::PaymentInitiator;
use crate::ticketing::reconcile::{ReconcileOutcome, ReconciliationEngine};
use crate::ticketing::redemption::{RedemptionGuard, TicketStatusView};
use crate::ticketing::report::{EventSales, SalesReporter, SalesStats};
use crate::ticketing::types::{
    EventId, EventRecord, PaymentHandle, PaymentRequest, TicketCredential, TransactionRecord,
};
use rust_decimal::Decimal;

/// Administrative event creation input.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub venue: String,
    pub city: String,
    pub starts_at: DateTime<Utc>,
    pub price: Decimal,
    pub capacity: u32,
    pub featured: bool,
}

/// Credential plus its encoded payload, ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    #[serde(flatten)]
    pub credential: TicketCredential,
    /// Payload string the QR rasterizer consumes
    pub encoded: String,
}

pub struct TicketingService {
    store: Arc<dyn TicketStore>,
    normalizer: PhoneNormalizer,
    initiator: PaymentInitiator,
    engine: ReconciliationEngine,
    redemption: RedemptionGuard,
    reporter: SalesReporter,
    encoder: Arc<dyn CredentialEncoder>,
}

impl TicketingService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn TicketNotifier>,
        encoder: Arc<dyn CredentialEncoder>,
        normalizer: PhoneNormalizer,
    ) -> Self {
        Self {
            initiator: PaymentInitiator::new(
                Arc::clone(&store),
                gateway,
                normalizer.clone(),
            ),
            engine: ReconciliationEngine::new(
                Arc::clone(&store),
                notifier,
                Arc::clone(&encoder),
            ),
            redemption: RedemptionGuard::new(Arc::clone(&store)),
            reporter: SalesReporter::new(Arc::clone(&store)),
            store,
            normalizer,
            encoder,
        }
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub async fn initiate_payment(
        &self,
        req: PaymentRequest,
    ) -> Result<PaymentHandle, TicketingError> {
        self.initiator.initiate(req).await
    }

    /// Reconcile one gateway notice. The webhook route acknowledges the
    /// gateway whatever this returns; `Err` only means the store failed.
    pub async fn handle_gateway_notice(
        &self,
        notice: &StkCallback,
    ) -> Result<ReconcileOutcome, TicketingError> {
        self.engine.process(notice).await
    }

    pub async fn transaction_status(
        &self,
        correlation_id: &str,
    ) -> Result<TransactionRecord, TicketingError> {
        self.store
            .transaction_by_correlation(correlation_id)
            .await?
            .ok_or(TicketingError::NotFound)
    }

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    /// Re-mint the credential for a paid transaction. Receipts exist only on
    /// Completed rows, so an unknown receipt is simply NotFound.
    pub async fn issue_credential(
        &self,
        receipt_number: &str,
    ) -> Result<IssuedTicket, TicketingError> {
        let txn = self
            .store
            .transaction_by_receipt(receipt_number)
            .await?
            .ok_or(TicketingError::NotFound)?;
        let event = self
            .store
            .event(txn.event_id)
            .await?
            .ok_or(TicketingError::NotFound)?;

        let credential = TicketIssuer::issue(&txn, &event)?;
        let encoded = self.encoder.encode(&credential)?;
        Ok(IssuedTicket {
            credential,
            encoded,
        })
    }

    pub async fn redeem_ticket(
        &self,
        receipt_number: &str,
    ) -> Result<TransactionRecord, TicketingError> {
        self.redemption.redeem(receipt_number).await
    }

    pub async fn validate_ticket(
        &self,
        receipt_number: &str,
    ) -> Result<TicketStatusView, TicketingError> {
        self.redemption.validate(receipt_number).await
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub async fn list_events(&self) -> Result<Vec<EventRecord>, TicketingError> {
        Ok(self.store.active_events().await?)
    }

    pub async fn get_event(&self, id: EventId) -> Result<EventRecord, TicketingError> {
        self.store
            .event(id)
            .await?
            .ok_or(TicketingError::NotFound)
    }

    /// Administrative entry point; no self-service surface exists for it.
    pub async fn create_event(&self, new: NewEvent) -> Result<EventRecord, TicketingError> {
        if new.name.trim().is_empty() {
            return Err(TicketingError::InvalidInput("event name is required".to_string()));
        }
        if new.capacity == 0 {
            return Err(TicketingError::InvalidInput(
                "event capacity must be at least 1".to_string(),
            ));
        }
        if new.price < Decimal::ZERO {
            return Err(TicketingError::InvalidInput(
                "ticket price cannot be negative".to_string(),
            ));
        }

        let mut event = EventRecord::new(
            new.name, new.description, new.venue, new.city, new.starts_at, new.price,
            new.capacity,
        );
        event.featured = new.featured;

        info!(
            event_id = %event.id,
            name = %event.name,
            capacity = event.capacity,
            price = %event.price,
            "Event created"
        );
        self.store.insert_event(event.clone()).await?;
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    pub async fn stats(&self) -> Result<SalesStats, TicketingError> {
        self.reporter.stats().await
    }

    pub async fn event_sales(&self) -> Result<Vec<EventSales>, TicketingError> {
        self.reporter.event_sales().await
    }

    pub async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, TicketingError> {
        self.reporter.recent_transactions(limit).await
    }

    /// Phone queries accept raw input and normalize before matching, since
    /// stored rows always carry the normalized form.
    pub async fn transactions_by_phone(
        &self,
        raw_phone: &str,
    ) -> Result<Vec<TransactionRecord>, TicketingError> {
        let phone = self.normalizer.normalize(raw_phone);
        self.reporter.transactions_by_phone(&phone).await
    }

    pub async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<TransactionRecord, TicketingError> {
        self.reporter.transaction_by_reference(reference).await
    }
}
