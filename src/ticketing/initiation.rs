//! Payment Initiation
//!
//! Front half of a ticket sale: validate, push the payment prompt to the
//! customer's phone, persist the Pending transaction. Ordering rule: nothing
//! is persisted until the gateway accepts the push, and the Pending row is
//! written before the handle is returned, so every webhook that can ever
//! arrive will find its row.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::daraja::PaymentGateway;
use crate::phone::PhoneNormalizer;
use crate::store::TicketStore;
use crate::ticketing::error::TicketingError;
use crate::ticketing::inventory::InventoryLedger;
use crate::ticketing::types::{PaymentHandle, PaymentRequest, TransactionRecord};

pub struct PaymentInitiator {
    store: Arc<dyn TicketStore>,
    gateway: Arc<dyn PaymentGateway>,
    normalizer: PhoneNormalizer,
    ledger: InventoryLedger,
}

impl PaymentInitiator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        gateway: Arc<dyn PaymentGateway>,
        normalizer: PhoneNormalizer,
    ) -> Self {
        let ledger = InventoryLedger::new(Arc::clone(&store));
        Self {
            store,
            gateway,
            normalizer,
            ledger,
        }
    }

    pub async fn initiate(&self, req: PaymentRequest) -> Result<PaymentHandle, TicketingError> {
        if req.amount <= Decimal::ZERO {
            return Err(TicketingError::InvalidInput(format!(
                "amount must be positive, got {}",
                req.amount
            )));
        }

        // Advisory capacity check; also rejects zero count, unknown and
        // closed events.
        let event = self.ledger.reserve(req.event_id, req.ticket_count).await?;

        let expected = event.price * Decimal::from(req.ticket_count);
        if req.amount != expected {
            return Err(TicketingError::InvalidInput(format!(
                "amount {} does not match {} ticket(s) at {}",
                req.amount, req.ticket_count, event.price
            )));
        }

        let phone = self.normalizer.normalize(&req.phone);
        let reference = format!("TICKET_{}_{}", event.id, Utc::now().timestamp_millis());

        let push = self
            .gateway
            .stk_push(&phone, req.amount, &reference)
            .await
            .map_err(|err| {
                warn!(
                    reference = %reference,
                    event_id = %event.id,
                    error = %err,
                    "STK push not accepted"
                );
                TicketingError::GatewayUnavailable(err.to_string())
            })?;

        let txn = TransactionRecord::pending(
            push.checkout_request_id.clone(),
            Some(push.merchant_request_id),
            reference.clone(),
            phone,
            &req,
        );
        let transaction_id = txn.id;
        self.store.insert_transaction(txn).await?;

        info!(
            correlation_id = %push.checkout_request_id,
            reference = %reference,
            event_id = %event.id,
            tickets = req.ticket_count,
            amount = %req.amount,
            "Payment initiated, awaiting confirmation"
        );

        Ok(PaymentHandle {
            transaction_id,
            reference,
            correlation_id: push.checkout_request_id,
            customer_message: push.customer_message,
        })
    }
}
