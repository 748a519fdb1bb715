//! STK Push Client
//!
//! Initiates customer-to-business push payments. Each push authenticates with
//! a short-lived OAuth token, then posts the STK request; the gateway answers
//! with a CheckoutRequestID that becomes the transaction's correlation id.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MpesaConfig;

/// Daraja's AccountReference field cap. Longer references are truncated at
/// the wire, never rejected.
pub const ACCOUNT_REF_MAX_LEN: usize = 12;

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const TRANSACTION_DESC: &str = "Event Ticket Payment";

#[derive(Debug, Error)]
pub enum DarajaError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The gateway answered but refused the push.
    #[error("Push rejected: {code} {description}")]
    Rejected { code: String, description: String },

    #[error("Amount not representable in whole shillings: {0}")]
    BadAmount(Decimal),
}

/// Successful STK push acknowledgment. The push is now on the customer's
/// phone; the actual payment outcome arrives later on the callback URL.
#[derive(Debug, Clone)]
pub struct StkPushResponse {
    pub merchant_request_id: String,
    /// CheckoutRequestID: the correlation id all webhooks carry.
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Outbound side of the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Push a payment prompt to `phone` (normalized, international form).
    /// `account_reference` is the caller's reference; implementations bound
    /// it to the gateway's field limit.
    async fn stk_push(
        &self,
        phone: &str,
        amount: Decimal,
        account_reference: &str,
    ) -> Result<StkPushResponse, DarajaError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushPayload<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'static str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'static str,
}

#[derive(Debug, Deserialize)]
struct StkPushWireResponse {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default)]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: Option<String>,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

// ============================================================================
// HTTP client
// ============================================================================

/// Production gateway client over reqwest.
pub struct DarajaClient {
    http: reqwest::Client,
    config: MpesaConfig,
}

impl DarajaClient {
    pub fn new(config: MpesaConfig) -> Result<Self, DarajaError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    /// OAuth client-credentials grant. Tokens are short-lived and cheap, so
    /// one is fetched per push rather than cached.
    async fn authenticate(&self) -> Result<String, DarajaError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );

        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DarajaError::Auth(format!("{}: {}", status, body)));
        }

        let token: AccessTokenResponse = resp.json().await?;
        Ok(token.access_token)
    }

    /// `base64(shortcode || passkey || timestamp)`, the per-request secret
    /// Daraja derives the same way on its side.
    fn derive_password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn stk_push(
        &self,
        phone: &str,
        amount: Decimal,
        account_reference: &str,
    ) -> Result<StkPushResponse, DarajaError> {
        let token = self.authenticate().await?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.derive_password(&timestamp);

        // Whole shillings only
        let amount_kes = amount
            .trunc()
            .to_i64()
            .ok_or(DarajaError::BadAmount(amount))?;

        let account_ref: String = account_reference.chars().take(ACCOUNT_REF_MAX_LEN).collect();

        let payload = StkPushPayload {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: amount_kes,
            party_a: phone,
            party_b: &self.config.shortcode,
            phone_number: phone,
            call_back_url: &self.config.callback_url,
            account_reference: &account_ref,
            transaction_desc: TRANSACTION_DESC,
        };

        debug!(phone = %phone, amount = %amount_kes, reference = %account_ref, "STK push");

        let resp = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let wire: StkPushWireResponse = resp.json().await?;

        match (wire.response_code.as_deref(), wire.checkout_request_id) {
            (Some("0"), Some(checkout_request_id)) => Ok(StkPushResponse {
                merchant_request_id: wire.merchant_request_id.unwrap_or_default(),
                checkout_request_id,
                customer_message: wire.customer_message.unwrap_or_default(),
            }),
            _ => {
                let code = wire
                    .response_code
                    .or(wire.error_code)
                    .unwrap_or_else(|| "unknown".to_string());
                let description = wire
                    .response_description
                    .or(wire.error_message)
                    .unwrap_or_default();
                warn!(code = %code, description = %description, "STK push rejected");
                Err(DarajaError::Rejected { code, description })
            }
        }
    }
}

// ============================================================================
// Mock gateway (tests and local runs without Daraja credentials)
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct RecordedPush {
    pub phone: String,
    pub amount: Decimal,
    pub account_reference: String,
}

/// Scripted [`PaymentGateway`] that accepts every push and mints sequential
/// correlation ids, or refuses everything when `set_fail(true)`.
pub struct MockGateway {
    fail: AtomicBool,
    push_count: AtomicUsize,
    pushes: Mutex<Vec<RecordedPush>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            push_count: AtomicUsize::new(0),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    pub fn recorded_pushes(&self) -> Vec<RecordedPush> {
        self.pushes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn stk_push(
        &self,
        phone: &str,
        amount: Decimal,
        account_reference: &str,
    ) -> Result<StkPushResponse, DarajaError> {
        let n = self.push_count.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail.load(Ordering::SeqCst) {
            return Err(DarajaError::Rejected {
                code: "1".to_string(),
                description: "Unable to lock subscriber".to_string(),
            });
        }

        if let Ok(mut pushes) = self.pushes.lock() {
            pushes.push(RecordedPush {
                phone: phone.to_string(),
                amount,
                account_reference: account_reference.chars().take(ACCOUNT_REF_MAX_LEN).collect(),
            });
        }

        Ok(StkPushResponse {
            merchant_request_id: format!("29115-{}-1", n),
            checkout_request_id: format!("ws_CO_MOCK_{:06}", n),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }
}
