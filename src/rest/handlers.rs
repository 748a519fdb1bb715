//! HTTP Handlers
//!
//! Thin translation between wire JSON and the service facades. Every
//! response uses the `ApiResponse` envelope; errors carry the numeric codes
//! from [`error_codes`]. The one exception to error mapping is the payment
//! webhook, which acknowledges the gateway no matter what happened.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use crate::accounts::{AccountError, LoginInput, RegisterInput};
use crate::daraja::{CallbackAck, CallbackEnvelope};
use crate::rest::state::AppState;
use crate::ticketing::{
    EventId, EventRecord, PaymentRequest, TicketingError, TransactionRecord,
};

// ============================================================================
// Response envelope
// ============================================================================

/// Unified response wrapper: code 0 is success, non-zero carries one of the
/// [`error_codes`] values.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            data: Some(data),
            msg: None,
        }
    }

    pub fn error(code: i32, msg: impl ToString) -> ApiResponse<()> {
        ApiResponse {
            code,
            data: None,
            msg: Some(msg.to_string()),
        }
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_CAPACITY: i32 = 1002;

    // Auth errors (2xxx)
    pub const INVALID_CREDENTIALS: i32 = 2001;
    pub const UNVERIFIED_ACCOUNT: i32 = 2002;
    pub const EMAIL_TAKEN: i32 = 2003;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;
    pub const TICKET_ALREADY_USED: i32 = 4002;
    pub const TICKET_NOT_PAID: i32 = 4003;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const GATEWAY_UNAVAILABLE: i32 = 5001;
}

/// Error half of a handler result. Built from the domain errors so handlers
/// can use `?` and still emit the envelope.
pub struct ApiError {
    status: StatusCode,
    body: ApiResponse<()>,
}

impl ApiError {
    fn new(status: StatusCode, code: i32, msg: impl ToString) -> Self {
        Self {
            status,
            body: ApiResponse::<()>::error(code, msg),
        }
    }

    fn bad_request(msg: impl ToString) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            msg,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_from(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<TicketingError> for ApiError {
    fn from(err: TicketingError) -> Self {
        let code = match err.code() {
            "INVALID_INPUT" => error_codes::INVALID_PARAMETER,
            "INSUFFICIENT_CAPACITY" => error_codes::INSUFFICIENT_CAPACITY,
            "GATEWAY_UNAVAILABLE" => error_codes::GATEWAY_UNAVAILABLE,
            "NOT_FOUND" | "RECONCILIATION_MISMATCH" => error_codes::NOT_FOUND,
            "ALREADY_USED" | "ALREADY_RESOLVED" => error_codes::TICKET_ALREADY_USED,
            "NOT_PAID" => error_codes::TICKET_NOT_PAID,
            _ => error_codes::INTERNAL_ERROR,
        };
        Self::new(status_from(err.http_status()), code, err)
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        let code = match err.code() {
            "INVALID_INPUT" => error_codes::INVALID_PARAMETER,
            "EMAIL_TAKEN" => error_codes::EMAIL_TAKEN,
            "INVALID_CREDENTIALS" => error_codes::INVALID_CREDENTIALS,
            "UNVERIFIED" => error_codes::UNVERIFIED_ACCOUNT,
            "UNKNOWN_TOKEN" => error_codes::NOT_FOUND,
            _ => error_codes::INTERNAL_ERROR,
        };
        Self::new(status_from(err.http_status()), code, err)
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

// ============================================================================
// Wire views
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EventView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub venue: String,
    pub city: String,
    pub starts_at: DateTime<Utc>,
    pub price: Decimal,
    pub capacity: u32,
    pub tickets_sold: u32,
    pub tickets_available: u32,
    pub featured: bool,
    pub status: crate::ticketing::EventStatus,
}

impl From<EventRecord> for EventView {
    fn from(e: EventRecord) -> Self {
        Self {
            id: e.id.to_string(),
            tickets_available: e.tickets_available(),
            name: e.name,
            description: e.description,
            venue: e.venue,
            city: e.city,
            starts_at: e.starts_at,
            price: e.price,
            capacity: e.capacity,
            tickets_sold: e.tickets_sold,
            featured: e.featured,
            status: e.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub reference: String,
    pub correlation_id: String,
    pub event_id: String,
    pub phone: String,
    pub amount: Decimal,
    pub ticket_count: u32,
    pub status: crate::ticketing::TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(t: TransactionRecord) -> Self {
        Self {
            reference: t.reference,
            correlation_id: t.correlation_id,
            event_id: t.event_id.to_string(),
            phone: t.phone,
            amount: t.amount,
            ticket_count: t.ticket_count,
            status: t.status,
            customer_name: t.customer_name,
            receipt_number: t.receipt_number,
            failure_reason: t.failure_reason,
            used: t.used,
            used_at: t.used_at,
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayBody {
    #[validate(length(min = 9, max = 16, message = "phone must be 9-16 characters"))]
    pub phone: String,
    pub amount: Decimal,
    pub event_id: String,
    #[validate(range(min = 1, max = 10, message = "1 to 10 tickets per payment"))]
    pub ticket_count: Option<u32>,
    #[validate(length(max = 100))]
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 9, max = 16))]
    pub phone: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredView {
    pub name: String,
    pub email: String,
    pub verification_required: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub summary: crate::ticketing::SalesStats,
    pub events: Vec<crate::ticketing::EventSales>,
}

// ============================================================================
// Service info
// ============================================================================

pub async fn banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "git": env!("GIT_HASH"),
        "endpoints": {
            "events": "GET /api/events, GET /api/events/{id}",
            "pay": "POST /api/pay",
            "payment_status": "GET /api/payment-status/{correlation_id}",
            "callback": "POST /api/mpesa/callback",
            "ticket": "GET /api/ticket/{receipt}",
            "validate": "GET /api/validate-ticket/{receipt}",
            "redeem": "POST /api/use-ticket/{receipt}",
            "transactions": "GET /api/transactions, GET /api/transaction/{reference}, GET /api/transactions/phone/{phone}",
            "stats": "GET /api/stats",
            "auth": "POST /api/auth/register, GET /api/auth/verify/{token}, POST /api/auth/login",
            "health": "GET /api/health",
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub version: &'static str,
    pub events: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthView> {
    let events = state.ticketing.list_events().await?.len();
    Ok(ok(HealthView {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        events,
    }))
}

// ============================================================================
// Events
// ============================================================================

fn parse_event_id(raw: &str) -> Result<EventId, ApiError> {
    EventId::from_str(raw).map_err(|_| ApiError::bad_request(format!("not an event id: {raw}")))
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> ApiResult<Vec<EventView>> {
    let events = state.ticketing.list_events().await?;
    Ok(ok(events.into_iter().map(EventView::from).collect()))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<EventView> {
    let event = state.ticketing.get_event(parse_event_id(&id)?).await?;
    Ok(ok(EventView::from(event)))
}

// ============================================================================
// Payments
// ============================================================================

pub async fn pay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PayBody>,
) -> ApiResult<crate::ticketing::PaymentHandle> {
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let req = PaymentRequest {
        phone: body.phone,
        amount: body.amount,
        event_id: parse_event_id(&body.event_id)?,
        ticket_count: body.ticket_count.unwrap_or(1),
        customer_name: body.customer_name,
        customer_email: body.customer_email,
    };

    let handle = state.ticketing.initiate_payment(req).await?;
    Ok(ok(handle))
}

/// The webhook. Always answers the ack body: a non-zero answer would make
/// Daraja retry forever or drop the callback URL, and reconciliation already
/// treats every surprise as a logged outcome.
pub async fn mpesa_callback(State(state): State<Arc<AppState>>, body: Bytes) -> Json<CallbackAck> {
    match serde_json::from_slice::<CallbackEnvelope>(&body) {
        Ok(envelope) => {
            let notice = envelope.body.stk_callback;
            match state.ticketing.handle_gateway_notice(&notice).await {
                Ok(outcome) => {
                    info!(
                        correlation_id = %notice.checkout_request_id,
                        outcome = outcome.as_str(),
                        "Gateway notice reconciled"
                    );
                }
                Err(err) => {
                    error!(
                        correlation_id = %notice.checkout_request_id,
                        error = %err,
                        "Reconciliation failed on store, notice acknowledged anyway"
                    );
                }
            }
        }
        Err(err) => {
            error!(error = %err, "Unparseable gateway callback acknowledged");
        }
    }
    Json(CallbackAck::default())
}

pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
) -> ApiResult<TransactionView> {
    let txn = state.ticketing.transaction_status(&correlation_id).await?;
    Ok(ok(TransactionView::from(txn)))
}

// ============================================================================
// Tickets
// ============================================================================

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(receipt): Path<String>,
) -> ApiResult<crate::ticketing::IssuedTicket> {
    let ticket = state.ticketing.issue_credential(&receipt).await?;
    Ok(ok(ticket))
}

pub async fn validate_ticket(
    State(state): State<Arc<AppState>>,
    Path(receipt): Path<String>,
) -> ApiResult<crate::ticketing::TicketStatusView> {
    let view = state.ticketing.validate_ticket(&receipt).await?;
    Ok(ok(view))
}

pub async fn use_ticket(
    State(state): State<Arc<AppState>>,
    Path(receipt): Path<String>,
) -> ApiResult<TransactionView> {
    let txn = state.ticketing.redeem_ticket(&receipt).await?;
    Ok(ok(TransactionView::from(txn)))
}

// ============================================================================
// Transactions and reporting
// ============================================================================

const RECENT_LIMIT: usize = 50;

pub async fn recent_transactions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<TransactionView>> {
    let txns = state.ticketing.recent_transactions(RECENT_LIMIT).await?;
    Ok(ok(txns.into_iter().map(TransactionView::from).collect()))
}

pub async fn transaction_by_reference(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> ApiResult<TransactionView> {
    let txn = state.ticketing.transaction_by_reference(&reference).await?;
    Ok(ok(TransactionView::from(txn)))
}

pub async fn transactions_by_phone(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<Vec<TransactionView>> {
    let txns = state.ticketing.transactions_by_phone(&phone).await?;
    Ok(ok(txns.into_iter().map(TransactionView::from).collect()))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsView> {
    let summary = state.ticketing.stats().await?;
    let events = state.ticketing.event_sales().await?;
    Ok(ok(StatsView { summary, events }))
}

// ============================================================================
// Accounts
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<RegisteredView> {
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let account = state
        .accounts
        .register(RegisterInput {
            name: body.name,
            email: body.email,
            phone: body.phone,
            password: body.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegisteredView {
            name: account.name,
            email: account.email,
            verification_required: true,
        })),
    ))
}

pub async fn verify_account(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<&'static str> {
    state.accounts.verify(&token).await?;
    Ok(ok("account verified"))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> ApiResult<crate::accounts::AuthResponse> {
    let auth = state
        .accounts
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await?;
    Ok(ok(auth))
}
