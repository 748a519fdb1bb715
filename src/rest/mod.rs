//! HTTP Surface
//!
//! Route table and server startup over the service facades. Handlers stay
//! thin; everything stateful lives behind [`state::AppState`].

pub mod handlers;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::banner))
        .route("/api/health", get(handlers::health))
        // Catalog
        .route("/api/events", get(handlers::list_events))
        .route("/api/events/{id}", get(handlers::get_event))
        // Payment lifecycle
        .route("/api/pay", post(handlers::pay))
        .route("/api/mpesa/callback", post(handlers::mpesa_callback))
        .route(
            "/api/payment-status/{correlation_id}",
            get(handlers::payment_status),
        )
        // Tickets
        .route("/api/ticket/{receipt}", get(handlers::get_ticket))
        .route(
            "/api/validate-ticket/{receipt}",
            get(handlers::validate_ticket),
        )
        .route("/api/use-ticket/{receipt}", post(handlers::use_ticket))
        // Transactions and reporting
        .route("/api/transactions", get(handlers::recent_transactions))
        .route(
            "/api/transaction/{reference}",
            get(handlers::transaction_by_reference),
        )
        .route(
            "/api/transactions/phone/{phone}",
            get(handlers::transactions_by_phone),
        )
        .route("/api/stats", get(handlers::stats))
        // Accounts
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/verify/{token}", get(handlers::verify_account))
        .route("/api/auth/login", post(handlers::login))
        .with_state(state)
}

pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .await
        .context("server terminated")?;
    Ok(())
}
