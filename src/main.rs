//! Tiketi - Event Ticketing over M-Pesa STK Push
//!
//! This is the main entry point. Architecture:
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌───────────┐    ┌──────────┐
//! │   REST   │───▶│ Initiator │───▶│  Daraja   │───▶│  Phone   │
//! │  (axum)  │    │ (pending) │    │ (STK API) │    │ (payer)  │
//! └──────────┘    └───────────┘    └───────────┘    └──────────┘
//!       ▲                                                │
//!       │              ┌───────────┐                     │
//!       └──────────────│ Reconcile │◀────── callback ────┘
//!                      │ (confirm) │
//!                      └───────────┘
//! ```
//!
//! Reconciliation responsibilities:
//! - Match callbacks to pending rows by CheckoutRequestID
//! - Commit capacity and issue tickets exactly once
//! - Ack every callback so the gateway never retries forever

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use tiketi::accounts::AccountService;
use tiketi::config::AppConfig;
use tiketi::daraja::{DarajaClient, PaymentGateway};
use tiketi::notify::{LogNotifier, TicketNotifier};
use tiketi::phone::PhoneNormalizer;
use tiketi::rest::state::AppState;
use tiketi::store::{MemoryStore, TicketStore};
use tiketi::ticketing::{CredentialEncoder, JsonCredentialEncoder, NewEvent, TicketingService};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

/// Demo catalog for a fresh store. Skipped once any event exists so restarts
/// against a warm store never duplicate it.
async fn seed_demo_catalog(ticketing: &TicketingService) -> anyhow::Result<()> {
    let catalog = [
        NewEvent {
            name: "Tech Conference 2026".to_string(),
            description: "East Africa's premier tech conference".to_string(),
            venue: "KICC".to_string(),
            city: "Nairobi".to_string(),
            starts_at: Utc::now() + Duration::days(30),
            price: Decimal::from(2500),
            capacity: 500,
            featured: true,
        },
        NewEvent {
            name: "Startup Pitch Night".to_string(),
            description: "Where startups meet investors".to_string(),
            venue: "iHub".to_string(),
            city: "Nairobi".to_string(),
            starts_at: Utc::now() + Duration::days(45),
            price: Decimal::from(1000),
            capacity: 200,
            featured: true,
        },
        NewEvent {
            name: "Mobile Development Workshop".to_string(),
            description: "Learn mobile development".to_string(),
            venue: "Moringa School".to_string(),
            city: "Nairobi".to_string(),
            starts_at: Utc::now() + Duration::days(60),
            price: Decimal::from(5000),
            capacity: 50,
            featured: false,
        },
    ];

    for event in catalog {
        ticketing
            .create_event(event)
            .await
            .context("seeding demo catalog")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = tiketi::logging::init_logging(&config);

    tracing::info!("Starting Tiketi in {} env", env);
    println!("=== Tiketi: M-Pesa Event Ticketing ===");

    let store: Arc<dyn TicketStore> = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(DarajaClient::new(config.mpesa.clone()).context("building Daraja client")?);
    let notifier: Arc<dyn TicketNotifier> = Arc::new(LogNotifier);
    let encoder: Arc<dyn CredentialEncoder> = Arc::new(JsonCredentialEncoder);
    let normalizer = PhoneNormalizer::new(&config.mpesa.country_code);

    let ticketing = Arc::new(TicketingService::new(
        Arc::clone(&store),
        gateway,
        Arc::clone(&notifier),
        encoder,
        normalizer.clone(),
    ));
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&store),
        notifier,
        normalizer,
        config.auth.clone(),
    ));

    if config.seed_demo_events && store.event_count().await? == 0 {
        seed_demo_catalog(&ticketing).await?;
        println!("Seeded demo catalog: {} events", store.event_count().await?);
    }

    // YAML server config, --port wins when given
    let mut server = config.server.clone();
    if let Some(port) = get_port_override() {
        server.port = port;
    }
    println!("Server will listen on {}:{}", server.host, server.port);
    println!("STK callbacks expected at {}", config.mpesa.callback_url);

    let state = Arc::new(AppState::new(ticketing, accounts));
    tiketi::rest::serve(&server, state).await
}
