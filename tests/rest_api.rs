//! HTTP surface tests: a real listener on an ephemeral port, driven with
//! reqwest the way the gateway and the frontend would drive it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use tiketi::accounts::AccountService;
use tiketi::config::AuthConfig;
use tiketi::daraja::{MockGateway, StkCallback};
use tiketi::notify::MockNotifier;
use tiketi::phone::PhoneNormalizer;
use tiketi::rest::state::AppState;
use tiketi::store::{MemoryStore, TicketStore};
use tiketi::ticketing::{
    EventRecord, JsonCredentialEncoder, NewEvent, TicketingService,
};

struct TestServer {
    base: String,
    client: reqwest::Client,
    ticketing: Arc<TicketingService>,
    notifier: Arc<MockNotifier>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn spawn_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let normalizer = PhoneNormalizer::default();

    let ticketing = Arc::new(TicketingService::new(
        Arc::clone(&store) as Arc<dyn TicketStore>,
        Arc::new(MockGateway::new()),
        Arc::clone(&notifier) as _,
        Arc::new(JsonCredentialEncoder),
        normalizer.clone(),
    ));
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&store) as Arc<dyn TicketStore>,
        Arc::clone(&notifier) as _,
        normalizer,
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
        },
    ));

    let state = Arc::new(AppState::new(Arc::clone(&ticketing), accounts));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, tiketi::rest::router(state))
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        ticketing,
        notifier,
    }
}

async fn seed_event(server: &TestServer, price: Decimal, capacity: u32) -> EventRecord {
    server
        .ticketing
        .create_event(NewEvent {
            name: "Nairobi Jazz Festival".to_string(),
            description: "An evening of live jazz".to_string(),
            venue: "Uhuru Gardens".to_string(),
            city: "Nairobi".to_string(),
            starts_at: Utc::now() + chrono::Duration::days(14),
            price,
            capacity,
            featured: true,
        })
        .await
        .unwrap()
}

async fn get_json(server: &TestServer, path: &str) -> (reqwest::StatusCode, Value) {
    let res = server.client.get(server.url(path)).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn post_json(server: &TestServer, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
    let res = server
        .client
        .post(server.url(path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn test_banner_and_health() {
    let server = spawn_server().await;

    let (status, body) = get_json(&server, "/").await;
    assert_eq!(status, 200);
    assert_eq!(body["service"], "tiketi");
    assert!(body["endpoints"]["pay"].is_string());

    let (status, body) = get_json(&server, "/api/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_event_catalog_over_http() {
    let server = spawn_server().await;
    let event = seed_event(&server, dec!(2500), 100).await;

    let (status, body) = get_json(&server, "/api/events").await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 0);
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "Nairobi Jazz Festival");
    assert_eq!(listed[0]["tickets_available"], 100);

    let (status, body) = get_json(&server, &format!("/api/events/{}", event.id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["venue"], "Uhuru Gardens");

    // Garbage id is a client error, unknown id is a 404
    let (status, body) = get_json(&server, "/api/events/not-a-ulid").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1001);

    let ghost = tiketi::ticketing::EventId::new();
    let (status, body) = get_json(&server, &format!("/api/events/{ghost}")).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], 4001);
}

#[tokio::test]
async fn test_pay_rejects_bad_input() {
    let server = spawn_server().await;
    let event = seed_event(&server, dec!(1000), 10).await;

    // Phone too short for any subscriber form
    let (status, body) = post_json(
        &server,
        "/api/pay",
        json!({"phone": "07123", "amount": 1000, "event_id": event.id.to_string()}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1001);

    let (status, body) = post_json(
        &server,
        "/api/pay",
        json!({"phone": "0712345678", "amount": 1000, "event_id": "nope"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1001);

    // Amount that disagrees with price * count
    let (status, body) = post_json(
        &server,
        "/api/pay",
        json!({"phone": "0712345678", "amount": 999, "event_id": event.id.to_string()}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1001);
}

#[tokio::test]
async fn test_callback_is_always_acknowledged() {
    let server = spawn_server().await;

    // Body that is not even JSON
    let res = server
        .client
        .post(server.url("/api/mpesa/callback"))
        .header("content-type", "application/json")
        .body("definitely not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["ResultCode"], 0);
    assert_eq!(ack["ResultDesc"], "Success");

    // Well-formed notice for a push nobody initiated
    let orphan = StkCallback::success("ws_CO_ORPHAN", "SGRORPHAN1", dec!(100)).into_envelope();
    let res = server
        .client
        .post(server.url("/api/mpesa/callback"))
        .json(&orphan)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["ResultCode"], 0);
}

#[tokio::test]
async fn test_purchase_and_redeem_over_http() {
    let server = spawn_server().await;
    let event = seed_event(&server, dec!(2500), 100).await;

    let (status, body) = post_json(
        &server,
        "/api/pay",
        json!({
            "phone": "0712345678",
            "amount": 2500,
            "event_id": event.id.to_string(),
            "customer_name": "Wanjiku Kamau",
            "customer_email": "wanjiku@example.com",
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 0);
    let correlation_id = body["data"]["correlation_id"].as_str().unwrap().to_string();
    let reference = body["data"]["reference"].as_str().unwrap().to_string();

    let (status, body) =
        get_json(&server, &format!("/api/payment-status/{correlation_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "pending");

    // Gateway confirms
    let envelope = StkCallback::success(&correlation_id, "SGRHTTP001", dec!(2500)).into_envelope();
    let res = server
        .client
        .post(server.url("/api/mpesa/callback"))
        .json(&envelope)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let (_, body) = get_json(&server, &format!("/api/payment-status/{correlation_id}")).await;
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["receipt_number"], "SGRHTTP001");

    // Credential by receipt
    let (status, body) = get_json(&server, "/api/ticket/SGRHTTP001").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["receipt_number"], "SGRHTTP001");
    assert_eq!(body["data"]["holder_name"], "Wanjiku Kamau");
    assert!(
        body["data"]["encoded"]
            .as_str()
            .unwrap()
            .contains("SGRHTTP001")
    );

    // Gate scan, then redeem exactly once
    let (_, body) = get_json(&server, "/api/validate-ticket/SGRHTTP001").await;
    assert_eq!(body["data"]["used"], false);

    let (status, body) = post_json(&server, "/api/use-ticket/SGRHTTP001", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["used"], true);

    let (status, body) = post_json(&server, "/api/use-ticket/SGRHTTP001", json!({})).await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], 4002);

    // Lookups used by the frontend
    let (_, body) = get_json(&server, &format!("/api/transaction/{reference}")).await;
    assert_eq!(body["data"]["correlation_id"], correlation_id.as_str());

    let (_, body) = get_json(&server, "/api/transactions/phone/0712345678").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = get_json(&server, "/api/stats").await;
    assert_eq!(body["data"]["summary"]["completed"], 1);
    assert_eq!(body["data"]["summary"]["used"], 1);
    assert_eq!(body["data"]["events"][0]["tickets_sold"], 1);
}

#[tokio::test]
async fn test_ticket_lookup_for_unknown_receipt() {
    let server = spawn_server().await;

    let (status, body) = get_json(&server, "/api/ticket/SGRNOWHERE").await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], 4001);

    let (status, body) = post_json(&server, "/api/use-ticket/SGRNOWHERE", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], 4001);
}

#[tokio::test]
async fn test_account_registration_and_login_over_http() {
    let server = spawn_server().await;

    // Password policy enforced at the edge
    let (status, body) = post_json(
        &server,
        "/api/auth/register",
        json!({
            "name": "Wanjiku Kamau",
            "email": "wanjiku@example.com",
            "phone": "0712345678",
            "password": "short",
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1001);

    let (status, body) = post_json(
        &server,
        "/api/auth/register",
        json!({
            "name": "Wanjiku Kamau",
            "email": "wanjiku@example.com",
            "phone": "0712345678",
            "password": "correct horse battery",
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["verification_required"], true);

    // Unverified accounts cannot log in
    let login = json!({"email": "wanjiku@example.com", "password": "correct horse battery"});
    let (status, body) = post_json(&server, "/api/auth/login", login.clone()).await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], 2002);

    // Verification token goes out on a detached send
    let mut token = None;
    for _ in 0..100 {
        token = server.notifier.last_verification_token();
        if token.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let token = token.expect("verification token never dispatched");

    let (status, body) = get_json(&server, &format!("/api/auth/verify/{token}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 0);

    let (status, body) = post_json(&server, "/api/auth/login", login).await;
    assert_eq!(status, 200);
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
    assert_eq!(body["data"]["email"], "wanjiku@example.com");

    // Wrong password and duplicate email map to their own codes
    let (status, body) = post_json(
        &server,
        "/api/auth/login",
        json!({"email": "wanjiku@example.com", "password": "wrong password"}),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["code"], 2001);

    let (status, body) = post_json(
        &server,
        "/api/auth/register",
        json!({
            "name": "Wanjiku Again",
            "email": "wanjiku@example.com",
            "phone": "0712345678",
            "password": "another password",
        }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], 2003);
}
