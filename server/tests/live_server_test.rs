//! Tests against a real TCP listener.
//!
//! These spawn the router on `127.0.0.1:0`, talk to it with `reqwest`, and
//! exercise the shutdown sequence used by the binary: graceful shutdown
//! followed by closing the producer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use pulse_server::bus::MemoryBus;
use pulse_server::config::{BusKind, Config, EVENT_TOPIC};
use pulse_server::producer::EventProducer;
use pulse_server::routes::{create_router, AppState};

// ============================================================================
// Test Helpers
// ============================================================================

/// A running server plus the handles needed to stop it.
struct TestServer {
    addr: SocketAddr,
    bus: MemoryBus,
    producer: Arc<EventProducer>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Stops accepting connections, waits for the server task, then closes
    /// the producer.
    async fn stop(self) -> (MemoryBus, Arc<EventProducer>) {
        let _ = self.shutdown.send(());
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked");

        self.producer.close().await.unwrap();
        (self.bus, self.producer)
    }
}

fn test_config() -> Config {
    Config {
        port: 0,
        kafka_brokers: vec!["localhost:9092".to_string()],
        jwt_secret: "live-server-secret".to_string(),
        event_bus: BusKind::Memory,
        mongo_uri: None,
    }
}

async fn spawn_test_server() -> TestServer {
    let bus = MemoryBus::new();
    let config = test_config();
    let producer = Arc::new(EventProducer::new(
        Arc::new(bus.clone()),
        config.kafka_brokers.clone(),
        EVENT_TOPIC,
    ));
    let app = create_router(AppState::new(config, Arc::clone(&producer)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        bus,
        producer,
        shutdown,
        handle,
    }
}

async fn login(client: &reqwest::Client, server: &TestServer) -> String {
    let response = client
        .post(server.url("/api/v1/auth/login"))
        .json(&json!({"email": "a@b.com", "password": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    body["data"]["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn login_and_publish_over_tcp() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let token = login(&client, &server).await;

    let response = client
        .post(server.url("/api/v1/events/event"))
        .bearer_auth(&token)
        .json(&json!({"eventType": "page_view", "userId": "u7", "data": {"path": "/pricing"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["userId"], "u7");

    let (bus, producer) = server.stop().await;
    assert_eq!(bus.records().len(), 1);
    assert_eq!(bus.records()[0].key, "u7");
    assert!(producer.is_closed());
    assert_eq!(bus.flush_count(), 1);
}

#[tokio::test]
async fn concurrent_requests_each_publish_once() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let token = login(&client, &server).await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        let url = server.url("/api/v1/events/event");
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            client
                .post(url)
                .bearer_auth(token)
                .json(&json!({"eventType": "click", "userId": format!("user-{i}")}))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), reqwest::StatusCode::CREATED);
    }

    let (bus, _producer) = server.stop().await;
    let mut keys: Vec<String> = bus.records().into_iter().map(|r| r.key).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 20);
}

#[tokio::test]
async fn health_is_reachable_without_auth() {
    let server = spawn_test_server().await;

    let body: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn closed_producer_rejects_late_events() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let token = login(&client, &server).await;

    server.producer.close().await.unwrap();

    let response = client
        .post(server.url("/api/v1/events/event"))
        .bearer_auth(&token)
        .json(&json!({"eventType": "login", "userId": "u1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    // Second close inside stop() is a no-op.
    let (bus, producer) = server.stop().await;
    assert!(producer.is_closed());
    assert!(bus.records().is_empty());
    assert_eq!(bus.flush_count(), 1);
}
