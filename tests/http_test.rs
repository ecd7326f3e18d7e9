//! HTTP surface tests: webhooks, devices and read-state over a real socket

use std::sync::Arc;

use clap::Parser;
use herald::config::Args;
use herald::db::Database;
use herald::events::{EventEnvelope, SemanticEvent};
use herald::inbox::InboxService;
use herald::pipeline::EventQueue;
use herald::server::{serve, AppState};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

const API_KEY: &str = "test-secret";

struct TestServer {
    base: String,
    client: reqwest::Client,
    events_rx: mpsc::Receiver<EventEnvelope>,
    state: Arc<AppState>,
    _shutdown: broadcast::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        let args = Args::parse_from(["herald", "--chain-enabled", "false", "--webhook-api-key", API_KEY]);
        let db = Arc::new(Database::open_in_memory().unwrap());
        let inbox = Arc::new(InboxService::new(db));
        let (events, events_rx) = EventQueue::new(8);
        let state = Arc::new(AppState::new(args, inbox, events, None));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, Arc::clone(&state), shutdown_rx));

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            events_rx,
            state,
            _shutdown: shutdown,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base, path))
            .header("X-API-Key", API_KEY)
    }
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let server = TestServer::start().await;

    let response = server.client.get(format!("{}/health", server.base)).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["chain"]["enabled"], false);
    assert_eq!(body["queue"]["capacity"], 8);
}

#[tokio::test]
async fn test_webhooks_require_api_key() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(format!("{}/sendBroadcastNotification", server.base))
        .json(&serde_json::json!({ "type": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_comment_webhook_enqueues_reply() {
    let mut server = TestServer::start().await;

    let response = server
        .post("/sendCommentNotification")
        .json(&serde_json::json!({
            "id": "31",
            "claim_id": 42,
            "argument_id": 7,
            "creator": "cosmos1frank"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "accepted");

    let envelope = server.events_rx.recv().await.unwrap();
    assert_eq!(body["event_id"], envelope.id.as_str());
    match envelope.event {
        SemanticEvent::ReplyPosted(reply) => {
            assert_eq!(reply.id, 31);
            assert_eq!(reply.argument_id, Some(7));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_webhook_rejects_bad_bodies_and_methods() {
    let server = TestServer::start().await;

    let response = server
        .post("/sendCommentNotification")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .post("/sendRewardNotification")
        .json(&serde_json::json!({ "rewardee_id": 1, "reward_type": "gold", "reward_amount": "1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .get(format!("{}/sendRewardNotification", server.base))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_closed_queue_answers_503() {
    let server = TestServer::start().await;
    server.state.events.close();

    let response = server
        .post("/sendBroadcastNotification")
        .json(&serde_json::json!({ "type": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_device_registration_round_trip() {
    let server = TestServer::start().await;
    let device = serde_json::json!({ "address": "cosmos1bob", "token": "tok-1", "platform": "ios" });

    let response = server.post("/devices").json(&device).send().await.unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(server.state.inbox.devices_for("cosmos1bob").unwrap().len(), 1);

    let response = server
        .client
        .delete(format!("{}/devices", server.base))
        .header("X-API-Key", API_KEY)
        .json(&device)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["removed"], true);
    assert!(server.state.inbox.devices_for("cosmos1bob").unwrap().is_empty());
}

#[tokio::test]
async fn test_read_state_routes() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(format!("{}/notifications/2/counts", server.base))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let counts: serde_json::Value = response.json().await.unwrap();
    assert_eq!(counts, serde_json::json!({ "unread": 0, "unseen": 0 }));

    let response = server.post("/notifications/2/threads/42/read").send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = server.post("/notifications/abc/read").send().await.unwrap();
    assert_eq!(response.status(), 400);
}
