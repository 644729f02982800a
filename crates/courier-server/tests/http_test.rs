use courier_notify::{InMemoryAppointments, InMemoryDirectory, NotificationService, UnconfiguredCrm};
use courier_server::analysis::{InMemoryAnalysisStore, StubAnalyzer};
use courier_server::mail::UnconfiguredMailer;
use courier_server::{AppContext, Queues, Server};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    queues: Queues,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let queues = Queues::in_memory();
        let notifications = NotificationService::new(
            Arc::new(UnconfiguredCrm::new("test")),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryAppointments::new()),
        );
        let ctx = AppContext::new(
            queues.clone(),
            Arc::new(notifications),
            Arc::new(StubAnalyzer::new()),
            Arc::new(InMemoryAnalysisStore::new()),
            Arc::new(UnconfiguredMailer),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(Server::new(ctx).serve(listener, async {
            let _ = rx.await;
        }));

        Self {
            base_url: format!("http://{}", addr),
            queues,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn webhook_round_trip_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhooks/calls", server.base_url))
        .json(&json!({"type": "recording.ready", "callId": "c-9", "recordingUrl": "https://rec/9.mp3"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"queued": true}));
    assert_eq!(server.queues.transcription().counts().await.unwrap().waiting, 1);

    server.stop().await;
}

#[tokio::test]
async fn queue_health_over_http() {
    let server = TestServer::start().await;

    let body: Value = reqwest::get(format!("{}/health/queues", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["call-analysis"]["waiting"], 0);
    assert_eq!(body["document-processing"]["isReady"], true);

    let health = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    let health: Value = health.json().await.unwrap();
    assert_eq!(health["status"], "healthy");

    server.stop().await;
}

#[tokio::test]
async fn errors_use_json_envelope() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/webhooks/calls", server.base_url))
        .header("content-type", "application/json")
        .body("[1, 2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "bad_request");

    let missing = client
        .get(format!("{}/nowhere", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}
