use super::*;
use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineOptions, ProcessorFactory, UnitProcessor};
use crate::types::{OutcomeKind, Record};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for oneshot()
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default, Clone)]
struct RecordingFactory {
    processed: Arc<StdMutex<Vec<Record>>>,
    delay: Option<Duration>,
}

struct RecordingProcessor {
    processed: Arc<StdMutex<Vec<Record>>>,
    delay: Option<Duration>,
}

#[async_trait]
impl UnitProcessor for RecordingProcessor {
    async fn process(&mut self, record: &Record) -> OutcomeKind {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.processed.lock().unwrap().push(record.clone());
        OutcomeKind::Success
    }
}

#[async_trait]
impl ProcessorFactory for RecordingFactory {
    async fn create(&self, _executor_id: usize) -> crate::Result<Box<dyn UnitProcessor>> {
        Ok(Box::new(RecordingProcessor {
            processed: Arc::clone(&self.processed),
            delay: self.delay,
        }))
    }
}

/// Identity endpoint answering for `session=abc`
async fn identity_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Id": "77",
            "Email": "ops@example.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    server
}

fn test_state(server: &MockServer, factory: &RecordingFactory) -> AppState {
    test_state_with_workers(server, factory, 3)
}

fn test_state_with_workers(
    server: &MockServer,
    factory: &RecordingFactory,
    workers: usize,
) -> AppState {
    let mut config = Config::new(
        format!("{}/recs/%s", server.uri()),
        "127.0.0.1:2525",
        "bounces@example.com",
    );
    config.user_url = Some(format!("{}/me", server.uri()));
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let pipeline = Pipeline::new(
        PipelineOptions {
            workers,
            record_queue: 4,
            outcome_queue: 4,
        },
        Arc::new(factory.clone()),
    );

    AppState::new(Arc::new(config), pipeline, CancellationToken::new()).unwrap()
}

fn send_request(cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/send");
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = identity_server().await;
    let app = create_router(test_state(&server, &RecordingFactory::default()));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_openapi_spec_served() {
    let server = identity_server().await;
    let app = create_router(test_state(&server, &RecordingFactory::default()));

    let request = Request::builder()
        .uri("/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/send"].is_object());
}

#[tokio::test]
async fn test_send_runs_batch_with_confirmation() {
    let server = identity_server().await;
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("subscribers.csv");
    std::fs::write(
        &data_file,
        "1,a@example.com\n2,b@example.com\n3,c@example.com\n",
    )
    .unwrap();

    let factory = RecordingFactory::default();
    let state = test_state(&server, &factory).with_data_file(&data_file);
    let app = create_router(state);

    let response = app.oneshot(send_request(Some("session=abc"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["NumSent"], 4);
    assert!(json["Seconds"].as_i64().unwrap() >= 0);

    let processed = factory.processed.lock().unwrap().clone();
    assert_eq!(processed.len(), 4);
    assert!(processed.contains(&Record::new("77", "ops@example.com")));
    assert!(processed.contains(&Record::new("2", "b@example.com")));
}

#[tokio::test]
async fn test_send_without_cookie_is_unauthorized() {
    let server = identity_server().await;
    let factory = RecordingFactory::default();
    let app = create_router(test_state(&server, &factory).with_data_file("/nonexistent.csv"));

    let response = app.oneshot(send_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "unauthorized");
    assert!(factory.processed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_with_rejected_session_is_unauthorized() {
    let server = identity_server().await;
    let factory = RecordingFactory::default();
    let app = create_router(test_state(&server, &factory).with_data_file("/nonexistent.csv"));

    let response = app
        .oneshot(send_request(Some("session=stale")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(factory.processed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_while_running_is_busy() {
    let server = identity_server().await;
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("subscribers.csv");
    std::fs::write(&data_file, "1,a@example.com\n").unwrap();

    let factory = RecordingFactory::default();
    let state = test_state(&server, &factory).with_data_file(&data_file);
    let app = create_router(state.clone());

    let running = state.try_begin_run().unwrap();
    let response = app
        .clone()
        .oneshot(send_request(Some("session=abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "busy");

    drop(running);
    let response = app.oneshot(send_request(Some("session=abc"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_send_without_data_file_is_config_error() {
    let server = identity_server().await;
    let app = create_router(test_state(&server, &RecordingFactory::default()));

    let response = app.oneshot(send_request(Some("session=abc"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "config_error");
    assert_eq!(json["error"]["details"]["key"], "Api.DataFile");
}

#[tokio::test]
async fn test_send_with_missing_data_file_fails() {
    let server = identity_server().await;
    let dir = tempdir().unwrap();
    let factory = RecordingFactory::default();
    let app = create_router(
        test_state(&server, &factory).with_data_file(dir.path().join("missing.csv")),
    );

    let response = app.oneshot(send_request(Some("session=abc"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "io_error");
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let server = identity_server().await;
    let state = test_state(&server, &RecordingFactory::default());
    let shutdown = state.shutdown.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let api_handle = tokio::spawn(serve(listener, state));

    let response = reqwest::get(format!("http://{}/health", address))
        .await
        .unwrap();
    assert!(response.status().is_success());

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_send_finishes_batch_after_client_disconnects() {
    let server = identity_server().await;
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("subscribers.csv");
    let rows: String = (1..=20).map(|i| format!("{},user{}@example.com\n", i, i)).collect();
    std::fs::write(&data_file, rows).unwrap();

    let factory = RecordingFactory {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let state = test_state_with_workers(&server, &factory, 1).with_data_file(&data_file);
    let shutdown = state.shutdown.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let api_handle = tokio::spawn(serve(listener, state));

    // Gives up long before 21 records at 50 ms each can finish
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let result = client
        .post(format!("http://{}/send", address))
        .header("Cookie", "session=abc")
        .send()
        .await;
    assert!(result.is_err(), "client should time out before the run ends");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while factory.processed.lock().unwrap().len() < 21 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "batch stopped after {} of 21 records",
            factory.processed.lock().unwrap().len()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let processed = factory.processed.lock().unwrap().clone();
    assert_eq!(processed.len(), 21);
    assert_eq!(processed.last(), Some(&Record::new("77", "ops@example.com")));

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), api_handle).await;
}
