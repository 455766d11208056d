use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use httpmock::prelude::*;
use progress_tracking::{NoOpProgressReporter, ProgressAggregator};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use transfer_client::constants::FORM_CONTENT_TYPE;
use transfer_client::{
    build_http_client, HttpBackend, MultiplexedBackend, ProtocolMode, StreamEvents, StreamOutcome, StreamRequest,
    StreamTerminalEvent, TransferBackend, TransferDirection, TransferError, TransportOptions,
};
use url::Url;

const UPLOAD_BYTES: u64 = 3 * 1024 * 1024 + 17;

struct Harness {
    events: StreamEvents,
    aggregator: Arc<ProgressAggregator>,
    terminal_rx: UnboundedReceiver<StreamTerminalEvent>,
}

impl Harness {
    fn new(stream_id: usize) -> Self {
        let aggregator = ProgressAggregator::new(NoOpProgressReporter::new());
        let (terminal_tx, terminal_rx) = unbounded_channel();
        Self {
            events: StreamEvents::new(stream_id, aggregator.clone(), terminal_tx),
            aggregator,
            terminal_rx,
        }
    }

    async fn outcome(&mut self) -> StreamOutcome {
        let event = tokio::time::timeout(Duration::from_secs(30), self.terminal_rx.recv())
            .await
            .expect("stream did not finish")
            .expect("terminal channel closed");
        event.outcome
    }
}

fn http1_client() -> reqwest::Client {
    build_http_client(ProtocolMode::Http11, &TransportOptions::default()).unwrap()
}

fn both_backends() -> [Arc<dyn TransferBackend>; 2] {
    [
        Arc::new(HttpBackend::new(http1_client())),
        Arc::new(MultiplexedBackend::new(http1_client(), TransportOptions::default())),
    ]
}

fn request(stream_id: usize, url: &str, direction: TransferDirection) -> StreamRequest {
    StreamRequest {
        stream_id,
        url: Url::parse(url).unwrap(),
        direction,
        upload_bytes: UPLOAD_BYTES,
    }
}

async fn check_upload(backend: &dyn TransferBackend) {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/uploads")
                .header("content-type", FORM_CONTENT_TYPE)
                .header("content-length", UPLOAD_BYTES.to_string());
            then.status(200).header("x-upload-id", "abc").body("ok");
        })
        .await;

    let mut harness = Harness::new(0);
    backend.start(
        &Handle::current(),
        request(0, &server.url("/uploads"), TransferDirection::Upload),
        harness.events.clone(),
    );

    let StreamOutcome::Succeeded(summary) = harness.outcome().await else {
        panic!("upload did not succeed");
    };
    mock.assert_async().await;

    assert_eq!(summary.status, StatusCode::OK);
    assert!(summary.format_headers().contains("x-upload-id=abc\n"));
    assert_eq!(harness.aggregator.bytes_total(), UPLOAD_BYTES as i64);
    assert_eq!(harness.aggregator.bytes_completed(), UPLOAD_BYTES);
    assert!(harness.aggregator.is_transfer_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streaming_upload() {
    check_upload(&HttpBackend::new(http1_client())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_multiplexed_upload() {
    check_upload(&MultiplexedBackend::new(http1_client(), TransportOptions::default())).await;
}

async fn check_download(backend: &dyn TransferBackend) {
    let body = vec![7u8; 100_000];
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/uploads");
            then.status(200).body(&body);
        })
        .await;

    let mut harness = Harness::new(2);
    backend.start(
        &Handle::current(),
        request(2, &server.url("/uploads"), TransferDirection::Download),
        harness.events.clone(),
    );

    assert!(matches!(harness.outcome().await, StreamOutcome::Succeeded(_)));
    assert_eq!(harness.aggregator.bytes_total(), body.len() as i64);
    assert_eq!(harness.aggregator.bytes_completed(), body.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streaming_download() {
    check_download(&HttpBackend::new(http1_client())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_multiplexed_download() {
    check_download(&MultiplexedBackend::new(http1_client(), TransportOptions::default())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_redirect_is_a_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/uploads");
            then.status(302).header("location", "https://elsewhere.test/uploads");
        })
        .await;

    for backend in both_backends() {
        let mut harness = Harness::new(0);
        backend.start(
            &Handle::current(),
            request(0, &server.url("/uploads"), TransferDirection::Download),
            harness.events.clone(),
        );

        let StreamOutcome::Failed(err) = harness.outcome().await else {
            panic!("redirect should fail the stream");
        };
        assert_eq!(err, TransferError::RedirectReceived("https://elsewhere.test/uploads".to_owned()));
        assert_eq!(harness.aggregator.bytes_completed(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_status_still_completes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/uploads");
            then.status(500).body("nope");
        })
        .await;

    let mut harness = Harness::new(0);
    HttpBackend::new(http1_client()).start(
        &Handle::current(),
        request(0, &server.url("/uploads"), TransferDirection::Upload),
        harness.events.clone(),
    );

    let StreamOutcome::Succeeded(summary) = harness.outcome().await else {
        panic!("a 500 response still completes the stream");
    };
    assert_eq!(summary.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_in_flight() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/uploads");
            then.status(200).delay(Duration::from_secs(60)).body("late");
        })
        .await;

    for backend in both_backends() {
        let mut harness = Harness::new(1);
        backend.start(
            &Handle::current(),
            request(1, &server.url("/uploads"), TransferDirection::Download),
            harness.events.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.cancel();
        backend.cancel();

        assert!(matches!(harness.outcome().await, StreamOutcome::Cancelled));
        assert!(harness.events.is_finished());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_before_start() {
    let backend = HttpBackend::new(http1_client());
    backend.cancel();

    let mut harness = Harness::new(0);
    backend.start(
        &Handle::current(),
        request(0, "http://127.0.0.1:9/uploads", TransferDirection::Upload),
        harness.events.clone(),
    );

    assert!(matches!(harness.outcome().await, StreamOutcome::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_refused() {
    // Bind then drop to find a port with nothing listening.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut harness = Harness::new(0);
    HttpBackend::new(http1_client()).start(
        &Handle::current(),
        request(0, &format!("http://127.0.0.1:{port}/uploads"), TransferDirection::Upload),
        harness.events.clone(),
    );

    assert!(matches!(harness.outcome().await, StreamOutcome::Failed(TransferError::ReqwestError(_))));
}
