use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, TryStreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderValue;
use reqwest::Body;
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::{DOWNLOAD_READ_SIZE, FORM_CONTENT_TYPE};
use crate::error::Result;
use crate::http_client::{declared_content_length, reject_redirect, summarize_response};
use crate::{RandomPayload, ResponseSummary, StreamEvents, StreamRequest, TransferBackend, TransferDirection};

/// Backend for plain request/response connections.
///
/// Uploads are written by a separate task on the worker pool, one payload-sized chunk
/// at a time; the request body is a zero-capacity channel so each send completes only
/// once the connection has taken the previous chunk.  Downloads read the body in fixed
/// size reads.
#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    cancel_token: CancellationToken,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cancel_token: CancellationToken::new(),
        }
    }
}

impl TransferBackend for HttpBackend {
    fn start(&self, runtime: &Handle, request: StreamRequest, events: StreamEvents) {
        let client = self.client.clone();
        let cancel_token = self.cancel_token.clone();
        let writer_runtime = runtime.clone();

        runtime.spawn(async move {
            let stream_id = request.stream_id;
            let outcome = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                r = run_stream(&writer_runtime, &client, &request, &events, &cancel_token) => Some(r),
            };

            match outcome {
                None => {
                    debug!(stream_id, "Stream cancelled.");
                    events.cancelled();
                },
                Some(Ok(summary)) => events.succeeded(summary),
                Some(Err(e)) => {
                    info!(stream_id, "Stream failed: {e}");
                    events.failed(e);
                },
            }
        });
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

async fn run_stream(
    runtime: &Handle,
    client: &reqwest::Client,
    request: &StreamRequest,
    events: &StreamEvents,
    cancel_token: &CancellationToken,
) -> Result<ResponseSummary> {
    match request.direction {
        TransferDirection::Upload => upload(runtime, client, request, events, cancel_token).await,
        TransferDirection::Download => download(client, request, events).await,
    }
}

async fn upload(
    runtime: &Handle,
    client: &reqwest::Client,
    request: &StreamRequest,
    events: &StreamEvents,
    cancel_token: &CancellationToken,
) -> Result<ResponseSummary> {
    let n_upload_bytes = request.upload_bytes;
    events.length_known(n_upload_bytes as i64);

    let (mut body_tx, body_rx) = mpsc::channel::<std::io::Result<Bytes>>(0);

    // Stops the writer if the request finishes, fails, or is dropped by a cancel.
    let writer_token = cancel_token.child_token();
    let _writer_guard = writer_token.clone().drop_guard();

    let writer_events = events.clone();
    runtime.spawn(async move {
        let payload = RandomPayload::with_default_size();
        let mut remaining = n_upload_bytes;

        while remaining > 0 {
            let chunk = payload.chunk(remaining);
            let n = chunk.len() as u64;

            tokio::select! {
                biased;
                _ = writer_token.cancelled() => return,
                sent = body_tx.send(Ok(chunk)) => {
                    if sent.is_err() {
                        // Connection dropped the body; the request reports the failure.
                        return;
                    }
                },
            }

            remaining -= n;
            writer_events.bytes_completed(n);
        }
        debug!(stream_id = writer_events.stream_id(), "Upload body fully written.");
    });

    let response = client
        .post(request.url.clone())
        .header(CONTENT_LENGTH, HeaderValue::from(n_upload_bytes))
        .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
        .body(Body::wrap_stream(body_rx))
        .send()
        .await?;

    reject_redirect(&response)?;
    let summary = summarize_response(request.stream_id, &response);

    // Drain whatever the server sends back so the exchange completes.
    response.bytes().await?;

    Ok(summary)
}

async fn download(client: &reqwest::Client, request: &StreamRequest, events: &StreamEvents) -> Result<ResponseSummary> {
    let response = client.get(request.url.clone()).send().await?;

    reject_redirect(&response)?;
    events.length_known(declared_content_length(response.headers())?);
    let summary = summarize_response(request.stream_id, &response);

    let mut reader = StreamReader::new(Box::pin(response.bytes_stream().map_err(std::io::Error::other)));
    let mut buffer = vec![0u8; (*DOWNLOAD_READ_SIZE).max(1)];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        events.bytes_completed(n as u64);
    }

    Ok(summary)
}
