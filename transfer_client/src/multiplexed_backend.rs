use std::sync::Arc;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderValue;
use reqwest::Body;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::{DOWNLOAD_READ_SIZE, FORM_CONTENT_TYPE, MULTIPLEXED_UPLOAD_CAPACITY};
use crate::error::Result;
use crate::http_client::{declared_content_length, reject_redirect, summarize_response, TransportOptions};
use crate::{
    RandomPayload, ResponseSummary, StreamEvents, StreamRequest, TransferBackend, TransferDirection, UploadDataProvider,
};

/// Backend for a connection-multiplexing transport.
///
/// The transport pulls the upload body from an [`UploadDataProvider`] whenever it has
/// send capacity, and hands the download body back in whatever chunk sizes it
/// receives, which are split into reads of at most the download read size.
#[derive(Debug)]
pub struct MultiplexedBackend {
    client: reqwest::Client,
    options: TransportOptions,
    cancel_token: CancellationToken,
}

impl MultiplexedBackend {
    pub fn new(client: reqwest::Client, options: TransportOptions) -> Self {
        Self {
            client,
            options,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }
}

impl TransferBackend for MultiplexedBackend {
    fn start(&self, runtime: &Handle, request: StreamRequest, events: StreamEvents) {
        if let Some(options) = self.options.experimental_options() {
            info!(stream_id = request.stream_id, %options, "Using experimental transport options.");
        }
        if let (Some(host), Some(port)) = (request.url.host_str(), request.url.port_or_known_default()) {
            debug!(stream_id = request.stream_id, host, port, "Hinting multiplexed transport at {host}:{port}.");
        }

        let client = self.client.clone();
        let cancel_token = self.cancel_token.clone();

        runtime.spawn(async move {
            let stream_id = request.stream_id;
            let outcome = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                r = run_stream(&client, &request, &events) => Some(r),
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

async fn run_stream(client: &reqwest::Client, request: &StreamRequest, events: &StreamEvents) -> Result<ResponseSummary> {
    match request.direction {
        TransferDirection::Upload => upload(client, request, events).await,
        TransferDirection::Download => download(client, request, events).await,
    }
}

async fn upload(client: &reqwest::Client, request: &StreamRequest, events: &StreamEvents) -> Result<ResponseSummary> {
    let n_upload_bytes = request.upload_bytes;
    events.length_known(n_upload_bytes as i64);

    let read_events = events.clone();
    let provider = UploadDataProvider::new(
        RandomPayload::with_default_size(),
        n_upload_bytes,
        (*MULTIPLEXED_UPLOAD_CAPACITY).max(1),
        Arc::new(move |n| read_events.bytes_completed(n)),
    );

    let response = client
        .post(request.url.clone())
        .header(CONTENT_LENGTH, HeaderValue::from(n_upload_bytes))
        .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
        .body(Body::wrap_stream(provider))
        .send()
        .await?;

    reject_redirect(&response)?;
    let summary = summarize_response(request.stream_id, &response);
    response.bytes().await?;

    Ok(summary)
}

async fn download(client: &reqwest::Client, request: &StreamRequest, events: &StreamEvents) -> Result<ResponseSummary> {
    let mut response = client.get(request.url.clone()).send().await?;

    reject_redirect(&response)?;
    events.length_known(declared_content_length(response.headers())?);
    let summary = summarize_response(request.stream_id, &response);

    let read_size = (*DOWNLOAD_READ_SIZE).max(1);
    while let Some(chunk) = response.chunk().await? {
        for read in chunk.chunks(read_size) {
            events.bytes_completed(read.len() as u64);
        }
    }

    Ok(summary)
}
