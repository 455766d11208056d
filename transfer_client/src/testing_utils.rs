//! In-memory backends for exercising session orchestration without a network.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::error::{Result, TransferError};
use crate::{BackendFactory, StreamEvents, StreamRequest, TransferBackend};

/// A backend that records what it was asked to do and does nothing else.
///
/// Tests drive the stream by calling into [`MockBackend::events`].  A cancel reports
/// the stream as cancelled, as a real backend would.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockBackendState>,
}

#[derive(Debug, Default)]
struct MockBackendState {
    request: Option<StreamRequest>,
    events: Option<StreamEvents>,
    start_count: usize,
    cancel_count: usize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request(&self) -> Option<StreamRequest> {
        self.state.lock().request.clone()
    }

    pub fn events(&self) -> Option<StreamEvents> {
        self.state.lock().events.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().start_count
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancel_count
    }
}

impl TransferBackend for MockBackend {
    fn start(&self, _runtime: &Handle, request: StreamRequest, events: StreamEvents) {
        let mut state = self.state.lock();
        state.start_count += 1;
        state.request = Some(request);
        state.events = Some(events);
    }

    fn cancel(&self) {
        let events = {
            let mut state = self.state.lock();
            state.cancel_count += 1;
            state.events.clone()
        };
        if let Some(events) = events {
            events.cancelled();
        }
    }
}

/// Hands out [`MockBackend`]s and keeps them for inspection, optionally failing to
/// create the backend for one stream.
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    backends: Mutex<Vec<Arc<MockBackend>>>,
    fail_on_stream: Option<usize>,
}

impl MockBackendFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(stream_id: usize) -> Arc<Self> {
        Arc::new(Self {
            backends: Mutex::new(Vec::new()),
            fail_on_stream: Some(stream_id),
        })
    }

    /// The backend created for the i-th successful creation; equal to the stream id
    /// unless creation failed part way through.
    pub fn backend(&self, i: usize) -> Option<Arc<MockBackend>> {
        self.backends.lock().get(i).cloned()
    }

    pub fn backends(&self) -> Vec<Arc<MockBackend>> {
        self.backends.lock().clone()
    }

    pub fn num_created(&self) -> usize {
        self.backends.lock().len()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, stream_id: usize) -> Result<Arc<dyn TransferBackend>> {
        if self.fail_on_stream == Some(stream_id) {
            return Err(TransferError::ConfigurationError(format!("no backend for stream {stream_id}")));
        }

        let backend = MockBackend::new();
        self.backends.lock().push(backend.clone());
        Ok(backend as Arc<dyn TransferBackend>)
    }
}
