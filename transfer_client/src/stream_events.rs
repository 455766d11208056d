use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use error_printer::ErrorPrinter;
use progress_tracking::ProgressAggregator;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::ResponseSummary;

/// How a single stream ended.
#[derive(Debug)]
pub enum StreamOutcome {
    Succeeded(ResponseSummary),
    Failed(TransferError),
    Cancelled,
}

/// The terminal event of one stream, delivered to the session's orchestrator.
#[derive(Debug)]
pub struct StreamTerminalEvent {
    pub stream_id: usize,
    pub outcome: StreamOutcome,
}

/// The event sink handed to a backend for one stream.
///
/// Length and byte progress go straight into the shared aggregator; the terminal
/// event is sent over a channel so that session state transitions have a single writer.
/// Events after the terminal one are dropped, as is any repeated length report.
#[derive(Clone)]
pub struct StreamEvents {
    inner: Arc<StreamEventsInner>,
}

struct StreamEventsInner {
    stream_id: usize,
    aggregator: Arc<ProgressAggregator>,
    terminal_tx: UnboundedSender<StreamTerminalEvent>,
    length_reported: AtomicBool,
    finished: AtomicBool,
}

impl Debug for StreamEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEvents")
            .field("stream_id", &self.inner.stream_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl StreamEvents {
    pub fn new(
        stream_id: usize,
        aggregator: Arc<ProgressAggregator>,
        terminal_tx: UnboundedSender<StreamTerminalEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(StreamEventsInner {
                stream_id,
                aggregator,
                terminal_tx,
                length_reported: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn stream_id(&self) -> usize {
        self.inner.stream_id
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Reports the stream's expected length; -1 when unknown.
    pub fn length_known(&self, bytes: i64) {
        if self.is_finished() {
            return;
        }
        if self.inner.length_reported.swap(true, Ordering::AcqRel) {
            warn!(stream_id = self.inner.stream_id, bytes, "Stream length reported twice; ignoring.");
            return;
        }
        debug!(stream_id = self.inner.stream_id, bytes, "Stream length known.");
        self.inner.aggregator.add_expected_length(bytes);
    }

    pub fn bytes_completed(&self, bytes: u64) {
        if bytes == 0 || self.is_finished() {
            return;
        }
        self.inner.aggregator.add_completed(bytes);
    }

    pub fn succeeded(&self, response: ResponseSummary) {
        self.finish(StreamOutcome::Succeeded(response));
    }

    pub fn failed(&self, error: TransferError) {
        self.finish(StreamOutcome::Failed(error));
    }

    pub fn cancelled(&self) {
        self.finish(StreamOutcome::Cancelled);
    }

    fn finish(&self, outcome: StreamOutcome) {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            debug!(stream_id = self.inner.stream_id, ?outcome, "Stream already finished; dropping event.");
            return;
        }

        let event = StreamTerminalEvent {
            stream_id: self.inner.stream_id,
            outcome,
        };

        // The receiver is gone once the session has terminated; late events are expected then.
        let _ = self
            .inner
            .terminal_tx
            .send(event)
            .debug_error(format!("Session already terminated; dropping event for stream {}", self.inner.stream_id));
    }
}

#[cfg(test)]
mod tests {
    use progress_tracking::NoOpProgressReporter;
    use tokio::sync::mpsc::unbounded_channel;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_events_flow_to_aggregator_and_channel() {
        let aggregator = ProgressAggregator::new(NoOpProgressReporter::new());
        aggregator.reset();
        let (tx, mut rx) = unbounded_channel();
        let events = StreamEvents::new(3, aggregator.clone(), tx);

        events.length_known(500);
        events.length_known(700);
        events.bytes_completed(200);
        events.bytes_completed(300);
        events.succeeded(ResponseSummary::default());

        // Everything after the terminal event is ignored.
        events.bytes_completed(1000);
        events.failed(TransferError::Cancelled);

        assert_eq!(aggregator.bytes_total(), 500);
        assert_eq!(aggregator.bytes_completed(), 500);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.stream_id, 3);
        assert!(matches!(event.outcome, StreamOutcome::Succeeded(_)));
        assert!(rx.try_recv().is_err());
        assert!(logs_contain("Stream length reported twice"));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_harmless() {
        let aggregator = ProgressAggregator::new(NoOpProgressReporter::new());
        let (tx, rx) = unbounded_channel();
        drop(rx);

        let events = StreamEvents::new(0, aggregator, tx);
        events.cancelled();
        assert!(events.is_finished());
    }
}
