//! TransferSession - one run of a multi-stream transfer, from fan-out to teardown

use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::{Duration, Instant};

use error_printer::OptionPrinter;
use parking_lot::{Condvar, Mutex};
use progress_tracking::ProgressAggregator;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use transfer_client::{
    BackendFactory, ResponseSummary, StreamEvents, StreamOutcome, StreamRequest, StreamTerminalEvent, TransferBackend,
    TransferDirection,
};
use ulid::Ulid;
use worker_pool::WorkerPool;

use crate::config::SpeedTestConfig;
use crate::errors::{Result, SessionError};
use crate::sink::{PresentationSink, SinkProgressReporter, TerminalStatus};

/// Lifecycle of a session.  Every terminal state is absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Succeeded | SessionStatus::Failed | SessionStatus::Cancelled)
    }
}

impl From<TerminalStatus> for SessionStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Succeeded => SessionStatus::Succeeded,
            TerminalStatus::Failed => SessionStatus::Failed,
            TerminalStatus::Cancelled => SessionStatus::Cancelled,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("id", &self.id)
            .field("num_streams", &self.num_streams)
            .field("direction", &self.direction)
            .field("status", &self.status())
            .finish()
    }
}

enum ControlMessage {
    Cancel,
}

/// A single run of `num_streams` concurrent transfers.
///
/// Created by [`TransferSession::start`] and never reused.  All state transitions
/// happen on one orchestrator task running on the session's worker pool: backends
/// report their terminal events to it over a channel, and [`TransferSession::cancel`]
/// sends it a control message.  Byte counts bypass the orchestrator and go straight
/// into the shared [`ProgressAggregator`].
///
/// The first failed or cancelled stream ends the whole session; the remaining streams
/// are cancelled.  The session succeeds on the first stream success observed once
/// the aggregate byte count reaches the expected total, or, when the total is
/// unknown, once every stream has succeeded.
///
/// No timeouts are imposed beyond those of the underlying transport.
pub struct TransferSession {
    id: Ulid,
    num_streams: usize,
    direction: TransferDirection,
    start_time: Instant,
    aggregator: Arc<ProgressAggregator>,

    status: Mutex<SessionStatus>,
    status_changed: Condvar,

    control_tx: UnboundedSender<ControlMessage>,
}

impl TransferSession {
    /// Validates `config`, then starts one backend per stream on a fresh worker pool.
    ///
    /// Any failure before every stream has started (bad configuration, an unbuildable
    /// URL, a backend that cannot be created) cancels the streams already started,
    /// reports the failure to `sink` and is returned here.
    pub fn start(
        config: &SpeedTestConfig,
        factory: Arc<dyn BackendFactory>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Arc<Self>> {
        if let Err(e) = config.validate() {
            report_start_failure(sink.as_ref(), &e);
            return Err(e);
        }

        let pool = match WorkerPool::new(config.num_streams) {
            Ok(pool) => pool,
            Err(e) => {
                let e = SessionError::from(e);
                report_start_failure(sink.as_ref(), &e);
                return Err(e);
            },
        };

        let aggregator = ProgressAggregator::new(SinkProgressReporter::new(sink.clone()));
        aggregator.reset();

        let (terminal_tx, terminal_rx) = unbounded_channel();
        let (control_tx, control_rx) = unbounded_channel();

        let session = Arc::new(Self {
            id: Ulid::new(),
            num_streams: config.num_streams,
            direction: config.direction,
            start_time: Instant::now(),
            aggregator,
            status: Mutex::new(SessionStatus::Active),
            status_changed: Condvar::new(),
            control_tx,
        });

        info!(
            session_id = %session.id,
            host = %config.host,
            base_port = config.base_port,
            num_streams = config.num_streams,
            direction = ?config.direction,
            protocol = ?config.protocol,
            backend = ?config.backend,
            "Starting transfer session."
        );

        let mut orchestrator = Orchestrator {
            session: session.clone(),
            sink: sink.clone(),
            pool: pool.clone(),
            handles: Vec::with_capacity(config.num_streams),
            succeeded: vec![false; config.num_streams],
            n_succeeded: 0,
        };

        for stream_id in 0..config.num_streams {
            if let Err(e) = orchestrator.start_stream(config, factory.as_ref(), stream_id, &terminal_tx) {
                warn!(session_id = %session.id, stream_id, "Could not start stream: {e}");
                orchestrator.finish(TerminalStatus::Failed, e.to_string());
                return Err(e);
            }
        }
        drop(terminal_tx);

        if let Err(e) = pool.spawn(orchestrator.run(control_rx, terminal_rx)) {
            // The orchestrator was dropped with the rejected task; stop what it started.
            pool.shutdown();
            let e = SessionError::from(e);
            report_start_failure(sink.as_ref(), &e);
            return Err(e);
        }

        Ok(session)
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn num_streams(&self) -> usize {
        self.num_streams
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn aggregator(&self) -> &Arc<ProgressAggregator> {
        &self.aggregator
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Requests cancellation of every stream.  Returns false if the session had already
    /// ended; calling this more than once is harmless.
    pub fn cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        info!(session_id = %self.id, "Cancel requested.");
        self.control_tx.send(ControlMessage::Cancel).is_ok()
    }

    /// Blocks until the session reaches a terminal state.
    ///
    /// Must not be called from inside an async context.
    pub fn wait(&self) -> SessionStatus {
        let mut status = self.status.lock();
        while !status.is_terminal() {
            self.status_changed.wait(&mut status);
        }
        *status
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<SessionStatus> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while !status.is_terminal() {
            if self.status_changed.wait_until(&mut status, deadline).timed_out() && !status.is_terminal() {
                return Err(SessionError::Timeout);
            }
        }
        Ok(*status)
    }

    fn publish(&self, new_status: SessionStatus) {
        let mut status = self.status.lock();
        debug_assert!(!status.is_terminal());
        *status = new_status;
        self.status_changed.notify_all();
    }
}

/// Owns the backend handles and the stream bookkeeping; the only writer of session state.
struct Orchestrator {
    session: Arc<TransferSession>,
    sink: Arc<dyn PresentationSink>,
    pool: Arc<WorkerPool>,
    handles: Vec<Arc<dyn TransferBackend>>,
    succeeded: Vec<bool>,
    n_succeeded: usize,
}

impl Orchestrator {
    fn start_stream(
        &mut self,
        config: &SpeedTestConfig,
        factory: &dyn BackendFactory,
        stream_id: usize,
        terminal_tx: &UnboundedSender<StreamTerminalEvent>,
    ) -> Result<()> {
        let url = config.target_url(stream_id)?;
        let backend = factory.create_backend(stream_id)?;

        let events = StreamEvents::new(stream_id, self.session.aggregator.clone(), terminal_tx.clone());
        let request = StreamRequest {
            stream_id,
            url,
            direction: config.direction,
            upload_bytes: config.upload_bytes,
        };

        debug!(session_id = %self.session.id, stream_id, url = %request.url, "Request for {} started.", request.url);
        backend.start(&self.pool.handle(), request, events);
        self.handles.push(backend);

        self.log(&format!("Request {stream_id} started."), true);
        Ok(())
    }

    async fn run(
        mut self,
        mut control_rx: UnboundedReceiver<ControlMessage>,
        mut terminal_rx: UnboundedReceiver<StreamTerminalEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(ControlMessage::Cancel) = control_rx.recv() => {
                    self.finish(TerminalStatus::Cancelled, "Transfer cancelled".to_owned());
                    return;
                },
                event = terminal_rx.recv() => {
                    let Some(event) = event else {
                        self.finish(TerminalStatus::Failed, "All streams ended without reporting a result".to_owned());
                        return;
                    };
                    if let Some((status, detail)) = self.on_stream_terminal(event) {
                        self.finish(status, detail);
                        return;
                    }
                },
            }
        }
    }

    fn on_stream_terminal(&mut self, event: StreamTerminalEvent) -> Option<(TerminalStatus, String)> {
        let stream_id = event.stream_id;
        match event.outcome {
            StreamOutcome::Succeeded(response) => self.on_stream_succeeded(stream_id, response),
            StreamOutcome::Failed(e) => {
                warn!(session_id = %self.session.id, stream_id, "Stream failed: {e}");
                Some((TerminalStatus::Failed, e.to_string()))
            },
            StreamOutcome::Cancelled => {
                info!(session_id = %self.session.id, stream_id, "Stream cancelled.");
                Some((TerminalStatus::Cancelled, "Transfer cancelled".to_owned()))
            },
        }
    }

    fn on_stream_succeeded(&mut self, stream_id: usize, response: ResponseSummary) -> Option<(TerminalStatus, String)> {
        if let Some(done) = self
            .succeeded
            .get_mut(stream_id)
            .warn_none(format!("Success reported for unknown stream {stream_id}"))
        {
            if !*done {
                *done = true;
                self.n_succeeded += 1;
            }
        }
        let all_succeeded = self.n_succeeded == self.succeeded.len();

        let aggregator = &self.session.aggregator;
        let (bytes_total, transfer_complete) = aggregator.completion_state();
        let complete = if bytes_total >= 0 { transfer_complete } else { all_succeeded };

        if complete {
            aggregator.stop_reporting();
            let snapshot = aggregator.snapshot();
            info!(session_id = %self.session.id, "Transfer complete: {}", snapshot.bitrate_indication());
            self.sink.on_progress(snapshot.clone());

            let report = format!(
                "Total bytes: {}\nResponse: {}\nHeaders:\n{}",
                snapshot.bytes_completed,
                response.status.as_u16(),
                response.format_headers()
            );
            return Some((TerminalStatus::Succeeded, report));
        }

        if all_succeeded {
            // Nothing else can arrive to close the gap.
            return Some((
                TerminalStatus::Failed,
                format!(
                    "All {} streams finished after {} of {} bytes",
                    self.succeeded.len(),
                    aggregator.bytes_completed(),
                    bytes_total
                ),
            ));
        }

        debug!(
            session_id = %self.session.id,
            stream_id,
            n_succeeded = self.n_succeeded,
            "Stream succeeded; waiting for the rest."
        );
        None
    }

    /// Teardown.  Runs once, on whichever path ended the session.
    fn finish(&mut self, status: TerminalStatus, detail: String) {
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
        self.session.aggregator.stop_reporting();

        match status {
            TerminalStatus::Succeeded => self.log(&detail, false),
            TerminalStatus::Failed | TerminalStatus::Cancelled => self.log(&format!("Exception:\n{detail}"), true),
        }

        info!(
            session_id = %self.session.id,
            %status,
            elapsed_ms = self.session.elapsed().as_millis() as u64,
            bytes_completed = self.session.aggregator.bytes_completed(),
            "Transfer session finished."
        );

        self.sink.on_terminal(status, &detail);
        self.sink.on_controls_reset();
        self.session.publish(status.into());
        self.pool.shutdown();
    }

    fn log(&self, message: &str, append: bool) {
        info!(session_id = %self.session.id, "{message}");
        self.sink.on_log(message, append);
    }
}

fn report_start_failure(sink: &dyn PresentationSink, e: &SessionError) {
    warn!("Transfer session not started: {e}");
    let detail = e.to_string();
    sink.on_log(&format!("Exception:\n{detail}"), true);
    sink.on_terminal(TerminalStatus::Failed, &detail);
    sink.on_controls_reset();
}
