use std::fmt::{Debug, Display};
use std::sync::Arc;

use progress_tracking::{ProgressReporter, ProgressSnapshot};
use serde::{Deserialize, Serialize};

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalStatus::Succeeded => "succeeded",
            TerminalStatus::Failed => "failed",
            TerminalStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Where a session's user-facing output goes.
///
/// Called from worker threads; implementations hand updates off to their own
/// context rather than rendering inline.
pub trait PresentationSink: Send + Sync {
    fn on_progress(&self, snapshot: ProgressSnapshot);

    /// A status message.  With `append` false, the message replaces earlier ones.
    fn on_log(&self, message: &str, append: bool);

    fn on_terminal(&self, status: TerminalStatus, detail: &str);

    /// The session is over and a new one may be started.
    fn on_controls_reset(&self);
}

/// Forwards throttled aggregator snapshots to a presentation sink.
pub(crate) struct SinkProgressReporter {
    sink: Arc<dyn PresentationSink>,
}

impl SinkProgressReporter {
    pub(crate) fn new(sink: Arc<dyn PresentationSink>) -> Arc<Self> {
        Arc::new(Self { sink })
    }
}

impl Debug for SinkProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SinkProgressReporter")
    }
}

impl ProgressReporter for SinkProgressReporter {
    fn report(&self, snapshot: ProgressSnapshot) {
        self.sink.on_progress(snapshot);
    }
}
