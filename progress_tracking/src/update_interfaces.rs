use std::fmt::Debug;
use std::sync::Arc;

use crate::ProgressSnapshot;

/// Receives throttled progress snapshots from a [crate::ProgressAggregator].
///
/// Called from transfer worker threads; implementations that render somewhere
/// else should hand the snapshot off to their own execution context and return.
pub trait ProgressReporter: Debug + Send + Sync {
    fn report(&self, snapshot: ProgressSnapshot);
}

#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl NoOpProgressReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {})
    }
}

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _snapshot: ProgressSnapshot) {}
}
