use std::sync::Arc;
use std::time::{Duration, Instant};

use more_asserts::debug_assert_ge;
use parking_lot::Mutex;
use tracing::debug;

use crate::{ProgressReporter, ProgressSnapshot};

utils::configurable_constants! {
    /// Minimum time between two progress reports, in milliseconds.
    ref PROGRESS_REPORT_INTERVAL_MS: u64 = 200;
}

/// Sentinel expected total meaning "unknown"; once reached it stays for the session.
pub const UNKNOWN_TOTAL: i64 = -1;

#[derive(Debug)]
struct AggregatorState {
    bytes_total: i64,
    bytes_completed: u64,
    start_time: Instant,
    last_report_time: Instant,
}

/// Aggregates byte-level progress from all concurrently running streams of a session
/// and forwards throttled snapshots to a [ProgressReporter].
///
/// All counters and the throttle timestamp live behind one lock, so the
/// check-and-update of the report window and the completion check are atomic
/// with respect to the counter updates.
#[derive(Debug)]
pub struct ProgressAggregator {
    state: Mutex<AggregatorState>,
    report_interval: Duration,
    reporter: Arc<dyn ProgressReporter>,
    // Set once reporting has stopped; held across each report so none can trail it.
    reporting_stopped: Mutex<bool>,
}

impl ProgressAggregator {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Arc<Self> {
        Self::with_report_interval(reporter, Duration::from_millis(*PROGRESS_REPORT_INTERVAL_MS))
    }

    pub fn with_report_interval(reporter: Arc<dyn ProgressReporter>, report_interval: Duration) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            state: Mutex::new(AggregatorState {
                bytes_total: 0,
                bytes_completed: 0,
                start_time: now,
                last_report_time: now,
            }),
            report_interval,
            reporter,
            reporting_stopped: Mutex::new(false),
        })
    }

    /// Zeroes the counters and restarts the clock.  Must happen once per session,
    /// before any stream starts.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.bytes_total = 0;
        state.bytes_completed = 0;
        state.start_time = now;
        state.last_report_time = now;
        drop(state);
        *self.reporting_stopped.lock() = false;
    }

    /// Stops all further throttled reports.  Once this returns, no report is in flight
    /// and none will follow until the next [ProgressAggregator::reset].
    pub fn stop_reporting(&self) {
        *self.reporting_stopped.lock() = true;
    }

    /// Adds one stream's expected length to the total.  A negative length poisons the
    /// total to [UNKNOWN_TOTAL] for the rest of the session.
    pub fn add_expected_length(&self, bytes: i64) {
        let mut state = self.state.lock();
        if state.bytes_total < 0 {
            return;
        }
        if bytes >= 0 {
            state.bytes_total = state.bytes_total.saturating_add(bytes);
        } else {
            debug!("Stream length unknown; aggregate total is now indeterminate.");
            state.bytes_total = UNKNOWN_TOTAL;
        }
    }

    /// Records completed bytes, then emits a snapshot if the report interval has elapsed.
    pub fn add_completed(&self, bytes: u64) {
        let maybe_snapshot = {
            let mut state = self.state.lock();
            state.bytes_completed += bytes;

            let now = Instant::now();
            if now.duration_since(state.last_report_time) >= self.report_interval {
                state.last_report_time = now;
                Some(ProgressSnapshot::new(
                    state.bytes_completed,
                    now.duration_since(state.start_time),
                    state.bytes_total,
                ))
            } else {
                None
            }
        };

        // Report outside the state lock; the window was claimed above so no one else reports it.
        if let Some(snapshot) = maybe_snapshot {
            let stopped = self.reporting_stopped.lock();
            if !*stopped {
                self.reporter.report(snapshot);
            }
        }
    }

    /// True once the completed bytes have reached the expected total.
    ///
    /// With an unknown total this is always true; callers that need all streams
    /// to have finished must track that themselves.
    pub fn is_transfer_complete(&self) -> bool {
        let state = self.state.lock();
        state.bytes_completed as i128 >= state.bytes_total as i128
    }

    /// The expected total together with [ProgressAggregator::is_transfer_complete],
    /// read under one lock so a concurrent poisoning cannot fall between the two.
    pub fn completion_state(&self) -> (i64, bool) {
        let state = self.state.lock();
        (state.bytes_total, state.bytes_completed as i128 >= state.bytes_total as i128)
    }

    pub fn bytes_total(&self) -> i64 {
        self.state.lock().bytes_total
    }

    pub fn bytes_completed(&self) -> u64 {
        self.state.lock().bytes_completed
    }

    /// An unthrottled snapshot of the current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock();
        let now = Instant::now();
        debug_assert_ge!(now, state.start_time);
        ProgressSnapshot::new(state.bytes_completed, now.duration_since(state.start_time), state.bytes_total)
    }
}
