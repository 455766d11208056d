use std::time::Duration;

/// A point-in-time view of the aggregate transfer progress across all streams.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes uploaded or downloaded so far, summed over every stream.
    pub bytes_completed: u64,

    /// Milliseconds since the aggregator was reset.
    pub elapsed_millis: u64,

    /// Percentage of the expected total that has completed.  None when the
    /// expected total is unknown.
    pub percent_complete: Option<f64>,
}

impl ProgressSnapshot {
    pub fn new(bytes_completed: u64, elapsed: Duration, bytes_total: i64) -> Self {
        let percent_complete = (bytes_total >= 0).then(|| {
            if bytes_total == 0 {
                100.0
            } else {
                100.0 * bytes_completed as f64 / bytes_total as f64
            }
        });

        Self {
            bytes_completed,
            elapsed_millis: elapsed.as_millis() as u64,
            percent_complete,
        }
    }

    /// Throughput in megabits per second; zero if no time has elapsed yet.
    pub fn rate_mbit_per_sec(&self) -> f64 {
        if self.elapsed_millis == 0 {
            return 0.0;
        }
        (self.bytes_completed as f64 / 1e6) * 8.0 / (self.elapsed_millis as f64 / 1000.0)
    }

    /// The rate formatted to two decimals, e.g. "93.41".
    pub fn formatted_rate(&self) -> String {
        format!("{:.2}", self.rate_mbit_per_sec())
    }

    /// Completion on a 0..=1000 scale, as used by progress bars.
    pub fn per_mille(&self) -> Option<u32> {
        self.percent_complete.map(|p| (p * 10.0).clamp(0.0, 1000.0) as u32)
    }

    pub fn bitrate_indication(&self) -> String {
        bitrate_indication(self.bytes_completed, self.elapsed_millis)
    }
}

/// Human readable summary of a transfer, e.g. "12.50 MB at 100.00 MBit/s".
pub fn bitrate_indication(bytes_completed: u64, elapsed_millis: u64) -> String {
    let size_mb = bytes_completed as f64 / 1e6;
    let rate = if elapsed_millis == 0 {
        0.0
    } else {
        size_mb * 8.0 / (elapsed_millis as f64 / 1000.0)
    };
    format!("{size_mb:.2} MB at {rate:.2} MBit/s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_and_percent() {
        let snapshot = ProgressSnapshot::new(12_500_000, Duration::from_secs(1), 50_000_000);
        assert_eq!(snapshot.formatted_rate(), "100.00");
        assert_eq!(snapshot.percent_complete, Some(25.0));
        assert_eq!(snapshot.per_mille(), Some(250));
        assert_eq!(snapshot.bitrate_indication(), "12.50 MB at 100.00 MBit/s");
    }

    #[test]
    fn test_unknown_total_omits_percent() {
        let snapshot = ProgressSnapshot::new(4096, Duration::from_millis(250), -1);
        assert_eq!(snapshot.percent_complete, None);
        assert_eq!(snapshot.per_mille(), None);
    }

    #[test]
    fn test_zero_elapsed_has_zero_rate() {
        let snapshot = ProgressSnapshot::new(1000, Duration::ZERO, 1000);
        assert_eq!(snapshot.rate_mbit_per_sec(), 0.0);
        assert_eq!(bitrate_indication(0, 0), "0.00 MB at 0.00 MBit/s");
    }
}
