use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of instantaneous samples retained for display.
const HISTORY_LEN: usize = 10;

/// Minimum spacing between two instantaneous samples.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Point-in-time view of transfer speed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedSnapshot {
    /// Most recent instantaneous rate (bytes/s).
    pub current: f64,
    /// Bytes sent this run divided by active elapsed time (bytes/s).
    pub average: f64,
    /// Highest instantaneous rate observed (bytes/s).
    pub peak: f64,
    /// Estimated time left; `None` while the average is zero.
    pub eta: Option<Duration>,
    /// Last instantaneous samples, oldest first.
    pub history: Vec<f64>,
}

/// Sliding-window transfer speed tracker.
///
/// Fed with the cumulative uploaded byte count; instantaneous rates are
/// derived from the delta since the previous sample, taken no more often
/// than once per second. Time spent suspended (paused) does not count
/// toward the average.
#[derive(Debug)]
pub struct SpeedTracker {
    total_bytes: u64,
    /// Bytes already uploaded when tracking started (resumed chunks).
    baseline: u64,
    uploaded: u64,
    active_since: Option<Instant>,
    accumulated: Duration,
    last_sample: Option<(u64, Instant)>,
    samples: VecDeque<f64>,
    current: f64,
    peak: f64,
}

impl SpeedTracker {
    /// Creates an idle tracker for an upload of `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            baseline: 0,
            uploaded: 0,
            active_since: None,
            accumulated: Duration::ZERO,
            last_sample: None,
            samples: VecDeque::with_capacity(HISTORY_LEN),
            current: 0.0,
            peak: 0.0,
        }
    }

    /// Starts (or restarts) the clock. `already_uploaded` bytes are
    /// excluded from the rate but counted toward the remaining-bytes ETA.
    pub fn start_at(&mut self, already_uploaded: u64, now: Instant) {
        let total = self.total_bytes;
        *self = Self::new(total);
        self.baseline = already_uploaded;
        self.uploaded = already_uploaded;
        self.active_since = Some(now);
        self.last_sample = Some((already_uploaded, now));
    }

    /// Stops the clock without discarding statistics.
    pub fn suspend_at(&mut self, now: Instant) {
        if let Some(since) = self.active_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
        self.current = 0.0;
    }

    /// Continues after [`suspend_at`](Self::suspend_at). `uploaded` is the
    /// current total, which may have dropped when partial chunks were reset.
    pub fn resume_at(&mut self, uploaded: u64, now: Instant) {
        if self.active_since.is_none() {
            self.active_since = Some(now);
        }
        self.uploaded = uploaded;
        self.last_sample = Some((uploaded, now));
    }

    /// Records the cumulative uploaded byte count.
    ///
    /// Returns `true` when a new instantaneous sample was taken.
    pub fn record_at(&mut self, uploaded: u64, now: Instant) -> bool {
        self.uploaded = uploaded;
        if self.active_since.is_none() {
            return false;
        }

        let Some((last_bytes, last_at)) = self.last_sample else {
            self.last_sample = Some((uploaded, now));
            return false;
        };
        let elapsed = now.saturating_duration_since(last_at);
        if elapsed < MIN_SAMPLE_INTERVAL {
            return false;
        }

        let rate = uploaded.saturating_sub(last_bytes) as f64 / elapsed.as_secs_f64();
        self.current = rate;
        self.peak = self.peak.max(rate);
        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);
        self.last_sample = Some((uploaded, now));
        true
    }

    /// Records using the current instant.
    pub fn record(&mut self, uploaded: u64) -> bool {
        self.record_at(uploaded, Instant::now())
    }

    /// Active time since the first start, excluding suspended periods.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let running = self
            .active_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + running
    }

    /// Average rate over active time.
    pub fn average_at(&self, now: Instant) -> f64 {
        let secs = self.elapsed_at(now).as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.uploaded.saturating_sub(self.baseline) as f64 / secs
    }

    /// Builds a snapshot as of `now`.
    pub fn snapshot_at(&self, now: Instant) -> SpeedSnapshot {
        let average = self.average_at(now);
        let remaining = self.total_bytes.saturating_sub(self.uploaded);
        let eta = if average > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / average))
        } else {
            None
        };
        SpeedSnapshot {
            current: self.current,
            average,
            peak: self.peak,
            eta,
            history: self.samples.iter().copied().collect(),
        }
    }

    /// Builds a snapshot as of the current instant.
    pub fn snapshot(&self) -> SpeedSnapshot {
        self.snapshot_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn idle_tracker_reports_zero_and_unknown_eta() {
        let tracker = SpeedTracker::new(1000);
        let snap = tracker.snapshot();
        assert_eq!(snap.current, 0.0);
        assert_eq!(snap.average, 0.0);
        assert!(snap.eta.is_none());
        assert!(snap.history.is_empty());
    }

    #[test]
    fn samples_closer_than_one_second_are_ignored() {
        let t0 = Instant::now();
        let mut tracker = SpeedTracker::new(10_000);
        tracker.start_at(0, t0);
        assert!(!tracker.record_at(500, t0 + Duration::from_millis(400)));
        assert!(tracker.record_at(1000, t0 + secs(1)));
        assert_eq!(tracker.snapshot_at(t0 + secs(1)).current, 1000.0);
    }

    #[test]
    fn average_peak_and_eta() {
        let t0 = Instant::now();
        let mut tracker = SpeedTracker::new(10_000);
        tracker.start_at(0, t0);
        tracker.record_at(1000, t0 + secs(1)); // 1000 B/s
        tracker.record_at(4000, t0 + secs(2)); // 3000 B/s
        tracker.record_at(5000, t0 + secs(4)); // 500 B/s

        let snap = tracker.snapshot_at(t0 + secs(4));
        assert_eq!(snap.current, 500.0);
        assert_eq!(snap.peak, 3000.0);
        assert_eq!(snap.average, 1250.0);
        assert_eq!(snap.eta, Some(secs(4)));
        assert_eq!(snap.history, vec![1000.0, 3000.0, 500.0]);
    }

    #[test]
    fn history_is_bounded() {
        let t0 = Instant::now();
        let mut tracker = SpeedTracker::new(u64::MAX);
        tracker.start_at(0, t0);
        for i in 1..=25u64 {
            tracker.record_at(i * 100, t0 + secs(i));
        }
        let snap = tracker.snapshot_at(t0 + secs(25));
        assert_eq!(snap.history.len(), HISTORY_LEN);
    }

    #[test]
    fn resumed_bytes_do_not_inflate_average() {
        let t0 = Instant::now();
        let mut tracker = SpeedTracker::new(10_000);
        tracker.start_at(6000, t0);
        tracker.record_at(7000, t0 + secs(2));

        let snap = tracker.snapshot_at(t0 + secs(2));
        assert_eq!(snap.average, 500.0);
        assert_eq!(snap.eta, Some(secs(6)));
    }

    #[test]
    fn suspended_time_is_excluded() {
        let t0 = Instant::now();
        let mut tracker = SpeedTracker::new(10_000);
        tracker.start_at(0, t0);
        tracker.record_at(2000, t0 + secs(2));
        tracker.suspend_at(t0 + secs(2));
        tracker.resume_at(2000, t0 + secs(100));
        tracker.record_at(4000, t0 + secs(102));

        assert_eq!(tracker.elapsed_at(t0 + secs(102)), secs(4));
        assert_eq!(tracker.average_at(t0 + secs(102)), 1000.0);
        // The pause gap never becomes a sample.
        assert_eq!(tracker.snapshot_at(t0 + secs(102)).peak, 1000.0);
    }
}
