//! Period, deadline and stop bookkeeping shared by every scheduling strategy
//!
//! Next-fire times are recomputed from the actual fire time (`now + period`),
//! not from the ideal schedule. Per-iteration delays therefore accumulate into
//! a slightly lower long-run rate; this keeps every strategy on the same
//! simple rule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shortest period any strategy will schedule
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Inter-message period for a rate, truncated to whole milliseconds
///
/// Truncation quantizes low rates and caps the achievable rate at 1 kHz. The
/// result is clamped to [`MIN_PERIOD`].
///
/// # Example
/// ```
/// use dualbench_core::traffic::schedule::period_for_rate;
/// use std::time::Duration;
///
/// assert_eq!(period_for_rate(10.0), Duration::from_millis(100));
/// assert_eq!(period_for_rate(3.0), Duration::from_millis(333));
/// assert_eq!(period_for_rate(5000.0), Duration::from_millis(1));
/// ```
pub fn period_for_rate(rate_hz: f64) -> Duration {
    let millis = (1000.0 / rate_hz) as u64;
    Duration::from_millis(millis).max(MIN_PERIOD)
}

/// Due-time tracker for one channel
#[derive(Debug, Clone)]
pub struct RateSchedule {
    period: Duration,
    next_due: Instant,
}

impl RateSchedule {
    /// Create a schedule whose first emission is due at `start`
    pub fn new(rate_hz: f64, start: Instant) -> Self {
        Self {
            period: period_for_rate(rate_hz),
            next_due: start,
        }
    }

    /// Scheduling period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Instant the next emission becomes due
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Whether an emission is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Check due-ness and, if due, advance to `now + period`
    ///
    /// Returns true when the caller should emit.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_due = now + self.period;
        true
    }
}

/// Run-length limit
///
/// A duration of zero or less, a non-finite one, or one too large for a
/// [`Duration`] means the run continues until it is stopped externally.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
    start: Instant,
    limit: Option<Duration>,
}

impl RunDeadline {
    /// Create a deadline from a duration in seconds
    pub fn new(start: Instant, duration_secs: f64) -> Self {
        let limit = if duration_secs > 0.0 {
            Duration::try_from_secs_f64(duration_secs).ok()
        } else {
            None
        };
        Self { start, limit }
    }

    /// Deadline that never expires
    pub fn unbounded(start: Instant) -> Self {
        Self { start, limit: None }
    }

    /// Run start
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Configured limit, if any
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time left before expiry, `None` when unbounded
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(now.saturating_duration_since(self.start)))
    }

    /// Whether `elapsed >= duration`
    pub fn expired(&self, now: Instant) -> bool {
        match self.limit {
            Some(limit) => now.saturating_duration_since(self.start) >= limit,
            None => false,
        }
    }
}

/// Cooperative cancellation flag shared between threads
///
/// Cloning shares the same flag. Raised by the controller when a bounded run
/// ends, or by the Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a lowered stop signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every loop sharing this signal to stop
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_truncates_to_millis() {
        assert_eq!(period_for_rate(1.0), Duration::from_millis(1000));
        assert_eq!(period_for_rate(2.0), Duration::from_millis(500));
        assert_eq!(period_for_rate(7.0), Duration::from_millis(142));
        assert_eq!(period_for_rate(1000.0), Duration::from_millis(1));
        assert_eq!(period_for_rate(1500.0), MIN_PERIOD);
    }

    #[test]
    fn test_first_emission_due_at_start() {
        let start = Instant::now();
        let mut schedule = RateSchedule::new(10.0, start);
        assert!(schedule.is_due(start));
        assert!(schedule.poll(start));
        assert_eq!(schedule.next_due(), start + Duration::from_millis(100));
    }

    #[test]
    fn test_poll_recomputes_from_actual_fire_time() {
        let start = Instant::now();
        let mut schedule = RateSchedule::new(10.0, start);
        assert!(schedule.poll(start));

        // Not yet due
        assert!(!schedule.poll(start + Duration::from_millis(50)));

        // Late by 7ms: the next fire is relative to the late fire, not the ideal one
        let late = start + Duration::from_millis(107);
        assert!(schedule.poll(late));
        assert_eq!(schedule.next_due(), late + Duration::from_millis(100));
    }

    #[test]
    fn test_deadline_bounded() {
        let start = Instant::now();
        let deadline = RunDeadline::new(start, 2.0);
        assert_eq!(deadline.limit(), Some(Duration::from_secs(2)));
        assert!(!deadline.expired(start + Duration::from_millis(1999)));
        assert!(deadline.expired(start + Duration::from_secs(2)));
        assert_eq!(
            deadline.remaining(start + Duration::from_millis(500)),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            deadline.remaining(start + Duration::from_secs(5)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_deadline_zero_or_negative_runs_forever() {
        let start = Instant::now();
        for secs in [0.0, -1.0, f64::NAN] {
            let deadline = RunDeadline::new(start, secs);
            assert_eq!(deadline.limit(), None);
            assert!(!deadline.expired(start + Duration::from_secs(3600)));
            assert_eq!(deadline.remaining(start), None);
        }
    }

    #[test]
    fn test_deadline_too_large_runs_forever() {
        let start = Instant::now();
        for secs in [1e20, f64::MAX, f64::INFINITY] {
            let deadline = RunDeadline::new(start, secs);
            assert_eq!(deadline.limit(), None, "{}", secs);
            assert!(!deadline.expired(start + Duration::from_secs(86_400)));
        }
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_raised());
        stop.raise();
        assert!(other.is_raised());
    }
}
