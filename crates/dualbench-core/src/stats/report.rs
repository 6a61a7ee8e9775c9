//! Status reports and where they go
//!
//! Both sides of a run report once per second. Subscriber reports go to
//! stdout, one line per report (human-readable or JSON). Publisher reports go
//! through `tracing`, matching the rest of the log output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Format a byte count with binary prefixes, truncating to whole units
///
/// # Example
/// ```
/// use dualbench_core::stats::report::format_bytes;
///
/// assert_eq!(format_bytes(20), "20 B");
/// assert_eq!(format_bytes(1536), "1 KB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    if bytes >= GB {
        format!("{} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Receive statistics for one channel over one report window
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub topic: String,
    /// Size of the most recent payload
    pub payload_size: usize,
    /// Frames per second in the window
    pub rate_hz: f64,
    /// Mean latency in the window, NaN without samples (null in JSON)
    pub latency_ms: f64,
    /// Running loss percentage
    pub loss_percent: f64,
    /// Cumulative frames received
    pub received: u64,
    /// Cumulative sequence gaps
    pub missed_events: u64,
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, {:.1} Hz, {:.2} ms, loss: {:.2}%",
            self.topic,
            format_bytes(self.payload_size),
            self.rate_hz,
            self.latency_ms,
            self.loss_percent
        )
    }
}

/// One subscriber status line covering both channels
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStatus {
    pub timestamp: DateTime<Utc>,
    pub channels: [ChannelReport; 2],
}

impl fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.channels[0], self.channels[1])
    }
}

/// Send statistics for one channel over one report window
#[derive(Debug, Clone, Serialize)]
pub struct PublisherChannelStatus {
    pub topic: String,
    /// Cumulative frames sent
    pub sent: u64,
    /// Frames per second in the window
    pub rate_hz: f64,
    /// Cumulative failed sends
    pub send_failures: u64,
}

/// One publisher status line covering every open channel
#[derive(Debug, Clone, Serialize)]
pub struct PublisherStatus {
    pub timestamp: DateTime<Utc>,
    pub channels: Vec<PublisherChannelStatus>,
}

impl fmt::Display for PublisherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Publishing: ")?;
        for (i, ch) in self.channels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {} msgs ({:.1} Hz)", ch.topic, ch.sent, ch.rate_hz)?;
        }
        Ok(())
    }
}

/// Fixed-cadence report clock
///
/// Fires when at least `interval` passed since the previous report and hands
/// back the exact elapsed time, so rates divide by the real window length.
#[derive(Debug, Clone)]
pub struct ReportTimer {
    interval: Duration,
    last: Instant,
}

impl ReportTimer {
    /// Create a timer whose first window starts at `start`
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    /// Window length if a report is due at `now`, restarting the window
    pub fn poll(&mut self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last);
        if elapsed < self.interval {
            return None;
        }
        self.last = now;
        Some(elapsed)
    }

    /// Instant the next report becomes due
    pub fn next_due(&self) -> Instant {
        self.last + self.interval
    }
}

/// Destination for periodic status reports
pub trait ReportSink: Send + Sync {
    /// Handle one subscriber report
    fn subscriber_status(&self, status: &SubscriberStatus);

    /// Handle one publisher report
    fn publisher_status(&self, status: &PublisherStatus);
}

/// Writes reports to the console
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    json: bool,
}

impl ConsoleSink {
    /// Create a sink; `json` switches to one JSON object per line
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl ReportSink for ConsoleSink {
    fn subscriber_status(&self, status: &SubscriberStatus) {
        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
            }
        } else {
            println!("{}", status);
        }
    }

    fn publisher_status(&self, status: &PublisherStatus) {
        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
            }
        } else {
            tracing::info!("{}", status);
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    subscriber: Mutex<Vec<SubscriberStatus>>,
    publisher: Mutex<Vec<PublisherStatus>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriber reports received so far
    pub fn subscriber_reports(&self) -> Vec<SubscriberStatus> {
        self.subscriber.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Publisher reports received so far
    pub fn publisher_reports(&self) -> Vec<PublisherStatus> {
        self.publisher.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ReportSink for CollectingSink {
    fn subscriber_status(&self, status: &SubscriberStatus) {
        if let Ok(mut reports) = self.subscriber.lock() {
            reports.push(status.clone());
        }
    }

    fn publisher_status(&self, status: &PublisherStatus) {
        if let Ok(mut reports) = self.publisher.lock() {
            reports.push(status.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(topic: &str, size: usize, latency: f64) -> ChannelReport {
        ChannelReport {
            topic: topic.to_string(),
            payload_size: size,
            rate_hz: 10.04,
            latency_ms: latency,
            loss_percent: 0.0,
            received: 20,
            missed_events: 0,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1024 * 1024 - 1), "1023 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 + 7), "3 GB");
    }

    #[test]
    fn test_subscriber_line_format() {
        let status = SubscriberStatus {
            timestamp: Utc::now(),
            channels: [channel("topic_1", 20, 0.123), channel("topic_2", 2048, 1.5)],
        };
        assert_eq!(
            status.to_string(),
            "topic_1: 20 B, 10.0 Hz, 0.12 ms, loss: 0.00%, \
             topic_2: 2 KB, 10.0 Hz, 1.50 ms, loss: 0.00%"
        );
    }

    #[test]
    fn test_nan_latency_is_null_in_json() {
        let status = SubscriberStatus {
            timestamp: Utc::now(),
            channels: [channel("a", 2, f64::NAN), channel("b", 2, f64::NAN)],
        };
        assert!(status.to_string().contains("NaN ms"));

        let json: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert!(json["channels"][0]["latency_ms"].is_null());
        assert_eq!(json["channels"][1]["topic"], "b");
    }

    #[test]
    fn test_publisher_line_format() {
        let status = PublisherStatus {
            timestamp: Utc::now(),
            channels: vec![
                PublisherChannelStatus {
                    topic: "topic_1".into(),
                    sent: 10,
                    rate_hz: 10.0,
                    send_failures: 0,
                },
                PublisherChannelStatus {
                    topic: "topic_2".into(),
                    sent: 21,
                    rate_hz: 19.96,
                    send_failures: 1,
                },
            ],
        };
        assert_eq!(
            status.to_string(),
            "Publishing: topic_1 10 msgs (10.0 Hz), topic_2 21 msgs (20.0 Hz)"
        );
    }

    #[test]
    fn test_report_timer_cadence() {
        let start = Instant::now();
        let mut timer = ReportTimer::new(Duration::from_secs(1), start);
        assert_eq!(timer.poll(start + Duration::from_millis(999)), None);
        assert_eq!(
            timer.poll(start + Duration::from_millis(1020)),
            Some(Duration::from_millis(1020))
        );
        assert_eq!(timer.next_due(), start + Duration::from_millis(2020));
        assert_eq!(timer.poll(start + Duration::from_millis(1500)), None);
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.publisher_status(&PublisherStatus {
            timestamp: Utc::now(),
            channels: Vec::new(),
        });
        assert_eq!(sink.publisher_reports().len(), 1);
        assert!(sink.subscriber_reports().is_empty());
    }
}
