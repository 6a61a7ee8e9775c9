//! Per-channel receive statistics
//!
//! Counters are cumulative for the whole run and never reset. Throughput and
//! latency are reported over the window since the previous snapshot, while
//! loss is a running ratio over every sequence id seen so far.

use super::report::ChannelReport;
use crate::clock::latency_ms;
use crate::traffic::frame::DecodedFrame;
use chrono::Utc;
use std::time::Duration;

/// Receive-side accumulator for one channel
#[derive(Debug, Clone)]
pub struct StatWindow {
    topic: String,
    /// Frames received since start
    received: u64,
    /// Frames with no sequence id (payload < 4 bytes)
    short_frames: u64,
    /// Sum of latency samples (ms)
    latency_sum_ms: f64,
    /// Number of latency samples
    latency_samples: u64,
    /// Values of the three counters above at the last snapshot
    snapshot_received: u64,
    snapshot_latency_sum_ms: f64,
    snapshot_latency_samples: u64,
    /// First sequence id seen
    first_id: Option<u32>,
    /// Most recent sequence id seen
    last_id: u32,
    /// Number of forward jumps in the sequence
    missed_events: u64,
    /// Size of the most recent payload
    last_payload_size: usize,
    min_latency_ms: f64,
    max_latency_ms: f64,
}

impl StatWindow {
    /// Create an empty window for a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            received: 0,
            short_frames: 0,
            latency_sum_ms: 0.0,
            latency_samples: 0,
            snapshot_received: 0,
            snapshot_latency_sum_ms: 0.0,
            snapshot_latency_samples: 0,
            first_id: None,
            last_id: 0,
            missed_events: 0,
            last_payload_size: 0,
            min_latency_ms: f64::MAX,
            max_latency_ms: f64::MIN,
        }
    }

    /// Topic this window accounts for
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Account for one received frame
    ///
    /// # Arguments
    /// * `frame` - Decoded header fields
    /// * `receive_nanos` - Monotonic receive time in nanoseconds
    pub fn record(&mut self, frame: &DecodedFrame, receive_nanos: i64) {
        self.received += 1;
        self.last_payload_size = frame.payload_len;

        match frame.sequence_id {
            Some(id) => {
                match self.first_id {
                    None => self.first_id = Some(id),
                    // A jump of any size counts as one missed event
                    Some(_) if u64::from(id) > u64::from(self.last_id) + 1 => {
                        self.missed_events += 1;
                    }
                    Some(_) => {}
                }
                self.last_id = id;
            }
            None => self.short_frames += 1,
        }

        if let Some(sent) = frame.send_timestamp {
            let latency = latency_ms(sent, receive_nanos);
            self.latency_sum_ms += latency;
            self.latency_samples += 1;
            self.min_latency_ms = self.min_latency_ms.min(latency);
            self.max_latency_ms = self.max_latency_ms.max(latency);
        }
    }

    /// Frames received since start
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames too short to carry a sequence id
    pub fn short_frames(&self) -> u64 {
        self.short_frames
    }

    /// Forward sequence jumps seen so far
    pub fn missed_events(&self) -> u64 {
        self.missed_events
    }

    /// Size of the most recent payload
    pub fn last_payload_size(&self) -> usize {
        self.last_payload_size
    }

    /// Span of sequence ids seen, `last - first`
    ///
    /// Zero before the first id and when ids went backwards past the first.
    pub fn total_expected(&self) -> u64 {
        self.first_id
            .map_or(0, |first| u64::from(self.last_id.saturating_sub(first)))
    }

    /// Loss percentage as of now
    ///
    /// A window with no new frames reports 100%.
    pub fn loss_rate(&self) -> f64 {
        if self.received == self.snapshot_received {
            return 100.0;
        }
        let expected = self.total_expected();
        if expected == 0 {
            return 0.0;
        }
        self.missed_events as f64 / expected as f64 * 100.0
    }

    /// Frames per second since the last snapshot
    pub fn window_rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.received - self.snapshot_received) as f64 / secs
    }

    /// Mean latency since the last snapshot, NaN without samples
    pub fn window_latency_ms(&self) -> f64 {
        let samples = self.latency_samples - self.snapshot_latency_samples;
        if samples == 0 {
            return f64::NAN;
        }
        (self.latency_sum_ms - self.snapshot_latency_sum_ms) / samples as f64
    }

    /// Mean latency over the whole run
    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0).then(|| self.latency_sum_ms / self.latency_samples as f64)
    }

    /// Smallest latency seen over the whole run
    pub fn min_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0).then_some(self.min_latency_ms)
    }

    /// Largest latency seen over the whole run
    pub fn max_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0).then_some(self.max_latency_ms)
    }

    /// Build the report for the current window, then start a new window
    pub fn take_report(&mut self, elapsed: Duration) -> ChannelReport {
        let report = ChannelReport {
            topic: self.topic.clone(),
            payload_size: self.last_payload_size,
            rate_hz: self.window_rate(elapsed),
            latency_ms: self.window_latency_ms(),
            loss_percent: self.loss_rate(),
            received: self.received,
            missed_events: self.missed_events,
        };
        self.snapshot();
        report
    }

    fn snapshot(&mut self) {
        self.snapshot_received = self.received;
        self.snapshot_latency_sum_ms = self.latency_sum_ms;
        self.snapshot_latency_samples = self.latency_samples;
    }

    /// End-of-run totals
    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            topic: self.topic.clone(),
            received: self.received,
            missed_events: self.missed_events,
            short_frames: self.short_frames,
            mean_latency_ms: self.mean_latency_ms(),
            min_latency_ms: self.min_latency_ms(),
            max_latency_ms: self.max_latency_ms(),
            finished_at: Utc::now(),
        }
    }
}

/// Cumulative receive totals for one channel
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelSummary {
    pub topic: String,
    pub received: u64,
    pub missed_events: u64,
    pub short_frames: u64,
    pub mean_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub finished_at: chrono::DateTime<Utc>,
}
