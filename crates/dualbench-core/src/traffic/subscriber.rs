//! Dual-channel subscriber
//!
//! Waits on both topics at once with a bounded timeout, so the status report
//! keeps its one-second cadence even when no traffic arrives. The
//! [`StatWindow`]s are owned by the receive loop; taking a report and moving
//! the snapshot forward is a single `&mut` step.

use super::frame::decode;
use super::schedule::{RunDeadline, StopSignal};
use crate::clock::monotonic_nanos;
use crate::stats::report::{ReportSink, ReportTimer, SubscriberStatus};
use crate::stats::window::{ChannelSummary, StatWindow};
use crate::transport::{wait_for_any, SubscribeHandle, Transport};
use anyhow::bail;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Longest single wait for traffic
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Frames taken from one handle per wake-up before rechecking the clock
const MAX_DRAIN: usize = 256;

/// End-of-run receive totals
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberSummary {
    pub channels: [ChannelSummary; 2],
}

impl fmt::Display for SubscriberSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} messages from {} and {} messages from {}",
            self.channels[0].received,
            self.channels[0].topic,
            self.channels[1].received,
            self.channels[1].topic
        )
    }
}

/// Receiver for both channels of a run
#[derive(Debug)]
pub struct DualSubscriber {
    /// Open handles with the index of the window they feed
    handles: Vec<(usize, SubscribeHandle)>,
    windows: [StatWindow; 2],
}

impl DualSubscriber {
    /// Subscribe to both topics
    ///
    /// A topic that cannot be opened is logged and keeps an empty window, so
    /// its status shows total loss. Fails only if neither topic opens.
    pub fn open(transport: &dyn Transport, topics: [&str; 2]) -> anyhow::Result<Self> {
        let mut handles = Vec::with_capacity(topics.len());
        for (index, topic) in topics.iter().enumerate() {
            match transport.open_subscriber(topic) {
                Ok(handle) => handles.push((index, handle)),
                Err(e) => tracing::error!(topic, error = %e, "Subscriber setup failed"),
            }
        }
        if handles.is_empty() {
            bail!("No subscriber could be opened on {} transport", transport.name());
        }
        tracing::info!(
            transport = transport.name(),
            topic1 = topics[0],
            topic2 = topics[1],
            "Subscribed"
        );
        Ok(Self {
            handles,
            windows: [StatWindow::new(topics[0]), StatWindow::new(topics[1])],
        })
    }

    /// Statistics for both channels
    pub fn windows(&self) -> &[StatWindow; 2] {
        &self.windows
    }

    /// Receive until the deadline passes or a stop is raised
    pub fn run(
        &mut self,
        deadline: RunDeadline,
        stop: &StopSignal,
        sink: &dyn ReportSink,
    ) -> SubscriberSummary {
        let handles: Vec<&SubscribeHandle> = self.handles.iter().map(|(_, h)| h).collect();
        let mut timer = ReportTimer::new(crate::REPORT_INTERVAL, deadline.start());

        loop {
            let now = Instant::now();
            if stop.is_raised() || deadline.expired(now) {
                break;
            }

            let mut timeout = WAIT_TIMEOUT.min(timer.next_due().saturating_duration_since(now));
            if let Some(left) = deadline.remaining(now) {
                timeout = timeout.min(left);
            }

            for ready in wait_for_any(&handles, timeout) {
                let (slot, handle) = &self.handles[ready];
                let window = &mut self.windows[*slot];
                for _ in 0..MAX_DRAIN {
                    let Some(bytes) = handle.receive() else { break };
                    window.record(&decode(&bytes), monotonic_nanos());
                }
            }

            if let Some(elapsed) = timer.poll(Instant::now()) {
                let [first, second] = &mut self.windows;
                let status = SubscriberStatus {
                    timestamp: Utc::now(),
                    channels: [first.take_report(elapsed), second.take_report(elapsed)],
                };
                sink.subscriber_status(&status);
            }
        }

        let summary = SubscriberSummary {
            channels: [self.windows[0].summary(), self.windows[1].summary()],
        };
        tracing::info!("{}", summary);
        for channel in &summary.channels {
            tracing::debug!(
                topic = %channel.topic,
                missed_events = channel.missed_events,
                short_frames = channel.short_frames,
                min_latency_ms = ?channel.min_latency_ms,
                max_latency_ms = ?channel.max_latency_ms,
                "Channel totals"
            );
        }
        summary
    }
}
