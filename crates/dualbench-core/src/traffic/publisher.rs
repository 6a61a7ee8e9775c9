//! Dual-channel publisher
//!
//! A [`Channel`] owns one topic's publish handle, encoder and sequence
//! counter. The sequence id advances only when a send succeeds, so a failed
//! send never shows up as a gap on the receiving side. Cumulative counters
//! live in atomics shared with the [`PublisherReporter`], which may run on a
//! different thread than the channel.

use super::frame::FrameEncoder;
use super::strategy::{ExecutionStrategy, RunContext};
use crate::config::ChannelConfig;
use crate::stats::report::{PublisherChannelStatus, PublisherStatus, ReportSink, ReportTimer};
use crate::traffic::schedule::{RunDeadline, StopSignal};
use crate::transport::{PublishHandle, Transport};
use anyhow::bail;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Cumulative send counters for one channel
#[derive(Debug, Default)]
pub struct ChannelCounters {
    sent: AtomicU64,
    send_failures: AtomicU64,
}

impl ChannelCounters {
    /// Frames sent successfully
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sends that failed
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

/// One publishing channel
pub struct Channel {
    config: ChannelConfig,
    encoder: FrameEncoder,
    sequence: u32,
    publisher: Box<dyn PublishHandle>,
    counters: Arc<ChannelCounters>,
}

impl Channel {
    /// Wrap an open publish handle
    pub fn new(config: ChannelConfig, publisher: Box<dyn PublishHandle>) -> Self {
        Self {
            encoder: FrameEncoder::new(config.payload_size, config.fill_byte),
            config,
            sequence: 0,
            publisher,
            counters: Arc::new(ChannelCounters::default()),
        }
    }

    /// Topic name
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Sequence id the next frame will carry
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Shared counters
    pub fn counters(&self) -> Arc<ChannelCounters> {
        Arc::clone(&self.counters)
    }

    /// Encode and send the next frame
    ///
    /// Returns true if the frame was sent.
    pub fn emit(&mut self) -> bool {
        let frame = self.encoder.encode(self.sequence);
        match self.publisher.send(&frame) {
            Ok(()) => {
                self.sequence = self.sequence.wrapping_add(1);
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                let failures = self.counters.send_failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    topic = %self.config.topic,
                    sequence = self.sequence,
                    failures,
                    error = %e,
                    "Publish failed"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("config", &self.config)
            .field("sequence", &self.sequence)
            .field("counters", &self.counters)
            .finish()
    }
}

#[derive(Debug)]
struct ReportWindow {
    timer: ReportTimer,
    last_sent: Vec<u64>,
}

/// Once-per-second publisher throughput reports
///
/// Reading the counters and moving the snapshot forward happen under one
/// lock, so concurrent callers never double count a window.
#[derive(Debug)]
pub struct PublisherReporter {
    channels: Vec<(String, Arc<ChannelCounters>)>,
    window: Mutex<ReportWindow>,
}

impl PublisherReporter {
    /// Create a reporter for the given channels, first window starting at `start`
    pub fn new(channels: &[Channel], start: Instant) -> Self {
        Self {
            channels: channels
                .iter()
                .map(|c| (c.topic().to_string(), c.counters()))
                .collect(),
            window: Mutex::new(ReportWindow {
                timer: ReportTimer::new(crate::REPORT_INTERVAL, start),
                last_sent: vec![0; channels.len()],
            }),
        }
    }

    /// Report if a window closed at `now`
    pub fn poll(&self, now: Instant) -> Option<PublisherStatus> {
        let mut window = self.window.lock().ok()?;
        let elapsed = window.timer.poll(now)?.as_secs_f64();

        let mut channels = Vec::with_capacity(self.channels.len());
        for ((topic, counters), last) in self.channels.iter().zip(window.last_sent.iter_mut()) {
            let sent = counters.sent();
            channels.push(PublisherChannelStatus {
                topic: topic.clone(),
                sent,
                rate_hz: (sent - *last) as f64 / elapsed,
                send_failures: counters.send_failures(),
            });
            *last = sent;
        }

        Some(PublisherStatus {
            timestamp: Utc::now(),
            channels,
        })
    }
}

/// Final totals for one published channel
#[derive(Debug, Clone, Serialize)]
pub struct PublishedChannel {
    pub topic: String,
    pub sent: u64,
    pub send_failures: u64,
    pub rate_hz: f64,
    pub payload_size: usize,
}

/// Final totals for a publisher run
#[derive(Debug, Clone, Serialize)]
pub struct PublisherSummary {
    pub strategy: &'static str,
    pub channels: Vec<PublishedChannel>,
}

impl PublisherSummary {
    /// Totals for a topic
    pub fn channel(&self, topic: &str) -> Option<&PublishedChannel> {
        self.channels.iter().find(|c| c.topic == topic)
    }
}

impl fmt::Display for PublisherSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Published ")?;
        for (i, ch) in self.channels.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(
                f,
                "{} messages to {} ({:.1} Hz, {} bytes)",
                ch.sent, ch.topic, ch.rate_hz, ch.payload_size
            )?;
        }
        Ok(())
    }
}

/// Publisher for both channels of a run
#[derive(Debug)]
pub struct DualPublisher {
    channels: Vec<Channel>,
}

impl DualPublisher {
    /// Open a publish handle per channel
    ///
    /// A channel that cannot be opened is logged and left out. Fails only if
    /// neither channel opens.
    pub fn open(transport: &dyn Transport, configs: [&ChannelConfig; 2]) -> anyhow::Result<Self> {
        let mut channels = Vec::with_capacity(configs.len());
        for config in configs {
            match transport.open_publisher(&config.topic) {
                Ok(handle) => channels.push(Channel::new(config.clone(), handle)),
                Err(e) => tracing::error!(topic = %config.topic, error = %e, "Publisher setup failed"),
            }
        }
        if channels.is_empty() {
            bail!("No publisher could be opened on {} transport", transport.name());
        }
        Ok(Self { channels })
    }

    /// Open channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Drive every channel with `strategy` until the deadline or a stop
    pub fn run(
        self,
        strategy: &dyn ExecutionStrategy,
        deadline: RunDeadline,
        stop: &StopSignal,
        sink: &dyn ReportSink,
    ) -> anyhow::Result<PublisherSummary> {
        let reporter = PublisherReporter::new(&self.channels, deadline.start());
        let totals: Vec<(ChannelConfig, Arc<ChannelCounters>)> = self
            .channels
            .iter()
            .map(|c| (c.config().clone(), c.counters()))
            .collect();

        tracing::info!(
            strategy = strategy.name(),
            channels = self.channels.len(),
            duration = ?deadline.limit(),
            "Publishing"
        );

        let ctx = RunContext {
            deadline,
            stop: stop.clone(),
            reporter: &reporter,
            sink,
        };
        strategy.run(self.channels, &ctx)?;

        let summary = PublisherSummary {
            strategy: strategy.name(),
            channels: totals
                .into_iter()
                .map(|(config, counters)| PublishedChannel {
                    topic: config.topic,
                    sent: counters.sent(),
                    send_failures: counters.send_failures(),
                    rate_hz: config.rate_hz,
                    payload_size: config.payload_size,
                })
                .collect(),
        };
        tracing::info!("{}", summary);
        Ok(summary)
    }
}
