//! Run orchestration
//!
//! Validates a [`RunConfig`], opens the channels it names and drives one
//! publisher strategy or the subscriber to completion. In loopback mode a
//! subscriber runs on its own thread next to the publisher, sharing the
//! transport.

use crate::config::{Mode, RunConfig, TransportKind};
use crate::stats::report::ReportSink;
use crate::traffic::publisher::{DualPublisher, PublisherSummary};
use crate::traffic::schedule::{RunDeadline, StopSignal};
use crate::traffic::strategy::strategy_for;
use crate::traffic::subscriber::{DualSubscriber, SubscriberSummary, WAIT_TIMEOUT};
use crate::transport::{MemoryBus, Transport, UdpTransport};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub publisher: Option<PublisherSummary>,
    pub subscriber: Option<SubscriberSummary>,
}

/// Build the transport a config asks for
pub fn build_transport(config: &RunConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Udp => Arc::new(UdpTransport::new(config.routes.clone())),
        TransportKind::Memory => Arc::new(MemoryBus::new()),
    }
}

/// Execute one run
///
/// # Arguments
/// * `config` - What to run, validated before anything is opened
/// * `transport` - Transport shared by every channel
/// * `stop` - Raised externally to end the run early
/// * `sink` - Destination for status reports
pub fn run(
    config: &RunConfig,
    transport: Arc<dyn Transport>,
    stop: StopSignal,
    sink: Arc<dyn ReportSink>,
) -> anyhow::Result<RunSummary> {
    config.validate()?;

    let [channel1, channel2] = config.channels();
    let topics = [channel1.topic.as_str(), channel2.topic.as_str()];

    tracing::info!(
        version = crate::VERSION,
        mode = %config.mode,
        transport = transport.name(),
        duration = config.duration_secs,
        "Starting run"
    );

    let Some(strategy) = strategy_for(config.mode, config.threads) else {
        let mut subscriber = DualSubscriber::open(transport.as_ref(), topics)?;
        let deadline = RunDeadline::new(Instant::now(), config.duration_secs);
        let summary = subscriber.run(deadline, &stop, sink.as_ref());
        return Ok(RunSummary {
            mode: config.mode,
            publisher: None,
            subscriber: Some(summary),
        });
    };

    let publisher = DualPublisher::open(transport.as_ref(), config.channels())?;

    let loopback = if config.loopback {
        let mut subscriber = DualSubscriber::open(transport.as_ref(), topics)?;
        let sub_stop = StopSignal::new();
        let thread_stop = sub_stop.clone();
        let thread_sink = Arc::clone(&sink);
        let start = Instant::now();
        let handle = std::thread::Builder::new()
            .name("loopback-sub".to_string())
            .spawn(move || {
                subscriber.run(
                    RunDeadline::unbounded(start),
                    &thread_stop,
                    thread_sink.as_ref(),
                )
            })
            .context("Failed to spawn loopback subscriber")?;
        Some((handle, sub_stop))
    } else {
        None
    };

    let deadline = RunDeadline::new(Instant::now(), config.duration_secs);
    let published = publisher.run(strategy.as_ref(), deadline, &stop, sink.as_ref());

    let subscriber = match loopback {
        Some((handle, sub_stop)) => {
            // Let in-flight frames land before the subscriber stops
            std::thread::sleep(WAIT_TIMEOUT * 2);
            sub_stop.raise();
            let summary = handle
                .join()
                .map_err(|_| anyhow!("Loopback subscriber panicked"))?;
            Some(summary)
        }
        None => None,
    };

    Ok(RunSummary {
        mode: config.mode,
        publisher: Some(published?),
        subscriber,
    })
}
