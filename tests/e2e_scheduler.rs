//! E2E tests for the scheduling strategies
//!
//! Every publisher mode must send the same traffic for the same settings,
//! within a little scheduling slack.

use dualbench::runner::build_transport;
use dualbench::stats::report::CollectingSink;
use dualbench::traffic::schedule::period_for_rate;
use dualbench::{Mode, RunConfig, StopSignal, TransportKind};
use std::sync::Arc;
use std::time::Duration;

fn sent_counts(mode: Mode, threads: usize) -> (u64, u64) {
    let mut config = RunConfig {
        mode,
        threads,
        duration_secs: 1.0,
        transport: TransportKind::Memory,
        loopback: true,
        ..RunConfig::default()
    };
    config.channel1.rate_hz = 20.0;
    config.channel2.rate_hz = 5.0;

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        StopSignal::new(),
        Arc::new(CollectingSink::new()),
    )
    .unwrap();

    let published = summary.publisher.unwrap();
    let received = summary.subscriber.unwrap();
    for (sent, got) in published.channels.iter().zip(received.channels.iter()) {
        assert_eq!(sent.sent, got.received, "{} {}", mode, sent.topic);
        assert_eq!(got.missed_events, 0, "{} {}", mode, sent.topic);
    }
    (published.channels[0].sent, published.channels[1].sent)
}

/// Cooperative, thread-per-channel and timer strategies agree
#[test]
fn test_strategies_send_equivalent_traffic() {
    let cooperative = sent_counts(Mode::Pub, 1);
    let threaded = sent_counts(Mode::ParallelPub, 1);
    let timer = sent_counts(Mode::TimerPub, 1);
    let timer_pool = sent_counts(Mode::TimerPub, 4);

    // Timer ticks may slip one extra period over a short run
    for (name, counts, slack) in [
        ("parallel_pub", threaded, 1),
        ("timer_pub", timer, 2),
        ("timer_pub x4", timer_pool, 2),
    ] {
        assert!(
            cooperative.0.abs_diff(counts.0) <= slack,
            "{} channel 1: {} vs {}",
            name,
            counts.0,
            cooperative.0
        );
        assert!(
            cooperative.1.abs_diff(counts.1) <= slack,
            "{} channel 2: {} vs {}",
            name,
            counts.1,
            cooperative.1
        );
    }

    assert!((18..=21).contains(&cooperative.0), "{:?}", cooperative);
    assert!((4..=6).contains(&cooperative.1), "{:?}", cooperative);
}

/// Rates above 1 kHz saturate at the 1 ms tick instead of failing
#[test]
fn test_high_rate_saturates() {
    assert_eq!(period_for_rate(10_000.0), Duration::from_millis(1));

    let mut config = RunConfig {
        mode: Mode::TimerPub,
        duration_secs: 0.3,
        transport: TransportKind::Memory,
        ..RunConfig::default()
    };
    config.channel1.rate_hz = 10_000.0;

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        StopSignal::new(),
        Arc::new(CollectingSink::new()),
    )
    .unwrap();

    let sent = summary.publisher.unwrap().channels[0].sent;
    assert!(sent > 50, "sent {}", sent);
    assert!(sent <= 301, "sent {}", sent);
}

/// Low rates are quantized to whole milliseconds
#[test]
fn test_period_truncation() {
    assert_eq!(period_for_rate(3.0), Duration::from_millis(333));
    assert_eq!(period_for_rate(0.5), Duration::from_millis(2000));
    assert_eq!(period_for_rate(999.0), Duration::from_millis(1));
}
