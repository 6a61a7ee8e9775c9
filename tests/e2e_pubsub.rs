//! E2E tests for complete publish/subscribe runs
//!
//! Runs a publisher with an in-process subscriber over both transports and
//! checks what the subscriber saw against what the publisher sent.

use dualbench::runner::build_transport;
use dualbench::stats::report::CollectingSink;
use dualbench::{Mode, RunConfig, StopSignal, TransportKind};
use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

fn loopback_config(rate: f64, payload: usize, secs: f64) -> RunConfig {
    let mut config = RunConfig {
        mode: Mode::Pub,
        duration_secs: secs,
        transport: TransportKind::Memory,
        loopback: true,
        ..RunConfig::default()
    };
    for channel in [&mut config.channel1, &mut config.channel2] {
        channel.rate_hz = rate;
        channel.payload_size = payload;
    }
    config
}

fn free_port() -> SocketAddr {
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// 10 Hz, 20 bytes, 2 seconds: about 20 frames per channel, no loss
#[test]
fn test_ten_hertz_two_seconds() {
    let config = loopback_config(10.0, 20, 2.0);
    let sink = Arc::new(CollectingSink::new());

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        StopSignal::new(),
        sink.clone(),
    )
    .unwrap();

    let published = summary.publisher.unwrap();
    let received = summary.subscriber.unwrap();
    for (sent, got) in published.channels.iter().zip(received.channels.iter()) {
        assert!(
            (19..=21).contains(&sent.sent),
            "{} sent {} frames",
            sent.topic,
            sent.sent
        );
        assert_eq!(got.received, sent.sent, "{} lost frames", sent.topic);
        assert_eq!(got.missed_events, 0);
    }

    let reports = sink.subscriber_reports();
    assert!(reports.len() >= 2, "{} status reports", reports.len());
    for report in &reports {
        for channel in &report.channels {
            assert_eq!(channel.loss_percent, 0.0, "{}", report);
            assert!(channel.latency_ms >= 0.0 && channel.latency_ms < 100.0);
            assert_eq!(channel.payload_size, 20);
        }
    }
    // The first window starts before the publisher does; every full one after holds 10 Hz +-10%
    for report in &reports[1..] {
        for channel in &report.channels {
            assert!(
                (9.0..=11.0).contains(&channel.rate_hz),
                "rate out of range: {}",
                report
            );
        }
    }
}

/// Two-byte payloads: frames arrive, loss stays 0%, latency is NaN
#[test]
fn test_two_byte_payloads() {
    let config = loopback_config(10.0, 2, 1.3);
    let sink = Arc::new(CollectingSink::new());

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        StopSignal::new(),
        sink.clone(),
    )
    .unwrap();

    let received = summary.subscriber.unwrap();
    for channel in &received.channels {
        assert!(channel.received > 0);
        assert_eq!(channel.short_frames, channel.received);
        assert_eq!(channel.mean_latency_ms, None);
    }

    let reports = sink.subscriber_reports();
    assert_eq!(reports.len(), 1);
    for channel in &reports[0].channels {
        assert_eq!(channel.loss_percent, 0.0);
        assert!(channel.latency_ms.is_nan());
    }
    assert!(reports[0].to_string().contains("2 B, "));
}

/// Publisher reports track both channels once per second
#[test]
fn test_publisher_status_reports() {
    let mut config = loopback_config(20.0, 40, 2.2);
    config.loopback = false;
    let sink = Arc::new(CollectingSink::new());

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        StopSignal::new(),
        sink.clone(),
    )
    .unwrap();
    assert!(summary.subscriber.is_none());

    let reports = sink.publisher_reports();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.channels.len(), 2);
        for channel in &report.channels {
            assert!((15.0..=25.0).contains(&channel.rate_hz), "{}", report);
            assert_eq!(channel.send_failures, 0);
        }
        assert!(report.to_string().starts_with("Publishing: topic_1 "));
    }
}

/// Frames cross a real UDP socket with no loss on loopback
#[test]
fn test_udp_loopback_run() {
    let mut config = loopback_config(50.0, 64, 1.0);
    config.transport = TransportKind::Udp;
    config.routes = BTreeMap::from([
        ("topic_1".to_string(), free_port()),
        ("topic_2".to_string(), free_port()),
    ]);

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
        assert!(sent.sent >= 40, "{} sent only {}", sent.topic, sent.sent);
        assert!(
            got.received + 1 >= sent.sent,
            "{} received {} of {}",
            got.topic,
            got.received,
            sent.sent
        );
        let latency = got.mean_latency_ms.unwrap();
        assert!((0.0..100.0).contains(&latency), "latency {}", latency);
    }
}

/// Ctrl+C style stop ends an unbounded run
#[test]
fn test_stop_ends_unbounded_run() {
    let config = loopback_config(10.0, 20, 0.0);
    let stop = StopSignal::new();
    let trigger = stop.clone();
    let raiser = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(300));
        trigger.raise();
    });

    let summary = dualbench::run(
        &config,
        build_transport(&config),
        stop,
        Arc::new(CollectingSink::new()),
    )
    .unwrap();
    raiser.join().unwrap();

    let published = summary.publisher.unwrap();
    assert!(published.channels[0].sent >= 2);
}
