//! E2E tests for frame encoding across payload sizes
//!
//! Frames travel through a real transport and must decode to the fields
//! their size allows.

use dualbench::traffic::frame::{decode, encode, encode_at, FrameEncoder, HEADER_LEN};
use dualbench::{MemoryBus, Transport};

/// Sizes of at least 12 bytes round-trip both fields
#[test]
fn test_round_trip_full_header() {
    for size in [12, 13, 20, 40, 1500, 65_000] {
        let bytes = encode_at(size, 0xA1, 77, 123_456_789);
        let frame = decode(&bytes);
        assert_eq!(frame.sequence_id, Some(77), "size {}", size);
        assert_eq!(frame.send_timestamp, Some(123_456_789), "size {}", size);
        assert_eq!(frame.payload_len, size);
        assert!(bytes[HEADER_LEN..].iter().all(|&b| b == 0xA1));
    }
}

/// Sizes between 4 and 11 bytes carry the id only
#[test]
fn test_id_only_sizes() {
    for size in 4..HEADER_LEN {
        let frame = decode(&encode(size, 0xB2, 9));
        assert_eq!(frame.sequence_id, Some(9), "size {}", size);
        assert_eq!(frame.send_timestamp, None, "size {}", size);
    }
}

/// Sizes under 4 bytes carry nothing and still decode
#[test]
fn test_tiny_payloads_decode() {
    for size in 0..4 {
        let bytes = encode(size, 0xB2, 9);
        assert!(bytes.iter().all(|&b| b == 0xB2));
        let frame = decode(&bytes);
        assert_eq!(frame.sequence_id, None);
        assert_eq!(frame.send_timestamp, None);
        assert_eq!(frame.payload_len, size);
    }
}

/// Encoded frames survive the in-process transport untouched
#[test]
fn test_frames_through_memory_bus() {
    let bus = MemoryBus::new();
    let sub = bus.open_subscriber("topic_1").unwrap();
    let mut publisher = bus.open_publisher("topic_1").unwrap();
    let encoder = FrameEncoder::new(20, 0xA1);

    for id in 0..3 {
        publisher.send(&encoder.encode_at(id, 1_000 + i64::from(id))).unwrap();
    }

    for id in 0..3 {
        let frame = decode(&sub.receive().unwrap());
        assert_eq!(frame.sequence_id, Some(id));
        assert_eq!(frame.send_timestamp, Some(1_000 + i64::from(id)));
    }
    assert!(sub.receive().is_none());
}

/// Send timestamps come from a clock that does not go backwards
#[test]
fn test_timestamps_are_monotonic() {
    let encoder = FrameEncoder::new(12, 0);
    let first = decode(&encoder.encode(0)).send_timestamp.unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = decode(&encoder.encode(1)).send_timestamp.unwrap();
    assert!(second > first);
}
