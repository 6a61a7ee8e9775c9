//! Monotonic timestamps for frame latency
//!
//! Publisher and subscriber may live in different processes, so the send
//! timestamp embedded in a frame must come from a clock both sides can read.
//! On Unix this is `CLOCK_MONOTONIC`, which is system-wide. Elsewhere we fall
//! back to a process-local anchor, which is only meaningful when both ends run
//! in the same process (loopback mode and tests).

/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Current monotonic time in nanoseconds
#[cfg(unix)]
pub fn monotonic_nanos() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is always
    // supported on the Unix targets we build for.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return fallback_nanos();
    }
    (ts.tv_sec as i64)
        .saturating_mul(1_000_000_000)
        .saturating_add(ts.tv_nsec as i64)
}

/// Current monotonic time in nanoseconds
#[cfg(not(unix))]
pub fn monotonic_nanos() -> i64 {
    fallback_nanos()
}

fn fallback_nanos() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(Instant::now);
    i64::try_from(anchor.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Milliseconds between a send and a receive timestamp
pub fn latency_ms(send_nanos: i64, receive_nanos: i64) -> f64 {
    receive_nanos.saturating_sub(send_nanos) as f64 / NANOS_PER_MILLI
}
