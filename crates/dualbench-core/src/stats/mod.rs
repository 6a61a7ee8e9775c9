//! Statistics collection and reporting
//!
//! - Per-channel receive accounting with windowed snapshots ([`window`])
//! - Status report types, formatting and output sinks ([`report`])

pub mod report;
pub mod window;
