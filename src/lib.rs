//! Dualbench - dual-channel pub/sub traffic generator
//!
//! This library re-exports the traffic, transport and statistics layers from
//! `dualbench-core` and adds the command line front end.

pub mod cli;

pub use dualbench_core::{clock, config, runner, stats, traffic, transport};

pub use dualbench_core::{
    run, ConfigError, ConsoleSink, MemoryBus, Mode, ReportSink, RunConfig, RunSummary,
    StatWindow, StopSignal, Transport, TransportKind, UdpTransport,
};
pub use dualbench_core::{BUILD_DATE, VERSION};
