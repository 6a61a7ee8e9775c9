//! Dualbench Core - rate-controlled pub/sub traffic generation and measurement
//!
//! Drives two independently rate-controlled message streams over a pub/sub
//! transport and computes per-channel throughput, latency and loss on the
//! receiving side. Every frame embeds its own sequence id and send timestamp,
//! so no external clock or coordination is needed to measure loss and latency.

pub mod clock;
pub mod config;
pub mod runner;
pub mod stats;
pub mod traffic;
pub mod transport;

pub use config::{ChannelConfig, ConfigError, Mode, RunConfig, TransportKind};
pub use runner::{build_transport, run, RunSummary};
pub use stats::report::{CollectingSink, ConsoleSink, ReportSink};
pub use stats::window::StatWindow;
pub use traffic::frame::{decode, encode, DecodedFrame, FrameEncoder};
pub use traffic::publisher::{DualPublisher, PublisherSummary};
pub use traffic::schedule::{RateSchedule, RunDeadline, StopSignal};
pub use traffic::strategy::{strategy_for, ExecutionStrategy};
pub use traffic::subscriber::{DualSubscriber, SubscriberSummary};
pub use transport::{MemoryBus, Transport, TransportError, UdpTransport};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Fill byte for channel 1 padding
pub const CHANNEL1_FILL: u8 = 0xA1;

/// Fill byte for channel 2 padding
pub const CHANNEL2_FILL: u8 = 0xB2;

/// Status report cadence
pub const REPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
