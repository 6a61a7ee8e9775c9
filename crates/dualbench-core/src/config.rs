//! Run configuration
//!
//! A run is fully described by [`RunConfig`]. It can be loaded from a JSON
//! file, and the CLI layers its flags on top. Missing JSON fields fall back to
//! the same defaults the CLI uses.

use crate::transport::udp::{default_routes, MAX_UDP_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors in user-supplied configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid --mode: {0} (expected pub, sub, parallel_pub or timer_pub)")]
    InvalidMode(String),

    #[error("Invalid --transport: {0} (expected udp or memory)")]
    InvalidTransport(String),

    #[error("Rate for {topic} must be a positive number of Hz, got {rate}")]
    InvalidRate { topic: String, rate: f64 },

    #[error("Payload for {topic} is {size} bytes, UDP carries at most {max}")]
    PayloadTooLarge {
        topic: String,
        size: usize,
        max: usize,
    },

    #[error("Thread count must be at least 1, got {0}")]
    InvalidThreads(usize),

    #[error("Topic name for channel {0} is empty")]
    EmptyTopic(usize),

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What this process does for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Publish both channels from one cooperative polling loop
    Pub,
    /// Receive both channels and report statistics
    #[default]
    Sub,
    /// Publish each channel from its own thread
    ParallelPub,
    /// Publish from recurring timers on a worker pool
    TimerPub,
}

impl Mode {
    /// Name as accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Pub => "pub",
            Mode::Sub => "sub",
            Mode::ParallelPub => "parallel_pub",
            Mode::TimerPub => "timer_pub",
        }
    }

    /// Whether this mode publishes traffic
    pub fn is_publisher(&self) -> bool {
        !matches!(self, Mode::Sub)
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub" => Ok(Mode::Pub),
            "sub" => Ok(Mode::Sub),
            "parallel_pub" => Ok(Mode::ParallelPub),
            "timer_pub" => Ok(Mode::TimerPub),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport carries the frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// UDP datagrams between processes
    #[default]
    Udp,
    /// In-process bus (only useful with loopback)
    Memory,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(TransportKind::Udp),
            "memory" => Ok(TransportKind::Memory),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

/// One channel's publishing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Topic name
    pub topic: String,
    /// Target rate in messages per second
    pub rate_hz: f64,
    /// Payload size in bytes
    pub payload_size: usize,
    /// Padding byte
    pub fill_byte: u8,
}

impl ChannelConfig {
    /// Create a channel configuration
    pub fn new(topic: impl Into<String>, rate_hz: f64, payload_size: usize, fill_byte: u8) -> Self {
        Self {
            topic: topic.into(),
            rate_hz,
            payload_size,
            fill_byte,
        }
    }
}

fn default_duration() -> f64 {
    3.0
}

fn default_threads() -> usize {
    1
}

fn default_channel1() -> ChannelConfig {
    ChannelConfig::new("topic_1", 1.0, 20, crate::CHANNEL1_FILL)
}

fn default_channel2() -> ChannelConfig {
    ChannelConfig::new("topic_2", 2.0, 40, crate::CHANNEL2_FILL)
}

/// Complete description of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Publisher strategy or subscriber
    #[serde(default)]
    pub mode: Mode,
    /// Run length in seconds; zero or negative runs until stopped
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
    /// Worker threads for the timer-driven publisher
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Transport carrying the frames
    #[serde(default)]
    pub transport: TransportKind,
    /// First channel
    #[serde(default = "default_channel1")]
    pub channel1: ChannelConfig,
    /// Second channel
    #[serde(default = "default_channel2")]
    pub channel2: ChannelConfig,
    /// UDP topic routes
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, SocketAddr>,
    /// Also run an in-process subscriber next to a publisher
    #[serde(default)]
    pub loopback: bool,
    /// Emit subscriber status as JSON lines
    #[serde(default)]
    pub json_status: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            duration_secs: default_duration(),
            threads: default_threads(),
            transport: TransportKind::default(),
            channel1: default_channel1(),
            channel2: default_channel2(),
            routes: default_routes(),
            loopback: false,
            json_status: false,
        }
    }
}

impl RunConfig {
    /// Both channels in order
    pub fn channels(&self) -> [&ChannelConfig; 2] {
        [&self.channel1, &self.channel2]
    }

    /// Check every value before any transport is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, channel) in self.channels().into_iter().enumerate() {
            if channel.topic.trim().is_empty() {
                return Err(ConfigError::EmptyTopic(i + 1));
            }
            if !(channel.rate_hz.is_finite() && channel.rate_hz > 0.0) {
                return Err(ConfigError::InvalidRate {
                    topic: channel.topic.clone(),
                    rate: channel.rate_hz,
                });
            }
            if self.transport == TransportKind::Udp && channel.payload_size > MAX_UDP_PAYLOAD {
                return Err(ConfigError::PayloadTooLarge {
                    topic: channel.topic.clone(),
                    size: channel.payload_size,
                    max: MAX_UDP_PAYLOAD,
                });
            }
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads(self.threads));
        }
        Ok(())
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        tracing::info!(path = %path.display(), "Loaded config from disk");
        Ok(config)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
