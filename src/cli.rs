//! Command line interface
//!
//! Every flag is optional so a `--config` file can supply the base values;
//! flags given on the command line override the file.

use clap::Parser;
use dualbench_core::{ConfigError, Mode, RunConfig, TransportKind};
use std::path::PathBuf;

/// Dual-channel pub/sub traffic generator
#[derive(Debug, Parser)]
#[command(name = "dualbench", version, about)]
pub struct Cli {
    /// Run mode: pub, sub, parallel_pub or timer_pub [default: sub]
    #[arg(long, value_name = "MODE")]
    pub mode: Option<Mode>,

    /// First channel topic [default: topic_1]
    #[arg(long)]
    pub topic1: Option<String>,

    /// Second channel topic [default: topic_2]
    #[arg(long)]
    pub topic2: Option<String>,

    /// Run length in seconds, 0 or less runs until Ctrl+C [default: 3]
    #[arg(long, allow_negative_numbers = true)]
    pub duration: Option<f64>,

    /// First channel rate in Hz [default: 1]
    #[arg(long, allow_negative_numbers = true)]
    pub rate1: Option<f64>,

    /// Second channel rate in Hz [default: 2]
    #[arg(long, allow_negative_numbers = true)]
    pub rate2: Option<f64>,

    /// First channel payload size in bytes, at most 65507 over udp [default: 20]
    #[arg(long)]
    pub payload1: Option<usize>,

    /// Second channel payload size in bytes, at most 65507 over udp [default: 40]
    #[arg(long)]
    pub payload2: Option<usize>,

    /// Worker threads for timer_pub [default: 1]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Transport: udp or memory [default: udp]
    #[arg(long, value_name = "KIND")]
    pub transport: Option<TransportKind>,

    /// Also run a subscriber in this process (publisher modes)
    #[arg(long)]
    pub loopback: bool,

    /// Print status reports and the final summary as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Load base settings from a JSON config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolve the run configuration
    ///
    /// Starts from the config file (or defaults) and applies every flag that
    /// was given. The result is validated.
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(topic) = self.topic1 {
            config.channel1.topic = topic;
        }
        if let Some(topic) = self.topic2 {
            config.channel2.topic = topic;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(rate) = self.rate1 {
            config.channel1.rate_hz = rate;
        }
        if let Some(rate) = self.rate2 {
            config.channel2.rate_hz = rate;
        }
        if let Some(size) = self.payload1 {
            config.channel1.payload_size = size;
        }
        if let Some(size) = self.payload2 {
            config.channel2.payload_size = size;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        config.loopback |= self.loopback;
        config.json_status |= self.json;

        config.validate()?;
        Ok(config)
    }
}
