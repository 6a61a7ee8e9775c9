//! Dualbench - dual-channel pub/sub traffic generator
//!
//! Entry point for the command line tool.

use anyhow::Result;
use clap::Parser;
use dualbench::cli::Cli;
use dualbench::runner::build_transport;
use dualbench::{ConsoleSink, ReportSink, StopSignal, TransportKind};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only status lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dualbench=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config()?;

    info!(
        version = dualbench::VERSION,
        build_date = dualbench::BUILD_DATE,
        mode = %config.mode,
        "dualbench starting"
    );

    if config.transport == TransportKind::Memory && config.mode.is_publisher() && !config.loopback
    {
        warn!("Memory transport without --loopback: nothing will receive the traffic");
    }

    // Set up Ctrl+C handler
    let stop = StopSignal::new();
    let s = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || s.raise()) {
        warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    let transport = build_transport(&config);
    let sink: Arc<dyn ReportSink> = Arc::new(ConsoleSink::new(config.json_status));

    let summary = dualbench::run(&config, transport, stop, sink)?;

    if config.json_status {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}
