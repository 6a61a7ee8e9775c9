//! Scheduling strategies
//!
//! Three interchangeable ways of driving the same channels:
//! - [`Cooperative`]: one thread polls every channel on a 1 ms tick
//! - [`ThreadPerChannel`]: one OS thread per channel, joined by a controller
//! - [`TimerDriven`]: recurring tokio timers on a worker pool
//!
//! All of them share the due rule from [`RateSchedule`], stop at the same
//! deadline and publish each channel independently of the other.

use super::publisher::{Channel, PublisherReporter};
use super::schedule::{period_for_rate, RateSchedule, RunDeadline, StopSignal};
use crate::config::Mode;
use crate::stats::report::ReportSink;
use anyhow::Context;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Polling tick of the cooperative loop and channel threads
pub const POLL_TICK: Duration = Duration::from_millis(1);

/// How often controllers check for an external stop
const CONTROL_SLICE: Duration = Duration::from_millis(10);

/// Shared state handed to a strategy for one run
pub struct RunContext<'a> {
    pub deadline: RunDeadline,
    pub stop: StopSignal,
    pub reporter: &'a PublisherReporter,
    pub sink: &'a dyn ReportSink,
}

impl RunContext<'_> {
    /// Whether the run should end at `now`
    pub fn finished(&self, now: Instant) -> bool {
        self.stop.is_raised() || self.deadline.expired(now)
    }

    /// Emit a publisher report if one is due
    pub fn report(&self, now: Instant) {
        if let Some(status) = self.reporter.poll(now) {
            self.sink.publisher_status(&status);
        }
    }
}

/// A way of scheduling channel emissions
pub trait ExecutionStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Drive `channels` until the deadline passes or a stop is raised
    fn run(&self, channels: Vec<Channel>, ctx: &RunContext<'_>) -> anyhow::Result<()>;
}

/// Strategy for a publisher mode, `None` for the subscriber
pub fn strategy_for(mode: Mode, threads: usize) -> Option<Box<dyn ExecutionStrategy>> {
    match mode {
        Mode::Pub => Some(Box::new(Cooperative)),
        Mode::ParallelPub => Some(Box::new(ThreadPerChannel)),
        Mode::TimerPub => Some(Box::new(TimerDriven::new(threads))),
        Mode::Sub => None,
    }
}

/// Single-threaded polling loop
#[derive(Debug, Clone, Copy, Default)]
pub struct Cooperative;

impl ExecutionStrategy for Cooperative {
    fn name(&self) -> &'static str {
        "cooperative"
    }

    fn run(&self, mut channels: Vec<Channel>, ctx: &RunContext<'_>) -> anyhow::Result<()> {
        let start = ctx.deadline.start();
        let mut schedules: Vec<RateSchedule> = channels
            .iter()
            .map(|c| RateSchedule::new(c.config().rate_hz, start))
            .collect();

        loop {
            let now = Instant::now();
            if ctx.finished(now) {
                break;
            }
            ctx.report(now);
            for (channel, schedule) in channels.iter_mut().zip(schedules.iter_mut()) {
                if schedule.poll(now) {
                    channel.emit();
                }
            }
            std::thread::sleep(POLL_TICK);
        }
        Ok(())
    }
}

/// One OS thread per channel
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPerChannel;

impl ExecutionStrategy for ThreadPerChannel {
    fn name(&self) -> &'static str {
        "thread_per_channel"
    }

    fn run(&self, channels: Vec<Channel>, ctx: &RunContext<'_>) -> anyhow::Result<()> {
        let halt = StopSignal::new();

        std::thread::scope(|scope| {
            for channel in channels {
                let name = format!("pub-{}", channel.topic());
                let deadline = ctx.deadline;
                let stop = ctx.stop.clone();
                let thread_halt = halt.clone();
                let spawned = std::thread::Builder::new()
                    .name(name)
                    .spawn_scoped(scope, move || {
                        channel_loop(channel, deadline, &stop, &thread_halt)
                    });
                if let Err(e) = spawned {
                    // Release the threads already running so the scope can join
                    halt.raise();
                    return Err(e).context("Failed to spawn publisher thread");
                }
            }

            loop {
                let now = Instant::now();
                if ctx.finished(now) {
                    break;
                }
                ctx.report(now);
                let slice = ctx
                    .deadline
                    .remaining(now)
                    .map_or(CONTROL_SLICE, |left| left.min(CONTROL_SLICE));
                std::thread::sleep(slice);
            }
            halt.raise();
            Ok(())
        })
    }
}

fn channel_loop(mut channel: Channel, deadline: RunDeadline, stop: &StopSignal, halt: &StopSignal) {
    let mut schedule = RateSchedule::new(channel.config().rate_hz, deadline.start());
    tracing::debug!(topic = %channel.topic(), period = ?schedule.period(), "Channel thread started");

    while !halt.is_raised() && !stop.is_raised() {
        let now = Instant::now();
        if deadline.expired(now) {
            break;
        }
        if schedule.poll(now) {
            channel.emit();
        }
        std::thread::sleep(POLL_TICK);
    }

    tracing::debug!(topic = %channel.topic(), sent = channel.counters().sent(), "Channel thread finished");
}

/// Recurring timers on a tokio runtime
#[derive(Debug, Clone, Copy)]
pub struct TimerDriven {
    workers: usize,
}

impl TimerDriven {
    /// Create a timer strategy with `workers` runtime threads (at least 1)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Runtime worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        if self.workers == 1 {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
        } else {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.workers)
                .thread_name("dualbench-timer")
                .enable_time()
                .build()
        }
    }
}

impl Default for TimerDriven {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ExecutionStrategy for TimerDriven {
    fn name(&self) -> &'static str {
        "timer_driven"
    }

    fn run(&self, channels: Vec<Channel>, ctx: &RunContext<'_>) -> anyhow::Result<()> {
        let runtime = self.runtime().context("Failed to build timer runtime")?;
        tracing::debug!(workers = self.workers, "Timer runtime started");

        runtime.block_on(async {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let tasks: Vec<_> = channels
                .into_iter()
                .map(|channel| tokio::spawn(drive_channel(channel, shutdown_rx.clone())))
                .collect();

            let deadline = ctx.deadline.remaining(Instant::now());
            let expiry = async move {
                match deadline {
                    Some(left) => tokio::time::sleep(left).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(expiry);

            let mut control = tokio::time::interval(CONTROL_SLICE);
            control.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut expiry => break,
                    _ = control.tick() => {
                        if ctx.stop.is_raised() {
                            break;
                        }
                        ctx.report(Instant::now());
                    }
                }
            }

            let _ = shutdown_tx.send(true);
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Timer task ended abnormally");
                }
            }
        });
        Ok(())
    }
}

async fn drive_channel(mut channel: Channel, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period_for_rate(channel.config().rate_hz));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                channel.emit();
            }
            _ = shutdown.changed() => break,
        }
    }

    tracing::debug!(topic = %channel.topic(), sent = channel.counters().sent(), "Timer task finished");
}
