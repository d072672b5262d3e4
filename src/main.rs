use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use keepwatch::caps::{Network, NetworkCapabilities, Transport};
use keepwatch::clock::ManualClock;
use keepwatch::tracker::KeepaliveStatsTracker;

/// Keepalive statistics trace replayer.
///
/// Replays a recorded keepalive event trace through the tracker and prints
/// each requested report as a JSON line.
#[derive(Parser)]
#[command(name = "keepwatch", about)]
struct Cli {
    /// Path to a JSONL keepalive event trace.
    trace: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// One line of a keepalive event trace.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TraceEvent {
    Start {
        at_ms: u64,
        network: u32,
        slot: u32,
        #[serde(default)]
        transports: Vec<Transport>,
        #[serde(default)]
        carrier_id: Option<i32>,
        interval_seconds: u32,
    },
    Pause {
        at_ms: u64,
        network: u32,
        slot: u32,
    },
    Resume {
        at_ms: u64,
        network: u32,
        slot: u32,
    },
    Stop {
        at_ms: u64,
        network: u32,
        slot: u32,
    },
    Report {
        at_ms: u64,
        #[serde(default)]
        reset: bool,
    },
}

impl TraceEvent {
    fn at_ms(&self) -> u64 {
        match self {
            Self::Start { at_ms, .. }
            | Self::Pause { at_ms, .. }
            | Self::Resume { at_ms, .. }
            | Self::Stop { at_ms, .. }
            | Self::Report { at_ms, .. } => *at_ms,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("keepwatch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    let trace_path = cli
        .trace
        .context("a trace file is required (use --help for usage)")?;
    let file = File::open(&trace_path)
        .with_context(|| format!("opening trace {}", trace_path.display()))?;

    tracing::info!(trace = %trace_path.display(), "replaying keepalive trace");
    replay(BufReader::new(file))
}

/// Replays a trace on the current thread, which becomes the tracker's
/// nominated dispatcher.
fn replay(reader: impl BufRead) -> Result<()> {
    let clock = ManualClock::new(0);
    let mut tracker = KeepaliveStatsTracker::new(Box::new(clock.clone()));
    let mut last_at_ms = 0u64;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading trace line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: TraceEvent =
            serde_json::from_str(&line).with_context(|| format!("parsing trace line {line_no}"))?;

        // The tracker trusts monotonic timestamps; reject a broken trace
        // instead of feeding it garbage.
        let at_ms = event.at_ms();
        if at_ms < last_at_ms {
            bail!("trace line {line_no} goes back in time ({at_ms}ms < {last_at_ms}ms)");
        }
        last_at_ms = at_ms;
        clock.set(at_ms);

        apply(&mut tracker, event).with_context(|| format!("applying trace line {line_no}"))?;
    }

    Ok(())
}

fn apply(tracker: &mut KeepaliveStatsTracker, event: TraceEvent) -> Result<()> {
    match event {
        TraceEvent::Start {
            network,
            slot,
            transports,
            carrier_id,
            interval_seconds,
            ..
        } => {
            let mut caps = NetworkCapabilities::new();
            for transport in transports {
                caps = caps.with_transport(transport);
            }
            if let Some(carrier_id) = carrier_id {
                caps = caps.with_carrier_id(carrier_id);
            }
            tracker.on_start_keepalive(Network(network), slot, &caps, interval_seconds)?;
        }
        TraceEvent::Pause { network, slot, .. } => {
            tracker.on_pause_keepalive(Network(network), slot)?;
        }
        TraceEvent::Resume { network, slot, .. } => {
            tracker.on_resume_keepalive(Network(network), slot)?;
        }
        TraceEvent::Stop { network, slot, .. } => {
            tracker.on_stop_keepalive(Network(network), slot)?;
        }
        TraceEvent::Report { reset, .. } => {
            let report = if reset {
                tracker.build_and_reset_metrics()?
            } else {
                tracker.build_keepalive_metrics()?
            };
            println!("{}", serde_json::to_string(&report)?);
        }
    }
    Ok(())
}
