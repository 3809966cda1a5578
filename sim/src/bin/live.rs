//! Live simulation driver
//!
//! Ticks the controller on the system clock at the configured rate, logs a
//! status line every second and prints the final snapshot as JSON.

use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use telemetry::{LinkStatus, TrafficMode};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wan_sim::{Controller, SimConfig};

#[derive(Debug, Parser)]
#[command(version, about = "Run the WAN simulation in real time")]
struct Cli {
    /// JSON topology/config file (defaults to the built-in hospital WAN)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Traffic mode: NORMAL, CONGESTED or DDOS
    #[arg(long, default_value = "NORMAL")]
    mode: TrafficMode,

    /// Number of ticks to run
    #[arg(long, default_value_t = 200)]
    ticks: u64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> wan_sim::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_path(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let interval = config.tick_interval();
    let mut controller = Controller::new(config)?;
    let per_second = u64::from(controller.config().tick_rate_hz);
    controller.set_mode(cli.mode);

    let start = Instant::now();
    for tick in 1..=cli.ticks {
        let deadline = start + interval * tick as u32;
        controller.tick();

        if tick % per_second == 0 {
            let snap = controller.snapshot();
            let critical = snap.links.iter().filter(|l| l.status == LinkStatus::Critical).count();
            info!(
                tick,
                mode = %snap.mode,
                load = snap.global_stats.total_throughput,
                entropy = snap.global_stats.avg_entropy,
                critical_links = critical,
                alerts = snap.alerts.len(),
                "status"
            );
        }

        // pace against the start instant
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }

    controller.stop();
    let snap = controller.snapshot();
    println!("{}", serde_json::to_string_pretty(&*snap)?);

    Ok(())
}
