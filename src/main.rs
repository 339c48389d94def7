use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clearance::commands::{RunOptions, handle_run};
use clearance::log_format::TowerLogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "clearance",
    about = "Air traffic control sector arbiter simulation."
)]
struct Cli {
    /// Number of airspace sectors (values below 2 are clamped to 2)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    sectors: u64,
    /// Number of aircraft to simulate
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    aircraft: u64,
    /// PRNG seed for a reproducible run (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Seconds between radar sweeps (0 disables the radar display)
    #[arg(long, default_value_t = 3)]
    radar_interval: u64,
    /// Also print the final statistics report as JSON
    #[arg(long)]
    json_stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .event_format(TowerLogFormat)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    handle_run(RunOptions {
        sectors: cli.sectors as usize,
        aircraft: cli.aircraft as usize,
        seed: cli.seed,
        radar_interval: cli.radar_interval,
        json_stats: cli.json_stats,
    })
    .await
}
