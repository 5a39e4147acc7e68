mod config;
mod counters;
mod pfctl;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::time::MissedTickBehavior;

use crate::config::loader::load_settings;
use crate::config::structs::Settings;
use crate::counters::diff::IntervalDiff;
use crate::counters::snapshot::{CounterSnapshot, SumKey};
use crate::pfctl::Pfctl;

#[derive(Parser)]
#[command(name = "pf-ispcap")]
#[command(version)]
#[command(about = "ISP bandwidth-cap monitor for pf interface counters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the WAN interface from the configuration
    #[arg(long, short, global = true)]
    interface: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Take one counter snapshot and print it as JSON
    Show,
    /// Take two samples one interval apart and print the diff report (default)
    Report,
    /// Sample continuously, reporting usage every interval
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logger::init();

    let cli = Cli::parse();

    if !utils::privilege::is_root() {
        error!("Reading pf counters requires root privileges.");
        error!("Try: sudo pf-ispcap");
        std::process::exit(1);
    }

    let mut settings = load_settings(cli.config.as_deref());
    if let Some(interface) = cli.interface {
        settings.wan_if = interface;
    }

    match cli.command.unwrap_or(Commands::Report) {
        Commands::Show => run_show(&settings),
        Commands::Report => run_report(&settings).await,
        Commands::Monitor => run_monitor(&settings).await,
    }
}

fn run_show(settings: &Settings) -> Result<()> {
    let snapshot = Pfctl::new(&settings.wan_if).sample()?;
    println!("{}", serde_json::to_string_pretty(&snapshot.to_json())?);
    Ok(())
}

/// One-shot usage report: the original interactive mode. Sample, wait a
/// full interval, sample again, print the diff.
async fn run_report(settings: &Settings) -> Result<()> {
    let pf = Pfctl::new(&settings.wan_if);

    let first = pf.sample()?;
    info!(
        "Sampled {}, waiting {}s for the second sample",
        pf.interface(),
        settings.interval
    );
    tokio::time::sleep(Duration::from_secs(settings.interval)).await;
    let second = pf.sample()?;

    let diff = IntervalDiff::new(&first, &second);
    info!(
        "{}: {:.3} Mbit/s over {:.0}s",
        pf.interface(),
        diff.mbs(),
        diff.seconds()
    );
    println!("{}", diff);
    Ok(())
}

/// Continuous sampling loop. Each tick diffs against the previous
/// snapshot and logs throughput plus accumulated usage against the cap.
async fn run_monitor(settings: &Settings) -> Result<()> {
    info!("=== pf-ispcap monitor ===");
    info!(
        "Interface {} sampled every {}s (cap {} GB, meter resets on day {})",
        settings.wan_if, settings.interval, settings.isp_cap, settings.reset_day
    );

    let pf = Pfctl::new(&settings.wan_if);
    let mut ticker = tokio::time::interval(Duration::from_secs(settings.interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Single owner of the previous-snapshot slot; the swap happens only
    // after the diff against it has been emitted.
    let mut previous: Option<CounterSnapshot> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = match pf.sample() {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!("Sample failed, skipping tick: {:#}", e);
                        continue;
                    }
                };

                if let Some(prev) = previous.as_ref() {
                    let diff = IntervalDiff::new(prev, &snapshot);
                    info!(
                        "{}: {:.3} Mbit/s over {:.0}s",
                        pf.interface(),
                        diff.mbs(),
                        diff.seconds()
                    );
                    println!("{}", diff.to_json());
                }

                let used = snapshot.sum(SumKey::All);
                info!(
                    "{:.2} GB since counters cleared ({:.1}% of {} GB cap)",
                    settings.gigabytes(used),
                    settings.percent_of_cap(used),
                    settings.isp_cap
                );

                previous = Some(snapshot);
            }
            _ = &mut ctrl_c => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}
