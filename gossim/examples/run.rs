//! Run a scenario file and print the statistics of its nodes.
//!
//! ```text
//! RUST_LOG=gossim=debug cargo run --example run -- scenario.txt --workers 4
//! ```

use anyhow::Context as _;
use clap::Parser;
use gossim::{ScenarioConfig, Simulation};
use std::{path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Command {
    /// the `#`-records of the scenario
    scenario: PathBuf,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// seed of the senders, random if not given
    #[arg(long)]
    seed: Option<u64>,

    /// override the duration of the scenario, e.g. `1ms 500us`
    #[arg(long, value_parser = gossim_core::time::parse_duration)]
    duration: Option<Duration>,

    /// break this link halfway through the run
    #[arg(long)]
    break_link: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cmd = Command::parse();

    let text = std::fs::read_to_string(&cmd.scenario)
        .with_context(|| format!("Failed to read {}", cmd.scenario.display()))?;
    let mut scenario: ScenarioConfig = text
        .parse()
        .with_context(|| format!("Failed to parse {}", cmd.scenario.display()))?;

    scenario.seed = cmd.seed.unwrap_or_else(rand::random);
    if let Some(duration) = cmd.duration {
        scenario.duration = duration;
    }
    let seed = scenario.seed;

    let mut simulation = Simulation::builder(scenario)
        .set_workers(cmd.workers)
        .build()?;

    let ticks = match &cmd.break_link {
        None => simulation.run()?,
        Some(link) => {
            let half = simulation.scenario().duration / 2;
            let mut ticks = 0;
            while simulation.now().as_nanos() < half.as_nanos() as u64 {
                if simulation.step()?.is_none() {
                    break;
                }
                ticks += 1;
            }
            simulation.break_link(link)?;
            ticks + simulation.run()?
        }
    };

    let stats = simulation.stats();
    println!("seed {seed}, {ticks} ticks, {}", stats.instant);
    println!(
        "{:<16} {:<10} {:>10} {:>10} {:>10} {:>10}",
        "node", "role", "in", "out", "discarded", "recovered"
    );
    for node in &stats.nodes {
        println!(
            "{:<16} {:<10} {:>10} {:>10} {:>10} {:>10}",
            node.name,
            node.role,
            node.incoming(),
            node.outgoing(),
            node.discarded(),
            node.recovery().gos_recovered
        );
    }

    Ok(())
}
