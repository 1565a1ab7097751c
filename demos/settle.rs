//! Settlement Demo
//!
//! Loads a checkout scenario from YAML, settles it and prints the receipt.
//!
//! Run with: `cargo run --example settle -- demos/scenarios/checkout.yml`

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::Result;
use clap::Parser;
use humanize_duration::{Truncate, prelude::DurationExt};
use tracing_subscriber::EnvFilter;

use pricewise::{config::Config, engines::EngineKind, receipt::write_settlement};

/// Settle a checkout scenario
#[derive(Debug, Parser)]
#[command(name = "settle", about = "Settle a checkout scenario", long_about = None)]
struct Args {
    /// Scenario file
    #[arg(default_value = "demos/scenarios/checkout.yml")]
    scenario: PathBuf,

    /// Promotion engine, overriding the scenario setting
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,
}

/// Settlement Demo
#[expect(clippy::print_stdout, reason = "Example code")]
pub fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.scenario)?;

    if let Some(engine) = args.engine {
        config = config.with_engine(engine);
    }

    let start = Instant::now();

    let settlement = config.settle()?;

    let elapsed = start.elapsed();

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    write_settlement(&mut handle, &settlement)?;

    writeln!(
        handle,
        "Engine: {} ({} combinations, {} pruned)",
        settlement.engine,
        settlement.promotion.evaluated_combinations(),
        settlement.promotion.pruned_rules()
    )?;

    println!("Settled in {}", elapsed.human(Truncate::Nano));

    Ok(())
}
