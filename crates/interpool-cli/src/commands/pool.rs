//! Pool inspection and draining commands.

use clap::Subcommand;

use super::common::{open_engine, print_json};

#[derive(Subcommand)]
pub enum PoolAction {
    /// Show pool counters
    Status,
    /// Process every due entry until the ready queue is empty
    Drain,
}

pub fn run(action: PoolAction) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        PoolAction::Status => status(),
        PoolAction::Drain => drain(),
    }
}

/// One orchestrator pass (`interpool tick`).
pub fn tick() -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let report = engine.tick()?;
    print_json(&report)?;
    Ok(0)
}

fn status() -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let stats = engine.pool_stats()?;
    print_json(&stats)?;
    Ok(0)
}

fn drain() -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let outcomes = engine.drain()?;
    print_json(&outcomes)?;
    Ok(0)
}
