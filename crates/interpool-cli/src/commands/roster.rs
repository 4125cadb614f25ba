//! Roster bookkeeping commands.

use clap::Subcommand;

use super::common::{open_engine, print_json};

#[derive(Subcommand)]
pub enum RosterAction {
    /// Diff the active roster against the last snapshot and re-snapshot it
    Sync,
}

pub fn run(action: RosterAction) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        RosterAction::Sync => sync(),
    }
}

fn sync() -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let change = engine.sync_roster()?;
    print_json(&change)?;
    Ok(0)
}
