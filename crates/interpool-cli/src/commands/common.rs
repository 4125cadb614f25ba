//! Shared plumbing for the CLI commands.

use interpool_core::{Engine, EngineConfig, SqliteStore, SystemClock};

/// Open the engine over the default on-disk store, seeding the policy row
/// from the environment/config file when the store is fresh.
pub fn open_engine() -> Result<Engine<SqliteStore, SystemClock>, Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    let store = SqliteStore::open()?;
    store.ensure_policy(&config.seed_policy())?;
    Ok(Engine::with_options(store, SystemClock, config.engine_options()))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
