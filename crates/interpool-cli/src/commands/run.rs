//! `interpool run <booking-id>`: decide one booking.

use interpool_core::Outcome;

use super::common::{open_engine, print_json};

/// Exit codes: 0 assigned/pooled, 2 escalated, 1 on engine error.
pub fn run(booking_id: i64) -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let outcome = engine.assign(booking_id)?;
    print_json(&outcome)?;
    Ok(if matches!(outcome, Outcome::Escalated { .. }) { 2 } else { 0 })
}
