//! Dynamic-pool adjustment on roster changes.
//!
//! Before each run the engine diffs the active roster against the last
//! persisted snapshot. Newcomers (active, nothing assigned inside the
//! fairness window) get a grace on DR penalties while the roster is
//! growing; departed interpreters stop constraining the DR chain.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::Interpreter;
use crate::fairness::HoursMap;

/// Persisted view of the roster at the end of the previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub interpreter_ids: BTreeSet<String>,
    pub taken_at: DateTime<Utc>,
}

impl RosterSnapshot {
    pub fn capture(roster: &[Interpreter], now: DateTime<Utc>) -> Self {
        Self {
            interpreter_ids: roster.iter().map(|i| i.id.clone()).collect(),
            taken_at: now,
        }
    }
}

/// Outcome of diffing the roster against the prior snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterChange {
    /// Active now with no assignment inside the fairness window.
    pub newcomers: BTreeSet<String>,
    /// Present in the snapshot, absent from the active roster.
    pub departed: BTreeSet<String>,
    /// The roster grew since the snapshot (newcomer grace condition).
    pub roster_grown: bool,
    /// Damping factor for newcomer scoring, in `[1.0, 1.5]`.
    pub adjustment_factor: f64,
}

impl RosterChange {
    /// Whether DR block/penalty is waived for this candidate.
    pub fn newcomer_grace(&self, interpreter_id: &str) -> bool {
        self.roster_grown && self.newcomers.contains(interpreter_id)
    }

    /// Fairness-score multiplier handed to the fairness calculator: the
    /// adjustment factor for newcomers while the roster is growing, 1.0
    /// for everyone else.
    pub fn fairness_factor(&self, interpreter_id: &str) -> f64 {
        if self.roster_grown && self.newcomers.contains(interpreter_id) {
            self.adjustment_factor
        } else {
            1.0
        }
    }
}

/// Diff the current roster against the prior snapshot. Idempotent; safe to
/// call before every run.
pub fn diff_roster(
    prior: Option<&RosterSnapshot>,
    roster: &[Interpreter],
    hours: &HoursMap,
) -> RosterChange {
    let current_ids: BTreeSet<String> = roster.iter().map(|i| i.id.clone()).collect();

    let newcomers: BTreeSet<String> = roster
        .iter()
        .filter(|i| hours.get(&i.id).copied().unwrap_or(0.0) <= 0.0)
        .map(|i| i.id.clone())
        .collect();

    let departed: BTreeSet<String> = prior
        .map(|snap| snap.interpreter_ids.difference(&current_ids).cloned().collect())
        .unwrap_or_default();

    let roster_grown = prior
        .map(|snap| current_ids.len() > snap.interpreter_ids.len())
        .unwrap_or(false);

    let adjustment_factor = if roster.is_empty() {
        1.0
    } else {
        (1.0 + newcomers.len() as f64 / roster.len() as f64 * 0.5).clamp(1.0, 1.5)
    };

    RosterChange {
        newcomers,
        departed,
        roster_grown,
        adjustment_factor,
    }
}
