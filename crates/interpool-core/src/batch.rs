//! Balance-mode batch optimiser.
//!
//! Processing due entries one at a time converges on whoever tops the
//! ranking for everyone. The optimiser drains a batch together and picks,
//! per entry, the top-K candidate whose provisional assignment keeps the
//! projected workload spread smallest, re-checking conflicts against the
//! picks already made inside the batch.

use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{append_best_effort, AssignmentLogEntry, AuditOutcome};
use crate::booking::BookingStatus;
use crate::conflict::Conflict;
use crate::engine::{reasons, Engine, Outcome};
use crate::error::EngineError;
use crate::fairness::{hours_in_window, HoursMap};
use crate::policy::AssignmentPolicy;
use crate::pool::{PoolEntry, PoolState};
use crate::scoring::ScoredCandidate;
use crate::store::{Clock, CommitOutcome, EngineStore};

/// Candidates considered per entry in the greedy phase.
const TOP_K: usize = 3;

/// Extra capacity when any batch entry starts within 24 hours.
const URGENT_CAPACITY_BONUS: usize = 5;

/// An assignment made earlier in the same batch, not yet visible through
/// the store at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionalPick {
    pub booking_id: i64,
    pub interpreter_id: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl ProvisionalPick {
    pub(crate) fn as_conflict(&self) -> Conflict {
        Conflict {
            booking_id: self.booking_id,
            time_start: self.time_start,
            time_end: self.time_end,
            room: String::new(),
            status: BookingStatus::Approve,
        }
    }
}

/// Per-batch summary handed back to the orchestrator and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAssignmentResult {
    pub batch_id: String,
    pub outcomes: Vec<(i64, Outcome)>,
    /// Workload spread before the batch ran.
    pub spread_before: f64,
    /// Spread after all batch assignments.
    pub spread_after: f64,
    /// Spread had every entry taken its individual top candidate.
    pub naive_spread: f64,
    /// `naive_spread - spread_after`; positive when batching helped.
    pub fairness_improvement: f64,
}

/// Batch capacity: the standard size, expanded when anything is urgent.
pub fn batch_capacity(entries: &[PoolEntry], now: DateTime<Utc>, standard: usize) -> usize {
    let any_urgent = entries
        .iter()
        .any(|e| e.time_start - now <= Duration::hours(24));
    if any_urgent {
        standard + URGENT_CAPACITY_BONUS
    } else {
        standard
    }
}

/// Workload spread `max(H) - min(H)` across the whole roster map.
pub fn projected_spread(hours: &HoursMap) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &h in hours.values() {
        min = min.min(h);
        max = max.max(h);
    }
    if min.is_finite() {
        max - min
    } else {
        0.0
    }
}

fn spread_with(hours: &HoursMap, interpreter_id: &str, duration_hours: f64) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (id, &h) in hours {
        let projected = if id == interpreter_id { h + duration_hours } else { h };
        min = min.min(projected);
        max = max.max(projected);
    }
    if min.is_finite() {
        max - min
    } else {
        duration_hours
    }
}

/// Pick the top-K candidate minimising the projected spread; ties keep the
/// ranking order (so the default top-1 wins unless someone strictly
/// improves on it).
fn pick_by_spread<'a>(
    ranked: &'a [ScoredCandidate],
    hours: &HoursMap,
    duration_hours: f64,
) -> Option<&'a ScoredCandidate> {
    let top_k = &ranked[..ranked.len().min(TOP_K)];
    let mut best: Option<(&ScoredCandidate, f64)> = None;
    for candidate in top_k {
        let spread = spread_with(hours, &candidate.id, duration_hours);
        match best {
            Some((_, best_spread)) if spread >= best_spread => {}
            _ => best = Some((candidate, spread)),
        }
    }
    best.map(|(c, _)| c)
}

struct BatchItem {
    entry: PoolEntry,
    booking: crate::booking::Booking,
    thresholds: crate::policy::thresholds::ResolvedThresholds,
}

/// Run one batch over leased-ready entries, deadline-ascending.
pub(crate) fn run<S: EngineStore, C: Clock>(
    engine: &Engine<S, C>,
    ready: Vec<PoolEntry>,
    policy: &AssignmentPolicy,
    now: DateTime<Utc>,
) -> Result<BatchAssignmentResult, EngineError> {
    static NEVER: AtomicBool = AtomicBool::new(false);
    let batch_id = crate::audit::new_correlation_id();
    let mut outcomes: Vec<(i64, Outcome)> = Vec::new();

    let roster = engine.with_retry(|| engine.store.list_active_interpreters())?;
    let baseline = hours_in_window(&engine.store, &roster, now, policy.fairness_window_days)?;
    let spread_before = projected_spread(&baseline);

    let mut working = baseline.clone();
    let mut naive = baseline.clone();
    let mut provisional: Vec<ProvisionalPick> = Vec::new();

    // Lease and load the batch members first.
    let mut items: Vec<BatchItem> = Vec::new();
    for mut entry in ready {
        if !engine
            .store
            .pool_lease(entry.booking_id, now, engine.options.lease_timeout)?
        {
            continue;
        }
        entry.state = PoolState::Processing;
        entry.leased_at = Some(now);
        entry.batch_id = Some(batch_id.clone());
        let _ = engine.store.pool_update(&entry);

        let booking = match engine.with_retry(|| engine.store.get_booking(entry.booking_id)) {
            Ok(Some(b)) => b,
            Ok(None) => {
                engine.store.pool_remove(entry.booking_id)?;
                outcomes.push((entry.booking_id, Outcome::escalated(reasons::BOOKING_NOT_FOUND)));
                continue;
            }
            Err(_) => {
                let mut released = entry.clone();
                released.release_to_pending();
                let _ = engine.store.pool_update(&released);
                outcomes.push((entry.booking_id, Outcome::escalated(reasons::STORE_UNAVAILABLE)));
                continue;
            }
        };
        if booking.status != BookingStatus::Waiting {
            engine.store.pool_remove(entry.booking_id)?;
            continue;
        }
        let thresholds =
            engine
                .resolver
                .resolve(&engine.store, now, booking.meeting_type, policy.mode);
        items.push(BatchItem { entry, booking, thresholds });
    }

    // Project what the scorer alone would do, before any batch commit
    // becomes visible through the store: each entry independently takes its
    // top candidate against the baseline hours.
    for item in &items {
        if item.entry.is_past_deadline(now) {
            continue;
        }
        if let Ok(naive_scored) = engine.score_booking(
            &item.booking,
            policy,
            &item.thresholds,
            now,
            &[],
            Some(&baseline),
        ) {
            if let Some(top) = naive_scored.outcome.best() {
                if let Some(h) = naive.get_mut(&top.id) {
                    *h += item.booking.duration_hours();
                }
            }
        }
    }

    for BatchItem { entry, booking, thresholds } in items {
        // Emergency: a deadline crossed inside the batch window goes through
        // the direct path, no greedy bookkeeping.
        if entry.is_past_deadline(now) {
            let outcome = engine.decide_now(
                &booking,
                policy,
                &thresholds,
                now,
                &batch_id,
                &NEVER,
                engine.call_deadline(),
                &provisional,
                None,
            );
            if let Outcome::Assigned { interpreter_id, .. } = &outcome {
                if let Some(h) = working.get_mut(interpreter_id) {
                    *h += booking.duration_hours();
                }
                provisional.push(ProvisionalPick {
                    booking_id: booking.id,
                    interpreter_id: interpreter_id.clone(),
                    time_start: booking.time_start,
                    time_end: booking.time_end,
                });
            }
            engine.finish_entry(Some(entry), &outcome, now);
            outcomes.push((booking.id, outcome));
            continue;
        }

        let scored = match engine.score_booking(
            &booking,
            policy,
            &thresholds,
            now,
            &provisional,
            Some(&working),
        ) {
            Ok(s) => s,
            Err(_) => {
                let mut released = entry.clone();
                released.release_to_pending();
                let _ = engine.store.pool_update(&released);
                outcomes.push((booking.id, Outcome::escalated(reasons::STORE_UNAVAILABLE)));
                continue;
            }
        };

        let outcome = match pick_by_spread(&scored.outcome.ranked, &working, booking.duration_hours()) {
            None => {
                let outcome = Outcome::Escalated {
                    reason: reasons::NO_ELIGIBLE_INTERPRETER.to_string(),
                    breakdown: scored.outcome.breakdown.clone(),
                };
                let mut log = AssignmentLogEntry::new(
                    booking.id,
                    AuditOutcome::Escalated,
                    policy.fingerprint(),
                    batch_id.clone(),
                    now,
                );
                log.reason = Some(reasons::NO_ELIGIBLE_INTERPRETER.to_string());
                log.pre_hours_snapshot = working.clone();
                log.post_hours_snapshot = working.clone();
                log.score_breakdown = scored.outcome.breakdown.clone();
                append_best_effort(&engine.store, &log);
                outcome
            }
            Some(pick) => {
                match engine.with_retry(|| engine.store.commit_assignment(booking.id, &pick.id)) {
                    Ok(CommitOutcome::Committed) => {
                        if let Some(h) = working.get_mut(&pick.id) {
                            *h += booking.duration_hours();
                        }
                        provisional.push(ProvisionalPick {
                            booking_id: booking.id,
                            interpreter_id: pick.id.clone(),
                            time_start: booking.time_start,
                            time_end: booking.time_end,
                        });
                        let mut log = AssignmentLogEntry::new(
                            booking.id,
                            AuditOutcome::Assigned,
                            policy.fingerprint(),
                            batch_id.clone(),
                            now,
                        );
                        log.interpreter_id = Some(pick.id.clone());
                        log.pre_hours_snapshot = baseline.clone();
                        log.post_hours_snapshot = working.clone();
                        log.score_breakdown = scored.outcome.breakdown.clone();
                        append_best_effort(&engine.store, &log);
                        Outcome::Assigned {
                            interpreter_id: pick.id.clone(),
                            score: Some(pick.score),
                            breakdown: scored.outcome.breakdown.clone(),
                        }
                    }
                    Ok(CommitOutcome::Rejected) => {
                        // Someone took the interpreter mid-batch; fall back
                        // to the direct path, which re-scores and retries.
                        let outcome = engine.decide_now(
                            &booking,
                            policy,
                            &thresholds,
                            now,
                            &batch_id,
                            &NEVER,
                            engine.call_deadline(),
                            &provisional,
                            None,
                        );
                        if let Outcome::Assigned { interpreter_id, .. } = &outcome {
                            if let Some(h) = working.get_mut(interpreter_id) {
                                *h += booking.duration_hours();
                            }
                            provisional.push(ProvisionalPick {
                                booking_id: booking.id,
                                interpreter_id: interpreter_id.clone(),
                                time_start: booking.time_start,
                                time_end: booking.time_end,
                            });
                        }
                        outcome
                    }
                    Err(e) => {
                        outcomes.push((
                            booking.id,
                            Outcome::escalated(match e {
                                crate::error::StoreError::Timeout => reasons::TIMEOUT,
                                _ => reasons::STORE_UNAVAILABLE,
                            }),
                        ));
                        let mut released = entry.clone();
                        released.release_to_pending();
                        let _ = engine.store.pool_update(&released);
                        continue;
                    }
                }
            }
        };

        engine.finish_entry(Some(entry), &outcome, now);
        outcomes.push((booking.id, outcome));
    }

    let spread_after = projected_spread(&working);
    let naive_spread = projected_spread(&naive);
    let result = BatchAssignmentResult {
        batch_id: batch_id.clone(),
        outcomes,
        spread_before,
        spread_after,
        naive_spread,
        fairness_improvement: naive_spread - spread_after,
    };

    let mut summary = AssignmentLogEntry::new(
        0,
        AuditOutcome::BatchSummary,
        policy.fingerprint(),
        batch_id,
        now,
    );
    summary.reason = Some(format!(
        "batch of {}: spread {:.2}h -> {:.2}h (naive {:.2}h)",
        result.outcomes.len(),
        result.spread_before,
        result.spread_after,
        result.naive_spread,
    ));
    summary.pre_hours_snapshot = baseline;
    summary.post_hours_snapshot = working;
    append_best_effort(&engine.store, &summary);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Booking, MeetingType};
    use crate::history::DrState;
    use crate::policy::AssignMode;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn make_hours(pairs: &[(&str, f64)]) -> HoursMap {
        pairs.iter().map(|(id, h)| (id.to_string(), *h)).collect()
    }

    fn candidate(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            id: id.to_string(),
            score,
            fairness: 1.0,
            urgency: 0.0,
            lrs: 1.0,
            dr_penalty: 0.0,
            tie_break: 0.0,
            hours: 0.0,
            days_since_last: None,
            dr: DrState::default(),
        }
    }

    fn entry(id: i64, start: DateTime<Utc>) -> PoolEntry {
        let booking = Booking {
            id,
            meeting_type: MeetingType::General,
            dr_type: None,
            time_start: start,
            time_end: start + Duration::hours(1),
            room: "R-1".to_string(),
            owner_id: "EMP-0001".to_string(),
            created_at: now() - Duration::days(5),
            status: BookingStatus::Waiting,
            assigned_interpreter: None,
        };
        PoolEntry::new(&booking, AssignMode::Balance, 3, now())
    }

    #[test]
    fn test_batch_capacity_expands_near_start() {
        let far = vec![entry(1, now() + Duration::days(3))];
        assert_eq!(batch_capacity(&far, now(), 10), 10);

        let near = vec![entry(1, now() + Duration::days(3)), entry(2, now() + Duration::hours(20))];
        assert_eq!(batch_capacity(&near, now(), 10), 15);
    }

    #[test]
    fn test_projected_spread() {
        assert_eq!(projected_spread(&HoursMap::new()), 0.0);
        assert_eq!(projected_spread(&make_hours(&[("A", 2.0)])), 0.0);
        assert!((projected_spread(&make_hours(&[("A", 5.0), ("B", 1.5)])) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_pick_by_spread_prefers_balancing_candidate() {
        // A already leads on hours; assigning B keeps the spread flat.
        let hours = make_hours(&[("A", 2.0), ("B", 0.0), ("C", 1.0)]);
        let ranked = vec![candidate("A", 3.0), candidate("B", 2.9), candidate("C", 2.8)];
        let pick = pick_by_spread(&ranked, &hours, 1.0).unwrap();
        assert_eq!(pick.id, "B");
    }

    #[test]
    fn test_pick_by_spread_keeps_top1_on_tie() {
        let hours = make_hours(&[("A", 0.0), ("B", 0.0)]);
        let ranked = vec![candidate("A", 3.0), candidate("B", 2.9)];
        // Both produce an identical spread; ranking order decides.
        let pick = pick_by_spread(&ranked, &hours, 1.0).unwrap();
        assert_eq!(pick.id, "A");
    }

    #[test]
    fn test_pick_by_spread_considers_top_k_only() {
        let hours = make_hours(&[("A", 4.0), ("B", 4.0), ("C", 4.0), ("D", 0.0)]);
        let ranked = vec![
            candidate("A", 3.0),
            candidate("B", 2.9),
            candidate("C", 2.8),
            candidate("D", 2.7),
        ];
        // D would balance best but sits outside the top 3.
        let pick = pick_by_spread(&ranked, &hours, 1.0).unwrap();
        assert_ne!(pick.id, "D");
    }
}
