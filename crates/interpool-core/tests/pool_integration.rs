//! Pool lifecycle: pooling, readiness, leases, retries and stats.

mod common;

use chrono::Duration;

use common::*;
use interpool_core::{
    reasons, AssignMode, AssignmentPolicy, EngineOptions, FixedClock, MeetingType, Outcome,
    PoolEntry, PoolState, PoolStats, PoolStore,
};

fn balance_policy() -> AssignmentPolicy {
    AssignmentPolicy {
        mode: AssignMode::Balance,
        fairness_window_days: 14,
        max_gap_hours: 8.0,
        ..AssignmentPolicy::default()
    }
}

#[test]
fn pooling_is_idempotent_per_booking() {
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    seed_roster(&engine, &["A"]);
    set_policy(&engine, balance_policy());
    engine
        .store()
        .put_booking(waiting_booking(1, MeetingType::General, t0() + Duration::days(30), 1))
        .unwrap();

    let first = engine.assign(1).unwrap();
    let second = engine.assign(1).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.pool_stats().unwrap().total, 1);
}

#[test]
fn add_then_remove_leaves_stats_unchanged() {
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    let before = engine.pool_stats().unwrap();

    let booking = waiting_booking(9, MeetingType::General, t0() + Duration::days(30), 1);
    let entry = PoolEntry::new(&booking, AssignMode::Balance, 15, t0());
    engine.store().pool_add(entry).unwrap();
    engine.store().pool_remove(9).unwrap();

    let after = engine.pool_stats().unwrap();
    assert_eq!(before, after);
    assert_eq!(after, PoolStats::default());
}

#[test]
fn deadline_override_forces_processing_of_pending_entries() {
    // Pool an entry far out, then jump the clock to within 24h of start:
    // the tick must decide it even though the threshold logic changed.
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    seed_roster(&engine, &["A", "B"]);
    set_policy(&engine, balance_policy());

    let start = t0() + Duration::days(30);
    engine
        .store()
        .put_booking(waiting_booking(1, MeetingType::General, start, 1))
        .unwrap();
    assert!(matches!(engine.assign(1).unwrap(), Outcome::Pooled { .. }));

    clock.set(start - Duration::hours(20));
    let report = engine.tick().unwrap();
    assert_eq!(report.promoted_ready, 1);
    assert!(report
        .processed
        .iter()
        .any(|(id, outcome)| *id == 1 && matches!(outcome, Outcome::Assigned { .. })));
}

#[test]
fn stale_lease_is_reclaimed_by_watchdog() {
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    seed_roster(&engine, &["A"]);
    set_policy(&engine, balance_policy());

    let booking = waiting_booking(1, MeetingType::General, t0() + Duration::days(30), 1);
    engine.store().put_booking(booking.clone()).unwrap();
    engine
        .store()
        .pool_add(PoolEntry::new(&booking, AssignMode::Balance, 15, t0()))
        .unwrap();

    // A worker leases and then crashes.
    assert!(engine.store().pool_lease(1, t0(), Duration::seconds(60)).unwrap());
    assert_eq!(engine.store().pool_get(1).unwrap().unwrap().state, PoolState::Processing);

    clock.set(t0() + Duration::seconds(120));
    let report = engine.tick().unwrap();
    assert_eq!(report.reclaimed_leases, 1);
    assert_ne!(engine.store().pool_get(1).unwrap().map(|e| e.state), Some(PoolState::Processing));
}

#[test]
fn transient_failures_retry_then_exhaust() {
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    seed_roster(&engine, &["A"]);
    set_policy(&engine, balance_policy());

    let start = t0() + Duration::days(20);
    engine
        .store()
        .put_booking(waiting_booking(1, MeetingType::General, start, 1))
        .unwrap();
    assert!(matches!(engine.assign(1).unwrap(), Outcome::Pooled { .. }));

    // Become ready, then fail the store mid-processing.
    clock.set(start - Duration::days(15) + Duration::minutes(1));
    engine.store().set_unavailable(true);
    assert!(engine.tick().is_err() || engine.store().pool_get(1).unwrap().is_some());
    engine.store().set_unavailable(false);

    // The entry survived the outage and the next tick decides it.
    let report = engine.tick().unwrap();
    assert!(report
        .processed
        .iter()
        .any(|(id, outcome)| *id == 1 && matches!(outcome, Outcome::Assigned { .. })));
}

#[test]
fn timed_out_entry_returns_to_pending() {
    let clock = FixedClock::new(t0());
    let options = EngineOptions {
        retry_backoff_ms: 0,
        assign_timeout: Duration::zero(),
        ..EngineOptions::default()
    };
    let engine = make_engine_with_options(&clock, options);
    seed_roster(&engine, &["A"]);
    // Normal mode: the tick processes leased entries one by one.
    set_policy(&engine, AssignmentPolicy::default());

    let start = t0() + Duration::days(20);
    engine
        .store()
        .put_booking(waiting_booking(1, MeetingType::General, start, 1))
        .unwrap();
    assert!(matches!(engine.assign(1).unwrap(), Outcome::Pooled { .. }));

    clock.set(start - Duration::days(15) + Duration::minutes(1));
    let report = engine.tick().unwrap();
    assert!(report.processed.iter().any(|(id, outcome)| {
        *id == 1
            && matches!(outcome, Outcome::Escalated { reason, .. } if reason == reasons::TIMEOUT)
    }));
    // The entry survived and is back to pending for a later retry.
    let entry = engine.store().pool_get(1).unwrap().unwrap();
    assert_eq!(entry.state, PoolState::Pending);
    assert_eq!(entry.attempts, 0);
}

#[test]
fn drain_empties_the_ready_queue() {
    let clock = FixedClock::new(t0());
    let engine = make_engine(&clock);
    seed_roster(&engine, &["A", "B", "C", "D"]);
    set_policy(&engine, balance_policy());

    let start = t0() + Duration::days(20);
    for id in 1..=4 {
        // Stagger by hours so the entries do not all conflict.
        engine
            .store()
            .put_booking(waiting_booking(
                id,
                MeetingType::General,
                start + Duration::hours(2 * id),
                1,
            ))
            .unwrap();
        assert!(matches!(engine.assign(id).unwrap(), Outcome::Pooled { .. }));
    }

    clock.set(start - Duration::days(15) + Duration::hours(12));
    let outcomes = engine.drain().unwrap();
    assert_eq!(outcomes.len(), 4);
    assert_eq!(engine.pool_stats().unwrap().total, 0);
}

#[test]
fn pool_priority_follows_mode() {
    let booking = waiting_booking(1, MeetingType::General, t0() + Duration::days(10), 1);
    assert_eq!(PoolEntry::new(&booking, AssignMode::Urgent, 0, t0()).processing_priority, 1);
    assert_eq!(PoolEntry::new(&booking, AssignMode::Balance, 15, t0()).processing_priority, 2);
    assert_eq!(PoolEntry::new(&booking, AssignMode::Normal, 15, t0()).processing_priority, 3);
}
