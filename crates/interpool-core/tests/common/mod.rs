//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use interpool_core::{
    AssignmentPolicy, Booking, BookingStatus, Engine, EngineOptions, FixedClock, Interpreter,
    MeetingType, MemoryStore,
};

/// A fixed "now" every suite runs against: 2026-03-02 09:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn make_engine(clock: &FixedClock) -> Engine<MemoryStore, &FixedClock> {
    let options = EngineOptions { retry_backoff_ms: 0, ..EngineOptions::default() };
    make_engine_with_options(clock, options)
}

pub fn make_engine_with_options(
    clock: &FixedClock,
    options: EngineOptions,
) -> Engine<MemoryStore, &FixedClock> {
    Engine::with_options(MemoryStore::new(), clock, options)
}

pub fn seed_roster(engine: &Engine<MemoryStore, &FixedClock>, ids: &[&str]) {
    let roster: Vec<Interpreter> = ids
        .iter()
        .map(|id| Interpreter::new(*id, t0() - Duration::days(400)))
        .collect();
    engine.store().put_interpreters(&roster).unwrap();
}

pub fn waiting_booking(id: i64, meeting_type: MeetingType, start: DateTime<Utc>, hours: i64) -> Booking {
    Booking {
        id,
        meeting_type,
        dr_type: None,
        time_start: start,
        time_end: start + Duration::hours(hours),
        room: format!("R-{id:03}"),
        owner_id: "EMP-0100".to_string(),
        created_at: t0() - Duration::days(10),
        status: BookingStatus::Waiting,
        assigned_interpreter: None,
    }
}

pub fn approved_booking(
    id: i64,
    interpreter: &str,
    start: DateTime<Utc>,
    hours: i64,
) -> Booking {
    Booking {
        status: BookingStatus::Approve,
        assigned_interpreter: Some(interpreter.to_string()),
        ..waiting_booking(id, MeetingType::General, start, hours)
    }
}

/// Seed past approved bookings so the fairness window shows the given hour
/// totals. Booking ids start at 900 to stay clear of scenario bookings.
pub fn seed_hours(engine: &Engine<MemoryStore, &FixedClock>, hours: &[(&str, i64)]) {
    let mut id = 900;
    for (interpreter, h) in hours {
        if *h > 0 {
            engine
                .store()
                .put_booking(approved_booking(id, interpreter, t0() - Duration::days(2), *h))
                .unwrap();
            id += 1;
        }
    }
}

pub fn set_policy(engine: &Engine<MemoryStore, &FixedClock>, policy: AssignmentPolicy) {
    engine.store().set_policy(policy).unwrap();
}
