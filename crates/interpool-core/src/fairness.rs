//! Rolling per-interpreter hour totals and the fairness score.
//!
//! Hours are accumulated over the fairness window: approved bookings whose
//! start falls in `[now - window, now)`, summed per interpreter. Every
//! active interpreter appears in the map, zero-hour entries included, so the
//! fairness score rewards whoever is furthest below the busiest colleague.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::booking::Interpreter;
use crate::error::StoreError;
use crate::store::BookingStore;

/// Per-interpreter hour totals over the fairness window. BTreeMap keeps the
/// snapshot serialisation deterministic.
pub type HoursMap = BTreeMap<String, f64>;

/// Aggregate approved hours per active interpreter over the window ending at
/// `now`.
pub fn hours_in_window<S: BookingStore + ?Sized>(
    store: &S,
    roster: &[Interpreter],
    now: DateTime<Utc>,
    fairness_window_days: i64,
) -> Result<HoursMap, StoreError> {
    let window_start = now - Duration::days(fairness_window_days);
    let mut hours: HoursMap = roster.iter().map(|i| (i.id.clone(), 0.0)).collect();

    for booking in store.list_approved_in_window(window_start, now)? {
        let Some(interpreter) = booking.assigned_interpreter.as_deref() else {
            continue;
        };
        if let Some(total) = hours.get_mut(interpreter) {
            *total += booking.duration_hours();
        }
    }
    Ok(hours)
}

/// Fairness score for a candidate given the current hours map.
///
/// `gap = hours(candidate) - min(hours)`, scaled against the allowed gap and
/// clamped to `[0, 1]`. With a zero gap budget, only candidates already at
/// the minimum score anything.
pub fn fairness_score(hours: &HoursMap, candidate: &str, max_gap_hours: f64) -> f64 {
    let h = hours.get(candidate).copied().unwrap_or(0.0);
    let min = hours.values().copied().fold(f64::INFINITY, f64::min);
    let min = if min.is_finite() { min } else { 0.0 };
    let gap = h - min;

    if max_gap_hours <= 0.0 {
        return if gap <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - gap / max_gap_hours).clamp(0.0, 1.0)
}

/// Fairness score with the dynamic-roster adjustment applied.
///
/// A newcomer on a growing roster has their score scaled by the roster
/// adjustment factor (`>= 1`, see `roster::diff_roster`) and re-clamped to
/// `[0, 1]`. Established interpreters pass a factor of 1.0.
pub fn adjusted_fairness_score(
    hours: &HoursMap,
    candidate: &str,
    max_gap_hours: f64,
    adjustment_factor: f64,
) -> f64 {
    (fairness_score(hours, candidate, max_gap_hours) * adjustment_factor).clamp(0.0, 1.0)
}

/// Whether assigning `duration_hours` to `candidate` would push the workload
/// spread past the allowed gap.
///
/// The spread is measured across interpreters that have at least one
/// assignment in the window, plus the candidate (who will have one after
/// this assignment). Idle colleagues do not pin the minimum at zero.
pub fn would_exceed_gap(
    hours: &HoursMap,
    candidate: &str,
    duration_hours: f64,
    max_gap_hours: f64,
) -> bool {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;

    for (id, &h) in hours {
        let projected = if id == candidate { h + duration_hours } else { h };
        if id != candidate && h <= 0.0 {
            continue;
        }
        seen = true;
        min = min.min(projected);
        max = max.max(projected);
    }

    if !seen {
        return false;
    }
    max - min > max_gap_hours
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Booking, BookingStatus, MeetingType};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn make_hours(pairs: &[(&str, f64)]) -> HoursMap {
        pairs.iter().map(|(id, h)| (id.to_string(), *h)).collect()
    }

    fn approved_booking(id: i64, interpreter: &str, start: DateTime<Utc>, hours: i64) -> Booking {
        Booking {
            id,
            meeting_type: MeetingType::General,
            dr_type: None,
            time_start: start,
            time_end: start + Duration::hours(hours),
            room: "R-101".to_string(),
            owner_id: "EMP-0001".to_string(),
            created_at: start - Duration::days(10),
            status: BookingStatus::Approve,
            assigned_interpreter: Some(interpreter.to_string()),
        }
    }

    #[test]
    fn test_fairness_rewards_lowest_hours() {
        let hours = make_hours(&[("A", 4.0), ("B", 0.0), ("C", 2.0)]);
        let fa = fairness_score(&hours, "A", 8.0);
        let fb = fairness_score(&hours, "B", 8.0);
        let fc = fairness_score(&hours, "C", 8.0);

        assert_eq!(fb, 1.0);
        assert!((fa - 0.5).abs() < 1e-9);
        assert!((fc - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_adjusted_fairness_scales_and_clamps() {
        let hours = make_hours(&[("A", 4.0), ("B", 0.0)]);

        // Factor 1.0 leaves the plain score untouched.
        assert_eq!(
            adjusted_fairness_score(&hours, "A", 8.0, 1.0),
            fairness_score(&hours, "A", 8.0)
        );
        // A 1.4 factor lifts a mid-range score proportionally.
        assert!((adjusted_fairness_score(&hours, "A", 8.0, 1.4) - 0.7).abs() < 1e-9);
        // An already-saturated score stays clamped at 1.
        assert_eq!(adjusted_fairness_score(&hours, "B", 8.0, 1.5), 1.0);
    }

    #[test]
    fn test_fairness_zero_gap_budget() {
        let hours = make_hours(&[("A", 2.0), ("B", 0.0)]);
        assert_eq!(fairness_score(&hours, "B", 0.0), 1.0);
        assert_eq!(fairness_score(&hours, "A", 0.0), 0.0);
    }

    #[test]
    fn test_gap_check_counts_assigned_only() {
        // B idle, A at 9h. Giving B one hour leaves a spread of 8 among
        // {A: 9, B: 1}, within an 8h budget.
        let hours = make_hours(&[("A", 9.0), ("B", 0.0), ("C", 0.0)]);
        assert!(!would_exceed_gap(&hours, "B", 1.0, 8.0));

        // Giving A another hour spreads {A: 10, B/C idle} -> single member,
        // no violation; but once B has hours the spread binds.
        let hours2 = make_hours(&[("A", 9.0), ("B", 0.5)]);
        assert!(would_exceed_gap(&hours2, "A", 1.0, 8.0));
    }

    #[test]
    fn test_gap_check_first_assignment_never_violates() {
        let hours = make_hours(&[("A", 0.0), ("B", 0.0)]);
        assert!(!would_exceed_gap(&hours, "A", 9.0, 8.0));
    }

    #[test]
    fn test_gap_check_exact_boundary_allowed() {
        let hours = make_hours(&[("A", 8.0), ("B", 1.0)]);
        // Spread after giving B 1h is exactly 7 -> within budget of 7.
        assert!(!would_exceed_gap(&hours, "B", 1.0, 7.0));
        assert!(would_exceed_gap(&hours, "B", 0.5, 6.0));
    }

    #[test]
    fn test_hours_in_window_aggregates_and_defaults() {
        let store = MemoryStore::new();
        let roster = vec![
            Interpreter::new("A", now() - Duration::days(400)),
            Interpreter::new("B", now() - Duration::days(400)),
        ];
        store.put_interpreters(&roster).unwrap();

        store.put_booking(approved_booking(1, "A", now() - Duration::days(2), 2)).unwrap();
        store.put_booking(approved_booking(2, "A", now() - Duration::days(1), 1)).unwrap();
        // Outside the window: too old.
        store.put_booking(approved_booking(3, "A", now() - Duration::days(20), 5)).unwrap();
        // Starts at `now`: window is half-open, excluded.
        store.put_booking(approved_booking(4, "B", now(), 5)).unwrap();

        let hours = hours_in_window(&store, &roster, now(), 14).unwrap();
        assert!((hours["A"] - 3.0).abs() < 1e-9);
        assert_eq!(hours["B"], 0.0);
    }
}
