//! Time-conflict detection against confirmed bookings.
//!
//! A candidate conflicts with `[start, end)` when they already hold a
//! booking overlapping that interval. Hard blocking considers approved
//! bookings only by default; counting waiting bookings too is a policy
//! choice surfaced through `include_waiting`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::BookingStatus;
use crate::error::StoreError;
use crate::store::BookingStore;

/// One overlapping booking held by a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub booking_id: i64,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub room: String,
    pub status: BookingStatus,
}

fn blocking_statuses(include_waiting: bool) -> &'static [BookingStatus] {
    if include_waiting {
        &[BookingStatus::Approve, BookingStatus::Waiting]
    } else {
        &[BookingStatus::Approve]
    }
}

/// All bookings held by `interpreter_id` overlapping `[start, end)`.
pub fn conflicts<S: BookingStore + ?Sized>(
    store: &S,
    interpreter_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_waiting: bool,
) -> Result<Vec<Conflict>, StoreError> {
    let overlapping =
        store.list_overlapping(interpreter_id, start, end, blocking_statuses(include_waiting))?;
    Ok(overlapping
        .into_iter()
        .map(|b| Conflict {
            booking_id: b.id,
            time_start: b.time_start,
            time_end: b.time_end,
            room: b.room,
            status: b.status,
        })
        .collect())
}

/// Whether `interpreter_id` is free over `[start, end)`.
pub fn available<S: BookingStore + ?Sized>(
    store: &S,
    interpreter_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_waiting: bool,
) -> Result<bool, StoreError> {
    Ok(conflicts(store, interpreter_id, start, end, include_waiting)?.is_empty())
}

/// Filter a candidate list down to those free over `[start, end)`.
pub fn filter_available<S: BookingStore + ?Sized>(
    store: &S,
    interpreter_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_waiting: bool,
) -> Result<Vec<String>, StoreError> {
    let mut free = Vec::with_capacity(interpreter_ids.len());
    for id in interpreter_ids {
        if available(store, id, start, end, include_waiting)? {
            free.push(id.clone());
        }
    }
    Ok(free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Booking, MeetingType};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
    }

    fn booking(id: i64, interpreter: &str, status: BookingStatus, start_h: i64, end_h: i64) -> Booking {
        Booking {
            id,
            meeting_type: MeetingType::General,
            dr_type: None,
            time_start: day() + Duration::hours(start_h),
            time_end: day() + Duration::hours(end_h),
            room: "R-301".to_string(),
            owner_id: "EMP-0002".to_string(),
            created_at: day() - Duration::days(3),
            status,
            assigned_interpreter: Some(interpreter.to_string()),
        }
    }

    #[test]
    fn test_approved_overlap_blocks() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, "A", BookingStatus::Approve, 9, 11)).unwrap();

        assert!(!available(&store, "A", day() + Duration::hours(10), day() + Duration::hours(12), false).unwrap());
        assert!(available(&store, "B", day() + Duration::hours(10), day() + Duration::hours(12), false).unwrap());
    }

    #[test]
    fn test_touching_intervals_do_not_conflict() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, "A", BookingStatus::Approve, 9, 11)).unwrap();

        assert!(available(&store, "A", day() + Duration::hours(11), day() + Duration::hours(12), false).unwrap());
        assert!(available(&store, "A", day() + Duration::hours(8), day() + Duration::hours(9), false).unwrap());
    }

    #[test]
    fn test_waiting_blocks_only_when_included() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, "A", BookingStatus::Waiting, 9, 11)).unwrap();

        assert!(available(&store, "A", day() + Duration::hours(9), day() + Duration::hours(10), false).unwrap());
        assert!(!available(&store, "A", day() + Duration::hours(9), day() + Duration::hours(10), true).unwrap());
    }

    #[test]
    fn test_cancelled_never_blocks() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, "A", BookingStatus::Cancel, 9, 11)).unwrap();
        assert!(available(&store, "A", day() + Duration::hours(9), day() + Duration::hours(10), true).unwrap());
    }

    #[test]
    fn test_filter_available() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, "A", BookingStatus::Approve, 9, 11)).unwrap();
        store.put_booking(booking(2, "C", BookingStatus::Approve, 10, 12)).unwrap();

        let ids: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let free = filter_available(&store, &ids, day() + Duration::hours(10), day() + Duration::hours(11), false).unwrap();
        assert_eq!(free, vec!["B".to_string()]);
    }
}
