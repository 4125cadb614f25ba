//! In-memory store: the test double and demo backend.
//!
//! A single mutex guards all tables, which also makes `commit_assignment`
//! genuinely atomic: the overlap re-check and the write happen under one
//! lock acquisition.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::audit::AssignmentLogEntry;
use crate::booking::{Booking, BookingStatus, Interpreter, MeetingType};
use crate::error::{EngineError, StoreError};
use crate::history::DrFilter;
use crate::policy::{AssignMode, AssignmentPolicy, ModeThreshold, PolicyPatch};
use crate::pool::{PoolEntry, PoolState};
use crate::roster::RosterSnapshot;
use crate::store::{BookingStore, CommitOutcome, LogSink, PolicyStore, PoolStore, RosterStore};

#[derive(Default)]
struct Inner {
    bookings: BTreeMap<i64, Booking>,
    interpreters: Vec<Interpreter>,
    pool: BTreeMap<i64, PoolEntry>,
    policy: Option<AssignmentPolicy>,
    thresholds: HashMap<(MeetingType, AssignMode), ModeThreshold>,
    generation: u64,
    roster_snapshot: Option<RosterSnapshot>,
    log: Vec<AssignmentLogEntry>,
    unavailable: bool,
    reject_commits: u32,
}

/// Mutex-guarded in-memory implementation of the full capability set.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    // ── Seeding helpers ──────────────────────────────────────────────

    pub fn put_booking(&self, booking: Booking) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.bookings.insert(booking.id, booking);
        Ok(())
    }

    pub fn put_interpreters(&self, roster: &[Interpreter]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.interpreters = roster.to_vec();
        Ok(())
    }

    pub fn set_policy(&self, policy: AssignmentPolicy) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.policy = Some(policy);
        inner.generation += 1;
        Ok(())
    }

    /// Every appended audit entry, in order.
    pub fn log_entries(&self) -> Result<Vec<AssignmentLogEntry>, StoreError> {
        Ok(self.lock()?.log.clone())
    }

    // ── Fault injection (tests) ──────────────────────────────────────

    /// Make every subsequent store call fail as transient.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// Reject the next `n` commit attempts, simulating a concurrent writer
    /// winning the interpreter.
    pub fn reject_next_commits(&self, n: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.reject_commits = n;
        }
    }

    fn check_available(inner: &Inner) -> Result<(), StoreError> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

impl BookingStore for MemoryStore {
    fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.bookings.get(&id).cloned())
    }

    fn list_active_interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.interpreters.iter().filter(|i| i.active).cloned().collect())
    }

    fn list_overlapping(
        &self,
        interpreter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.assigned_interpreter.as_deref() == Some(interpreter_id))
            .filter(|b| statuses.contains(&b.status))
            .filter(|b| b.overlaps(start, end))
            .cloned()
            .collect())
    }

    fn list_approved_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Approve)
            .filter(|b| b.time_start >= start && b.time_start < end)
            .cloned()
            .collect())
    }

    fn last_dr(&self, before: DateTime<Utc>, filter: &DrFilter) -> Result<Option<Booking>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.meeting_type == MeetingType::Dr)
            .filter(|b| b.time_start < before)
            .filter(|b| match b.status {
                BookingStatus::Approve => true,
                BookingStatus::Waiting => filter.include_pending,
                _ => false,
            })
            .filter(|b| match &filter.dr_type {
                Some(t) => b.dr_type.as_deref() == Some(t.as_str()),
                None => true,
            })
            .max_by_key(|b| (b.time_start, b.id))
            .cloned())
    }

    fn days_since_last(&self, interpreter_id: &str, now: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Approve)
            .filter(|b| b.assigned_interpreter.as_deref() == Some(interpreter_id))
            .filter(|b| b.time_start <= now)
            .map(|b| b.time_start)
            .max()
            .map(|ts| (now - ts).num_days()))
    }

    fn commit_assignment(&self, booking_id: i64, interpreter_id: &str) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;

        if inner.reject_commits > 0 {
            inner.reject_commits -= 1;
            return Ok(CommitOutcome::Rejected);
        }

        let Some(booking) = inner.bookings.get(&booking_id).cloned() else {
            return Err(StoreError::NotFound { entity: "booking", id: booking_id.to_string() });
        };

        if booking.status == BookingStatus::Approve {
            return Ok(if booking.assigned_interpreter.as_deref() == Some(interpreter_id) {
                CommitOutcome::Committed
            } else {
                CommitOutcome::Rejected
            });
        }

        // Overlap re-check inside the same lock acquisition as the write.
        let conflict = inner
            .bookings
            .values()
            .filter(|b| b.id != booking_id)
            .filter(|b| b.status == BookingStatus::Approve)
            .filter(|b| b.assigned_interpreter.as_deref() == Some(interpreter_id))
            .any(|b| b.overlaps(booking.time_start, booking.time_end));
        if conflict {
            return Ok(CommitOutcome::Rejected);
        }

        if let Some(b) = inner.bookings.get_mut(&booking_id) {
            b.assigned_interpreter = Some(interpreter_id.to_string());
            b.status = BookingStatus::Approve;
        }
        Ok(CommitOutcome::Committed)
    }

    fn set_status(&self, booking_id: i64, status: BookingStatus) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        match inner.bookings.get_mut(&booking_id) {
            Some(b) => {
                b.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound { entity: "booking", id: booking_id.to_string() }),
        }
    }
}

impl PolicyStore for MemoryStore {
    fn get_policy(&self) -> Result<AssignmentPolicy, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.policy.clone().unwrap_or_default())
    }

    fn write_policy(&self, patch: &PolicyPatch) -> Result<AssignmentPolicy, EngineError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        let current = inner.policy.clone().unwrap_or_default();
        let next = current.apply_patch(patch)?;
        inner.policy = Some(next.clone());
        inner.generation += 1;
        Ok(next)
    }

    fn get_thresholds(
        &self,
        meeting_type: MeetingType,
        mode: AssignMode,
    ) -> Result<Option<ModeThreshold>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.thresholds.get(&(meeting_type, mode)).copied())
    }

    fn put_thresholds(&self, row: ModeThreshold) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        inner.thresholds.insert((row.meeting_type, row.mode), row);
        inner.generation += 1;
        Ok(())
    }

    fn policy_generation(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.generation)
    }
}

impl PoolStore for MemoryStore {
    fn pool_add(&self, entry: PoolEntry) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        inner.pool.entry(entry.booking_id).or_insert(entry);
        Ok(())
    }

    fn pool_get(&self, booking_id: i64) -> Result<Option<PoolEntry>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.pool.get(&booking_id).cloned())
    }

    fn pool_list(&self) -> Result<Vec<PoolEntry>, StoreError> {
        let inner = self.lock()?;
        Self::check_available(&inner)?;
        Ok(inner.pool.values().cloned().collect())
    }

    fn pool_update(&self, entry: &PoolEntry) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        match inner.pool.get_mut(&entry.booking_id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { entity: "pool entry", id: entry.booking_id.to_string() }),
        }
    }

    fn pool_lease(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        let Some(entry) = inner.pool.get_mut(&booking_id) else {
            return Ok(false);
        };
        let leasable = match entry.state {
            PoolState::Pending | PoolState::Ready => true,
            PoolState::Processing => entry.lease_expired(now, lease_timeout),
            PoolState::Failed => false,
        };
        if leasable {
            entry.state = PoolState::Processing;
            entry.leased_at = Some(now);
        }
        Ok(leasable)
    }

    fn pool_remove(&self, booking_id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        inner.pool.remove(&booking_id);
        Ok(())
    }
}

impl RosterStore for MemoryStore {
    fn roster_snapshot(&self) -> Result<Option<RosterSnapshot>, StoreError> {
        Ok(self.lock()?.roster_snapshot.clone())
    }

    fn save_roster_snapshot(&self, snapshot: &RosterSnapshot) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.roster_snapshot = Some(snapshot.clone());
        Ok(())
    }
}

impl LogSink for MemoryStore {
    fn append(&self, entry: &AssignmentLogEntry) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        Self::check_available(&inner)?;
        inner.log.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Weights;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn booking(id: i64, start: DateTime<Utc>) -> Booking {
        Booking {
            id,
            meeting_type: MeetingType::General,
            dr_type: None,
            time_start: start,
            time_end: start + Duration::hours(1),
            room: "R-1".to_string(),
            owner_id: "EMP-0001".to_string(),
            created_at: start - Duration::days(7),
            status: BookingStatus::Waiting,
            assigned_interpreter: None,
        }
    }

    #[test]
    fn test_commit_rechecks_overlap() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, now() + Duration::days(1))).unwrap();
        store.put_booking(booking(2, now() + Duration::days(1))).unwrap();

        assert_eq!(store.commit_assignment(1, "A").unwrap(), CommitOutcome::Committed);
        // Same interpreter, overlapping second booking: rejected.
        assert_eq!(store.commit_assignment(2, "A").unwrap(), CommitOutcome::Rejected);
        assert_eq!(store.commit_assignment(2, "B").unwrap(), CommitOutcome::Committed);
    }

    #[test]
    fn test_commit_is_idempotent_for_same_interpreter() {
        let store = MemoryStore::new();
        store.put_booking(booking(1, now() + Duration::days(1))).unwrap();

        assert_eq!(store.commit_assignment(1, "A").unwrap(), CommitOutcome::Committed);
        assert_eq!(store.commit_assignment(1, "A").unwrap(), CommitOutcome::Committed);
        assert_eq!(store.commit_assignment(1, "B").unwrap(), CommitOutcome::Rejected);
    }

    #[test]
    fn test_pool_add_is_idempotent() {
        let store = MemoryStore::new();
        let b = booking(5, now() + Duration::days(10));
        let mut entry = PoolEntry::new(&b, AssignMode::Normal, 15, now());
        store.pool_add(entry.clone()).unwrap();

        entry.attempts = 2;
        store.pool_add(entry).unwrap();
        assert_eq!(store.pool_get(5).unwrap().unwrap().attempts, 0);
    }

    #[test]
    fn test_lease_cas_and_watchdog_reclaim() {
        let store = MemoryStore::new();
        let b = booking(5, now() + Duration::days(10));
        store.pool_add(PoolEntry::new(&b, AssignMode::Normal, 15, now())).unwrap();

        assert!(store.pool_lease(5, now(), Duration::seconds(60)).unwrap());
        // Second lease while fresh is refused.
        assert!(!store.pool_lease(5, now() + Duration::seconds(30), Duration::seconds(60)).unwrap());
        // Expired lease is reclaimable.
        assert!(store.pool_lease(5, now() + Duration::seconds(90), Duration::seconds(60)).unwrap());
    }

    #[test]
    fn test_policy_write_bumps_generation() {
        let store = MemoryStore::new();
        let before = store.policy_generation().unwrap();
        store
            .write_policy(&PolicyPatch { max_gap_hours: Some(6.0), ..Default::default() })
            .unwrap();
        assert!(store.policy_generation().unwrap() > before);
        assert_eq!(store.get_policy().unwrap().max_gap_hours, 6.0);
    }

    #[test]
    fn test_write_policy_rejects_locked_weights() {
        let store = MemoryStore::new();
        let err = store
            .write_policy(&PolicyPatch { w_lrs: Some(1.0), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, EngineError::Policy(_)));
        // Generation unchanged on refused writes.
        assert_eq!(store.policy_generation().unwrap(), 0);
        assert_eq!(store.get_policy().unwrap().weights, Weights::normal());
    }
}
