//! Store capability traits.
//!
//! The engine is polymorphic over a narrow capability set: read bookings,
//! write assignments, read/write policy, track the pool, persist the roster
//! snapshot, append audit entries, and tell the time. Two implementations
//! ship with the crate: [`MemoryStore`] (tests, demos) and [`SqliteStore`]
//! (the CLI's persistent store).

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::audit::AssignmentLogEntry;
use crate::booking::{Booking, BookingStatus, Interpreter, MeetingType};
use crate::error::{EngineError, StoreError};
use crate::history::DrFilter;
use crate::policy::{AssignMode, AssignmentPolicy, ModeThreshold, PolicyPatch};
use crate::pool::PoolEntry;
use crate::roster::RosterSnapshot;

/// Result of an atomic assignment commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The overlap re-check passed and the assignment is durable.
    Committed,
    /// Another writer took the interpreter (or the booking) in between.
    Rejected,
}

/// Read/write access to bookings and assignments.
pub trait BookingStore {
    fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError>;

    fn list_active_interpreters(&self) -> Result<Vec<Interpreter>, StoreError>;

    /// Bookings held by `interpreter_id` with a status in `statuses`,
    /// overlapping the half-open interval `[start, end)`.
    fn list_overlapping(
        &self,
        interpreter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, StoreError>;

    /// Approved bookings with `time_start` in `[start, end)`.
    fn list_approved_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// The most recent DR booking with `time_start < before`, honouring the
    /// filter's sub-class and pending-inclusion settings.
    fn last_dr(&self, before: DateTime<Utc>, filter: &DrFilter) -> Result<Option<Booking>, StoreError>;

    /// Whole days since the interpreter's most recent approved booking
    /// starting at or before `now`; `None` when there is none.
    fn days_since_last(&self, interpreter_id: &str, now: DateTime<Utc>) -> Result<Option<i64>, StoreError>;

    /// Atomic assignment: re-check overlap, then write `assigned_interpreter`
    /// and `status = approve` in one step. Committing twice with the same
    /// interpreter is idempotent.
    fn commit_assignment(&self, booking_id: i64, interpreter_id: &str) -> Result<CommitOutcome, StoreError>;

    fn set_status(&self, booking_id: i64, status: BookingStatus) -> Result<(), StoreError>;
}

/// Read/write access to the assignment policy and threshold rows.
pub trait PolicyStore {
    fn get_policy(&self) -> Result<AssignmentPolicy, StoreError>;

    /// Validate and persist a patch; bumps the generation counter.
    fn write_policy(&self, patch: &PolicyPatch) -> Result<AssignmentPolicy, EngineError>;

    fn get_thresholds(
        &self,
        meeting_type: MeetingType,
        mode: AssignMode,
    ) -> Result<Option<ModeThreshold>, StoreError>;

    /// Upsert a threshold row; bumps the generation counter.
    fn put_thresholds(&self, row: ModeThreshold) -> Result<(), StoreError>;

    /// Monotonic counter bumped by every policy or threshold write.
    fn policy_generation(&self) -> Result<u64, StoreError>;
}

/// Exclusive engine-side pool state.
pub trait PoolStore {
    /// Insert an entry; idempotent by `booking_id`.
    fn pool_add(&self, entry: PoolEntry) -> Result<(), StoreError>;

    fn pool_get(&self, booking_id: i64) -> Result<Option<PoolEntry>, StoreError>;

    fn pool_list(&self) -> Result<Vec<PoolEntry>, StoreError>;

    /// Persist a mutated entry (state, attempts, lease bookkeeping).
    fn pool_update(&self, entry: &PoolEntry) -> Result<(), StoreError>;

    /// Compare-and-set to `processing`. Succeeds from `pending`/`ready`, or
    /// from `processing` when the existing lease is older than
    /// `lease_timeout` (watchdog reclaim).
    fn pool_lease(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<bool, StoreError>;

    fn pool_remove(&self, booking_id: i64) -> Result<(), StoreError>;
}

/// Roster snapshot persistence for the dynamic-pool adjuster.
pub trait RosterStore {
    fn roster_snapshot(&self) -> Result<Option<RosterSnapshot>, StoreError>;
    fn save_roster_snapshot(&self, snapshot: &RosterSnapshot) -> Result<(), StoreError>;
}

/// Append-only audit sink.
pub trait LogSink {
    fn append(&self, entry: &AssignmentLogEntry) -> Result<(), StoreError>;
}

/// The full capability set the engine runs against.
pub trait EngineStore: BookingStore + PolicyStore + PoolStore + RosterStore + LogSink {}

impl<T: BookingStore + PolicyStore + PoolStore + RosterStore + LogSink> EngineStore for T {}

/// Injectable time source.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Returns `~/.config/interpool[-dev]/` based on INTERPOOL_ENV.
///
/// Set INTERPOOL_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("INTERPOOL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("interpool-dev")
    } else {
        base_dir.join("interpool")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(dir)
}
