//! SQLite-backed store for bookings, pool entries, policy and audit log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use crate::audit::AssignmentLogEntry;
use crate::booking::{Booking, BookingStatus, Interpreter, MeetingType};
use crate::error::{EngineError, StoreError};
use crate::history::DrFilter;
use crate::policy::{AssignMode, AssignmentPolicy, ModeThreshold, PolicyPatch};
use crate::pool::{PoolEntry, PoolState};
use crate::roster::RosterSnapshot;
use crate::store::{
    data_dir, BookingStore, CommitOutcome, LogSink, PolicyStore, PoolStore, RosterStore,
};

// === Helper Functions ===

/// Format a timestamp for storage. Fixed-width RFC3339 with microseconds,
/// so lexicographic comparison in SQL matches chronological order.
fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored timestamp, falling back to the epoch on corruption.
fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

fn parse_opt_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|v| parse_dt(&v))
}

fn parse_mode(s: &str) -> AssignMode {
    AssignMode::parse(s).unwrap_or(AssignMode::Normal)
}

/// Build a Booking from a `SELECT * FROM bookings` row.
fn row_to_booking(row: &rusqlite::Row) -> Result<Booking, rusqlite::Error> {
    let meeting_type: String = row.get(1)?;
    let time_start: String = row.get(3)?;
    let time_end: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let status: String = row.get(8)?;
    Ok(Booking {
        id: row.get(0)?,
        meeting_type: MeetingType::parse(&meeting_type),
        dr_type: row.get(2)?,
        time_start: parse_dt(&time_start),
        time_end: parse_dt(&time_end),
        room: row.get(5)?,
        owner_id: row.get(6)?,
        created_at: parse_dt(&created_at),
        status: BookingStatus::parse(&status),
        assigned_interpreter: row.get(9)?,
    })
}

/// Build a PoolEntry from a `SELECT * FROM pool_entries` row.
fn row_to_pool_entry(row: &rusqlite::Row) -> Result<PoolEntry, rusqlite::Error> {
    let meeting_type: String = row.get(1)?;
    let time_start: String = row.get(2)?;
    let time_end: String = row.get(3)?;
    let mode: String = row.get(4)?;
    let deadline_time: String = row.get(6)?;
    let pool_entry_time: String = row.get(7)?;
    let state: String = row.get(11)?;
    let leased_at: Option<String> = row.get(12)?;
    let failed_at: Option<String> = row.get(13)?;
    Ok(PoolEntry {
        booking_id: row.get(0)?,
        meeting_type: MeetingType::parse(&meeting_type),
        time_start: parse_dt(&time_start),
        time_end: parse_dt(&time_end),
        mode: parse_mode(&mode),
        threshold_days: row.get(5)?,
        deadline_time: parse_dt(&deadline_time),
        pool_entry_time: parse_dt(&pool_entry_time),
        processing_priority: row.get::<_, i64>(8)? as u8,
        batch_id: row.get(9)?,
        attempts: row.get::<_, i64>(10)? as u32,
        state: PoolState::parse(&state),
        leased_at: parse_opt_dt(leased_at),
        failed_at: parse_opt_dt(failed_at),
    })
}

const SELECT_BOOKING: &str = "SELECT id, meeting_type, dr_type, time_start, time_end, room, \
     owner_id, created_at, status, assigned_interpreter FROM bookings";

const SELECT_POOL_ENTRY: &str = "SELECT booking_id, meeting_type, time_start, time_end, mode, \
     threshold_days, deadline_time, pool_entry_time, processing_priority, batch_id, attempts, \
     state, leased_at, failed_at FROM pool_entries";

/// SQLite store implementing the full engine capability set.
///
/// Lives at `~/.config/interpool/interpool.db` by default.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and migrate) the default on-disk store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()?.join("interpool.db");
        Self::open_at(&path)
    }

    /// Open (and migrate) a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// In-memory store, for tests and demos.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "busy_timeout", 5_000).ok();
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    // ── Seeding ──────────────────────────────────────────────────────

    pub fn put_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bookings (id, meeting_type, dr_type, time_start, time_end, \
             room, owner_id, created_at, status, assigned_interpreter) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                booking.id,
                booking.meeting_type.as_str(),
                booking.dr_type,
                fmt_dt(booking.time_start),
                fmt_dt(booking.time_end),
                booking.room,
                booking.owner_id,
                fmt_dt(booking.created_at),
                booking.status.as_str(),
                booking.assigned_interpreter,
            ],
        )?;
        Ok(())
    }

    pub fn put_interpreter(&self, interpreter: &Interpreter) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO interpreters (id, active, joined_at) VALUES (?1, ?2, ?3)",
            params![interpreter.id, interpreter.active as i64, fmt_dt(interpreter.joined_at)],
        )?;
        Ok(())
    }

    /// Ensure the single policy row exists, seeding it from `seed` when the
    /// store is fresh.
    pub fn ensure_policy(&self, seed: &AssignmentPolicy) -> Result<(), StoreError> {
        let body = serde_json::to_string(seed)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT OR IGNORE INTO policy (id, body, generation) VALUES (1, ?1, 0)",
            params![body],
        )?;
        Ok(())
    }

    /// Recent audit entries, newest first.
    pub fn recent_log(&self, limit: usize) -> Result<Vec<AssignmentLogEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM assignment_log ORDER BY seq DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for body in rows {
            let body = body?;
            if let Ok(entry) = serde_json::from_str(&body) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn bump_generation(&self) -> Result<(), rusqlite::Error> {
        let updated = self
            .conn
            .execute("UPDATE policy SET generation = generation + 1 WHERE id = 1", [])?;
        if updated == 0 {
            let body = serde_json::to_string(&AssignmentPolicy::default()).unwrap_or_default();
            self.conn.execute(
                "INSERT OR IGNORE INTO policy (id, body, generation) VALUES (1, ?1, 1)",
                params![body],
            )?;
        }
        Ok(())
    }
}

impl BookingStore for SqliteStore {
    fn get_booking(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        let booking = self
            .conn
            .query_row(
                &format!("{SELECT_BOOKING} WHERE id = ?1"),
                params![id],
                row_to_booking,
            )
            .optional()?;
        Ok(booking)
    }

    fn list_active_interpreters(&self) -> Result<Vec<Interpreter>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, active, joined_at FROM interpreters WHERE active = 1 ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let joined_at: String = row.get(2)?;
            Ok(Interpreter {
                id: row.get(0)?,
                active: row.get::<_, i64>(1)? != 0,
                joined_at: parse_dt(&joined_at),
            })
        })?;
        let mut roster = Vec::new();
        for r in rows {
            roster.push(r?);
        }
        Ok(roster)
    }

    fn list_overlapping(
        &self,
        interpreter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        // Status names are static enum strings, safe to inline.
        let status_list = statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{SELECT_BOOKING} WHERE assigned_interpreter = ?1 \
             AND time_start < ?2 AND time_end > ?3 AND status IN ({status_list}) \
             ORDER BY time_start"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![interpreter_id, fmt_dt(end), fmt_dt(start)],
            row_to_booking,
        )?;
        let mut bookings = Vec::new();
        for r in rows {
            bookings.push(r?);
        }
        Ok(bookings)
    }

    fn list_approved_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_BOOKING} WHERE status = 'approve' AND time_start >= ?1 AND time_start < ?2 \
             ORDER BY time_start"
        ))?;
        let rows = stmt.query_map(params![fmt_dt(start), fmt_dt(end)], row_to_booking)?;
        let mut bookings = Vec::new();
        for r in rows {
            bookings.push(r?);
        }
        Ok(bookings)
    }

    fn last_dr(&self, before: DateTime<Utc>, filter: &DrFilter) -> Result<Option<Booking>, StoreError> {
        let status_clause = if filter.include_pending {
            "status IN ('approve', 'waiting')"
        } else {
            "status = 'approve'"
        };
        let booking = match &filter.dr_type {
            Some(dr_type) => self
                .conn
                .query_row(
                    &format!(
                        "{SELECT_BOOKING} WHERE meeting_type = 'DR' AND time_start < ?1 \
                         AND {status_clause} AND dr_type = ?2 \
                         ORDER BY time_start DESC, id DESC LIMIT 1"
                    ),
                    params![fmt_dt(before), dr_type],
                    row_to_booking,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    &format!(
                        "{SELECT_BOOKING} WHERE meeting_type = 'DR' AND time_start < ?1 \
                         AND {status_clause} \
                         ORDER BY time_start DESC, id DESC LIMIT 1"
                    ),
                    params![fmt_dt(before)],
                    row_to_booking,
                )
                .optional()?,
        };
        Ok(booking)
    }

    fn days_since_last(&self, interpreter_id: &str, now: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(time_start) FROM bookings \
                 WHERE status = 'approve' AND assigned_interpreter = ?1 AND time_start <= ?2",
                params![interpreter_id, fmt_dt(now)],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(last.map(|ts| (now - parse_dt(&ts)).num_days()))
    }

    fn commit_assignment(&self, booking_id: i64, interpreter_id: &str) -> Result<CommitOutcome, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result = (|| -> Result<CommitOutcome, rusqlite::Error> {
            let booking = self
                .conn
                .query_row(
                    &format!("{SELECT_BOOKING} WHERE id = ?1"),
                    params![booking_id],
                    row_to_booking,
                )
                .optional()?;
            let Some(booking) = booking else {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            };

            if booking.status == BookingStatus::Approve {
                return Ok(if booking.assigned_interpreter.as_deref() == Some(interpreter_id) {
                    CommitOutcome::Committed
                } else {
                    CommitOutcome::Rejected
                });
            }

            // Overlap re-check inside the write transaction.
            let conflicts: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM bookings WHERE id != ?1 AND status = 'approve' \
                 AND assigned_interpreter = ?2 AND time_start < ?3 AND time_end > ?4",
                params![
                    booking_id,
                    interpreter_id,
                    fmt_dt(booking.time_end),
                    fmt_dt(booking.time_start)
                ],
                |row| row.get(0),
            )?;
            if conflicts > 0 {
                return Ok(CommitOutcome::Rejected);
            }

            self.conn.execute(
                "UPDATE bookings SET assigned_interpreter = ?2, status = 'approve' WHERE id = ?1",
                params![booking_id, interpreter_id],
            )?;
            Ok(CommitOutcome::Committed)
        })();

        match result {
            Ok(outcome) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(outcome)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(StoreError::NotFound { entity: "booking", id: booking_id.to_string() })
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e.into())
            }
        }
    }

    fn set_status(&self, booking_id: i64, status: BookingStatus) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE bookings SET status = ?2 WHERE id = ?1",
            params![booking_id, status.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { entity: "booking", id: booking_id.to_string() });
        }
        Ok(())
    }
}

impl PolicyStore for SqliteStore {
    fn get_policy(&self) -> Result<AssignmentPolicy, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM policy WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => {
                serde_json::from_str(&body).map_err(|e| StoreError::QueryFailed(e.to_string()))
            }
            None => Ok(AssignmentPolicy::default()),
        }
    }

    fn write_policy(&self, patch: &PolicyPatch) -> Result<AssignmentPolicy, EngineError> {
        let current = self.get_policy()?;
        let next = current.apply_patch(patch)?;
        let body = serde_json::to_string(&next)?;
        self.conn
            .execute(
                "INSERT INTO policy (id, body, generation) VALUES (1, ?1, 1) \
                 ON CONFLICT (id) DO UPDATE SET body = ?1, generation = generation + 1",
                params![body],
            )
            .map_err(StoreError::from)?;
        Ok(next)
    }

    fn get_thresholds(
        &self,
        meeting_type: MeetingType,
        mode: AssignMode,
    ) -> Result<Option<ModeThreshold>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT urgent_threshold_days, general_threshold_days, priority_value \
                 FROM mode_thresholds WHERE meeting_type = ?1 AND mode = ?2",
                params![meeting_type.as_str(), mode.as_str()],
                |row| {
                    Ok(ModeThreshold {
                        meeting_type,
                        mode,
                        urgent_threshold_days: row.get(0)?,
                        general_threshold_days: row.get(1)?,
                        priority_value: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn put_thresholds(&self, row: ModeThreshold) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO mode_thresholds \
             (meeting_type, mode, urgent_threshold_days, general_threshold_days, priority_value) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.meeting_type.as_str(),
                row.mode.as_str(),
                row.urgent_threshold_days,
                row.general_threshold_days,
                row.priority_value,
            ],
        )?;
        self.bump_generation()?;
        Ok(())
    }

    fn policy_generation(&self) -> Result<u64, StoreError> {
        let generation: Option<i64> = self
            .conn
            .query_row("SELECT generation FROM policy WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(generation.unwrap_or(0) as u64)
    }
}

impl PoolStore for SqliteStore {
    fn pool_add(&self, entry: PoolEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO pool_entries \
             (booking_id, meeting_type, time_start, time_end, mode, threshold_days, \
              deadline_time, pool_entry_time, processing_priority, batch_id, attempts, state, \
              leased_at, failed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                entry.booking_id,
                entry.meeting_type.as_str(),
                fmt_dt(entry.time_start),
                fmt_dt(entry.time_end),
                entry.mode.as_str(),
                entry.threshold_days,
                fmt_dt(entry.deadline_time),
                fmt_dt(entry.pool_entry_time),
                entry.processing_priority as i64,
                entry.batch_id,
                entry.attempts as i64,
                entry.state.as_str(),
                entry.leased_at.map(fmt_dt),
                entry.failed_at.map(fmt_dt),
            ],
        )?;
        Ok(())
    }

    fn pool_get(&self, booking_id: i64) -> Result<Option<PoolEntry>, StoreError> {
        let entry = self
            .conn
            .query_row(
                &format!("{SELECT_POOL_ENTRY} WHERE booking_id = ?1"),
                params![booking_id],
                row_to_pool_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn pool_list(&self) -> Result<Vec<PoolEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_POOL_ENTRY} ORDER BY deadline_time, booking_id"))?;
        let rows = stmt.query_map([], row_to_pool_entry)?;
        let mut entries = Vec::new();
        for r in rows {
            entries.push(r?);
        }
        Ok(entries)
    }

    fn pool_update(&self, entry: &PoolEntry) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE pool_entries SET state = ?2, attempts = ?3, batch_id = ?4, \
             leased_at = ?5, failed_at = ?6 WHERE booking_id = ?1",
            params![
                entry.booking_id,
                entry.state.as_str(),
                entry.attempts as i64,
                entry.batch_id,
                entry.leased_at.map(fmt_dt),
                entry.failed_at.map(fmt_dt),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "pool entry",
                id: entry.booking_id.to_string(),
            });
        }
        Ok(())
    }

    fn pool_lease(
        &self,
        booking_id: i64,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<bool, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result = (|| -> Result<bool, rusqlite::Error> {
            let entry = self
                .conn
                .query_row(
                    &format!("{SELECT_POOL_ENTRY} WHERE booking_id = ?1"),
                    params![booking_id],
                    row_to_pool_entry,
                )
                .optional()?;
            let Some(entry) = entry else { return Ok(false) };

            let leasable = match entry.state {
                PoolState::Pending | PoolState::Ready => true,
                PoolState::Processing => entry.lease_expired(now, lease_timeout),
                PoolState::Failed => false,
            };
            if leasable {
                self.conn.execute(
                    "UPDATE pool_entries SET state = 'processing', leased_at = ?2 \
                     WHERE booking_id = ?1",
                    params![booking_id, fmt_dt(now)],
                )?;
            }
            Ok(leasable)
        })();

        match result {
            Ok(leased) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(leased)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e.into())
            }
        }
    }

    fn pool_remove(&self, booking_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM pool_entries WHERE booking_id = ?1", params![booking_id])?;
        Ok(())
    }
}

impl RosterStore for SqliteStore {
    fn roster_snapshot(&self) -> Result<Option<RosterSnapshot>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM roster_snapshot WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body).ok()),
            None => Ok(None),
        }
    }

    fn save_roster_snapshot(&self, snapshot: &RosterSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO roster_snapshot (id, body) VALUES (1, ?1) \
             ON CONFLICT (id) DO UPDATE SET body = ?1",
            params![body],
        )?;
        Ok(())
    }
}

impl LogSink for SqliteStore {
    fn append(&self, entry: &AssignmentLogEntry) -> Result<(), StoreError> {
        let body = serde_json::to_string(entry)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO assignment_log (booking_id, outcome, body, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.booking_id, entry.outcome.as_str(), body, fmt_dt(entry.timestamp)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn booking(id: i64, interpreter: Option<&str>, status: BookingStatus, start: DateTime<Utc>) -> Booking {
        Booking {
            id,
            meeting_type: MeetingType::General,
            dr_type: None,
            time_start: start,
            time_end: start + Duration::hours(2),
            room: "R-1".to_string(),
            owner_id: "EMP-0001".to_string(),
            created_at: start - Duration::days(3),
            status,
            assigned_interpreter: interpreter.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_booking_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let b = booking(1, Some("A"), BookingStatus::Approve, now());
        store.put_booking(&b).unwrap();
        assert_eq!(store.get_booking(1).unwrap().unwrap(), b);
        assert!(store.get_booking(2).unwrap().is_none());
    }

    #[test]
    fn test_overlap_query_half_open() {
        let store = SqliteStore::open_memory().unwrap();
        store.put_booking(&booking(1, Some("A"), BookingStatus::Approve, now())).unwrap();

        // Touching at the end: no overlap.
        let free = store
            .list_overlapping("A", now() + Duration::hours(2), now() + Duration::hours(3), &[BookingStatus::Approve])
            .unwrap();
        assert!(free.is_empty());

        let hit = store
            .list_overlapping("A", now() + Duration::hours(1), now() + Duration::hours(3), &[BookingStatus::Approve])
            .unwrap();
        assert_eq!(hit.len(), 1);
    }

    #[test]
    fn test_commit_assignment_conflict_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        store.put_booking(&booking(1, None, BookingStatus::Waiting, now())).unwrap();
        store.put_booking(&booking(2, None, BookingStatus::Waiting, now() + Duration::hours(1))).unwrap();

        assert_eq!(store.commit_assignment(1, "A").unwrap(), CommitOutcome::Committed);
        assert_eq!(store.get_booking(1).unwrap().unwrap().status, BookingStatus::Approve);
        assert_eq!(store.commit_assignment(2, "A").unwrap(), CommitOutcome::Rejected);
        assert_eq!(store.commit_assignment(2, "B").unwrap(), CommitOutcome::Committed);
    }

    #[test]
    fn test_pool_roundtrip_and_lease() {
        let store = SqliteStore::open_memory().unwrap();
        let b = booking(7, None, BookingStatus::Waiting, now() + Duration::days(20));
        let entry = PoolEntry::new(&b, AssignMode::Balance, 15, now());
        store.pool_add(entry.clone()).unwrap();
        // Idempotent add keeps the original row.
        store.pool_add(entry.clone()).unwrap();

        let stored = store.pool_get(7).unwrap().unwrap();
        assert_eq!(stored, entry);

        assert!(store.pool_lease(7, now(), Duration::seconds(60)).unwrap());
        assert!(!store.pool_lease(7, now(), Duration::seconds(60)).unwrap());
        assert_eq!(store.pool_get(7).unwrap().unwrap().state, PoolState::Processing);

        store.pool_remove(7).unwrap();
        assert!(store.pool_get(7).unwrap().is_none());
    }

    #[test]
    fn test_policy_roundtrip_and_generation() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.policy_generation().unwrap(), 0);

        let next = store
            .write_policy(&PolicyPatch { max_gap_hours: Some(5.0), ..Default::default() })
            .unwrap();
        assert_eq!(next.max_gap_hours, 5.0);
        assert_eq!(store.get_policy().unwrap(), next);
        assert!(store.policy_generation().unwrap() >= 1);
    }

    #[test]
    fn test_last_dr_ordering() {
        let store = SqliteStore::open_memory().unwrap();
        let mut b1 = booking(1, Some("A"), BookingStatus::Approve, now() - Duration::days(5));
        b1.meeting_type = MeetingType::Dr;
        b1.dr_type = Some("DR-I".to_string());
        let mut b2 = booking(2, Some("B"), BookingStatus::Approve, now() - Duration::days(1));
        b2.meeting_type = MeetingType::Dr;
        b2.dr_type = Some("DR-II".to_string());
        store.put_booking(&b1).unwrap();
        store.put_booking(&b2).unwrap();

        let last = store.last_dr(now(), &DrFilter::default()).unwrap().unwrap();
        assert_eq!(last.id, 2);

        let filtered = store
            .last_dr(now(), &DrFilter { dr_type: Some("DR-I".to_string()), include_pending: false })
            .unwrap()
            .unwrap();
        assert_eq!(filtered.id, 1);
    }

    #[test]
    fn test_days_since_last() {
        let store = SqliteStore::open_memory().unwrap();
        store.put_booking(&booking(1, Some("A"), BookingStatus::Approve, now() - Duration::days(4))).unwrap();
        assert_eq!(store.days_since_last("A", now()).unwrap(), Some(4));
        assert_eq!(store.days_since_last("B", now()).unwrap(), None);
    }

    #[test]
    fn test_log_append_and_read_back() {
        let store = SqliteStore::open_memory().unwrap();
        let entry = AssignmentLogEntry::new(
            3,
            crate::audit::AuditOutcome::Assigned,
            "fingerprint".to_string(),
            "corr".to_string(),
            now(),
        );
        store.append(&entry).unwrap();
        let log = store.recent_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].booking_id, 3);
    }
}
