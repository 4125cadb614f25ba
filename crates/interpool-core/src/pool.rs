//! Booking pool: entries awaiting their decision moment.
//!
//! Each pooled booking carries its own readiness threshold and hard deadline
//! (the booking's start). Entries move `pending -> ready -> processing` and
//! end in a terminal outcome or `failed`; failed entries re-enter `ready`
//! after a retry delay, up to [`MAX_ATTEMPTS`] tries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, MeetingType};
use crate::policy::AssignMode;

/// Maximum number of processing attempts before an entry is abandoned to
/// manual handling.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before a failed entry becomes ready again.
pub const RETRY_DELAY_SECONDS: i64 = 60;

/// A pooled booking is forced to a decision when its start is this close,
/// regardless of threshold.
pub const DEADLINE_OVERRIDE_HOURS: i64 = 24;

/// Lifecycle state of a pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Waiting for its readiness threshold.
    Pending,
    /// Due for a decision.
    Ready,
    /// Leased by a worker; single writer.
    Processing,
    /// Last attempt failed; eligible for retry after a delay.
    Failed,
}

impl PoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Pending => "pending",
            PoolState::Ready => "ready",
            PoolState::Processing => "processing",
            PoolState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> PoolState {
        match s {
            "ready" => PoolState::Ready,
            "processing" => PoolState::Processing,
            "failed" => PoolState::Failed,
            _ => PoolState::Pending,
        }
    }
}

/// Number of days before start at which a booking becomes ready, per mode.
///
/// URGENT bookings are never pooled; BALANCE holds at least three days so the
/// batch optimiser has company to balance against; NORMAL and CUSTOM follow
/// the resolved general threshold. `min_advance_days` raises the floor so
/// decisions land no later than the policy demands.
pub fn threshold_days(mode: AssignMode, general_threshold_days: i64, min_advance_days: i64) -> i64 {
    let base = match mode {
        AssignMode::Urgent => 0,
        AssignMode::Balance => general_threshold_days.max(3),
        AssignMode::Normal | AssignMode::Custom => general_threshold_days,
    };
    base.max(min_advance_days)
}

/// One booking awaiting its decision moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub booking_id: i64,
    pub meeting_type: MeetingType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub mode: AssignMode,
    pub threshold_days: i64,
    /// The booking must be decided by its own start.
    pub deadline_time: DateTime<Utc>,
    pub pool_entry_time: DateTime<Utc>,
    /// 1 = highest. Derived from the mode.
    pub processing_priority: u8,
    /// Batch this entry was drained into, if any.
    #[serde(default)]
    pub batch_id: Option<String>,
    pub attempts: u32,
    pub state: PoolState,
    /// When the current lease was taken (state = processing).
    #[serde(default)]
    pub leased_at: Option<DateTime<Utc>>,
    /// When the last attempt failed (state = failed).
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
}

impl PoolEntry {
    pub fn new(booking: &Booking, mode: AssignMode, threshold_days: i64, now: DateTime<Utc>) -> Self {
        Self {
            booking_id: booking.id,
            meeting_type: booking.meeting_type,
            time_start: booking.time_start,
            time_end: booking.time_end,
            mode,
            threshold_days,
            deadline_time: booking.time_start,
            pool_entry_time: now,
            processing_priority: mode.processing_priority(),
            batch_id: None,
            attempts: 0,
            state: PoolState::Pending,
            leased_at: None,
            failed_at: None,
        }
    }

    /// The instant this entry crosses its readiness threshold.
    pub fn ready_at(&self) -> DateTime<Utc> {
        self.time_start - Duration::days(self.threshold_days)
    }

    /// Threshold readiness: `time_start - threshold_days <= now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at() <= now
    }

    /// Deadline override: the start is imminent, decide now regardless of
    /// threshold.
    pub fn deadline_override(&self, now: DateTime<Utc>) -> bool {
        self.time_start - now <= Duration::hours(DEADLINE_OVERRIDE_HOURS)
    }

    /// Whether the hard deadline has passed.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline_time <= now
    }

    /// Whether a processing lease is stale and may be reclaimed.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        match (self.state, self.leased_at) {
            (PoolState::Processing, Some(at)) => now - at >= lease_timeout,
            (PoolState::Processing, None) => true,
            _ => false,
        }
    }

    /// Whether a failed entry has waited out its retry delay and still has
    /// attempts left.
    pub fn retry_due(&self, now: DateTime<Utc>) -> bool {
        if self.state != PoolState::Failed || self.attempts >= MAX_ATTEMPTS {
            return false;
        }
        match self.failed_at {
            Some(at) => now - at >= Duration::seconds(RETRY_DELAY_SECONDS),
            None => true,
        }
    }

    /// Record a failed attempt. Returns false when the entry is out of
    /// attempts and must be escalated instead.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.attempts += 1;
        self.leased_at = None;
        if self.attempts >= MAX_ATTEMPTS {
            return false;
        }
        self.state = PoolState::Failed;
        self.failed_at = Some(now);
        true
    }

    /// Return a leased or failed entry to `pending` (store-error path: the
    /// run aborted before any terminal decision).
    pub fn release_to_pending(&mut self) {
        self.state = PoolState::Pending;
        self.leased_at = None;
    }
}

/// Aggregate pool counters for the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pending: usize,
    pub ready: usize,
    pub processing: usize,
    pub failed: usize,
    pub total: usize,
    /// Earliest hard deadline among live entries.
    pub oldest_deadline: Option<DateTime<Utc>>,
    /// Sum of attempts across live entries.
    pub total_attempts: u32,
}

impl PoolStats {
    pub fn from_entries(entries: &[PoolEntry]) -> Self {
        let mut stats = PoolStats::default();
        for e in entries {
            match e.state {
                PoolState::Pending => stats.pending += 1,
                PoolState::Ready => stats.ready += 1,
                PoolState::Processing => stats.processing += 1,
                PoolState::Failed => stats.failed += 1,
            }
            stats.total += 1;
            stats.total_attempts += e.attempts;
            stats.oldest_deadline = match stats.oldest_deadline {
                Some(d) if d <= e.deadline_time => Some(d),
                _ => Some(e.deadline_time),
            };
        }
        stats
    }
}
