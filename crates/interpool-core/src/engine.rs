//! Run orchestrator: the engine's top-level entry points.
//!
//! `assign` decides one booking: reject, pool, or score-and-commit.
//! `tick` advances the pool: reclaims stale leases, promotes due entries,
//! and processes everything ready (through the batch optimiser in Balance
//! mode). Scoring is pure and in-memory; store calls are the only points
//! where a run can stall or fail.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{append_best_effort, new_correlation_id, AssignmentLogEntry, AuditOutcome};
use crate::batch::{self, BatchAssignmentResult, ProvisionalPick};
use crate::booking::{Booking, BookingStatus, Interpreter, MeetingType};
use crate::conflict;
use crate::error::{EngineError, StoreError};
use crate::fairness::{hours_in_window, HoursMap};
use crate::history::{dr_state_for, last_global_dr};
use crate::policy::{
    thresholds::ResolvedThresholds, AssignMode, AssignmentPolicy, ThresholdResolver,
};
use crate::pool::{self, PoolEntry, PoolState, PoolStats};
use crate::roster::{diff_roster, RosterChange, RosterSnapshot};
use crate::scoring::{rank, CandidateBreakdown, CandidateSnapshot, RankOutcome, ScoringInputs};
use crate::store::{Clock, CommitOutcome, EngineStore};

/// Machine-readable escalation reasons.
pub mod reasons {
    pub const DISABLED: &str = "disabled";
    pub const BOOKING_NOT_FOUND: &str = "booking_not_found";
    pub const BOOKING_CANCELLED: &str = "booking_cancelled";
    pub const BOOKING_COMPLETED: &str = "booking_completed";
    pub const NO_ELIGIBLE_INTERPRETER: &str = "no eligible interpreter";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const CONFLICT_AFTER_RETRIES: &str = "conflict_after_retries";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELLED: &str = "run_cancelled";
    pub const INVALID_TIME_RANGE: &str = "invalid_time_range";
}

/// Number of commit retries after a conflict-at-commit before escalating.
const COMMIT_RETRIES: u32 = 2;

/// Bounded retry attempts for transient store failures.
const STORE_RETRIES: u32 = 3;

/// Discriminated decision returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Assigned {
        interpreter_id: String,
        /// Absent when an existing assignment was returned idempotently.
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        breakdown: Vec<CandidateBreakdown>,
    },
    Escalated {
        reason: String,
        breakdown: Vec<CandidateBreakdown>,
    },
    Pooled {
        /// The decision moment: threshold readiness, never later than start.
        deadline: DateTime<Utc>,
    },
}

impl Outcome {
    pub fn escalated(reason: &str) -> Self {
        Outcome::Escalated { reason: reason.to_string(), breakdown: Vec::new() }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, Outcome::Escalated { .. })
    }
}

/// Runtime knobs, typically derived from [`crate::config::EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Count waiting bookings as hard conflicts.
    pub include_waiting_conflicts: bool,
    /// Standard batch capacity in Balance mode.
    pub batch_size: usize,
    /// Lease expiry for the pool watchdog.
    pub lease_timeout: Duration,
    /// Threshold-cache TTL.
    pub policy_cache: Duration,
    /// Wall-clock budget for one whole `assign` call (store round-trips
    /// carry their own timeouts); expiry escalates with reason "timeout".
    pub assign_timeout: Duration,
    /// Base backoff for transient store retries; zero disables sleeping.
    pub retry_backoff_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            include_waiting_conflicts: false,
            batch_size: 10,
            lease_timeout: Duration::seconds(60),
            policy_cache: Duration::seconds(300),
            assign_timeout: Duration::seconds(30),
            retry_backoff_ms: 50,
        }
    }
}

/// What one orchestrator tick did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub reclaimed_leases: usize,
    pub retried_failed: usize,
    pub promoted_ready: usize,
    pub processed: Vec<(i64, Outcome)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchAssignmentResult>,
}

/// The auto-assignment engine.
pub struct Engine<S: EngineStore, C: Clock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) resolver: ThresholdResolver,
    pub(crate) options: EngineOptions,
}

impl<S: EngineStore, C: Clock> Engine<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_options(store, clock, EngineOptions::default())
    }

    pub fn with_options(store: S, clock: C, options: EngineOptions) -> Self {
        Self {
            store,
            clock,
            resolver: ThresholdResolver::with_ttl(options.policy_cache),
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Top-level entry ──────────────────────────────────────────────

    /// Decide one booking: idempotent return, rejection, pooling, or
    /// immediate scoring. Never propagates store failures to the caller;
    /// they become escalated outcomes and the pool entry (if any) returns
    /// to `pending`.
    pub fn assign(&self, booking_id: i64) -> Result<Outcome, EngineError> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.assign_cancellable(booking_id, &NEVER)
    }

    /// `assign` with a cancel signal. Cancellation aborts the run before
    /// the commit step; once committed, the decision stands.
    pub fn assign_cancellable(&self, booking_id: i64, cancel: &AtomicBool) -> Result<Outcome, EngineError> {
        let now = self.clock.now();
        let deadline = self.call_deadline();
        let correlation_id = new_correlation_id();

        let booking = match self.with_retry(|| self.store.get_booking(booking_id)) {
            Ok(b) => b,
            Err(e) => return Ok(self.escalate_store_failure(booking_id, &e, None)),
        };
        let Some(booking) = booking else {
            return Ok(Outcome::escalated(reasons::BOOKING_NOT_FOUND));
        };

        match booking.status {
            BookingStatus::Cancel => return Ok(Outcome::escalated(reasons::BOOKING_CANCELLED)),
            BookingStatus::Complete => return Ok(Outcome::escalated(reasons::BOOKING_COMPLETED)),
            BookingStatus::Approve => {
                // Idempotence: the existing assignment stands, no writes.
                if let Some(interpreter_id) = booking.assigned_interpreter.clone() {
                    return Ok(Outcome::Assigned {
                        interpreter_id,
                        score: None,
                        breakdown: Vec::new(),
                    });
                }
                return Ok(Outcome::escalated(reasons::BOOKING_CANCELLED));
            }
            BookingStatus::Waiting => {}
        }
        if !booking.is_valid_interval() {
            return Ok(Outcome::escalated(reasons::INVALID_TIME_RANGE));
        }

        let policy = match self.with_retry(|| self.store.get_policy()) {
            Ok(p) => p,
            Err(e) => return Ok(self.escalate_store_failure(booking_id, &e, None)),
        };
        if !policy.auto_assign_enabled {
            let outcome = Outcome::escalated(reasons::DISABLED);
            self.audit_decision(&booking, &outcome, &policy, &HoursMap::new(), &correlation_id, now);
            return Ok(outcome);
        }

        let thresholds =
            self.resolver.resolve(&self.store, now, booking.meeting_type, policy.mode);
        let days_until_start = days_between(now, booking.time_start);
        let threshold_days = pool::threshold_days(
            policy.mode,
            thresholds.general_threshold_days,
            policy.min_advance_days,
        );

        let immediate = policy.mode == AssignMode::Urgent
            || days_until_start <= threshold_days as f64
            || booking.time_start - now <= Duration::hours(pool::DEADLINE_OVERRIDE_HOURS);

        if !immediate {
            let entry = PoolEntry::new(&booking, policy.mode, threshold_days, now);
            let deadline = entry.ready_at();
            if let Err(e) = self.with_retry(|| self.store.pool_add(entry.clone())) {
                return Ok(self.escalate_store_failure(booking_id, &e, None));
            }
            let outcome = Outcome::Pooled { deadline };
            self.audit_decision(&booking, &outcome, &policy, &HoursMap::new(), &correlation_id, now);
            return Ok(outcome);
        }

        // An already-pooled booking must be leased before processing; if
        // another worker holds it, the decision is theirs.
        let existing_entry = self.store.pool_get(booking_id).unwrap_or(None);
        if let Some(ref entry) = existing_entry {
            if !self
                .store
                .pool_lease(booking_id, now, self.options.lease_timeout)
                .unwrap_or(false)
            {
                return Ok(Outcome::Pooled { deadline: entry.ready_at() });
            }
        }
        let outcome = self.decide_now(
            &booking,
            &policy,
            &thresholds,
            now,
            &correlation_id,
            cancel,
            deadline,
            &[],
            None,
        );
        self.finish_entry(existing_entry, &outcome, now);
        Ok(outcome)
    }

    /// One orchestrator pass over the pool.
    pub fn tick(&self) -> Result<TickReport, EngineError> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let mut entries = self.with_retry(|| self.store.pool_list()).map_err(EngineError::from)?;

        // Watchdog: reclaim stale leases, wake up retryable failures,
        // promote everything due.
        for entry in entries.iter_mut() {
            if entry.lease_expired(now, self.options.lease_timeout) {
                entry.release_to_pending();
                self.store.pool_update(entry)?;
                report.reclaimed_leases += 1;
            }
            if entry.retry_due(now) {
                entry.state = PoolState::Ready;
                entry.failed_at = None;
                self.store.pool_update(entry)?;
                report.retried_failed += 1;
            }
            if entry.state == PoolState::Pending
                && (entry.is_ready(now) || entry.deadline_override(now))
            {
                entry.state = PoolState::Ready;
                self.store.pool_update(entry)?;
                report.promoted_ready += 1;
            }
        }

        let mut ready: Vec<PoolEntry> =
            entries.into_iter().filter(|e| e.state == PoolState::Ready).collect();
        // Oldest-deadline-first keeps the drain fair when the ready set
        // exceeds a batch.
        ready.sort_by_key(|e| (e.deadline_time, e.processing_priority, e.booking_id));

        if ready.is_empty() {
            return Ok(report);
        }

        let policy = self.with_retry(|| self.store.get_policy()).map_err(EngineError::from)?;
        if policy.mode == AssignMode::Balance {
            let capacity = batch::batch_capacity(&ready, now, self.options.batch_size);
            ready.truncate(capacity);
            let result = batch::run(self, ready, &policy, now)?;
            report.processed = result.outcomes.clone();
            report.batch = Some(result);
        } else {
            for entry in ready {
                if !self.store.pool_lease(entry.booking_id, now, self.options.lease_timeout)? {
                    continue;
                }
                let outcome = self.process_leased(&entry, &policy, now)?;
                report.processed.push((entry.booking_id, outcome));
            }
        }
        Ok(report)
    }

    /// Tick until the pool has nothing left to process.
    pub fn drain(&self) -> Result<Vec<(i64, Outcome)>, EngineError> {
        let mut all = Vec::new();
        loop {
            let report = self.tick()?;
            if report.processed.is_empty() && report.promoted_ready == 0 {
                return Ok(all);
            }
            all.extend(report.processed);
        }
    }

    /// Current pool counters.
    pub fn pool_stats(&self) -> Result<PoolStats, EngineError> {
        let entries = self.store.pool_list()?;
        Ok(PoolStats::from_entries(&entries))
    }

    /// Re-snapshot the roster and report the diff (dynamic-pool adjuster).
    pub fn sync_roster(&self) -> Result<RosterChange, EngineError> {
        let now = self.clock.now();
        let roster = self.with_retry(|| self.store.list_active_interpreters())?;
        let policy = self.store.get_policy()?;
        let hours = hours_in_window(&self.store, &roster, now, policy.fairness_window_days)?;
        let prior = self.store.roster_snapshot()?;
        let change = diff_roster(prior.as_ref(), &roster, &hours);
        self.store.save_roster_snapshot(&RosterSnapshot::capture(&roster, now))?;
        Ok(change)
    }

    // ── Leased-entry processing ──────────────────────────────────────

    pub(crate) fn process_leased(
        &self,
        entry: &PoolEntry,
        policy: &AssignmentPolicy,
        now: DateTime<Utc>,
    ) -> Result<Outcome, EngineError> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        let correlation_id = new_correlation_id();

        let booking = match self.with_retry(|| self.store.get_booking(entry.booking_id)) {
            Ok(Some(b)) => b,
            Ok(None) => {
                self.store.pool_remove(entry.booking_id)?;
                return Ok(Outcome::escalated(reasons::BOOKING_NOT_FOUND));
            }
            Err(e) => {
                let outcome = self.escalate_store_failure(entry.booking_id, &e, Some(entry));
                return Ok(outcome);
            }
        };
        if booking.status != BookingStatus::Waiting {
            self.store.pool_remove(entry.booking_id)?;
            return Ok(match (&booking.status, booking.assigned_interpreter.clone()) {
                (BookingStatus::Approve, Some(id)) => {
                    Outcome::Assigned { interpreter_id: id, score: None, breakdown: Vec::new() }
                }
                _ => Outcome::escalated(reasons::BOOKING_CANCELLED),
            });
        }

        let thresholds =
            self.resolver.resolve(&self.store, now, booking.meeting_type, policy.mode);
        let outcome = self.decide_now(
            &booking,
            policy,
            &thresholds,
            now,
            &correlation_id,
            &NEVER,
            self.call_deadline(),
            &[],
            None,
        );
        self.finish_entry(Some(entry.clone()), &outcome, now);
        Ok(outcome)
    }

    // ── Scoring and committing ───────────────────────────────────────

    /// Score and commit a booking right now. On a commit conflict the
    /// scorer re-runs against the updated store state, up to
    /// [`COMMIT_RETRIES`] retries. The whole call is bounded by `deadline`;
    /// expiry escalates as a timeout.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decide_now(
        &self,
        booking: &Booking,
        policy: &AssignmentPolicy,
        thresholds: &ResolvedThresholds,
        now: DateTime<Utc>,
        correlation_id: &str,
        cancel: &AtomicBool,
        deadline: std::time::Instant,
        provisional: &[ProvisionalPick],
        hours_override: Option<&HoursMap>,
    ) -> Outcome {
        let mut attempt = 0;
        loop {
            if std::time::Instant::now() >= deadline {
                let outcome = Outcome::escalated(reasons::TIMEOUT);
                self.audit_decision(booking, &outcome, policy, &HoursMap::new(), correlation_id, now);
                return outcome;
            }

            let scored = match self.score_booking(booking, policy, thresholds, now, provisional, hours_override) {
                Ok(s) => s,
                Err(e) => return self.escalate_store_failure(booking.id, &e, None),
            };

            let Some(best) = scored.outcome.best().cloned() else {
                let outcome = Outcome::Escalated {
                    reason: reasons::NO_ELIGIBLE_INTERPRETER.to_string(),
                    breakdown: scored.outcome.breakdown.clone(),
                };
                self.audit_decision(booking, &outcome, policy, &scored.hours, correlation_id, now);
                return outcome;
            };

            if cancel.load(Ordering::Relaxed) {
                return Outcome::escalated(reasons::CANCELLED);
            }

            match self.with_retry(|| self.store.commit_assignment(booking.id, &best.id)) {
                Ok(CommitOutcome::Committed) => {
                    let mut post = scored.hours.clone();
                    if let Some(h) = post.get_mut(&best.id) {
                        *h += booking.duration_hours();
                    }
                    let outcome = Outcome::Assigned {
                        interpreter_id: best.id.clone(),
                        score: Some(best.score),
                        breakdown: scored.outcome.breakdown.clone(),
                    };
                    let mut entry = AssignmentLogEntry::new(
                        booking.id,
                        AuditOutcome::Assigned,
                        policy.fingerprint(),
                        correlation_id.to_string(),
                        now,
                    );
                    entry.interpreter_id = Some(best.id.clone());
                    entry.pre_hours_snapshot = scored.hours;
                    entry.post_hours_snapshot = post;
                    entry.score_breakdown = scored.outcome.breakdown;
                    append_best_effort(&self.store, &entry);
                    return outcome;
                }
                Ok(CommitOutcome::Rejected) => {
                    if attempt >= COMMIT_RETRIES {
                        let outcome = Outcome::Escalated {
                            reason: reasons::CONFLICT_AFTER_RETRIES.to_string(),
                            breakdown: scored.outcome.breakdown.clone(),
                        };
                        self.audit_decision(booking, &outcome, policy, &scored.hours, correlation_id, now);
                        return outcome;
                    }
                    attempt += 1;
                }
                Err(e) => return self.escalate_store_failure(booking.id, &e, None),
            }
        }
    }

    pub(crate) fn score_booking(
        &self,
        booking: &Booking,
        policy: &AssignmentPolicy,
        thresholds: &ResolvedThresholds,
        now: DateTime<Utc>,
        provisional: &[ProvisionalPick],
        hours_override: Option<&HoursMap>,
    ) -> Result<ScoredBooking, StoreError> {
        let roster = self.with_retry(|| self.store.list_active_interpreters())?;
        let hours = match hours_override {
            Some(h) => h.clone(),
            None => hours_in_window(&self.store, &roster, now, policy.fairness_window_days)?,
        };

        // Dynamic-pool adjustment runs before every scoring pass.
        let prior = self.store.roster_snapshot()?;
        let change = diff_roster(prior.as_ref(), &roster, &hours);
        self.store.save_roster_snapshot(&RosterSnapshot::capture(&roster, now))?;

        let dr_last = self.dr_last_interpreter(booking, policy, &roster)?;

        let mut candidates = Vec::with_capacity(roster.len());
        for interpreter in &roster {
            let mut conflicts = conflict::conflicts(
                &self.store,
                &interpreter.id,
                booking.time_start,
                booking.time_end,
                self.options.include_waiting_conflicts,
            )?;
            for pick in provisional {
                if pick.interpreter_id == interpreter.id
                    && pick.time_start < booking.time_end
                    && pick.time_end > booking.time_start
                {
                    conflicts.push(pick.as_conflict());
                }
            }
            let days_since_last = self.store.days_since_last(&interpreter.id, now)?;
            let dr = dr_state_for(
                &interpreter.id,
                dr_last.as_deref(),
                policy,
                change.newcomer_grace(&interpreter.id),
            );
            candidates.push(CandidateSnapshot {
                id: interpreter.id.clone(),
                hours: hours.get(&interpreter.id).copied().unwrap_or(0.0),
                days_since_last,
                conflicts,
                dr,
                adjustment_factor: change.fairness_factor(&interpreter.id),
            });
        }

        let inputs = ScoringInputs {
            hours: &hours,
            duration_hours: booking.duration_hours(),
            days_until_start: days_between(now, booking.time_start),
            is_dr: booking.meeting_type == MeetingType::Dr,
            thresholds: *thresholds,
            weights: policy.effective_weights(),
            max_gap_hours: policy.max_gap_hours,
            fairness_window_days: policy.fairness_window_days,
        };
        let outcome = rank(&candidates, &inputs);
        Ok(ScoredBooking { outcome, hours })
    }

    fn dr_last_interpreter(
        &self,
        booking: &Booking,
        policy: &AssignmentPolicy,
        roster: &[Interpreter],
    ) -> Result<Option<String>, StoreError> {
        if booking.meeting_type != MeetingType::Dr {
            return Ok(None);
        }
        let last = last_global_dr(&self.store, policy, booking)?;
        // A departed interpreter imposes no consecutive constraint.
        Ok(last
            .and_then(|b| b.assigned_interpreter)
            .filter(|id| roster.iter().any(|i| i.id == *id)))
    }

    // ── Failure plumbing ─────────────────────────────────────────────

    /// Wall-clock deadline for one `assign`-sized unit of work.
    pub(crate) fn call_deadline(&self) -> std::time::Instant {
        let budget = self
            .options
            .assign_timeout
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        std::time::Instant::now() + budget
    }

    fn escalate_store_failure(
        &self,
        booking_id: i64,
        err: &StoreError,
        entry: Option<&PoolEntry>,
    ) -> Outcome {
        let reason = match err {
            StoreError::Timeout => reasons::TIMEOUT,
            _ => reasons::STORE_UNAVAILABLE,
        };
        eprintln!("booking {booking_id}: run aborted, {err}");
        if let Some(entry) = entry {
            let mut released = entry.clone();
            released.release_to_pending();
            if let Err(update_err) = self.store.pool_update(&released) {
                eprintln!("booking {booking_id}: pool release failed, {update_err}");
            }
        }
        Outcome::escalated(reason)
    }

    /// Terminal bookkeeping for a pool entry once a decision came back.
    pub(crate) fn finish_entry(&self, entry: Option<PoolEntry>, outcome: &Outcome, now: DateTime<Utc>) {
        let Some(mut entry) = entry else { return };
        let result = match outcome {
            Outcome::Assigned { .. } => self.store.pool_remove(entry.booking_id),
            Outcome::Escalated { reason, .. } => {
                if reason == reasons::TIMEOUT {
                    // Timed out: straight back to pending for a later retry.
                    entry.release_to_pending();
                    self.store.pool_update(&entry)
                } else if reason == reasons::STORE_UNAVAILABLE {
                    // Transient: leave for retry unless attempts ran out.
                    if entry.record_failure(now) {
                        self.store.pool_update(&entry)
                    } else {
                        self.store.pool_remove(entry.booking_id)
                    }
                } else {
                    // Terminal escalation: manual handling owns it now.
                    self.store.pool_remove(entry.booking_id)
                }
            }
            Outcome::Pooled { .. } => Ok(()),
        };
        if let Err(e) = result {
            eprintln!("booking {}: pool bookkeeping failed, {e}", entry.booking_id);
        }
    }

    fn audit_decision(
        &self,
        booking: &Booking,
        outcome: &Outcome,
        policy: &AssignmentPolicy,
        hours: &HoursMap,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) {
        let (kind, interpreter_id, reason, breakdown) = match outcome {
            Outcome::Assigned { interpreter_id, breakdown, .. } => {
                (AuditOutcome::Assigned, Some(interpreter_id.clone()), None, breakdown.clone())
            }
            Outcome::Escalated { reason, breakdown } => {
                (AuditOutcome::Escalated, None, Some(reason.clone()), breakdown.clone())
            }
            Outcome::Pooled { .. } => (AuditOutcome::Pooled, None, None, Vec::new()),
        };
        let mut entry = AssignmentLogEntry::new(
            booking.id,
            kind,
            policy.fingerprint(),
            correlation_id.to_string(),
            now,
        );
        entry.interpreter_id = interpreter_id;
        entry.reason = reason;
        entry.pre_hours_snapshot = hours.clone();
        entry.post_hours_snapshot = hours.clone();
        entry.score_breakdown = breakdown;
        append_best_effort(&self.store, &entry);
    }

    pub(crate) fn with_retry<T>(
        &self,
        mut call: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < STORE_RETRIES => {
                    if self.options.retry_backoff_ms > 0 {
                        let delay = self.options.retry_backoff_ms << attempt;
                        std::thread::sleep(std::time::Duration::from_millis(delay));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Scoring result plus the hours snapshot it was computed against.
pub(crate) struct ScoredBooking {
    pub outcome: RankOutcome,
    pub hours: HoursMap,
}

/// Fractional days from `from` to `to` (negative when `to` is past).
pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}
