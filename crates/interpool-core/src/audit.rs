//! Append-only audit log for assignment decisions.
//!
//! Every decision writes one entry carrying the hours snapshots before and
//! after, the full candidate breakdown, and a fingerprint of the policy
//! that made the call. The log is best-effort: a sink failure is reported
//! on stderr and never fails the decision itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fairness::HoursMap;
use crate::scoring::CandidateBreakdown;
use crate::store::LogSink;

/// Kind of decision an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Assigned,
    Escalated,
    Pooled,
    BatchSummary,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Assigned => "assigned",
            AuditOutcome::Escalated => "escalated",
            AuditOutcome::Pooled => "pooled",
            AuditOutcome::BatchSummary => "batch_summary",
        }
    }
}

/// One appended decision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentLogEntry {
    pub booking_id: i64,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub pre_hours_snapshot: HoursMap,
    pub post_hours_snapshot: HoursMap,
    pub score_breakdown: Vec<CandidateBreakdown>,
    pub policy_fingerprint: String,
    /// Correlates the entries of one run (or one batch).
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AssignmentLogEntry {
    pub fn new(
        booking_id: i64,
        outcome: AuditOutcome,
        policy_fingerprint: String,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            outcome,
            interpreter_id: None,
            reason: None,
            pre_hours_snapshot: HoursMap::new(),
            post_hours_snapshot: HoursMap::new(),
            score_breakdown: Vec::new(),
            policy_fingerprint,
            correlation_id,
            timestamp,
        }
    }
}

/// Fresh correlation id for one orchestrator run.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Append an entry, swallowing sink failures onto stderr.
pub fn append_best_effort<L: LogSink + ?Sized>(sink: &L, entry: &AssignmentLogEntry) {
    if let Err(e) = sink.append(entry) {
        eprintln!(
            "warning: audit append failed for booking {} ({}): {e}",
            entry.booking_id,
            entry.outcome.as_str()
        );
    }
}
