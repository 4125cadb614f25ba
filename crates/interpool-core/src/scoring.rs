//! Candidate scoring, ranking and the eligibility pipeline.
//!
//! The ranking procedure is a pure function of its inputs: no clock, no
//! randomness. Given identical hours, history and policy, it produces the
//! same order every time. Tie-breaking is handled by three vanishing
//! offsets plus a deterministic comparator.

use serde::{Deserialize, Serialize};

use crate::conflict::Conflict;
use crate::fairness::{adjusted_fairness_score, would_exceed_gap, HoursMap};
use crate::hash::unit_hash;
use crate::history::DrState;
use crate::policy::{thresholds::ResolvedThresholds, Weights};

/// Tie-break offset scales, applied in this order.
const TIE_DAYS_WEIGHT: f64 = 1e-4;
const TIE_HOURS_WEIGHT: f64 = 1e-5;
const TIE_HASH_WEIGHT: f64 = 1e-7;

/// Urgency of a booking given days until start.
///
/// Saturates at 1 at or below the urgent threshold, 0 at or beyond the
/// general threshold, linear in between. Per-booking: every candidate
/// receives the same value.
pub fn urgency_score(days_until_start: f64, urgent_threshold_days: i64, general_threshold_days: i64) -> f64 {
    let u = urgent_threshold_days as f64;
    let g = general_threshold_days as f64;
    if days_until_start <= u {
        return 1.0;
    }
    if days_until_start >= g || g <= u {
        return 0.0;
    }
    (g - days_until_start) / (g - u)
}

/// Least-recently-served score. Interpreters never assigned inside the
/// window score 1.
pub fn lrs_score(days_since_last: Option<i64>, fairness_window_days: i64) -> f64 {
    let window = fairness_window_days.max(1) as f64;
    match days_since_last {
        None => 1.0,
        Some(d) => (d.max(0) as f64).min(window) / window,
    }
}

/// Reason a candidate dropped out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibilityReason {
    TimeConflict,
    ConsecutiveDr,
    ExceedsMaxGap,
}

impl IneligibilityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibilityReason::TimeConflict => "time conflict",
            IneligibilityReason::ConsecutiveDr => "ConsecutiveDR",
            IneligibilityReason::ExceedsMaxGap => "would exceed max gap",
        }
    }
}

/// Everything the ranker knows about one candidate, gathered from the
/// stores before scoring starts.
#[derive(Debug, Clone)]
pub struct CandidateSnapshot {
    pub id: String,
    /// Approved hours inside the fairness window.
    pub hours: f64,
    /// Days since the last assignment; `None` when never assigned.
    pub days_since_last: Option<i64>,
    /// Overlapping bookings already held over the requested interval.
    pub conflicts: Vec<Conflict>,
    /// Consecutive-DR verdict (default for non-DR bookings).
    pub dr: DrState,
    /// Fairness multiplier from the dynamic-pool adjuster; 1.0 unless the
    /// candidate is a newcomer on a growing roster.
    pub adjustment_factor: f64,
}

/// Per-booking scoring inputs, identical across candidates.
#[derive(Debug, Clone)]
pub struct ScoringInputs<'a> {
    pub hours: &'a HoursMap,
    pub duration_hours: f64,
    pub days_until_start: f64,
    pub is_dr: bool,
    pub thresholds: ResolvedThresholds,
    pub weights: Weights,
    pub max_gap_hours: f64,
    pub fairness_window_days: i64,
}

/// A fully scored, eligible candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: String,
    pub score: f64,
    pub fairness: f64,
    pub urgency: f64,
    pub lrs: f64,
    pub dr_penalty: f64,
    pub tie_break: f64,
    pub hours: f64,
    pub days_since_last: Option<i64>,
    pub dr: DrState,
}

/// One line of the candidate breakdown attached to every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBreakdown {
    pub interpreter_id: String,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lrs: Option<f64>,
    pub dr_penalty: f64,
    pub penalty_applied: bool,
    pub override_applied: bool,
}

impl CandidateBreakdown {
    fn ineligible(id: &str, reason: IneligibilityReason) -> Self {
        Self {
            interpreter_id: id.to_string(),
            eligible: false,
            reason: Some(reason.as_str().to_string()),
            score: None,
            fairness: None,
            urgency: None,
            lrs: None,
            dr_penalty: 0.0,
            penalty_applied: false,
            override_applied: false,
        }
    }

    fn scored(c: &ScoredCandidate) -> Self {
        Self {
            interpreter_id: c.id.clone(),
            eligible: true,
            reason: None,
            score: Some(c.score),
            fairness: Some(c.fairness),
            urgency: Some(c.urgency),
            lrs: Some(c.lrs),
            dr_penalty: c.dr_penalty,
            penalty_applied: c.dr.penalty_applied,
            override_applied: c.dr.override_applied,
        }
    }
}

/// Result of ranking one booking's candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankOutcome {
    /// Eligible candidates, best first.
    pub ranked: Vec<ScoredCandidate>,
    /// Every enumerated candidate, eligible or not.
    pub breakdown: Vec<CandidateBreakdown>,
}

impl RankOutcome {
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.ranked.first()
    }
}

fn score_one(snapshot: &CandidateSnapshot, dr: DrState, inputs: &ScoringInputs) -> ScoredCandidate {
    let fairness = adjusted_fairness_score(
        inputs.hours,
        &snapshot.id,
        inputs.max_gap_hours,
        snapshot.adjustment_factor,
    );
    let urgency = urgency_score(
        inputs.days_until_start,
        inputs.thresholds.urgent_threshold_days,
        inputs.thresholds.general_threshold_days,
    );
    let lrs = lrs_score(snapshot.days_since_last, inputs.fairness_window_days);
    let dr_penalty = if inputs.is_dr && dr.penalty_applied { dr.penalty } else { 0.0 };

    // Vanishing offsets keep the order stable without ever outweighing a
    // real score difference. Never-assigned candidates take the window cap
    // as their recency, the same cap the LRS term uses.
    let tie_days = snapshot
        .days_since_last
        .unwrap_or(inputs.fairness_window_days)
        .min(inputs.fairness_window_days.max(1)) as f64;
    let tie_break = TIE_DAYS_WEIGHT * tie_days - TIE_HOURS_WEIGHT * snapshot.hours
        + TIE_HASH_WEIGHT * unit_hash(&snapshot.id);

    let w = inputs.weights;
    let score = w.w_fair * fairness + w.w_urgency * urgency + w.w_lrs * lrs + dr_penalty + tie_break;

    ScoredCandidate {
        id: snapshot.id.clone(),
        score,
        fairness,
        urgency,
        lrs,
        dr_penalty,
        tie_break,
        hours: snapshot.hours,
        days_since_last: snapshot.days_since_last,
        dr,
    }
}

fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            let da = a.days_since_last.unwrap_or(i64::MAX);
            let db = b.days_since_last.unwrap_or(i64::MAX);
            db.cmp(&da)
        })
        .then_with(|| a.hours.partial_cmp(&b.hours).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| a.id.cmp(&b.id))
}

/// Run the eligibility pipeline and rank the survivors.
///
/// Pipeline: availability, consecutive-DR blocks, workload-gap check,
/// weighted scoring. A DR block converts to a penalised assignment when no
/// alternative survives the other filters (critical coverage override).
pub fn rank(candidates: &[CandidateSnapshot], inputs: &ScoringInputs) -> RankOutcome {
    let mut breakdown = Vec::with_capacity(candidates.len());
    let mut unblocked: Vec<&CandidateSnapshot> = Vec::new();
    let mut blocked: Vec<&CandidateSnapshot> = Vec::new();

    for c in candidates {
        if !c.conflicts.is_empty() {
            breakdown.push(CandidateBreakdown::ineligible(&c.id, IneligibilityReason::TimeConflict));
        } else if inputs.is_dr && c.dr.blocked {
            blocked.push(c);
        } else {
            unblocked.push(c);
        }
    }

    let mut survivors: Vec<ScoredCandidate> = Vec::new();
    for &c in &unblocked {
        if would_exceed_gap(inputs.hours, &c.id, inputs.duration_hours, inputs.max_gap_hours) {
            breakdown.push(CandidateBreakdown::ineligible(&c.id, IneligibilityReason::ExceedsMaxGap));
        } else {
            survivors.push(score_one(c, c.dr, inputs));
        }
    }

    if survivors.is_empty() && !blocked.is_empty() {
        // Critical coverage: no eligible alternative, so blocked candidates
        // come back with the penalty applied instead.
        for &c in &blocked {
            if would_exceed_gap(inputs.hours, &c.id, inputs.duration_hours, inputs.max_gap_hours) {
                breakdown.push(CandidateBreakdown::ineligible(&c.id, IneligibilityReason::ExceedsMaxGap));
            } else {
                survivors.push(score_one(c, c.dr.with_override(), inputs));
            }
        }
    } else {
        for &c in &blocked {
            breakdown.push(CandidateBreakdown::ineligible(&c.id, IneligibilityReason::ConsecutiveDr));
        }
    }

    survivors.sort_by(rank_order);
    for s in &survivors {
        breakdown.push(CandidateBreakdown::scored(s));
    }
    breakdown.sort_by(|a, b| a.interpreter_id.cmp(&b.interpreter_id));

    RankOutcome { ranked: survivors, breakdown }
}
