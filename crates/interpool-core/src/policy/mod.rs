//! Assignment policy: modes, weights and the consecutive-DR rules.
//!
//! A single process-wide policy row drives the engine. Modes other than
//! CUSTOM lock the scoring weights to fixed profiles; writes go through
//! [`AssignmentPolicy::apply_patch`], which sanitises numeric ranges and
//! refuses changes to locked parameters.

mod bundle;
pub mod thresholds;

pub use bundle::{check_compatibility, Compatibility, PolicyBundle, PolicyMetadata, POLICY_BUNDLE_VERSION};
pub use thresholds::{ModeThreshold, ThresholdResolver, ResolvedThresholds};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::hash::fnv1a64;

/// Top-level engine profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignMode {
    Balance,
    Urgent,
    Normal,
    Custom,
}

impl AssignMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignMode::Balance => "BALANCE",
            AssignMode::Urgent => "URGENT",
            AssignMode::Normal => "NORMAL",
            AssignMode::Custom => "CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<AssignMode> {
        match s {
            "BALANCE" => Some(AssignMode::Balance),
            "URGENT" => Some(AssignMode::Urgent),
            "NORMAL" => Some(AssignMode::Normal),
            "CUSTOM" => Some(AssignMode::Custom),
            _ => None,
        }
    }

    /// Pool processing priority for this mode (1 = highest).
    pub fn processing_priority(&self) -> u8 {
        match self {
            AssignMode::Urgent => 1,
            AssignMode::Balance => 2,
            AssignMode::Normal | AssignMode::Custom => 3,
        }
    }
}

/// Scoring weights. Each component weight lives in `[0, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Weight for the fairness score (workload gap)
    pub w_fair: f64,
    /// Weight for the urgency score (days until start)
    pub w_urgency: f64,
    /// Weight for the least-recently-served score
    pub w_lrs: f64,
}

impl Weights {
    /// Locked profile for BALANCE mode.
    pub fn balance() -> Self {
        Self { w_fair: 2.0, w_urgency: 0.5, w_lrs: 0.8 }
    }

    /// Locked profile for NORMAL mode.
    pub fn normal() -> Self {
        Self { w_fair: 1.2, w_urgency: 1.0, w_lrs: 0.6 }
    }

    /// Locked profile for URGENT mode.
    pub fn urgent() -> Self {
        Self { w_fair: 0.5, w_urgency: 2.0, w_lrs: 0.3 }
    }

    /// The locked profile for a mode, or `None` for CUSTOM.
    pub fn locked_for(mode: AssignMode) -> Option<Weights> {
        match mode {
            AssignMode::Balance => Some(Weights::balance()),
            AssignMode::Normal => Some(Weights::normal()),
            AssignMode::Urgent => Some(Weights::urgent()),
            AssignMode::Custom => None,
        }
    }

    fn sanitise(&mut self) {
        self.w_fair = self.w_fair.clamp(0.0, 5.0);
        self.w_urgency = self.w_urgency.clamp(0.0, 5.0);
        self.w_lrs = self.w_lrs.clamp(0.0, 5.0);
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::normal()
    }
}

/// Scope over which "the last DR booking" is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrScope {
    /// One global chain across all DR bookings.
    Global,
    /// Separate chains per `dr_type`.
    ByType,
}

/// Consecutive-DR policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrPolicy {
    pub scope: DrScope,
    /// Hard-block consecutive assignments (subject to the coverage override).
    pub forbid_consecutive: bool,
    /// Penalty applied instead of a block. When absent, the policy-level
    /// `dr_consecutive_penalty` is the effective value.
    #[serde(default)]
    pub consecutive_penalty: Option<f64>,
    /// Whether waiting bookings count when locating the last global DR.
    pub include_pending_in_global: bool,
}

impl Default for DrPolicy {
    fn default() -> Self {
        Self {
            scope: DrScope::Global,
            forbid_consecutive: true,
            consecutive_penalty: None,
            include_pending_in_global: false,
        }
    }
}

/// The process-wide assignment policy (single row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPolicy {
    pub mode: AssignMode,
    pub auto_assign_enabled: bool,
    /// Rolling look-back window for hour totals, in days (1–365).
    pub fairness_window_days: i64,
    /// Maximum allowed post-assignment workload spread, in hours.
    pub max_gap_hours: f64,
    /// Decisions happen no later than this many days before start.
    pub min_advance_days: i64,
    /// Scoring weights; only effective in CUSTOM mode.
    pub weights: Weights,
    /// Policy-level consecutive-DR penalty, in `[-2, 0]`.
    pub dr_consecutive_penalty: f64,
    pub dr_policy: DrPolicy,
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self {
            mode: AssignMode::Normal,
            auto_assign_enabled: true,
            fairness_window_days: 14,
            max_gap_hours: 10.0,
            min_advance_days: 0,
            weights: Weights::normal(),
            dr_consecutive_penalty: -0.5,
            dr_policy: DrPolicy::default(),
        }
    }
}

impl AssignmentPolicy {
    /// Effective scoring weights for the current mode.
    pub fn effective_weights(&self) -> Weights {
        Weights::locked_for(self.mode).unwrap_or(self.weights)
    }

    /// Effective consecutive-DR penalty: the `dr_policy` value when present,
    /// the policy-level one otherwise.
    pub fn effective_dr_penalty(&self) -> f64 {
        self.dr_policy
            .consecutive_penalty
            .unwrap_or(self.dr_consecutive_penalty)
    }

    /// Clamp all numeric fields to their valid ranges.
    pub fn sanitise(&mut self) {
        self.fairness_window_days = self.fairness_window_days.clamp(1, 365);
        self.max_gap_hours = self.max_gap_hours.max(0.0);
        self.min_advance_days = self.min_advance_days.max(0);
        self.weights.sanitise();
        self.dr_consecutive_penalty = self.dr_consecutive_penalty.clamp(-2.0, 0.0);
        if let Some(p) = self.dr_policy.consecutive_penalty.as_mut() {
            *p = p.clamp(-2.0, 0.0);
        }
    }

    /// Validate cross-field consistency.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(inner) = self.dr_policy.consecutive_penalty {
            if (inner - self.dr_consecutive_penalty).abs() > 1e-9 {
                return Err(PolicyError::InconsistentPenalty {
                    policy_level: self.dr_consecutive_penalty,
                    dr_policy: inner,
                });
            }
        }
        if !(1..=365).contains(&self.fairness_window_days) {
            return Err(PolicyError::OutOfRange {
                field: "fairness_window_days",
                message: format!("{} not in 1..=365", self.fairness_window_days),
            });
        }
        if self.max_gap_hours < 0.0 || !self.max_gap_hours.is_finite() {
            return Err(PolicyError::OutOfRange {
                field: "max_gap_hours",
                message: format!("{} must be a finite non-negative number", self.max_gap_hours),
            });
        }
        Ok(())
    }

    /// Apply an admin patch, producing the sanitised successor policy.
    ///
    /// Weight changes are refused outside CUSTOM mode. The mode change in the
    /// same patch takes effect first, so switching to CUSTOM and setting
    /// weights in one write is allowed.
    pub fn apply_patch(&self, patch: &PolicyPatch) -> Result<AssignmentPolicy, PolicyError> {
        let mut next = self.clone();

        if let Some(mode) = patch.mode {
            next.mode = mode;
        }
        if next.mode != AssignMode::Custom {
            if patch.w_fair.is_some() {
                return Err(PolicyError::LockedParameter { field: "w_fair", mode: next.mode });
            }
            if patch.w_urgency.is_some() {
                return Err(PolicyError::LockedParameter { field: "w_urgency", mode: next.mode });
            }
            if patch.w_lrs.is_some() {
                return Err(PolicyError::LockedParameter { field: "w_lrs", mode: next.mode });
            }
        }

        if let Some(v) = patch.auto_assign_enabled {
            next.auto_assign_enabled = v;
        }
        if let Some(v) = patch.fairness_window_days {
            next.fairness_window_days = v;
        }
        if let Some(v) = patch.max_gap_hours {
            next.max_gap_hours = v;
        }
        if let Some(v) = patch.min_advance_days {
            next.min_advance_days = v;
        }
        if let Some(v) = patch.w_fair {
            next.weights.w_fair = v;
        }
        if let Some(v) = patch.w_urgency {
            next.weights.w_urgency = v;
        }
        if let Some(v) = patch.w_lrs {
            next.weights.w_lrs = v;
        }
        if let Some(v) = patch.dr_consecutive_penalty {
            next.dr_consecutive_penalty = v;
        }
        if let Some(ref dr) = patch.dr_policy {
            next.dr_policy = dr.clone();
        }

        next.sanitise();
        next.validate()?;
        Ok(next)
    }

    /// Stable fingerprint of the policy, recorded on every audit entry so a
    /// decision can be traced back to the exact configuration that made it.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        format!("{:016x}", fnv1a64(canonical.as_bytes()))
    }
}

/// Partial policy update, as submitted by the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPatch {
    #[serde(default)]
    pub mode: Option<AssignMode>,
    #[serde(default)]
    pub auto_assign_enabled: Option<bool>,
    #[serde(default)]
    pub fairness_window_days: Option<i64>,
    #[serde(default)]
    pub max_gap_hours: Option<f64>,
    #[serde(default)]
    pub min_advance_days: Option<i64>,
    #[serde(default)]
    pub w_fair: Option<f64>,
    #[serde(default)]
    pub w_urgency: Option<f64>,
    #[serde(default)]
    pub w_lrs: Option<f64>,
    #[serde(default)]
    pub dr_consecutive_penalty: Option<f64>,
    #[serde(default)]
    pub dr_policy: Option<DrPolicy>,
}

impl PolicyPatch {
    /// Full-replacement patch from a complete policy (bundle import).
    /// Weights are only carried when the target mode is CUSTOM, where they
    /// are writable.
    pub fn replace(policy: &AssignmentPolicy) -> PolicyPatch {
        let custom = policy.mode == AssignMode::Custom;
        PolicyPatch {
            mode: Some(policy.mode),
            auto_assign_enabled: Some(policy.auto_assign_enabled),
            fairness_window_days: Some(policy.fairness_window_days),
            max_gap_hours: Some(policy.max_gap_hours),
            min_advance_days: Some(policy.min_advance_days),
            w_fair: custom.then_some(policy.weights.w_fair),
            w_urgency: custom.then_some(policy.weights.w_urgency),
            w_lrs: custom.then_some(policy.weights.w_lrs),
            dr_consecutive_penalty: Some(policy.dr_consecutive_penalty),
            dr_policy: Some(policy.dr_policy.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_weights_per_mode() {
        assert_eq!(Weights::locked_for(AssignMode::Balance), Some(Weights::balance()));
        assert_eq!(Weights::locked_for(AssignMode::Urgent), Some(Weights::urgent()));
        assert_eq!(Weights::locked_for(AssignMode::Normal), Some(Weights::normal()));
        assert_eq!(Weights::locked_for(AssignMode::Custom), None);
    }

    #[test]
    fn test_effective_weights_ignore_stored_outside_custom() {
        let mut policy = AssignmentPolicy::default();
        policy.mode = AssignMode::Balance;
        policy.weights = Weights { w_fair: 5.0, w_urgency: 5.0, w_lrs: 5.0 };
        assert_eq!(policy.effective_weights(), Weights::balance());

        policy.mode = AssignMode::Custom;
        assert_eq!(policy.effective_weights().w_fair, 5.0);
    }

    #[test]
    fn test_patch_refuses_locked_weight() {
        let policy = AssignmentPolicy::default();
        let patch = PolicyPatch { w_fair: Some(3.0), ..Default::default() };
        let err = policy.apply_patch(&patch).unwrap_err();
        assert!(matches!(err, PolicyError::LockedParameter { field: "w_fair", .. }));
    }

    #[test]
    fn test_patch_allows_weight_with_mode_switch() {
        let policy = AssignmentPolicy::default();
        let patch = PolicyPatch {
            mode: Some(AssignMode::Custom),
            w_fair: Some(3.0),
            ..Default::default()
        };
        let next = policy.apply_patch(&patch).unwrap();
        assert_eq!(next.mode, AssignMode::Custom);
        assert_eq!(next.weights.w_fair, 3.0);
    }

    #[test]
    fn test_patch_sanitises_ranges() {
        let policy = AssignmentPolicy::default();
        let patch = PolicyPatch {
            fairness_window_days: Some(4000),
            max_gap_hours: Some(-3.0),
            dr_consecutive_penalty: Some(-9.0),
            ..Default::default()
        };
        let next = policy.apply_patch(&patch).unwrap();
        assert_eq!(next.fairness_window_days, 365);
        assert_eq!(next.max_gap_hours, 0.0);
        assert_eq!(next.dr_consecutive_penalty, -2.0);
    }

    #[test]
    fn test_inconsistent_penalty_refused() {
        let mut policy = AssignmentPolicy::default();
        policy.dr_consecutive_penalty = -0.5;
        policy.dr_policy.consecutive_penalty = Some(-1.5);
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InconsistentPenalty { .. })
        ));
    }

    #[test]
    fn test_effective_dr_penalty_prefers_inner() {
        let mut policy = AssignmentPolicy::default();
        policy.dr_consecutive_penalty = -0.5;
        assert_eq!(policy.effective_dr_penalty(), -0.5);

        policy.dr_policy.consecutive_penalty = Some(-0.5);
        assert_eq!(policy.effective_dr_penalty(), -0.5);
    }

    #[test]
    fn test_fingerprint_changes_with_policy() {
        let a = AssignmentPolicy::default();
        let mut b = AssignmentPolicy::default();
        b.max_gap_hours = 4.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), AssignmentPolicy::default().fingerprint());
    }
}
