//! Consecutive-DR tracking.
//!
//! DR history is derived from bookings, not stored separately. The canonical
//! rule is global-consecutive: whoever served the most recent DR booking
//! before this one's start must not (or is penalised to) serve the next,
//! depending on policy. With `scope = BY_TYPE` the chain is tracked per
//! `dr_type`.

use serde::{Deserialize, Serialize};

use crate::booking::Booking;
use crate::error::StoreError;
use crate::policy::{AssignmentPolicy, DrScope};
use crate::store::BookingStore;

/// Filter for the last-DR store lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrFilter {
    /// Restrict the chain to this DR sub-class.
    pub dr_type: Option<String>,
    /// Whether waiting bookings participate in the chain.
    pub include_pending: bool,
}

/// Consecutive-DR verdict for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrState {
    /// The candidate served the previous DR booking in the chain.
    pub is_consecutive: bool,
    /// Hard-blocked by `forbid_consecutive` (may later be overridden).
    pub blocked: bool,
    /// The consecutive penalty participates in this candidate's score.
    pub penalty_applied: bool,
    /// A blocked candidate was re-admitted for lack of alternatives.
    pub override_applied: bool,
    /// Effective penalty amount (non-positive).
    pub penalty: f64,
}

impl DrState {
    /// Convert a block into a penalised assignment (coverage override).
    pub fn with_override(mut self) -> DrState {
        self.blocked = false;
        self.penalty_applied = true;
        self.override_applied = true;
        self
    }
}

/// Locate the most recent DR booking starting before `booking.time_start`,
/// honouring the policy's scope and pending-inclusion settings.
pub fn last_global_dr<S: BookingStore + ?Sized>(
    store: &S,
    policy: &AssignmentPolicy,
    booking: &Booking,
) -> Result<Option<Booking>, StoreError> {
    let filter = DrFilter {
        dr_type: match policy.dr_policy.scope {
            DrScope::Global => None,
            DrScope::ByType => booking.dr_type.clone(),
        },
        include_pending: policy.dr_policy.include_pending_in_global,
    };
    store.last_dr(booking.time_start, &filter)
}

/// Compute the consecutive-DR state for one candidate.
///
/// `last_interpreter` is the server of the chain's previous booking, already
/// filtered to the active roster (a departed interpreter imposes no
/// constraint). `newcomer_grace` clears both block and penalty for
/// interpreters with no assignments in the window while the roster has
/// grown.
pub fn dr_state_for(
    candidate: &str,
    last_interpreter: Option<&str>,
    policy: &AssignmentPolicy,
    newcomer_grace: bool,
) -> DrState {
    let mut state = DrState {
        penalty: policy.effective_dr_penalty(),
        ..DrState::default()
    };

    let Some(last) = last_interpreter else {
        return state;
    };
    if last != candidate {
        return state;
    }
    state.is_consecutive = true;

    if newcomer_grace {
        return state;
    }

    if policy.dr_policy.forbid_consecutive {
        state.blocked = true;
    } else {
        state.penalty_applied = true;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingStatus, MeetingType};
    use crate::policy::DrPolicy;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn dr_booking(
        id: i64,
        dr_type: &str,
        interpreter: Option<&str>,
        status: BookingStatus,
        start: DateTime<Utc>,
    ) -> Booking {
        Booking {
            id,
            meeting_type: MeetingType::Dr,
            dr_type: Some(dr_type.to_string()),
            time_start: start,
            time_end: start + Duration::hours(1),
            room: "R-DR".to_string(),
            owner_id: "EMP-0003".to_string(),
            created_at: start - Duration::days(5),
            status,
            assigned_interpreter: interpreter.map(|s| s.to_string()),
        }
    }

    fn policy(forbid: bool) -> AssignmentPolicy {
        AssignmentPolicy {
            dr_consecutive_penalty: -0.7,
            dr_policy: DrPolicy {
                forbid_consecutive: forbid,
                ..DrPolicy::default()
            },
            ..AssignmentPolicy::default()
        }
    }

    #[test]
    fn test_forbid_blocks_consecutive() {
        let state = dr_state_for("A", Some("A"), &policy(true), false);
        assert!(state.is_consecutive);
        assert!(state.blocked);
        assert!(!state.penalty_applied);
    }

    #[test]
    fn test_penalty_without_forbid() {
        let state = dr_state_for("A", Some("A"), &policy(false), false);
        assert!(state.is_consecutive);
        assert!(!state.blocked);
        assert!(state.penalty_applied);
        assert!((state.penalty - (-0.7)).abs() < 1e-9);
    }

    #[test]
    fn test_non_consecutive_unconstrained() {
        let state = dr_state_for("B", Some("A"), &policy(true), false);
        assert!(!state.is_consecutive);
        assert!(!state.blocked);
        assert!(!state.penalty_applied);
    }

    #[test]
    fn test_newcomer_grace_clears_constraints() {
        let state = dr_state_for("A", Some("A"), &policy(true), true);
        assert!(state.is_consecutive);
        assert!(!state.blocked);
        assert!(!state.penalty_applied);
    }

    #[test]
    fn test_override_converts_block_to_penalty() {
        let state = dr_state_for("A", Some("A"), &policy(true), false).with_override();
        assert!(!state.blocked);
        assert!(state.penalty_applied);
        assert!(state.override_applied);
    }

    #[test]
    fn test_last_global_dr_ignores_pending_by_default() {
        let store = MemoryStore::new();
        store
            .put_booking(dr_booking(1, "DR-I", Some("A"), BookingStatus::Approve, now() - Duration::days(3)))
            .unwrap();
        store
            .put_booking(dr_booking(2, "DR-I", Some("B"), BookingStatus::Waiting, now() - Duration::days(1)))
            .unwrap();
        let target = dr_booking(3, "DR-I", None, BookingStatus::Waiting, now() + Duration::days(2));

        let pol = policy(true);
        let last = last_global_dr(&store, &pol, &target).unwrap().unwrap();
        assert_eq!(last.id, 1);

        let mut pending_pol = policy(true);
        pending_pol.dr_policy.include_pending_in_global = true;
        let last = last_global_dr(&store, &pending_pol, &target).unwrap().unwrap();
        assert_eq!(last.id, 2);
    }

    #[test]
    fn test_last_global_dr_by_type_scope() {
        let store = MemoryStore::new();
        store
            .put_booking(dr_booking(1, "DR-I", Some("A"), BookingStatus::Approve, now() - Duration::days(4)))
            .unwrap();
        store
            .put_booking(dr_booking(2, "DR-II", Some("B"), BookingStatus::Approve, now() - Duration::days(1)))
            .unwrap();
        let target = dr_booking(3, "DR-I", None, BookingStatus::Waiting, now() + Duration::days(2));

        // Global scope sees the most recent DR regardless of sub-class.
        let last = last_global_dr(&store, &policy(true), &target).unwrap().unwrap();
        assert_eq!(last.id, 2);

        let mut by_type = policy(true);
        by_type.dr_policy.scope = DrScope::ByType;
        let last = last_global_dr(&store, &by_type, &target).unwrap().unwrap();
        assert_eq!(last.id, 1);
    }
}
