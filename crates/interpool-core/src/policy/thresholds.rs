//! Per-(meeting-type, mode) thresholds and the caching resolver.
//!
//! Threshold rows live in the policy store; missing rows fall back to
//! per-meeting-type defaults, then to the engine's hard-coded table. The
//! resolver caches lookups for a short TTL and flushes whenever the policy
//! generation counter moves.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::MeetingType;
use crate::policy::AssignMode;
use crate::store::PolicyStore;

/// A stored threshold row for one (meeting type, mode) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeThreshold {
    pub meeting_type: MeetingType,
    pub mode: AssignMode,
    /// Below this many days until start, urgency saturates at 1.
    pub urgent_threshold_days: i64,
    /// At or beyond this many days until start, urgency is 0. Also the
    /// pool-entry threshold for NORMAL/CUSTOM (and the BALANCE floor).
    pub general_threshold_days: i64,
    /// Relative priority of the meeting type when draining the pool.
    pub priority_value: i64,
}

/// Resolved thresholds served to the orchestrator and scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedThresholds {
    pub urgent_threshold_days: i64,
    pub general_threshold_days: i64,
    pub priority_value: i64,
}

/// Hard-coded per-meeting-type defaults, served when neither a
/// (meeting type, mode) row nor a meeting-type default row exists.
pub fn default_thresholds(meeting_type: MeetingType) -> ResolvedThresholds {
    let (urgent, general, priority) = match meeting_type {
        MeetingType::President => (2, 14, 10),
        MeetingType::Dr => (1, 7, 9),
        MeetingType::Vip => (2, 10, 8),
        MeetingType::Urgent => (1, 3, 7),
        MeetingType::Weekly => (1, 7, 5),
        MeetingType::General => (10, 15, 4),
        MeetingType::Other => (3, 7, 3),
    };
    ResolvedThresholds {
        urgent_threshold_days: urgent,
        general_threshold_days: general,
        priority_value: priority,
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedEntry {
    value: ResolvedThresholds,
    cached_at: DateTime<Utc>,
    generation: u64,
}

/// Caching threshold resolver.
///
/// Entries are valid for `ttl` and only while the policy generation counter
/// is unchanged; an admin policy write bumps the counter and implicitly
/// flushes every worker's cache.
pub struct ThresholdResolver {
    ttl: Duration,
    cache: Mutex<HashMap<(MeetingType, AssignMode), CachedEntry>>,
}

impl ThresholdResolver {
    /// Default cache TTL of five minutes.
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(300))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve thresholds for a (meeting type, mode) pair.
    ///
    /// Store misses are logged and degrade to defaults rather than failing
    /// the decision path. The returned values are always finite.
    pub fn resolve<P: PolicyStore + ?Sized>(
        &self,
        store: &P,
        now: DateTime<Utc>,
        meeting_type: MeetingType,
        mode: AssignMode,
    ) -> ResolvedThresholds {
        let generation = store.policy_generation().unwrap_or(0);

        if let Ok(cache) = self.cache.lock() {
            if let Some(entry) = cache.get(&(meeting_type, mode)) {
                if entry.generation == generation && now - entry.cached_at < self.ttl {
                    return entry.value;
                }
            }
        }

        let value = match store.get_thresholds(meeting_type, mode) {
            Ok(Some(row)) => ResolvedThresholds {
                urgent_threshold_days: row.urgent_threshold_days.max(0),
                general_threshold_days: row
                    .general_threshold_days
                    .max(row.urgent_threshold_days.max(0)),
                priority_value: row.priority_value,
            },
            Ok(None) => default_thresholds(meeting_type),
            Err(e) => {
                eprintln!(
                    "warning: threshold lookup for {}/{} failed, serving defaults: {e}",
                    meeting_type.as_str(),
                    mode.as_str()
                );
                default_thresholds(meeting_type)
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                (meeting_type, mode),
                CachedEntry { value, cached_at: now, generation },
            );
        }
        value
    }

    /// Drop every cached entry. Called after local policy writes; remote
    /// writes are picked up via the generation counter.
    pub fn flush(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl Default for ThresholdResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PolicyStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_when_store_has_no_row() {
        let store = MemoryStore::new();
        let resolver = ThresholdResolver::new();
        let t = resolver.resolve(&store, now(), MeetingType::General, AssignMode::Normal);
        assert_eq!(t.urgent_threshold_days, 10);
        assert_eq!(t.general_threshold_days, 15);
    }

    #[test]
    fn test_stored_row_wins_over_defaults() {
        let store = MemoryStore::new();
        store
            .put_thresholds(ModeThreshold {
                meeting_type: MeetingType::General,
                mode: AssignMode::Normal,
                urgent_threshold_days: 2,
                general_threshold_days: 6,
                priority_value: 4,
            })
            .unwrap();
        let resolver = ThresholdResolver::new();
        let t = resolver.resolve(&store, now(), MeetingType::General, AssignMode::Normal);
        assert_eq!(t.urgent_threshold_days, 2);
        assert_eq!(t.general_threshold_days, 6);
    }

    #[test]
    fn test_general_never_below_urgent() {
        let store = MemoryStore::new();
        store
            .put_thresholds(ModeThreshold {
                meeting_type: MeetingType::Vip,
                mode: AssignMode::Normal,
                urgent_threshold_days: 9,
                general_threshold_days: 3,
                priority_value: 8,
            })
            .unwrap();
        let resolver = ThresholdResolver::new();
        let t = resolver.resolve(&store, now(), MeetingType::Vip, AssignMode::Normal);
        assert_eq!(t.general_threshold_days, 9);
    }

    #[test]
    fn test_policy_write_flushes_cache() {
        let store = MemoryStore::new();
        let resolver = ThresholdResolver::new();

        let before = resolver.resolve(&store, now(), MeetingType::General, AssignMode::Normal);
        assert_eq!(before.general_threshold_days, 15);

        // A threshold write bumps the generation, so the cached entry
        // must not be served even though its TTL has not expired.
        store
            .put_thresholds(ModeThreshold {
                meeting_type: MeetingType::General,
                mode: AssignMode::Normal,
                urgent_threshold_days: 1,
                general_threshold_days: 4,
                priority_value: 4,
            })
            .unwrap();
        let after = resolver.resolve(&store, now(), MeetingType::General, AssignMode::Normal);
        assert_eq!(after.general_threshold_days, 4);
    }

    #[test]
    fn test_cache_serves_within_ttl() {
        let store = MemoryStore::new();
        let resolver = ThresholdResolver::with_ttl(Duration::seconds(300));

        let a = resolver.resolve(&store, now(), MeetingType::Dr, AssignMode::Balance);
        let b = resolver.resolve(
            &store,
            now() + Duration::seconds(100),
            MeetingType::Dr,
            AssignMode::Balance,
        );
        assert_eq!(a, b);
    }
}
