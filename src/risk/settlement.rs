//! Settlement confirmation tracking

use crate::config::duration_from_secs;
use crate::position::{ExecutionAnomaly, PositionId};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSettlement {
    pub closed_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Closed positions awaiting settlement confirmation
///
/// Expired entries are reported once and dropped; settlement is never
/// retried automatically.
#[derive(Debug, Clone)]
pub struct SettlementTracker {
    timeout: Option<Duration>,
    pending: BTreeMap<PositionId, PendingSettlement>,
}

impl SettlementTracker {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: duration_from_secs(timeout_seconds),
            pending: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, position_id: PositionId, closed_at: DateTime<Utc>) {
        self.pending.insert(
            position_id,
            PendingSettlement {
                closed_at,
                deadline: self
                    .timeout
                    .and_then(|timeout| closed_at.checked_add_signed(timeout))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
    }

    /// Returns false when nothing was pending for the position
    pub fn confirm(&mut self, position_id: PositionId) -> bool {
        self.pending.remove(&position_id).is_some()
    }

    /// Remove and report every settlement whose deadline has passed
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<(PositionId, ExecutionAnomaly)> {
        let expired: Vec<PositionId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                self.pending.remove(&id).map(|p| {
                    (
                        id,
                        ExecutionAnomaly::SettlementTimeout {
                            closed_at: p.closed_at,
                            deadline: p.deadline,
                        },
                    )
                })
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, position_id: PositionId) -> bool {
        self.pending.contains_key(&position_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_confirm_before_deadline() {
        let mut tracker = SettlementTracker::new(60);
        tracker.register(1, t0());
        assert!(tracker.confirm(1));
        assert!(!tracker.confirm(1));
        assert!(tracker.sweep(t0() + Duration::seconds(120)).is_empty());
    }

    #[test]
    fn test_out_of_range_timeout_never_expires() {
        let mut tracker = SettlementTracker::new(u64::MAX);
        tracker.register(1, t0());
        assert!(tracker.sweep(t0() + Duration::days(36500)).is_empty());
        assert!(tracker.is_pending(1));
    }

    #[test]
    fn test_sweep_reports_expired_once() {
        let mut tracker = SettlementTracker::new(60);
        tracker.register(1, t0());
        tracker.register(2, t0() + Duration::seconds(30));

        let expired = tracker.sweep(t0() + Duration::seconds(60));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 1);
        assert!(matches!(
            expired[0].1,
            ExecutionAnomaly::SettlementTimeout { .. }
        ));

        assert!(tracker.sweep(t0() + Duration::seconds(60)).is_empty());
        assert_eq!(tracker.pending_count(), 1);
        assert!(tracker.is_pending(2));
    }
}
