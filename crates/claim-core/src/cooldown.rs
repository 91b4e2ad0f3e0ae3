//! Minimum interval between automatic logs of one (player, spot) pair.
//!
//! The ledger itself lives on the player record; the gate only interprets it.
//! Callers hold the player's lock across `try_acquire` and the grants that
//! follow, which makes check-and-record a single step per pair.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{EngineError, EngineResult};

pub type AutoLogLedger = BTreeMap<String, DateTime<Utc>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownGate {
    window: Duration,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self::new(Duration::seconds(secs))
    }

    /// Time left before `spot_id` may be auto-logged again, if any.
    pub fn remaining(
        &self,
        ledger: &AutoLogLedger,
        spot_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = ledger.get(spot_id)?;
        let elapsed = now.signed_duration_since(*last);
        if elapsed >= self.window {
            None
        } else {
            Some(self.window - elapsed)
        }
    }

    pub fn can_auto_log(&self, ledger: &AutoLogLedger, spot_id: &str, now: DateTime<Utc>) -> bool {
        self.remaining(ledger, spot_id, now).is_none()
    }

    pub fn record_auto_log(&self, ledger: &mut AutoLogLedger, spot_id: &str, now: DateTime<Utc>) {
        ledger.insert(spot_id.to_string(), now);
    }

    /// Check and record in one borrow. On refusal the ledger is untouched.
    pub fn try_acquire(
        &self,
        ledger: &mut AutoLogLedger,
        spot_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if let Some(remaining) = self.remaining(ledger, spot_id, now) {
            return Err(EngineError::CooldownActive {
                spot_id: spot_id.to_string(),
                retry_after_ms: remaining.num_milliseconds().max(1),
            });
        }
        self.record_auto_log(ledger, spot_id, now);
        Ok(())
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn first_log_is_always_allowed() {
        let gate = CooldownGate::default();
        let ledger = AutoLogLedger::new();
        assert!(gate.can_auto_log(&ledger, "spot-1", t0()));
    }

    #[test]
    fn window_is_inclusive_at_exactly_five_minutes() {
        let gate = CooldownGate::default();
        let mut ledger = AutoLogLedger::new();
        gate.try_acquire(&mut ledger, "spot-1", t0()).expect("first");

        let almost = t0() + Duration::seconds(299);
        assert!(!gate.can_auto_log(&ledger, "spot-1", almost));
        assert!(gate.can_auto_log(&ledger, "spot-1", t0() + Duration::minutes(5)));
    }

    #[test]
    fn refusal_reports_remaining_time_and_keeps_ledger() {
        let gate = CooldownGate::default();
        let mut ledger = AutoLogLedger::new();
        gate.try_acquire(&mut ledger, "spot-1", t0()).expect("first");
        let before = ledger.clone();

        let err = gate
            .try_acquire(&mut ledger, "spot-1", t0() + Duration::minutes(1))
            .expect_err("inside window");
        assert_eq!(
            err,
            EngineError::CooldownActive {
                spot_id: "spot-1".to_string(),
                retry_after_ms: 240_000,
            }
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn spots_cool_down_independently() {
        let gate = CooldownGate::default();
        let mut ledger = AutoLogLedger::new();
        gate.try_acquire(&mut ledger, "spot-1", t0()).expect("spot-1");
        gate.try_acquire(&mut ledger, "spot-2", t0()).expect("spot-2");
        assert_eq!(ledger.len(), 2);
    }
}
