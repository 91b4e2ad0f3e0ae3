//! Visit logging: turns a manual or automatic visit into XP, claim points and
//! an immutable log entry.

use contracts::{LogEntry, LogOutcome, LogType};
use tracing::debug;
use uuid::Uuid;

use super::ClaimEngine;
use crate::claims;
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::geo;
use crate::progression;
use crate::table::lock;

impl ClaimEngine {
    /// Player-confirmed visit. Always accepted for a known player and spot.
    pub fn manual_log(
        &self,
        spot_id: &str,
        player_id: &str,
        distance_m: Option<f64>,
        note: Option<String>,
    ) -> EngineResult<LogOutcome> {
        self.record_visit(spot_id, player_id, LogType::Manual, distance_m, note)
    }

    /// Proximity-triggered visit, rate limited per (player, spot). A refusal
    /// leaves every ledger untouched.
    pub fn auto_log(
        &self,
        spot_id: &str,
        player_id: &str,
        distance_m: Option<f64>,
    ) -> EngineResult<LogOutcome> {
        self.record_visit(spot_id, player_id, LogType::Auto, distance_m, None)
    }

    fn record_visit(
        &self,
        spot_id: &str,
        player_id: &str,
        log_type: LogType,
        distance_m: Option<f64>,
        note: Option<String>,
    ) -> EngineResult<LogOutcome> {
        geo::validate_distance(distance_m)?;
        let spot_handle = self.spot_handle(spot_id)?;
        let player_handle = self.player_handle(player_id)?;

        let points = match log_type {
            LogType::Manual => claims::manual_claim_points(distance_m),
            LogType::Auto => claims::auto_claim_points(distance_m),
        };
        claims::validate_points(points)?;

        let mut player = lock(&player_handle);
        let now = self.now();
        if log_type == LogType::Auto {
            self.cooldown
                .try_acquire(&mut player.last_auto_log_at, spot_id, now)?;
        }

        let mut spot = lock(&spot_handle);
        let xp_gained = match log_type {
            LogType::Manual => spot.base_xp,
            LogType::Auto => spot.auto_xp,
        };
        claims::grant_claim_points(&mut spot.claim_info, &player.id, points)?;
        progression::grant_xp(&mut player.stats, xp_gained);

        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            spot_id: spot.id.clone(),
            player_id: player.id.clone(),
            log_type,
            distance_at_log: distance_m,
            note,
            xp_gained,
            claim_points_gained: points,
            created_at: now,
        };
        lock(&self.logs).push(entry.clone());

        let outcome = LogOutcome {
            log: entry.clone(),
            xp_gained,
            claim_points_gained: points,
            updated_player: player.clone(),
            updated_spot_claim_info: spot.claim_info.clone(),
        };
        drop(spot);
        drop(player);

        debug!(
            spot_id,
            player_id,
            log_type = %log_type,
            xp_gained,
            claim_points = points,
            "visit logged"
        );
        self.bus.publish(EngineEvent::VisitLogged {
            log: entry,
            claim_info: outcome.updated_spot_claim_info.clone(),
        });
        Ok(outcome)
    }
}
