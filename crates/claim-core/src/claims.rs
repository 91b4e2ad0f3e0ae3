//! Per-spot claim ledger and the distance-decay point policy.

use contracts::ClaimInfo;

use crate::error::{EngineError, EngineResult};

pub const MANUAL_BASE_POINTS: f64 = 1.0;
pub const MANUAL_MAX_BONUS: f64 = 1.0;
pub const MANUAL_BONUS_RADIUS_M: f64 = 100.0;

pub const AUTO_BASE_POINTS: f64 = 0.5;
pub const AUTO_MAX_BONUS: f64 = 0.5;
pub const AUTO_BONUS_RADIUS_M: f64 = 10.0;

/// Linear decay from `max_bonus` at 0m to nothing at `radius_m` and beyond.
fn proximity_bonus(distance_m: f64, radius_m: f64, max_bonus: f64) -> f64 {
    let remaining = (radius_m - distance_m.min(radius_m)).max(0.0);
    max_bonus * remaining / radius_m
}

/// Points for a player-confirmed visit. An unknown distance earns the full bonus.
pub fn manual_claim_points(distance_m: Option<f64>) -> f64 {
    let distance = distance_m.unwrap_or(0.0);
    MANUAL_BASE_POINTS + proximity_bonus(distance, MANUAL_BONUS_RADIUS_M, MANUAL_MAX_BONUS)
}

/// Points for a proximity-triggered visit; capped well below a manual log.
pub fn auto_claim_points(distance_m: Option<f64>) -> f64 {
    let distance = distance_m.unwrap_or(0.0);
    AUTO_BASE_POINTS + proximity_bonus(distance, AUTO_BONUS_RADIUS_M, AUTO_MAX_BONUS)
}

pub fn validate_points(points: f64) -> EngineResult<()> {
    if points.is_finite() && points > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "claim points must be positive and finite (got {points})"
        )))
    }
}

/// Adds `points` to both the spot total and the player's entry, returning the
/// player's new balance. Callers hold the spot's lock for the whole call.
pub fn grant_claim_points(info: &mut ClaimInfo, player_id: &str, points: f64) -> EngineResult<f64> {
    validate_points(points)?;

    info.total_claim_points += points;
    let entry = info
        .per_player_claim_points
        .entry(player_id.to_string())
        .or_insert(0.0);
    *entry += points;
    Ok(*entry)
}

pub fn points_of(info: &ClaimInfo, player_id: &str) -> f64 {
    info.per_player_claim_points
        .get(player_id)
        .copied()
        .unwrap_or(0.0)
}

/// Fraction of the spot held by `player_id`, in `[0, 1]`.
pub fn share_of(info: &ClaimInfo, player_id: &str) -> f64 {
    if info.total_claim_points <= 0.0 {
        return 0.0;
    }
    (points_of(info, player_id) / info.total_claim_points).clamp(0.0, 1.0)
}

/// Absolute difference between the stored total and the sum of the entries.
pub fn ledger_drift(info: &ClaimInfo) -> f64 {
    let sum: f64 = info.per_player_claim_points.values().sum();
    (info.total_claim_points - sum).abs()
}
