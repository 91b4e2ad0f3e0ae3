use contracts::{InventoryItem, LootClaim, LootOutcome};
use tracing::debug;

use super::ClaimEngine;
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::geo;
use crate::progression;
use crate::table::lock;

/// Validates a pickup and resolves it to `(xp, item)` before any lock is taken.
fn resolve_reward(claim: &LootClaim) -> EngineResult<(u64, Option<InventoryItem>)> {
    if claim.loot_id.trim().is_empty() {
        return Err(EngineError::InvalidInput("loot_id is required".to_string()));
    }
    geo::validate_distance(claim.distance)?;

    let xp = match claim.xp_reward {
        Some(xp) if xp > 0 => xp.unsigned_abs(),
        Some(xp) => {
            return Err(EngineError::InvalidReward(format!(
                "xp_reward must be positive (got {xp})"
            )))
        }
        None => return Err(EngineError::InvalidReward("xp_reward is required".to_string())),
    };

    let item = match &claim.item_reward {
        None => None,
        Some(reward) if reward.name.trim().is_empty() => {
            return Err(EngineError::InvalidReward("item name must not be blank".to_string()))
        }
        Some(reward) if reward.quantity == Some(0) => {
            return Err(EngineError::InvalidReward("item quantity must be at least 1".to_string()))
        }
        Some(reward) => Some(InventoryItem {
            name: reward.name.trim().to_string(),
            quantity: reward.quantity.unwrap_or(1),
            description: reward.description.clone().unwrap_or_default(),
        }),
    };

    Ok((xp, item))
}

impl ClaimEngine {
    /// Credits a client-discovered pickup. XP, loot count and inventory change
    /// together under the player's lock. Duplicate submissions of the same
    /// `loot_id` are credited again.
    pub fn credit_loot(&self, player_id: &str, claim: LootClaim) -> EngineResult<LootOutcome> {
        let handle = self.player_handle(player_id)?;
        let (xp_gained, item) = resolve_reward(&claim)?;

        let mut player = lock(&handle);
        progression::grant_xp(&mut player.stats, xp_gained);
        player.stats.collected_loot_count += 1;
        if let Some(item) = &item {
            let slot = player
                .inventory
                .items
                .entry(item.name.clone())
                .or_insert_with(|| InventoryItem {
                    name: item.name.clone(),
                    quantity: 0,
                    description: item.description.clone(),
                });
            slot.quantity = slot.quantity.saturating_add(item.quantity);
        }
        let updated_player = player.clone();
        drop(player);

        debug!(player_id, loot_id = %claim.loot_id, xp_gained, "loot credited");
        self.bus.publish(EngineEvent::LootCollected {
            player_id: player_id.to_string(),
            loot_id: claim.loot_id.clone(),
            xp_gained,
        });

        Ok(LootOutcome {
            loot_id: claim.loot_id,
            xp_gained,
            item_gained: item,
            distance: claim.distance,
            updated_player,
        })
    }
}
