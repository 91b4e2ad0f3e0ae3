//! Last-known positions and their live fan-out.

use contracts::{Player, Position, PresenceSnapshot};
use tracing::trace;

use super::ClaimEngine;
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::geo;
use crate::table::lock;

fn presence_of(player: &Player) -> Option<PresenceSnapshot> {
    let position = player.last_seen_position?;
    Some(PresenceSnapshot {
        player_id: player.id.clone(),
        display_name: player.display_name.clone(),
        position,
        color: player.color.clone(),
        last_activity: player.last_seen_at,
    })
}

impl ClaimEngine {
    /// Records the player's position and broadcasts it. The event is published
    /// while the player's lock is held, so one player's updates reach
    /// subscribers in the order they were applied.
    pub fn update_position(
        &self,
        player_id: &str,
        position: Position,
    ) -> EngineResult<PresenceSnapshot> {
        geo::validate_position(&position)?;
        let handle = self.player_handle(player_id)?;

        let mut player = lock(&handle);
        let now = self.now();
        player.last_seen_position = Some(position);
        player.last_seen_at = Some(now);
        let snapshot = PresenceSnapshot {
            player_id: player.id.clone(),
            display_name: player.display_name.clone(),
            position,
            color: player.color.clone(),
            last_activity: Some(now),
        };
        self.bus.publish(EngineEvent::PlayerMoved(snapshot.clone()));
        drop(player);

        trace!(player_id, %position, "position updated");
        Ok(snapshot)
    }

    /// Players with a known position within `radius_m` of `center`.
    pub fn query_nearby_players(
        &self,
        center: Position,
        radius_m: f64,
    ) -> EngineResult<Vec<PresenceSnapshot>> {
        geo::validate_position(&center)?;
        geo::validate_radius(radius_m)?;

        Ok(self
            .live_players()
            .into_iter()
            .filter(|snapshot| geo::within_radius(&center, &snapshot.position, radius_m))
            .collect())
    }

    /// Every player with a known position.
    pub fn live_players(&self) -> Vec<PresenceSnapshot> {
        self.players
            .handles()
            .iter()
            .filter_map(|handle| presence_of(&lock(handle)))
            .collect()
    }
}
