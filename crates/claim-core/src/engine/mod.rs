//! The state owner: players, spots, routes and the visit log, each entity
//! behind its own lock, plus the event bus that fans out committed changes.
//!
//! Lock order when an operation needs more than one entity: player, then
//! spot, then the log. Nothing takes them in any other order.

mod loot;
mod presence;
mod recorder;
mod routes;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use contracts::{
    EngineConfig, HeatmapEntry, Identity, LogEntry, NewPlayer, NewSpot, Player, Position, Route,
    Spot, StoreSnapshot, SCHEMA_VERSION_V1,
};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::claims;
use crate::clock::{Clock, SystemClock};
use crate::cooldown::CooldownGate;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::events::{EngineEvent, EventBus};
use crate::geo;
use crate::progression;
use crate::table::{lock, EntityTable, Handle};

pub const DEMO_ADMIN_ID: &str = "player-admin";

#[derive(Debug)]
pub struct ClaimEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    cooldown: CooldownGate,
    players: EntityTable<Player>,
    spots: EntityTable<Spot>,
    routes: EntityTable<Route>,
    logs: Mutex<Vec<LogEntry>>,
    bus: EventBus,
}

impl ClaimEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let snapshot = StoreSnapshot::empty(clock.now());
        Self::from_snapshot(config, clock, snapshot)
    }

    /// Rebuilds the in-memory state from a durable checkpoint. Derived level
    /// fields are recomputed rather than trusted.
    pub fn from_snapshot(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        snapshot: StoreSnapshot,
    ) -> Self {
        let players = snapshot.players.into_iter().map(|(id, mut player)| {
            progression::refresh_level(&mut player.stats);
            (id, player)
        });

        Self {
            cooldown: CooldownGate::from_secs(config.auto_log_cooldown_secs),
            bus: EventBus::new(config.broadcast_capacity),
            config,
            clock,
            players: EntityTable::from_entries(players),
            spots: EntityTable::from_entries(snapshot.spots),
            routes: EntityTable::from_entries(snapshot.routes),
            logs: Mutex::new(snapshot.logs),
        }
    }

    /// Point-in-time copy of everything, for the durable store. Each entity
    /// is internally consistent; the copy as a whole is not a transaction.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            saved_at: self.now(),
            players: self
                .players
                .values()
                .into_iter()
                .map(|player| (player.id.clone(), player))
                .collect(),
            spots: self
                .spots
                .values()
                .into_iter()
                .map(|spot| (spot.id.clone(), spot))
                .collect(),
            logs: lock(&self.logs).clone(),
            routes: self
                .routes
                .values()
                .into_iter()
                .map(|route| (route.id.clone(), route))
                .collect(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.spots.is_empty()
    }

    pub fn register_player(&self, request: NewPlayer) -> EngineResult<Player> {
        let id = Uuid::new_v4().to_string();
        let display_name = match request.display_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => {
                return Err(EngineError::InvalidInput(
                    "display_name must not be blank".to_string(),
                ))
            }
            None => format!("Player-{}", &id[..6]),
        };

        let player = Player {
            id: id.clone(),
            mode: request.mode.unwrap_or_default(),
            role: request.role.unwrap_or_default(),
            display_name,
            color: request
                .color
                .unwrap_or_else(|| self.config.default_player_color.clone()),
            stats: Default::default(),
            inventory: Default::default(),
            last_seen_position: None,
            last_seen_at: None,
            last_auto_log_at: Default::default(),
            created_at: self.now(),
        };
        self.insert_player(player.clone())?;

        info!(player_id = %player.id, role = ?player.role, "player registered");
        self.bus.publish(EngineEvent::PlayerRegistered {
            player_id: player.id.clone(),
            display_name: player.display_name.clone(),
        });
        Ok(player)
    }

    fn insert_player(&self, player: Player) -> EngineResult<()> {
        let id = player.id.clone();
        if self.players.insert_new(id.clone(), player) {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!("player id already taken: {id}")))
        }
    }

    pub fn get_player(&self, player_id: &str) -> EngineResult<Player> {
        self.players
            .get_cloned(player_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Player, player_id))
    }

    /// Identity as the credential layer would present it for a known player.
    pub fn identity_for(&self, player_id: &str) -> Option<Identity> {
        self.players
            .get_cloned(player_id)
            .map(|player| player.identity())
    }

    pub fn list_players(&self) -> Vec<Player> {
        self.players.values()
    }

    pub fn create_spot(&self, actor: &Identity, request: NewSpot) -> EngineResult<Spot> {
        if !actor.role.can_create_spots() {
            return Err(EngineError::Forbidden(format!(
                "role {:?} may not create spots",
                actor.role
            )));
        }
        if !self.players.contains(&actor.player_id) {
            return Err(EngineError::not_found(EntityKind::Player, &actor.player_id));
        }
        geo::validate_position(&request.position)?;
        if request.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("spot name must not be blank".to_string()));
        }

        let spot = Spot {
            id: Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            description: request.description,
            position: request.position,
            base_xp: request.base_xp.unwrap_or(self.config.default_base_xp),
            auto_xp: request.auto_xp.unwrap_or(self.config.default_auto_xp),
            created_by: Some(actor.player_id.clone()),
            created_at: self.now(),
            claim_info: Default::default(),
        };
        self.insert_spot(spot.clone())?;

        info!(spot_id = %spot.id, creator = %actor.player_id, "spot created");
        self.bus.publish(EngineEvent::SpotCreated(spot.clone()));
        Ok(spot)
    }

    fn insert_spot(&self, spot: Spot) -> EngineResult<()> {
        let id = spot.id.clone();
        if self.spots.insert_new(id.clone(), spot) {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!("spot id already taken: {id}")))
        }
    }

    pub fn get_spot(&self, spot_id: &str) -> EngineResult<Spot> {
        self.spots
            .get_cloned(spot_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Spot, spot_id))
    }

    pub fn list_spots(&self) -> Vec<Spot> {
        self.spots.values()
    }

    /// Linear scan; fine for the expected number of spots.
    pub fn query_nearby_spots(&self, center: Position, radius_m: f64) -> EngineResult<Vec<Spot>> {
        geo::validate_position(&center)?;
        geo::validate_radius(radius_m)?;

        Ok(self
            .spots
            .values()
            .into_iter()
            .filter(|spot| geo::within_radius(&center, &spot.position, radius_m))
            .collect())
    }

    pub fn list_logs(&self) -> Vec<LogEntry> {
        lock(&self.logs).clone()
    }

    pub fn logs_for_spot(&self, spot_id: &str) -> Vec<LogEntry> {
        lock(&self.logs)
            .iter()
            .filter(|entry| entry.spot_id == spot_id)
            .cloned()
            .collect()
    }

    /// Spots where the player holds claim points, with the share at query time.
    pub fn heatmap_for(&self, player_id: &str) -> EngineResult<Vec<HeatmapEntry>> {
        if !self.players.contains(player_id) {
            return Err(EngineError::not_found(EntityKind::Player, player_id));
        }

        let mut entries = Vec::new();
        for handle in self.spots.handles() {
            let spot = lock(&handle);
            let points = claims::points_of(&spot.claim_info, player_id);
            if points > 0.0 {
                entries.push(HeatmapEntry {
                    spot_id: spot.id.clone(),
                    position: spot.position,
                    player_claim_points: points,
                    claim_share: claims::share_of(&spot.claim_info, player_id),
                });
            }
        }
        debug!(player_id, spots = entries.len(), "heatmap built");
        Ok(entries)
    }

    /// Seeds an admin and two Berlin spots into an empty engine. Returns
    /// whether anything was inserted.
    pub fn seed_demo_data(&self) -> EngineResult<bool> {
        if !self.is_empty() {
            return Ok(false);
        }

        let now = self.now();
        self.insert_player(Player {
            id: DEMO_ADMIN_ID.to_string(),
            mode: contracts::PlayerMode::LoggedIn,
            role: contracts::PlayerRole::Admin,
            display_name: "Admin".to_string(),
            color: "#FF0000".to_string(),
            stats: Default::default(),
            inventory: Default::default(),
            last_seen_position: None,
            last_seen_at: None,
            last_auto_log_at: Default::default(),
            created_at: now,
        })?;

        let demo_spots = [
            ("spot-1", "Brandenburger Tor", "Historic place", 52.52, 13.405, 20),
            ("spot-2", "Checkpoint Charlie", "Historical", 52.5205, 13.4095, 15),
        ];
        for (id, name, description, latitude, longitude, base_xp) in demo_spots {
            self.insert_spot(Spot {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                position: Position::new(latitude, longitude),
                base_xp,
                auto_xp: 5,
                created_by: Some(DEMO_ADMIN_ID.to_string()),
                created_at: now,
                claim_info: Default::default(),
            })?;
        }

        info!("seeded demo admin and spots");
        Ok(true)
    }

    fn player_handle(&self, player_id: &str) -> EngineResult<Handle<Player>> {
        self.players
            .handle(player_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Player, player_id))
    }

    fn spot_handle(&self, spot_id: &str) -> EngineResult<Handle<Spot>> {
        self.spots
            .handle(spot_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Spot, spot_id))
    }

    fn route_handle(&self, route_id: &str) -> EngineResult<Handle<Route>> {
        self.routes
            .handle(route_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Route, route_id))
    }
}

#[cfg(test)]
mod tests;
