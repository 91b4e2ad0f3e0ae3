//! Route sessions: `start` opens an active route, points are appended while it
//! is active, `stop` seals it for good.

use chrono::{DateTime, Utc};
use contracts::{Identity, Position, Route, RoutePoint, RouteState};
use tracing::{debug, info};
use uuid::Uuid;

use super::ClaimEngine;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::events::EngineEvent;
use crate::geo;
use crate::table::lock;

impl ClaimEngine {
    pub fn start_route(&self, actor: &Identity) -> EngineResult<Route> {
        if !actor.is_logged_in() {
            return Err(EngineError::Unauthorized(
                "route tracking requires a logged-in player".to_string(),
            ));
        }
        let player_handle = self.player_handle(&actor.player_id)?;

        // The player's lock serializes concurrent starts, so sealing and the
        // insert below behave as one step for that player.
        let player = lock(&player_handle);
        let now = self.now();
        if self.config.seal_previous_route_on_start {
            for sealed in self.seal_active_routes(&player.id, now) {
                self.bus.publish(EngineEvent::RouteStopped(sealed));
            }
        }

        let route = Route {
            id: Uuid::new_v4().to_string(),
            player_id: player.id.clone(),
            points: Vec::new(),
            started_at: now,
            ended_at: None,
        };
        if !self.routes.insert_new(route.id.clone(), route.clone()) {
            return Err(EngineError::InvalidState(format!(
                "route id already taken: {}",
                route.id
            )));
        }
        drop(player);

        info!(route_id = %route.id, player_id = %route.player_id, "route started");
        self.bus.publish(EngineEvent::RouteStarted(route.clone()));
        Ok(route)
    }

    fn seal_active_routes(&self, player_id: &str, now: DateTime<Utc>) -> Vec<Route> {
        let mut sealed = Vec::new();
        for handle in self.routes.handles() {
            let mut route = lock(&handle);
            if route.player_id == player_id && route.state() == RouteState::Active {
                route.ended_at = Some(now);
                sealed.push(route.clone());
            }
        }
        sealed
    }

    /// Appends a point to an active route and returns the new point count.
    pub fn append_route_point(
        &self,
        route_id: &str,
        position: Position,
        timestamp: Option<DateTime<Utc>>,
    ) -> EngineResult<usize> {
        geo::validate_position(&position)?;
        let handle = self.route_handle(route_id)?;

        let mut route = lock(&handle);
        if route.state() == RouteState::Stopped {
            return Err(EngineError::InvalidState(format!(
                "route {route_id} is stopped"
            )));
        }
        let point = RoutePoint {
            position,
            timestamp: timestamp.unwrap_or_else(|| self.now()),
        };
        route.points.push(point);
        let count = route.points.len();
        let player_id = route.player_id.clone();
        self.bus.publish(EngineEvent::RoutePointAppended {
            route_id: route_id.to_string(),
            player_id,
            point,
        });
        drop(route);

        debug!(route_id, points = count, "route point appended");
        Ok(count)
    }

    pub fn stop_route(&self, route_id: &str) -> EngineResult<Route> {
        let handle = self.route_handle(route_id)?;

        let mut route = lock(&handle);
        if route.state() == RouteState::Stopped {
            return Err(EngineError::InvalidState(format!(
                "route {route_id} is already stopped"
            )));
        }
        route.ended_at = Some(self.now());
        let stopped = route.clone();
        drop(route);

        info!(route_id, points = stopped.points.len(), "route stopped");
        self.bus.publish(EngineEvent::RouteStopped(stopped.clone()));
        Ok(stopped)
    }

    pub fn get_route(&self, route_id: &str) -> EngineResult<Route> {
        self.routes
            .get_cloned(route_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Route, route_id))
    }

    /// Routes owned by `player_id`, oldest first.
    pub fn list_routes(&self, player_id: &str) -> EngineResult<Vec<Route>> {
        if !self.players.contains(player_id) {
            return Err(EngineError::not_found(EntityKind::Player, player_id));
        }

        let mut routes: Vec<Route> = self
            .routes
            .values()
            .into_iter()
            .filter(|route| route.player_id == player_id)
            .collect();
        routes.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(routes)
    }
}
