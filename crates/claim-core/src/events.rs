//! Post-commit event bus.
//!
//! Mutations publish after they commit; subscribers (the live socket layer,
//! the persistence worker) consume on their own schedule. Publishing never
//! blocks: a subscriber that falls behind loses the oldest events and is told
//! how many it skipped.

use contracts::{ClaimInfo, LogEntry, PresenceSnapshot, Route, RoutePoint, Spot};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EngineEvent {
    PlayerRegistered {
        player_id: String,
        display_name: String,
    },
    PlayerMoved(PresenceSnapshot),
    SpotCreated(Spot),
    VisitLogged {
        log: LogEntry,
        claim_info: ClaimInfo,
    },
    LootCollected {
        player_id: String,
        loot_id: String,
        xp_gained: u64,
    },
    RouteStarted(Route),
    RoutePointAppended {
        route_id: String,
        player_id: String,
        point: RoutePoint,
    },
    RouteStopped(Route),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerRegistered { .. } => "player.registered",
            Self::PlayerMoved(_) => "player.moved",
            Self::SpotCreated(_) => "spot.created",
            Self::VisitLogged { .. } => "visit.logged",
            Self::LootCollected { .. } => "loot.collected",
            Self::RouteStarted(_) => "route.started",
            Self::RoutePointAppended { .. } => "route.point_appended",
            Self::RouteStopped(_) => "route.stopped",
        }
    }

    /// Player whose action produced the event.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::PlayerRegistered { player_id, .. }
            | Self::LootCollected { player_id, .. }
            | Self::RoutePointAppended { player_id, .. } => Some(player_id),
            Self::PlayerMoved(snapshot) => Some(&snapshot.player_id),
            Self::VisitLogged { log, .. } => Some(&log.player_id),
            Self::RouteStarted(route) | Self::RouteStopped(route) => Some(&route.player_id),
            Self::SpotCreated(spot) => spot.created_by.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!(kind, "no live subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(n: usize) -> EngineEvent {
        EngineEvent::PlayerRegistered {
            player_id: format!("p{n}"),
            display_name: format!("Player {n}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        bus.publish(registered(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn lagging_subscriber_is_told_what_it_missed() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for n in 0..5 {
            bus.publish(registered(n));
        }

        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        let next = rx.try_recv().expect("oldest retained event");
        assert_eq!(next.player_id(), Some("p3"));
    }

    #[test]
    fn payload_serializes_without_variant_tag() {
        let value = serde_json::to_value(registered(7)).expect("serialize");
        assert_eq!(value["player_id"], "p7");
        assert_eq!(registered(7).kind(), "player.registered");
    }
}
