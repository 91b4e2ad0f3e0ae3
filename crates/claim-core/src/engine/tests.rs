use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use contracts::{
    EngineConfig, Identity, ItemReward, LogType, LootClaim, NewPlayer, NewSpot, PlayerMode,
    PlayerRole, Position, RouteState,
};

use super::*;
use crate::clock::ManualClock;

const EPS: f64 = 1e-9;

fn engine_with_clock() -> (ClaimEngine, Arc<ManualClock>) {
    let start = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid start");
    let clock = Arc::new(ManualClock::new(start));
    let engine = ClaimEngine::with_clock(EngineConfig::default(), clock.clone());
    (engine, clock)
}

fn player(engine: &ClaimEngine, role: PlayerRole) -> Player {
    engine
        .register_player(NewPlayer {
            role: Some(role),
            ..NewPlayer::default()
        })
        .expect("register player")
}

fn spot(engine: &ClaimEngine, base_xp: u64, auto_xp: u64) -> Spot {
    let admin = player(engine, PlayerRole::Admin);
    engine
        .create_spot(
            &admin.identity(),
            NewSpot {
                name: "Fountain".to_string(),
                description: String::new(),
                position: Position::new(52.52, 13.405),
                base_xp: Some(base_xp),
                auto_xp: Some(auto_xp),
            },
        )
        .expect("create spot")
}

#[test]
fn manual_log_at_zero_meters_grants_base_xp_and_two_points() {
    let (engine, _) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    let outcome = engine
        .manual_log(&target.id, &visitor.id, Some(0.0), Some("hello".to_string()))
        .expect("manual log");

    assert_eq!(outcome.xp_gained, 20);
    assert!((outcome.claim_points_gained - 2.0).abs() < EPS);
    assert_eq!(outcome.log.log_type, LogType::Manual);
    assert_eq!(outcome.log.note.as_deref(), Some("hello"));
    assert_eq!(outcome.updated_player.stats.total_xp, 20);
    assert_eq!(outcome.updated_player.stats.xp_to_next_level, 80);
    assert!((outcome.updated_spot_claim_info.total_claim_points - 2.0).abs() < EPS);
    assert_eq!(engine.list_logs().len(), 1);
}

#[test]
fn auto_log_at_zero_meters_grants_auto_xp_and_one_point() {
    let (engine, _) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    let outcome = engine
        .auto_log(&target.id, &visitor.id, Some(0.0))
        .expect("auto log");

    assert_eq!(outcome.xp_gained, 5);
    assert!((outcome.claim_points_gained - 1.0).abs() < EPS);
    assert_eq!(outcome.log.log_type, LogType::Auto);
    assert!(outcome.updated_player.last_auto_log_at.contains_key(&target.id));
}

#[test]
fn second_auto_log_inside_window_changes_nothing() {
    let (engine, clock) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    engine
        .auto_log(&target.id, &visitor.id, Some(2.0))
        .expect("first auto log");
    let player_before = engine.get_player(&visitor.id).expect("player");
    let spot_before = engine.get_spot(&target.id).expect("spot");

    clock.advance(Duration::minutes(4));
    let err = engine
        .auto_log(&target.id, &visitor.id, Some(0.0))
        .expect_err("cooldown");
    assert!(matches!(err, EngineError::CooldownActive { .. }));
    assert!(err.is_retryable());

    assert_eq!(engine.get_player(&visitor.id).expect("player"), player_before);
    assert_eq!(engine.get_spot(&target.id).expect("spot"), spot_before);
    assert_eq!(engine.list_logs().len(), 1);

    clock.advance(Duration::minutes(1));
    engine
        .auto_log(&target.id, &visitor.id, Some(0.0))
        .expect("allowed after five minutes");
}

#[test]
fn manual_logs_ignore_the_auto_cooldown() {
    let (engine, _) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    engine.auto_log(&target.id, &visitor.id, None).expect("auto");
    engine
        .manual_log(&target.id, &visitor.id, Some(10.0), None)
        .expect("manual");
    engine
        .manual_log(&target.id, &visitor.id, Some(10.0), None)
        .expect("manual again");
    assert_eq!(engine.logs_for_spot(&target.id).len(), 3);
}

#[test]
fn unknown_spot_or_player_is_not_found() {
    let (engine, _) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    let missing_spot = engine.manual_log("nope", &visitor.id, None, None);
    assert!(matches!(
        missing_spot,
        Err(EngineError::NotFound {
            kind: EntityKind::Spot,
            ..
        })
    ));
    let missing_player = engine.auto_log(&target.id, "ghost", None);
    assert!(matches!(
        missing_player,
        Err(EngineError::NotFound {
            kind: EntityKind::Player,
            ..
        })
    ));
}

#[test]
fn negative_distance_is_rejected_before_any_grant() {
    let (engine, _) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);

    let err = engine
        .auto_log(&target.id, &visitor.id, Some(-3.0))
        .expect_err("negative distance");
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let fresh = engine.get_player(&visitor.id).expect("player");
    assert!(fresh.last_auto_log_at.is_empty());
}

#[test]
fn only_admins_and_creators_create_spots() {
    let (engine, _) = engine_with_clock();
    let plain = player(&engine, PlayerRole::Player);
    let creator = player(&engine, PlayerRole::Creator);
    let request = NewSpot {
        name: "Bridge".to_string(),
        description: "Old bridge".to_string(),
        position: Position::new(48.85, 2.35),
        base_xp: None,
        auto_xp: None,
    };

    let err = engine
        .create_spot(&plain.identity(), request.clone())
        .expect_err("player role");
    assert!(matches!(err, EngineError::Forbidden(_)));

    let created = engine
        .create_spot(&creator.identity(), request)
        .expect("creator role");
    assert_eq!(created.base_xp, 20);
    assert_eq!(created.auto_xp, 5);
    assert_eq!(created.created_by.as_deref(), Some(creator.id.as_str()));
}

#[test]
fn heatmap_lists_only_claimed_spots_with_current_share() {
    let (engine, _) = engine_with_clock();
    let claimed = spot(&engine, 20, 5);
    let untouched = spot(&engine, 20, 5);
    let alice = player(&engine, PlayerRole::Player);
    let bob = player(&engine, PlayerRole::Player);

    engine
        .manual_log(&claimed.id, &alice.id, Some(0.0), None)
        .expect("alice");
    engine
        .manual_log(&claimed.id, &bob.id, Some(100.0), None)
        .expect("bob");

    let heatmap = engine.heatmap_for(&alice.id).expect("heatmap");
    assert_eq!(heatmap.len(), 1);
    assert_eq!(heatmap[0].spot_id, claimed.id);
    assert!((heatmap[0].player_claim_points - 2.0).abs() < EPS);
    assert!((heatmap[0].claim_share - 2.0 / 3.0).abs() < EPS);
    assert!(heatmap.iter().all(|entry| entry.spot_id != untouched.id));

    assert!(engine.heatmap_for("ghost").is_err());
}

#[test]
fn nearby_players_excludes_unknown_positions_and_far_players() {
    let (engine, _) = engine_with_clock();
    let near = player(&engine, PlayerRole::Player);
    let far = player(&engine, PlayerRole::Player);
    let _silent = player(&engine, PlayerRole::Player);

    engine
        .update_position(&near.id, Position::new(52.5201, 13.4051))
        .expect("near");
    engine
        .update_position(&far.id, Position::new(48.1351, 11.582))
        .expect("far");

    let found = engine
        .query_nearby_players(Position::new(52.52, 13.405), 500.0)
        .expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].player_id, near.id);
    assert_eq!(engine.live_players().len(), 2);
}

#[test]
fn position_updates_are_broadcast_in_submission_order() {
    let (engine, _) = engine_with_clock();
    let walker = player(&engine, PlayerRole::Player);
    let mut rx = engine.subscribe();

    for step in 0..5 {
        let position = Position::new(52.52 + f64::from(step) * 0.0001, 13.405);
        engine
            .update_position(&walker.id, position)
            .expect("update position");
    }

    for step in 0..5 {
        match rx.try_recv().expect("event delivered") {
            EngineEvent::PlayerMoved(snapshot) => {
                let expected = 52.52 + f64::from(step) * 0.0001;
                assert!((snapshot.position.latitude - expected).abs() < EPS);
            }
            other => panic!("unexpected event {}", other.kind()),
        }
    }
}

#[test]
fn every_subscriber_sees_the_move_including_the_mover() {
    let (engine, _) = engine_with_clock();
    let walker = player(&engine, PlayerRole::Player);
    let mut mover_rx = engine.subscribe();
    let mut watcher_rx = engine.subscribe();
    assert_eq!(engine.bus().subscriber_count(), 2);

    engine
        .update_position(&walker.id, Position::new(52.5, 13.4))
        .expect("update position");

    for rx in [&mut mover_rx, &mut watcher_rx] {
        match rx.try_recv().expect("event delivered") {
            EngineEvent::PlayerMoved(snapshot) => assert_eq!(snapshot.player_id, walker.id),
            other => panic!("unexpected event {}", other.kind()),
        }
    }
}

#[test]
fn position_update_for_unknown_player_fails_without_broadcast() {
    let (engine, _) = engine_with_clock();
    let mut rx = engine.subscribe();
    let err = engine
        .update_position("ghost", Position::new(0.0, 0.0))
        .expect_err("unknown");
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert!(rx.try_recv().is_err());
}

#[test]
fn loot_credits_xp_count_and_inventory_and_double_credits_duplicates() {
    let (engine, _) = engine_with_clock();
    let finder = player(&engine, PlayerRole::Player);
    let claim = LootClaim {
        loot_id: "loot-7".to_string(),
        xp_reward: Some(15),
        item_reward: Some(ItemReward {
            name: "Gem".to_string(),
            quantity: Some(2),
            description: Some("Shiny".to_string()),
        }),
        distance: Some(4.0),
    };

    engine.credit_loot(&finder.id, claim.clone()).expect("first");
    let outcome = engine.credit_loot(&finder.id, claim).expect("duplicate");

    let stats = &outcome.updated_player.stats;
    assert_eq!(stats.total_xp, 30);
    assert_eq!(stats.collected_loot_count, 2);
    assert_eq!(outcome.updated_player.inventory.quantity_of("Gem"), 4);
    assert_eq!(
        outcome.updated_player.inventory.items["Gem"].description,
        "Shiny"
    );
}

#[test]
fn loot_without_positive_xp_is_an_invalid_reward() {
    let (engine, _) = engine_with_clock();
    let finder = player(&engine, PlayerRole::Player);
    for xp_reward in [None, Some(0), Some(-5)] {
        let err = engine
            .credit_loot(
                &finder.id,
                LootClaim {
                    loot_id: "loot-1".to_string(),
                    xp_reward,
                    item_reward: None,
                    distance: None,
                },
            )
            .expect_err("invalid reward");
        assert!(matches!(err, EngineError::InvalidReward(_)));
    }
    assert_eq!(engine.get_player(&finder.id).expect("player").stats.total_xp, 0);

    let missing = engine.credit_loot(
        "ghost",
        LootClaim {
            loot_id: "loot-1".to_string(),
            xp_reward: Some(10),
            item_reward: None,
            distance: None,
        },
    );
    assert!(matches!(missing, Err(EngineError::NotFound { .. })));
}

#[test]
fn route_lifecycle_rejects_points_after_stop() {
    let (engine, clock) = engine_with_clock();
    let runner = player(&engine, PlayerRole::Player);

    let route = engine.start_route(&runner.identity()).expect("start");
    assert_eq!(route.state(), RouteState::Active);
    engine
        .append_route_point(&route.id, Position::new(52.52, 13.405), None)
        .expect("first point");
    clock.advance(Duration::seconds(30));
    let count = engine
        .append_route_point(&route.id, Position::new(52.521, 13.406), None)
        .expect("second point");
    assert_eq!(count, 2);

    let stopped = engine.stop_route(&route.id).expect("stop");
    assert_eq!(stopped.state(), RouteState::Stopped);
    assert_eq!(stopped.ended_at, Some(clock.now()));

    let err = engine
        .append_route_point(&route.id, Position::new(52.522, 13.407), None)
        .expect_err("stopped route");
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(engine.get_route(&route.id).expect("route").points.len(), 2);
    assert!(matches!(
        engine.stop_route(&route.id),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        engine.append_route_point("missing", Position::new(0.0, 0.0), None),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn guests_cannot_start_routes() {
    let (engine, _) = engine_with_clock();
    let guest = engine
        .register_player(NewPlayer {
            mode: Some(PlayerMode::Guest),
            ..NewPlayer::default()
        })
        .expect("guest");
    let err = engine.start_route(&guest.identity()).expect_err("guest");
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let phantom = Identity {
        player_id: "ghost".to_string(),
        role: PlayerRole::Player,
        display_name: "Ghost".to_string(),
        mode: PlayerMode::LoggedIn,
    };
    assert!(matches!(
        engine.start_route(&phantom),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn multiple_active_routes_are_allowed_unless_sealing_is_configured() {
    let (engine, _) = engine_with_clock();
    let runner = player(&engine, PlayerRole::Player);
    engine.start_route(&runner.identity()).expect("first");
    engine.start_route(&runner.identity()).expect("second");
    let routes = engine.list_routes(&runner.id).expect("routes");
    assert_eq!(routes.len(), 2);
    assert!(routes.iter().all(|route| route.state() == RouteState::Active));

    let config = EngineConfig {
        seal_previous_route_on_start: true,
        ..EngineConfig::default()
    };
    let sealing = ClaimEngine::new(config);
    let runner = player(&sealing, PlayerRole::Player);
    let first = sealing.start_route(&runner.identity()).expect("first");
    let second = sealing.start_route(&runner.identity()).expect("second");
    assert_eq!(
        sealing.get_route(&first.id).expect("first").state(),
        RouteState::Stopped
    );
    assert_eq!(
        sealing.get_route(&second.id).expect("second").state(),
        RouteState::Active
    );
}

#[test]
fn snapshot_round_trip_preserves_ledgers() {
    let (engine, clock) = engine_with_clock();
    let target = spot(&engine, 20, 5);
    let visitor = player(&engine, PlayerRole::Player);
    engine
        .manual_log(&target.id, &visitor.id, Some(30.0), None)
        .expect("manual");
    engine.auto_log(&target.id, &visitor.id, Some(3.0)).expect("auto");

    let snapshot = engine.snapshot();
    let restored =
        ClaimEngine::from_snapshot(EngineConfig::default(), clock.clone(), snapshot.clone());

    assert_eq!(restored.snapshot().players, snapshot.players);
    assert_eq!(
        restored.get_spot(&target.id).expect("spot"),
        engine.get_spot(&target.id).expect("spot")
    );
    assert_eq!(restored.list_logs().len(), 2);

    let err = restored
        .auto_log(&target.id, &visitor.id, None)
        .expect_err("cooldown survives restore");
    assert!(matches!(err, EngineError::CooldownActive { .. }));
}

#[test]
fn demo_seed_only_applies_to_an_empty_engine() {
    let (engine, _) = engine_with_clock();
    assert!(engine.seed_demo_data().expect("seed"));
    assert!(!engine.seed_demo_data().expect("second seed"));
    assert_eq!(engine.list_spots().len(), 2);
    let admin = engine.identity_for(DEMO_ADMIN_ID).expect("admin");
    assert!(admin.is_admin());
}
