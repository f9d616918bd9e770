//! End-to-end wiring through the reference scene.
//!
//! Tests cover: the GameManager/Player case, at-most-once connection,
//! order independence, coalescing of entry bursts, multiple emitters,
//! and declaration diagnostics.

use autowire_core::{
    config::RegistryConfig,
    connection::ConnectionKey,
    declaration::{EntityKind, KindTable, SubscriptionDecl},
    engine::WiringEngine,
    event::RegistryEvent,
    scene::SceneTree,
};

fn kinds() -> KindTable {
    [
        EntityKind::new("GameManager").with_signal("score_updated"),
        EntityKind::new("Player").with_subscription(SubscriptionDecl::new(
            "score_updated",
            "/root/GameManager",
            "on_score_updated",
        )),
        EntityKind::new("Hud").with_subscription(SubscriptionDecl::any("score_updated", "on_any_score")),
        EntityKind::new("Prop"),
    ]
    .into_iter()
    .collect()
}

fn setup() -> (WiringEngine, SceneTree) {
    let mut scene = SceneTree::new("root", kinds());
    let engine = WiringEngine::attach(RegistryConfig::default_test(), &mut scene).expect("attach engine");
    (engine, scene)
}

fn player_key() -> ConnectionKey {
    ConnectionKey::new("/root/GameManager", "score_updated", "/root/Player", "on_score_updated")
}

/// Subscriber enters before the emitter; the handler still gets connected.
#[test]
fn player_receives_score_updates() {
    let (mut engine, mut scene) = setup();
    let root = scene.root();
    let player = scene.add_child(root, "Player", "Player").unwrap();
    let gm = scene.add_child(root, "GameManager", "GameManager").unwrap();

    engine.tick(&mut scene).unwrap();

    assert!(engine.resolver().is_connected(&player_key()));
    assert!(scene.is_wired(gm, "score_updated", player, "on_score_updated"));

    let deliveries = scene.emit(gm, "score_updated");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].subscriber, player);
    assert_eq!(deliveries[0].subscriber_path.as_deref(), Some("/root/Player"));
    assert_eq!(deliveries[0].handler, "on_score_updated");
}

#[test]
fn connection_is_made_at_most_once() {
    let (mut engine, mut scene) = setup();
    let root = scene.root();
    scene.add_child(root, "GameManager", "GameManager").unwrap();
    scene.add_child(root, "Player", "Player").unwrap();
    engine.tick(&mut scene).unwrap();

    // Unrelated churn keeps triggering passes.
    for i in 0..5 {
        let prop = scene.add_child(root, &format!("Prop{i}"), "Prop").unwrap();
        engine.tick(&mut scene).unwrap();
        scene.remove(prop).unwrap();
        engine.tick(&mut scene).unwrap();
    }

    assert!(engine.reconcile_passes() >= 11);
    assert_eq!(
        scene.connects_for("/root/GameManager", "score_updated", "/root/Player", "on_score_updated"),
        1
    );
    assert_eq!(scene.connection_count(), 1);
}

#[test]
fn entry_order_does_not_change_outcome() {
    let (mut engine_a, mut scene_a) = setup();
    let root = scene_a.root();
    scene_a.add_child(root, "GameManager", "GameManager").unwrap();
    scene_a.add_child(root, "Player", "Player").unwrap();
    scene_a.add_child(root, "Hud", "Hud").unwrap();
    engine_a.tick(&mut scene_a).unwrap();

    let (mut engine_b, mut scene_b) = setup();
    let root = scene_b.root();
    scene_b.add_child(root, "Hud", "Hud").unwrap();
    scene_b.add_child(root, "Player", "Player").unwrap();
    engine_b.tick(&mut scene_b).unwrap();
    scene_b.add_child(root, "GameManager", "GameManager").unwrap();
    engine_b.tick(&mut scene_b).unwrap();

    let mut keys_a = engine_a.snapshot().connected;
    let mut keys_b = engine_b.snapshot().connected;
    keys_a.sort();
    keys_b.sort();
    assert_eq!(keys_a, keys_b);
    assert_eq!(keys_a.len(), 2);
}

#[test]
fn entry_burst_runs_one_pass() {
    let (mut engine, mut scene) = setup();
    engine.tick(&mut scene).unwrap();
    let passes_before = engine.reconcile_passes();

    let root = scene.root();
    scene.add_child(root, "GameManager", "GameManager").unwrap();
    for i in 0..10 {
        scene.add_child(root, &format!("Hud{i}"), "Hud").unwrap();
    }
    let events = engine.tick(&mut scene).unwrap();

    assert_eq!(engine.reconcile_passes(), passes_before + 1);
    let scheduled = events
        .iter()
        .filter(|e| matches!(e, RegistryEvent::ReconcileScheduled { .. }))
        .count();
    let coalesced = events
        .iter()
        .filter(|e| matches!(e, RegistryEvent::ReconcileCoalesced { .. }))
        .count();
    assert_eq!(scheduled, 1);
    assert_eq!(coalesced, 10);
    assert_eq!(engine.snapshot().connected.len(), 10);
}

#[test]
fn quiet_ticks_do_not_reconcile() {
    let (mut engine, mut scene) = setup();
    engine.tick(&mut scene).unwrap();
    let passes = engine.reconcile_passes();

    engine.run_ticks(&mut scene, 20).unwrap();
    assert_eq!(engine.reconcile_passes(), passes);
}

#[test]
fn wildcard_subscription_connects_to_every_emitter() {
    let (mut engine, mut scene) = setup();
    let root = scene.root();
    let gm = scene.add_child(root, "GameManager", "GameManager").unwrap();
    let arena = scene.add_child(root, "Arena", "Prop").unwrap();
    let side = scene.add_child(arena, "SideManager", "GameManager").unwrap();
    let hud = scene.add_child(root, "Hud", "Hud").unwrap();
    let player = scene.add_child(root, "Player", "Player").unwrap();
    engine.tick(&mut scene).unwrap();

    assert!(scene.is_wired(gm, "score_updated", hud, "on_any_score"));
    assert!(scene.is_wired(side, "score_updated", hud, "on_any_score"));
    assert!(scene.is_wired(gm, "score_updated", player, "on_score_updated"));
    assert!(!scene.is_wired(side, "score_updated", player, "on_score_updated"));
    assert_eq!(scene.emit(side, "score_updated").len(), 1);
    assert_eq!(scene.emit(gm, "score_updated").len(), 2);
}

#[test]
fn duplicate_declarations_collapse_to_one_connection() {
    let mut table = kinds();
    table.register(
        EntityKind::new("Echo")
            .with_subscription(SubscriptionDecl::any("score_updated", "on_score"))
            .with_subscription(SubscriptionDecl::any("score_updated", "on_score")),
    );
    let mut scene = SceneTree::new("root", table);
    let mut engine = WiringEngine::attach(RegistryConfig::default_test(), &mut scene).unwrap();
    let root = scene.root();
    scene.add_child(root, "GameManager", "GameManager").unwrap();
    scene.add_child(root, "Echo", "Echo").unwrap();

    let events = engine.tick(&mut scene).unwrap();

    assert!(events.iter().any(|e| matches!(
        e,
        RegistryEvent::DuplicateDeclarationIgnored { subscriber_path, handler, .. }
            if subscriber_path == "/root/Echo" && handler == "on_score"
    )));
    assert_eq!(scene.connects_for("/root/GameManager", "score_updated", "/root/Echo", "on_score"), 1);
}

#[test]
fn malformed_filter_warns_once_and_never_matches_a_path() {
    let mut table = kinds();
    table.register(EntityKind::new("Sloppy").with_subscription(SubscriptionDecl::new(
        "score_updated",
        "root/GameManager",
        "on_score",
    )));
    let mut scene = SceneTree::new("root", table);
    let mut engine = WiringEngine::attach(RegistryConfig::default_test(), &mut scene).unwrap();
    let root = scene.root();
    scene.add_child(root, "GameManager", "GameManager").unwrap();

    let mut warnings = 0;
    for _ in 0..3 {
        let sloppy = scene.add_child(root, "Sloppy", "Sloppy").unwrap();
        let events = engine.tick(&mut scene).unwrap();
        warnings += events
            .iter()
            .filter(|e| matches!(e, RegistryEvent::PathFilterWarning { .. }))
            .count();
        scene.remove(sloppy).unwrap();
        engine.tick(&mut scene).unwrap();
    }

    assert_eq!(warnings, 1);
    assert!(engine.snapshot().connected.is_empty());
}

#[test]
fn entities_present_before_attach_are_wired_on_first_tick() {
    let mut scene = SceneTree::new("root", kinds());
    let root = scene.root();
    let gm = scene.add_child(root, "GameManager", "GameManager").unwrap();
    let player = scene.add_child(root, "Player", "Player").unwrap();

    let mut engine = WiringEngine::attach(RegistryConfig::default_test(), &mut scene).unwrap();
    assert!(!scene.is_wired(gm, "score_updated", player, "on_score_updated"));

    engine.tick(&mut scene).unwrap();
    assert!(scene.is_wired(gm, "score_updated", player, "on_score_updated"));
    assert_eq!(engine.reconcile_passes(), 1);
}

/// Churned subscribers at ever-new paths share one warning per declaration.
#[test]
fn malformed_filter_warning_does_not_repeat_per_path() {
    let mut table = kinds();
    table.register(EntityKind::new("Sloppy").with_subscription(SubscriptionDecl::new(
        "score_updated",
        "root/GameManager",
        "on_score",
    )));
    let mut scene = SceneTree::new("root", table);
    let mut engine = WiringEngine::attach(RegistryConfig::default_test(), &mut scene).unwrap();
    let root = scene.root();

    let mut warnings = 0;
    for i in 0..5 {
        let sloppy = scene.add_child(root, &format!("Sloppy{i}"), "Sloppy").unwrap();
        let events = engine.tick(&mut scene).unwrap();
        warnings += events
            .iter()
            .filter(|e| matches!(e, RegistryEvent::PathFilterWarning { .. }))
            .count();
        scene.remove(sloppy).unwrap();
        engine.tick(&mut scene).unwrap();
    }

    assert_eq!(warnings, 1);
}

#[test]
fn event_log_is_trimmed_to_capacity() {
    let config = RegistryConfig {
        event_log_capacity: Some(16),
        ..RegistryConfig::default_test()
    };
    let mut scene = SceneTree::new("root", kinds());
    let mut engine = WiringEngine::attach(config, &mut scene).unwrap();
    let root = scene.root();
    for i in 0..10 {
        scene.add_child(root, &format!("Prop{i}"), "Prop").unwrap();
        engine.tick(&mut scene).unwrap();
    }

    assert_eq!(engine.event_log().count(), 16);
    // Oldest entries go first; the last tick is still complete.
    assert!(engine.events_for_tick(0).is_empty());
    let last = engine.events_for_tick(engine.current_tick());
    assert_eq!(last.last().map(|e| e.event_type.as_str()), Some("tick_completed"));
}
