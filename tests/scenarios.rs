// scenarios.rs
//
// Whole-app scenarios stepped deterministically with a manual clock.
use std::time::Duration;

use bevy::time::TimeUpdateStrategy;
use lariat::prelude::*;

const STEP: f64 = 1.0 / 60.0;

fn test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(bevy::transform::TransformPlugin)
        .add_plugins(PhysicsPlugins::default())
        .insert_resource(Gravity(Vec2::ZERO))
        .add_plugins(CombatSimPlugin)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
            STEP,
        )));
    // Plugins with deferred setup (the physics diagnostics among them) only
    // finish when the runner would; stepping manually means doing it here.
    app.finish();
    app.cleanup();
    app
}

fn step(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}

fn with_commands<R>(app: &mut App, f: impl FnOnce(&mut Commands) -> R) -> R {
    let world = app.world_mut();
    let result = {
        let mut commands = world.commands();
        f(&mut commands)
    };
    world.flush();
    result
}

/// Config for an enemy that never notices the player, so capture tests are
/// not disturbed by chasing and attacking.
fn passive_config() -> EnemyConfig {
    EnemyConfig {
        detection_range: 0.0,
        ..Default::default()
    }
}

fn spawn_test_enemy(app: &mut App, position: Vec2, config: EnemyConfig) -> Entity {
    with_commands(app, |commands| {
        spawn_enemy(
            commands,
            position,
            config,
            PatrolRoute::Stationary,
            Health::new(50),
            Stun::default(),
            Knockback::default(),
            Capturable::default(),
            DeathPolicy::Despawn { delay: 2.0 },
        )
    })
}

#[test]
fn enemy_spots_player_and_chases() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(4.0, 1.0))
    });
    let enemy = spawn_test_enemy(&mut app, Vec2::new(0.0, 1.0), EnemyConfig::default());

    step(&mut app, 10);

    let brain = app.world().get::<EnemyBrain>(enemy).unwrap();
    assert_eq!(brain.state(), EnemyState::Chase);
}

#[test]
fn fully_stunned_enemy_does_not_move() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(3.0, 1.0))
    });
    let stunned = spawn_test_enemy(&mut app, Vec2::new(0.0, 1.0), EnemyConfig::default());
    let control = spawn_test_enemy(&mut app, Vec2::new(0.0, 4.0), EnemyConfig::default());

    app.world_mut()
        .get_mut::<Stun>(stunned)
        .unwrap()
        .set(100.0);
    step(&mut app, 5);

    let stunned_vel = app.world().get::<LinearVelocity>(stunned).unwrap();
    assert_eq!(stunned_vel.0, Vec2::ZERO);

    let control_vel = app.world().get::<LinearVelocity>(control).unwrap();
    assert!(control_vel.0.length() > 0.1, "control enemy should chase");
}

#[test]
fn capture_round_trip_restores_the_enemy() {
    let mut app = test_app();
    let player = with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let enemy = spawn_test_enemy(&mut app, Vec2::new(2.0, 1.0), passive_config());

    app.world_mut().send_event(CaptureCommand::Start(enemy));
    step(&mut app, 70);

    assert!(
        app.world().get::<CapturedObject>(enemy).is_some(),
        "capture should complete after the hold time"
    );
    assert!(app.world().get::<Capturable>(enemy).unwrap().is_captured());
    assert_eq!(app.world().get::<GravityScale>(enemy).unwrap().0, 0.0);
    let rig = app.world().get::<CaptureRig>(player).unwrap();
    assert_eq!(rig.captured, Some(enemy));

    app.world_mut().send_event(CaptureCommand::Release);
    step(&mut app, 2);

    assert!(app.world().get::<CapturedObject>(enemy).is_none());
    assert!(app.world().get::<RecentlyReleased>(enemy).is_some());
    assert!(!app.world().get::<Capturable>(enemy).unwrap().is_captured());
    assert_eq!(app.world().get::<GravityScale>(enemy).unwrap().0, 1.0);
    assert_eq!(app.world().get::<Stun>(enemy).unwrap().current(), 0.0);

    // A held body with no swing momentum still leaves at the minimum
    // release speed.
    let vel = app.world().get::<LinearVelocity>(enemy).unwrap();
    assert!(
        vel.0.length() >= 2.0 - 1e-3,
        "release speed was {}",
        vel.0.length()
    );
}

#[test]
fn stun_prefills_capture_progress() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let enemy = spawn_test_enemy(&mut app, Vec2::new(2.0, 1.0), passive_config());

    app.world_mut().get_mut::<Stun>(enemy).unwrap().set(80.0);
    app.world_mut().send_event(CaptureCommand::Start(enemy));
    step(&mut app, 30);

    assert!(
        app.world().get::<CapturedObject>(enemy).is_some(),
        "a heavily stunned enemy should be captured well before the full hold time"
    );
}

#[test]
fn enemy_attack_damages_player() {
    let mut app = test_app();
    let player = with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(1.0, 1.0))
    });
    spawn_test_enemy(&mut app, Vec2::new(0.0, 1.0), EnemyConfig::default());

    step(&mut app, 90);

    let health = app.world().get::<Health>(player).unwrap();
    assert!(
        health.current() < health.max(),
        "player should have been hit at least once"
    );
}

#[test]
fn dragging_past_the_distance_limit_breaks_the_hold() {
    let mut app = test_app();
    let player = with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let crate_entity = with_commands(&mut app, |commands| {
        spawn_box(commands, Vec2::new(1.0, 1.0))
    });

    app.world_mut()
        .send_event(CaptureCommand::Start(crate_entity));
    step(&mut app, 3);
    assert!(
        app.world().get::<CapturedObject>(crate_entity).is_some(),
        "boxes are captured instantly"
    );

    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(40.0, 1.0);
    step(&mut app, 180);

    assert!(
        app.world().get::<CapturedObject>(crate_entity).is_none(),
        "the hold should break past the distance limit"
    );
    let rig = app.world().get::<CaptureRig>(player).unwrap();
    assert_eq!(rig.captured, None);
}

#[test]
fn swinging_a_box_through_an_enemy_damages_and_shatters_it() {
    let mut app = test_app();
    let player = with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let crate_entity = with_commands(&mut app, |commands| {
        spawn_box(commands, Vec2::new(1.0, 1.0))
    });
    let enemy = spawn_test_enemy(&mut app, Vec2::new(4.0, 1.0), passive_config());

    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(1.0, 1.0);
    app.world_mut()
        .send_event(CaptureCommand::Start(crate_entity));
    step(&mut app, 3);
    assert!(app.world().get::<CapturedObject>(crate_entity).is_some());

    // Swing the box straight through the enemy.
    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(4.0, 1.0);
    step(&mut app, 90);

    let health = app.world().get::<Health>(enemy).unwrap();
    assert!(
        health.current() < health.max(),
        "the swung box should have hurt the enemy"
    );
    assert!(
        app.world().get_entity(crate_entity).is_err(),
        "the box shatters on its first damaging impact"
    );
    let rig = app.world().get::<CaptureRig>(player).unwrap();
    assert_eq!(rig.captured, None);
}

#[test]
fn held_box_survives_scraping_plain_terrain() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let crate_entity = with_commands(&mut app, |commands| {
        spawn_box(commands, Vec2::new(1.0, 1.0))
    });
    with_commands(&mut app, |commands| {
        commands
            .spawn((
                Transform::from_xyz(3.0, 1.0, 0.0),
                RigidBody::Static,
                Collider::rectangle(0.5, 4.0),
                CollisionLayers::new(GameLayer::Obstacle, LayerMask::ALL),
            ))
            .id()
    });

    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(1.0, 1.0);
    app.world_mut()
        .send_event(CaptureCommand::Start(crate_entity));
    step(&mut app, 3);
    assert!(app.world().get::<CapturedObject>(crate_entity).is_some());

    // Ram the held box into a bare wall. Walls are not damageable, so this
    // must not count as an impact.
    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(5.0, 1.0);
    step(&mut app, 90);

    assert!(
        app.world().get_entity(crate_entity).is_ok(),
        "hitting plain terrain must not shatter the held box"
    );
    assert!(
        app.world().get::<CapturedObject>(crate_entity).is_some(),
        "the hold should survive terrain contact"
    );
}

#[test]
fn thrown_enemy_hurts_what_it_lands_on() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(0.0, 1.0))
    });
    let thrown = spawn_test_enemy(&mut app, Vec2::new(2.0, 1.0), passive_config());
    let victim = spawn_test_enemy(&mut app, Vec2::new(4.0, 1.0), passive_config());

    // Hold still over the capture point so the release falls back to the
    // minimum speed along facing (+x, toward the victim).
    app.world_mut().resource_mut::<PointerTarget>().0 = Vec2::new(2.0, 1.0);
    app.world_mut().send_event(CaptureCommand::Start(thrown));
    step(&mut app, 70);
    assert!(app.world().get::<CapturedObject>(thrown).is_some());

    app.world_mut().send_event(CaptureCommand::Release);
    step(&mut app, 2);
    assert!(app.world().get::<RecentlyReleased>(thrown).is_some());

    step(&mut app, 150);

    let victim_health = app.world().get::<Health>(victim).unwrap();
    assert!(
        victim_health.current() < victim_health.max(),
        "the thrown body should damage what it lands on"
    );
    let thrown_health = app.world().get::<Health>(thrown).unwrap();
    assert!(
        thrown_health.current() < thrown_health.max(),
        "the thrown body takes the same impact damage"
    );
}

#[test]
fn lethal_damage_marks_death_and_corpse_despawns() {
    let mut app = test_app();
    with_commands(&mut app, |commands| {
        spawn_player(commands, Vec2::new(30.0, 1.0))
    });
    let enemy = spawn_test_enemy(&mut app, Vec2::new(0.0, 1.0), passive_config());

    app.world_mut().send_event(DamageEvent {
        target: enemy,
        amount: 999,
        source_pos: None,
    });
    step(&mut app, 5);

    assert!(app.world().get::<Health>(enemy).unwrap().is_dead());

    // Corpse timer is 2 seconds.
    step(&mut app, 150);
    assert!(app.world().get_entity(enemy).is_err(), "corpse despawns");
}
