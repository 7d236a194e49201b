// main.rs
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use lariat::prelude::*;

const STEP_SECS: f64 = 1.0 / 60.0;
const DEMO_RUNTIME_SECS: f32 = 14.0;

fn main() {
    env_logger::init();

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
            Duration::from_secs_f64(STEP_SECS),
        )))
        .add_plugins(bevy::transform::TransformPlugin)
        .add_plugins(PhysicsPlugins::default())
        .insert_resource(Gravity(Vec2::new(0.0, -9.81)))
        .add_plugins(EnemyArchetypePlugin::new("assets/enemies.json"))
        .add_plugins(CombatSimPlugin)
        .init_resource::<DemoClock>()
        .add_systems(Startup, setup_arena)
        .add_systems(Update, (drive_demo_script, log_combat_events))
        .run();
}

#[derive(Resource, Default)]
struct DemoClock {
    elapsed: f32,
    stage: u32,
}

#[derive(Resource)]
struct DemoHandles {
    bandit: Entity,
    crate_entity: Entity,
}

fn setup_arena(mut commands: Commands, library: Res<ArchetypeLibrary>) {
    // Ground and a wall the bat has to see around.
    commands.spawn((
        Transform::from_xyz(0.0, -0.5, 0.0),
        RigidBody::Static,
        Collider::rectangle(60.0, 1.0),
        CollisionLayers::new(GameLayer::Obstacle, LayerMask::ALL),
    ));
    commands.spawn((
        Transform::from_xyz(-3.0, 2.0, 0.0),
        RigidBody::Static,
        Collider::rectangle(0.5, 4.0),
        CollisionLayers::new(GameLayer::Obstacle, LayerMask::ALL),
    ));

    spawn_player(&mut commands, Vec2::new(0.0, 1.0));

    let bandit_arch = library
        .get("bandit")
        .expect("bandit archetype missing from assets/enemies.json");
    let bandit = spawn_enemy(
        &mut commands,
        Vec2::new(5.0, 1.0),
        bandit_arch.config(),
        PatrolRoute::waypoints(vec![Vec2::new(4.0, 1.0), Vec2::new(9.0, 1.0)], false),
        bandit_arch.health(),
        bandit_arch.stun(),
        bandit_arch.knockback(),
        bandit_arch.capturable(),
        bandit_arch.death_policy(),
    );

    let bat_arch = library
        .get("evil_bat")
        .expect("evil_bat archetype missing from assets/enemies.json");
    spawn_enemy(
        &mut commands,
        Vec2::new(-6.0, 4.0),
        bat_arch.config(),
        PatrolRoute::radius(Vec2::new(-6.0, 4.0), 3.0),
        bat_arch.health(),
        bat_arch.stun(),
        bat_arch.knockback(),
        bat_arch.capturable(),
        bat_arch.death_policy(),
    );

    let dummy_arch = library
        .get("dummy")
        .expect("dummy archetype missing from assets/enemies.json");
    spawn_enemy(
        &mut commands,
        Vec2::new(12.0, 1.0),
        dummy_arch.config(),
        PatrolRoute::Stationary,
        dummy_arch.health(),
        dummy_arch.stun(),
        dummy_arch.knockback(),
        dummy_arch.capturable(),
        dummy_arch.death_policy(),
    );

    let crate_entity = spawn_box(&mut commands, Vec2::new(1.5, 1.0));

    commands.insert_resource(DemoHandles {
        bandit,
        crate_entity,
    });
}

/// Scripted stand-in for player input: grab the crate, swing it, throw it,
/// then soften up the bandit with stun and capture it.
#[allow(clippy::too_many_arguments)]
fn drive_demo_script(
    time: Res<Time>,
    mut clock: ResMut<DemoClock>,
    handles: Option<Res<DemoHandles>>,
    players: Query<&Transform, With<Player>>,
    mut pointer: ResMut<PointerTarget>,
    mut capture_commands: EventWriter<CaptureCommand>,
    mut stun_events: EventWriter<StunEvent>,
    mut exit: EventWriter<AppExit>,
) {
    let Some(handles) = handles else {
        return;
    };
    let Ok(player_tf) = players.single() else {
        return;
    };
    clock.elapsed += time.delta_secs();
    let t = clock.elapsed;

    // Whirl the pointer around the player; anything held chases it.
    let player_pos = player_tf.translation.truncate();
    pointer.0 = player_pos + Vec2::from_angle(t * 4.0) * 2.5;

    match clock.stage {
        0 if t >= 1.0 => {
            info!("demo: grabbing the crate");
            capture_commands.write(CaptureCommand::Start(handles.crate_entity));
            clock.stage = 1;
        }
        1 if t >= 3.5 => {
            info!("demo: throwing");
            capture_commands.write(CaptureCommand::Release);
            clock.stage = 2;
        }
        2 if t >= 5.0 => {
            info!("demo: stunning the bandit");
            stun_events.write(StunEvent {
                target: handles.bandit,
                amount: 70.0,
            });
            clock.stage = 3;
        }
        3 if t >= 5.5 => {
            info!("demo: capturing the bandit");
            capture_commands.write(CaptureCommand::Start(handles.bandit));
            clock.stage = 4;
        }
        4 if t >= 9.0 => {
            info!("demo: hurling the bandit");
            capture_commands.write(CaptureCommand::Release);
            clock.stage = 5;
        }
        5 if t >= DEMO_RUNTIME_SECS => {
            info!("demo: done");
            exit.write(AppExit::Success);
            clock.stage = 6;
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn log_combat_events(
    mut started: EventReader<CaptureStarted>,
    mut completed: EventReader<CaptureCompleted>,
    mut released: EventReader<CaptureReleased>,
    mut attacks: EventReader<AttackLanded>,
    mut deaths: EventReader<Died>,
    mut boxes: EventReader<BoxDestroyed>,
    mut impacts: EventReader<ImpactFrameEvent>,
) {
    for ev in started.read() {
        info!("capture started on {:?}", ev.entity);
    }
    for ev in completed.read() {
        info!("capture completed on {:?}", ev.entity);
    }
    for ev in released.read() {
        info!("released {:?} at {:?}", ev.entity, ev.velocity);
    }
    for ev in attacks.read() {
        info!("{:?} hit {:?} for {}", ev.enemy, ev.target, ev.damage);
    }
    for ev in deaths.read() {
        info!("{:?} died", ev.entity);
    }
    for ev in boxes.read() {
        info!("box {:?} destroyed", ev.entity);
    }
    for ev in impacts.read() {
        info!("impact frame at {:.1} m/s", ev.speed);
    }
}
