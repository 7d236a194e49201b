// enemy.rs
use avian2d::prelude::*;
use bevy::prelude::*;
use log::{debug, info};
use rand::Rng;

use crate::capture::Capturable;
use crate::captured::{CapturedObject, RecentlyReleased};
use crate::health::{DamageEvent, Died, Health};
use crate::knockback::Knockback;
use crate::physics::{obstacle_filter, player_filter, Facing, GameLayer};
use crate::player::Player;
use crate::sets::{ResolveSet, SimSet};
use crate::stun::Stun;

// ====== TUNING ======
const HOVER_BOB_FREQUENCY: f32 = 2.0;
const HOVER_BOB_AMPLITUDE: f32 = 0.5;
const RADIUS_TARGET_MIN_FRACTION: f32 = 0.3;

#[derive(Component, Default)]
pub struct Enemy;

/// Per-archetype behavior tuning. Loaded from the archetype file for spawned
/// enemies; the defaults describe a generic grounded patroller.
#[derive(Component, Clone, Debug)]
pub struct EnemyConfig {
    pub patrol_speed: f32,
    pub patrol_wait_time: f32,
    pub waypoint_reach_distance: f32,
    pub detection_range: f32,
    pub chase_speed: f32,
    pub lose_target_distance: f32,
    pub attack_range: f32,
    pub attack_cooldown: f32,
    pub attack_damage: i32,
    pub attack_windup_time: f32,
    pub attack_radius: f32,
    pub attack_offset: f32,
    pub requires_line_of_sight: bool,
    pub vision_check_interval: f32,
    pub lose_line_of_sight_delay: f32,
    pub flying: bool,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            patrol_speed: 2.0,
            patrol_wait_time: 2.0,
            waypoint_reach_distance: 0.2,
            detection_range: 5.0,
            chase_speed: 4.0,
            lose_target_distance: 8.0,
            attack_range: 1.5,
            attack_cooldown: 1.5,
            attack_damage: 10,
            attack_windup_time: 0.3,
            attack_radius: 1.0,
            attack_offset: 0.75,
            requires_line_of_sight: false,
            vision_check_interval: 0.2,
            lose_line_of_sight_delay: 1.0,
            flying: false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EnemyState {
    #[default]
    Patrol,
    Chase,
    Attack,
    Waiting,
}

/// Behavior state machine. One state at a time; timers belong to the state
/// that uses them and are armed on entry.
#[derive(Component, Debug, Default)]
pub struct EnemyBrain {
    state: EnemyState,
    pub wait_timer: f32,
    pub attack_cooldown_timer: f32,
    pub windup_timer: f32,
}

impl EnemyBrain {
    pub fn state(&self) -> EnemyState {
        self.state
    }

    /// Idempotent: re-entering the current state leaves its timers alone.
    pub fn change_state(&mut self, next: EnemyState, config: &EnemyConfig) -> bool {
        if self.state == next {
            return false;
        }
        self.state = next;
        match next {
            EnemyState::Waiting => self.wait_timer = config.patrol_wait_time,
            EnemyState::Attack => self.windup_timer = config.attack_windup_time,
            _ => {}
        }
        true
    }

    fn reset(&mut self) {
        self.state = EnemyState::Patrol;
        self.wait_timer = 0.0;
        self.attack_cooldown_timer = 0.0;
        self.windup_timer = 0.0;
    }
}

/// Where an enemy goes when nothing is worth chasing. Grounded enemies walk
/// waypoint lists; fliers pick random points inside a home radius; dummies
/// stand still.
#[derive(Component, Debug, Clone)]
pub enum PatrolRoute {
    Waypoints {
        points: Vec<Vec2>,
        loop_route: bool,
        index: usize,
        forward: bool,
    },
    Radius {
        center: Vec2,
        radius: f32,
        target: Vec2,
        max_path_attempts: u32,
        bob_phase: f32,
    },
    Stationary,
}

impl PatrolRoute {
    pub fn waypoints(points: Vec<Vec2>, loop_route: bool) -> Self {
        Self::Waypoints {
            points,
            loop_route,
            index: 0,
            forward: true,
        }
    }

    pub fn radius(center: Vec2, radius: f32) -> Self {
        Self::Radius {
            center,
            radius,
            target: center,
            max_path_attempts: 8,
            bob_phase: 0.0,
        }
    }

    pub fn current_target(&self) -> Option<Vec2> {
        match self {
            Self::Waypoints { points, index, .. } => points.get(*index).copied(),
            Self::Radius { target, .. } => Some(*target),
            Self::Stationary => None,
        }
    }

    /// Steps to the next patrol destination. Waypoint routes either wrap or
    /// ping-pong; radius routes roll a fresh reachable point, keeping the
    /// last candidate if every attempt was blocked.
    pub fn advance(&mut self, rng: &mut impl Rng, spatial: Option<&SpatialQuery>, from: Vec2) {
        match self {
            Self::Waypoints {
                points,
                loop_route,
                index,
                forward,
            } => {
                if points.len() < 2 {
                    return;
                }
                if *loop_route {
                    *index = (*index + 1) % points.len();
                } else {
                    if *forward {
                        if *index + 1 >= points.len() {
                            *forward = false;
                            *index -= 1;
                        } else {
                            *index += 1;
                        }
                    } else if *index == 0 {
                        *forward = true;
                        *index = 1;
                    } else {
                        *index -= 1;
                    }
                }
            }
            Self::Radius {
                center,
                radius,
                target,
                max_path_attempts,
                ..
            } => {
                let mut candidate = *center;
                for _ in 0..*max_path_attempts {
                    let angle = rng.random_range(0.0..std::f32::consts::TAU);
                    let distance =
                        rng.random_range(RADIUS_TARGET_MIN_FRACTION * *radius..=*radius);
                    candidate = *center + Vec2::from_angle(angle) * distance;

                    let Some(spatial) = spatial else {
                        break;
                    };
                    let to_candidate = candidate - from;
                    let Ok(dir) = Dir2::new(to_candidate) else {
                        break;
                    };
                    let blocked = spatial
                        .cast_ray(from, dir, to_candidate.length(), true, &obstacle_filter())
                        .is_some();
                    if !blocked {
                        break;
                    }
                }
                *target = candidate;
            }
            Self::Stationary => {}
        }
    }
}

/// What the enemy currently knows about the player, refreshed ahead of the
/// behavior step so every state reads one consistent picture.
#[derive(Component, Debug, Default)]
pub struct EnemySenses {
    pub target: Option<Entity>,
    pub target_pos: Vec2,
    pub distance: f32,
    pub has_los: bool,
    pub time_since_los: f32,
    vision_timer: f32,
}

impl EnemySenses {
    pub fn sees_target_within(&self, range: f32, requires_los: bool) -> bool {
        self.target.is_some() && self.distance <= range && (self.has_los || !requires_los)
    }
}

/// What happens to a dead enemy once its corpse timer runs out.
#[derive(Component, Clone, Copy, Debug)]
pub enum DeathPolicy {
    Despawn { delay: f32 },
    Revive { delay: f32 },
}

/// Spawn pose, kept for revival.
#[derive(Component, Clone, Copy, Debug)]
pub struct HomePose {
    pub position: Vec2,
}

#[derive(Component, Debug)]
pub struct DeathTimer {
    remaining: f32,
    prior_layers: CollisionLayers,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct AttackStarted {
    pub enemy: Entity,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct AttackLanded {
    pub enemy: Entity,
    pub target: Entity,
    pub damage: i32,
}

fn sense_player(
    time: Res<Time>,
    spatial: SpatialQuery,
    players: Query<(Entity, &Transform), With<Player>>,
    mut enemies: Query<(&Transform, &EnemyConfig, &mut EnemySenses), With<Enemy>>,
) {
    let dt = time.delta_secs();
    let Ok((player, player_tf)) = players.single() else {
        for (_, _, mut senses) in &mut enemies {
            senses.target = None;
            senses.has_los = false;
        }
        return;
    };
    let player_pos = player_tf.translation.truncate();

    for (tf, config, mut senses) in &mut enemies {
        let pos = tf.translation.truncate();
        senses.target = Some(player);
        senses.target_pos = player_pos;
        senses.distance = pos.distance(player_pos);

        if !config.requires_line_of_sight {
            senses.has_los = true;
            senses.time_since_los = 0.0;
            continue;
        }

        // Raycasts are throttled; between checks the last verdict stands.
        senses.vision_timer -= dt;
        if senses.vision_timer <= 0.0 {
            senses.vision_timer = config.vision_check_interval;
            let to_player = player_pos - pos;
            senses.has_los = match Dir2::new(to_player) {
                Ok(dir) => spatial
                    .cast_ray(pos, dir, to_player.length(), true, &obstacle_filter())
                    .is_none(),
                Err(_) => true,
            };
        }
        if senses.has_los {
            senses.time_since_los = 0.0;
        } else {
            senses.time_since_los += dt;
        }
    }
}

type BehaviorItem<'a> = (
    Entity,
    &'a Transform,
    &'a EnemyConfig,
    &'a mut EnemyBrain,
    &'a mut PatrolRoute,
    &'a EnemySenses,
    &'a mut LinearVelocity,
    &'a Facing,
    &'a Health,
    &'a Stun,
    Option<&'a Knockback>,
    Has<CapturedObject>,
    Has<RecentlyReleased>,
);

/// Grounded walk direction from a normalized heading. A target straight
/// above or below yields no horizontal motion (`signum` would walk right).
fn horizontal_step(dir_x: f32) -> f32 {
    if dir_x == 0.0 {
        0.0
    } else {
        dir_x.signum()
    }
}

/// One behavior step per physics tick. Suppression comes first: the dead,
/// the held, the freshly thrown, the fully stunned and the knocked-back do
/// not act.
#[allow(clippy::too_many_arguments)]
fn update_enemy_behavior(
    time: Res<Time>,
    spatial: SpatialQuery,
    mut enemies: Query<BehaviorItem<'static>, With<Enemy>>,
    players: Query<(), With<Player>>,
    mut damage_events: EventWriter<DamageEvent>,
    mut attack_started: EventWriter<AttackStarted>,
    mut attack_landed: EventWriter<AttackLanded>,
) {
    let dt = time.delta_secs();
    let mut rng = rand::rng();

    for (
        entity,
        tf,
        config,
        mut brain,
        mut route,
        senses,
        mut vel,
        facing,
        health,
        stun,
        knockback,
        captured,
        in_flight,
    ) in &mut enemies
    {
        brain.attack_cooldown_timer = (brain.attack_cooldown_timer - dt).max(0.0);

        // Held and thrown bodies are passengers; the drag controller and
        // the physics step own their velocity.
        if captured || in_flight {
            continue;
        }
        if health.is_dead() {
            vel.x = 0.0;
            continue;
        }
        if stun.is_fully_stunned() {
            vel.0 = Vec2::ZERO;
            continue;
        }
        if knockback.is_some_and(|kb| kb.is_active()) {
            continue;
        }

        let pos = tf.translation.truncate();
        let move_mult = stun.movement_multiplier();

        match brain.state() {
            EnemyState::Patrol => {
                if senses.sees_target_within(config.detection_range, config.requires_line_of_sight)
                {
                    debug!("{entity:?} spotted the player, chasing");
                    brain.change_state(EnemyState::Chase, config);
                    continue;
                }
                let Some(target) = route.current_target() else {
                    brain.change_state(EnemyState::Waiting, config);
                    if !config.flying {
                        vel.x = 0.0;
                    }
                    continue;
                };
                if pos.distance(target) <= config.waypoint_reach_distance {
                    brain.change_state(EnemyState::Waiting, config);
                    if config.flying {
                        vel.0 = Vec2::ZERO;
                    } else {
                        vel.x = 0.0;
                    }
                    continue;
                }
                let dir = (target - pos).normalize_or_zero();
                if config.flying {
                    vel.0 = dir * config.patrol_speed * move_mult;
                } else {
                    vel.x = horizontal_step(dir.x) * config.patrol_speed * move_mult;
                }
            }
            EnemyState::Waiting => {
                if senses.sees_target_within(config.detection_range, config.requires_line_of_sight)
                {
                    brain.change_state(EnemyState::Chase, config);
                    continue;
                }
                if config.flying {
                    // Idle hover bob.
                    if let PatrolRoute::Radius { bob_phase, .. } = &mut *route {
                        *bob_phase += dt * HOVER_BOB_FREQUENCY;
                        vel.0 = Vec2::new(0.0, bob_phase.sin() * HOVER_BOB_AMPLITUDE);
                    } else {
                        vel.0 = Vec2::ZERO;
                    }
                } else {
                    vel.x = 0.0;
                }
                brain.wait_timer -= dt;
                if brain.wait_timer <= 0.0 {
                    route.advance(&mut rng, Some(&spatial), pos);
                    brain.change_state(EnemyState::Patrol, config);
                }
            }
            EnemyState::Chase => {
                let lost_sight = config.requires_line_of_sight
                    && senses.time_since_los > config.lose_line_of_sight_delay;
                if senses.target.is_none()
                    || senses.distance > config.lose_target_distance
                    || lost_sight
                {
                    debug!("{entity:?} lost the player, back to patrol");
                    brain.change_state(EnemyState::Patrol, config);
                    continue;
                }
                if senses.distance <= config.attack_range && brain.attack_cooldown_timer <= 0.0 {
                    brain.change_state(EnemyState::Attack, config);
                    attack_started.write(AttackStarted { enemy: entity });
                    if config.flying {
                        vel.0 = Vec2::ZERO;
                    } else {
                        vel.x = 0.0;
                    }
                    continue;
                }
                let dir = (senses.target_pos - pos).normalize_or_zero();
                if config.flying {
                    vel.0 = dir * config.chase_speed * move_mult;
                } else {
                    vel.x = horizontal_step(dir.x) * config.chase_speed * move_mult;
                }
            }
            EnemyState::Attack => {
                if config.flying {
                    vel.0 = Vec2::ZERO;
                } else {
                    vel.x = 0.0;
                }
                brain.windup_timer -= dt;
                if brain.windup_timer > 0.0 {
                    continue;
                }

                let strike_center = pos + facing.direction() * config.attack_offset;
                let hits = spatial.shape_intersections(
                    &Collider::circle(config.attack_radius),
                    strike_center,
                    0.0,
                    &player_filter(),
                );
                for hit in hits {
                    if !players.contains(hit) {
                        continue;
                    }
                    damage_events.write(DamageEvent {
                        target: hit,
                        amount: config.attack_damage,
                        source_pos: Some(pos),
                    });
                    attack_landed.write(AttackLanded {
                        enemy: entity,
                        target: hit,
                        damage: config.attack_damage,
                    });
                }
                brain.attack_cooldown_timer = config.attack_cooldown;
                brain.change_state(EnemyState::Chase, config);
            }
        }
    }
}

/// Getting hit wakes a patrolling enemy even without detection.
fn aggro_on_damage(
    mut events: EventReader<DamageEvent>,
    mut enemies: Query<(&EnemyConfig, &mut EnemyBrain, &Health), With<Enemy>>,
) {
    for ev in events.read() {
        let Ok((config, mut brain, health)) = enemies.get_mut(ev.target) else {
            continue;
        };
        if health.is_dead() {
            continue;
        }
        if matches!(brain.state(), EnemyState::Patrol | EnemyState::Waiting) {
            brain.change_state(EnemyState::Chase, config);
        }
    }
}

/// A dying enemy stops simulating as an agent: velocity cleared, knockback
/// cancelled, collisions off, corpse timer armed.
fn handle_enemy_death(
    mut commands: Commands,
    mut deaths: EventReader<Died>,
    mut enemies: Query<
        (
            &DeathPolicy,
            &mut LinearVelocity,
            Option<&mut Knockback>,
            &mut CollisionLayers,
        ),
        With<Enemy>,
    >,
) {
    for death in deaths.read() {
        let Ok((policy, mut vel, knockback, mut layers)) = enemies.get_mut(death.entity) else {
            continue;
        };
        vel.0 = Vec2::ZERO;
        if let Some(mut kb) = knockback {
            kb.cancel();
        }
        let prior_layers = *layers;
        *layers = CollisionLayers::NONE;

        let remaining = match *policy {
            DeathPolicy::Despawn { delay } | DeathPolicy::Revive { delay } => delay,
        };
        info!("enemy {:?} died", death.entity);
        commands.entity(death.entity).insert((
            RigidBody::Kinematic,
            DeathTimer {
                remaining,
                prior_layers,
            },
        ));
    }
}

fn tick_death_timers(
    time: Res<Time>,
    mut commands: Commands,
    mut corpses: Query<(
        Entity,
        &DeathPolicy,
        &mut DeathTimer,
        &HomePose,
        &mut Transform,
        &mut Health,
        &mut Stun,
        &mut EnemyBrain,
        &mut CollisionLayers,
    )>,
) {
    let dt = time.delta_secs();
    for (entity, policy, mut timer, home, mut tf, mut health, mut stun, mut brain, mut layers) in
        &mut corpses
    {
        timer.remaining -= dt;
        if timer.remaining > 0.0 {
            continue;
        }
        match *policy {
            DeathPolicy::Despawn { .. } => {
                commands.entity(entity).despawn();
            }
            DeathPolicy::Revive { .. } => {
                info!("enemy {entity:?} revives at its spawn point");
                tf.translation = home.position.extend(tf.translation.z);
                health.revive();
                stun.clear();
                brain.reset();
                *layers = timer.prior_layers;
                commands
                    .entity(entity)
                    .insert(RigidBody::Dynamic)
                    .remove::<DeathTimer>();
            }
        }
    }
}

/// Everything an enemy needs to exist in the simulation.
#[allow(clippy::too_many_arguments)]
pub fn spawn_enemy(
    commands: &mut Commands,
    position: Vec2,
    config: EnemyConfig,
    route: PatrolRoute,
    health: Health,
    stun: Stun,
    knockback: Knockback,
    capturable: Capturable,
    policy: DeathPolicy,
) -> Entity {
    let gravity = if config.flying { 0.0 } else { 1.0 };
    commands
        .spawn((
            Enemy,
            config,
            EnemyBrain::default(),
            route,
            EnemySenses::default(),
            policy,
            HomePose { position },
            (health, stun, knockback, capturable, Facing::default()),
            (
                Transform::from_translation(position.extend(0.0)),
                RigidBody::Dynamic,
                Collider::capsule(0.25, 0.5),
                CollisionLayers::new(
                    GameLayer::Enemy,
                    [
                        GameLayer::Default,
                        GameLayer::Player,
                        GameLayer::Enemy,
                        GameLayer::Box,
                        GameLayer::Obstacle,
                    ],
                ),
                LockedAxes::ROTATION_LOCKED,
                GravityScale(gravity),
                LinearVelocity::default(),
            ),
        ))
        .id()
}

pub struct EnemyPlugin;

impl Plugin for EnemyPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<AttackStarted>()
            .add_event::<AttackLanded>()
            .add_systems(PreUpdate, sense_player)
            .add_systems(FixedUpdate, update_enemy_behavior.in_set(SimSet::Behavior))
            .add_systems(
                Update,
                (aggro_on_damage, handle_enemy_death, tick_death_timers)
                    .in_set(ResolveSet::React),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_step_stalls_on_vertical_targets() {
        assert_eq!(horizontal_step(0.0), 0.0);
        assert_eq!(horizontal_step(-0.0), 0.0);
        assert_eq!(horizontal_step(0.3), 1.0);
        assert_eq!(horizontal_step(-0.3), -1.0);
    }

    #[test]
    fn brain_starts_patrolling() {
        let brain = EnemyBrain::default();
        assert_eq!(brain.state(), EnemyState::Patrol);
    }

    #[test]
    fn change_state_is_idempotent() {
        let config = EnemyConfig::default();
        let mut brain = EnemyBrain::default();

        assert!(brain.change_state(EnemyState::Waiting, &config));
        assert_eq!(brain.wait_timer, config.patrol_wait_time);

        brain.wait_timer = 0.5;
        // Re-entering the same state must not rearm the timer.
        assert!(!brain.change_state(EnemyState::Waiting, &config));
        assert_eq!(brain.wait_timer, 0.5);

        assert!(brain.change_state(EnemyState::Attack, &config));
        assert_eq!(brain.windup_timer, config.attack_windup_time);
    }

    #[test]
    fn waypoint_route_loops() {
        let mut rng = rand::rng();
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
        let mut route = PatrolRoute::waypoints(points, true);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(route.current_target().unwrap());
            route.advance(&mut rng, None, Vec2::ZERO);
        }
        assert_eq!(seen[0], Vec2::ZERO);
        assert_eq!(seen[1], Vec2::X);
        assert_eq!(seen[2], Vec2::Y);
        assert_eq!(seen[3], Vec2::ZERO);
    }

    #[test]
    fn waypoint_route_ping_pongs() {
        let mut rng = rand::rng();
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
        let mut route = PatrolRoute::waypoints(points, false);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(route.current_target().unwrap());
            route.advance(&mut rng, None, Vec2::ZERO);
        }
        assert_eq!(seen, vec![Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::X, Vec2::ZERO]);
    }

    #[test]
    fn radius_route_stays_in_bounds() {
        let mut rng = rand::rng();
        let center = Vec2::new(10.0, 5.0);
        let mut route = PatrolRoute::radius(center, 3.0);
        for _ in 0..50 {
            route.advance(&mut rng, None, center);
            let target = route.current_target().unwrap();
            assert!(target.distance(center) <= 3.0 + 1e-4);
        }
    }

    #[test]
    fn senses_respect_detection_range_and_los() {
        let senses = EnemySenses {
            target: Some(Entity::PLACEHOLDER),
            distance: 4.0,
            has_los: false,
            ..Default::default()
        };
        assert!(senses.sees_target_within(5.0, false));
        assert!(!senses.sees_target_within(5.0, true));
        assert!(!senses.sees_target_within(3.0, false));
    }
}
