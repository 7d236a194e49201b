// captured.rs
use std::collections::{HashSet, VecDeque};

use avian2d::prelude::*;
use bevy::prelude::*;
use log::{debug, info};

use crate::capture::{CaptureCommand, CaptureRig};
use crate::health::{deal_damage, Died, Health, HealthChanged};
use crate::impact::ImpactFrameEvent;
use crate::knockback::Knockback;
use crate::sets::{ResolveSet, SimSet};
use crate::stun::StunEvent;

// ====== TUNING ======
const DRAG_SPEED: f32 = 75.0;
const DRAG_SMOOTH_TIME: f32 = 0.1;
const MAX_DISTANCE_FROM_OWNER: f32 = 10.0;
const RELEASE_VELOCITY_MULTIPLIER: f32 = 3.0;
const MIN_RELEASE_VELOCITY: f32 = 2.0;
const MAX_RELEASE_VELOCITY: f32 = 75.0;
const MIN_VELOCITY_FOR_DAMAGE: f32 = 2.0;
const IMPACT_DAMAGE_MULTIPLIER: f32 = 2.0;
const DAMAGE_COOLDOWN: f32 = 0.3;
const MIN_VELOCITY_FOR_IMPACT_FRAME: f32 = 5.0;
const TARGET_STUN_PER_DAMAGE: f32 = 1.5;
const BOUNCE_FACTOR: f32 = 0.3;
const BOX_DAMAGE_FACTOR: f32 = 1.5;
const BOX_SHATTER_DAMAGE: i32 = 999;
const VELOCITY_HISTORY_LEN: usize = 10;
const RELEASED_WINDOW: f32 = 3.0;
const RELEASED_CUTOFF_SPEED: f32 = 1.0;

/// World-space point the held object is dragged toward. Fed by the cursor in
/// the full game and by scripts here.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct PointerTarget(pub Vec2);

/// Drag controller attached to an entity for the duration of its capture.
/// Moves the body by writing velocity rather than teleporting it, so physics
/// contacts keep firing while it is swung around.
#[derive(Component, Debug, Clone)]
pub struct CapturedObject {
    owner: Entity,
    pub drag_speed: f32,
    pub smooth_time: f32,
    pub max_distance_from_owner: f32,
    pub release_velocity_multiplier: f32,
    pub min_release_velocity: f32,
    pub max_release_velocity: f32,
    pub min_velocity_for_damage: f32,
    pub damage_multiplier: f32,
    pub damage_cooldown: f32,
    pub min_velocity_for_impact_frame: f32,
    is_box: bool,
    target_position: Vec2,
    previous_position: Vec2,
    smooth_velocity: Vec2,
    velocity_history: VecDeque<Vec2>,
    current_velocity: Vec2,
    last_damage_time: f32,
    recently_damaged: HashSet<Entity>,
    previous_health: i32,
    prior_gravity: f32,
    prior_layers: CollisionLayers,
}

impl CapturedObject {
    pub fn new(
        owner: Entity,
        position: Vec2,
        current_health: i32,
        prior_gravity: f32,
        prior_layers: CollisionLayers,
        is_box: bool,
    ) -> Self {
        Self {
            owner,
            drag_speed: DRAG_SPEED,
            smooth_time: DRAG_SMOOTH_TIME,
            max_distance_from_owner: MAX_DISTANCE_FROM_OWNER,
            release_velocity_multiplier: RELEASE_VELOCITY_MULTIPLIER,
            min_release_velocity: MIN_RELEASE_VELOCITY,
            max_release_velocity: MAX_RELEASE_VELOCITY,
            min_velocity_for_damage: MIN_VELOCITY_FOR_DAMAGE,
            damage_multiplier: IMPACT_DAMAGE_MULTIPLIER,
            damage_cooldown: DAMAGE_COOLDOWN,
            min_velocity_for_impact_frame: MIN_VELOCITY_FOR_IMPACT_FRAME,
            is_box,
            target_position: position,
            previous_position: position,
            smooth_velocity: Vec2::ZERO,
            velocity_history: VecDeque::with_capacity(VELOCITY_HISTORY_LEN),
            current_velocity: Vec2::ZERO,
            last_damage_time: f32::NEG_INFINITY,
            recently_damaged: HashSet::new(),
            previous_health: current_health,
            prior_gravity,
            prior_layers,
        }
    }

    pub fn owner(&self) -> Entity {
        self.owner
    }

    pub fn is_box(&self) -> bool {
        self.is_box
    }

    pub fn prior_gravity(&self) -> f32 {
        self.prior_gravity
    }

    pub fn prior_layers(&self) -> CollisionLayers {
        self.prior_layers
    }

    /// Averaged over the last few physics steps so a single jittery frame
    /// does not spike the throw.
    pub fn current_velocity(&self) -> Vec2 {
        self.current_velocity
    }

    pub fn push_velocity_sample(&mut self, sample: Vec2) {
        if self.velocity_history.len() == VELOCITY_HISTORY_LEN {
            self.velocity_history.pop_front();
        }
        self.velocity_history.push_back(sample);
        let sum: Vec2 = self.velocity_history.iter().copied().sum();
        self.current_velocity = sum / self.velocity_history.len() as f32;
    }

    /// Velocity the body leaves with when the hold ends. Slow drags always
    /// eject at the minimum speed along the drag direction (or `fallback_dir`
    /// when there is no meaningful motion); fast swings are amplified and
    /// clamped.
    pub fn release_velocity(&self, fallback_dir: Vec2) -> Vec2 {
        let speed = self.current_velocity.length();
        if speed < self.min_release_velocity {
            let dir = if speed > 1e-4 {
                self.current_velocity / speed
            } else {
                fallback_dir
            };
            return dir * self.min_release_velocity;
        }
        let thrown = self.current_velocity * self.release_velocity_multiplier;
        let thrown_speed = thrown.length();
        thrown / thrown_speed
            * thrown_speed.clamp(self.min_release_velocity, self.max_release_velocity)
    }
}

/// Lingers on a thrown body so it keeps dealing impact damage for a short
/// window after leaving the player's grip.
#[derive(Component, Debug, Clone)]
pub struct RecentlyReleased {
    pub remaining: f32,
    pub min_velocity_for_damage: f32,
    pub damage_multiplier: f32,
    pub damage_cooldown: f32,
    pub min_velocity_for_impact_frame: f32,
    pub cutoff_speed: f32,
    is_box: bool,
    last_damage_time: f32,
    recently_damaged: HashSet<Entity>,
}

impl Default for RecentlyReleased {
    fn default() -> Self {
        Self {
            remaining: RELEASED_WINDOW,
            min_velocity_for_damage: MIN_VELOCITY_FOR_DAMAGE,
            damage_multiplier: IMPACT_DAMAGE_MULTIPLIER,
            damage_cooldown: DAMAGE_COOLDOWN,
            min_velocity_for_impact_frame: MIN_VELOCITY_FOR_IMPACT_FRAME,
            cutoff_speed: RELEASED_CUTOFF_SPEED,
            is_box: false,
            last_damage_time: f32::NEG_INFINITY,
            recently_damaged: HashSet::new(),
        }
    }
}

impl RecentlyReleased {
    pub fn from_captured(obj: &CapturedObject) -> Self {
        Self {
            min_velocity_for_damage: obj.min_velocity_for_damage,
            damage_multiplier: obj.damage_multiplier,
            damage_cooldown: obj.damage_cooldown,
            min_velocity_for_impact_frame: obj.min_velocity_for_impact_frame,
            is_box: obj.is_box,
            ..Default::default()
        }
    }
}

/// Impact damage scales with speed over the damage floor. Boxes hit harder
/// than swung enemies.
pub(crate) fn collision_damage(speed: f32, min_velocity: f32, multiplier: f32, is_box: bool) -> i32 {
    let mut raw = speed / min_velocity * multiplier;
    if is_box {
        raw *= BOX_DAMAGE_FACTOR;
    }
    (raw.round() as i32).max(1)
}

/// Critically damped spring toward a target, with an overshoot guard and a
/// max-speed clamp on the tracked change.
fn smooth_damp(
    current: Vec2,
    target: Vec2,
    velocity: &mut Vec2,
    smooth_time: f32,
    max_speed: f32,
    dt: f32,
) -> Vec2 {
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let mut change = current - target;
    let original_target = target;
    change = change.clamp_length_max(max_speed * smooth_time);
    let target = current - change;

    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * exp;
    let mut output = target + (change + temp) * exp;

    if (original_target - current).dot(output - original_target) > 0.0 {
        output = original_target;
        *velocity = (output - original_target) / dt;
    }
    output
}

/// Drives held bodies toward the pointer each physics step by velocity, and
/// records velocity samples for release and impact damage.
fn follow_pointer(
    time: Res<Time>,
    pointer: Res<PointerTarget>,
    mut held: Query<(&Transform, &mut CapturedObject, &mut LinearVelocity)>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }
    let now = time.elapsed_secs();
    for (tf, mut obj, mut vel) in &mut held {
        let pos = tf.translation.truncate();
        obj.target_position = pointer.0;

        let mut smooth_velocity = obj.smooth_velocity;
        let new_pos = smooth_damp(
            pos,
            obj.target_position,
            &mut smooth_velocity,
            obj.smooth_time,
            obj.drag_speed,
            dt,
        );
        obj.smooth_velocity = smooth_velocity;
        vel.0 = (new_pos - pos) / dt;

        let sample = (pos - obj.previous_position) / dt;
        obj.previous_position = pos;
        obj.push_velocity_sample(sample);

        if now - obj.last_damage_time > obj.damage_cooldown {
            obj.recently_damaged.clear();
        }
    }
}

/// Held bodies cannot be dragged arbitrarily far from their owner; past the
/// limit the hold breaks.
fn enforce_distance_limit(
    held: Query<(&Transform, &CapturedObject)>,
    owners: Query<&Transform, With<CaptureRig>>,
    mut commands_out: EventWriter<CaptureCommand>,
) {
    for (tf, obj) in &held {
        let Ok(owner_tf) = owners.get(obj.owner) else {
            continue;
        };
        let distance = tf
            .translation
            .truncate()
            .distance(owner_tf.translation.truncate());
        if distance > obj.max_distance_from_owner {
            debug!("held object past distance limit ({distance:.2}), releasing");
            commands_out.write(CaptureCommand::Release);
        }
    }
}

/// A held body whose health drops from an outside source breaks free.
fn monitor_captured_health(
    mut held: Query<(&Health, &mut CapturedObject)>,
    mut commands_out: EventWriter<CaptureCommand>,
) {
    for (health, mut obj) in &mut held {
        if health.current() < obj.previous_health {
            commands_out.write(CaptureCommand::Release);
        }
        obj.previous_health = health.current();
    }
}

type CapturedImpactItem<'a> = (
    Entity,
    &'a Transform,
    &'a mut CapturedObject,
    &'a mut LinearVelocity,
    &'a mut Health,
);

/// Resolves contacts for bodies being swung while held: damage and stun to
/// whatever they hit, recoil damage to the swung body itself, a bounce, and
/// an impact frame on lethal hits.
#[allow(clippy::too_many_arguments)]
fn resolve_captured_collisions(
    time: Res<Time>,
    mut collisions: EventReader<CollisionStarted>,
    mut selves: Query<CapturedImpactItem<'static>, With<CapturedObject>>,
    mut targets: Query<
        (&Transform, Option<&mut Health>, Option<&mut Knockback>),
        Without<CapturedObject>,
    >,
    mut health_changed: EventWriter<HealthChanged>,
    mut died: EventWriter<Died>,
    mut stun_events: EventWriter<StunEvent>,
    mut impact_frames: EventWriter<ImpactFrameEvent>,
    mut commands_out: EventWriter<CaptureCommand>,
) {
    let now = time.elapsed_secs();
    for CollisionStarted(a, b) in collisions.read() {
        let (held, other) = if selves.contains(*a) {
            (*a, *b)
        } else if selves.contains(*b) {
            (*b, *a)
        } else {
            continue;
        };
        if selves.contains(other) {
            continue;
        }
        let Ok((self_entity, self_tf, mut obj, mut self_vel, mut self_health)) =
            selves.get_mut(held)
        else {
            continue;
        };

        let speed = obj.current_velocity().length();
        if speed < obj.min_velocity_for_damage {
            continue;
        }
        if now - obj.last_damage_time < obj.damage_cooldown {
            continue;
        }
        if obj.recently_damaged.contains(&other) {
            continue;
        }

        let self_pos = self_tf.translation.truncate();
        let Ok((other_tf, other_health, mut other_knockback)) = targets.get_mut(other) else {
            continue;
        };
        // Only damageable targets count as an impact. Scraping along plain
        // terrain must not shatter a held box or hurt a swung enemy.
        let Some(mut other_health) = other_health else {
            continue;
        };
        let other_pos = other_tf.translation.truncate();

        let damage = collision_damage(
            speed,
            obj.min_velocity_for_damage,
            obj.damage_multiplier,
            obj.is_box,
        );

        let outcome = deal_damage(
            other,
            damage,
            Some(self_pos),
            other_pos,
            &mut other_health,
            other_knockback.as_deref_mut(),
            &mut health_changed,
            &mut died,
        );
        let lethal = outcome.died;
        if outcome.actual > 0 {
            stun_events.write(StunEvent {
                target: other,
                amount: damage as f32 * TARGET_STUN_PER_DAMAGE,
            });
        }
        debug!("swung impact on {other:?}: {damage} damage at {speed:.2} m/s");

        obj.recently_damaged.insert(other);
        obj.last_damage_time = now;

        // Bounce off the surface. avian does not hand us the contact normal
        // here, so approximate it from relative position.
        let normal = (self_pos - other_pos).normalize_or(Vec2::Y);
        self_vel.0 += normal * (BOUNCE_FACTOR * speed);

        if obj.is_box {
            // Boxes shatter on their first damaging impact.
            commands_out.write(CaptureCommand::Release);
            deal_damage(
                self_entity,
                BOX_SHATTER_DAMAGE,
                None,
                self_pos,
                &mut self_health,
                None,
                &mut health_changed,
                &mut died,
            );
            obj.previous_health = self_health.current();
        } else {
            let outcome = deal_damage(
                self_entity,
                damage,
                None,
                self_pos,
                &mut self_health,
                None,
                &mut health_changed,
                &mut died,
            );
            stun_events.write(StunEvent {
                target: self_entity,
                amount: damage as f32 * TARGET_STUN_PER_DAMAGE,
            });
            obj.previous_health = self_health.current();
            if outcome.died {
                commands_out.write(CaptureCommand::Release);
            }
        }

        if lethal && speed >= obj.min_velocity_for_impact_frame {
            impact_frames.write(ImpactFrameEvent {
                attacker: self_entity,
                victim: other,
                speed,
            });
        }
    }
}

type ReleasedImpactItem<'a> = (
    Entity,
    &'a Transform,
    &'a mut LinearVelocity,
    &'a mut RecentlyReleased,
    Option<&'a mut Health>,
);

/// Thrown bodies keep hurting what they hit for a short window, at their
/// actual flight speed, and take the same damage themselves.
fn resolve_released_collisions(
    time: Res<Time>,
    mut collisions: EventReader<CollisionStarted>,
    mut selves: Query<ReleasedImpactItem<'static>, With<RecentlyReleased>>,
    mut targets: Query<
        (&Transform, Option<&mut Health>, Option<&mut Knockback>),
        Without<RecentlyReleased>,
    >,
    mut health_changed: EventWriter<HealthChanged>,
    mut died: EventWriter<Died>,
    mut stun_events: EventWriter<StunEvent>,
    mut impact_frames: EventWriter<ImpactFrameEvent>,
) {
    let now = time.elapsed_secs();
    for CollisionStarted(a, b) in collisions.read() {
        let (released, other) = if selves.contains(*a) {
            (*a, *b)
        } else if selves.contains(*b) {
            (*b, *a)
        } else {
            continue;
        };
        if selves.contains(other) {
            continue;
        }
        let Ok((self_entity, self_tf, mut self_vel, mut tag, self_health)) =
            selves.get_mut(released)
        else {
            continue;
        };

        let speed = self_vel.0.length();
        if speed < tag.min_velocity_for_damage {
            continue;
        }
        if now - tag.last_damage_time < tag.damage_cooldown {
            continue;
        }
        if tag.recently_damaged.contains(&other) {
            continue;
        }

        let self_pos = self_tf.translation.truncate();
        let Ok((other_tf, other_health, mut other_knockback)) = targets.get_mut(other) else {
            continue;
        };
        let Some(mut other_health) = other_health else {
            continue;
        };
        let other_pos = other_tf.translation.truncate();

        let damage = collision_damage(
            speed,
            tag.min_velocity_for_damage,
            tag.damage_multiplier,
            tag.is_box,
        );

        // Thrown-body hits land flat: no knockback on the victim, and the
        // stun is proportional to the damage rather than the swung 1.5x.
        let outcome = deal_damage(
            other,
            damage,
            None,
            other_pos,
            &mut other_health,
            other_knockback.as_deref_mut(),
            &mut health_changed,
            &mut died,
        );
        let lethal = outcome.died;
        if outcome.actual > 0 {
            stun_events.write(StunEvent {
                target: other,
                amount: damage as f32,
            });
        }

        tag.recently_damaged.insert(other);
        tag.last_damage_time = now;

        let normal = (self_pos - other_pos).normalize_or(Vec2::Y);
        self_vel.0 += normal * (BOUNCE_FACTOR * speed);

        if let Some(mut self_health) = self_health {
            deal_damage(
                self_entity,
                damage,
                None,
                self_pos,
                &mut self_health,
                None,
                &mut health_changed,
                &mut died,
            );
            stun_events.write(StunEvent {
                target: self_entity,
                amount: damage as f32,
            });
        }

        if lethal && speed >= tag.min_velocity_for_impact_frame {
            impact_frames.write(ImpactFrameEvent {
                attacker: self_entity,
                victim: other,
                speed,
            });
        }
    }
}

/// The post-release damage window expires on a timer or once the body has
/// effectively stopped.
fn tick_recently_released(
    time: Res<Time>,
    mut commands: Commands,
    mut released: Query<(Entity, &LinearVelocity, &mut RecentlyReleased)>,
) {
    let dt = time.delta_secs();
    let now = time.elapsed_secs();
    for (entity, vel, mut tag) in &mut released {
        tag.remaining -= dt;
        if now - tag.last_damage_time > tag.damage_cooldown {
            tag.recently_damaged.clear();
        }
        if tag.remaining <= 0.0 || vel.0.length() < tag.cutoff_speed {
            info!("thrown-body damage window over for {entity:?}");
            commands
                .entity(entity)
                .remove::<(RecentlyReleased, CollisionEventsEnabled)>();
        }
    }
}

pub struct CapturedObjectPlugin;

impl Plugin for CapturedObjectPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PointerTarget>()
            .add_systems(
                FixedUpdate,
                (follow_pointer, enforce_distance_limit)
                    .chain()
                    .in_set(SimSet::Drag),
            )
            .add_systems(
                Update,
                (resolve_captured_collisions, resolve_released_collisions)
                    .in_set(ResolveSet::Collide),
            )
            .add_systems(
                Update,
                (monitor_captured_health, tick_recently_released).in_set(ResolveSet::ApplyDamage),
            );
    }
}
