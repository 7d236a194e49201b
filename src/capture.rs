// capture.rs
use avian2d::prelude::*;
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use log::{debug, info};

use crate::captured::{CapturedObject, RecentlyReleased};
use crate::health::Health;
use crate::knockback::Knockback;
use crate::physics::{Facing, GameLayer};
use crate::sets::ResolveSet;
use crate::stun::{Stun, StunChanged};
use crate::throwable::ThrowableBox;

/// Capture protocol state. `Captured` only leaves via `Release`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    BeingCaptured,
    Captured,
}

/// Per-entity capture protocol: whether the entity can be grabbed, how much
/// of the progress bar its stun pre-fills, and whether capture is instant
/// (boxes skip the held-progress phase entirely).
#[derive(Component, Debug, Clone)]
pub struct Capturable {
    state: CaptureState,
    pub difficulty: f32,
    pub stun_to_progress: f32,
    pub require_minimum_stun: bool,
    pub minimum_stun: f32,
    pub instant: bool,
}

impl Default for Capturable {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            difficulty: 0.5,
            stun_to_progress: 0.8,
            require_minimum_stun: false,
            minimum_stun: 30.0,
            instant: false,
        }
    }
}

impl Capturable {
    /// Instant-capture variant used by throwable boxes.
    pub fn instant() -> Self {
        Self {
            difficulty: 1.0,
            instant: true,
            ..Default::default()
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_captured(&self) -> bool {
        self.state == CaptureState::Captured
    }

    pub fn is_being_captured(&self) -> bool {
        self.state == CaptureState::BeingCaptured
    }

    pub fn can_be_captured(&self, dead: bool, stun: Option<&Stun>) -> bool {
        if dead || self.is_captured() {
            return false;
        }
        if self.require_minimum_stun {
            let current = stun.map(|s| s.current()).unwrap_or(0.0);
            if current < self.minimum_stun {
                return false;
            }
        }
        true
    }

    /// Enters `BeingCaptured`. Fails without touching state when the
    /// entity cannot currently be captured.
    pub fn start_capture(&mut self, dead: bool, stun: Option<&Stun>) -> bool {
        if !self.can_be_captured(dead, stun) {
            return false;
        }
        self.state = CaptureState::BeingCaptured;
        true
    }

    /// Initial progress fraction in [0, 1]: more stun means the bar starts
    /// fuller. Instant capturables always start complete.
    pub fn capture_start_progress(&self, stun: Option<&Stun>) -> f32 {
        if self.instant {
            return 1.0;
        }
        match stun {
            Some(s) if s.current() > 0.0 => {
                (s.percentage() * self.stun_to_progress).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Progress rate bonus from stun (up to +50%) and low health (+25% or
    /// +50%).
    pub fn capture_speed_multiplier(&self, stun: Option<&Stun>, health_pct: f32) -> f32 {
        let stun_bonus = stun.map(|s| s.percentage().min(1.0)).unwrap_or(0.0) * 0.5;
        let health_bonus = if health_pct < 0.45 {
            0.5
        } else if health_pct < 0.7 {
            0.25
        } else {
            0.0
        };
        1.0 + stun_bonus + health_bonus
    }

    /// Requires a prior `start_capture`.
    pub fn complete_capture(&mut self) -> bool {
        if self.state != CaptureState::BeingCaptured {
            return false;
        }
        self.state = CaptureState::Captured;
        true
    }

    /// Only valid while `BeingCaptured`; no-op otherwise.
    pub fn cancel_capture(&mut self) -> bool {
        if self.state != CaptureState::BeingCaptured {
            return false;
        }
        self.state = CaptureState::Idle;
        true
    }

    /// Requires `Captured`.
    pub fn release(&mut self) -> bool {
        if self.state != CaptureState::Captured {
            return false;
        }
        self.state = CaptureState::Idle;
        true
    }
}

/// Capture controls fed in from outside the simulation (player input in the
/// full game, scripts in the demo and tests).
#[derive(Event, Debug, Clone, Copy)]
pub enum CaptureCommand {
    Start(Entity),
    Stop,
    Release,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct CaptureStarted {
    pub entity: Entity,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct CaptureCompleted {
    pub entity: Entity,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct CaptureCancelled {
    pub entity: Entity,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct CaptureReleased {
    pub entity: Entity,
    pub velocity: Vec2,
}

/// Progress fraction for observers (UI bar in the full game).
#[derive(Event, Debug, Clone, Copy)]
pub struct CaptureProgress {
    pub entity: Entity,
    pub fraction: f32,
}

/// Capture driver state carried by the capturing agent. At most one target
/// is held at a time; `Capturable::can_be_captured` enforces exclusivity on
/// the target side.
#[derive(Component, Debug, Clone)]
pub struct CaptureRig {
    pub capture_time: f32,
    pub capture_range: f32,
    pub target: Option<Entity>,
    pub captured: Option<Entity>,
    pub progress: f32,
    pub capturing: bool,
}

impl Default for CaptureRig {
    fn default() -> Self {
        Self {
            capture_time: 1.0,
            capture_range: 6.0,
            target: None,
            captured: None,
            progress: 0.0,
            capturing: false,
        }
    }
}

impl CaptureRig {
    fn reset_progress(&mut self) {
        self.target = None;
        self.progress = 0.0;
        self.capturing = false;
    }
}

type CaptureTargetData = (
    &'static Transform,
    &'static mut Capturable,
    &'static Health,
    Option<&'static mut Stun>,
    Option<&'static mut Knockback>,
    Option<&'static CapturedObject>,
    Option<&'static Facing>,
    &'static mut LinearVelocity,
    Option<&'static mut GravityScale>,
    Option<&'static mut CollisionLayers>,
);

type CaptureTargets<'w, 's> = Query<'w, 's, CaptureTargetData, Without<CaptureRig>>;

#[derive(SystemParam)]
pub struct CaptureEventWriters<'w> {
    started: EventWriter<'w, CaptureStarted>,
    completed: EventWriter<'w, CaptureCompleted>,
    cancelled: EventWriter<'w, CaptureCancelled>,
    released: EventWriter<'w, CaptureReleased>,
    progress: EventWriter<'w, CaptureProgress>,
    stun_changed: EventWriter<'w, StunChanged>,
}

/// Freezes the target (zero velocity, no gravity, stun cleared, player
/// collisions ignored) and attaches the drag controller.
#[allow(clippy::too_many_arguments)]
fn complete_capture_now(
    commands: &mut Commands,
    owner: Entity,
    target: Entity,
    position: Vec2,
    capturable: &mut Capturable,
    health: &Health,
    stun: Option<&mut Stun>,
    knockback: Option<&mut Knockback>,
    vel: &mut LinearVelocity,
    gravity: Option<&mut GravityScale>,
    layers: Option<&mut CollisionLayers>,
    is_box: bool,
    writers: &mut CaptureEventWriters,
) -> bool {
    if !capturable.complete_capture() {
        return false;
    }

    vel.0 = Vec2::ZERO;
    if let Some(kb) = knockback {
        kb.cancel();
    }
    if let Some(stun) = stun {
        stun.clear();
        writers.stun_changed.write(StunChanged {
            entity: target,
            value: 0.0,
        });
    }

    let prior_gravity = gravity.as_ref().map(|g| g.0).unwrap_or(1.0);
    if let Some(gravity) = gravity {
        gravity.0 = 0.0;
    }
    let prior_layers = layers.as_ref().map(|l| **l).unwrap_or_default();
    if let Some(layers) = layers {
        layers.filters &= !LayerMask::from(GameLayer::Player);
    }

    // avian only reports contacts for bodies that opt into collision events,
    // and the impact pipeline reads `CollisionStarted` for held bodies.
    commands.entity(target).insert((
        CapturedObject::new(
            owner,
            position,
            health.current(),
            prior_gravity,
            prior_layers,
            is_box,
        ),
        CollisionEventsEnabled,
    ));

    info!("capture completed for {target:?}");
    writers.completed.write(CaptureCompleted { entity: target });
    true
}

fn handle_capture_commands(
    mut commands: Commands,
    mut events: EventReader<CaptureCommand>,
    mut rigs: Query<(Entity, &Transform, &mut CaptureRig)>,
    mut targets: CaptureTargets,
    boxes: Query<(), With<ThrowableBox>>,
    mut writers: CaptureEventWriters,
) {
    let Ok((owner, owner_tf, mut rig)) = rigs.single_mut() else {
        return;
    };
    let owner_pos = owner_tf.translation.truncate();

    for ev in events.read() {
        match *ev {
            CaptureCommand::Start(target) => {
                if rig.captured.is_some() || rig.capturing {
                    continue;
                }
                let Ok((
                    tf,
                    mut capturable,
                    health,
                    mut stun,
                    mut knockback,
                    _,
                    _,
                    mut vel,
                    mut gravity,
                    mut layers,
                )) = targets.get_mut(target)
                else {
                    continue;
                };
                let position = tf.translation.truncate();
                let distance = position.distance(owner_pos);
                if distance > rig.capture_range {
                    debug!("capture target {target:?} out of range ({distance:.2})");
                    continue;
                }
                if !capturable.start_capture(health.is_dead(), stun.as_deref()) {
                    debug!("{target:?} cannot be captured right now");
                    continue;
                }
                if let Some(kb) = knockback.as_deref_mut() {
                    kb.cancel();
                }

                let start_progress = capturable.capture_start_progress(stun.as_deref());
                rig.target = Some(target);
                rig.capturing = true;
                rig.progress = start_progress * rig.capture_time;
                writers.started.write(CaptureStarted { entity: target });
                writers.progress.write(CaptureProgress {
                    entity: target,
                    fraction: start_progress,
                });

                // Instant capturables have no held phase: complete in the
                // same step the capture began.
                if capturable.instant {
                    let is_box = boxes.get(target).is_ok();
                    if complete_capture_now(
                        &mut commands,
                        owner,
                        target,
                        position,
                        &mut capturable,
                        health,
                        stun.as_deref_mut(),
                        knockback.as_deref_mut(),
                        &mut vel,
                        gravity.as_deref_mut(),
                        layers.as_deref_mut(),
                        is_box,
                        &mut writers,
                    ) {
                        rig.captured = Some(target);
                    }
                    rig.reset_progress();
                }
            }
            CaptureCommand::Stop => {
                if !rig.capturing || rig.captured.is_some() {
                    continue;
                }
                if let Some(target) = rig.target {
                    if let Ok((_, mut capturable, ..)) = targets.get_mut(target) {
                        if capturable.cancel_capture() {
                            writers.cancelled.write(CaptureCancelled { entity: target });
                        }
                    }
                }
                rig.reset_progress();
            }
            CaptureCommand::Release => {
                let Some(target) = rig.captured else {
                    continue;
                };
                let Ok((
                    _,
                    mut capturable,
                    _,
                    mut stun,
                    _,
                    captured_obj,
                    facing,
                    mut vel,
                    mut gravity,
                    mut layers,
                )) = targets.get_mut(target)
                else {
                    // Target despawned while held; just drop the handle.
                    rig.captured = None;
                    continue;
                };
                if !capturable.release() {
                    continue;
                }

                let fallback = facing.map(|f| f.direction()).unwrap_or(Vec2::X);
                let velocity = captured_obj
                    .map(|obj| obj.release_velocity(fallback))
                    .unwrap_or(Vec2::ZERO);
                vel.0 = velocity;

                if let Some(gravity) = gravity.as_deref_mut() {
                    gravity.0 = captured_obj.map(|obj| obj.prior_gravity()).unwrap_or(1.0);
                }
                if let (Some(layers), Some(obj)) = (layers.as_deref_mut(), captured_obj) {
                    *layers = obj.prior_layers();
                }
                if let Some(stun) = stun.as_deref_mut() {
                    stun.clear();
                    writers.stun_changed.write(StunChanged {
                        entity: target,
                        value: 0.0,
                    });
                }

                let released = captured_obj
                    .map(RecentlyReleased::from_captured)
                    .unwrap_or_default();
                commands
                    .entity(target)
                    .remove::<CapturedObject>()
                    .insert(released);

                info!("released {target:?} at {:.2} m/s", velocity.length());
                writers.released.write(CaptureReleased {
                    entity: target,
                    velocity,
                });
                rig.captured = None;
                rig.reset_progress();
            }
        }
    }
}

/// Accumulates held-capture progress, cancels when the target strays out of
/// range or dies, and completes the capture once the bar fills.
fn tick_capture_progress(
    time: Res<Time>,
    mut commands: Commands,
    mut rigs: Query<(Entity, &Transform, &mut CaptureRig)>,
    mut targets: CaptureTargets,
    boxes: Query<(), With<ThrowableBox>>,
    mut writers: CaptureEventWriters,
) {
    let Ok((owner, owner_tf, mut rig)) = rigs.single_mut() else {
        return;
    };

    // Drop the handle if a held object disappeared out from under us
    // (a box destroying itself on impact, a despawned corpse).
    if let Some(held) = rig.captured {
        if targets.get(held).is_err() {
            rig.captured = None;
        }
    }

    if !rig.capturing {
        return;
    }
    let Some(target) = rig.target else {
        rig.reset_progress();
        return;
    };
    let Ok((
        tf,
        mut capturable,
        health,
        mut stun,
        mut knockback,
        _,
        _,
        mut vel,
        mut gravity,
        mut layers,
    )) = targets.get_mut(target)
    else {
        rig.reset_progress();
        return;
    };

    let position = tf.translation.truncate();
    let distance = position.distance(owner_tf.translation.truncate());
    if distance > rig.capture_range || health.is_dead() {
        if capturable.cancel_capture() {
            writers.cancelled.write(CaptureCancelled { entity: target });
        }
        rig.reset_progress();
        return;
    }

    let multiplier = capturable.capture_speed_multiplier(stun.as_deref(), health.percentage());
    rig.progress += time.delta_secs() * multiplier;
    writers.progress.write(CaptureProgress {
        entity: target,
        fraction: (rig.progress / rig.capture_time).min(1.0),
    });

    if rig.progress >= rig.capture_time {
        let is_box = boxes.get(target).is_ok();
        if complete_capture_now(
            &mut commands,
            owner,
            target,
            position,
            &mut capturable,
            health,
            stun.as_deref_mut(),
            knockback.as_deref_mut(),
            &mut vel,
            gravity.as_deref_mut(),
            layers.as_deref_mut(),
            is_box,
            &mut writers,
        ) {
            rig.captured = Some(target);
        }
        rig.reset_progress();
    }
}

pub struct CapturePlugin;

impl Plugin for CapturePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<CaptureCommand>()
            .add_event::<CaptureStarted>()
            .add_event::<CaptureCompleted>()
            .add_event::<CaptureCancelled>()
            .add_event::<CaptureReleased>()
            .add_event::<CaptureProgress>()
            .add_systems(
                Update,
                (handle_capture_commands, tick_capture_progress)
                    .chain()
                    .in_set(ResolveSet::React),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stun_at(value: f32) -> Stun {
        let mut stun = Stun::default();
        stun.set(value);
        stun
    }

    #[test]
    fn capture_gating() {
        let mut cap = Capturable::default();
        assert!(!cap.start_capture(true, None));
        assert_eq!(cap.state(), CaptureState::Idle);

        assert!(cap.start_capture(false, None));
        assert!(cap.complete_capture());
        // Already captured: exclusive ownership holds.
        assert!(!cap.start_capture(false, None));
    }

    #[test]
    fn minimum_stun_requirement() {
        let mut cap = Capturable {
            require_minimum_stun: true,
            minimum_stun: 30.0,
            ..Default::default()
        };
        assert!(!cap.start_capture(false, Some(&stun_at(10.0))));
        assert!(!cap.start_capture(false, None));
        assert!(cap.start_capture(false, Some(&stun_at(35.0))));
    }

    #[test]
    fn start_progress_seed_from_stun() {
        let cap = Capturable::default();
        let progress = cap.capture_start_progress(Some(&stun_at(80.0)));
        assert_relative_eq!(progress, 0.64, epsilon = 1e-6);
        assert_relative_eq!(cap.capture_start_progress(None), 0.0);
    }

    #[test]
    fn instant_capturables_start_complete() {
        let cap = Capturable::instant();
        assert_relative_eq!(cap.capture_start_progress(None), 1.0);
    }

    #[test]
    fn speed_multiplier_branches() {
        let cap = Capturable::default();
        assert_relative_eq!(cap.capture_speed_multiplier(None, 1.0), 1.0);
        assert_relative_eq!(cap.capture_speed_multiplier(None, 0.6), 1.25);
        assert_relative_eq!(cap.capture_speed_multiplier(None, 0.4), 1.5);
        assert_relative_eq!(
            cap.capture_speed_multiplier(Some(&stun_at(100.0)), 0.4),
            2.0
        );
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut cap = Capturable::default();
        assert!(!cap.complete_capture());
        assert!(!cap.release());
        assert!(!cap.cancel_capture());
        assert_eq!(cap.state(), CaptureState::Idle);

        assert!(cap.start_capture(false, None));
        assert!(cap.cancel_capture());
        assert_eq!(cap.state(), CaptureState::Idle);
    }

    #[test]
    fn release_round_trip() {
        let mut cap = Capturable::default();
        assert!(cap.start_capture(false, None));
        assert!(cap.complete_capture());
        assert!(cap.is_captured());
        assert!(cap.release());
        assert_eq!(cap.state(), CaptureState::Idle);
        // Can be captured again immediately.
        assert!(cap.can_be_captured(false, None));
    }
}
