// stun.rs
use bevy::prelude::*;

use crate::health::Health;
use crate::sets::ResolveSet;

pub const MAX_STUN: f32 = 100.0;

/// Accumulating 0-100 stun value. Decays over time, with the decay rate
/// shrinking as stun rises, and gates movement down to a full stop past
/// `full_stop_threshold`.
#[derive(Component, Debug, Clone)]
pub struct Stun {
    current: f32,
    pub decay_base_rate: f32,
    pub decay_slowdown_factor: f32,
    pub movement_impact_max: f32,
    pub full_stop_threshold: f32,
}

impl Default for Stun {
    fn default() -> Self {
        Self {
            current: 0.0,
            decay_base_rate: 10.0,
            decay_slowdown_factor: 0.5,
            movement_impact_max: 0.9,
            full_stop_threshold: 95.0,
        }
    }
}

impl Stun {
    /// Adds stun, clamped to [0, 100]. Returns true when this crossed the
    /// full-stop threshold upward.
    pub fn add(&mut self, amount: f32) -> bool {
        let previous = self.current;
        self.current = (self.current + amount).clamp(0.0, MAX_STUN);
        self.current >= self.full_stop_threshold && previous < self.full_stop_threshold
    }

    pub fn reduce(&mut self, amount: f32) {
        self.current = (self.current - amount).clamp(0.0, MAX_STUN);
    }

    pub fn set(&mut self, value: f32) {
        self.current = value.clamp(0.0, MAX_STUN);
    }

    pub fn clear(&mut self) {
        self.current = 0.0;
    }

    /// Time-based decay. The higher the stun, the slower it drains, so the
    /// transition out of a full stop never snaps.
    pub fn tick(&mut self, dt: f32) {
        if self.current <= 0.0 {
            return;
        }
        let slowdown = 1.0 - (self.current / MAX_STUN) * self.decay_slowdown_factor;
        self.current = (self.current - self.decay_base_rate * slowdown * dt).clamp(0.0, MAX_STUN);
    }

    /// Speed multiplier in [0, 1]: 1 at zero stun, 0 past the full-stop
    /// threshold, linear impact in between.
    pub fn movement_multiplier(&self) -> f32 {
        if self.current <= 0.0 {
            return 1.0;
        }
        if self.current >= self.full_stop_threshold {
            return 0.0;
        }
        1.0 - (self.current / MAX_STUN) * self.movement_impact_max
    }

    pub fn is_fully_stunned(&self) -> bool {
        self.current >= self.full_stop_threshold
    }

    pub fn is_stunned(&self) -> bool {
        self.current > 0.0
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn percentage(&self) -> f32 {
        self.current / MAX_STUN
    }
}

/// Request to add stun to an entity. Ignored while the target is dead.
#[derive(Event, Debug, Clone, Copy)]
pub struct StunEvent {
    pub target: Entity,
    pub amount: f32,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct StunChanged {
    pub entity: Entity,
    pub value: f32,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct FullyStunned {
    pub entity: Entity,
}

fn apply_stun_events(
    mut events: EventReader<StunEvent>,
    mut targets: Query<(&mut Stun, &Health)>,
    mut changed: EventWriter<StunChanged>,
    mut fully: EventWriter<FullyStunned>,
) {
    for ev in events.read() {
        let Ok((mut stun, health)) = targets.get_mut(ev.target) else {
            continue;
        };
        if health.is_dead() {
            continue;
        }
        let crossed = stun.add(ev.amount);
        changed.write(StunChanged {
            entity: ev.target,
            value: stun.current(),
        });
        if crossed {
            fully.write(FullyStunned { entity: ev.target });
        }
    }
}

fn decay_stun(
    time: Res<Time>,
    mut q: Query<(Entity, &mut Stun)>,
    mut changed: EventWriter<StunChanged>,
) {
    let dt = time.delta_secs();
    for (entity, mut stun) in &mut q {
        if !stun.is_stunned() {
            continue;
        }
        stun.tick(dt);
        changed.write(StunChanged {
            entity,
            value: stun.current(),
        });
    }
}

pub struct StunPlugin;

impl Plugin for StunPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<StunEvent>()
            .add_event::<StunChanged>()
            .add_event::<FullyStunned>()
            .add_systems(
                Update,
                (apply_stun_events.in_set(ResolveSet::ApplyDamage), decay_stun),
            );
    }
}
