// health.rs
use bevy::prelude::*;

use crate::knockback::Knockback;
use crate::sets::ResolveSet;

/// Health pool shared by enemies, the player, and throwable boxes.
/// Death is terminal until an explicit [`Health::revive`].
#[derive(Component, Debug, Clone)]
pub struct Health {
    current: i32,
    max: i32,
    dead: bool,
}

impl Health {
    pub fn new(max: i32) -> Self {
        let max = max.max(1);
        Self {
            current: max,
            max,
            dead: false,
        }
    }

    /// Applies damage, clamped to the remaining pool. Returns the damage
    /// actually dealt (0 while dead). Marks the entity dead at zero.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        if self.dead {
            return 0;
        }
        let actual = amount.clamp(0, self.current);
        self.current -= actual;
        if self.current <= 0 {
            self.current = 0;
            self.dead = true;
        }
        actual
    }

    /// Heals up to the maximum. No-op while dead. Returns the amount
    /// actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if self.dead {
            return 0;
        }
        let actual = amount.clamp(0, self.max - self.current);
        self.current += actual;
        actual
    }

    /// Restores full health and clears the death flag.
    pub fn revive(&mut self) {
        self.current = self.max;
        self.dead = false;
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn percentage(&self) -> f32 {
        self.current as f32 / self.max as f32
    }
}

/// Request to damage an entity. `source_pos` seeds knockback when present.
#[derive(Event, Debug, Clone, Copy)]
pub struct DamageEvent {
    pub target: Entity,
    pub amount: i32,
    pub source_pos: Option<Vec2>,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct HealthChanged {
    pub entity: Entity,
    pub current: i32,
    pub max: i32,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct Died {
    pub entity: Entity,
}

pub struct DamageOutcome {
    pub actual: i32,
    pub died: bool,
}

/// Shared damage pipeline: clamp, knockback seeding, death marking, events.
/// Callers that need the synchronous outcome (captured-object impacts) use
/// this directly; everything else goes through [`DamageEvent`].
pub fn deal_damage(
    entity: Entity,
    amount: i32,
    source_pos: Option<Vec2>,
    self_pos: Vec2,
    health: &mut Health,
    knockback: Option<&mut Knockback>,
    health_changed: &mut EventWriter<HealthChanged>,
    died: &mut EventWriter<Died>,
) -> DamageOutcome {
    if health.is_dead() {
        return DamageOutcome {
            actual: 0,
            died: false,
        };
    }

    let actual = health.take_damage(amount);
    health_changed.write(HealthChanged {
        entity,
        current: health.current(),
        max: health.max(),
    });

    if let Some(kb) = knockback {
        if let Some(src) = source_pos {
            if health.is_dead() {
                kb.cancel();
            } else {
                kb.apply(actual, health.max(), src, self_pos);
            }
        } else if health.is_dead() {
            kb.cancel();
        }
    }

    if health.is_dead() {
        died.write(Died { entity });
    }

    DamageOutcome {
        actual,
        died: health.is_dead(),
    }
}

fn apply_damage_events(
    mut events: EventReader<DamageEvent>,
    mut targets: Query<(&Transform, &mut Health, Option<&mut Knockback>)>,
    mut health_changed: EventWriter<HealthChanged>,
    mut died: EventWriter<Died>,
) {
    for ev in events.read() {
        let Ok((tf, mut health, knockback)) = targets.get_mut(ev.target) else {
            continue;
        };
        deal_damage(
            ev.target,
            ev.amount,
            ev.source_pos,
            tf.translation.truncate(),
            &mut health,
            knockback.map(|kb| kb.into_inner()),
            &mut health_changed,
            &mut died,
        );
    }
}

pub struct HealthPlugin;

impl Plugin for HealthPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<DamageEvent>()
            .add_event::<HealthChanged>()
            .add_event::<Died>()
            .add_systems(Update, apply_damage_events.in_set(ResolveSet::ApplyDamage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_clamps_to_remaining_pool() {
        let mut hp = Health::new(10);
        assert_eq!(hp.take_damage(4), 4);
        assert_eq!(hp.current(), 6);
        assert_eq!(hp.take_damage(100), 6);
        assert_eq!(hp.current(), 0);
        assert!(hp.is_dead());
    }

    #[test]
    fn dead_entities_ignore_damage_and_heal() {
        let mut hp = Health::new(5);
        hp.take_damage(5);
        assert!(hp.is_dead());
        assert_eq!(hp.take_damage(3), 0);
        assert_eq!(hp.heal(3), 0);
        assert_eq!(hp.current(), 0);
    }

    #[test]
    fn heal_clamps_to_max() {
        let mut hp = Health::new(10);
        hp.take_damage(3);
        assert_eq!(hp.heal(100), 3);
        assert_eq!(hp.current(), 10);
    }

    #[test]
    fn revive_restores_full_health() {
        let mut hp = Health::new(8);
        hp.take_damage(8);
        hp.revive();
        assert!(!hp.is_dead());
        assert_eq!(hp.current(), 8);
    }
}
