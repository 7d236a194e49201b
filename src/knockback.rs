// knockback.rs
use avian2d::prelude::*;
use bevy::prelude::*;

use crate::health::Health;
use crate::sets::SimSet;

/// Time-boxed forced displacement away from a damage source. Displacement
/// distance scales with damage relative to the receiver's max health, so a
/// lethal-sized hit pushes the full `max_distance`.
#[derive(Component, Debug, Clone)]
pub struct Knockback {
    pub enabled: bool,
    pub max_distance: f32,
    pub duration: f32,
    active: bool,
    direction: Vec2,
    elapsed: f32,
    start_distance: f32,
}

impl Default for Knockback {
    fn default() -> Self {
        Self {
            enabled: true,
            max_distance: 2.33,
            duration: 0.2,
            active: false,
            direction: Vec2::ZERO,
            elapsed: 0.0,
            start_distance: 0.0,
        }
    }
}

/// Ease-in-out falloff from 1 at the start of the knockback to 0 at the end.
fn ease_out(t: f32) -> f32 {
    let u = (1.0 - t).clamp(0.0, 1.0);
    u * u * (3.0 - 2.0 * u)
}

impl Knockback {
    pub fn new(max_distance: f32, duration: f32) -> Self {
        Self {
            max_distance,
            duration,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Starts a knockback away from `source`. No-op when disabled.
    pub fn apply(&mut self, damage: i32, max_health: i32, source: Vec2, self_pos: Vec2) {
        if !self.enabled {
            return;
        }
        let damage_pct = (damage as f32 / max_health.max(1) as f32).clamp(0.0, 1.0);
        self.start_distance = damage_pct * self.max_distance;
        self.direction = (self_pos - source).normalize_or_zero();
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Advances the knockback and returns the velocity to hold this tick.
    /// Returns zero and deactivates once the duration has elapsed.
    pub fn tick(&mut self, dt: f32) -> Vec2 {
        if !self.active {
            return Vec2::ZERO;
        }
        self.elapsed += dt;
        let progress = self.elapsed / self.duration;
        if progress >= 1.0 {
            self.active = false;
            return Vec2::ZERO;
        }
        let speed = (self.start_distance / self.duration) * ease_out(progress);
        self.direction * speed
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start_distance(&self) -> f32 {
        self.start_distance
    }

    pub fn direction(&self) -> Vec2 {
        self.direction
    }
}

/// Knockback owns the velocity for its whole window; behavior dispatch
/// skips any entity with an active knockback.
fn tick_knockback(
    time: Res<Time>,
    mut q: Query<(&mut Knockback, &mut LinearVelocity, &Health)>,
) {
    let dt = time.delta_secs();
    for (mut kb, mut vel, health) in &mut q {
        if !kb.is_active() {
            continue;
        }
        if health.is_dead() {
            kb.cancel();
            vel.0 = Vec2::ZERO;
            continue;
        }
        vel.0 = kb.tick(dt);
    }
}

pub struct KnockbackPlugin;

impl Plugin for KnockbackPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, tick_knockback.in_set(SimSet::Gate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(50, 1.165)]
    #[case(100, 2.33)]
    #[case(250, 2.33)]
    fn start_distance_scales_and_clamps(#[case] damage: i32, #[case] expected: f32) {
        let mut kb = Knockback::new(2.33, 0.2);
        kb.apply(damage, 100, Vec2::ZERO, Vec2::X);
        assert_relative_eq!(kb.start_distance(), expected, epsilon = 1e-6);
    }

    #[test]
    fn direction_points_away_from_source() {
        let mut kb = Knockback::default();
        kb.apply(10, 100, Vec2::new(2.0, 0.0), Vec2::new(5.0, 0.0));
        assert_relative_eq!(kb.direction().x, 1.0);
    }

    #[test]
    fn deactivates_after_duration() {
        let mut kb = Knockback::new(2.0, 0.2);
        kb.apply(100, 100, Vec2::ZERO, Vec2::X);
        assert!(kb.is_active());
        let v = kb.tick(0.1);
        assert!(v.length() > 0.0);
        assert_eq!(kb.tick(0.15), Vec2::ZERO);
        assert!(!kb.is_active());
    }

    #[test]
    fn cancel_stops_immediately() {
        let mut kb = Knockback::default();
        kb.apply(100, 100, Vec2::ZERO, Vec2::X);
        kb.cancel();
        assert!(!kb.is_active());
        assert_eq!(kb.tick(0.01), Vec2::ZERO);
    }

    #[test]
    fn disabled_knockback_never_activates() {
        let mut kb = Knockback::disabled();
        kb.apply(100, 100, Vec2::ZERO, Vec2::X);
        assert!(!kb.is_active());
    }
}
