// lib.rs
//! Headless 2D combat simulation: patrol-and-chase enemies that can be
//! stunned, knocked back, captured, dragged around and thrown as weapons.

pub mod archetype;
pub mod capture;
pub mod captured;
pub mod enemy;
pub mod health;
pub mod impact;
pub mod knockback;
pub mod physics;
pub mod player;
pub mod prelude;
pub mod sets;
pub mod stun;
pub mod throwable;

use bevy::prelude::*;

use crate::sets::{ResolveSet, SimSet};

/// The whole simulation in one plugin. Callers still add `PhysicsPlugins`
/// themselves so they can pick the schedule and gravity.
pub struct CombatSimPlugin;

impl Plugin for CombatSimPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            FixedUpdate,
            (SimSet::Gate, SimSet::Behavior, SimSet::Drag).chain(),
        )
        .configure_sets(
            Update,
            (
                ResolveSet::Collide,
                ResolveSet::ApplyDamage,
                ResolveSet::React,
            )
                .chain(),
        )
        .add_plugins((
            physics::GamePhysicsPlugin,
            health::HealthPlugin,
            stun::StunPlugin,
            knockback::KnockbackPlugin,
            capture::CapturePlugin,
            captured::CapturedObjectPlugin,
            enemy::EnemyPlugin,
            throwable::ThrowableBoxPlugin,
            impact::ImpactPlugin,
        ));
    }
}
