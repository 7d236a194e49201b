// physics.rs
use avian2d::prelude::*;
use bevy::prelude::*;

/// Collision layers shared by every entity in the simulation.
#[derive(PhysicsLayer, Default, Clone, Copy, Debug)]
pub enum GameLayer {
    #[default]
    Default,
    Player,
    Enemy,
    Box,
    Obstacle,
}

/// Horizontal facing sign (+1 right, -1 left), tracked from the last
/// meaningful horizontal movement. The release-velocity fallback
/// direction reads it when a held object has no motion of its own.
#[derive(Component, Clone, Copy, Deref, DerefMut)]
pub struct Facing(pub f32);

impl Default for Facing {
    fn default() -> Self {
        Self(1.0)
    }
}

impl Facing {
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.0.signum(), 0.0)
    }
}

pub fn obstacle_filter() -> SpatialQueryFilter {
    SpatialQueryFilter::from_mask(LayerMask::from(GameLayer::Obstacle))
}

pub fn player_filter() -> SpatialQueryFilter {
    SpatialQueryFilter::from_mask(LayerMask::from(GameLayer::Player))
}

fn update_facing_from_velocity(mut q: Query<(&LinearVelocity, &mut Facing)>) {
    for (vel, mut facing) in &mut q {
        if vel.x > 0.05 {
            facing.0 = 1.0;
        } else if vel.x < -0.05 {
            facing.0 = -1.0;
        }
    }
}

pub struct GamePhysicsPlugin;

impl Plugin for GamePhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, update_facing_from_velocity);
    }
}
