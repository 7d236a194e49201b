// player.rs
use avian2d::prelude::*;
use bevy::prelude::*;

use crate::capture::CaptureRig;
use crate::health::Health;
use crate::physics::{Facing, GameLayer};

const PLAYER_MAX_HEALTH: i32 = 100;

#[derive(Component, Default)]
pub struct Player;

pub fn spawn_player(commands: &mut Commands, position: Vec2) -> Entity {
    commands
        .spawn((
            Player,
            Health::new(PLAYER_MAX_HEALTH),
            CaptureRig::default(),
            Facing::default(),
            Transform::from_translation(position.extend(0.0)),
            RigidBody::Dynamic,
            Collider::capsule(0.3, 0.6),
            CollisionLayers::new(
                GameLayer::Player,
                [
                    GameLayer::Default,
                    GameLayer::Enemy,
                    GameLayer::Box,
                    GameLayer::Obstacle,
                ],
            ),
            LockedAxes::ROTATION_LOCKED,
            LinearVelocity::default(),
        ))
        .id()
}
