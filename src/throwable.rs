// throwable.rs
use avian2d::prelude::*;
use bevy::prelude::*;
use log::info;

use crate::capture::Capturable;
use crate::health::{Died, Health};
use crate::physics::GameLayer;
use crate::sets::ResolveSet;

const BOX_HALF_EXTENT: f32 = 0.35;

/// Inert prop that can be grabbed instantly and swung or thrown as a weapon.
/// One point of health: any damage destroys it.
#[derive(Component, Default)]
pub struct ThrowableBox;

#[derive(Event, Debug, Clone, Copy)]
pub struct BoxDestroyed {
    pub entity: Entity,
}

pub fn spawn_box(commands: &mut Commands, position: Vec2) -> Entity {
    commands
        .spawn((
            ThrowableBox,
            Health::new(1),
            Capturable::instant(),
            Transform::from_translation(position.extend(0.0)),
            RigidBody::Dynamic,
            Collider::rectangle(BOX_HALF_EXTENT * 2.0, BOX_HALF_EXTENT * 2.0),
            CollisionLayers::new(
                GameLayer::Box,
                [
                    GameLayer::Default,
                    GameLayer::Player,
                    GameLayer::Enemy,
                    GameLayer::Box,
                    GameLayer::Obstacle,
                ],
            ),
            GravityScale(1.0),
            LinearDamping(0.2),
            LinearVelocity::default(),
        ))
        .id()
}

fn despawn_destroyed_boxes(
    mut commands: Commands,
    mut deaths: EventReader<Died>,
    boxes: Query<(), With<ThrowableBox>>,
    mut destroyed: EventWriter<BoxDestroyed>,
) {
    for death in deaths.read() {
        if boxes.get(death.entity).is_err() {
            continue;
        }
        info!("box {:?} shattered", death.entity);
        destroyed.write(BoxDestroyed {
            entity: death.entity,
        });
        commands.entity(death.entity).despawn();
    }
}

pub struct ThrowableBoxPlugin;

impl Plugin for ThrowableBoxPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<BoxDestroyed>()
            .add_systems(Update, despawn_destroyed_boxes.in_set(ResolveSet::React));
    }
}
