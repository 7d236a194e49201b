// prelude.rs
pub use avian2d::prelude::*;
pub use bevy::prelude::*;
pub use log::{debug, info, warn};

pub use crate::archetype::{ArchetypeLibrary, EnemyArchetype, EnemyArchetypePlugin};
pub use crate::capture::{
    Capturable, CaptureCancelled, CaptureCommand, CaptureCompleted, CaptureProgress,
    CaptureReleased, CaptureRig, CaptureStarted, CaptureState,
};
pub use crate::captured::{CapturedObject, PointerTarget, RecentlyReleased};
pub use crate::enemy::{
    spawn_enemy, AttackLanded, AttackStarted, DeathPolicy, Enemy, EnemyBrain, EnemyConfig,
    EnemySenses, EnemyState, PatrolRoute,
};
pub use crate::health::{DamageEvent, Died, Health, HealthChanged};
pub use crate::impact::{HitStop, ImpactFrameEvent};
pub use crate::knockback::Knockback;
pub use crate::physics::{Facing, GameLayer, GamePhysicsPlugin};
pub use crate::player::{spawn_player, Player};
pub use crate::sets::{ResolveSet, SimSet};
pub use crate::stun::{FullyStunned, Stun, StunChanged, StunEvent};
pub use crate::throwable::{spawn_box, BoxDestroyed, ThrowableBox};
pub use crate::CombatSimPlugin;
