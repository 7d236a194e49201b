// sets.rs
use bevy::prelude::*;

/// Fixed-step ordering: gating effects run before behavior dispatch, and
/// pointer-drag control runs after both.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum SimSet {
    Gate,
    Behavior,
    Drag,
}

/// Variable-step ordering for the resolution pipeline: impact collisions
/// first, then queued damage, then reactions (aggro, death, destruction).
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ResolveSet {
    Collide,
    ApplyDamage,
    React,
}
