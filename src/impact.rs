// impact.rs
use bevy::prelude::*;
use log::debug;

use crate::sets::ResolveSet;

const HIT_STOP_TIME_SCALE: f32 = 0.05;
const HIT_STOP_DURATION: f32 = 0.12;

/// Fired when a swung or thrown body kills something at high speed.
#[derive(Event, Debug, Clone, Copy)]
pub struct ImpactFrameEvent {
    pub attacker: Entity,
    pub victim: Entity,
    pub speed: f32,
}

/// Brief global slow-motion on lethal high-speed impacts. Counts down in
/// real time since virtual time is the thing being slowed.
#[derive(Resource, Debug)]
pub struct HitStop {
    pub time_scale: f32,
    pub duration: f32,
    remaining: f32,
}

impl Default for HitStop {
    fn default() -> Self {
        Self {
            time_scale: HIT_STOP_TIME_SCALE,
            duration: HIT_STOP_DURATION,
            remaining: 0.0,
        }
    }
}

impl HitStop {
    pub fn is_active(&self) -> bool {
        self.remaining > 0.0
    }
}

fn trigger_hit_stop(
    mut events: EventReader<ImpactFrameEvent>,
    mut hit_stop: ResMut<HitStop>,
    mut time: ResMut<Time<Virtual>>,
) {
    let mut triggered = false;
    for ev in events.read() {
        debug!(
            "impact frame: {:?} killed {:?} at {:.2} m/s",
            ev.attacker, ev.victim, ev.speed
        );
        triggered = true;
    }
    if triggered {
        hit_stop.remaining = hit_stop.duration;
        time.set_relative_speed(hit_stop.time_scale);
    }
}

fn tick_hit_stop(
    real_time: Res<Time<Real>>,
    mut hit_stop: ResMut<HitStop>,
    mut time: ResMut<Time<Virtual>>,
) {
    if !hit_stop.is_active() {
        return;
    }
    hit_stop.remaining -= real_time.delta_secs();
    if hit_stop.remaining <= 0.0 {
        hit_stop.remaining = 0.0;
        time.set_relative_speed(1.0);
    }
}

pub struct ImpactPlugin;

impl Plugin for ImpactPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HitStop>()
            .add_event::<ImpactFrameEvent>()
            .add_systems(
                Update,
                (trigger_hit_stop, tick_hit_stop)
                    .chain()
                    .in_set(ResolveSet::React),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_stop_starts_inactive() {
        let hit_stop = HitStop::default();
        assert!(!hit_stop.is_active());
    }
}
