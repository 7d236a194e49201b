// archetype.rs
use std::collections::HashMap;

use bevy::prelude::*;
use log::info;
use serde::Deserialize;

use crate::capture::Capturable;
use crate::enemy::{DeathPolicy, EnemyConfig};
use crate::health::Health;
use crate::knockback::Knockback;
use crate::stun::Stun;

/// One enemy archetype as authored in JSON. Everything an archetype needs to
/// become component state lives here; the builder methods below do the
/// mapping.
#[derive(Debug, Clone, Deserialize, Reflect)]
pub struct EnemyArchetype {
    pub id: String,
    pub display_name: String,
    pub max_health: i32,
    pub flying: bool,

    pub patrol_speed: f32,
    pub patrol_wait_time: f32,
    pub waypoint_reach_distance: f32,
    pub detection_range: f32,
    pub chase_speed: f32,
    pub lose_target_distance: f32,
    pub attack_range: f32,
    pub attack_cooldown: f32,
    pub attack_damage: i32,
    pub attack_windup_time: f32,
    pub attack_radius: f32,
    pub attack_offset: f32,
    pub requires_line_of_sight: bool,
    pub vision_check_interval: f32,
    pub lose_line_of_sight_delay: f32,

    pub stun_decay_base_rate: f32,
    pub stun_decay_slowdown_factor: f32,
    pub stun_movement_impact_max: f32,
    pub stun_full_stop_threshold: f32,

    pub knockback_enabled: bool,
    pub knockback_distance: f32,
    pub knockback_duration: f32,

    pub capture_difficulty: f32,
    pub capture_stun_to_progress: f32,
    pub capture_require_minimum_stun: bool,
    pub capture_minimum_stun: f32,

    pub revives: bool,
    pub death_delay: f32,
}

impl EnemyArchetype {
    pub fn config(&self) -> EnemyConfig {
        EnemyConfig {
            patrol_speed: self.patrol_speed,
            patrol_wait_time: self.patrol_wait_time,
            waypoint_reach_distance: self.waypoint_reach_distance,
            detection_range: self.detection_range,
            chase_speed: self.chase_speed,
            lose_target_distance: self.lose_target_distance,
            attack_range: self.attack_range,
            attack_cooldown: self.attack_cooldown,
            attack_damage: self.attack_damage,
            attack_windup_time: self.attack_windup_time,
            attack_radius: self.attack_radius,
            attack_offset: self.attack_offset,
            requires_line_of_sight: self.requires_line_of_sight,
            vision_check_interval: self.vision_check_interval,
            lose_line_of_sight_delay: self.lose_line_of_sight_delay,
            flying: self.flying,
        }
    }

    pub fn health(&self) -> Health {
        Health::new(self.max_health)
    }

    pub fn stun(&self) -> Stun {
        let mut stun = Stun::default();
        stun.decay_base_rate = self.stun_decay_base_rate;
        stun.decay_slowdown_factor = self.stun_decay_slowdown_factor;
        stun.movement_impact_max = self.stun_movement_impact_max;
        stun.full_stop_threshold = self.stun_full_stop_threshold;
        stun
    }

    pub fn knockback(&self) -> Knockback {
        if self.knockback_enabled {
            Knockback::new(self.knockback_distance, self.knockback_duration)
        } else {
            Knockback::disabled()
        }
    }

    pub fn capturable(&self) -> Capturable {
        let mut capturable = Capturable::default();
        capturable.difficulty = self.capture_difficulty;
        capturable.stun_to_progress = self.capture_stun_to_progress;
        capturable.require_minimum_stun = self.capture_require_minimum_stun;
        capturable.minimum_stun = self.capture_minimum_stun;
        capturable
    }

    pub fn death_policy(&self) -> DeathPolicy {
        if self.revives {
            DeathPolicy::Revive {
                delay: self.death_delay,
            }
        } else {
            DeathPolicy::Despawn {
                delay: self.death_delay,
            }
        }
    }
}

/// Top-level archetype file loaded from JSON.
#[derive(Debug, Clone, Deserialize, Reflect)]
pub struct ArchetypeFile {
    pub enemies: Vec<EnemyArchetype>,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct ArchetypeLibrary {
    by_id: HashMap<String, EnemyArchetype>,
}

impl ArchetypeLibrary {
    pub fn get(&self, id: &str) -> Option<&EnemyArchetype> {
        self.by_id.get(id)
    }

    pub fn insert(&mut self, archetype: EnemyArchetype) {
        self.by_id.insert(archetype.id.clone(), archetype);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Resource, Clone)]
struct ArchetypePluginConfig {
    path: String,
}

pub struct EnemyArchetypePlugin {
    config: ArchetypePluginConfig,
}

impl EnemyArchetypePlugin {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            config: ArchetypePluginConfig { path: path.into() },
        }
    }
}

impl Plugin for EnemyArchetypePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone())
            .register_type::<EnemyArchetype>()
            .register_type::<ArchetypeFile>()
            .add_systems(PreStartup, load_archetypes_from_json);
    }
}

fn load_archetypes_from_json(mut commands: Commands, cfg: Res<ArchetypePluginConfig>) {
    let path = &cfg.path;
    let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
        panic!("Failed to read enemy archetype JSON at {path}: {e}");
    });
    let file: ArchetypeFile = serde_json::from_str(&json).unwrap_or_else(|e| {
        panic!("Invalid enemy archetype JSON format for {path}: {e}");
    });

    let mut library = ArchetypeLibrary::default();
    for archetype in file.enemies {
        library.insert(archetype);
    }
    info!("loaded {} enemy archetypes from {path}", library.len());
    commands.insert_resource(library);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureState;

    const SAMPLE: &str = r#"{
        "enemies": [{
            "id": "bandit",
            "display_name": "Bandit",
            "max_health": 50,
            "flying": false,
            "patrol_speed": 2.0,
            "patrol_wait_time": 2.0,
            "waypoint_reach_distance": 0.2,
            "detection_range": 5.0,
            "chase_speed": 4.0,
            "lose_target_distance": 8.0,
            "attack_range": 1.5,
            "attack_cooldown": 1.5,
            "attack_damage": 10,
            "attack_windup_time": 0.3,
            "attack_radius": 1.0,
            "attack_offset": 0.75,
            "requires_line_of_sight": true,
            "vision_check_interval": 0.2,
            "lose_line_of_sight_delay": 1.0,
            "stun_decay_base_rate": 10.0,
            "stun_decay_slowdown_factor": 0.5,
            "stun_movement_impact_max": 0.9,
            "stun_full_stop_threshold": 95.0,
            "knockback_enabled": true,
            "knockback_distance": 2.33,
            "knockback_duration": 0.2,
            "capture_difficulty": 0.5,
            "capture_stun_to_progress": 0.8,
            "capture_require_minimum_stun": false,
            "capture_minimum_stun": 30.0,
            "revives": false,
            "death_delay": 2.0
        }]
    }"#;

    #[test]
    fn archetype_file_parses_and_builds_components() {
        let file: ArchetypeFile = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(file.enemies.len(), 1);

        let archetype = &file.enemies[0];
        assert_eq!(archetype.id, "bandit");

        let config = archetype.config();
        assert_eq!(config.attack_damage, 10);
        assert!(config.requires_line_of_sight);

        let health = archetype.health();
        assert_eq!(health.max(), 50);

        let stun = archetype.stun();
        assert_eq!(stun.full_stop_threshold, 95.0);
        assert!(!stun.is_stunned());

        let capturable = archetype.capturable();
        assert_eq!(capturable.difficulty, 0.5);
        assert_eq!(capturable.state(), CaptureState::Idle);

        let kb = archetype.knockback();
        assert!(kb.enabled);
        assert!(matches!(
            archetype.death_policy(),
            DeathPolicy::Despawn { .. }
        ));
    }

    #[test]
    fn library_lookup_by_id() {
        let file: ArchetypeFile = serde_json::from_str(SAMPLE).unwrap();
        let mut library = ArchetypeLibrary::default();
        for archetype in file.enemies {
            library.insert(archetype);
        }
        assert!(library.get("bandit").is_some());
        assert!(library.get("ghost").is_none());
    }
}
