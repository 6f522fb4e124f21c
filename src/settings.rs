use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ArenaError;
use crate::math::clamp_finite;

pub const MAX_FOV_DEG: f32 = 360.0;
pub const MAX_WEIGHT: f32 = 1_000.0;
pub const MAX_DISTANCE: f32 = 100_000.0;
pub const MAX_SPEED: f32 = 10_000.0;
pub const MIN_CELL_SIZE: f32 = 0.5;
/// Largest usable group id; group and station tables are indexed by it.
pub const MAX_GROUP_ID: u32 = 1_024;

/// Index into the world's projectile template table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub usize);

/// Which point cohesion steers toward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohesionCentre {
    /// Centroid of the agent together with its qualifying neighbors.
    #[default]
    FlockIncludingSelf,
    /// Centroid of the qualifying neighbors only.
    NeighborsOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub move_speed: f32,
    pub max_move_speed: f32,
    pub look_speed: f32,

    pub boid_detect_radius: f32,
    pub boid_detect_fov: f32,

    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separation_weight: f32,
    pub cohesion_centre: CohesionCentre,
    /// Seconds after a hit during which an agent drops out of cohesion.
    pub hit_recovery: f32,

    pub obstacle_avoid_weight: f32,
    pub obstacle_view_dst: f32,

    pub chase_weight: f32,
    pub base_station_weight: f32,

    pub firing_view_dst: f32,
    pub firing_fov: f32,
    pub line_of_sight_weight: f32,

    pub map_centre: Vec3,
    pub map_radius: f32,
    pub map_radius_weight: f32,

    pub projectile_template: Option<TemplateId>,
    pub shoot_offset: Vec3,
    pub shoot_rate: f32,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            move_speed: 10.0,
            max_move_speed: 25.0,
            look_speed: 2.0,
            boid_detect_radius: 15.0,
            boid_detect_fov: 270.0,
            cohesion_weight: 0.5,
            alignment_weight: 2.0,
            separation_weight: 10.0,
            cohesion_centre: CohesionCentre::FlockIncludingSelf,
            hit_recovery: 0.5,
            obstacle_avoid_weight: 20.0,
            obstacle_view_dst: 20.0,
            chase_weight: 0.3,
            base_station_weight: 0.1,
            firing_view_dst: 60.0,
            firing_fov: 30.0,
            line_of_sight_weight: 4.0,
            map_centre: Vec3::ZERO,
            map_radius: 300.0,
            map_radius_weight: 0.5,
            projectile_template: None,
            shoot_offset: Vec3::new(0.0, 0.0, 2.0),
            shoot_rate: 1.0,
        }
    }
}

impl GroupSettings {
    /// Clamps every field into a finite, usable range.
    pub fn sanitize(&mut self) {
        let d = Self::default();
        self.move_speed = clamp_finite(self.move_speed, 0.0, MAX_SPEED, d.move_speed);
        self.max_move_speed =
            clamp_finite(self.max_move_speed, 0.0, MAX_SPEED, d.max_move_speed)
                .max(self.move_speed);
        self.look_speed = clamp_finite(self.look_speed, 0.0, MAX_WEIGHT, d.look_speed);

        self.boid_detect_radius = clamp_finite(
            self.boid_detect_radius,
            0.0,
            MAX_DISTANCE,
            d.boid_detect_radius,
        );
        self.boid_detect_fov = clamp_finite(self.boid_detect_fov, 0.0, MAX_FOV_DEG, d.boid_detect_fov);

        self.cohesion_weight = clamp_weight(self.cohesion_weight, d.cohesion_weight);
        self.alignment_weight = clamp_weight(self.alignment_weight, d.alignment_weight);
        self.separation_weight = clamp_weight(self.separation_weight, d.separation_weight);
        self.hit_recovery = clamp_finite(self.hit_recovery, 0.0, MAX_DISTANCE, d.hit_recovery);

        self.obstacle_avoid_weight =
            clamp_weight(self.obstacle_avoid_weight, d.obstacle_avoid_weight);
        self.obstacle_view_dst = clamp_finite(
            self.obstacle_view_dst,
            0.0,
            MAX_DISTANCE,
            d.obstacle_view_dst,
        );

        self.chase_weight = clamp_weight(self.chase_weight, d.chase_weight);
        self.base_station_weight = clamp_weight(self.base_station_weight, d.base_station_weight);

        self.firing_view_dst =
            clamp_finite(self.firing_view_dst, 0.0, MAX_DISTANCE, d.firing_view_dst);
        self.firing_fov = clamp_finite(self.firing_fov, 0.0, MAX_FOV_DEG, d.firing_fov);
        self.line_of_sight_weight =
            clamp_weight(self.line_of_sight_weight, d.line_of_sight_weight);

        if !self.map_centre.is_finite() {
            self.map_centre = d.map_centre;
        }
        self.map_radius = clamp_finite(self.map_radius, 0.0, MAX_DISTANCE, d.map_radius);
        self.map_radius_weight = clamp_weight(self.map_radius_weight, d.map_radius_weight);

        if !self.shoot_offset.is_finite() {
            self.shoot_offset = d.shoot_offset;
        }
        self.shoot_rate = clamp_finite(self.shoot_rate, 0.0, MAX_DISTANCE, d.shoot_rate);
    }

    /// Strict check used when loading configuration: rejects values that
    /// `sanitize` would have to silently replace.
    pub fn validate(&self) -> Result<(), ArenaError> {
        let non_negative = [
            (self.move_speed, "move_speed must be finite and non-negative"),
            (self.max_move_speed, "max_move_speed must be finite and non-negative"),
            (self.look_speed, "look_speed must be finite and non-negative"),
            (self.boid_detect_radius, "boid_detect_radius must be finite and non-negative"),
            (self.cohesion_weight, "cohesion_weight must be finite and non-negative"),
            (self.alignment_weight, "alignment_weight must be finite and non-negative"),
            (self.separation_weight, "separation_weight must be finite and non-negative"),
            (self.hit_recovery, "hit_recovery must be finite and non-negative"),
            (self.obstacle_avoid_weight, "obstacle_avoid_weight must be finite and non-negative"),
            (self.obstacle_view_dst, "obstacle_view_dst must be finite and non-negative"),
            (self.chase_weight, "chase_weight must be finite and non-negative"),
            (self.base_station_weight, "base_station_weight must be finite and non-negative"),
            (self.firing_view_dst, "firing_view_dst must be finite and non-negative"),
            (self.line_of_sight_weight, "line_of_sight_weight must be finite and non-negative"),
            (self.map_radius, "map_radius must be finite and non-negative"),
            (self.map_radius_weight, "map_radius_weight must be finite and non-negative"),
            (self.shoot_rate, "shoot_rate must be finite and non-negative"),
        ];
        for (value, message) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ArenaError::InvalidConfig(message));
            }
        }

        for (fov, message) in [
            (self.boid_detect_fov, "boid_detect_fov must be within [0, 360]"),
            (self.firing_fov, "firing_fov must be within [0, 360]"),
        ] {
            if !(0.0..=MAX_FOV_DEG).contains(&fov) {
                return Err(ArenaError::InvalidConfig(message));
            }
        }

        if !self.map_centre.is_finite() {
            return Err(ArenaError::InvalidConfig("map_centre must be finite"));
        }
        if !self.shoot_offset.is_finite() {
            return Err(ArenaError::InvalidConfig("shoot_offset must be finite"));
        }
        Ok(())
    }
}

fn clamp_weight(value: f32, fallback: f32) -> f32 {
    clamp_finite(value, 0.0, MAX_WEIGHT, fallback)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileTemplate {
    pub speed: f32,
    pub radius: f32,
    /// Seconds a fired projectile survives before it is reclaimed.
    pub lifetime: f32,
}

impl Default for ProjectileTemplate {
    fn default() -> Self {
        Self {
            speed: 120.0,
            radius: 0.25,
            lifetime: 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub position: Vec3,
    pub hp: f32,
    pub attract_radius: f32,
    pub radius: f32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            hp: 1_000.0,
            attract_radius: 80.0,
            radius: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub group_id: u32,
    pub settings: GroupSettings,
    pub spawn_count: u32,
    pub spawn_radius: f32,
    pub boid_hp: f32,
    pub boid_radius: f32,
    pub station: Option<StationConfig>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            group_id: 1,
            settings: GroupSettings::default(),
            spawn_count: 10,
            spawn_radius: 100.0,
            boid_hp: 100.0,
            boid_radius: 1.0,
            station: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub position: Vec3,
    pub radius: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 5.0,
        }
    }
}

/// Whole-run configuration, typically decoded from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Run seed; drawn from OS entropy when absent.
    pub seed: Option<u64>,
    pub cell_size: f32,
    pub projectiles: Vec<ProjectileTemplate>,
    pub groups: Vec<GroupConfig>,
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: None,
            cell_size: 20.0,
            projectiles: Vec::new(),
            groups: Vec::new(),
            obstacles: Vec::new(),
        }
    }
}

impl ArenaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ArenaError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        info!(
            groups = config.groups.len(),
            obstacles = config.obstacles.len(),
            "arena config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ArenaError> {
        if !self.cell_size.is_finite() || self.cell_size < MIN_CELL_SIZE {
            return Err(ArenaError::InvalidConfig("cell_size must be at least 0.5"));
        }
        for template in &self.projectiles {
            if !template.speed.is_finite() || template.speed < 0.0 {
                return Err(ArenaError::InvalidConfig(
                    "projectile speed must be finite and non-negative",
                ));
            }
            if !template.radius.is_finite() || template.radius < 0.0 {
                return Err(ArenaError::InvalidConfig(
                    "projectile radius must be finite and non-negative",
                ));
            }
            if !template.lifetime.is_finite() || template.lifetime <= 0.0 {
                return Err(ArenaError::InvalidConfig(
                    "projectile lifetime must be finite and positive",
                ));
            }
        }
        for (index, group) in self.groups.iter().enumerate() {
            if group.group_id == 0 {
                return Err(ArenaError::ReservedGroup);
            }
            if group.group_id > MAX_GROUP_ID {
                return Err(ArenaError::GroupOutOfRange(group.group_id));
            }
            if self.groups[..index]
                .iter()
                .any(|other| other.group_id == group.group_id)
            {
                return Err(ArenaError::DuplicateGroup(group.group_id));
            }
            group.settings.validate()?;
            if let Some(TemplateId(template)) = group.settings.projectile_template {
                if template >= self.projectiles.len() {
                    return Err(ArenaError::UnknownTemplate(template));
                }
            }
            if !group.spawn_radius.is_finite() || group.spawn_radius < 0.0 {
                return Err(ArenaError::InvalidConfig(
                    "spawn_radius must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }
}
