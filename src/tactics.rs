//! Obstacle avoidance, chase, containment, line-of-sight and station pulls,
//! plus the rule that combines them with flocking.

use glam::Vec3;

use crate::flocking::FlockForces;
use crate::math::{direction_to, finite_or_zero, normalize_or_zero, side_of, sign_or_one};
use crate::settings::GroupSettings;
use crate::spatial::{broad_neighbours, QueryFilter, RayHit, SpatialQuery};
use crate::stations::StationTable;
use crate::visibility::{sees, NeighborKind, Observer};
use crate::world::World;

/// First ray hit that counts as something to steer around: not the agent,
/// not a projectile, and not an enemy boid that is still far away.
pub fn first_obstacle<'h>(
    world: &World,
    observer: &Observer<'_>,
    hits: &'h [RayHit],
) -> Option<&'h RayHit> {
    let detect_sq = observer.settings.boid_detect_radius * observer.settings.boid_detect_radius;
    hits.iter().find(|hit| {
        if hit.entity == observer.entity || world.has_projectile(hit.entity) {
            return false;
        }
        match world.boid(hit.entity) {
            Some(boid) if boid.group_id != observer.group_id => {
                (hit.position - observer.position).length_squared() < detect_sq
            }
            _ => true,
        }
    })
}

pub fn obstacle_force<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
) -> Vec3 {
    let settings = observer.settings;
    if settings.obstacle_view_dst <= 0.0 {
        return Vec3::ZERO;
    }
    let end = observer.position + observer.forward * settings.obstacle_view_dst;
    let hits = space.cast_ray(observer.position, end, QueryFilter::EVERYTHING);
    let Some(hit) = first_obstacle(world, observer, &hits) else {
        return Vec3::ZERO;
    };

    let overlap = settings.obstacle_view_dst - (observer.position - hit.position).length();
    finite_or_zero(hit.normal * overlap * settings.obstacle_avoid_weight)
}

/// A nonzero obstacle force takes over the whole move force for the tick.
pub fn obstacle_overrides(obstacle: Vec3) -> bool {
    obstacle != Vec3::ZERO
}

pub fn chase_force<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
) -> Vec3 {
    let settings = observer.settings;
    let detect_sq = settings.boid_detect_radius * settings.boid_detect_radius;
    let mut nearest: Option<(Vec3, f32)> = None;

    for candidate in broad_neighbours(space, observer.position, settings.firing_view_dst) {
        let Some(position) = sees(
            world,
            observer,
            candidate,
            NeighborKind::EnemyBoid,
            settings.firing_view_dst,
            settings.firing_fov,
        ) else {
            continue;
        };
        let dist_sq = (position - observer.position).length_squared();
        if dist_sq <= detect_sq {
            continue;
        }
        if nearest.map_or(true, |(_, best)| dist_sq < best) {
            nearest = Some((position, dist_sq));
        }
    }

    nearest.map_or(Vec3::ZERO, |(target, _)| {
        finite_or_zero((target - observer.position) * settings.chase_weight)
    })
}

pub fn map_containment_force(position: Vec3, settings: &GroupSettings) -> Vec3 {
    let delta = settings.map_centre - position;
    let distance = delta.length();
    if !(distance > settings.map_radius) {
        return Vec3::ZERO;
    }
    finite_or_zero(
        normalize_or_zero(delta) * (distance - settings.map_radius) * settings.map_radius_weight,
    )
}

/// Lateral nudge away from friends sitting in the firing cone, so agents
/// stop lining up behind each other.
pub fn line_of_sight_force<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
    up: Vec3,
) -> Vec3 {
    let settings = observer.settings;
    let side = side_of(observer.forward, up);
    let mut sum = Vec3::ZERO;

    for candidate in broad_neighbours(space, observer.position, settings.firing_view_dst) {
        let Some(position) = sees(
            world,
            observer,
            candidate,
            NeighborKind::FriendlyBoid,
            settings.firing_view_dst,
            settings.firing_fov,
        ) else {
            continue;
        };
        let Some(delta) = direction_to(observer.position, position) else {
            continue;
        };
        sum += delta.cross(side) * sign_or_one(up.dot(delta));
    }

    finite_or_zero(sum * settings.line_of_sight_weight)
}

pub fn base_station_force(
    position: Vec3,
    group_id: u32,
    settings: &GroupSettings,
    stations: &StationTable,
) -> Vec3 {
    let Some(station) = stations.nearest_attractor(position, group_id) else {
        return Vec3::ZERO;
    };
    let delta = station.position - position;
    let distance = delta.length();
    finite_or_zero(
        normalize_or_zero(delta)
            * (distance - station.attract_radius)
            * settings.base_station_weight,
    )
}

/// Every contribution evaluated for one agent in one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceBreakdown {
    pub obstacle: Vec3,
    pub flocking: FlockForces,
    pub chase: Vec3,
    pub containment: Vec3,
    pub base_station: Vec3,
    pub line_of_sight: Vec3,
}

impl ForceBreakdown {
    /// Move force before forward thrust. Line of sight is kept apart.
    pub fn combined(&self) -> Vec3 {
        if obstacle_overrides(self.obstacle) {
            return self.obstacle;
        }
        self.flocking.total() + self.chase + self.containment + self.base_station
    }
}
