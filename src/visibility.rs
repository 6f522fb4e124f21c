//! Field-of-view checks and neighbor classification.

use glam::Vec3;

use crate::math::{angle_between_deg, direction_to, forward_of, up_of};
use crate::settings::GroupSettings;
use crate::world::{EntityId, World};

/// True when `target` lies within `view_distance` of the observer and no more
/// than `view_angle / 2` degrees off its forward axis. A target on top of the
/// observer has no direction and is never visible.
pub fn can_see(
    observer_pos: Vec3,
    observer_forward: Vec3,
    target_pos: Vec3,
    view_distance: f32,
    view_angle: f32,
) -> bool {
    let delta = target_pos - observer_pos;
    if !(delta.length_squared() <= view_distance * view_distance) {
        return false;
    }
    let Some(dir) = direction_to(observer_pos, target_pos) else {
        return false;
    };
    if view_angle >= 360.0 {
        return true;
    }
    angle_between_deg(observer_forward, dir) <= view_angle * 0.5
}

/// The evaluating agent's view of itself for one tick.
#[derive(Clone, Copy, Debug)]
pub struct Observer<'a> {
    pub entity: EntityId,
    pub group_id: u32,
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub velocity: Vec3,
    pub settings: &'a GroupSettings,
}

impl<'a> Observer<'a> {
    /// `None` for anything that is not a live boid with resolvable settings.
    pub fn from_world(world: &'a World, entity: EntityId) -> Option<Self> {
        let settings = world.live_settings(entity)?;
        let boid = world.boid(entity)?;
        let body = world.body(entity)?;
        Some(Self {
            entity,
            group_id: boid.group_id,
            position: body.position,
            forward: forward_of(body.rotation),
            up: up_of(body.rotation),
            velocity: body.velocity,
            settings,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborKind {
    Oneself,
    FriendlyBoid,
    EnemyBoid,
    /// Dead or settings-less boid; still physical geometry.
    InertBoid,
    FriendlyStation,
    EnemyStation,
    DestroyedStation,
    Projectile,
    Obstacle,
    Unknown,
}

pub fn classify(world: &World, observer: &Observer<'_>, candidate: EntityId) -> NeighborKind {
    if candidate == observer.entity {
        return NeighborKind::Oneself;
    }
    if let Some(boid) = world.boid(candidate) {
        if !world.is_live_boid(candidate) {
            return NeighborKind::InertBoid;
        }
        return if boid.group_id == observer.group_id {
            NeighborKind::FriendlyBoid
        } else {
            NeighborKind::EnemyBoid
        };
    }
    if let Some(station) = world.station(candidate) {
        if station.hp <= 0.0 {
            return NeighborKind::DestroyedStation;
        }
        return if station.group_id == observer.group_id {
            NeighborKind::FriendlyStation
        } else {
            NeighborKind::EnemyStation
        };
    }
    if world.has_projectile(candidate) {
        return NeighborKind::Projectile;
    }
    if world.has_obstacle(candidate) {
        return NeighborKind::Obstacle;
    }
    NeighborKind::Unknown
}

/// Position of `candidate` when it is of `kind` and inside the given view
/// cone.
pub fn sees(
    world: &World,
    observer: &Observer<'_>,
    candidate: EntityId,
    kind: NeighborKind,
    view_distance: f32,
    view_angle: f32,
) -> Option<Vec3> {
    if classify(world, observer, candidate) != kind {
        return None;
    }
    let position = world.body(candidate)?.position;
    can_see(
        observer.position,
        observer.forward,
        position,
        view_distance,
        view_angle,
    )
    .then_some(position)
}
