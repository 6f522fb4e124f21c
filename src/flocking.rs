use glam::Vec3;

use crate::math::{direction_to, finite_or_zero, normalize_or, normalize_or_zero, up_of};
use crate::settings::{CohesionCentre, GroupSettings};
use crate::spatial::{broad_neighbours, SpatialQuery};
use crate::visibility::{can_see, classify, NeighborKind, Observer};
use crate::world::World;

/// An agent hit less than `recovery` seconds ago is still shaken and drops
/// out of cohesion, alignment and up averaging.
pub fn is_recently_hit(hit_time: Option<f64>, now: f64, recovery: f32) -> bool {
    match hit_time {
        Some(hit) => now - hit < f64::from(recovery),
        None => false,
    }
}

/// How one visible neighbor feeds the flocking sums.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlockRole {
    Ignored,
    /// Enemies and shaken friends: pushed away from, never followed.
    SeparationOnly,
    SeparationAndCohesion,
}

pub fn flock_role(kind: NeighborKind, recently_hit: bool) -> FlockRole {
    match kind {
        NeighborKind::EnemyBoid => FlockRole::SeparationOnly,
        NeighborKind::FriendlyBoid if recently_hit => FlockRole::SeparationOnly,
        NeighborKind::FriendlyBoid => FlockRole::SeparationAndCohesion,
        _ => FlockRole::Ignored,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlockSums {
    pub sum_position: Vec3,
    pub sum_velocity: Vec3,
    pub sum_up: Vec3,
    pub cohesion_count: usize,
    pub sum_away: Vec3,
    pub separation_count: usize,
}

impl FlockSums {
    pub fn add(&mut self, role: FlockRole, self_pos: Vec3, position: Vec3, velocity: Vec3, up: Vec3) {
        if role == FlockRole::Ignored {
            return;
        }
        if let Some(away) = direction_to(position, self_pos) {
            self.sum_away += away;
            self.separation_count += 1;
        }
        if role == FlockRole::SeparationAndCohesion {
            self.sum_position += position;
            self.sum_velocity += velocity;
            self.sum_up += up;
            self.cohesion_count += 1;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlockForces {
    pub cohesion: Vec3,
    pub alignment: Vec3,
    pub separation: Vec3,
    /// Averaged neighbor up; `None` leaves the agent's own up unchanged.
    pub up: Option<Vec3>,
}

impl FlockForces {
    pub fn total(&self) -> Vec3 {
        self.cohesion + self.alignment + self.separation
    }
}

pub fn finish(
    sums: &FlockSums,
    self_pos: Vec3,
    self_velocity: Vec3,
    self_up: Vec3,
    settings: &GroupSettings,
) -> FlockForces {
    let mut forces = FlockForces::default();

    if sums.cohesion_count > 0 {
        let n = sums.cohesion_count as f32;
        let centre = match settings.cohesion_centre {
            CohesionCentre::NeighborsOnly => sums.sum_position / n,
            CohesionCentre::FlockIncludingSelf => (sums.sum_position + self_pos) / (n + 1.0),
        };
        forces.cohesion = finite_or_zero((centre - self_pos) * settings.cohesion_weight);

        let average_velocity = sums.sum_velocity / n;
        forces.alignment = finite_or_zero(
            normalize_or_zero(average_velocity - self_velocity) * settings.alignment_weight,
        );

        forces.up = Some(normalize_or(sums.sum_up / n, self_up));
    }

    if sums.separation_count > 0 {
        let average_away = sums.sum_away / sums.separation_count as f32;
        forces.separation = finite_or_zero(average_away * settings.separation_weight);
    }

    forces
}

/// Scans the detection sphere once and aggregates cohesion, alignment,
/// separation and up for `observer`.
pub fn flock_forces<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
    now: f64,
) -> FlockForces {
    let settings = observer.settings;
    let mut sums = FlockSums::default();

    for candidate in broad_neighbours(space, observer.position, settings.boid_detect_radius) {
        let kind = classify(world, observer, candidate);
        if !matches!(kind, NeighborKind::FriendlyBoid | NeighborKind::EnemyBoid) {
            continue;
        }
        let (Some(body), Some(boid)) = (world.body(candidate), world.boid(candidate)) else {
            continue;
        };
        if !can_see(
            observer.position,
            observer.forward,
            body.position,
            settings.boid_detect_radius,
            settings.boid_detect_fov,
        ) {
            continue;
        }

        let recently_hit = is_recently_hit(boid.hit_time, now, settings.hit_recovery);
        sums.add(
            flock_role(kind, recently_hit),
            observer.position,
            body.position,
            body.velocity,
            up_of(body.rotation),
        );
    }

    finish(
        &sums,
        observer.position,
        observer.velocity,
        observer.up,
        settings,
    )
}
