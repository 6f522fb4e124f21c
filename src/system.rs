//! Two-phase per-tick scheduler: steer every agent from the last finalized
//! state, then integrate, resolve combat and sync effects.

use glam::{Quat, Vec3};
use tracing::debug;

use crate::combat::{fire, plan_shot, ShotPlan, ShotReport};
use crate::effects::{sync_rig, EffectsSink};
use crate::flocking::flock_forces;
use crate::math::{clamp_finite, direction_to, finite_or_zero, limit_magnitude, look_rotation};
use crate::settings::GroupSettings;
use crate::spatial::SpatialQuery;
use crate::stations::StationTable;
use crate::tactics::{
    base_station_force, chase_force, line_of_sight_force, map_containment_force, obstacle_force,
    obstacle_overrides, ForceBreakdown,
};
use crate::visibility::Observer;
use crate::world::{Body, Boid, EntityId, World};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickTime {
    /// Simulation time at the start of this tick, in seconds.
    pub elapsed: f64,
    pub delta: f32,
    pub tick: u64,
}

/// Per-tick outputs written back onto an agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Steering {
    pub entity: EntityId,
    pub move_force: Vec3,
    pub target_up: Vec3,
    pub line_of_sight_force: Vec3,
}

/// Gathers every force for one live, autonomous agent. Reads only.
pub fn compute_steering<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    stations: &StationTable,
    entity: EntityId,
    now: f64,
) -> Option<Steering> {
    if world.is_manual(entity) {
        return None;
    }
    let observer = Observer::from_world(world, entity)?;
    let settings = observer.settings;

    let thrust = observer.forward * settings.move_speed;
    let obstacle = obstacle_force(world, space, &observer);
    // Avoidance replaces flocking, tactics and line of sight; up is held.
    if obstacle_overrides(obstacle) {
        return Some(Steering {
            entity,
            move_force: finite_or_zero(obstacle + thrust),
            target_up: observer.up,
            line_of_sight_force: Vec3::ZERO,
        });
    }

    let flocking = flock_forces(world, space, &observer, now);
    let target_up = flocking.up.unwrap_or(observer.up);
    let breakdown = ForceBreakdown {
        obstacle,
        flocking,
        chase: chase_force(world, space, &observer),
        containment: map_containment_force(observer.position, settings),
        base_station: base_station_force(
            observer.position,
            observer.group_id,
            settings,
            stations,
        ),
        line_of_sight: line_of_sight_force(world, space, &observer, target_up),
    };

    Some(Steering {
        entity,
        move_force: finite_or_zero(breakdown.combined() + thrust),
        target_up,
        line_of_sight_force: breakdown.line_of_sight,
    })
}

/// Velocity and orientation after applying the stored forces for `dt`.
pub fn integrate(body: &Body, boid: &Boid, settings: &GroupSettings, dt: f32) -> (Vec3, Quat) {
    let accel = boid.move_force + boid.line_of_sight_force;
    let velocity = finite_or_zero(limit_magnitude(
        body.velocity + accel * dt,
        settings.max_move_speed,
    ));

    let look = direction_to(Vec3::ZERO, velocity).and_then(|dir| look_rotation(dir, boid.target_up));
    let rotation = match look {
        Some(look) => {
            let t = (settings.look_speed * dt).clamp(0.0, 1.0);
            let turned = body.rotation.slerp(look, t).normalize();
            if turned.is_finite() {
                turned
            } else {
                body.rotation
            }
        }
        None => body.rotation,
    };
    (velocity, rotation)
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Advance {
    entity: EntityId,
    velocity: Vec3,
    rotation: Quat,
    shot: Option<ShotPlan>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub live_agents: usize,
    pub steered: usize,
    pub shots: Vec<ShotReport>,
}

#[cfg(feature = "parallel")]
fn map_agents<T, F>(ids: &[EntityId], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(EntityId) -> Option<T> + Sync + Send,
{
    ids.par_iter().filter_map(|&id| f(id)).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_agents<T, F>(ids: &[EntityId], f: F) -> Vec<T>
where
    F: Fn(EntityId) -> Option<T>,
{
    ids.iter().filter_map(|&id| f(id)).collect()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoidSystem {
    pub run_seed: u64,
}

impl BoidSystem {
    pub fn new(run_seed: u64) -> Self {
        Self { run_seed }
    }

    pub fn tick<S, E>(
        &self,
        world: &mut World,
        space: &S,
        effects: &mut E,
        time: TickTime,
    ) -> TickReport
    where
        S: SpatialQuery + ?Sized,
        E: EffectsSink + ?Sized,
    {
        let now = time.elapsed;
        let dt = clamp_finite(time.delta, 0.0, f32::MAX, 0.0);
        let stations = StationTable::capture(world);
        let ids: Vec<EntityId> = world.boid_ids().collect();

        let steering = {
            let world = &*world;
            map_agents(&ids, |id| compute_steering(world, space, &stations, id, now))
        };
        let steered = steering.len();
        for out in &steering {
            if let Some(boid) = world.boid_mut(out.entity) {
                boid.move_force = out.move_force;
                boid.target_up = out.target_up;
                boid.line_of_sight_force = out.line_of_sight_force;
            }
        }

        let run_seed = self.run_seed;
        let advances = {
            let world = &*world;
            map_agents(&ids, |id| {
                let settings = world.live_settings(id)?;
                let body = world.body(id)?;
                let boid = world.boid(id)?;
                let (velocity, rotation) = integrate(body, boid, settings, dt);

                let shot = if world.is_manual(id) {
                    None
                } else {
                    let mut observer = Observer::from_world(world, id)?;
                    observer.forward = rotation * Vec3::Z;
                    observer.up = rotation * Vec3::Y;
                    observer.velocity = velocity;
                    plan_shot(world, space, &observer, rotation, now, run_seed, time.tick)
                };
                Some(Advance {
                    entity: id,
                    velocity,
                    rotation,
                    shot,
                })
            })
        };
        let live_agents = advances.len();

        for advance in &advances {
            if let Some(body) = world.body_mut(advance.entity) {
                body.velocity = advance.velocity;
                body.rotation = advance.rotation;
            }
        }

        let mut shots = Vec::new();
        for plan in advances.iter().filter_map(|advance| advance.shot.as_ref()) {
            if let Some(report) = fire(world, plan, now, &mut *effects) {
                shots.push(report);
            }
        }

        for &id in &ids {
            let (Some(boid), Some(body)) = (world.boid(id).copied(), world.body(id).copied()) else {
                continue;
            };
            if let Some(rig) = world.effect_rig_mut(id) {
                sync_rig(id, rig, &boid, &body, now, dt, &mut *effects);
            }
        }

        debug!(
            tick = time.tick,
            live_agents,
            steered,
            shots = shots.len(),
            "boid tick"
        );
        TickReport {
            live_agents,
            steered,
            shots,
        }
    }
}
