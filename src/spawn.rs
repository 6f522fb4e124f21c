use glam::{Quat, Vec3};
use rand::Rng;
use tracing::info;

use crate::error::ArenaError;
use crate::math::look_rotation;
use crate::settings::{ArenaConfig, GroupConfig};
use crate::world::{BoidSpawn, EntityId, World};

/// Uniform random unit vector, by rejection sampling the unit ball.
pub fn random_direction<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let len_sq = v.length_squared();
        if len_sq > 1.0e-4 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}

/// Scatters `group.spawn_count` boids around the group's map centre on the
/// y = 0 plane, each already cruising at move speed in a random horizontal
/// direction.
pub fn spawn_group<R: Rng>(
    world: &mut World,
    rng: &mut R,
    group: &GroupConfig,
) -> Result<Vec<EntityId>, ArenaError> {
    let settings = *world
        .group_settings(group.group_id)
        .ok_or(ArenaError::UnknownGroup(group.group_id))?;

    let mut spawned = Vec::with_capacity(group.spawn_count as usize);
    for _ in 0..group.spawn_count {
        let mut position = random_direction(rng) * group.spawn_radius + settings.map_centre;
        position.y = 0.0;

        let mut velocity = random_direction(rng) * settings.move_speed;
        velocity.y = 0.0;
        let rotation = look_rotation(velocity, Vec3::Y).unwrap_or(Quat::IDENTITY);

        let mut spawn = BoidSpawn::at(group.group_id, position)
            .facing(rotation)
            .moving(velocity)
            .with_hp(group.boid_hp);
        spawn.radius = group.boid_radius;

        let id = world.spawn_boid(spawn)?;
        world.attach_effect_rig(id, Vec3::new(0.0, 0.0, -group.boid_radius))?;
        spawned.push(id);
    }
    Ok(spawned)
}

/// Builds a populated world from a validated config: templates, groups with
/// their stations, obstacles, then every group's boids.
pub fn build_world<R: Rng>(
    config: &ArenaConfig,
    rng: &mut R,
) -> Result<World, ArenaError> {
    config.validate()?;
    let mut world = World::new();

    for template in &config.projectiles {
        world.add_template(*template);
    }
    for group in &config.groups {
        world.register_group(group.group_id, group.settings)?;
        if let Some(station) = &group.station {
            world.spawn_station(
                group.group_id,
                station.position,
                station.hp,
                station.attract_radius,
                station.radius,
            )?;
        }
    }
    for obstacle in &config.obstacles {
        world.spawn_obstacle(obstacle.position, obstacle.radius);
    }

    let mut total = 0;
    for group in &config.groups {
        total += spawn_group(&mut world, rng, group)?.len();
    }
    info!(boids = total, groups = config.groups.len(), "arena populated");
    Ok(world)
}
