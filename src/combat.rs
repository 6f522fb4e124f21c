//! Target selection, lead aiming and firing.

use glam::{Quat, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slotmap::Key;
use tracing::{trace, warn};

use crate::effects::{EffectEvent, EffectsSink};
use crate::math::{direction_to, finite_or_zero, forward_of, look_rotation};
use crate::spatial::{broad_neighbours, SpatialQuery};
use crate::visibility::{sees, NeighborKind, Observer};
use crate::world::{EntityId, World};

pub const AIM_JITTER_MIN: f32 = 0.99;
pub const AIM_JITTER_MAX: f32 = 1.01;

pub fn can_fire(next_allow_shoot_time: f64, now: f64) -> bool {
    now >= next_allow_shoot_time
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetLock {
    pub entity: EntityId,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Nearest enemy boid or standing enemy station inside the firing cone.
pub fn select_target<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
) -> Option<TargetLock> {
    let settings = observer.settings;
    let mut best: Option<(TargetLock, f32)> = None;

    for candidate in broad_neighbours(space, observer.position, settings.firing_view_dst) {
        let position = [NeighborKind::EnemyBoid, NeighborKind::EnemyStation]
            .into_iter()
            .find_map(|kind| {
                sees(
                    world,
                    observer,
                    candidate,
                    kind,
                    settings.firing_view_dst,
                    settings.firing_fov,
                )
            });
        let Some(position) = position else {
            continue;
        };

        let dist_sq = (position - observer.position).length_squared();
        if best.map_or(true, |(_, closest)| dist_sq < closest) {
            let velocity = world.body(candidate).map_or(Vec3::ZERO, |body| body.velocity);
            best = Some((
                TargetLock {
                    entity: candidate,
                    position,
                    velocity,
                },
                dist_sq,
            ));
        }
    }

    best.map(|(lock, _)| lock)
}

/// Point to aim at so a projectile leaving `spawn` at `projectile_speed`
/// meets a target moving at `target_velocity`. Falls back to the target
/// itself when there is nothing to lead.
pub fn lead_aim_point(
    spawn: Vec3,
    target_position: Vec3,
    target_velocity: Vec3,
    projectile_speed: f32,
    modifier: f32,
) -> Vec3 {
    if !(projectile_speed > 0.0) || target_velocity == Vec3::ZERO {
        return target_position;
    }
    let travel_time = target_position.distance(spawn) / projectile_speed;
    target_position + finite_or_zero(target_velocity * travel_time * modifier)
}

fn jitter_seed(run_seed: u64, entity: EntityId, tick: u64) -> u64 {
    let bits = entity.data().as_ffi();
    run_seed
        ^ bits.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ tick.wrapping_mul(0xBF58_476D_1CE4_E5B9).rotate_left(31)
}

/// Per-shot aim modifier. Depends only on the run seed, the shooter and the
/// tick, so evaluation order never changes it.
pub fn aim_jitter(run_seed: u64, entity: EntityId, tick: u64) -> f32 {
    let mut rng = SmallRng::seed_from_u64(jitter_seed(run_seed, entity, tick));
    rng.gen_range(AIM_JITTER_MIN..=AIM_JITTER_MAX)
}

/// A decided shot, computed without touching the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotPlan {
    pub shooter: EntityId,
    pub target: TargetLock,
    pub spawn_position: Vec3,
    pub shooter_rotation: Quat,
    pub jitter: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotReport {
    pub shooter: EntityId,
    pub target: EntityId,
    pub projectile: EntityId,
    pub aim_point: Vec3,
}

/// Decides whether `observer`, now turned to `rotation`, takes a shot this
/// tick. Unarmed groups and agents still reloading never fire.
pub fn plan_shot<S: SpatialQuery + ?Sized>(
    world: &World,
    space: &S,
    observer: &Observer<'_>,
    rotation: Quat,
    now: f64,
    run_seed: u64,
    tick: u64,
) -> Option<ShotPlan> {
    observer.settings.projectile_template?;
    let boid = world.boid(observer.entity)?;
    if !can_fire(boid.next_allow_shoot_time, now) {
        return None;
    }

    let target = select_target(world, space, observer)?;
    Some(ShotPlan {
        shooter: observer.entity,
        target,
        spawn_position: observer.position + rotation * observer.settings.shoot_offset,
        shooter_rotation: rotation,
        jitter: aim_jitter(run_seed, observer.entity, tick),
    })
}

/// Spawns the projectile for `plan`, re-arms the shooter's cooldown and
/// flashes its muzzle.
pub fn fire<E: EffectsSink + ?Sized>(
    world: &mut World,
    plan: &ShotPlan,
    now: f64,
    effects: &mut E,
) -> Option<ShotReport> {
    let settings = *world.live_settings(plan.shooter)?;
    let template_id = settings.projectile_template?;
    let Some(template) = world.template(template_id).copied() else {
        debug_assert!(false, "projectile template {template_id:?} is not registered");
        warn!(shooter = ?plan.shooter, ?template_id, "projectile template is not registered");
        return None;
    };

    let aim_point = lead_aim_point(
        plan.spawn_position,
        plan.target.position,
        plan.target.velocity,
        template.speed,
        plan.jitter,
    );
    let shooter_forward = forward_of(plan.shooter_rotation);
    let shooter_up = plan.shooter_rotation * Vec3::Y;
    let direction = direction_to(plan.spawn_position, aim_point).unwrap_or(shooter_forward);
    let rotation = look_rotation(direction, shooter_up).unwrap_or(plan.shooter_rotation);

    let projectile = world.instantiate(template_id).ok()?;
    if let Some(body) = world.body_mut(projectile) {
        body.position = plan.spawn_position;
        body.rotation = rotation;
        body.velocity = forward_of(rotation) * template.speed;
    }
    if let Some(record) = world.projectile_mut(projectile) {
        record.owner = Some(plan.shooter);
        record.expires_at = Some(now + f64::from(template.lifetime));
    }
    if let Some(boid) = world.boid_mut(plan.shooter) {
        boid.next_allow_shoot_time = now + f64::from(settings.shoot_rate);
    }
    if world.effect_rig_mut(plan.shooter).is_some() {
        effects.emit(EffectEvent::MuzzleFlash {
            entity: plan.shooter,
            position: plan.spawn_position,
        });
    }

    trace!(
        shooter = ?plan.shooter,
        target = ?plan.target.entity,
        ?aim_point,
        "shot fired"
    );
    Some(ShotReport {
        shooter: plan.shooter,
        target: plan.target.entity,
        projectile,
        aim_point,
    })
}

#[cfg(test)]
mod tests {
    use super::{aim_jitter, can_fire, fire, lead_aim_point, plan_shot, select_target};
    use crate::effects::EffectEvent;
    use crate::grid::SpatialGrid;
    use crate::settings::{GroupSettings, ProjectileTemplate};
    use crate::visibility::Observer;
    use crate::world::{BoidSpawn, World};
    use glam::{Quat, Vec3};

    fn armed_world() -> World {
        let mut world = World::new();
        let template = world.add_template(ProjectileTemplate {
            speed: 100.0,
            radius: 0.2,
            lifetime: 1.5,
        });
        let settings = GroupSettings {
            projectile_template: Some(template),
            shoot_rate: 0.75,
            firing_view_dst: 50.0,
            firing_fov: 60.0,
            ..GroupSettings::default()
        };
        world.register_group(1, settings).unwrap();
        world.register_group(2, settings).unwrap();
        world
    }

    #[test]
    fn gate_opens_at_next_allowed_time() {
        assert!(!can_fire(2.0, 1.999));
        assert!(can_fire(2.0, 2.0));
        assert!(can_fire(0.0, 0.0));
    }

    #[test]
    fn lead_is_skipped_without_speed_or_motion() {
        let target = Vec3::new(0.0, 0.0, 40.0);
        assert_eq!(lead_aim_point(Vec3::ZERO, target, Vec3::ZERO, 100.0, 1.0), target);
        assert_eq!(lead_aim_point(Vec3::ZERO, target, Vec3::X, 0.0, 1.0), target);
    }

    #[test]
    fn lead_scales_with_travel_time() {
        let aim = lead_aim_point(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 40.0),
            Vec3::new(10.0, 0.0, 0.0),
            20.0,
            1.0,
        );
        assert!((aim - Vec3::new(20.0, 0.0, 40.0)).length() < 1.0e-4);
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let mut world = armed_world();
        let a = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        let b = world.spawn_boid(BoidSpawn::at(1, Vec3::X)).unwrap();
        for tick in 0..64 {
            let ja = aim_jitter(7, a, tick);
            assert_eq!(ja, aim_jitter(7, a, tick));
            assert!((0.99..=1.01).contains(&ja));
            assert!((0.99..=1.01).contains(&aim_jitter(7, b, tick)));
        }
    }

    #[test]
    fn nearest_enemy_is_selected() {
        let mut world = armed_world();
        let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        world.spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 30.0))).unwrap();
        let near = world.spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 12.0))).unwrap();
        world.spawn_boid(BoidSpawn::at(1, Vec3::new(0.0, 0.0, 5.0))).unwrap();
        world.spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, -3.0))).unwrap();

        let mut grid = SpatialGrid::default();
        grid.rebuild(&world);
        let observer = Observer::from_world(&world, me).unwrap();
        let lock = select_target(&world, &grid, &observer).unwrap();
        assert_eq!(lock.entity, near);
    }

    #[test]
    fn enemy_station_is_a_target() {
        let mut world = armed_world();
        let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        let station = world.spawn_station(2, Vec3::new(0.0, 0.0, 20.0), 100.0, 10.0, 2.0).unwrap();
        world.spawn_station(1, Vec3::new(0.0, 0.0, 8.0), 100.0, 10.0, 2.0).unwrap();

        let mut grid = SpatialGrid::default();
        grid.rebuild(&world);
        let observer = Observer::from_world(&world, me).unwrap();
        assert_eq!(
            select_target(&world, &grid, &observer).unwrap().entity,
            station
        );
    }

    #[test]
    fn firing_spawns_owned_projectile_and_rearms() {
        let mut world = armed_world();
        let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        let enemy = world
            .spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 30.0)))
            .unwrap();
        world.attach_effect_rig(me, Vec3::ZERO).unwrap();

        let mut grid = SpatialGrid::default();
        grid.rebuild(&world);
        let observer = Observer::from_world(&world, me).unwrap();
        let plan = plan_shot(&world, &grid, &observer, Quat::IDENTITY, 4.0, 1, 0).unwrap();
        assert_eq!(plan.target.entity, enemy);
        assert_eq!(plan.spawn_position, Vec3::new(0.0, 0.0, 2.0));

        let mut events = Vec::new();
        let report = fire(&mut world, &plan, 4.0, &mut events).unwrap();
        assert_eq!(report.aim_point, Vec3::new(0.0, 0.0, 30.0));

        let projectile = world.projectile(report.projectile).unwrap();
        assert_eq!(projectile.owner, Some(me));
        assert_eq!(projectile.expires_at, Some(5.5));
        let body = world.body(report.projectile).unwrap();
        assert_eq!(body.position, Vec3::new(0.0, 0.0, 2.0));
        assert!((body.velocity - Vec3::new(0.0, 0.0, 100.0)).length() < 1.0e-3);

        assert_eq!(world.boid(me).unwrap().next_allow_shoot_time, 4.75);
        assert_eq!(
            events,
            vec![EffectEvent::MuzzleFlash {
                entity: me,
                position: Vec3::new(0.0, 0.0, 2.0),
            }]
        );
    }

    #[test]
    fn reloading_or_unarmed_agents_do_not_plan() {
        let mut world = armed_world();
        world
            .register_group(3, GroupSettings::default())
            .unwrap();
        let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        let unarmed = world.spawn_boid(BoidSpawn::at(3, Vec3::X)).unwrap();
        world
            .spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 20.0)))
            .unwrap();
        world.boid_mut(me).unwrap().next_allow_shoot_time = 10.0;

        let mut grid = SpatialGrid::default();
        grid.rebuild(&world);
        let observer = Observer::from_world(&world, me).unwrap();
        assert!(plan_shot(&world, &grid, &observer, Quat::IDENTITY, 9.5, 1, 0).is_none());
        assert!(plan_shot(&world, &grid, &observer, Quat::IDENTITY, 10.0, 1, 0).is_some());

        let observer = Observer::from_world(&world, unarmed).unwrap();
        assert!(plan_shot(&world, &grid, &observer, Quat::IDENTITY, 10.0, 1, 0).is_none());
    }
}
