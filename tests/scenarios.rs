use boid_arena::flocking::flock_forces;
use boid_arena::math::look_rotation;
use boid_arena::tactics::map_containment_force;
use boid_arena::visibility::Observer;
use boid_arena::{
    BoidSpawn, BoidSystem, EffectEvent, EntityId, GroupSettings, ProjectileTemplate, SpatialGrid,
    TickReport, TickTime, World,
};
use glam::{Quat, Vec3};

fn flocking_only() -> GroupSettings {
    GroupSettings {
        cohesion_weight: 1.0,
        alignment_weight: 0.0,
        separation_weight: 0.0,
        boid_detect_radius: 15.0,
        boid_detect_fov: 180.0,
        ..GroupSettings::default()
    }
}

fn facing(dir: Vec3) -> Quat {
    look_rotation(dir, Vec3::Y).unwrap()
}

fn run_tick(
    world: &mut World,
    system: &BoidSystem,
    events: &mut Vec<EffectEvent>,
    tick: u64,
    dt: f32,
) -> TickReport {
    let mut grid = SpatialGrid::default();
    grid.rebuild(world);
    system.tick(
        world,
        &grid,
        events,
        TickTime {
            elapsed: tick as f64 * f64::from(dt),
            delta: dt,
            tick,
        },
    )
}

fn armed_world() -> (World, EntityId, EntityId) {
    let mut world = World::new();
    let template = world.add_template(ProjectileTemplate {
        speed: 80.0,
        radius: 0.2,
        lifetime: 5.0,
    });
    world
        .register_group(
            1,
            GroupSettings {
                projectile_template: Some(template),
                shoot_rate: 1.0,
                ..GroupSettings::default()
            },
        )
        .unwrap();
    world.register_group(2, GroupSettings::default()).unwrap();

    let shooter = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
    let target = world
        .spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 30.0)))
        .unwrap();
    (world, shooter, target)
}

#[test]
fn two_friends_pull_halfway_toward_each_other() {
    let mut world = World::new();
    world.register_group(1, flocking_only()).unwrap();
    let a = world
        .spawn_boid(BoidSpawn::at(1, Vec3::ZERO).facing(facing(Vec3::X)))
        .unwrap();
    let b = world
        .spawn_boid(BoidSpawn::at(1, Vec3::new(10.0, 0.0, 0.0)).facing(facing(-Vec3::X)))
        .unwrap();
    let mut grid = SpatialGrid::default();
    grid.rebuild(&world);

    let from_a = flock_forces(&world, &grid, &Observer::from_world(&world, a).unwrap(), 0.0);
    let from_b = flock_forces(&world, &grid, &Observer::from_world(&world, b).unwrap(), 0.0);

    assert!((from_a.cohesion - Vec3::new(5.0, 0.0, 0.0)).length() < 1.0e-4);
    assert!((from_b.cohesion - Vec3::new(-5.0, 0.0, 0.0)).length() < 1.0e-4);
}

#[test]
fn recently_hit_friend_only_pushes_away() {
    let mut world = World::new();
    world
        .register_group(
            1,
            GroupSettings {
                separation_weight: 1.0,
                hit_recovery: 1.0,
                ..flocking_only()
            },
        )
        .unwrap();
    let me = world
        .spawn_boid(BoidSpawn::at(1, Vec3::ZERO).facing(facing(Vec3::X)))
        .unwrap();
    let friend = world
        .spawn_boid(BoidSpawn::at(1, Vec3::new(10.0, 0.0, 0.0)))
        .unwrap();
    world.apply_damage(friend, 1.0, 2.0).unwrap();
    let mut grid = SpatialGrid::default();
    grid.rebuild(&world);
    let observer = Observer::from_world(&world, me).unwrap();

    let shaken = flock_forces(&world, &grid, &observer, 2.5);
    assert_eq!(shaken.cohesion, Vec3::ZERO);
    assert_eq!(shaken.up, None);
    assert!((shaken.separation - Vec3::new(-1.0, 0.0, 0.0)).length() < 1.0e-5);

    let recovered = flock_forces(&world, &grid, &observer, 3.5);
    assert!((recovered.cohesion - Vec3::new(5.0, 0.0, 0.0)).length() < 1.0e-4);
    assert!((recovered.separation - Vec3::new(-1.0, 0.0, 0.0)).length() < 1.0e-5);
}

#[test]
fn containment_pulls_back_from_fifty_past_the_edge() {
    let settings = GroupSettings {
        map_centre: Vec3::new(10.0, 0.0, 0.0),
        map_radius: 200.0,
        map_radius_weight: 2.0,
        ..GroupSettings::default()
    };
    let force = map_containment_force(Vec3::new(10.0, 0.0, 250.0), &settings);
    assert!((force.length() - 100.0).abs() < 1.0e-3);
    assert!((force.normalize() - Vec3::new(0.0, 0.0, -1.0)).length() < 1.0e-5);
}

#[test]
fn no_shot_before_next_allowed_time() {
    let (mut world, shooter, target) = armed_world();
    world.boid_mut(shooter).unwrap().next_allow_shoot_time = 0.5;
    let system = BoidSystem::new(17);
    let mut events = Vec::new();

    for tick in 0..4 {
        let report = run_tick(&mut world, &system, &mut events, tick, 0.125);
        assert!(report.shots.is_empty(), "fired early at tick {tick}");
    }
    assert_eq!(world.projectile_count(), 0);

    let report = run_tick(&mut world, &system, &mut events, 4, 0.125);
    assert_eq!(report.shots.len(), 1);
    assert_eq!(report.shots[0].shooter, shooter);
    assert_eq!(report.shots[0].target, target);
    assert_eq!(world.boid(shooter).unwrap().next_allow_shoot_time, 1.5);

    let projectile = world.projectile(report.shots[0].projectile).unwrap();
    assert_eq!(projectile.owner, Some(shooter));

    for tick in 5..12 {
        assert!(run_tick(&mut world, &system, &mut events, tick, 0.125)
            .shots
            .is_empty());
    }
    assert_eq!(run_tick(&mut world, &system, &mut events, 12, 0.125).shots.len(), 1);
    assert_eq!(world.projectile_count(), 2);
}

#[test]
fn obstacle_ahead_overrides_every_other_force() {
    let mut world = World::new();
    world
        .register_group(
            1,
            GroupSettings {
                move_speed: 10.0,
                obstacle_view_dst: 20.0,
                obstacle_avoid_weight: 20.0,
                map_centre: Vec3::new(100.0, 0.0, 0.0),
                map_radius: 1.0,
                map_radius_weight: 5.0,
                line_of_sight_weight: 0.0,
                ..GroupSettings::default()
            },
        )
        .unwrap();
    let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
    world.spawn_obstacle(Vec3::new(0.0, 0.0, 10.0), 2.0);

    run_tick(&mut world, &BoidSystem::new(1), &mut Vec::new(), 0, 0.1);
    let boid = world.boid(me).unwrap();
    assert!((boid.move_force - Vec3::new(0.0, 0.0, -230.0)).length() < 1.0e-3);
}

#[test]
fn obstacle_avoidance_suppresses_line_of_sight_and_holds_up() {
    let mut world = World::new();
    world
        .register_group(
            1,
            GroupSettings {
                move_speed: 10.0,
                obstacle_view_dst: 20.0,
                obstacle_avoid_weight: 20.0,
                line_of_sight_weight: 4.0,
                ..GroupSettings::default()
            },
        )
        .unwrap();
    let me = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
    world.spawn_obstacle(Vec3::new(0.0, 0.0, 10.0), 2.0);
    // In the firing cone, past the obstacle.
    world
        .spawn_boid(BoidSpawn::at(1, Vec3::new(0.0, 5.0, 40.0)))
        .unwrap();
    // Close enough to flock with, rolled so its up differs from ours.
    world
        .spawn_boid(BoidSpawn::at(1, Vec3::new(5.0, 0.0, 5.0)).facing(Quat::from_rotation_z(0.6)))
        .unwrap();

    run_tick(&mut world, &BoidSystem::new(1), &mut Vec::new(), 0, 0.1);
    let boid = world.boid(me).unwrap();
    assert!((boid.move_force - Vec3::new(0.0, 0.0, -230.0)).length() < 1.0e-3);
    assert_eq!(boid.line_of_sight_force, Vec3::ZERO);
    assert_eq!(boid.target_up, Vec3::Y);
}

#[test]
fn manual_agent_neither_steers_nor_fires() {
    let (mut world, shooter, _) = armed_world();
    world.set_manual_control(Some(shooter));
    world
        .set_move_force(shooter, Vec3::new(1.0, 0.0, 0.0))
        .unwrap();

    let report = run_tick(&mut world, &BoidSystem::new(5), &mut Vec::new(), 0, 0.1);
    assert!(report.shots.is_empty());
    assert_eq!(report.steered, 1);
    assert_eq!(report.live_agents, 2);

    let boid = world.boid(shooter).unwrap();
    assert_eq!(boid.move_force, Vec3::new(1.0, 0.0, 0.0));
    let velocity = world.body(shooter).unwrap().velocity;
    assert!((velocity - Vec3::new(0.1, 0.0, 0.0)).length() < 1.0e-5);

    world.set_manual_control(None);
    let report = run_tick(&mut world, &BoidSystem::new(5), &mut Vec::new(), 1, 0.1);
    assert_eq!(report.steered, 2);
}

#[test]
fn inert_agents_are_ignored_as_combatants() {
    let (mut world, shooter, target) = armed_world();
    world.apply_damage(target, 1_000.0, 0.0).unwrap();
    let orphan = world
        .spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 20.0)))
        .unwrap();
    world.boid_mut(orphan).unwrap().settings = None;

    let report = run_tick(&mut world, &BoidSystem::new(8), &mut Vec::new(), 0, 0.1);
    assert!(report.shots.is_empty());
    assert_eq!(report.live_agents, 1);
    assert_eq!(world.boid(orphan).unwrap().move_force, Vec3::ZERO);
    assert_eq!(world.body(orphan).unwrap().velocity, Vec3::ZERO);
    assert!(world.body(shooter).unwrap().velocity.length() > 0.0);
}

#[test]
fn jitter_does_not_depend_on_who_else_fires() {
    let (mut solo, shooter, target) = armed_world();
    solo.body_mut(target).unwrap().velocity = Vec3::new(5.0, 0.0, 0.0);
    let solo_report = run_tick(&mut solo, &BoidSystem::new(99), &mut Vec::new(), 0, 0.1);

    let (mut crowded, crowded_shooter, _) = armed_world();
    assert_eq!(shooter, crowded_shooter);
    crowded.body_mut(target).unwrap().velocity = Vec3::new(5.0, 0.0, 0.0);
    crowded
        .spawn_boid(BoidSpawn::at(1, Vec3::new(40.0, 0.0, 0.0)))
        .unwrap();
    let crowded_report =
        run_tick(&mut crowded, &BoidSystem::new(99), &mut Vec::new(), 0, 0.1);

    let solo_shot = solo_report
        .shots
        .iter()
        .find(|shot| shot.shooter == shooter)
        .unwrap();
    let crowded_shot = crowded_report
        .shots
        .iter()
        .find(|shot| shot.shooter == shooter)
        .unwrap();
    assert_eq!(solo_shot.aim_point, crowded_shot.aim_point);
    assert!(solo_shot.aim_point.x > 0.0);
}
