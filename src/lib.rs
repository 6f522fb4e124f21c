use glam::Vec3;
use slotmap::{Key, KeyData};
use tracing::warn;
use wasm_bindgen::prelude::*;

pub mod combat;
pub mod effects;
pub mod error;
pub mod flocking;
pub mod grid;
pub mod math;
pub mod settings;
pub mod spatial;
pub mod spawn;
pub mod stations;
pub mod system;
pub mod tactics;
pub mod visibility;
pub mod world;

pub use crate::combat::{ShotPlan, ShotReport, TargetLock};
pub use crate::effects::{EffectEvent, EffectsSink, NoEffects};
pub use crate::error::ArenaError;
pub use crate::grid::SpatialGrid;
pub use crate::settings::{
    ArenaConfig, CohesionCentre, GroupConfig, GroupSettings, ProjectileTemplate, TemplateId,
};
pub use crate::spatial::{QueryFilter, RayHit, SpatialQuery};
pub use crate::system::{BoidSystem, TickReport, TickTime};
pub use crate::world::{BoidSpawn, EntityId, World};

use crate::math::clamp_finite;
use rand::rngs::SmallRng;
use rand::SeedableRng;

const FALLBACK_SEED: u64 = 0x5EED_B01D_A7E4_A001;
const MAX_STEP_DT: f32 = 0.25;

fn entropy_seed() -> u64 {
    getrandom::u64().unwrap_or_else(|err| {
        warn!(%err, "no OS entropy available; using the fallback seed");
        FALLBACK_SEED
    })
}

fn entity_from_handle(handle: u64) -> EntityId {
    EntityId::from(KeyData::from_ffi(handle))
}

/// Self-contained arena for rendering hosts: owns the world, the query grid
/// and the tick scheduler, and integrates positions itself.
#[wasm_bindgen]
pub struct ArenaSim {
    world: World,
    grid: SpatialGrid,
    system: BoidSystem,
    events: Vec<EffectEvent>,
    rng: SmallRng,
    elapsed: f64,
    tick: u64,
}

impl ArenaSim {
    pub fn from_config(config: ArenaConfig) -> Result<ArenaSim, ArenaError> {
        let seed = config.seed.unwrap_or_else(entropy_seed);
        let mut rng = SmallRng::seed_from_u64(seed);
        let world = spawn::build_world(&config, &mut rng)?;
        Ok(ArenaSim {
            world,
            grid: SpatialGrid::new(config.cell_size),
            system: BoidSystem::new(seed),
            events: Vec::new(),
            rng,
            elapsed: 0.0,
            tick: 0,
        })
    }

    /// Registers a group, places its station and spawns its boids.
    pub fn add_group(&mut self, group: &GroupConfig) -> Result<Vec<EntityId>, ArenaError> {
        group.settings.validate()?;
        self.world.register_group(group.group_id, group.settings)?;
        if let Some(station) = &group.station {
            self.world.spawn_station(
                group.group_id,
                station.position,
                station.hp,
                station.attract_radius,
                station.radius,
            )?;
        }
        spawn::spawn_group(&mut self.world, &mut self.rng, group)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Effect events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EffectEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs one tick, moves every body and reclaims expired projectiles.
    pub fn advance(&mut self, dt: f32) -> TickReport {
        let dt = clamp_finite(dt, 0.0, MAX_STEP_DT, 0.0);
        self.grid.rebuild(&self.world);
        let report = self.system.tick(
            &mut self.world,
            &self.grid,
            &mut self.events,
            TickTime {
                elapsed: self.elapsed,
                delta: dt,
                tick: self.tick,
            },
        );
        self.world.advance_positions(dt);
        self.elapsed += f64::from(dt);
        self.tick += 1;
        self.world.expire_projectiles(self.elapsed);
        report
    }
}

#[wasm_bindgen]
impl ArenaSim {
    /// Empty arena. A seed of 0 draws one from OS entropy.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u32) -> ArenaSim {
        let seed = if seed == 0 {
            entropy_seed()
        } else {
            u64::from(seed)
        };
        ArenaSim {
            world: World::new(),
            grid: SpatialGrid::default(),
            system: BoidSystem::new(seed),
            events: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
            elapsed: 0.0,
            tick: 0,
        }
    }

    #[wasm_bindgen(js_name = fromConfigJson)]
    pub fn from_config_json(json: &str) -> Result<ArenaSim, JsError> {
        let config = ArenaConfig::from_json_str(json)?;
        Ok(ArenaSim::from_config(config)?)
    }

    #[wasm_bindgen(js_name = addTemplate)]
    pub fn add_template(&mut self, speed: f32, radius: f32, lifetime: f32) -> usize {
        let fallback = ProjectileTemplate::default();
        let template = ProjectileTemplate {
            speed: clamp_finite(speed, 0.0, f32::MAX, 0.0),
            radius: clamp_finite(radius, 0.0, f32::MAX, 0.0),
            lifetime: clamp_finite(lifetime, f32::EPSILON, f32::MAX, fallback.lifetime),
        };
        self.world.add_template(template).0
    }

    /// Returns how many boids were spawned.
    #[wasm_bindgen(js_name = addGroupJson)]
    pub fn add_group_json(&mut self, json: &str) -> Result<usize, JsError> {
        let group: GroupConfig = serde_json::from_str(json)?;
        Ok(self.add_group(&group)?.len())
    }

    #[wasm_bindgen(js_name = addObstacle)]
    pub fn add_obstacle(&mut self, x: f32, y: f32, z: f32, radius: f32) {
        self.world.spawn_obstacle(Vec3::new(x, y, z), radius);
    }

    /// Returns the number of shots fired this step.
    pub fn step(&mut self, dt: f32) -> usize {
        self.advance(dt).shots.len()
    }

    pub fn count(&self) -> usize {
        self.world.boid_count()
    }

    pub fn live_count(&self) -> usize {
        self.world.live_boid_count()
    }

    pub fn projectile_count(&self) -> usize {
        self.world.projectile_count()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Flat xyz triples of every boid, in handle order.
    pub fn positions(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.world.boid_count() * 3);
        for id in self.world.boid_ids() {
            if let Some(body) = self.world.body(id) {
                out.extend_from_slice(&body.position.to_array());
            }
        }
        out
    }

    /// Opaque boid handles, in the same order as `positions`.
    pub fn handles(&self) -> Vec<u64> {
        self.world
            .boid_ids()
            .filter(|&id| self.world.body(id).is_some())
            .map(|id| id.data().as_ffi())
            .collect()
    }

    /// Hands the boid to an external controller. Returns false for unknown
    /// handles.
    pub fn set_manual(&mut self, handle: u64) -> bool {
        let id = entity_from_handle(handle);
        if !self.world.has_boid(id) {
            return false;
        }
        self.world.set_manual_control(Some(id));
        true
    }

    pub fn clear_manual(&mut self) {
        self.world.set_manual_control(None);
    }

    pub fn set_move_force(&mut self, handle: u64, x: f32, y: f32, z: f32) -> bool {
        self.world
            .set_move_force(entity_from_handle(handle), Vec3::new(x, y, z))
            .is_ok()
    }

    /// Number of pending effect events; draining them is a native-side
    /// concern.
    pub fn pending_effects(&self) -> usize {
        self.events.len()
    }

    pub fn clear_effects(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ArenaSim;
    use crate::settings::{ArenaConfig, GroupConfig, GroupSettings, StationConfig};
    use crate::world::BoidSpawn;
    use crate::TemplateId;
    use glam::Vec3;

    fn two_groups() -> ArenaConfig {
        ArenaConfig {
            seed: Some(21),
            groups: vec![
                GroupConfig {
                    group_id: 1,
                    spawn_count: 6,
                    ..GroupConfig::default()
                },
                GroupConfig {
                    group_id: 2,
                    spawn_count: 4,
                    ..GroupConfig::default()
                },
            ],
            ..ArenaConfig::default()
        }
    }

    #[test]
    fn config_builds_populated_sim() {
        let sim = ArenaSim::from_config(two_groups()).unwrap();
        assert_eq!(sim.count(), 10);
        assert_eq!(sim.positions().len(), 30);
        assert_eq!(sim.handles().len(), 10);
    }

    #[test]
    fn step_advances_clock_and_moves_boids() {
        let mut sim = ArenaSim::from_config(two_groups()).unwrap();
        let before = sim.positions();
        sim.step(0.1);
        sim.step(f32::NAN);
        assert!((sim.elapsed() - 0.1).abs() < 1.0e-6);
        assert_ne!(sim.positions(), before);
        assert!(sim.positions().iter().all(|v| v.is_finite()));
        assert!(sim.drain_events().len() >= 10);
    }

    #[test]
    fn manual_control_requires_known_handle() {
        let mut sim = ArenaSim::from_config(two_groups()).unwrap();
        let handle = sim.handles()[0];
        assert!(sim.set_manual(handle));
        assert!(sim.set_move_force(handle, 1.0, 0.0, 0.0));
        assert!(!sim.set_manual(0));
        sim.clear_manual();
        assert_eq!(sim.world().manual_control(), None);
    }

    #[test]
    fn groups_can_be_added_after_construction() {
        let mut sim = ArenaSim::new(12);
        let template = sim.add_template(100.0, 0.3, 2.0);
        let mut group = GroupConfig {
            group_id: 4,
            spawn_count: 3,
            station: Some(StationConfig::default()),
            ..GroupConfig::default()
        };
        group.settings.projectile_template = Some(TemplateId(template));
        assert_eq!(sim.add_group(&group).unwrap().len(), 3);
        assert!(sim.add_group(&group).is_err());
        sim.add_obstacle(0.0, 0.0, 40.0, 5.0);

        assert_eq!(sim.count(), 3);
        assert_eq!(sim.world().stations().count(), 1);
        sim.step(0.05);
        assert!(sim.positions().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fired_projectiles_are_reclaimed_after_their_lifetime() {
        let mut sim = ArenaSim::new(6);
        let template = sim.add_template(80.0, 0.2, 0.25);
        let world = sim.world_mut();
        world
            .register_group(
                1,
                GroupSettings {
                    projectile_template: Some(TemplateId(template)),
                    shoot_rate: 1.0,
                    ..GroupSettings::default()
                },
            )
            .unwrap();
        world.register_group(2, GroupSettings::default()).unwrap();
        world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        world
            .spawn_boid(BoidSpawn::at(2, Vec3::new(0.0, 0.0, 30.0)))
            .unwrap();

        assert_eq!(sim.step(0.1), 1);
        assert_eq!(sim.projectile_count(), 1);
        sim.step(0.1);
        assert_eq!(sim.projectile_count(), 1);
        sim.step(0.1);
        assert_eq!(sim.projectile_count(), 0);
    }

    #[test]
    fn long_runs_keep_projectile_count_bounded() {
        let mut config = two_groups();
        config.projectiles.push(crate::ProjectileTemplate {
            lifetime: 0.5,
            ..crate::ProjectileTemplate::default()
        });
        for group in &mut config.groups {
            group.spawn_radius = 20.0;
            group.settings.projectile_template = Some(TemplateId(0));
            group.settings.shoot_rate = 0.2;
            group.settings.firing_fov = 360.0;
        }
        let mut sim = ArenaSim::from_config(config).unwrap();
        let mut fired = 0;
        for _ in 0..300 {
            fired += sim.step(1.0 / 60.0);
        }
        assert!(fired > 0);
        // Ten shooters at five shots a second, each shot living half a second.
        assert!(sim.projectile_count() <= 10 * 3 + 10);
    }

    #[test]
    fn json_config_round_trips_into_sim() {
        let json = r#"{ "seed": 4, "groups": [{ "group_id": 3, "spawn_count": 2 }] }"#;
        let Ok(sim) = ArenaSim::from_config_json(json) else {
            panic!("valid config was rejected");
        };
        assert_eq!(sim.count(), 2);
    }
}
