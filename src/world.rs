//! Arena of simulated bodies and their component records.

use glam::{Quat, Vec3};
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use tracing::{info, warn};

use crate::error::ArenaError;
use crate::settings::{GroupSettings, ProjectileTemplate, TemplateId, MAX_GROUP_ID};
use crate::spatial::layers;

new_key_type! {
    /// Stable handle for anything that lives in the arena.
    pub struct EntityId;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub radius: f32,
    pub belongs_to: u32,
    pub collides_with: u32,
}

impl Body {
    pub fn new(position: Vec3, radius: f32, belongs_to: u32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            radius: radius.max(0.0),
            belongs_to,
            collides_with: layers::ALL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boid {
    pub group_id: u32,
    pub hp: f32,
    /// Key into the group settings table. Relation only; the table owns the
    /// settings.
    pub settings: Option<u32>,
    pub move_force: Vec3,
    pub target_up: Vec3,
    pub line_of_sight_force: Vec3,
    pub next_allow_shoot_time: f64,
    pub hit_time: Option<f64>,
    pub died_time: Option<f64>,
}

impl Boid {
    pub fn new(group_id: u32, hp: f32) -> Self {
        Self {
            group_id,
            hp,
            settings: Some(group_id),
            move_force: Vec3::ZERO,
            target_up: Vec3::Y,
            line_of_sight_force: Vec3::ZERO,
            next_allow_shoot_time: 0.0,
            hit_time: None,
            died_time: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Station {
    pub group_id: u32,
    pub hp: f32,
    pub attract_radius: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projectile {
    pub template: TemplateId,
    pub speed: f32,
    pub lifetime: f32,
    pub owner: Option<EntityId>,
    /// Simulation time at which the projectile is reclaimed. Unset until it
    /// is fired.
    pub expires_at: Option<f64>,
}

/// Cosmetic attachment; agents without one simply get no effect events.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EffectRig {
    pub trail_offset: Vec3,
    pub trail_playing: bool,
    pub death_played: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoidSpawn {
    pub group_id: u32,
    pub hp: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub radius: f32,
}

impl BoidSpawn {
    pub fn at(group_id: u32, position: Vec3) -> Self {
        Self {
            group_id,
            hp: 100.0,
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            radius: 1.0,
        }
    }

    pub fn facing(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn moving(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_hp(mut self, hp: f32) -> Self {
        self.hp = hp;
        self
    }
}

#[derive(Default)]
pub struct World {
    bodies: SlotMap<EntityId, Body>,
    boids: SecondaryMap<EntityId, Boid>,
    stations: SecondaryMap<EntityId, Station>,
    projectiles: SecondaryMap<EntityId, Projectile>,
    obstacles: SecondaryMap<EntityId, ()>,
    effect_rigs: SecondaryMap<EntityId, EffectRig>,
    groups: Vec<Option<GroupSettings>>,
    templates: Vec<ProjectileTemplate>,
    manual_control: Option<EntityId>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_group(
        &mut self,
        group_id: u32,
        mut settings: GroupSettings,
    ) -> Result<(), ArenaError> {
        check_group_id(group_id)?;
        if self.group_settings(group_id).is_some() {
            return Err(ArenaError::DuplicateGroup(group_id));
        }
        if let Some(TemplateId(template)) = settings.projectile_template {
            if template >= self.templates.len() {
                return Err(ArenaError::UnknownTemplate(template));
            }
        }
        settings.sanitize();

        let index = group_id as usize;
        if self.groups.len() <= index {
            self.groups.resize(index + 1, None);
        }
        self.groups[index] = Some(settings);
        info!(group_id, "group registered");
        Ok(())
    }

    pub fn group_settings(&self, group_id: u32) -> Option<&GroupSettings> {
        self.groups.get(group_id as usize)?.as_ref()
    }

    /// Replaces a registered group's settings after sanitizing them.
    pub fn update_group(
        &mut self,
        group_id: u32,
        mut settings: GroupSettings,
    ) -> Result<(), ArenaError> {
        if let Some(TemplateId(template)) = settings.projectile_template {
            if template >= self.templates.len() {
                return Err(ArenaError::UnknownTemplate(template));
            }
        }
        settings.sanitize();
        match self.groups.get_mut(group_id as usize) {
            Some(slot) if slot.is_some() => {
                *slot = Some(settings);
                Ok(())
            }
            _ => Err(ArenaError::UnknownGroup(group_id)),
        }
    }

    pub fn add_template(&mut self, template: ProjectileTemplate) -> TemplateId {
        self.templates.push(template);
        TemplateId(self.templates.len() - 1)
    }

    pub fn template(&self, id: TemplateId) -> Option<&ProjectileTemplate> {
        self.templates.get(id.0)
    }

    pub fn spawn_boid(&mut self, spawn: BoidSpawn) -> Result<EntityId, ArenaError> {
        check_group_id(spawn.group_id)?;
        if self.group_settings(spawn.group_id).is_none() {
            return Err(ArenaError::UnknownGroup(spawn.group_id));
        }

        let mut body = Body::new(spawn.position, spawn.radius, layers::BOID);
        body.rotation = spawn.rotation.normalize();
        body.velocity = spawn.velocity;
        let id = self.bodies.insert(body);

        let mut boid = Boid::new(spawn.group_id, spawn.hp);
        boid.target_up = body.rotation * Vec3::Y;
        self.boids.insert(id, boid);
        Ok(id)
    }

    /// Places a station. Group 0 marks a neutral station that never attracts.
    pub fn spawn_station(
        &mut self,
        group_id: u32,
        position: Vec3,
        hp: f32,
        attract_radius: f32,
        radius: f32,
    ) -> Result<EntityId, ArenaError> {
        if group_id > MAX_GROUP_ID {
            return Err(ArenaError::GroupOutOfRange(group_id));
        }
        let id = self
            .bodies
            .insert(Body::new(position, radius, layers::STATION));
        self.stations.insert(
            id,
            Station {
                group_id,
                hp,
                attract_radius: attract_radius.max(0.0),
            },
        );
        Ok(id)
    }

    pub fn spawn_obstacle(&mut self, position: Vec3, radius: f32) -> EntityId {
        let id = self
            .bodies
            .insert(Body::new(position, radius, layers::OBSTACLE));
        self.obstacles.insert(id, ());
        id
    }

    /// Creates a projectile body from a registered template. Ownership,
    /// placement and heading are up to the caller.
    pub fn instantiate(&mut self, template: TemplateId) -> Result<EntityId, ArenaError> {
        let proto = *self
            .template(template)
            .ok_or(ArenaError::UnknownTemplate(template.0))?;
        let id = self
            .bodies
            .insert(Body::new(Vec3::ZERO, proto.radius, layers::PROJECTILE));
        self.projectiles.insert(
            id,
            Projectile {
                template,
                speed: proto.speed,
                lifetime: proto.lifetime,
                owner: None,
                expires_at: None,
            },
        );
        Ok(id)
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        if self.bodies.remove(id).is_none() {
            return false;
        }
        self.boids.remove(id);
        self.stations.remove(id);
        self.projectiles.remove(id);
        self.obstacles.remove(id);
        self.effect_rigs.remove(id);
        if self.manual_control == Some(id) {
            self.manual_control = None;
        }
        true
    }

    pub fn attach_effect_rig(&mut self, id: EntityId, trail_offset: Vec3) -> Result<(), ArenaError> {
        if !self.bodies.contains_key(id) {
            return Err(ArenaError::UnknownEntity(id));
        }
        self.effect_rigs.insert(
            id,
            EffectRig {
                trail_offset,
                ..EffectRig::default()
            },
        );
        Ok(())
    }

    /// Lowers HP and stamps the hit time; stamps the death time when HP first
    /// reaches zero. Returns the remaining HP.
    pub fn apply_damage(&mut self, id: EntityId, amount: f32, now: f64) -> Result<f32, ArenaError> {
        if let Some(boid) = self.boids.get_mut(id) {
            let was_alive = boid.is_alive();
            boid.hp -= amount;
            boid.hit_time = Some(now);
            if was_alive && !boid.is_alive() {
                boid.died_time = Some(now);
            }
            return Ok(boid.hp);
        }
        if let Some(station) = self.stations.get_mut(id) {
            station.hp -= amount;
            return Ok(station.hp);
        }
        Err(ArenaError::UnknownEntity(id))
    }

    pub fn set_manual_control(&mut self, id: Option<EntityId>) {
        self.manual_control = id;
    }

    pub fn manual_control(&self) -> Option<EntityId> {
        self.manual_control
    }

    pub fn is_manual(&self, id: EntityId) -> bool {
        self.manual_control == Some(id)
    }

    /// External controller hook for the manually flown agent.
    pub fn set_move_force(&mut self, id: EntityId, move_force: Vec3) -> Result<(), ArenaError> {
        let boid = self.boids.get_mut(id).ok_or(ArenaError::UnknownEntity(id))?;
        boid.move_force = move_force;
        Ok(())
    }

    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn boid(&self, id: EntityId) -> Option<&Boid> {
        self.boids.get(id)
    }

    pub fn boid_mut(&mut self, id: EntityId) -> Option<&mut Boid> {
        self.boids.get_mut(id)
    }

    pub fn station(&self, id: EntityId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.projectiles.get(id)
    }

    pub fn projectile_mut(&mut self, id: EntityId) -> Option<&mut Projectile> {
        self.projectiles.get_mut(id)
    }

    pub fn effect_rig_mut(&mut self, id: EntityId) -> Option<&mut EffectRig> {
        self.effect_rigs.get_mut(id)
    }

    pub fn has_boid(&self, id: EntityId) -> bool {
        self.boids.contains_key(id)
    }

    pub fn has_station(&self, id: EntityId) -> bool {
        self.stations.contains_key(id)
    }

    pub fn has_projectile(&self, id: EntityId) -> bool {
        self.projectiles.contains_key(id)
    }

    pub fn has_obstacle(&self, id: EntityId) -> bool {
        self.obstacles.contains_key(id)
    }

    /// Settings of a boid that may take part in steering and combat: alive
    /// and pointing at registered settings.
    pub fn live_settings(&self, id: EntityId) -> Option<&GroupSettings> {
        let boid = self.boids.get(id)?;
        if !boid.is_alive() {
            return None;
        }
        let key = boid.settings?;
        let settings = self.group_settings(key);
        if settings.is_none() {
            debug_assert!(false, "boid {id:?} references unregistered group settings {key}");
            warn!(?id, key, "boid references unregistered group settings");
        }
        settings
    }

    pub fn is_live_boid(&self, id: EntityId) -> bool {
        self.live_settings(id).is_some()
    }

    pub fn boid_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.boids.keys()
    }

    pub fn stations(&self) -> impl Iterator<Item = (EntityId, &Station)> + '_ {
        self.stations.iter()
    }

    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &Body)> + '_ {
        self.bodies.iter()
    }

    pub fn boid_count(&self) -> usize {
        self.boids.len()
    }

    pub fn live_boid_count(&self) -> usize {
        self.boids.iter().filter(|(_, boid)| boid.is_alive()).count()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Plain Euler position step. Stands in for the external physics pass.
    pub fn advance_positions(&mut self, dt: f32) {
        for (id, body) in self.bodies.iter_mut() {
            if self.obstacles.contains_key(id) || self.stations.contains_key(id) {
                continue;
            }
            if self.boids.get(id).is_some_and(|boid| !boid.is_alive()) {
                continue;
            }
            body.position += body.velocity * dt;
        }
    }

    /// Despawns every fired projectile whose lifetime ran out by `now`.
    /// Returns how many were reclaimed.
    pub fn expire_projectiles(&mut self, now: f64) -> usize {
        let expired: Vec<EntityId> = self
            .projectiles
            .iter()
            .filter(|(_, projectile)| projectile.expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| id)
            .collect();
        for &id in &expired {
            self.despawn(id);
        }
        expired.len()
    }
}

fn check_group_id(group_id: u32) -> Result<(), ArenaError> {
    match group_id {
        0 => Err(ArenaError::ReservedGroup),
        id if id > MAX_GROUP_ID => Err(ArenaError::GroupOutOfRange(id)),
        _ => Ok(()),
    }
}
