use glam::{Quat, Vec3};

use crate::world::{Body, Boid, EffectRig, EntityId};

/// Cosmetic notifications for whoever plays particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectEvent {
    TrailStarted {
        entity: EntityId,
        position: Vec3,
        rotation: Quat,
    },
    TrailStopped {
        entity: EntityId,
    },
    DeathBurst {
        entity: EntityId,
        position: Vec3,
    },
    MuzzleFlash {
        entity: EntityId,
        position: Vec3,
    },
}

pub trait EffectsSink {
    fn emit(&mut self, event: EffectEvent);
}

impl EffectsSink for Vec<EffectEvent> {
    fn emit(&mut self, event: EffectEvent) {
        self.push(event);
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEffects;

impl EffectsSink for NoEffects {
    fn emit(&mut self, _event: EffectEvent) {}
}

/// Keeps a rig's trail in step with the agent's health: trail while alive,
/// one death burst within a tick of dying, no trail afterwards.
pub fn sync_rig<E: EffectsSink + ?Sized>(
    entity: EntityId,
    rig: &mut EffectRig,
    boid: &Boid,
    body: &Body,
    elapsed: f64,
    delta: f32,
    sink: &mut E,
) {
    if boid.is_alive() {
        if !rig.trail_playing {
            rig.trail_playing = true;
            rig.death_played = false;
            sink.emit(EffectEvent::TrailStarted {
                entity,
                position: body.position + body.rotation * rig.trail_offset,
                rotation: body.rotation,
            });
        }
        return;
    }

    if rig.trail_playing {
        rig.trail_playing = false;
        sink.emit(EffectEvent::TrailStopped { entity });
    }

    let delta = f64::from(delta);
    let just_died = boid
        .died_time
        .is_some_and(|died| died + delta >= elapsed - delta);
    if just_died && !rig.death_played {
        rig.death_played = true;
        sink.emit(EffectEvent::DeathBurst {
            entity,
            position: body.position,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{sync_rig, EffectEvent};
    use crate::settings::GroupSettings;
    use crate::world::{BoidSpawn, EffectRig, World};
    use glam::Vec3;

    #[test]
    fn trail_then_death_burst_once() {
        let mut world = World::new();
        world.register_group(1, GroupSettings::default()).unwrap();
        let id = world.spawn_boid(BoidSpawn::at(1, Vec3::ONE)).unwrap();
        let mut rig = EffectRig {
            trail_offset: Vec3::new(0.0, 0.0, -1.0),
            ..EffectRig::default()
        };
        let mut events = Vec::new();

        let boid = *world.boid(id).unwrap();
        let body = *world.body(id).unwrap();
        sync_rig(id, &mut rig, &boid, &body, 1.0, 0.1, &mut events);
        sync_rig(id, &mut rig, &boid, &body, 1.1, 0.1, &mut events);
        assert_eq!(
            events,
            vec![EffectEvent::TrailStarted {
                entity: id,
                position: Vec3::new(1.0, 1.0, 0.0),
                rotation: body.rotation,
            }]
        );

        world.apply_damage(id, 500.0, 1.2).unwrap();
        let boid = *world.boid(id).unwrap();
        events.clear();
        sync_rig(id, &mut rig, &boid, &body, 1.3, 0.1, &mut events);
        sync_rig(id, &mut rig, &boid, &body, 1.4, 0.1, &mut events);
        assert_eq!(
            events,
            vec![
                EffectEvent::TrailStopped { entity: id },
                EffectEvent::DeathBurst {
                    entity: id,
                    position: Vec3::ONE,
                },
            ]
        );
    }

    #[test]
    fn long_dead_agents_get_no_burst() {
        let mut world = World::new();
        world.register_group(1, GroupSettings::default()).unwrap();
        let id = world.spawn_boid(BoidSpawn::at(1, Vec3::ZERO)).unwrap();
        world.apply_damage(id, 500.0, 1.0).unwrap();
        let boid = *world.boid(id).unwrap();
        let body = *world.body(id).unwrap();

        let mut rig = EffectRig::default();
        let mut events = Vec::new();
        sync_rig(id, &mut rig, &boid, &body, 5.0, 0.1, &mut events);
        assert!(events.is_empty());
    }
}
