use glam::Vec3;
use tracing::warn;

use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StationSnapshot {
    pub group_id: u32,
    pub hp: f32,
    pub attract_radius: f32,
    pub position: Vec3,
}

impl StationSnapshot {
    pub fn is_standing(&self) -> bool {
        self.hp > 0.0
    }
}

/// Per-tick copy of every station, indexed by group id. Slot 0 is never
/// filled.
#[derive(Clone, Debug, Default)]
pub struct StationTable {
    by_group: Vec<Option<StationSnapshot>>,
}

impl StationTable {
    pub fn capture(world: &World) -> Self {
        let mut table = Self::default();
        for (id, station) in world.stations() {
            if station.group_id == 0 {
                continue;
            }
            let Some(body) = world.body(id) else {
                continue;
            };
            let index = station.group_id as usize;
            if table.by_group.len() <= index {
                table.by_group.resize(index + 1, None);
            }
            if table.by_group[index].is_some() {
                warn!(group_id = station.group_id, "group has more than one station; keeping the last");
            }
            table.by_group[index] = Some(StationSnapshot {
                group_id: station.group_id,
                hp: station.hp,
                attract_radius: station.attract_radius,
                position: body.position,
            });
        }
        table
    }

    pub fn get(&self, group_id: u32) -> Option<&StationSnapshot> {
        self.by_group.get(group_id as usize)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationSnapshot> + '_ {
        self.by_group.iter().skip(1).flatten()
    }

    /// Nearest standing station of another group whose attraction radius does
    /// not already contain `position`.
    pub fn nearest_attractor(&self, position: Vec3, own_group: u32) -> Option<&StationSnapshot> {
        self.iter()
            .filter(|station| station.is_standing() && station.group_id != own_group)
            .map(|station| (station, (station.position - position).length_squared()))
            .filter(|(station, dist_sq)| *dist_sq > station.attract_radius * station.attract_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(station, _)| station)
    }
}
