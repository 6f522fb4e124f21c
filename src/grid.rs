use std::collections::HashMap;

use glam::{IVec3, Vec3};

use crate::math::{normalize_or, EPSILON};
use crate::spatial::{QueryFilter, RayHit, SpatialQuery};
use crate::world::{EntityId, World};

const MIN_CELL_SIZE: f32 = 1.0e-3;
const INVALID_INDEX: usize = usize::MAX;

#[derive(Clone, Copy, Debug)]
struct GridBody {
    entity: EntityId,
    position: Vec3,
    radius: f32,
    belongs_to: u32,
    collides_with: u32,
}

/// Hashed uniform grid over sphere bodies. Each body is bucketed by its
/// centre; queries pad their search box by the largest radius seen.
pub struct SpatialGrid {
    cell_size: f32,
    max_radius: f32,
    bodies: Vec<GridBody>,
    head: HashMap<IVec3, usize>,
    next: Vec<usize>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(MIN_CELL_SIZE),
            max_radius: 0.0,
            bodies: Vec::new(),
            head: HashMap::new(),
            next: Vec::new(),
        }
    }

    /// Snapshots every body in the world.
    pub fn rebuild(&mut self, world: &World) {
        self.bodies.clear();
        self.head.clear();
        self.max_radius = 0.0;

        for (entity, body) in world.bodies() {
            if !body.position.is_finite() {
                continue;
            }
            self.bodies.push(GridBody {
                entity,
                position: body.position,
                radius: body.radius,
                belongs_to: body.belongs_to,
                collides_with: body.collides_with,
            });
            self.max_radius = self.max_radius.max(body.radius);
        }

        self.next.clear();
        self.next.resize(self.bodies.len(), INVALID_INDEX);
        for i in 0..self.bodies.len() {
            let cell = self.cell_of(self.bodies[i].position);
            let slot = self.head.entry(cell).or_insert(INVALID_INDEX);
            self.next[i] = *slot;
            *slot = i;
        }
    }

    fn cell_of(&self, position: Vec3) -> IVec3 {
        (position / self.cell_size).floor().as_ivec3()
    }

    fn for_each_candidate<F>(&self, min: Vec3, max: Vec3, mut callback: F)
    where
        F: FnMut(&GridBody),
    {
        if self.bodies.is_empty() || !min.is_finite() || !max.is_finite() {
            return;
        }

        let min_cell = self.cell_of(min - Vec3::splat(self.max_radius));
        let max_cell = self.cell_of(max + Vec3::splat(self.max_radius));
        let span = (max_cell - min_cell + IVec3::ONE).as_i64vec3();
        let visited_cells = span.x.saturating_mul(span.y).saturating_mul(span.z);

        // Huge boxes touch more cells than there are bodies.
        if visited_cells <= 0 || visited_cells as usize > self.head.len() {
            self.bodies.iter().for_each(&mut callback);
            return;
        }

        for z in min_cell.z..=max_cell.z {
            for y in min_cell.y..=max_cell.y {
                for x in min_cell.x..=max_cell.x {
                    let Some(&first) = self.head.get(&IVec3::new(x, y, z)) else {
                        continue;
                    };
                    let mut candidate = first;
                    while candidate != INVALID_INDEX {
                        callback(&self.bodies[candidate]);
                        candidate = self.next[candidate];
                    }
                }
            }
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(20.0)
    }
}

impl SpatialQuery for SpatialGrid {
    fn overlap_region(
        &self,
        center: Vec3,
        half_extents: Vec3,
        filter: QueryFilter,
    ) -> Vec<EntityId> {
        let half_extents = half_extents.abs();
        let min = center - half_extents;
        let max = center + half_extents;
        let mut found = Vec::new();

        self.for_each_candidate(min, max, |body| {
            if !filter.accepts(body.belongs_to, body.collides_with) {
                return;
            }
            let body_min = body.position - Vec3::splat(body.radius);
            let body_max = body.position + Vec3::splat(body.radius);
            if body_min.cmple(max).all() && body_max.cmpge(min).all() {
                found.push(body.entity);
            }
        });
        found
    }

    fn cast_ray(&self, origin: Vec3, end: Vec3, filter: QueryFilter) -> Vec<RayHit> {
        let delta = end - origin;
        let length = delta.length();
        if length <= EPSILON || !length.is_finite() {
            return Vec::new();
        }
        let dir = delta / length;
        let mut hits = Vec::new();

        self.for_each_candidate(origin.min(end), origin.max(end), |body| {
            if !filter.accepts(body.belongs_to, body.collides_with) {
                return;
            }
            let Some(distance) = segment_sphere_entry(origin, dir, length, body.position, body.radius)
            else {
                return;
            };
            let position = origin + dir * distance;
            hits.push(RayHit {
                entity: body.entity,
                position,
                normal: normalize_or(position - body.position, -dir),
                fraction: distance / length,
            });
        });

        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }
}

/// Distance along the segment at which it enters the sphere. A segment that
/// starts inside the sphere enters at 0.
fn segment_sphere_entry(origin: Vec3, dir: Vec3, length: f32, centre: Vec3, radius: f32) -> Option<f32> {
    let m = origin - centre;
    let b = m.dot(dir);
    let c = m.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()).max(0.0);
    (t <= length).then_some(t)
}
