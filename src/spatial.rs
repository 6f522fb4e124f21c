use glam::Vec3;

use crate::world::EntityId;

pub mod layers {
    pub const BOID: u32 = 1 << 0;
    pub const STATION: u32 = 1 << 1;
    pub const OBSTACLE: u32 = 1 << 2;
    pub const PROJECTILE: u32 = 1 << 3;
    pub const ALL: u32 = !0;
}

/// Two-sided layer mask test: the query must collide with the body's layer
/// and the body must collide with the query's layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryFilter {
    pub belongs_to: u32,
    pub collides_with: u32,
}

impl QueryFilter {
    /// Neighbor scans are issued from the boid layer against everything.
    pub const BOIDS: Self = Self {
        belongs_to: layers::BOID,
        collides_with: layers::ALL,
    };

    pub const EVERYTHING: Self = Self {
        belongs_to: layers::ALL,
        collides_with: layers::ALL,
    };

    pub fn accepts(self, body_belongs_to: u32, body_collides_with: u32) -> bool {
        (self.belongs_to & body_collides_with) != 0 && (body_belongs_to & self.collides_with) != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub position: Vec3,
    pub normal: Vec3,
    /// Position along the ray in [0, 1].
    pub fraction: f32,
}

/// Collision/query backend consulted by the steering and combat code.
///
/// Implementations must answer from one consistent snapshot for the whole
/// tick.
pub trait SpatialQuery: Sync {
    /// Bodies whose bounds overlap the box `center ± half_extents`. Unordered
    /// and may include the querying body itself.
    fn overlap_region(&self, center: Vec3, half_extents: Vec3, filter: QueryFilter)
        -> Vec<EntityId>;

    /// Hits along the segment `origin..end`, nearest first.
    fn cast_ray(&self, origin: Vec3, end: Vec3, filter: QueryFilter) -> Vec<RayHit>;
}

/// Broad-phase neighbor candidates inside a cube of half-size `radius`.
pub fn broad_neighbours<S: SpatialQuery + ?Sized>(
    space: &S,
    center: Vec3,
    radius: f32,
) -> Vec<EntityId> {
    space.overlap_region(center, Vec3::splat(radius.max(0.0)), QueryFilter::BOIDS)
}

#[cfg(test)]
mod tests {
    use super::{layers, QueryFilter};

    #[test]
    fn filter_requires_both_directions() {
        assert!(QueryFilter::BOIDS.accepts(layers::STATION, layers::ALL));
        assert!(!QueryFilter::BOIDS.accepts(layers::STATION, layers::PROJECTILE));

        let stations_only = QueryFilter {
            belongs_to: layers::BOID,
            collides_with: layers::STATION,
        };
        assert!(stations_only.accepts(layers::STATION, layers::ALL));
        assert!(!stations_only.accepts(layers::BOID, layers::ALL));
    }
}
