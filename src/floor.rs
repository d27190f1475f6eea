//! Floor, wall and ledge probing.
//!
//! The capsule sweep gives a contact, but capsule normals near edges are
//! unreliable, so every candidate floor is confirmed with a straight-down
//! line trace through the impact point. Surfaces rejected during a probe
//! are added to a transient exclusion set so stacked colliders underneath
//! can still be found on the next try.

use bevy::ecs::entity::EntityHashSet;
use bevy::prelude::*;

use crate::backend::MovementQueries;
use crate::collision::{CapsuleShape, HitResult, QueryExclusions};
use crate::config::{AnchorConfig, FloorConfig};
use crate::math::{planar, project_on_plane, UP};
use crate::state::LedgeInfo;

/// A confirmed walkable floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorSample {
    /// The downward capsule sweep that found the floor.
    pub hit: HitResult,
    /// Surface normal from the straight-down refinement trace.
    pub normal: Vec3,
}

impl FloorSample {
    #[inline]
    pub fn entity(&self) -> Option<Entity> {
        self.hit.entity
    }
}

/// A ledge the character can hang from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgeGrab {
    pub ledge: LedgeInfo,
    /// Where the capsule center hangs while holding the ledge.
    pub hang_point: Vec3,
}

/// Borrowed view used by every probe of one character.
pub struct FloorProbe<'a> {
    pub queries: &'a dyn MovementQueries,
    pub shape: &'a CapsuleShape,
    pub config: &'a FloorConfig,
    pub owner: Option<Entity>,
    pub ignored: &'a EntityHashSet,
}

impl<'a> FloorProbe<'a> {
    pub fn new(
        queries: &'a dyn MovementQueries,
        shape: &'a CapsuleShape,
        config: &'a FloorConfig,
        owner: Option<Entity>,
        ignored: &'a EntityHashSet,
    ) -> Self {
        Self {
            queries,
            shape,
            config,
            owner,
            ignored,
        }
    }

    fn exclusions(&self) -> QueryExclusions<'a> {
        QueryExclusions::new(self.owner, self.ignored)
    }

    /// Sweep down by `snap_distance` up to `num_tries` times looking for a
    /// walkable floor.
    ///
    /// Surfaces that are hit but fail validation are added to `invalid`
    /// and skipped by the following tries.
    pub fn find_floor(
        &self,
        location: Vec3,
        rotation: Quat,
        snap_distance: f32,
        num_tries: u32,
        invalid: &mut EntityHashSet,
    ) -> Option<FloorSample> {
        let offset = -UP * snap_distance.max(0.0);

        for _ in 0..num_tries.max(1) {
            let (hit, normal) = {
                let exclusions = self.exclusions().with_transient(invalid);
                let hit = self
                    .queries
                    .sweep_capsule(self.shape, location, rotation, offset, &exclusions);
                if !hit.is_valid_blocking_hit() {
                    return None;
                }
                let normal = self.valid_floor_normal(&hit, &exclusions);
                (hit, normal)
            };

            if let Some(normal) = normal {
                return Some(FloorSample { hit, normal });
            }

            // Unidentifiable surfaces cannot be excluded; stop here.
            let entity = hit.entity?;
            trace!("Rejected floor candidate {entity:?}");
            invalid.insert(entity);
        }

        None
    }

    /// Refined floor normal of `hit`, or `None` when the surface is not
    /// walkable.
    pub fn valid_floor_normal(
        &self,
        hit: &HitResult,
        exclusions: &QueryExclusions,
    ) -> Option<Vec3> {
        if let Some(entity) = hit.entity {
            if !self.queries.surface_capabilities(entity).step_uppable {
                return None;
            }
        }

        let half = self.config.normal_trace_length * 0.5;
        let start = hit.impact_point + UP * half;
        let end = hit.impact_point - UP * half;
        let trace = self.queries.line_trace(start, end, exclusions);
        if !trace.is_valid_blocking_hit() {
            return None;
        }

        (trace.normal_up() >= self.config.max_incline_cos()).then_some(trace.impact_normal)
    }

    /// Whether `hit` is a walkable floor.
    pub fn is_valid_floor(&self, hit: &HitResult) -> bool {
        hit.is_valid_blocking_hit()
            && self
                .valid_floor_normal(hit, &self.exclusions())
                .is_some()
    }

    /// Capsule location resting on `floor`, lifted by the configured padding.
    pub fn snap_location(&self, floor: &FloorSample) -> Vec3 {
        floor.hit.location + floor.normal * self.config.padding
    }

    /// Whether ground continues `safe_radius` away from the floor contact in
    /// every planar direction.
    ///
    /// Only static surfaces qualify; locations on movers are never safe.
    pub fn check_floor_valid_within_range(&self, floor: &FloorSample) -> bool {
        let Some(entity) = floor.entity() else {
            return false;
        };
        if self.queries.surface_capabilities(entity).movable {
            return false;
        }

        let exclusions = self.exclusions();
        let reach = self.config.safe_radius;
        let depth = self.config.normal_trace_length.max(reach);

        [Vec3::X, Vec3::NEG_X, Vec3::Z, Vec3::NEG_Z]
            .into_iter()
            .all(|direction| {
                let along = project_on_plane(direction, floor.normal).normalize_or_zero();
                let sample = floor.hit.impact_point + along * reach;
                let trace =
                    self.queries
                        .line_trace(sample + UP * depth, sample - UP * depth, &exclusions);
                trace.is_valid_blocking_hit()
                    && trace.entity == Some(entity)
                    && trace.normal_up() >= self.config.max_incline_cos()
            })
    }

    /// Trace horizontally from the capsule for a wall along `direction`.
    ///
    /// Returns the hit when its normal is steep enough to count as a wall.
    pub fn probe_wall(
        &self,
        location: Vec3,
        direction: Vec3,
        distance: f32,
        max_normal_up: f32,
    ) -> Option<HitResult> {
        let direction = planar(direction).normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }

        let end = location + direction * (self.shape.radius + distance);
        let hit = self.queries.line_trace(location, end, &self.exclusions());
        (hit.is_valid_blocking_hit() && hit.normal_up().abs() <= max_normal_up).then_some(hit)
    }

    /// Search for a ledge in front of the capsule.
    ///
    /// A ledge needs a wall within reach, a walkable top between the
    /// configured heights, and room for the capsule standing on top.
    pub fn find_ledge(
        &self,
        location: Vec3,
        forward: Vec3,
        anchor: &AnchorConfig,
        max_wall_normal_up: f32,
    ) -> Option<LedgeGrab> {
        let wall = self.probe_wall(location, forward, anchor.mantle_reach, max_wall_normal_up)?;
        let wall_entity = wall.entity?;
        let wall_normal = planar(wall.impact_normal).normalize_or_zero();
        if wall_normal == Vec3::ZERO {
            return None;
        }

        let exclusions = self.exclusions();
        let column = planar(wall.impact_point - wall_normal * anchor.ledge_depth);
        let top_trace = self.queries.line_trace(
            column + UP * (location.y + anchor.mantle_max_height),
            column + UP * (location.y + anchor.mantle_min_height),
            &exclusions,
        );
        if !top_trace.is_valid_blocking_hit()
            || top_trace.start_penetrating
            || top_trace.normal_up() < self.config.max_incline_cos()
        {
            return None;
        }

        let top = top_trace.impact_point;
        let standing = top + UP * (self.shape.bottom_offset() + self.config.padding);
        if !self
            .queries
            .overlap_capsule(self.shape, standing, Quat::IDENTITY, &exclusions)
            .is_empty()
        {
            trace!("Ledge at {top} has no headroom");
            return None;
        }

        let direction = UP.cross(wall_normal).normalize_or_zero();
        let hang_point =
            planar(wall.impact_point + wall_normal * (self.shape.radius + anchor.hang_offset))
            + UP * (top.y - anchor.hang_height);

        Some(LedgeGrab {
            ledge: LedgeInfo {
                top,
                wall_normal,
                direction,
                entity: top_trace.entity.unwrap_or(wall_entity),
            },
            hang_point,
        })
    }

    /// Whether the ledge continues at `top` (used while sliding along it).
    pub fn ledge_continues(&self, top: Vec3, anchor: &AnchorConfig) -> Option<Vec3> {
        let trace = self.queries.line_trace(
            top + UP * anchor.hang_height,
            top - UP * anchor.ledge_depth,
            &self.exclusions(),
        );
        (trace.is_valid_blocking_hit()
            && !trace.start_penetrating
            && trace.normal_up() >= self.config.max_incline_cos())
        .then_some(trace.impact_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurfaceCapabilities;
    use crate::headless::HeadlessWorld;

    fn probe<'a>(
        world: &'a HeadlessWorld,
        shape: &'a CapsuleShape,
        config: &'a FloorConfig,
        ignored: &'a EntityHashSet,
    ) -> FloorProbe<'a> {
        FloorProbe::new(world, shape, config, None, ignored)
    }

    #[test]
    fn flat_floor_is_found_with_up_normal() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::default();
        let config = FloorConfig::default();
        let ignored = EntityHashSet::default();
        let mut invalid = EntityHashSet::default();

        let location = Vec3::Y * (shape.bottom_offset() + 2.0);
        let floor = probe(&world, &shape, &config, &ignored)
            .find_floor(location, Quat::IDENTITY, 5.0, 3, &mut invalid)
            .expect("floor below");

        assert!((floor.normal.y - 1.0).abs() < 1.0e-5);
        assert!((floor.hit.location.y - shape.bottom_offset()).abs() < 1.0e-3);
        assert!(invalid.is_empty());
    }

    #[test]
    fn floor_out_of_reach_is_missed() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::default();
        let config = FloorConfig::default();
        let ignored = EntityHashSet::default();
        let mut invalid = EntityHashSet::default();

        let location = Vec3::Y * (shape.bottom_offset() + 20.0);
        assert!(probe(&world, &shape, &config, &ignored)
            .find_floor(location, Quat::IDENTITY, 5.0, 3, &mut invalid)
            .is_none());
    }

    #[test]
    fn incline_boundary_is_inclusive() {
        let config = FloorConfig::default();
        let threshold = config.max_incline_cos();
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();

        let mut at_limit = HeadlessWorld::new();
        let side = (1.0 - threshold * threshold).sqrt();
        at_limit.add_plane(Vec3::ZERO, Vec3::new(side, threshold, 0.0));

        let mut too_steep = HeadlessWorld::new();
        let steep_up = threshold - 1.0e-3;
        let steep_side = (1.0 - steep_up * steep_up).sqrt();
        too_steep.add_plane(Vec3::ZERO, Vec3::new(steep_side, steep_up, 0.0));

        let location = Vec3::Y * (shape.bottom_offset() * 1.5 + 2.0);
        let snap = shape.bottom_offset();

        let mut invalid = EntityHashSet::default();
        let found = probe(&at_limit, &shape, &config, &ignored)
            .find_floor(location, Quat::IDENTITY, snap, 3, &mut invalid);
        assert!(found.is_some(), "surface at the incline limit is walkable");

        let mut invalid = EntityHashSet::default();
        let found = probe(&too_steep, &shape, &config, &ignored)
            .find_floor(location, Quat::IDENTITY, snap, 3, &mut invalid);
        assert!(found.is_none(), "surface past the incline limit is not walkable");
        assert_eq!(invalid.len(), 1);
    }

    #[test]
    fn rejected_surface_reveals_floor_beneath() {
        let mut world = HeadlessWorld::new();
        let shelf = world.add_box(Vec3::new(0.0, -1.0, 0.0), Vec3::new(200.0, 1.0, 200.0));
        world.set_capabilities(
            shelf,
            SurfaceCapabilities {
                step_uppable: false,
                movable: false,
            },
        );
        let ground = world.add_plane(Vec3::Y * -4.0, Vec3::Y);

        let shape = CapsuleShape::default();
        let config = FloorConfig::default();
        let ignored = EntityHashSet::default();
        let mut invalid = EntityHashSet::default();

        let location = Vec3::Y * (shape.bottom_offset() + 0.5);
        let floor = probe(&world, &shape, &config, &ignored)
            .find_floor(location, Quat::IDENTITY, 5.0, 3, &mut invalid)
            .expect("ground under the shelf");

        assert_eq!(floor.entity(), Some(ground));
        assert!(invalid.contains(&shelf));
    }

    #[test]
    fn range_check_fails_near_an_edge() {
        let mut world = HeadlessWorld::new();
        world.add_box(Vec3::new(0.0, -10.0, 0.0), Vec3::new(100.0, 10.0, 100.0));
        let shape = CapsuleShape::default();
        let config = FloorConfig::default();
        let ignored = EntityHashSet::default();
        let floor_probe = probe(&world, &shape, &config, &ignored);

        let mut invalid = EntityHashSet::default();
        let center = Vec3::Y * (shape.bottom_offset() + 1.0);
        let floor = floor_probe
            .find_floor(center, Quat::IDENTITY, 5.0, 3, &mut invalid)
            .expect("box top");
        assert!(floor_probe.check_floor_valid_within_range(&floor));

        let near_edge = center + Vec3::X * 80.0;
        let floor = floor_probe
            .find_floor(near_edge, Quat::IDENTITY, 5.0, 3, &mut invalid)
            .expect("box top near edge");
        assert!(!floor_probe.check_floor_valid_within_range(&floor));
    }

    #[test]
    fn ledge_is_found_on_a_wall_top() {
        let mut world = HeadlessWorld::new();
        // Block whose top is 60 above the capsule center, face at x = 50.
        world.add_box(Vec3::new(150.0, -40.0, 0.0), Vec3::new(100.0, 100.0, 300.0));
        let shape = CapsuleShape::default();
        let config = FloorConfig::default();
        let ignored = EntityHashSet::default();
        let anchor = AnchorConfig::default();

        let grab = probe(&world, &shape, &config, &ignored)
            .find_ledge(Vec3::ZERO, Vec3::X, &anchor, 0.3)
            .expect("ledge");

        assert!((grab.ledge.top.y - 60.0).abs() < 1.0e-3);
        assert!((grab.ledge.wall_normal - Vec3::NEG_X).length() < 1.0e-5);
        assert!((grab.hang_point.y - (60.0 - anchor.hang_height)).abs() < 1.0e-3);
        assert!(grab.hang_point.x < 50.0 - shape.radius);
        assert!(grab.ledge.direction.dot(grab.ledge.wall_normal).abs() < 1.0e-5);
    }
}
