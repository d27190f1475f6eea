//! Physics query result structures.
//!
//! These structures hold the results of sweeps, line traces and overlap
//! tests returned by a [`MovementQueries`](crate::backend::MovementQueries)
//! implementation.

use bevy::ecs::entity::EntityHashSet;
use bevy::prelude::*;

use crate::math::UP;

/// Result of a capsule sweep or line trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    /// Whether the query was stopped by a blocking surface.
    pub blocking: bool,
    /// Whether the shape already overlapped the surface at the start.
    pub start_penetrating: bool,
    /// Shape location at the time of impact (capsule center for sweeps,
    /// the hit point for line traces).
    pub location: Vec3,
    /// Contact point on the hit surface.
    pub impact_point: Vec3,
    /// Surface normal at the contact, pointing away from the surface.
    pub impact_normal: Vec3,
    /// Overlap depth when `start_penetrating` is set.
    pub penetration_depth: f32,
    /// Fraction of the requested offset travelled before the impact (0..=1).
    pub time_fraction: f32,
    /// Entity that was hit.
    pub entity: Option<Entity>,
}

impl Default for HitResult {
    fn default() -> Self {
        Self::miss(Vec3::ZERO)
    }
}

impl HitResult {
    /// A query that travelled its whole length without hitting anything.
    pub fn miss(end: Vec3) -> Self {
        Self {
            blocking: false,
            start_penetrating: false,
            location: end,
            impact_point: end,
            impact_normal: Vec3::ZERO,
            penetration_depth: 0.0,
            time_fraction: 1.0,
            entity: None,
        }
    }

    /// A blocking hit.
    pub fn hit(
        location: Vec3,
        impact_point: Vec3,
        impact_normal: Vec3,
        time_fraction: f32,
        entity: Option<Entity>,
    ) -> Self {
        Self {
            blocking: true,
            start_penetrating: false,
            location,
            impact_point,
            impact_normal,
            penetration_depth: 0.0,
            time_fraction: time_fraction.clamp(0.0, 1.0),
            entity,
        }
    }

    /// A hit where the shape started inside the surface.
    pub fn penetrating(
        location: Vec3,
        impact_point: Vec3,
        impact_normal: Vec3,
        depth: f32,
        entity: Option<Entity>,
    ) -> Self {
        Self {
            blocking: true,
            start_penetrating: true,
            location,
            impact_point,
            impact_normal,
            penetration_depth: depth.max(0.0),
            time_fraction: 0.0,
            entity,
        }
    }

    /// Whether the hit is usable: blocking and with a non-degenerate normal.
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking && self.impact_normal.length_squared() > 0.5
    }

    /// Up component of the impact normal.
    #[inline]
    pub fn normal_up(&self) -> f32 {
        self.impact_normal.dot(UP)
    }
}

/// One entity found by an overlap test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapResult {
    /// The overlapping entity.
    pub entity: Entity,
}

/// A capsule aligned with the up axis.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CapsuleShape {
    /// Radius of the hemispherical caps.
    pub radius: f32,
    /// Half the length of the inner segment (excluding caps).
    pub half_height: f32,
}

impl Default for CapsuleShape {
    fn default() -> Self {
        Self {
            radius: 34.0,
            half_height: 54.0,
        }
    }
}

impl CapsuleShape {
    /// Create a new capsule.
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    /// Distance from the capsule center to its lowest point.
    #[inline]
    pub fn bottom_offset(&self) -> f32 {
        self.half_height + self.radius
    }

    /// Whether the shape can be queried at all.
    pub fn is_valid(&self) -> bool {
        self.radius > 0.0 && self.half_height >= 0.0
    }
}

/// Entities a query must skip.
///
/// Combines the querying character, the actors it was told to ignore and
/// the per-tick set of surfaces already rejected as floors.
#[derive(Debug, Clone, Copy)]
pub struct QueryExclusions<'a> {
    /// The character doing the query.
    pub owner: Option<Entity>,
    /// Actors ignored until explicitly un-ignored.
    pub ignored: &'a EntityHashSet,
    /// Surfaces rejected earlier in the current tick.
    pub transient: Option<&'a EntityHashSet>,
    /// Optional collision groups (memberships, filters).
    pub collision_groups: Option<(u32, u32)>,
}

impl<'a> QueryExclusions<'a> {
    /// Exclusions for a character and its ignore list.
    pub fn new(owner: Option<Entity>, ignored: &'a EntityHashSet) -> Self {
        Self {
            owner,
            ignored,
            transient: None,
            collision_groups: None,
        }
    }

    /// Also skip the given transient set.
    pub fn with_transient(mut self, transient: &'a EntityHashSet) -> Self {
        self.transient = Some(transient);
        self
    }

    /// Whether a query should skip `entity`.
    pub fn excludes(&self, entity: Entity) -> bool {
        self.owner == Some(entity)
            || self.ignored.contains(&entity)
            || self.transient.is_some_and(|set| set.contains(&entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_travels_full_length() {
        let hit = HitResult::miss(Vec3::X);
        assert!(!hit.blocking);
        assert_eq!(hit.time_fraction, 1.0);
        assert!(hit.entity.is_none());
    }

    #[test]
    fn hit_clamps_fraction() {
        let hit = HitResult::hit(Vec3::ZERO, Vec3::ZERO, Vec3::Y, 1.5, None);
        assert_eq!(hit.time_fraction, 1.0);
        assert!(hit.is_valid_blocking_hit());
    }

    #[test]
    fn degenerate_normal_is_not_a_valid_hit() {
        let hit = HitResult::hit(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, 0.5, None);
        assert!(!hit.is_valid_blocking_hit());
    }

    #[test]
    fn capsule_bottom_offset() {
        let capsule = CapsuleShape::new(10.0, 20.0);
        assert_eq!(capsule.bottom_offset(), 30.0);
        assert!(capsule.is_valid());
        assert!(!CapsuleShape::new(0.0, 20.0).is_valid());
    }

    #[test]
    fn exclusions_cover_owner_ignored_and_transient() {
        let owner = Entity::from_raw(1);
        let ignored_entity = Entity::from_raw(2);
        let rejected = Entity::from_raw(3);
        let other = Entity::from_raw(4);

        let mut ignored = EntityHashSet::default();
        ignored.insert(ignored_entity);
        let mut transient = EntityHashSet::default();
        transient.insert(rejected);

        let exclusions = QueryExclusions::new(Some(owner), &ignored).with_transient(&transient);
        assert!(exclusions.excludes(owner));
        assert!(exclusions.excludes(ignored_entity));
        assert!(exclusions.excludes(rejected));
        assert!(!exclusions.excludes(other));
    }
}
