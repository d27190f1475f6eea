//! Physics backend abstraction.
//!
//! The movement core never talks to a physics engine directly. Everything it
//! needs from the world goes through [`MovementQueries`], and the Bevy side of
//! a backend is provided by [`CharacterPhysicsBackend`]. This allows easy
//! swapping between physics engines (the analytic headless world, Rapier3D,
//! custom).

use bevy::prelude::*;

use crate::collision::{CapsuleShape, HitResult, OverlapResult, QueryExclusions};

/// Trait for physics backend implementations.
///
/// A backend contributes the plugin that schedules the per-character tick
/// against its world representation. The tick itself is shared
/// ([`crate::systems::run_character_tick`]).
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;
}

/// Capabilities of a surface the character touches.
///
/// Resolved once when a surface becomes the character's basis and cached,
/// rather than inspected again every tick. Physics-engine backends read it
/// as an optional component on surface entities.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct SurfaceCapabilities {
    /// The character may stand on this surface.
    pub step_uppable: bool,
    /// The surface can move, so the character must follow it.
    pub movable: bool,
}

impl Default for SurfaceCapabilities {
    fn default() -> Self {
        Self {
            step_uppable: true,
            movable: false,
        }
    }
}

/// Pose of a surface in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfacePose {
    /// World translation of the surface origin.
    pub translation: Vec3,
    /// World rotation of the surface.
    pub rotation: Quat,
}

impl SurfacePose {
    /// Create a pose.
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Express a world point in the surface's local axes.
    pub fn to_local(&self, world_point: Vec3) -> Vec3 {
        self.rotation.inverse() * (world_point - self.translation)
    }

    /// Convert a local point back to world space.
    pub fn to_world(&self, local_point: Vec3) -> Vec3 {
        self.translation + self.rotation * local_point
    }
}

/// Geometry and physics queries the movement core consumes.
///
/// Implementations must be synchronous and side-effect free.
pub trait MovementQueries {
    /// Sweep a capsule from `origin` by `offset`.
    ///
    /// Returns the first blocking hit, a start-penetrating hit when the capsule
    /// already overlaps something at `origin`, or a miss.
    fn sweep_capsule(
        &self,
        shape: &CapsuleShape,
        origin: Vec3,
        rotation: Quat,
        offset: Vec3,
        exclusions: &QueryExclusions,
    ) -> HitResult;

    /// Trace a line segment from `start` to `end`.
    fn line_trace(&self, start: Vec3, end: Vec3, exclusions: &QueryExclusions) -> HitResult;

    /// All entities overlapping a capsule placed at `location`.
    fn overlap_capsule(
        &self,
        shape: &CapsuleShape,
        location: Vec3,
        rotation: Quat,
        exclusions: &QueryExclusions,
    ) -> Vec<OverlapResult>;

    /// Signed gravity acceleration along the up axis (negative pulls down).
    fn gravity(&self) -> f32;

    /// Linear velocity of a surface; zero for static or unknown entities.
    fn surface_velocity(&self, entity: Entity) -> Vec3;

    /// Current pose of a surface, or `None` when it no longer exists.
    fn surface_pose(&self, entity: Entity) -> Option<SurfacePose>;

    /// Capabilities of a surface.
    fn surface_capabilities(&self, entity: Entity) -> SurfaceCapabilities;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_local_roundtrip() {
        let pose = SurfacePose::new(Vec3::new(10.0, 2.0, -3.0), Quat::from_rotation_y(0.7));
        let point = Vec3::new(1.0, 5.0, 2.0);
        let local = pose.to_local(point);
        assert!((pose.to_world(local) - point).length() < 1.0e-4);
    }

    #[test]
    fn default_capabilities_are_static_floor() {
        let caps = SurfaceCapabilities::default();
        assert!(caps.step_uppable);
        assert!(!caps.movable);
    }
}
