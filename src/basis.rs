//! Moving-platform tracking.
//!
//! While attached, the character's position is stored in the basis' local
//! frame. Each tick the stored offset is re-applied to the basis' current
//! pose; the difference to where the character actually is becomes the
//! basis-relative velocity. The basis itself is only ever referenced by
//! entity and looked up through [`MovementQueries`], so it may disappear at
//! any time.

use bevy::prelude::*;

use crate::backend::{MovementQueries, SurfaceCapabilities, SurfacePose};
use crate::math::{safe_div, wrap_angle, yaw_of_rotation};

/// What the basis did since the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasisFollow {
    /// Where the stored local offset now lies in world space.
    pub target: Vec3,
    /// Yaw the basis turned by since the last tick (radians).
    pub yaw_delta: f32,
}

/// Outcome of following the basis for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowResult {
    /// Not attached to anything.
    Detached,
    /// The basis moved (or stayed put).
    Moved(BasisFollow),
    /// The basis no longer exists; the tracker detached itself.
    Vanished,
}

/// Per-character basis state.
#[derive(Debug, Clone, Default)]
pub struct BasisTracker {
    entity: Option<Entity>,
    /// Capabilities resolved at attach time.
    capabilities: SurfaceCapabilities,
    local_offset: Vec3,
    last_pose: Option<SurfacePose>,
    relative_velocity: Vec3,
    /// Anchor point in basis-local space (or world space without a basis).
    anchor: Option<Vec3>,
}

impl BasisTracker {
    /// The attached basis, if any.
    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    pub fn is_attached(&self) -> bool {
        self.entity.is_some()
    }

    pub fn capabilities(&self) -> SurfaceCapabilities {
        self.capabilities
    }

    /// Basis velocity imparted on the character during the last follow.
    pub fn relative_velocity(&self) -> Vec3 {
        self.relative_velocity
    }

    /// Attach to `entity` if it is a mover.
    ///
    /// Returns whether the tracker is attached to `entity` afterwards.
    pub fn attach(
        &mut self,
        queries: &dyn MovementQueries,
        entity: Entity,
        position: Vec3,
    ) -> bool {
        if self.entity == Some(entity) {
            return true;
        }

        let capabilities = queries.surface_capabilities(entity);
        if !capabilities.movable {
            return false;
        }
        let Some(pose) = queries.surface_pose(entity) else {
            trace!("Basis {entity:?} has no pose; not attaching");
            return false;
        };

        // Re-express any anchor held against the previous basis.
        let anchor_world = self.anchor_world(queries);

        self.entity = Some(entity);
        self.capabilities = capabilities;
        self.local_offset = pose.to_local(position);
        self.last_pose = Some(pose);
        self.relative_velocity = Vec3::ZERO;
        self.anchor = anchor_world.map(|world| pose.to_local(world));
        true
    }

    /// Detach from the current basis, returning its last relative velocity.
    pub fn detach(&mut self, queries: &dyn MovementQueries) -> Vec3 {
        let anchor_world = self.anchor_world(queries);
        self.entity = None;
        self.capabilities = SurfaceCapabilities::default();
        self.last_pose = None;
        self.anchor = anchor_world;
        std::mem::take(&mut self.relative_velocity)
    }

    /// Recompute where the stored offset lies on the basis' current pose.
    pub fn follow(
        &mut self,
        queries: &dyn MovementQueries,
        position: Vec3,
        dt: f32,
    ) -> FollowResult {
        let Some(entity) = self.entity else {
            self.relative_velocity = Vec3::ZERO;
            return FollowResult::Detached;
        };
        let Some(pose) = queries.surface_pose(entity) else {
            debug!("Basis {entity:?} vanished");
            self.entity = None;
            self.last_pose = None;
            self.anchor = None;
            self.relative_velocity = Vec3::ZERO;
            return FollowResult::Vanished;
        };

        let target = pose.to_world(self.local_offset);
        let last_rotation = self.last_pose.map_or(pose.rotation, |last| last.rotation);
        let yaw_delta = wrap_angle(yaw_of_rotation(pose.rotation) - yaw_of_rotation(last_rotation));

        self.relative_velocity = safe_div(target - position, dt);
        self.last_pose = Some(pose);
        FollowResult::Moved(BasisFollow { target, yaw_delta })
    }

    /// Cache `position` in the basis' local frame for the next tick.
    ///
    /// Without a basis the cached pose and offset are cleared, so the next
    /// attach starts from the surface's pose at that time.
    pub fn store_local_offset(&mut self, position: Vec3) {
        match self.last_pose {
            Some(pose) if self.entity.is_some() => {
                self.local_offset = pose.to_local(position);
            }
            _ => {
                self.last_pose = None;
                self.local_offset = Vec3::ZERO;
            }
        }
    }

    /// Hold `world_point` as the anchor, expressed relative to the basis.
    pub fn set_anchor(&mut self, queries: &dyn MovementQueries, world_point: Vec3) {
        let pose = self.entity.and_then(|entity| queries.surface_pose(entity));
        self.anchor = Some(match pose {
            Some(pose) => pose.to_local(world_point),
            None => world_point,
        });
    }

    pub fn clear_anchor(&mut self) {
        self.anchor = None;
    }

    pub fn has_anchor(&self) -> bool {
        self.anchor.is_some()
    }

    /// The anchor in world space, following the basis' current pose.
    pub fn anchor_world(&self, queries: &dyn MovementQueries) -> Option<Vec3> {
        let anchor = self.anchor?;
        match self.entity {
            Some(entity) => queries.surface_pose(entity).map(|pose| pose.to_world(anchor)),
            None => Some(anchor),
        }
    }
}
