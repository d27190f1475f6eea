//! Rapier3D physics backend implementation.
//!
//! This module answers movement queries with `bevy_rapier3d` scene queries.
//! Enable with the `rapier3d` feature.
//!
//! Characters are kinematic: the movement core writes their `Transform`
//! directly, so give them a `KinematicPositionBased` body (or none) and a
//! capsule collider matching their [`CapsuleShape`].

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::{
    CharacterPhysicsBackend, MovementQueries, SurfaceCapabilities, SurfacePose,
};
use crate::collision::{CapsuleShape, HitResult, OverlapResult, QueryExclusions};
use crate::config::MovementConfig;
use crate::events::CharacterMovementEvent;
use crate::headless::DEFAULT_GRAVITY;
use crate::intent::MovementIntent;
use crate::math::{KINDA_SMALL_NUMBER, UP};
use crate::movement::CharacterMovement;
use crate::systems::{fixed_timestep, run_character_tick};
use crate::MovementSet;

/// Rapier3D physics backend for character movement.
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }
}

/// Plugin that sets up Rapier3D-specific systems for character movement.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            rapier_movement_tick.in_set(MovementSet::Simulation),
        );
    }
}

/// Collider matching a movement capsule.
pub fn capsule_collider(shape: &CapsuleShape) -> Collider {
    Collider::capsule_y(shape.half_height, shape.radius)
}

type SurfaceData = (
    Option<&'static Velocity>,
    Option<&'static GlobalTransform>,
    Option<&'static SurfaceCapabilities>,
    Option<&'static RigidBody>,
);

/// Movement queries over one Rapier context, for one character.
struct RapierQueries<'a, 'c, 'w, 's> {
    context: &'a RapierContext<'c>,
    surfaces: &'a Query<'w, 's, SurfaceData>,
    gravity: f32,
    collision_groups: Option<CollisionGroups>,
}

impl RapierQueries<'_, '_, '_, '_> {
    /// Build the query filter for `exclusions` and run `query` with it.
    fn with_filter<R>(
        &self,
        exclusions: &QueryExclusions,
        query: impl FnOnce(QueryFilter) -> R,
    ) -> R {
        let predicate = |entity: Entity| !exclusions.excludes(entity);
        let mut filter = QueryFilter::default().exclude_sensors().predicate(&predicate);
        if let Some(owner) = exclusions.owner {
            filter = filter.exclude_rigid_body(owner).exclude_collider(owner);
        }
        if let Some(groups) = self.collision_groups {
            filter = filter.groups(groups);
        } else if let Some((memberships, filters)) = exclusions.collision_groups {
            filter = filter.groups(CollisionGroups::new(
                Group::from_bits_truncate(memberships),
                Group::from_bits_truncate(filters),
            ));
        }
        query(filter)
    }

    /// How far the capsule at `origin` overlaps the surface along `normal`.
    fn penetration_depth(
        &self,
        collider: &Collider,
        origin: Vec3,
        rotation: Quat,
        normal: Vec3,
        shape: &CapsuleShape,
        exclusions: &QueryExclusions,
    ) -> f32 {
        // Cast back in from outside along the normal; the unused part of
        // the probe is the overlap.
        let probe = shape.bottom_offset() * 2.0;
        let hit = self.with_filter(exclusions, |filter| {
            self.context.cast_shape(
                origin + normal * probe,
                rotation,
                -normal * probe,
                collider,
                ShapeCastOptions {
                    max_time_of_impact: 1.0,
                    stop_at_penetration: false,
                    ..default()
                },
                filter,
            )
        });
        match hit {
            Some((_, hit)) => ((1.0 - hit.time_of_impact) * probe).max(0.0),
            None => 0.0,
        }
    }
}

/// Contact point of an upright capsule resting against `normal`.
fn capsule_support(shape: &CapsuleShape, center: Vec3, normal: Vec3) -> Vec3 {
    center - normal * shape.radius - UP * shape.half_height * normal.dot(UP).signum()
}

impl MovementQueries for RapierQueries<'_, '_, '_, '_> {
    fn sweep_capsule(
        &self,
        shape: &CapsuleShape,
        origin: Vec3,
        rotation: Quat,
        offset: Vec3,
        exclusions: &QueryExclusions,
    ) -> HitResult {
        let collider = capsule_collider(shape);
        let hit = self.with_filter(exclusions, |filter| {
            self.context.cast_shape(
                origin,
                rotation,
                offset,
                &collider,
                ShapeCastOptions {
                    max_time_of_impact: 1.0,
                    stop_at_penetration: true,
                    compute_impact_geometry_on_penetration: true,
                    ..default()
                },
                filter,
            )
        });

        let Some((entity, hit)) = hit else {
            return HitResult::miss(origin + offset);
        };
        let normal = hit
            .details
            .map(|details| details.normal1)
            .filter(|normal| normal.length_squared() > KINDA_SMALL_NUMBER)
            .unwrap_or_else(|| -offset.normalize_or(UP));

        // Stopping at penetration reports an overlap at the start as time 0.
        if hit.time_of_impact <= 0.0 {
            let depth =
                self.penetration_depth(&collider, origin, rotation, normal, shape, exclusions);
            if depth > KINDA_SMALL_NUMBER {
                return HitResult::penetrating(
                    origin,
                    capsule_support(shape, origin, normal),
                    normal,
                    depth,
                    Some(entity),
                );
            }
        }

        let location = origin + offset * hit.time_of_impact;
        HitResult::hit(
            location,
            capsule_support(shape, location, normal),
            normal,
            hit.time_of_impact,
            Some(entity),
        )
    }

    fn line_trace(&self, start: Vec3, end: Vec3, exclusions: &QueryExclusions) -> HitResult {
        let offset = end - start;
        let length = offset.length();
        if length <= KINDA_SMALL_NUMBER {
            return HitResult::miss(end);
        }
        let direction = offset / length;

        let hit = self.with_filter(exclusions, |filter| {
            self.context
                .cast_ray_and_get_normal(start, direction, length, true, filter)
        });
        match hit {
            Some((entity, intersection)) => HitResult::hit(
                intersection.point,
                intersection.point,
                intersection.normal,
                intersection.time_of_impact / length,
                Some(entity),
            ),
            None => HitResult::miss(end),
        }
    }

    fn overlap_capsule(
        &self,
        shape: &CapsuleShape,
        location: Vec3,
        rotation: Quat,
        exclusions: &QueryExclusions,
    ) -> Vec<OverlapResult> {
        let collider = capsule_collider(shape);
        let mut overlaps = Vec::new();
        self.with_filter(exclusions, |filter| {
            self.context
                .intersections_with_shape(location, rotation, &collider, filter, |entity| {
                    overlaps.push(OverlapResult { entity });
                    true
                });
        });
        overlaps
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }

    fn surface_velocity(&self, entity: Entity) -> Vec3 {
        self.surfaces
            .get(entity)
            .ok()
            .and_then(|(velocity, ..)| velocity.map(|v| v.linvel))
            .unwrap_or(Vec3::ZERO)
    }

    fn surface_pose(&self, entity: Entity) -> Option<SurfacePose> {
        let (_, transform, ..) = self.surfaces.get(entity).ok()?;
        let (_, rotation, translation) = transform?.to_scale_rotation_translation();
        Some(SurfacePose::new(translation, rotation))
    }

    fn surface_capabilities(&self, entity: Entity) -> SurfaceCapabilities {
        let Ok((_, _, capabilities, body)) = self.surfaces.get(entity) else {
            return SurfaceCapabilities::default();
        };
        capabilities.copied().unwrap_or_else(|| SurfaceCapabilities {
            movable: body.is_some_and(|body| !matches!(body, RigidBody::Fixed)),
            ..default()
        })
    }
}

/// Rapier-specific movement tick.
///
/// Gravity comes from the Rapier configuration so characters fall like the
/// rest of the simulation.
fn rapier_movement_tick(
    time: Res<Time<Fixed>>,
    rapier_context: ReadRapierContext,
    q_rapier_config: Query<&RapierConfiguration>,
    q_surfaces: Query<SurfaceData>,
    mut q_characters: Query<(
        Entity,
        &mut CharacterMovement,
        &MovementConfig,
        Option<&mut MovementIntent>,
        &mut Transform,
        Option<&CollisionGroups>,
    )>,
    mut events: EventWriter<CharacterMovementEvent>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let gravity = q_rapier_config
        .single()
        .map(|config| config.gravity.dot(UP))
        .unwrap_or(DEFAULT_GRAVITY);
    let dt = fixed_timestep(&time);

    for (entity, mut movement, config, intent, mut transform, collision_groups) in
        &mut q_characters
    {
        let queries = RapierQueries {
            context: &context,
            surfaces: &q_surfaces,
            gravity,
            collision_groups: collision_groups.copied(),
        };
        let emitted = run_character_tick(
            entity,
            &mut movement,
            config,
            intent.map(Mut::into_inner),
            &mut transform,
            &queries,
            dt,
        );
        events.write_batch(
            emitted
                .into_iter()
                .map(|event| CharacterMovementEvent::new(entity, event)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_point_is_the_capsule_bottom_on_a_floor() {
        let shape = CapsuleShape::new(10.0, 20.0);
        let center = Vec3::new(5.0, 40.0, -3.0);
        let support = capsule_support(&shape, center, Vec3::Y);
        assert!((support - Vec3::new(5.0, 10.0, -3.0)).length() < 1.0e-5);
    }

    #[test]
    fn support_point_faces_a_wall() {
        let shape = CapsuleShape::new(10.0, 20.0);
        let support = capsule_support(&shape, Vec3::ZERO, Vec3::NEG_X);
        assert!((support.x - 10.0).abs() < 1.0e-5);
    }
}
