//! Collision-safe translation.
//!
//! A tick's displacement is split at each blocking hit: the capsule moves
//! up to the contact, the velocity loses its component into the surface and
//! the leftover time is spent on the next substep. Start penetration is
//! resolved by pushing out along the contact normal without spending time.

use bevy::prelude::*;

use crate::backend::MovementQueries;
use crate::collision::{CapsuleShape, HitResult, QueryExclusions};
use crate::math::{KINDA_SMALL_NUMBER, SMALL_NUMBER};

/// One slice of a move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Substep {
    /// Simulated time spent by this slice.
    pub time: f32,
    /// Blocking hit that ended the slice, if any.
    pub hit: Option<HitResult>,
}

/// Result of [`move_with_substeps`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveOutcome {
    pub position: Vec3,
    /// Velocity after clipping against every surface hit.
    pub velocity: Vec3,
    pub substeps: Vec<Substep>,
    /// Total push-out applied to resolve start penetration.
    ///
    /// Diagnostic only: the push-out is already part of `position`, nothing
    /// is carried over to the next tick.
    pub penetration_adjustment: Vec3,
}

impl MoveOutcome {
    /// Sum of the time spent over every substep.
    pub fn consumed_time(&self) -> f32 {
        self.substeps.iter().map(|s| s.time).sum()
    }

    /// Blocking hits in the order they happened.
    pub fn hits(&self) -> impl Iterator<Item = &HitResult> {
        self.substeps.iter().filter_map(|s| s.hit.as_ref())
    }
}

/// Parameters of a move that don't change between substeps.
#[derive(Clone, Copy)]
pub struct SubstepParams<'a> {
    pub queries: &'a dyn MovementQueries,
    pub shape: &'a CapsuleShape,
    pub rotation: Quat,
    pub exclusions: &'a QueryExclusions<'a>,
    pub max_substeps: u32,
    /// Distance the capsule is backed off a contact along its normal.
    pub hit_nudge: f32,
}

/// Move from `position` with `velocity` for `dt` seconds.
///
/// The consumed time over the returned substeps always sums to `dt`; when
/// the substep budget runs out the leftover is recorded as a final slice
/// that does not move the capsule.
pub fn move_with_substeps(
    params: &SubstepParams,
    position: Vec3,
    velocity: Vec3,
    dt: f32,
) -> MoveOutcome {
    let mut outcome = MoveOutcome {
        position,
        velocity,
        ..default()
    };
    if dt <= 0.0 {
        return outcome;
    }

    let mut remaining = dt;
    for _ in 0..params.max_substeps.max(1) {
        if remaining <= SMALL_NUMBER {
            break;
        }

        let delta = outcome.velocity * remaining;
        if delta.length_squared() <= SMALL_NUMBER {
            // Nothing to sweep; a zero-length move never hits.
            outcome.substeps.push(Substep {
                time: remaining,
                hit: None,
            });
            remaining = 0.0;
            break;
        }

        let hit = params.queries.sweep_capsule(
            params.shape,
            outcome.position,
            params.rotation,
            delta,
            params.exclusions,
        );

        if hit.start_penetrating && hit.is_valid_blocking_hit() {
            let push_out = hit.impact_normal * (hit.penetration_depth + params.hit_nudge);
            outcome.position += push_out;
            outcome.penetration_adjustment += push_out;
            outcome.substeps.push(Substep {
                time: 0.0,
                hit: Some(hit),
            });
            continue;
        }

        if !hit.is_valid_blocking_hit() {
            outcome.position += delta;
            outcome.substeps.push(Substep {
                time: remaining,
                hit: None,
            });
            remaining = 0.0;
            break;
        }

        let consumed = hit.time_fraction * remaining;
        outcome.position = hit.location + hit.impact_normal * params.hit_nudge;
        outcome.velocity = clip_velocity(params.queries, outcome.velocity, &hit);
        outcome.substeps.push(Substep {
            time: consumed,
            hit: Some(hit),
        });
        remaining -= consumed;
    }

    if remaining > SMALL_NUMBER {
        trace!("Substep budget exhausted with {remaining}s left");
        outcome.substeps.push(Substep {
            time: remaining,
            hit: None,
        });
    }

    outcome
}

/// Remove the part of `velocity` that drives into the hit surface, measured
/// relative to the surface's own motion.
pub fn clip_velocity(queries: &dyn MovementQueries, velocity: Vec3, hit: &HitResult) -> Vec3 {
    let surface_velocity = hit
        .entity
        .map(|entity| queries.surface_velocity(entity))
        .unwrap_or(Vec3::ZERO);
    let into = (velocity - surface_velocity).dot(hit.impact_normal);
    if into < 0.0 {
        velocity - hit.impact_normal * into
    } else {
        velocity
    }
}

/// Single sweep toward `position + delta`, stopping at the first blocking
/// hit. Returns the reached position and the hit.
pub fn safe_move(
    params: &SubstepParams,
    position: Vec3,
    delta: Vec3,
) -> (Vec3, Option<HitResult>) {
    if delta.length_squared() <= KINDA_SMALL_NUMBER * KINDA_SMALL_NUMBER {
        return (position, None);
    }

    let hit = params.queries.sweep_capsule(
        params.shape,
        position,
        params.rotation,
        delta,
        params.exclusions,
    );
    if !hit.is_valid_blocking_hit() {
        return (position + delta, None);
    }
    if hit.start_penetrating {
        let pushed = position + hit.impact_normal * (hit.penetration_depth + params.hit_nudge);
        return (pushed, Some(hit));
    }
    (hit.location + hit.impact_normal * params.hit_nudge, Some(hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::entity::EntityHashSet;

    use crate::headless::HeadlessWorld;

    fn params<'a>(
        world: &'a HeadlessWorld,
        shape: &'a CapsuleShape,
        exclusions: &'a QueryExclusions<'a>,
    ) -> SubstepParams<'a> {
        SubstepParams {
            queries: world,
            shape,
            rotation: Quat::IDENTITY,
            exclusions,
            max_substeps: 3,
            hit_nudge: 0.05,
        }
    }

    #[test]
    fn free_move_uses_one_substep() {
        let world = HeadlessWorld::new();
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let outcome = move_with_substeps(
            &params(&world, &shape, &exclusions),
            Vec3::ZERO,
            Vec3::X * 60.0,
            1.0 / 60.0,
        );

        assert_eq!(outcome.substeps.len(), 1);
        assert!((outcome.position - Vec3::X).length() < 1.0e-5);
        assert!((outcome.consumed_time() - 1.0 / 60.0).abs() < 1.0e-6);
    }

    #[test]
    fn wall_hit_clips_velocity_and_conserves_time() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::X * 50.0, Vec3::NEG_X);
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);
        let dt = 0.1;

        let outcome = move_with_substeps(
            &params(&world, &shape, &exclusions),
            Vec3::ZERO,
            Vec3::new(300.0, 0.0, 300.0),
            dt,
        );

        assert!(outcome.hits().count() >= 1);
        assert!(outcome.position.x <= 50.0 - shape.radius + 1.0e-3);
        assert!(outcome.velocity.x.abs() < 1.0e-3);
        assert!((outcome.velocity.z - 300.0).abs() < 1.0e-3);
        assert!(outcome.position.z > 0.0);
        assert!((outcome.consumed_time() - dt).abs() < 1.0e-5);
    }

    #[test]
    fn corner_exhausts_budget_but_time_still_sums() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::X * 40.0, Vec3::NEG_X);
        world.add_plane(Vec3::Z * 40.0, Vec3::NEG_Z);
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);
        let mut p = params(&world, &shape, &exclusions);
        p.max_substeps = 2;
        let dt = 0.25;

        let outcome = move_with_substeps(&p, Vec3::ZERO, Vec3::new(400.0, 0.0, 100.0), dt);

        assert!((outcome.consumed_time() - dt).abs() < 1.0e-5);
        assert!(outcome.position.x <= 40.0 - shape.radius + 1.0e-3);
        assert!(outcome.position.z <= 40.0 - shape.radius + 1.0e-3);
    }

    #[test]
    fn start_penetration_is_pushed_out_without_spending_time() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);
        let dt = 1.0 / 60.0;

        let start = Vec3::Y * (shape.bottom_offset() - 3.0);
        let outcome = move_with_substeps(
            &params(&world, &shape, &exclusions),
            start,
            Vec3::X * 60.0,
            dt,
        );

        let first = outcome.substeps[0];
        assert_eq!(first.time, 0.0);
        assert!(first.hit.is_some_and(|h| h.start_penetrating));
        assert!(outcome.penetration_adjustment.y >= 3.0);
        assert!(outcome.position.y >= shape.bottom_offset());
        assert!((outcome.consumed_time() - dt).abs() < 1.0e-6);
    }

    #[test]
    fn zero_velocity_counts_as_a_full_substep() {
        let world = HeadlessWorld::new();
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let outcome = move_with_substeps(
            &params(&world, &shape, &exclusions),
            Vec3::ONE,
            Vec3::ZERO,
            0.02,
        );
        assert_eq!(outcome.position, Vec3::ONE);
        assert!((outcome.consumed_time() - 0.02).abs() < 1.0e-7);
    }

    #[test]
    fn clipping_is_relative_to_surface_motion() {
        let mut world = HeadlessWorld::new();
        let wall = world.add_plane(Vec3::X * 50.0, Vec3::NEG_X);
        world.set_velocity(wall, Vec3::NEG_X * 100.0);
        let hit = HitResult::hit(Vec3::ZERO, Vec3::X * 50.0, Vec3::NEG_X, 0.5, Some(wall));

        // Standing still against a wall moving toward us: pushed along with it.
        let clipped = clip_velocity(&world, Vec3::ZERO, &hit);
        assert!((clipped - Vec3::NEG_X * 100.0).length() < 1.0e-4);
    }
}
