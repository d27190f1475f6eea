//! Analytic in-memory physics world.
//!
//! [`HeadlessWorld`] answers [`MovementQueries`] against infinite planes and
//! axis-aligned boxes without a physics engine. Capsules are treated as
//! upright: plane sweeps are exact, box sweeps use the box expanded by the
//! capsule's extents. Surfaces can move at a constant velocity and spin
//! about the up axis via [`HeadlessWorld::advance`], which is enough for
//! server-side simulation of simple levels and for deterministic tests.

use bevy::ecs::entity::EntityHashMap;
use bevy::prelude::*;

use crate::backend::{
    CharacterPhysicsBackend, MovementQueries, SurfaceCapabilities, SurfacePose,
};
use crate::collision::{CapsuleShape, HitResult, OverlapResult, QueryExclusions};
use crate::events::CharacterMovementEvent;
use crate::intent::MovementIntent;
use crate::math::{KINDA_SMALL_NUMBER, SMALL_NUMBER, UP};
use crate::movement::CharacterMovement;
use crate::systems::{fixed_timestep, run_character_tick};
use crate::config::MovementConfig;
use crate::MovementSet;

/// Default gravity of a headless world (cm/s², along up).
pub const DEFAULT_GRAVITY: f32 = -980.0;

/// First entity index handed out to headless surfaces.
const SURFACE_INDEX_BASE: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Geometry {
    /// Half-space below `normal` through `point`.
    Plane { point: Vec3, normal: Vec3 },
    /// Axis-aligned box.
    Cuboid { center: Vec3, half_extents: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Surface {
    geometry: Geometry,
    velocity: Vec3,
    rotation: Quat,
    /// Radians per second about the up axis.
    yaw_rate: f32,
    capabilities: SurfaceCapabilities,
}

impl Surface {
    fn origin(&self) -> Vec3 {
        match self.geometry {
            Geometry::Plane { point, .. } => point,
            Geometry::Cuboid { center, .. } => center,
        }
    }

    fn translate(&mut self, delta: Vec3) {
        match &mut self.geometry {
            Geometry::Plane { point, .. } => *point += delta,
            Geometry::Cuboid { center, .. } => *center += delta,
        }
    }
}

/// Planes and boxes answering movement queries.
#[derive(Resource, Debug, Clone)]
pub struct HeadlessWorld {
    surfaces: EntityHashMap<Surface>,
    /// Insertion order, for deterministic tie-breaking.
    order: Vec<Entity>,
    next_index: u32,
    /// Gravity along the up axis.
    pub gravity: f32,
}

impl Default for HeadlessWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessWorld {
    pub fn new() -> Self {
        Self {
            surfaces: EntityHashMap::default(),
            order: Vec::new(),
            next_index: SURFACE_INDEX_BASE,
            gravity: DEFAULT_GRAVITY,
        }
    }

    /// Set gravity along the up axis.
    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    fn insert(&mut self, geometry: Geometry) -> Entity {
        let entity = Entity::from_raw(self.next_index);
        self.next_index += 1;
        self.surfaces.insert(
            entity,
            Surface {
                geometry,
                velocity: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                yaw_rate: 0.0,
                capabilities: SurfaceCapabilities::default(),
            },
        );
        self.order.push(entity);
        entity
    }

    /// Add an infinite plane through `point`. Solid lies behind `normal`.
    pub fn add_plane(&mut self, point: Vec3, normal: Vec3) -> Entity {
        // Keep near-unit normals bit-exact so incline thresholds compare
        // against exactly the value the caller built.
        let normal = if (normal.length_squared() - 1.0).abs() <= KINDA_SMALL_NUMBER {
            normal
        } else {
            normal.normalize_or(UP)
        };
        self.insert(Geometry::Plane { point, normal })
    }

    /// Add an axis-aligned box.
    pub fn add_box(&mut self, center: Vec3, half_extents: Vec3) -> Entity {
        self.insert(Geometry::Cuboid {
            center,
            half_extents: half_extents.abs(),
        })
    }

    /// Remove a surface. Returns whether it existed.
    pub fn remove(&mut self, entity: Entity) -> bool {
        self.order.retain(|e| *e != entity);
        self.surfaces.remove(&entity).is_some()
    }

    /// Give a surface a constant velocity. Moving surfaces become movable.
    pub fn set_velocity(&mut self, entity: Entity, velocity: Vec3) {
        if let Some(surface) = self.surfaces.get_mut(&entity) {
            surface.velocity = velocity;
            surface.capabilities.movable |= velocity != Vec3::ZERO;
        }
    }

    /// Spin a surface about the up axis through its origin.
    ///
    /// Collision geometry stays axis-aligned; only the reported pose turns,
    /// which is exact for horizontal planes.
    pub fn set_yaw_rate(&mut self, entity: Entity, yaw_rate: f32) {
        if let Some(surface) = self.surfaces.get_mut(&entity) {
            surface.yaw_rate = yaw_rate;
            surface.capabilities.movable |= yaw_rate != 0.0;
        }
    }

    pub fn set_capabilities(&mut self, entity: Entity, capabilities: SurfaceCapabilities) {
        if let Some(surface) = self.surfaces.get_mut(&entity) {
            surface.capabilities = capabilities;
        }
    }

    /// Move and turn every surface by its velocity and yaw rate.
    pub fn advance(&mut self, dt: f32) {
        for surface in self.surfaces.values_mut() {
            let delta = surface.velocity * dt;
            surface.translate(delta);
            if surface.yaw_rate != 0.0 {
                let turn = Quat::from_rotation_y(surface.yaw_rate * dt);
                surface.rotation = (turn * surface.rotation).normalize();
            }
        }
    }

    fn candidates<'a>(
        &'a self,
        exclusions: &'a QueryExclusions,
    ) -> impl Iterator<Item = (Entity, &'a Surface)> + 'a {
        self.order
            .iter()
            .filter(|entity| !exclusions.excludes(**entity))
            .filter_map(|entity| self.surfaces.get(entity).map(|s| (*entity, s)))
    }
}

/// Extents of an upright capsule along each axis.
fn capsule_extents(shape: &CapsuleShape) -> Vec3 {
    Vec3::new(shape.radius, shape.bottom_offset(), shape.radius)
}

/// Keep the deepest penetration, else the earliest hit.
fn closer(best: Option<HitResult>, candidate: HitResult) -> Option<HitResult> {
    match best {
        None => Some(candidate),
        Some(best) => {
            let better = match (candidate.start_penetrating, best.start_penetrating) {
                (true, false) => true,
                (false, true) => false,
                (true, true) => candidate.penetration_depth > best.penetration_depth,
                (false, false) => candidate.time_fraction < best.time_fraction,
            };
            Some(if better { candidate } else { best })
        }
    }
}

fn sweep_plane(
    shape: &CapsuleShape,
    axis: Vec3,
    origin: Vec3,
    offset: Vec3,
    point: Vec3,
    normal: Vec3,
    entity: Entity,
) -> Option<HitResult> {
    let reach = shape.radius + shape.half_height * axis.dot(normal).abs();
    let support = |center: Vec3| {
        center - normal * shape.radius - axis * shape.half_height * axis.dot(normal).signum()
    };
    let distance = normal.dot(origin - point) - reach;

    if distance < -KINDA_SMALL_NUMBER {
        return Some(HitResult::penetrating(
            origin,
            support(origin),
            normal,
            -distance,
            Some(entity),
        ));
    }

    let rate = normal.dot(offset);
    if rate >= -SMALL_NUMBER {
        return None;
    }
    let time = distance.max(0.0) / -rate;
    if time > 1.0 {
        return None;
    }
    let location = origin + offset * time;
    Some(HitResult::hit(
        location,
        support(location),
        normal,
        time,
        Some(entity),
    ))
}

/// Slab test of a point moving from `origin` by `offset` against a box.
///
/// Returns the entry time and the entry face normal.
fn slab_entry(origin: Vec3, offset: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut enter = f32::NEG_INFINITY;
    let mut exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let (o, d, lo, hi) = (origin[axis], offset[axis], min[axis], max[axis]);
        if d.abs() <= SMALL_NUMBER {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > enter {
            enter = t0;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        exit = exit.min(t1);
        if enter > exit {
            return None;
        }
    }

    (enter >= 0.0 && enter <= 1.0 && exit >= 0.0).then_some((enter, normal))
}

/// Minimum push-out of a point strictly inside a box.
fn box_penetration(point: Vec3, center: Vec3, half_extents: Vec3) -> Option<(f32, Vec3)> {
    let local = point - center;
    let depth = half_extents - local.abs();
    if depth.min_element() <= KINDA_SMALL_NUMBER {
        return None;
    }
    let axis = if depth.x <= depth.y && depth.x <= depth.z {
        0
    } else if depth.y <= depth.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    Some((depth[axis], normal))
}

fn sweep_box(
    extents: Vec3,
    origin: Vec3,
    offset: Vec3,
    center: Vec3,
    half_extents: Vec3,
    entity: Entity,
) -> Option<HitResult> {
    let expanded = half_extents + extents;
    let contact = |location: Vec3| location.clamp(center - half_extents, center + half_extents);

    if let Some((depth, normal)) = box_penetration(origin, center, expanded) {
        return Some(HitResult::penetrating(
            origin,
            contact(origin),
            normal,
            depth,
            Some(entity),
        ));
    }

    let (time, normal) = slab_entry(origin, offset, center - expanded, center + expanded)?;
    let location = origin + offset * time;
    Some(HitResult::hit(
        location,
        contact(location),
        normal,
        time,
        Some(entity),
    ))
}

impl MovementQueries for HeadlessWorld {
    fn sweep_capsule(
        &self,
        shape: &CapsuleShape,
        origin: Vec3,
        rotation: Quat,
        offset: Vec3,
        exclusions: &QueryExclusions,
    ) -> HitResult {
        let axis = rotation * UP;
        let extents = capsule_extents(shape);
        let best = self
            .candidates(exclusions)
            .filter_map(|(entity, surface)| match surface.geometry {
                Geometry::Plane { point, normal } => {
                    sweep_plane(shape, axis, origin, offset, point, normal, entity)
                }
                Geometry::Cuboid {
                    center,
                    half_extents,
                } => sweep_box(extents, origin, offset, center, half_extents, entity),
            })
            .fold(None, closer);

        best.unwrap_or_else(|| HitResult::miss(origin + offset))
    }

    fn line_trace(&self, start: Vec3, end: Vec3, exclusions: &QueryExclusions) -> HitResult {
        let offset = end - start;
        let best = self
            .candidates(exclusions)
            .filter_map(|(entity, surface)| {
                let (time, normal) = match surface.geometry {
                    Geometry::Plane { point, normal } => {
                        let distance = normal.dot(start - point);
                        let rate = normal.dot(offset);
                        if distance < 0.0 || rate >= -SMALL_NUMBER {
                            return None;
                        }
                        let time = distance / -rate;
                        (time <= 1.0).then_some((time, normal))?
                    }
                    Geometry::Cuboid {
                        center,
                        half_extents,
                    } => {
                        if box_penetration(start, center, half_extents).is_some() {
                            return None;
                        }
                        slab_entry(start, offset, center - half_extents, center + half_extents)?
                    }
                };
                let point = start + offset * time;
                Some(HitResult::hit(point, point, normal, time, Some(entity)))
            })
            .fold(None, closer);

        best.unwrap_or_else(|| HitResult::miss(end))
    }

    fn overlap_capsule(
        &self,
        shape: &CapsuleShape,
        location: Vec3,
        rotation: Quat,
        exclusions: &QueryExclusions,
    ) -> Vec<OverlapResult> {
        let axis = rotation * UP;
        let extents = capsule_extents(shape);
        self.candidates(exclusions)
            .filter(|(_, surface)| match surface.geometry {
                Geometry::Plane { point, normal } => {
                    let reach = shape.radius + shape.half_height * axis.dot(normal).abs();
                    normal.dot(location - point) - reach < -KINDA_SMALL_NUMBER
                }
                Geometry::Cuboid {
                    center,
                    half_extents,
                } => box_penetration(location, center, half_extents + extents).is_some(),
            })
            .map(|(entity, _)| OverlapResult { entity })
            .collect()
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }

    fn surface_velocity(&self, entity: Entity) -> Vec3 {
        self.surfaces
            .get(&entity)
            .map(|s| s.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn surface_pose(&self, entity: Entity) -> Option<SurfacePose> {
        self.surfaces
            .get(&entity)
            .map(|s| SurfacePose::new(s.origin(), s.rotation))
    }

    fn surface_capabilities(&self, entity: Entity) -> SurfaceCapabilities {
        self.surfaces
            .get(&entity)
            .map(|s| s.capabilities)
            .unwrap_or_default()
    }
}

/// Backend running characters against a [`HeadlessWorld`] resource.
pub struct HeadlessBackend;

impl CharacterPhysicsBackend for HeadlessBackend {
    fn plugin() -> impl Plugin {
        HeadlessBackendPlugin
    }
}

/// Plugin that simulates characters against the [`HeadlessWorld`] resource.
pub struct HeadlessBackendPlugin;

impl Plugin for HeadlessBackendPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<HeadlessWorld>();
        app.add_systems(
            FixedUpdate,
            (
                advance_headless_surfaces.in_set(MovementSet::Prepare),
                headless_movement_tick.in_set(MovementSet::Simulation),
            ),
        );
    }
}

/// Move kinematic surfaces before characters follow them.
fn advance_headless_surfaces(time: Res<Time<Fixed>>, mut world: ResMut<HeadlessWorld>) {
    world.advance(fixed_timestep(&time));
}

fn headless_movement_tick(
    time: Res<Time<Fixed>>,
    world: Res<HeadlessWorld>,
    mut q_characters: Query<(
        Entity,
        &mut CharacterMovement,
        &MovementConfig,
        Option<&mut MovementIntent>,
        &mut Transform,
    )>,
    mut events: EventWriter<CharacterMovementEvent>,
) {
    let dt = fixed_timestep(&time);

    for (entity, mut movement, config, intent, mut transform) in &mut q_characters {
        let emitted = run_character_tick(
            entity,
            &mut movement,
            config,
            intent.map(Mut::into_inner),
            &mut transform,
            &*world,
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
    use bevy::ecs::entity::EntityHashSet;

    #[test]
    fn capsule_lands_on_plane_at_bottom_offset() {
        let mut world = HeadlessWorld::new();
        let ground = world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::new(10.0, 20.0);
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let hit = world.sweep_capsule(
            &shape,
            Vec3::Y * 100.0,
            Quat::IDENTITY,
            Vec3::Y * -100.0,
            &exclusions,
        );

        assert!(hit.blocking);
        assert_eq!(hit.entity, Some(ground));
        assert!((hit.location.y - 30.0).abs() < 1.0e-4);
        assert!((hit.time_fraction - 0.7).abs() < 1.0e-5);
        assert!(hit.impact_point.y.abs() < 1.0e-4);
    }

    #[test]
    fn excluded_surfaces_are_skipped() {
        let mut world = HeadlessWorld::new();
        let ground = world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::default();
        let mut ignored = EntityHashSet::default();
        ignored.insert(ground);
        let exclusions = QueryExclusions::new(None, &ignored);

        let hit = world.sweep_capsule(
            &shape,
            Vec3::Y * 100.0,
            Quat::IDENTITY,
            Vec3::Y * -100.0,
            &exclusions,
        );
        assert!(!hit.blocking);
        assert_eq!(hit.location, Vec3::ZERO);
    }

    #[test]
    fn box_sweep_reports_face_normal() {
        let mut world = HeadlessWorld::new();
        world.add_box(Vec3::X * 100.0, Vec3::splat(10.0));
        let shape = CapsuleShape::new(5.0, 5.0);
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let hit = world.sweep_capsule(
            &shape,
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::X * 200.0,
            &exclusions,
        );

        assert!(hit.blocking);
        assert_eq!(hit.impact_normal, Vec3::NEG_X);
        assert!((hit.location.x - 85.0).abs() < 1.0e-3);
    }

    #[test]
    fn line_trace_hits_nearest_surface() {
        let mut world = HeadlessWorld::new();
        world.add_plane(Vec3::Y * -50.0, Vec3::Y);
        let upper = world.add_box(Vec3::ZERO, Vec3::new(10.0, 5.0, 10.0));
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let hit = world.line_trace(Vec3::Y * 20.0, Vec3::Y * -100.0, &exclusions);
        assert_eq!(hit.entity, Some(upper));
        assert!((hit.impact_point.y - 5.0).abs() < 1.0e-4);
        assert_eq!(hit.impact_normal, Vec3::Y);
    }

    #[test]
    fn overlap_detects_embedded_capsule() {
        let mut world = HeadlessWorld::new();
        let ground = world.add_plane(Vec3::ZERO, Vec3::Y);
        let shape = CapsuleShape::default();
        let ignored = EntityHashSet::default();
        let exclusions = QueryExclusions::new(None, &ignored);

        let inside = world.overlap_capsule(&shape, Vec3::Y * 10.0, Quat::IDENTITY, &exclusions);
        assert_eq!(inside, vec![OverlapResult { entity: ground }]);
        let clear = world.overlap_capsule(&shape, Vec3::Y * 200.0, Quat::IDENTITY, &exclusions);
        assert!(clear.is_empty());
    }

    #[test]
    fn advance_moves_only_moving_surfaces() {
        let mut world = HeadlessWorld::new();
        let still = world.add_box(Vec3::ZERO, Vec3::ONE);
        let mover = world.add_box(Vec3::ZERO, Vec3::ONE);
        world.set_velocity(mover, Vec3::X * 10.0);

        world.advance(0.5);

        assert_eq!(world.surface_pose(still).unwrap().translation, Vec3::ZERO);
        assert_eq!(world.surface_pose(mover).unwrap().translation, Vec3::X * 5.0);
        assert!(world.surface_capabilities(mover).movable);
        assert!(!world.surface_capabilities(still).movable);
        assert!(world.surface_pose(Entity::from_raw(3)).is_none());
    }

    #[test]
    fn spinning_surface_turns_its_pose() {
        let mut world = HeadlessWorld::new();
        let turntable = world.add_plane(Vec3::ZERO, Vec3::Y);
        world.set_yaw_rate(turntable, std::f32::consts::FRAC_PI_2);
        assert!(world.surface_capabilities(turntable).movable);

        for _ in 0..10 {
            world.advance(0.1);
        }

        let pose = world.surface_pose(turntable).unwrap();
        assert_eq!(pose.translation, Vec3::ZERO);
        assert!((pose.to_world(Vec3::X * 10.0) - Vec3::NEG_Z * 10.0).length() < 1.0e-3);
    }
}
