//! The movement state machine.
//!
//! [`CharacterMovement`] owns a character's mode, [`MovementState`], timers
//! and basis tracker. Each call to [`CharacterMovement::tick`] re-slices the
//! frame time into fixed timesteps; every timestep runs the same pipeline:
//!
//! 1. fire expired timers
//! 2. check the kill height
//! 3. follow the basis (moving platform)
//! 4. drain the pending accumulators
//! 5. compute the new velocity and rotation for the active mode
//! 6. move through [`crate::substep`]
//! 7. evaluate floor, walls and ledges, possibly changing mode
//! 8. re-express the position relative to the basis
//!
//! The mode only ever changes through [`CharacterMovement::set_mode`].

mod actions;
mod rotation;
mod velocity;

use bevy::prelude::*;

use crate::backend::MovementQueries;
use crate::basis::{BasisTracker, FollowResult};
use crate::collision::{CapsuleShape, HitResult, QueryExclusions};
use crate::config::MovementConfig;
use crate::events::MovementEvent;
use crate::floor::{FloorProbe, FloorSample};
use crate::math::{planar, safe_div, yaw_of_rotation, KINDA_SMALL_NUMBER, SMALL_NUMBER, UP};
use crate::mode::{ModeCell, MovementMode};
use crate::state::{MovementState, StateSnapshot};
use crate::substep::{move_with_substeps, safe_move, MoveOutcome, Substep, SubstepParams};
use crate::timers::{MovementTimers, TimerSlot};

/// What a movement call needs from the outside world.
#[derive(Clone, Copy)]
pub struct MoveContext<'a> {
    pub queries: &'a dyn MovementQueries,
    pub config: &'a MovementConfig,
}

impl<'a> MoveContext<'a> {
    pub fn new(queries: &'a dyn MovementQueries, config: &'a MovementConfig) -> Self {
        Self { queries, config }
    }

    /// World gravity scaled for this character, along up.
    fn gravity(&self) -> f32 {
        self.queries.gravity() * self.config.falling.gravity_scale
    }
}

/// Movement core of one character.
///
/// Attach it to an entity together with a [`MovementConfig`], a
/// [`crate::intent::MovementIntent`] and a `Transform`; the backend plugin
/// ticks it in `FixedUpdate`. It can also be driven directly against any
/// [`MovementQueries`] implementation.
#[derive(Component, Debug, Clone)]
pub struct CharacterMovement {
    mode: ModeCell,
    pub(crate) state: MovementState,
    timers: MovementTimers,
    basis: BasisTracker,
    capsule: CapsuleShape,
    position: Vec3,
    rotation: Quat,
    owner: Option<Entity>,
    input: Vec3,
    events: Vec<MovementEvent>,
    begun: bool,
    last_move: Option<MoveOutcome>,
}

impl Default for CharacterMovement {
    fn default() -> Self {
        Self::new(CapsuleShape::default())
    }
}

impl CharacterMovement {
    pub fn new(capsule: CapsuleShape) -> Self {
        Self {
            mode: ModeCell::default(),
            state: MovementState::default(),
            timers: MovementTimers::new(),
            basis: BasisTracker::default(),
            capsule,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            owner: None,
            input: Vec3::ZERO,
            events: Vec::new(),
            begun: false,
            last_move: None,
        }
    }

    // --- accessors ---

    #[inline]
    pub fn mode(&self) -> MovementMode {
        self.mode.get()
    }

    pub fn state(&self) -> &MovementState {
        &self.state
    }

    pub fn timers(&self) -> &MovementTimers {
        &self.timers
    }

    pub fn basis(&self) -> &BasisTracker {
        &self.basis
    }

    pub fn capsule(&self) -> &CapsuleShape {
        &self.capsule
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Lowest point of the capsule.
    pub fn feet_location(&self) -> Vec3 {
        self.position - UP * self.capsule.bottom_offset()
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn velocity(&self) -> Vec3 {
        self.state.velocity
    }

    pub fn is_grounded(&self) -> bool {
        self.state.grounded
    }

    pub fn has_begun(&self) -> bool {
        self.begun
    }

    /// Entity excluded from this character's own queries.
    pub fn owner(&self) -> Option<Entity> {
        self.owner
    }

    /// The last timestep's move, for inspection.
    pub fn last_move(&self) -> Option<&MoveOutcome> {
        self.last_move.as_ref()
    }

    /// Current mode, transform and velocity.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            mode: self.mode(),
            position: self.position,
            rotation: self.rotation,
            velocity: self.state.velocity,
        }
    }

    // --- plain setters ---

    pub fn set_owner(&mut self, owner: Entity) {
        self.owner = Some(owner);
    }

    /// Input for the following ticks, clamped to unit length.
    pub fn set_input(&mut self, input: Vec3) {
        self.input = input.clamp_length_max(1.0);
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.state.velocity = velocity;
    }

    /// Place the capsule without sweeping.
    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
        self.basis.store_local_offset(position);
    }

    /// Take the events recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<MovementEvent> {
        std::mem::take(&mut self.events)
    }

    /// Input the active tick acts on.
    fn current_input(&self) -> Vec3 {
        if self.state.suppressing_input {
            Vec3::ZERO
        } else {
            self.input
        }
    }

    // --- lifecycle ---

    /// Capture the initial transform and settle into the default mode.
    pub fn begin_play(&mut self, ctx: &MoveContext, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
        self.state.yaw = yaw_of_rotation(rotation);
        self.state.desired_yaw = self.state.yaw;
        self.state.last_valid_location = position;
        self.basis.store_local_offset(position);
        self.begun = true;
        self.set_default_mode(ctx);
    }

    /// Advance by `dt` seconds in fixed timesteps.
    pub fn tick(&mut self, ctx: &MoveContext, dt: f32) {
        if !self.begun {
            trace!("Tick before begin_play ignored");
            return;
        }
        if dt <= 0.0 {
            return;
        }

        let timestep = ctx.config.integration.timestep.max(KINDA_SMALL_NUMBER);
        let max_steps = ctx.config.integration.max_timesteps.max(1);
        let mut remaining = dt;
        let mut steps = 0;
        while remaining > SMALL_NUMBER && steps < max_steps {
            let slice = remaining.min(timestep);
            self.step(ctx, slice);
            remaining -= slice;
            steps += 1;
        }
        if remaining > KINDA_SMALL_NUMBER {
            trace!("Dropped {remaining}s of simulation after {steps} timesteps");
        }
    }

    fn step(&mut self, ctx: &MoveContext, dt: f32) {
        self.state.invalid_floor_components.clear();

        for slot in self.timers.tick(dt) {
            self.on_timer(ctx, slot);
        }

        if self.mode().is_kill_checked() && self.position.y < ctx.config.recovery.kill_height {
            self.begin_recovery(ctx);
        }

        self.follow_basis(ctx, dt);

        if self.mode().is_grounded_mode() && self.state.pending().impulse.y > KINDA_SMALL_NUMBER {
            self.set_mode(ctx, MovementMode::Falling);
        }
        let pending = self.state.drain_pending();

        let velocity = self.new_velocity(ctx, &pending, dt);
        self.state.velocity = velocity;
        self.new_rotation(ctx, dt);

        let move_velocity = self.move_velocity(velocity) + safe_div(pending.adjustment, dt);
        let outcome = self.perform_move(ctx, move_velocity, dt);
        self.position = outcome.position;
        self.state.velocity = velocity + (outcome.velocity - move_velocity);

        self.post_move(ctx, &outcome, velocity);
        self.basis.store_local_offset(self.position);
        self.last_move = Some(outcome);
    }

    fn on_timer(&mut self, ctx: &MoveContext, slot: TimerSlot) {
        trace!("Timer {slot:?} fired");
        match slot {
            TimerSlot::Coyote => self.state.can_jump = false,
            TimerSlot::JumpHold => self.stop_jumping(),
            TimerSlot::Deflect => self.state.deflect_expired = true,
            TimerSlot::Recovery => self.end_recovery(ctx),
            TimerSlot::MantleDebounce => self.state.can_mantle = true,
            TimerSlot::EdgeScramble => self.state.wall_scrambling = false,
            TimerSlot::Dash => {}
        }
    }

    // --- transitions ---

    /// The single entry point for changing mode.
    ///
    /// Cancels timers owned by the mode being left, applies entry side
    /// effects and broadcasts [`MovementEvent::ModeChanged`]. Setting the
    /// active mode again is a no-op that still succeeds.
    pub fn set_mode(&mut self, ctx: &MoveContext, new: MovementMode) -> bool {
        let old = self.mode();
        if old == new {
            return true;
        }

        self.timers.cancel_owned_by(old);
        match old {
            MovementMode::Anchored => {
                self.basis.clear_anchor();
                self.state.mantling = false;
                self.state.ledge = None;
            }
            MovementMode::Dragging => {
                // A target still held here is being let go involuntarily.
                if self.state.drag_target.take().is_some() {
                    self.events.push(MovementEvent::ForceDragRelease);
                }
            }
            MovementMode::Recover => self.state.collision_enabled = true,
            MovementMode::Deflected => self.state.deflect_expired = false,
            _ => {}
        }

        self.mode.replace(new);

        match new {
            MovementMode::Anchored => self.state.can_jump = false,
            MovementMode::Deflected => {
                if !ctx.config.deflect.can_jump_while_deflected {
                    self.state.can_jump = false;
                }
                self.basis.detach(ctx.queries);
            }
            MovementMode::Falling => {
                // Keep the platform's momentum.
                let carried = self.basis.detach(ctx.queries);
                self.state.add_impulse(carried);
                self.state.clear_floor();
            }
            MovementMode::Recover => {
                self.basis.detach(ctx.queries);
                self.state.clear_floor();
            }
            MovementMode::Walking | MovementMode::Dragging | MovementMode::None => {}
        }

        debug!("Movement mode {old:?} -> {new:?}");
        self.events.push(MovementEvent::ModeChanged { old, new });
        true
    }

    /// Probe the floor and settle into Walking or Falling.
    pub fn set_default_mode(&mut self, ctx: &MoveContext) {
        self.state.mantling = false;
        self.state.wall_sliding = false;
        self.state.wall_scrambling = false;
        self.state.suppressing_input = false;

        match self.find_floor(ctx) {
            Some(floor) if self.state.velocity.y <= 0.0 || self.state.grounded => {
                self.set_mode(ctx, MovementMode::Walking);
                self.apply_floor(ctx, &floor);
                self.state.velocity = planar(self.state.velocity);
                self.state.can_jump = true;
            }
            _ => {
                self.set_mode(ctx, MovementMode::Falling);
            }
        }
    }

    fn land(&mut self, ctx: &MoveContext, floor: &FloorSample, impact_speed: f32) {
        self.set_mode(ctx, MovementMode::Walking);
        self.apply_floor(ctx, floor);

        let state = &mut self.state;
        state.velocity = planar(state.velocity);
        state.can_jump = true;
        state.can_double_jump = true;
        state.can_mantle = true;
        state.can_scramble = true;
        state.jumping = false;
        state.jump_applied_velocity = 0.0;
        state.hold_jump_acceleration = 0.0;
        state.wall_sliding = false;
        state.wall_scrambling = false;
        self.timers.cancel(TimerSlot::JumpHold);
        self.timers.cancel(TimerSlot::Coyote);

        debug!("Landed at {} ({impact_speed} cm/s)", floor.hit.impact_point);
        self.events.push(MovementEvent::Landed {
            floor_location: floor.hit.impact_point,
            impact_speed,
            floor: floor.entity(),
        });
    }

    fn begin_recovery(&mut self, ctx: &MoveContext) {
        debug!("Fell below kill height at {}", self.position);
        self.set_mode(ctx, MovementMode::Recover);

        let state = &mut self.state;
        state.collision_enabled = false;
        state.jumping = false;
        state.wall_sliding = false;
        state.wall_scrambling = false;

        let recovery = &ctx.config.recovery;
        let target = state.last_valid_location + UP * recovery.levitation_height;
        let time = recovery.recovery_time.max(KINDA_SMALL_NUMBER);
        let gravity = UP * ctx.gravity();
        state.recovery_target = target;
        state.velocity = (target - self.position) / time - gravity * (0.5 * time);

        self.timers.schedule(TimerSlot::Recovery, time);
    }

    fn end_recovery(&mut self, ctx: &MoveContext) {
        if self.mode() != MovementMode::Recover {
            return;
        }
        self.position = self.state.recovery_target;
        self.state.velocity = Vec3::ZERO;
        self.state.collision_enabled = true;
        self.state.clear_floor();
        self.set_default_mode(ctx);
    }

    // --- floor ---

    fn probe<'a>(&'a self, ctx: &MoveContext<'a>) -> FloorProbe<'a> {
        FloorProbe::new(
            ctx.queries,
            &self.capsule,
            &ctx.config.floor,
            self.owner,
            &self.state.ignored_actors,
        )
    }

    fn exclusions(&self) -> QueryExclusions<'_> {
        QueryExclusions::new(self.owner, &self.state.ignored_actors)
    }

    /// Look for a walkable floor within snap distance.
    pub fn find_floor(&mut self, ctx: &MoveContext) -> Option<FloorSample> {
        let floor = &ctx.config.floor;
        let probe = FloorProbe::new(
            ctx.queries,
            &self.capsule,
            floor,
            self.owner,
            &self.state.ignored_actors,
        );
        probe.find_floor(
            self.position,
            self.rotation,
            floor.snap_distance,
            floor.num_tries,
            &mut self.state.invalid_floor_components,
        )
    }

    /// Snap onto `floor` and adopt it as the ground (and basis, if it moves).
    fn apply_floor(&mut self, ctx: &MoveContext, floor: &FloorSample) {
        self.position = self.probe(ctx).snap_location(floor);

        let state = &mut self.state;
        state.grounded = true;
        state.floor_normal = floor.normal;
        state.floor_entity = floor.entity();
        state.floor_location = floor.hit.impact_point;
        self.events.push(MovementEvent::FloorHit {
            entity: floor.entity(),
            location: floor.hit.impact_point,
            normal: floor.normal,
        });

        // Capabilities are resolved once on attach; a floor that is already
        // the basis reads them from the tracker.
        let movable = match floor.entity() {
            Some(entity) if self.basis.entity() == Some(entity) => {
                self.basis.capabilities().movable
            }
            Some(entity) => self.basis.attach(ctx.queries, entity, self.position),
            None => false,
        };
        if !movable && self.basis.is_attached() {
            self.basis.detach(ctx.queries);
        }

        if !movable && self.probe(ctx).check_floor_valid_within_range(floor) {
            self.state.last_valid_location = self.position;
        }
    }

    // --- moving ---

    fn follow_basis(&mut self, ctx: &MoveContext, dt: f32) {
        match self.basis.follow(ctx.queries, self.position, dt) {
            FollowResult::Detached => {}
            FollowResult::Vanished => {
                self.state.clear_floor();
                if self.mode() == MovementMode::Anchored {
                    self.break_anchor(ctx, false);
                }
            }
            FollowResult::Moved(follow) => {
                let (position, _) = self.sweep(ctx, follow.target - self.position);
                self.position = position;
                self.state.yaw += follow.yaw_delta;
                self.state.desired_yaw += follow.yaw_delta;
                self.rotation = Quat::from_rotation_y(self.state.yaw);
            }
        }
    }

    /// Single collision-checked move by `delta`.
    fn sweep(&self, ctx: &MoveContext, delta: Vec3) -> (Vec3, Option<HitResult>) {
        if !self.state.collision_enabled {
            return (self.position + delta, None);
        }
        let exclusions = self.exclusions();
        let params = self.substep_params(ctx, &exclusions);
        safe_move(&params, self.position, delta)
    }

    fn substep_params<'a>(
        &'a self,
        ctx: &MoveContext<'a>,
        exclusions: &'a QueryExclusions<'a>,
    ) -> SubstepParams<'a> {
        SubstepParams {
            queries: ctx.queries,
            shape: &self.capsule,
            rotation: self.rotation,
            exclusions,
            max_substeps: ctx.config.integration.max_substeps,
            hit_nudge: ctx.config.integration.hit_nudge,
        }
    }

    /// Velocity actually swept: grounded modes follow the floor's slope.
    fn move_velocity(&self, velocity: Vec3) -> Vec3 {
        let normal = self.state.floor_normal;
        if !self.mode().is_grounded_mode() || !self.state.grounded || normal.y <= KINDA_SMALL_NUMBER
        {
            return velocity;
        }
        let flat = planar(velocity);
        flat - UP * ((normal.x * flat.x + normal.z * flat.z) / normal.y)
    }

    fn perform_move(&self, ctx: &MoveContext, velocity: Vec3, dt: f32) -> MoveOutcome {
        if !self.state.collision_enabled {
            return MoveOutcome {
                position: self.position + velocity * dt,
                velocity,
                substeps: vec![Substep { time: dt, hit: None }],
                penetration_adjustment: Vec3::ZERO,
            };
        }
        let exclusions = self.exclusions();
        let params = self.substep_params(ctx, &exclusions);
        move_with_substeps(&params, self.position, velocity, dt)
    }

    fn post_move(&mut self, ctx: &MoveContext, outcome: &MoveOutcome, pre_move_velocity: Vec3) {
        match self.mode() {
            MovementMode::Walking => self.update_walking_floor(ctx),
            MovementMode::Dragging => {
                let target_gone = self
                    .state
                    .drag_target
                    .is_some_and(|target| ctx.queries.surface_pose(target).is_none());
                if target_gone {
                    debug!("Dragged object vanished");
                    self.set_default_mode(ctx);
                } else {
                    self.update_walking_floor(ctx);
                }
            }
            MovementMode::Falling => self.update_falling(ctx, outcome, pre_move_velocity),
            MovementMode::Deflected => self.update_deflected(ctx),
            MovementMode::Anchored => {
                if !self.basis.has_anchor() {
                    self.break_anchor(ctx, false);
                }
            }
            MovementMode::Recover | MovementMode::None => {}
        }
    }

    fn update_walking_floor(&mut self, ctx: &MoveContext) {
        match self.find_floor(ctx) {
            Some(floor) => {
                self.apply_floor(ctx, &floor);
                self.state.velocity = planar(self.state.velocity);
            }
            None => {
                trace!("Walked off the floor at {}", self.position);
                self.set_mode(ctx, MovementMode::Falling);
                self.timers
                    .schedule(TimerSlot::Coyote, ctx.config.jumping.coyote_time);
            }
        }
    }

    fn update_falling(
        &mut self,
        ctx: &MoveContext,
        outcome: &MoveOutcome,
        pre_move_velocity: Vec3,
    ) {
        if self.state.jumping && outcome.hits().any(|hit| hit.normal_up() < -0.5) {
            self.stop_jumping();
        }

        if self.state.velocity.y <= 0.0 {
            if let Some(floor) = self.find_floor(ctx) {
                let surface_velocity = floor
                    .entity()
                    .map(|entity| ctx.queries.surface_velocity(entity))
                    .unwrap_or(Vec3::ZERO);
                let relative = (self.state.velocity - surface_velocity).dot(floor.normal);
                if relative <= 0.0 {
                    let approach = pre_move_velocity - surface_velocity;
                    let impact_speed = (-approach.dot(floor.normal)).max(0.0);
                    self.land(ctx, &floor, impact_speed);
                    return;
                }
            }
        }

        self.update_wall_slide(ctx);

        let anchor = &ctx.config.anchor;
        if anchor.auto_mantle
            && self.state.velocity.y <= 0.0
            && planar(self.current_input()).length_squared() > KINDA_SMALL_NUMBER
        {
            self.mantle(ctx);
        }
    }

    fn update_wall_slide(&mut self, ctx: &MoveContext) {
        let wall = &ctx.config.wall;
        let input = planar(self.current_input());
        if !wall.enabled || self.state.velocity.y > 0.0 || input.length() < wall.input_threshold {
            self.state.wall_sliding = false;
            return;
        }

        let direction = input.normalize_or_zero();
        let hit = self
            .probe(ctx)
            .probe_wall(self.position, direction, wall.probe_distance, wall.max_normal_up);
        match hit {
            Some(hit) => {
                let normal = planar(hit.impact_normal).normalize_or_zero();
                let facing = direction.dot(-normal) >= wall.input_threshold;
                if facing && !self.state.wall_sliding {
                    trace!("Wall slide started on {:?}", hit.entity);
                }
                self.state.wall_sliding = facing;
                if facing {
                    self.state.wall_normal = normal;
                }
            }
            None => self.state.wall_sliding = false,
        }
    }

    fn update_deflected(&mut self, ctx: &MoveContext) {
        match self.find_floor(ctx) {
            Some(floor) if self.state.velocity.dot(floor.normal) <= 0.0 => {
                self.apply_floor(ctx, &floor);
            }
            _ => self.state.clear_floor(),
        }

        let deflect = &ctx.config.deflect;
        if self.state.deflect_expired
            && deflect.regain_control
            && self.state.velocity.dot(self.state.deflect_direction) <= deflect.regain_epsilon
        {
            debug!("Regained control after deflection");
            self.state.deflect_direction = Vec3::ZERO;
            self.state.deflect_expired = false;
            self.set_default_mode(ctx);
        }
    }
}
