//! Public mutators.
//!
//! Guard failures (wrong mode, suppressed input, missing target) return
//! `false` and change nothing.

use bevy::prelude::*;

use super::{CharacterMovement, MoveContext};
use crate::collision::HitResult;
use crate::events::MovementEvent;
use crate::intent::MovementCommand;
use crate::math::{forward_from_yaw, planar, yaw_of, yaw_of_rotation, KINDA_SMALL_NUMBER, UP};
use crate::mode::MovementMode;
use crate::state::StateSnapshot;
use crate::timers::TimerSlot;

impl CharacterMovement {
    /// Jump, double jump, wall jump or act on a held ledge.
    pub fn jump(&mut self, ctx: &MoveContext) -> bool {
        if self.state.suppressing_input {
            trace!("Jump rejected: input suppressed");
            return false;
        }
        if matches!(self.mode(), MovementMode::None | MovementMode::Recover) {
            trace!("Jump rejected in {:?}", self.mode());
            return false;
        }

        if self.state.mantling {
            return self.jump_from_ledge(ctx);
        }
        if self.mode() == MovementMode::Falling && self.state.wall_sliding {
            return self.wall_jump(ctx);
        }

        let jumping = &ctx.config.jumping;
        if self.state.can_jump {
            self.launch(ctx, jumping.jump_velocity, true);
            true
        } else if self.state.can_double_jump && jumping.double_jump_enabled {
            self.state.can_double_jump = false;
            self.launch(ctx, jumping.double_jump_velocity, false);
            true
        } else {
            trace!("Jump rejected: no jumps left");
            false
        }
    }

    fn launch(&mut self, ctx: &MoveContext, speed: f32, initial: bool) {
        let floor_location = if self.state.grounded {
            self.state.floor_location
        } else {
            self.feet_location()
        };

        self.state.velocity.y = self.state.velocity.y.max(0.0);
        self.state.add_impulse(UP * speed);
        self.begin_jump_hold(ctx);
        self.set_mode(ctx, MovementMode::Falling);
        self.timers.cancel(TimerSlot::Coyote);
        self.timers
            .schedule(TimerSlot::JumpHold, ctx.config.jumping.hold_time);

        self.events.push(MovementEvent::Jumped {
            floor_location,
            initial,
        });
    }

    fn begin_jump_hold(&mut self, ctx: &MoveContext) {
        let state = &mut self.state;
        state.can_jump = false;
        state.jumping = true;
        state.jump_applied_velocity = 0.0;
        state.hold_jump_acceleration = ctx.config.jumping.hold_acceleration;
        state.clear_floor();
    }

    fn wall_jump(&mut self, ctx: &MoveContext) -> bool {
        let jumping = &ctx.config.jumping;
        let normal = self.state.wall_normal;
        let feet = self.feet_location();

        self.state.velocity = normal * jumping.wall_jump_horizontal;
        self.state.add_impulse(UP * jumping.wall_jump_vertical);
        self.state.wall_sliding = false;
        self.state.wall_scrambling = false;
        self.state.can_scramble = true;
        if let Some(yaw) = yaw_of(normal) {
            self.state.desired_yaw = yaw;
        }
        self.begin_jump_hold(ctx);
        self.timers.cancel(TimerSlot::EdgeScramble);
        self.timers.schedule(TimerSlot::JumpHold, jumping.hold_time);

        debug!("Wall jump off {normal}");
        self.events.push(MovementEvent::Jumped {
            floor_location: feet,
            initial: false,
        });
        true
    }

    /// Climb the held ledge, or hop back off it when input pulls away.
    fn jump_from_ledge(&mut self, ctx: &MoveContext) -> bool {
        let Some(ledge) = self.state.ledge else {
            return false;
        };
        let input = planar(self.current_input());
        if input.dot(ledge.wall_normal) <= ctx.config.wall.input_threshold {
            return self.climb_mantle(ctx);
        }

        let hop = ctx.config.anchor.hop_back_speed;
        let launch = ledge.wall_normal * hop + UP * hop;
        let feet = self.feet_location();
        if !self.deflect(ctx, launch, ctx.config.jumping.hold_time) {
            return false;
        }
        self.events.push(MovementEvent::Jumped {
            floor_location: feet,
            initial: false,
        });
        true
    }

    /// Release the jump button: stop adding hold acceleration.
    pub fn stop_jumping(&mut self) {
        self.state.jumping = false;
        self.state.hold_jump_acceleration = 0.0;
        self.timers.cancel(TimerSlot::JumpHold);
    }

    /// Request a mode from outside.
    ///
    /// Modes that need more context than a mode value route through their
    /// dedicated entry points: Anchored and Dragging can only be kept, not
    /// entered, and Recover starts a recovery flight.
    pub fn set_movement_mode(&mut self, ctx: &MoveContext, mode: MovementMode) -> bool {
        match mode {
            MovementMode::Anchored | MovementMode::Dragging => self.mode() == mode,
            MovementMode::Recover => {
                if self.mode() == MovementMode::None {
                    return false;
                }
                if self.mode() != MovementMode::Recover {
                    self.begin_recovery(ctx);
                }
                true
            }
            MovementMode::Deflected => {
                let velocity = self.state.velocity;
                self.deflect(ctx, velocity, 0.0)
            }
            MovementMode::Walking => {
                self.set_mode(ctx, MovementMode::Walking);
                if let Some(floor) = self.find_floor(ctx) {
                    self.apply_floor(ctx, &floor);
                    self.state.velocity = planar(self.state.velocity);
                    self.state.can_jump = true;
                }
                true
            }
            MovementMode::Falling | MovementMode::None => self.set_mode(ctx, mode),
        }
    }

    /// Hold on to `location` on `target`, following it if it moves.
    pub fn anchor_to_component(
        &mut self,
        ctx: &MoveContext,
        target: Entity,
        location: Vec3,
    ) -> bool {
        if !self.mode().can_anchor() {
            trace!("Anchor rejected in {:?}", self.mode());
            return false;
        }
        if ctx.queries.surface_pose(target).is_none() {
            trace!("Anchor target {target:?} is missing");
            return false;
        }

        if !self.basis.attach(ctx.queries, target, self.position) && self.basis.is_attached() {
            self.basis.detach(ctx.queries);
        }

        self.state.velocity = Vec3::ZERO;
        self.state.jumping = false;
        self.state.wall_sliding = false;
        self.state.is_walking = false;
        self.set_mode(ctx, MovementMode::Anchored);
        self.basis.set_anchor(ctx.queries, location);
        true
    }

    /// Let go of the anchor.
    ///
    /// `force` launches into Deflected with the current velocity and no
    /// minimum time, otherwise the default mode is re-derived. Mantling is
    /// re-enabled after the debounce time.
    pub fn break_anchor(&mut self, ctx: &MoveContext, force: bool) -> bool {
        if self.mode() != MovementMode::Anchored {
            return false;
        }
        self.basis.clear_anchor();
        self.basis.detach(ctx.queries);
        self.begin_mantle_debounce(ctx);

        if force {
            let velocity = self.state.velocity;
            self.deflect(ctx, velocity, 0.0);
        } else {
            self.set_default_mode(ctx);
        }
        true
    }

    fn begin_mantle_debounce(&mut self, ctx: &MoveContext) {
        self.state.mantling = false;
        self.state.ledge = None;
        self.state.can_mantle = false;
        self.timers
            .schedule(TimerSlot::MantleDebounce, ctx.config.anchor.mantle_debounce);
    }

    /// Launch with `velocity`, overriding control for at least `time` seconds.
    pub fn deflect(&mut self, ctx: &MoveContext, velocity: Vec3, time: f32) -> bool {
        if !self.mode().can_be_deflected() {
            trace!("Deflect rejected in {:?}", self.mode());
            return false;
        }
        if self.mode() == MovementMode::Anchored {
            self.basis.clear_anchor();
            self.begin_mantle_debounce(ctx);
        }

        let direction = velocity.normalize_or_zero();
        let state = &mut self.state;
        state.velocity = velocity;
        state.deflect_direction = direction;
        state.jumping = false;
        state.wall_sliding = false;
        state.wall_scrambling = false;
        if velocity.y > 0.0 {
            state.clear_floor();
        }

        self.set_mode(ctx, MovementMode::Deflected);
        self.state.deflect_expired = false;
        if let Some(yaw) = yaw_of(direction) {
            self.state.desired_yaw = yaw;
        }

        if time > 0.0 {
            self.timers.schedule(TimerSlot::Deflect, time);
        } else {
            self.state.deflect_expired = true;
        }
        debug!("Deflected with {velocity} for {time}s");
        true
    }

    /// Add a velocity change applied on the next tick.
    pub fn add_impulse(&mut self, impulse: Vec3) {
        self.state.add_impulse(impulse);
    }

    /// Be pushed by another mover.
    ///
    /// `hit` is the pusher's sweep against this character, so its normal
    /// faces the pusher; any penetration is resolved away from it on the next
    /// tick. Pushes from ignored actors are dropped.
    pub fn push(&mut self, hit: &HitResult, impact_velocity: Vec3, source: Option<Entity>) -> bool {
        if matches!(self.mode(), MovementMode::None | MovementMode::Recover) {
            return false;
        }
        if source.is_some_and(|source| self.state.ignored_actors.contains(&source)) {
            return false;
        }

        let push = if self.mode().is_grounded_mode() {
            planar(impact_velocity)
        } else {
            impact_velocity
        };
        self.state.add_push(push);
        if hit.penetration_depth > 0.0 {
            self.state
                .add_adjustment(-hit.impact_normal * hit.penetration_depth);
        }
        true
    }

    pub fn ignore_actor(&mut self, actor: Entity) {
        self.state.ignored_actors.insert(actor);
    }

    pub fn unignore_actor(&mut self, actor: Entity) {
        self.state.ignored_actors.remove(&actor);
    }

    pub fn suppress_input(&mut self) {
        self.state.suppressing_input = true;
    }

    pub fn unsuppress_input(&mut self) {
        self.state.suppressing_input = false;
    }

    pub fn pause_timers(&mut self) {
        self.timers.pause_all();
    }

    pub fn unpause_timers(&mut self) {
        self.timers.resume_all();
    }

    /// Re-apply a saved snapshot, dropping every transient.
    ///
    /// Modes that need more than the snapshot (Anchored, Dragging, Recover)
    /// re-derive the default mode instead.
    pub fn reset_state(&mut self, ctx: &MoveContext, snapshot: StateSnapshot) {
        if self.state.drag_target.is_some() {
            self.events.push(MovementEvent::ForceDragRelease);
        }
        self.timers.cancel_all();
        self.timers.resume_all();
        self.basis.clear_anchor();
        self.basis.detach(ctx.queries);
        self.state.clear_transient();

        self.position = snapshot.position;
        self.rotation = snapshot.rotation;
        self.state.yaw = yaw_of_rotation(snapshot.rotation);
        self.state.desired_yaw = self.state.yaw;
        self.state.velocity = snapshot.velocity;
        self.basis.store_local_offset(self.position);

        match snapshot.mode {
            MovementMode::Walking => {
                self.set_movement_mode(ctx, MovementMode::Walking);
            }
            MovementMode::Falling | MovementMode::None => {
                self.set_mode(ctx, snapshot.mode);
            }
            MovementMode::Deflected => {
                self.deflect(ctx, snapshot.velocity, 0.0);
            }
            MovementMode::Anchored | MovementMode::Dragging | MovementMode::Recover => {
                self.set_default_mode(ctx);
            }
        }
        debug!("State reset to {:?} at {}", self.mode(), self.position);
    }

    /// Grab a ledge in front of the character.
    pub fn mantle(&mut self, ctx: &MoveContext) -> bool {
        if self.state.suppressing_input
            || self.state.mantling
            || !self.state.can_mantle
            || self.timers.is_active(TimerSlot::MantleDebounce)
            || !self.mode().can_anchor()
        {
            return false;
        }

        let input = planar(self.current_input());
        let forward = if input.length_squared() > KINDA_SMALL_NUMBER {
            input.normalize()
        } else {
            forward_from_yaw(self.state.yaw)
        };
        let Some(grab) = self.probe(ctx).find_ledge(
            self.position,
            forward,
            &ctx.config.anchor,
            ctx.config.wall.max_normal_up,
        ) else {
            return false;
        };

        if !self.anchor_to_component(ctx, grab.ledge.entity, grab.hang_point) {
            return false;
        }
        if let Some(yaw) = yaw_of(-grab.ledge.wall_normal) {
            self.state.desired_yaw = yaw;
        }
        self.state.mantling = true;
        self.state.ledge = Some(grab.ledge);
        debug!("Grabbed ledge at {}", grab.ledge.top);
        true
    }

    /// Climb up onto the held ledge.
    pub fn climb_mantle(&mut self, ctx: &MoveContext) -> bool {
        if self.mode() != MovementMode::Anchored || !self.state.mantling {
            return false;
        }
        let Some(ledge) = self.state.ledge else {
            return false;
        };

        let target = ledge.top + UP * (self.capsule.bottom_offset() + ctx.config.floor.padding);
        let blocked = !ctx
            .queries
            .overlap_capsule(&self.capsule, target, self.rotation, &self.exclusions())
            .is_empty();
        if blocked {
            trace!("No room to climb onto {}", ledge.top);
            return false;
        }

        self.position = target;
        self.state.velocity = Vec3::ZERO;
        self.state.can_double_jump = true;
        self.events.push(MovementEvent::Mantled);
        self.break_anchor(ctx, false)
    }

    /// Start dragging `object` by its face with normal `face_normal`.
    pub fn begin_dragging_object(
        &mut self,
        ctx: &MoveContext,
        object: Entity,
        face_normal: Vec3,
    ) -> bool {
        if self.state.suppressing_input || self.mode() != MovementMode::Walking {
            return false;
        }
        if planar(face_normal).length_squared() <= KINDA_SMALL_NUMBER {
            return false;
        }
        if ctx.queries.surface_pose(object).is_none() {
            trace!("Drag target {object:?} is missing");
            return false;
        }

        self.state.drag_target = Some(object);
        self.state.drag_normal = planar(face_normal).normalize();
        self.set_mode(ctx, MovementMode::Dragging)
    }

    /// Stop dragging on the player's terms (no force-release event).
    pub fn end_dragging_object(&mut self, ctx: &MoveContext) -> bool {
        if self.mode() != MovementMode::Dragging {
            return false;
        }
        self.state.drag_target = None;
        self.set_default_mode(ctx);
        true
    }

    /// Planar burst along input (or facing), gated by a cooldown.
    pub fn dash(&mut self, ctx: &MoveContext) -> bool {
        let dash = &ctx.config.dash;
        let allowed = match self.mode() {
            MovementMode::Walking => true,
            MovementMode::Falling => dash.allow_airborne,
            _ => false,
        };
        if !allowed || self.state.suppressing_input || self.timers.is_active(TimerSlot::Dash) {
            return false;
        }

        let input = planar(self.current_input());
        let direction = if input.length_squared() > KINDA_SMALL_NUMBER {
            input.normalize()
        } else {
            forward_from_yaw(self.state.yaw)
        };

        self.state.velocity = direction * dash.speed + UP * self.state.velocity.y;
        self.timers.schedule(TimerSlot::Dash, dash.cooldown);
        self.events.push(MovementEvent::Dashed { direction });
        true
    }

    /// Apply a queued [`MovementCommand`].
    pub fn apply_command(&mut self, ctx: &MoveContext, command: MovementCommand) -> bool {
        match command {
            MovementCommand::Jump => self.jump(ctx),
            MovementCommand::StopJumping => {
                self.stop_jumping();
                true
            }
            MovementCommand::Dash => self.dash(ctx),
            MovementCommand::Mantle => self.mantle(ctx),
            MovementCommand::ClimbMantle => self.climb_mantle(ctx),
            MovementCommand::SetMode(mode) => self.set_movement_mode(ctx, mode),
            MovementCommand::AnchorToComponent { target, location } => {
                self.anchor_to_component(ctx, target, location)
            }
            MovementCommand::BreakAnchor { force } => self.break_anchor(ctx, force),
            MovementCommand::Deflect { velocity, time } => self.deflect(ctx, velocity, time),
            MovementCommand::AddImpulse(impulse) => {
                self.add_impulse(impulse);
                true
            }
            MovementCommand::Push {
                hit,
                impact_velocity,
                source,
            } => self.push(&hit, impact_velocity, source),
            MovementCommand::IgnoreActor(actor) => {
                self.ignore_actor(actor);
                true
            }
            MovementCommand::UnignoreActor(actor) => {
                self.unignore_actor(actor);
                true
            }
            MovementCommand::SuppressInput => {
                self.suppress_input();
                true
            }
            MovementCommand::UnsuppressInput => {
                self.unsuppress_input();
                true
            }
            MovementCommand::ResetState(snapshot) => {
                self.reset_state(ctx, snapshot);
                true
            }
            MovementCommand::PauseTimers => {
                self.pause_timers();
                true
            }
            MovementCommand::UnpauseTimers => {
                self.unpause_timers();
                true
            }
            MovementCommand::BeginDragging {
                object,
                face_normal,
            } => self.begin_dragging_object(ctx, object, face_normal),
            MovementCommand::EndDragging => self.end_dragging_object(ctx),
        }
    }
}
