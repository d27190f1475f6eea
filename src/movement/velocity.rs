//! Per-mode velocity.

use bevy::prelude::*;

use super::{CharacterMovement, MoveContext};
use crate::math::{move_towards, planar, project_on_plane, KINDA_SMALL_NUMBER, UP};
use crate::mode::MovementMode;
use crate::state::PendingInput;
use crate::timers::TimerSlot;

impl CharacterMovement {
    /// Velocity for this timestep, computed by the mode active at its start.
    pub(super) fn new_velocity(
        &mut self,
        ctx: &MoveContext,
        pending: &PendingInput,
        dt: f32,
    ) -> Vec3 {
        match self.mode() {
            MovementMode::Walking => self.walking_velocity(ctx, pending, dt),
            MovementMode::Falling => self.falling_velocity(ctx, pending, dt),
            MovementMode::Anchored => self.anchored_velocity(ctx, dt),
            MovementMode::Deflected => self.deflected_velocity(ctx, pending, dt),
            MovementMode::Recover => self.state.velocity + UP * ctx.gravity() * dt,
            MovementMode::Dragging => self.dragging_velocity(ctx),
            MovementMode::None => Vec3::ZERO,
        }
    }

    fn walking_velocity(&mut self, ctx: &MoveContext, pending: &PendingInput, dt: f32) -> Vec3 {
        let walking = &ctx.config.walking;
        let input = planar(self.current_input());
        let input_size = input.length().min(1.0);
        let mut velocity = planar(self.state.velocity);

        if input_size > KINDA_SMALL_NUMBER {
            let direction = input.normalize();
            let speed = velocity.length();
            // Steer the existing velocity toward the input direction.
            let turning = (walking.turning_friction * dt).min(1.0);
            velocity -= (velocity - direction * speed) * turning;
            velocity += direction * (walking.max_acceleration * input_size * dt);
            // Speed gained from dashes and knockbacks bleeds off instead of
            // being cut to the walking limit.
            let limit = if speed > walking.max_speed {
                (speed * (-walking.braking_decay * dt).exp()).max(walking.max_speed)
            } else {
                walking.max_speed
            };
            velocity = velocity.clamp_length_max(limit);
            self.state.is_walking = true;
        } else {
            velocity *= (-walking.braking_decay * dt).exp();
            if velocity.length() < walking.stop_speed {
                velocity = Vec3::ZERO;
            }
            self.state.is_walking = false;
        }

        velocity + planar(pending.impulse) + planar(pending.push)
    }

    fn falling_velocity(&mut self, ctx: &MoveContext, pending: &PendingInput, dt: f32) -> Vec3 {
        let config = ctx.config;
        let falling = &config.falling;
        let velocity = self.state.velocity;

        let input = planar(self.current_input());
        let desired = input * config.walking.max_speed * falling.air_control;
        let rate = if input.length_squared() > KINDA_SMALL_NUMBER {
            falling.air_acceleration
        } else {
            falling.air_braking
        };
        let mut horizontal = move_towards(planar(velocity), desired, rate * dt);
        let mut vertical = (velocity.y + ctx.gravity() * dt).max(-falling.terminal_speed);

        if self.state.wall_sliding {
            let wall = &config.wall;
            let normal = self.state.wall_normal;
            let away = horizontal.dot(normal);
            if away > 0.0 {
                if away > wall.scramble_threshold && self.state.can_scramble {
                    trace!("Wall scramble");
                    self.state.can_scramble = false;
                    self.state.wall_scrambling = true;
                    self.timers.schedule(TimerSlot::EdgeScramble, wall.scramble_time);
                }
                horizontal -= normal * (away * wall.stickiness);
            }
            vertical = vertical.max(-wall.max_slide_speed);
        }
        if self.state.wall_scrambling {
            vertical += config.wall.scramble_acceleration * dt;
        }

        if self.state.jumping && self.timers.is_active(TimerSlot::JumpHold) {
            let jumping = &config.jumping;
            let budget = (jumping.max_hold_velocity - self.state.jump_applied_velocity).max(0.0);
            let boost = (self.state.hold_jump_acceleration * dt).min(budget);
            vertical += boost;
            self.state.jump_applied_velocity += boost;
        }

        horizontal + UP * vertical + pending.impulse + pending.push
    }

    fn anchored_velocity(&mut self, ctx: &MoveContext, dt: f32) -> Vec3 {
        if self.state.mantling {
            self.slide_along_ledge(ctx, dt);
        }

        let Some(target) = self.basis.anchor_world(ctx.queries) else {
            return Vec3::ZERO;
        };
        let delta = target - self.position;
        let distance = delta.length();
        let snap_speed = ctx.config.anchor.snap_speed;
        if distance <= snap_speed * dt {
            self.position = target;
            Vec3::ZERO
        } else {
            delta / distance * snap_speed
        }
    }

    /// Move the anchor along the held ledge following input.
    fn slide_along_ledge(&mut self, ctx: &MoveContext, dt: f32) {
        let Some(ledge) = self.state.ledge else {
            return;
        };
        let along = planar(self.current_input()).dot(ledge.direction);
        if along.abs() <= ctx.config.wall.input_threshold {
            return;
        }
        let Some(anchor) = self.basis.anchor_world(ctx.queries) else {
            return;
        };

        let anchor_config = &ctx.config.anchor;
        let step = ledge.direction * (along.clamp(-1.0, 1.0) * anchor_config.edge_slide_speed * dt);
        let Some(top) = self.probe(ctx).ledge_continues(ledge.top + step, anchor_config) else {
            trace!("Ledge ends; not sliding");
            return;
        };

        self.basis.set_anchor(ctx.queries, anchor + step);
        if let Some(held) = self.state.ledge.as_mut() {
            held.top = top;
        }
    }

    fn deflected_velocity(&mut self, ctx: &MoveContext, pending: &PendingInput, dt: f32) -> Vec3 {
        let deflect = &ctx.config.deflect;
        let mut velocity = self.state.velocity;

        if self.state.grounded {
            velocity = project_on_plane(velocity, self.state.floor_normal)
                * (-deflect.slide_friction * dt).exp();
        } else {
            velocity.y = (velocity.y + ctx.gravity() * dt).max(-ctx.config.falling.terminal_speed);
        }

        velocity += planar(self.current_input()) * (deflect.control_acceleration * dt);
        velocity + pending.impulse + pending.push
    }

    fn dragging_velocity(&self, ctx: &MoveContext) -> Vec3 {
        let axis = planar(self.state.drag_normal).normalize_or_zero();
        let along = planar(self.current_input()).dot(axis);
        axis * (along * ctx.config.dragging.drag_speed)
    }
}
