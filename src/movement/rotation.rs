//! Per-mode facing.

use bevy::prelude::*;

use super::{CharacterMovement, MoveContext};
use crate::math::{interp_yaw_constant, planar, yaw_of};
use crate::mode::MovementMode;

impl CharacterMovement {
    /// Turn toward the desired yaw at the active mode's angular rate.
    pub(super) fn new_rotation(&mut self, ctx: &MoveContext, dt: f32) {
        let config = ctx.config;
        let walking_rate = config.walking.rotation_rate_degrees.to_radians();
        let input = self.current_input();

        let (desired, rate) = match self.mode() {
            MovementMode::Walking => {
                // Turning slows down at speed.
                let speed_ratio = (planar(self.state.velocity).length()
                    / config.walking.max_speed.max(1.0))
                .min(1.0);
                let slip = 1.0 - config.walking.slip_rotation_factor * speed_ratio;
                (yaw_of(input), walking_rate * slip)
            }
            MovementMode::Falling if self.state.wall_sliding => (
                yaw_of(-self.state.wall_normal),
                config.wall.rotation_rate_degrees.to_radians(),
            ),
            MovementMode::Falling => (
                yaw_of(input),
                walking_rate * config.falling.air_rotation_factor,
            ),
            MovementMode::Anchored => (None, config.anchor.rotation_rate_degrees.to_radians()),
            MovementMode::Deflected => (
                yaw_of(self.state.deflect_direction),
                config.deflect.rotation_rate_degrees.to_radians(),
            ),
            MovementMode::Dragging => (yaw_of(-self.state.drag_normal), walking_rate),
            MovementMode::Recover | MovementMode::None => return,
        };

        if let Some(desired) = desired {
            self.state.desired_yaw = desired;
        }
        self.state.yaw = interp_yaw_constant(self.state.yaw, self.state.desired_yaw, dt, rate);
        self.rotation = Quat::from_rotation_y(self.state.yaw);
    }
}
