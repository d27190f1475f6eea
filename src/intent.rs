//! Movement intent components.
//!
//! Intents represent what player input, AI or gameplay code wants the
//! character to do. The movement tick reads the intent once per frame: it
//! consumes the accumulated input vector, turns jump-button edges into
//! `jump`/`stop_jumping` calls and applies queued [`MovementCommand`]s.

use bevy::prelude::*;

use crate::collision::HitResult;
use crate::mode::MovementMode;
use crate::state::StateSnapshot;

/// A request to one of the movement core's public mutators.
///
/// Commands let gameplay systems drive a character without access to the
/// physics backend; they are applied at the start of the next tick, in the
/// order they were queued.
#[derive(Debug, Clone, PartialEq)]
pub enum MovementCommand {
    Jump,
    StopJumping,
    Dash,
    Mantle,
    ClimbMantle,
    SetMode(MovementMode),
    AnchorToComponent { target: Entity, location: Vec3 },
    BreakAnchor { force: bool },
    Deflect { velocity: Vec3, time: f32 },
    AddImpulse(Vec3),
    Push {
        hit: HitResult,
        impact_velocity: Vec3,
        source: Option<Entity>,
    },
    IgnoreActor(Entity),
    UnignoreActor(Entity),
    SuppressInput,
    UnsuppressInput,
    ResetState(StateSnapshot),
    PauseTimers,
    UnpauseTimers,
    BeginDragging { object: Entity, face_normal: Vec3 },
    EndDragging,
}

/// Movement intent for a character.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use pup_movement::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.add_input(Vec3::new(2.0, 0.0, 0.0));
/// intent.set_jump_pressed(true);
///
/// // Input is clamped to unit length when consumed, then cleared.
/// assert_eq!(intent.consume_input(), Vec3::X);
/// assert_eq!(intent.consume_input(), Vec3::ZERO);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct MovementIntent {
    /// Input accumulated since the last tick, in world space.
    input: Vec3,
    /// Whether the jump action is currently held.
    ///
    /// A `false` → `true` change calls `jump`, `true` → `false` calls
    /// `stop_jumping`.
    pub jump_pressed: bool,
    /// Previous tick's `jump_pressed` (for edge detection).
    pub(crate) jump_pressed_prev: bool,
    /// Commands waiting for the next tick.
    #[reflect(ignore)]
    commands: Vec<MovementCommand>,
}

impl MovementIntent {
    /// Create an empty intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to this tick's input vector.
    pub fn add_input(&mut self, input: Vec3) {
        self.input += input;
    }

    /// Replace this tick's input vector.
    pub fn set_input(&mut self, input: Vec3) {
        self.input = input;
    }

    /// Input accumulated so far, unclamped.
    pub fn pending_input(&self) -> Vec3 {
        self.input
    }

    /// Take the accumulated input, clamped to unit length, and clear it.
    pub fn consume_input(&mut self) -> Vec3 {
        std::mem::take(&mut self.input).clamp_length_max(1.0)
    }

    /// Set whether jump is held this frame.
    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    /// Check if jump is currently held.
    pub fn is_jump_pressed(&self) -> bool {
        self.jump_pressed
    }

    /// Jump edge since the last call: `Some(true)` on press, `Some(false)` on
    /// release, `None` when unchanged.
    pub(crate) fn take_jump_edge(&mut self) -> Option<bool> {
        let edge = (self.jump_pressed != self.jump_pressed_prev).then_some(self.jump_pressed);
        self.jump_pressed_prev = self.jump_pressed;
        edge
    }

    /// Queue a command for the next tick.
    pub fn push_command(&mut self, command: MovementCommand) {
        self.commands.push(command);
    }

    /// Whether any command is queued.
    pub fn has_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    /// Take every queued command, oldest first.
    pub fn drain_commands(&mut self) -> Vec<MovementCommand> {
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_clamps_and_clears() {
        let mut intent = MovementIntent::new();
        intent.add_input(Vec3::new(0.0, 0.0, -3.0));
        intent.add_input(Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(intent.pending_input(), Vec3::new(0.0, 0.0, -4.0));

        let consumed = intent.consume_input();
        assert!((consumed.length() - 1.0).abs() < 1.0e-6);
        assert_eq!(intent.consume_input(), Vec3::ZERO);
    }

    #[test]
    fn small_input_is_not_scaled_up() {
        let mut intent = MovementIntent::new();
        intent.set_input(Vec3::X * 0.25);
        assert_eq!(intent.consume_input(), Vec3::X * 0.25);
    }

    #[test]
    fn jump_edges() {
        let mut intent = MovementIntent::new();
        assert_eq!(intent.take_jump_edge(), None);

        intent.set_jump_pressed(true);
        assert_eq!(intent.take_jump_edge(), Some(true));
        // Held: no new edge.
        assert_eq!(intent.take_jump_edge(), None);

        intent.set_jump_pressed(false);
        assert_eq!(intent.take_jump_edge(), Some(false));
    }

    #[test]
    fn commands_drain_in_order() {
        let mut intent = MovementIntent::new();
        intent.push_command(MovementCommand::Jump);
        intent.push_command(MovementCommand::AddImpulse(Vec3::Y));
        assert!(intent.has_commands());

        let commands = intent.drain_commands();
        assert_eq!(commands, vec![MovementCommand::Jump, MovementCommand::AddImpulse(Vec3::Y)]);
        assert!(!intent.has_commands());
    }
}
