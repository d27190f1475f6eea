//! Per-character mutable movement state.
//!
//! [`MovementState`] holds everything the core mutates from tick to tick
//! apart from the mode itself, the basis tracker and the timers. Producers
//! outside the core only ever add to the pending accumulators; the core
//! drains them exactly once per timestep.

use bevy::ecs::entity::EntityHashSet;
use bevy::prelude::*;

use crate::math::UP;
use crate::mode::MovementMode;

/// What a tick consumed from the pending accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingInput {
    /// Velocity changes (jumps, knockbacks, basis momentum).
    pub impulse: Vec3,
    /// Displacement to carry out this tick through collision-safe sweeps.
    pub adjustment: Vec3,
    /// Velocity imparted by other movers pushing into the character.
    pub push: Vec3,
}

/// Ledge grabbed by a mantle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgeInfo {
    /// Walkable point on top of the ledge.
    pub top: Vec3,
    /// Normal of the wall below the ledge.
    pub wall_normal: Vec3,
    /// Unit direction along the ledge edge.
    pub direction: Vec3,
    /// Surface the ledge belongs to.
    pub entity: Entity,
}

/// Snapshot re-applied by `reset_state` (respawn, re-sync).
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub mode: MovementMode,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

impl StateSnapshot {
    /// Snapshot at rest.
    pub fn at_rest(mode: MovementMode, position: Vec3) -> Self {
        Self {
            mode,
            position,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
        }
    }
}

/// Mutable movement state owned by a character's movement core.
#[derive(Debug, Clone)]
pub struct MovementState {
    /// Current linear velocity, relative to the basis when attached.
    pub velocity: Vec3,
    /// Target facing (yaw around +Y, radians).
    pub desired_yaw: f32,
    /// Actual facing (yaw around +Y, radians).
    pub yaw: f32,
    /// Normal from the last successful floor probe.
    pub floor_normal: Vec3,
    /// Whether the last floor probe found a walkable floor.
    pub grounded: bool,
    /// Surface found by the last floor probe.
    pub floor_entity: Option<Entity>,
    /// Contact point of the last floor probe.
    pub floor_location: Vec3,

    pub(crate) pending_impulses: Vec3,
    pub(crate) pending_adjustments: Vec3,
    pub(crate) pending_pushes: Vec3,

    /// Velocity added by the current jump hold so far.
    pub jump_applied_velocity: f32,
    /// Upward acceleration applied while a jump is held.
    pub hold_jump_acceleration: f32,

    pub can_jump: bool,
    pub jumping: bool,
    pub can_double_jump: bool,
    pub mantling: bool,
    pub can_mantle: bool,
    pub wall_sliding: bool,
    pub can_scramble: bool,
    pub wall_scrambling: bool,
    /// Whether the last walking tick had input.
    pub is_walking: bool,
    pub suppressing_input: bool,
    /// Whether the capsule collides at all (disabled during recovery).
    pub collision_enabled: bool,

    /// Normal of the wall being slid along.
    pub wall_normal: Vec3,
    /// Unit direction of the active deflection.
    pub deflect_direction: Vec3,
    /// The deflect timer ran out; control returns once the launch is spent.
    pub deflect_expired: bool,
    /// Face of the dragged object the character holds.
    pub drag_normal: Vec3,
    /// Object being dragged.
    pub drag_target: Option<Entity>,
    /// Ledge held while mantling.
    pub ledge: Option<LedgeInfo>,
    /// Where the recovery flight ends.
    pub recovery_target: Vec3,

    /// Last floor point judged safe (capsule center).
    pub last_valid_location: Vec3,
    /// Actors all sweeps skip.
    pub ignored_actors: EntityHashSet,
    /// Surfaces rejected as floors during the current tick.
    pub invalid_floor_components: EntityHashSet,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            desired_yaw: 0.0,
            yaw: 0.0,
            floor_normal: UP,
            grounded: false,
            floor_entity: None,
            floor_location: Vec3::ZERO,
            pending_impulses: Vec3::ZERO,
            pending_adjustments: Vec3::ZERO,
            pending_pushes: Vec3::ZERO,
            jump_applied_velocity: 0.0,
            hold_jump_acceleration: 0.0,
            can_jump: false,
            jumping: false,
            can_double_jump: false,
            mantling: false,
            can_mantle: true,
            wall_sliding: false,
            can_scramble: true,
            wall_scrambling: false,
            is_walking: false,
            suppressing_input: false,
            collision_enabled: true,
            wall_normal: Vec3::ZERO,
            deflect_direction: Vec3::ZERO,
            deflect_expired: false,
            drag_normal: Vec3::ZERO,
            drag_target: None,
            ledge: None,
            recovery_target: Vec3::ZERO,
            last_valid_location: Vec3::ZERO,
            ignored_actors: EntityHashSet::default(),
            invalid_floor_components: EntityHashSet::default(),
        }
    }
}

impl MovementState {
    /// Add a velocity change for the next tick.
    pub fn add_impulse(&mut self, impulse: Vec3) {
        self.pending_impulses += impulse;
    }

    /// Add a displacement for the next tick.
    pub fn add_adjustment(&mut self, adjustment: Vec3) {
        self.pending_adjustments += adjustment;
    }

    /// Add a push velocity for the next tick.
    pub fn add_push(&mut self, push: Vec3) {
        self.pending_pushes += push;
    }

    /// Accumulated values not yet consumed.
    pub fn pending(&self) -> PendingInput {
        PendingInput {
            impulse: self.pending_impulses,
            adjustment: self.pending_adjustments,
            push: self.pending_pushes,
        }
    }

    /// Take all pending accumulators and zero them.
    pub fn drain_pending(&mut self) -> PendingInput {
        PendingInput {
            impulse: std::mem::take(&mut self.pending_impulses),
            adjustment: std::mem::take(&mut self.pending_adjustments),
            push: std::mem::take(&mut self.pending_pushes),
        }
    }

    /// Forget the last floor probe.
    pub fn clear_floor(&mut self) {
        self.grounded = false;
        self.floor_entity = None;
        self.floor_normal = UP;
    }

    /// Clear transient flags and accumulators, keeping the ignore list and
    /// last safe location.
    pub fn clear_transient(&mut self) {
        self.pending_impulses = Vec3::ZERO;
        self.pending_adjustments = Vec3::ZERO;
        self.pending_pushes = Vec3::ZERO;
        self.jump_applied_velocity = 0.0;
        self.hold_jump_acceleration = 0.0;
        self.jumping = false;
        self.mantling = false;
        self.wall_sliding = false;
        self.wall_scrambling = false;
        self.suppressing_input = false;
        self.deflect_expired = false;
        self.deflect_direction = Vec3::ZERO;
        self.drag_target = None;
        self.ledge = None;
        self.collision_enabled = true;
        self.invalid_floor_components.clear();
        self.clear_floor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_then_zeroes() {
        let mut state = MovementState::default();
        state.add_impulse(Vec3::Y * 10.0);
        state.add_impulse(Vec3::X);
        state.add_adjustment(Vec3::Z);
        state.add_push(Vec3::NEG_X);

        let drained = state.drain_pending();
        assert_eq!(drained.impulse, Vec3::new(1.0, 10.0, 0.0));
        assert_eq!(drained.adjustment, Vec3::Z);
        assert_eq!(drained.push, Vec3::NEG_X);
        assert_eq!(state.pending(), PendingInput::default());

        // Nothing left for a second read.
        assert_eq!(state.drain_pending(), PendingInput::default());
    }

    #[test]
    fn clear_transient_keeps_ignore_list() {
        let mut state = MovementState::default();
        let actor = Entity::from_raw(7);
        state.ignored_actors.insert(actor);
        state.invalid_floor_components.insert(actor);
        state.jumping = true;
        state.collision_enabled = false;

        state.clear_transient();

        assert!(state.ignored_actors.contains(&actor));
        assert!(state.invalid_floor_components.is_empty());
        assert!(!state.jumping);
        assert!(state.collision_enabled);
    }
}
