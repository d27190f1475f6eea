//! Movement broadcasts.
//!
//! The core records what happened during a tick as [`MovementEvent`]s. The
//! Bevy layer forwards them as [`CharacterMovementEvent`]s so animation,
//! audio and gameplay systems can react. Readers must not rely on any
//! ordering between each other.

use bevy::prelude::*;

use crate::mode::MovementMode;

/// Something that happened to a character's movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementEvent {
    /// The movement mode changed.
    ModeChanged {
        old: MovementMode,
        new: MovementMode,
    },
    /// A jump was performed.
    Jumped {
        /// Floor location the jump started from (feet location when airborne).
        floor_location: Vec3,
        /// `true` for a ground (or coyote) jump, `false` for double and wall jumps.
        initial: bool,
    },
    /// The character landed on a floor.
    Landed {
        floor_location: Vec3,
        /// Speed into the floor at the moment of impact.
        impact_speed: f32,
        floor: Option<Entity>,
    },
    /// The character climbed up from a ledge.
    Mantled,
    /// A dash started.
    Dashed { direction: Vec3 },
    /// An in-progress drag was interrupted by something other than the player.
    ForceDragRelease,
    /// The character was snapped onto a floor surface.
    FloorHit {
        entity: Option<Entity>,
        location: Vec3,
        normal: Vec3,
    },
}

/// A [`MovementEvent`] tagged with the character it concerns.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct CharacterMovementEvent {
    pub character: Entity,
    pub event: MovementEvent,
}

impl CharacterMovementEvent {
    /// Tag an event with its character.
    pub fn new(character: Entity, event: MovementEvent) -> Self {
        Self { character, event }
    }

    /// Whether this is a landing.
    pub fn is_landing(&self) -> bool {
        matches!(self.event, MovementEvent::Landed { .. })
    }
}
