//! Movement modes.
//!
//! Exactly one [`MovementMode`] is active per character. The value lives in a
//! [`ModeCell`] whose only mutator is crate-internal and is called from
//! `CharacterMovement::set_mode` alone, so every transition is validated and
//! broadcast in one place.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// The movement mode of a character.
///
/// The mode selects which velocity/rotation algorithm runs each tick and how
/// the floor probe result is interpreted.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MovementMode {
    /// Not simulated.
    #[default]
    None,
    /// Standing on a walkable floor.
    Walking,
    /// Airborne under gravity.
    Falling,
    /// Held at an anchor point (grabbing, hanging from a ledge).
    Anchored,
    /// Launched by an external force; player control is reduced.
    Deflected,
    /// Returning to the last safe location after leaving the stage.
    Recover,
    /// Pushing or pulling an object along the floor.
    Dragging,
}

impl MovementMode {
    /// Modes that are checked against the kill height each tick.
    pub fn is_kill_checked(self) -> bool {
        matches!(
            self,
            Self::Walking | Self::Falling | Self::Anchored | Self::Dragging | Self::Deflected
        )
    }

    /// Modes an external launch can override.
    pub fn can_be_deflected(self) -> bool {
        !matches!(self, Self::None | Self::Recover)
    }

    /// Modes from which a character may grab an anchor.
    pub fn can_anchor(self) -> bool {
        matches!(
            self,
            Self::Walking | Self::Falling | Self::Deflected | Self::Anchored | Self::Dragging
        )
    }

    /// Whether the character is supported by a floor in this mode.
    pub fn is_grounded_mode(self) -> bool {
        matches!(self, Self::Walking | Self::Dragging)
    }
}

/// Holder of the active mode.
///
/// Reading is public; replacing the value is reserved for the transition
/// entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeCell {
    current: MovementMode,
}

impl ModeCell {
    /// The active mode.
    #[inline]
    pub fn get(&self) -> MovementMode {
        self.current
    }

    /// Replace the mode, returning the previous one.
    pub(crate) fn replace(&mut self, mode: MovementMode) -> MovementMode {
        std::mem::replace(&mut self.current, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_none() {
        assert_eq!(ModeCell::default().get(), MovementMode::None);
    }

    #[test]
    fn replace_returns_previous() {
        let mut cell = ModeCell::default();
        assert_eq!(cell.replace(MovementMode::Walking), MovementMode::None);
        assert_eq!(cell.replace(MovementMode::Falling), MovementMode::Walking);
        assert_eq!(cell.get(), MovementMode::Falling);
    }

    #[test]
    fn recover_and_none_cannot_be_deflected() {
        assert!(!MovementMode::Recover.can_be_deflected());
        assert!(!MovementMode::None.can_be_deflected());
        assert!(MovementMode::Anchored.can_be_deflected());
    }

    #[test]
    fn kill_check_excludes_recover() {
        assert!(!MovementMode::Recover.is_kill_checked());
        assert!(MovementMode::Dragging.is_kill_checked());
    }
}
