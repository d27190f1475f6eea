//! # `pup_movement`
//!
//! A kinematic capsule character movement core with physics backend
//! abstraction.
//!
//! This crate moves a capsule-shaped character through a dynamic 3D world:
//! - Walking, falling, jumping (double jumps, wall jumps, coyote time)
//! - Ledge mantling, wall sliding and scrambling
//! - Anchoring to (moving) objects, dragging objects
//! - Being deflected/launched by gameplay, and recovering after falling out
//!   of the level
//! - Riding moving platforms without drift
//! - Abstracts physics queries for easy swapping (an analytic headless world
//!   is built in, Rapier3D is behind the `rapier3d` feature)
//!
//! ## Architecture
//!
//! The character is kinematic. Every fixed timestep:
//! 1. The active [`MovementMode`](mode::MovementMode) computes a velocity and facing
//! 2. The substep integrator sweeps the capsule along that velocity,
//!    stopping and sliding at each blocking hit
//! 3. The floor detector classifies what is underneath, which may change mode
//! 4. Events (jumps, landings, mode changes) are broadcast
//!
//! Physics access goes through [`MovementQueries`](backend::MovementQueries):
//! capsule sweeps, line traces, overlaps, gravity and surface motion.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use pup_movement::prelude::*;
//!
//! // Components for a player character
//! let movement = CharacterMovement::new(CapsuleShape::new(34.0, 54.0));
//! let config = MovementConfig::player();
//! let intent = MovementIntent::default();
//!
//! // Spawn them together with a Transform
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod basis;
pub mod collision;
pub mod config;
pub mod events;
pub mod floor;
pub mod headless;
pub mod intent;
pub mod math;
pub mod mode;
pub mod movement;
pub mod state;
pub mod substep;
pub mod systems;
pub mod timers;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{CharacterPhysicsBackend, MovementQueries, SurfaceCapabilities};
    pub use crate::collision::{CapsuleShape, HitResult};
    pub use crate::config::{ConfigError, MovementConfig};
    pub use crate::events::{CharacterMovementEvent, MovementEvent};
    pub use crate::headless::{HeadlessBackend, HeadlessWorld};
    pub use crate::intent::{MovementCommand, MovementIntent};
    pub use crate::mode::MovementMode;
    pub use crate::movement::{CharacterMovement, MoveContext};
    pub use crate::state::StateSnapshot;
    pub use crate::{CharacterMovementPlugin, MovementSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::Rapier3dBackend;
}

/// Ordering of the movement systems inside `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementSet {
    /// Validation and bookkeeping before any character moves.
    Prepare,
    /// The backend's per-character tick.
    Simulation,
}

/// Main plugin for character movement.
///
/// This plugin is generic over a physics backend `B` which answers the
/// movement queries (sweeps, traces, overlaps) against its world.
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `HeadlessBackend`)
///
/// # Examples
///
/// ```rust,no_run
/// use bevy::prelude::*;
/// use pup_movement::prelude::*;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(CharacterMovementPlugin::<HeadlessBackend>::default())
///     .run();
/// ```
pub struct CharacterMovementPlugin<B: backend::CharacterPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for CharacterMovementPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for CharacterMovementPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::MovementConfig>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<mode::MovementMode>();
        app.register_type::<collision::CapsuleShape>();
        app.register_type::<backend::SurfaceCapabilities>();

        app.add_event::<events::CharacterMovementEvent>();

        app.configure_sets(
            FixedUpdate,
            (MovementSet::Prepare, MovementSet::Simulation).chain(),
        );
        app.add_systems(
            FixedUpdate,
            systems::validate_new_configs.in_set(MovementSet::Prepare),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());
    }
}
