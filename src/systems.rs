//! Shared per-character systems.
//!
//! Backends own the system that gathers their world view; the work done per
//! character is the same everywhere and lives in [`run_character_tick`].

use bevy::prelude::*;

use crate::backend::MovementQueries;
use crate::config::MovementConfig;
use crate::events::MovementEvent;
use crate::intent::MovementIntent;
use crate::math::KINDA_SMALL_NUMBER;
use crate::movement::{CharacterMovement, MoveContext};

/// Fixed timestep length, falling back to the configured period before the
/// first fixed update has run.
pub fn fixed_timestep(time: &Time<Fixed>) -> f32 {
    let delta = time.delta_secs();
    if delta > 0.0 {
        delta
    } else {
        time.timestep().as_secs_f32()
    }
}

/// Run one frame of a character.
///
/// 1. Begin play on first use, or adopt an externally moved `Transform`.
/// 2. Consume the intent: input, queued commands, jump edges.
/// 3. Tick the movement core.
/// 4. Write the result back to the `Transform`.
///
/// Returns the events recorded during the frame.
pub fn run_character_tick(
    entity: Entity,
    movement: &mut CharacterMovement,
    config: &MovementConfig,
    intent: Option<&mut MovementIntent>,
    transform: &mut Transform,
    queries: &dyn MovementQueries,
    dt: f32,
) -> Vec<MovementEvent> {
    let ctx = MoveContext::new(queries, config);
    movement.set_owner(entity);

    if !movement.has_begun() {
        movement.begin_play(&ctx, transform.translation, transform.rotation);
    } else if transform
        .translation
        .distance_squared(movement.position())
        > KINDA_SMALL_NUMBER * KINDA_SMALL_NUMBER
    {
        trace!("{entity:?} moved externally; adopting transform");
        movement.teleport(transform.translation);
    }

    match intent {
        Some(intent) => {
            movement.set_input(intent.consume_input());
            for command in intent.drain_commands() {
                trace!("{entity:?} applying {command:?}");
                movement.apply_command(&ctx, command);
            }
            match intent.take_jump_edge() {
                Some(true) => {
                    movement.jump(&ctx);
                }
                Some(false) => movement.stop_jumping(),
                None => {}
            }
        }
        None => movement.set_input(Vec3::ZERO),
    }

    movement.tick(&ctx, dt);

    transform.translation = movement.position();
    transform.rotation = movement.rotation();
    movement.drain_events()
}

/// Warn about configs that fail validation as soon as they are added.
pub fn validate_new_configs(q_configs: Query<(Entity, &MovementConfig), Added<MovementConfig>>) {
    for (entity, config) in &q_configs {
        if let Err(error) = config.validate() {
            warn!("{entity:?} has an invalid movement config: {error}");
        }
    }
}
