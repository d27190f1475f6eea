//! Integration tests for the movement plugin.
//!
//! These run the plugin's systems in a real Bevy app against the headless
//! backend and check what ends up on the entities and in the event queue.

use bevy::prelude::*;
use pup_movement::prelude::*;

/// Create a minimal test app with the headless backend and a flat floor.
fn create_test_app() -> App {
    let mut app = App::new();

    app.add_plugins(MinimalPlugins);
    app.add_plugins(CharacterMovementPlugin::<HeadlessBackend>::default());
    app.insert_resource(Time::<Fixed>::from_hz(60.0));

    let mut world = HeadlessWorld::new();
    world.add_plane(Vec3::ZERO, Vec3::Y);
    app.insert_resource(world);

    app.finish();
    app.cleanup();
    app
}

/// Spawn a character with default config.
fn spawn_character(app: &mut App, position: Vec3) -> Entity {
    spawn_character_with_config(app, position, MovementConfig::default())
}

/// Spawn a character with custom config.
fn spawn_character_with_config(app: &mut App, position: Vec3, config: MovementConfig) -> Entity {
    let transform = Transform::from_translation(position);
    app.world_mut()
        .spawn((
            transform,
            GlobalTransform::from(transform),
            CharacterMovement::new(CapsuleShape::default()),
            config,
            MovementIntent::default(),
        ))
        .id()
}

/// Run one fixed timestep.
fn tick(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

/// Run the app for N fixed timesteps.
fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        tick(app);
    }
}

/// Take every event sent so far.
fn drain_events(app: &mut App) -> Vec<CharacterMovementEvent> {
    app.world_mut()
        .resource_mut::<Events<CharacterMovementEvent>>()
        .drain()
        .collect()
}

fn movement(app: &App, entity: Entity) -> &CharacterMovement {
    app.world()
        .get::<CharacterMovement>(entity)
        .expect("character")
}

fn translation(app: &App, entity: Entity) -> Vec3 {
    app.world()
        .get::<Transform>(entity)
        .expect("transform")
        .translation
}

fn intent_mut(app: &mut App, entity: Entity) -> Mut<'_, MovementIntent> {
    app.world_mut()
        .get_mut::<MovementIntent>(entity)
        .expect("intent")
}

// ==================== Lifecycle ====================

mod lifecycle {
    use super::*;

    #[test]
    fn character_begins_play_on_first_tick() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);

        assert!(!movement(&app, character).has_begun());
        tick(&mut app);

        let movement = movement(&app, character);
        assert!(movement.has_begun());
        assert_eq!(movement.mode(), MovementMode::Walking);
        assert_eq!(movement.owner(), Some(character));

        let config = MovementConfig::default();
        let expected = movement.capsule().bottom_offset() + config.floor.padding;
        assert!((translation(&app, character).y - expected).abs() < 1.0e-3);
    }

    #[test]
    fn first_tick_reports_mode_change_for_the_character() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);

        tick(&mut app);
        let events = drain_events(&mut app);

        assert!(events.iter().all(|event| event.character == character));
        assert!(events.iter().any(|event| event.event
            == MovementEvent::ModeChanged {
                old: MovementMode::None,
                new: MovementMode::Walking,
            }));
    }

    #[test]
    fn moving_the_transform_teleports_the_character() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);
        tick(&mut app);

        let target = Vec3::new(400.0, 400.0, 0.0);
        app.world_mut()
            .get_mut::<Transform>(character)
            .expect("transform")
            .translation = target;
        tick(&mut app);

        let position = movement(&app, character).position();
        assert!(position.y <= target.y);
        assert!((position.x - target.x).abs() < 1.0e-3);
        assert_eq!(movement(&app, character).mode(), MovementMode::Falling);
    }
}

// ==================== Intent ====================

mod intent {
    use super::*;

    #[test]
    fn walk_intent_moves_the_transform() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);
        tick(&mut app);
        let start = translation(&app, character);

        for _ in 0..30 {
            intent_mut(&mut app, character).set_input(Vec3::X);
            tick(&mut app);
        }

        let moved = translation(&app, character) - start;
        assert!(moved.x > 50.0, "moved {moved}");
        assert!(moved.y.abs() < 1.0e-3);
        assert!(movement(&app, character).velocity().x > 0.0);
    }

    #[test]
    fn input_is_consumed_each_tick() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);
        tick(&mut app);

        intent_mut(&mut app, character).set_input(Vec3::Z);
        tick(&mut app);

        let intent = app
            .world()
            .get::<MovementIntent>(character)
            .expect("intent");
        assert_eq!(intent.pending_input(), Vec3::ZERO);
    }

    #[test]
    fn pressing_jump_jumps_once() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);
        tick(&mut app);
        drain_events(&mut app);
        let ground_height = translation(&app, character).y;

        intent_mut(&mut app, character).set_jump_pressed(true);
        run_frames(&mut app, 10);

        let jumps = drain_events(&mut app)
            .into_iter()
            .filter(|event| matches!(event.event, MovementEvent::Jumped { initial: true, .. }))
            .count();
        assert_eq!(jumps, 1);
        assert_eq!(movement(&app, character).mode(), MovementMode::Falling);
        assert!(translation(&app, character).y > ground_height);
    }

    #[test]
    fn queued_commands_are_applied() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 95.0);
        tick(&mut app);

        intent_mut(&mut app, character).push_command(MovementCommand::Deflect {
            velocity: Vec3::X * 400.0,
            time: 0.5,
        });
        tick(&mut app);

        assert_eq!(movement(&app, character).mode(), MovementMode::Deflected);
        assert!(!intent_mut(&mut app, character).has_commands());
    }

    #[test]
    fn character_without_intent_stands_still() {
        let mut app = create_test_app();
        let transform = Transform::from_translation(Vec3::Y * 95.0);
        let character = app
            .world_mut()
            .spawn((
                transform,
                CharacterMovement::default(),
                MovementConfig::default(),
            ))
            .id();

        run_frames(&mut app, 30);

        let movement = movement(&app, character);
        assert_eq!(movement.mode(), MovementMode::Walking);
        assert_eq!(movement.velocity(), Vec3::ZERO);
    }
}

// ==================== Landing ====================

mod landing {
    use super::*;

    #[test]
    fn falling_character_lands_once() {
        let mut app = create_test_app();
        let character = spawn_character(&mut app, Vec3::Y * 400.0);

        run_frames(&mut app, 120);

        let landings: Vec<_> = drain_events(&mut app)
            .into_iter()
            .filter(CharacterMovementEvent::is_landing)
            .collect();
        assert_eq!(landings.len(), 1);
        assert_eq!(landings[0].character, character);
        assert_eq!(movement(&app, character).mode(), MovementMode::Walking);
    }

    #[test]
    fn characters_move_independently() {
        let mut app = create_test_app();
        let standing = spawn_character(&mut app, Vec3::Y * 95.0);
        let falling = spawn_character(&mut app, Vec3::new(500.0, 600.0, 0.0));

        run_frames(&mut app, 5);

        assert_eq!(movement(&app, standing).mode(), MovementMode::Walking);
        assert_eq!(movement(&app, falling).mode(), MovementMode::Falling);
    }
}

// ==================== Configuration ====================

mod configuration {
    use super::*;

    #[test]
    fn invalid_config_does_not_stop_the_simulation() {
        let mut app = create_test_app();
        let mut config = MovementConfig::default();
        config.walking.max_speed = -1.0;
        assert!(config.validate().is_err());

        let character = spawn_character_with_config(&mut app, Vec3::Y * 95.0, config);
        run_frames(&mut app, 3);

        assert!(movement(&app, character).has_begun());
    }

    #[test]
    fn custom_timestep_reslices_frame() {
        let mut app = create_test_app();
        let config = MovementConfig::default().with_timestep(1.0 / 240.0);
        let character = spawn_character_with_config(&mut app, Vec3::Y * 600.0, config);

        tick(&mut app);
        tick(&mut app);

        // The last recorded move is one of four slices of the frame.
        let outcome = movement(&app, character).last_move().expect("moved");
        assert!((outcome.consumed_time() - 1.0 / 240.0).abs() < 1.0e-5);
    }
}

// ==================== Moving surfaces ====================

mod moving_surfaces {
    use super::*;

    #[test]
    fn plugin_advances_platforms_and_carries_riders() {
        let mut app = create_test_app();
        let platform = {
            let mut world = app.world_mut().resource_mut::<HeadlessWorld>();
            let platform =
                world.add_box(Vec3::new(0.0, 200.0, 0.0), Vec3::new(300.0, 10.0, 300.0));
            world.set_velocity(platform, Vec3::new(0.0, 0.0, 60.0));
            platform
        };
        let character = spawn_character(&mut app, Vec3::Y * 300.0);

        tick(&mut app);
        assert_eq!(movement(&app, character).basis().entity(), Some(platform));
        let start = translation(&app, character);

        run_frames(&mut app, 60);

        let travelled = translation(&app, character) - start;
        assert!((travelled.z - 60.0).abs() < 1.0, "travelled {travelled}");
        assert!(travelled.y.abs() < 1.0e-2);
    }
}
