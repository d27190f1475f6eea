//! Movement configuration.
//!
//! All gameplay tunables live in [`MovementConfig`], split into sections per
//! concern. Configs can be built in code (presets plus `with_*` builders) or
//! loaded from RON files; missing fields fall back to their defaults.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a [`MovementConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read movement config: {0}")]
    Io(#[from] std::io::Error),
    /// The config text is not valid RON for this struct.
    #[error("failed to parse movement config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// A value is outside its physical range.
    #[error("invalid movement config: {0}")]
    Invalid(String),
}

/// Floor detection settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FloorConfig {
    /// How far below the capsule the floor probe sweeps.
    pub snap_distance: f32,
    /// Number of sweeps before giving up on overlapping invalid floors.
    pub num_tries: u32,
    /// Gap kept between the capsule and the floor after snapping.
    pub padding: f32,
    /// Steepest walkable incline, in degrees from horizontal.
    pub max_incline_degrees: f32,
    /// Length of the straight-down trace used to refine sweep normals.
    pub normal_trace_length: f32,
    /// Radius around a floor point that must also be solid for the point to
    /// count as a safe recovery location.
    pub safe_radius: f32,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            snap_distance: 5.0,
            num_tries: 3,
            padding: 0.15,
            max_incline_degrees: 45.0,
            normal_trace_length: 10.0,
            safe_radius: 60.0,
        }
    }
}

impl FloorConfig {
    /// Minimum up component of a walkable floor normal.
    #[inline]
    pub fn max_incline_cos(&self) -> f32 {
        self.max_incline_degrees.to_radians().cos()
    }
}

/// Ground movement settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct WalkingConfig {
    /// Maximum planar speed (units/second).
    pub max_speed: f32,
    /// Planar acceleration at full input (units/second^2).
    pub max_acceleration: f32,
    /// How quickly velocity is steered toward the input direction.
    pub turning_friction: f32,
    /// Exponential decay rate of velocity when there is no input.
    pub braking_decay: f32,
    /// Speed below which a braking character stops outright.
    pub stop_speed: f32,
    /// Turn rate (degrees/second) when standing still.
    pub rotation_rate_degrees: f32,
    /// Fraction of the turn rate kept at full speed (1 = no slip).
    pub slip_rotation_factor: f32,
}

impl Default for WalkingConfig {
    fn default() -> Self {
        Self {
            max_speed: 600.0,
            max_acceleration: 2400.0,
            turning_friction: 8.0,
            braking_decay: 10.0,
            stop_speed: 5.0,
            rotation_rate_degrees: 720.0,
            slip_rotation_factor: 0.4,
        }
    }
}

/// Airborne movement settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FallingConfig {
    /// Share of `walking.max_speed` reachable through air control (0.0-1.0).
    pub air_control: f32,
    /// Planar acceleration toward the desired air velocity.
    pub air_acceleration: f32,
    /// Planar deceleration when there is no input.
    pub air_braking: f32,
    /// Multiplier on world gravity.
    pub gravity_scale: f32,
    /// Maximum downward speed.
    pub terminal_speed: f32,
    /// Share of the walking turn rate available in the air.
    pub air_rotation_factor: f32,
}

impl Default for FallingConfig {
    fn default() -> Self {
        Self {
            air_control: 0.6,
            air_acceleration: 1400.0,
            air_braking: 200.0,
            gravity_scale: 1.0,
            terminal_speed: 4000.0,
            air_rotation_factor: 0.5,
        }
    }
}

/// Jump settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct JumpingConfig {
    /// Upward impulse of a ground jump.
    pub jump_velocity: f32,
    /// Upward impulse of a double jump.
    pub double_jump_velocity: f32,
    /// How long a held jump keeps adding acceleration.
    pub hold_time: f32,
    /// Upward acceleration while the jump is held.
    pub hold_acceleration: f32,
    /// Upper bound on the velocity the hold may add over one jump.
    pub max_hold_velocity: f32,
    /// Grace window after leaving a floor during which a ground jump is allowed.
    pub coyote_time: f32,
    /// Whether a double jump is available at all.
    pub double_jump_enabled: bool,
    /// Horizontal launch speed away from the wall for a wall jump.
    pub wall_jump_horizontal: f32,
    /// Vertical launch speed for a wall jump.
    pub wall_jump_vertical: f32,
}

impl Default for JumpingConfig {
    fn default() -> Self {
        Self {
            jump_velocity: 520.0,
            double_jump_velocity: 460.0,
            hold_time: 0.25,
            hold_acceleration: 1400.0,
            max_hold_velocity: 260.0,
            coyote_time: 0.15,
            double_jump_enabled: true,
            wall_jump_horizontal: 420.0,
            wall_jump_vertical: 560.0,
        }
    }
}

/// Wall slide and scramble settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct WallConfig {
    /// Whether wall sliding is enabled.
    pub enabled: bool,
    /// Maximum |up component| of a normal for it to count as a wall.
    pub max_normal_up: f32,
    /// Minimum input toward the wall needed to start sliding.
    pub input_threshold: f32,
    /// Maximum fall speed while sliding.
    pub max_slide_speed: f32,
    /// Extra reach of the contact probe beyond the capsule radius.
    pub probe_distance: f32,
    /// Share of the velocity leaving the wall that is cancelled each tick.
    pub stickiness: f32,
    /// Speed away from the wall that triggers a scramble.
    pub scramble_threshold: f32,
    /// Duration of a scramble.
    pub scramble_time: f32,
    /// Upward acceleration while scrambling.
    pub scramble_acceleration: f32,
    /// Turn rate (degrees/second) while sliding.
    pub rotation_rate_degrees: f32,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_normal_up: 0.3,
            input_threshold: 0.3,
            max_slide_speed: 180.0,
            probe_distance: 10.0,
            stickiness: 0.8,
            scramble_threshold: 60.0,
            scramble_time: 0.3,
            scramble_acceleration: 1800.0,
            rotation_rate_degrees: 1440.0,
        }
    }
}

/// Anchor and mantle settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AnchorConfig {
    /// Speed at which the character is pulled to its anchor point.
    pub snap_speed: f32,
    /// Turn rate (degrees/second) while anchored.
    pub rotation_rate_degrees: f32,
    /// Extra forward reach of the ledge search beyond the capsule radius.
    pub mantle_reach: f32,
    /// Highest ledge (above the capsule center) that can be grabbed.
    pub mantle_max_height: f32,
    /// Lowest ledge (above the capsule center) that can be grabbed.
    pub mantle_min_height: f32,
    /// How far past the wall face the ledge top is probed.
    pub ledge_depth: f32,
    /// Distance kept between the capsule surface and the wall while hanging.
    pub hang_offset: f32,
    /// Capsule center height below the ledge top while hanging.
    pub hang_height: f32,
    /// Speed of sideways shuffling along a ledge.
    pub edge_slide_speed: f32,
    /// Delay before mantling is allowed again after letting go.
    pub mantle_debounce: f32,
    /// Speed of the hop away from the wall when dropping off a ledge.
    pub hop_back_speed: f32,
    /// Try to mantle automatically while descending against a wall.
    pub auto_mantle: bool,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            snap_speed: 1200.0,
            rotation_rate_degrees: 720.0,
            mantle_reach: 30.0,
            mantle_max_height: 110.0,
            mantle_min_height: 10.0,
            ledge_depth: 15.0,
            hang_offset: 2.0,
            hang_height: 70.0,
            edge_slide_speed: 150.0,
            mantle_debounce: 0.3,
            hop_back_speed: 350.0,
            auto_mantle: true,
        }
    }
}

/// Deflection (knockback) settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DeflectConfig {
    /// Exponential decay rate of sliding velocity while grounded.
    pub slide_friction: f32,
    /// Acceleration available from player input while deflected.
    pub control_acceleration: f32,
    /// Return to a normal mode once the launch is spent.
    pub regain_control: bool,
    /// Speed along the deflect direction at or below which control returns.
    pub regain_epsilon: f32,
    /// Keep the ability to jump while deflected.
    pub can_jump_while_deflected: bool,
    /// Turn rate (degrees/second) toward the deflect direction.
    pub rotation_rate_degrees: f32,
}

impl Default for DeflectConfig {
    fn default() -> Self {
        Self {
            slide_friction: 2.0,
            control_acceleration: 400.0,
            regain_control: true,
            regain_epsilon: 10.0,
            can_jump_while_deflected: false,
            rotation_rate_degrees: 1440.0,
        }
    }
}

/// Out-of-bounds recovery settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Height below which the character is considered out of bounds.
    pub kill_height: f32,
    /// Flight time back to the last safe location.
    pub recovery_time: f32,
    /// Height above the safe location at which the character reappears.
    pub levitation_height: f32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            kill_height: -1000.0,
            recovery_time: 1.0,
            levitation_height: 50.0,
        }
    }
}

/// Object dragging settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DraggingConfig {
    /// Speed while pushing or pulling an object.
    pub drag_speed: f32,
}

impl Default for DraggingConfig {
    fn default() -> Self {
        Self { drag_speed: 150.0 }
    }
}

/// Dash settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DashConfig {
    /// Planar speed of a dash.
    pub speed: f32,
    /// Time before another dash is allowed.
    pub cooldown: f32,
    /// Allow dashing in the air.
    pub allow_airborne: bool,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            speed: 1200.0,
            cooldown: 0.6,
            allow_airborne: true,
        }
    }
}

/// Time slicing and collision integration settings.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Length of one simulated timestep; larger frame deltas are re-sliced.
    pub timestep: f32,
    /// Maximum number of timesteps simulated per call, to bound hitches.
    pub max_timesteps: u32,
    /// Maximum collision substeps per timestep.
    pub max_substeps: u32,
    /// Distance a blocked capsule is pushed back out along the hit normal.
    pub hit_nudge: f32,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            max_timesteps: 8,
            max_substeps: 3,
            hit_nudge: 0.05,
        }
    }
}

/// Configuration parameters for a character's movement.
#[derive(Component, Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[reflect(Component)]
#[serde(default)]
pub struct MovementConfig {
    pub floor: FloorConfig,
    pub walking: WalkingConfig,
    pub falling: FallingConfig,
    pub jumping: JumpingConfig,
    pub wall: WallConfig,
    pub anchor: AnchorConfig,
    pub deflect: DeflectConfig,
    pub recovery: RecoveryConfig,
    pub dragging: DraggingConfig,
    pub dash: DashConfig,
    pub integration: IntegrationConfig,
}

impl MovementConfig {
    /// Create a config optimized for responsive player control.
    pub fn player() -> Self {
        Self {
            walking: WalkingConfig {
                max_acceleration: 3200.0,
                ..default()
            },
            falling: FallingConfig {
                air_control: 0.75,
                ..default()
            },
            ..default()
        }
    }

    /// Create a config for AI-controlled characters.
    pub fn ai() -> Self {
        Self {
            walking: WalkingConfig {
                max_speed: 450.0,
                max_acceleration: 1600.0,
                ..default()
            },
            falling: FallingConfig {
                air_control: 0.3,
                ..default()
            },
            jumping: JumpingConfig {
                double_jump_enabled: false,
                ..default()
            },
            anchor: AnchorConfig {
                auto_mantle: false,
                ..default()
            },
            ..default()
        }
    }

    /// Parse a config from RON text and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON config file.
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text).inspect_err(|err| {
            warn!("movement config {} rejected: {err}", path.as_ref().display());
        })
    }

    /// Check that every value is physically meaningful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")))
            }
        }

        positive("integration.timestep", self.integration.timestep)?;
        positive("walking.max_speed", self.walking.max_speed)?;
        positive("walking.max_acceleration", self.walking.max_acceleration)?;
        positive("floor.snap_distance", self.floor.snap_distance)?;
        positive("recovery.recovery_time", self.recovery.recovery_time)?;
        positive("anchor.snap_speed", self.anchor.snap_speed)?;

        if self.integration.max_substeps == 0 {
            return Err(ConfigError::Invalid(
                "integration.max_substeps must be at least 1".into(),
            ));
        }
        if self.floor.num_tries == 0 {
            return Err(ConfigError::Invalid(
                "floor.num_tries must be at least 1".into(),
            ));
        }
        if !(0.0..90.0).contains(&self.floor.max_incline_degrees) {
            return Err(ConfigError::Invalid(format!(
                "floor.max_incline_degrees must be in 0..90, got {}",
                self.floor.max_incline_degrees
            )));
        }
        if !(0.0..=1.0).contains(&self.falling.air_control) {
            return Err(ConfigError::Invalid(format!(
                "falling.air_control must be in 0..=1, got {}",
                self.falling.air_control
            )));
        }
        Ok(())
    }

    /// Builder: set max walking speed.
    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.walking.max_speed = max_speed;
        self
    }

    /// Builder: set walking speed and acceleration.
    pub fn with_movement(mut self, max_speed: f32, max_acceleration: f32) -> Self {
        self.walking.max_speed = max_speed;
        self.walking.max_acceleration = max_acceleration;
        self
    }

    /// Builder: set the steepest walkable incline in degrees.
    pub fn with_max_incline(mut self, degrees: f32) -> Self {
        self.floor.max_incline_degrees = degrees;
        self
    }

    /// Builder: set the ground jump velocity.
    pub fn with_jump_velocity(mut self, velocity: f32) -> Self {
        self.jumping.jump_velocity = velocity;
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.jumping.coyote_time = time;
        self
    }

    /// Builder: set the kill height.
    pub fn with_kill_height(mut self, height: f32) -> Self {
        self.recovery.kill_height = height;
        self
    }

    /// Builder: set recovery flight time and levitation height.
    pub fn with_recovery(mut self, time: f32, levitation_height: f32) -> Self {
        self.recovery.recovery_time = time;
        self.recovery.levitation_height = levitation_height;
        self
    }

    /// Builder: set the simulation timestep.
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.integration.timestep = timestep;
        self
    }

    /// Builder: set the collision substep budget.
    pub fn with_max_substeps(mut self, substeps: u32) -> Self {
        self.integration.max_substeps = substeps;
        self
    }

    /// Builder: enable or disable automatic mantling.
    pub fn with_auto_mantle(mut self, enabled: bool) -> Self {
        self.anchor.auto_mantle = enabled;
        self
    }
}
