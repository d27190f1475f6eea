//! Small vector and angle helpers shared by the movement modules.
//!
//! The crate uses Bevy's convention of +Y as the up axis. Yaw is measured in
//! radians around +Y, with a yaw of zero facing -Z.

use bevy::prelude::*;

/// World up axis.
pub const UP: Vec3 = Vec3::Y;

/// Threshold below which lengths, speeds and times are treated as zero.
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// Threshold for squared lengths and divisors.
pub const SMALL_NUMBER: f32 = 1.0e-8;

/// `v` with its up component removed.
#[inline]
pub fn planar(v: Vec3) -> Vec3 {
    v - UP * v.dot(UP)
}

/// `v` with the component along `normal` removed. `normal` must be unit length.
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v - normal * v.dot(normal)
}

/// Divide, returning zero when the divisor is too small to be meaningful.
#[inline]
pub fn safe_div(numerator: Vec3, divisor: f32) -> Vec3 {
    if divisor.abs() <= SMALL_NUMBER {
        Vec3::ZERO
    } else {
        numerator / divisor
    }
}

/// Move `current` toward `target` by at most `max_delta`.
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= KINDA_SMALL_NUMBER {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Yaw (radians around +Y) that faces along `direction`'s planar component.
///
/// Returns `None` when the direction has no planar extent.
pub fn yaw_of(direction: Vec3) -> Option<f32> {
    let flat = planar(direction);
    if flat.length_squared() <= SMALL_NUMBER {
        return None;
    }
    Some((-flat.x).atan2(-flat.z))
}

/// Unit planar forward vector for a yaw.
#[inline]
pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Quat::from_rotation_y(yaw) * Vec3::NEG_Z
}

/// Wrap an angle into `[-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU);
    wrapped - std::f32::consts::PI
}

/// Rotate `current` toward `target` at a constant angular rate (radians/second),
/// taking the short way around.
pub fn interp_yaw_constant(current: f32, target: f32, dt: f32, rate: f32) -> f32 {
    let delta = wrap_angle(target - current);
    let max_step = (rate * dt).max(0.0);
    if delta.abs() <= max_step {
        wrap_angle(target)
    } else {
        wrap_angle(current + delta.signum() * max_step)
    }
}

/// Yaw component of a rotation.
pub fn yaw_of_rotation(rotation: Quat) -> f32 {
    yaw_of(rotation * Vec3::NEG_Z).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn yaw_roundtrips_through_forward() {
        for yaw in [0.0, 0.5, FRAC_PI_2, -2.0, 3.0] {
            let forward = forward_from_yaw(yaw);
            let back = yaw_of(forward).unwrap();
            assert!(wrap_angle(back - yaw).abs() < 1.0e-5);
        }
    }

    #[test]
    fn yaw_zero_faces_negative_z() {
        assert!((forward_from_yaw(0.0) - Vec3::NEG_Z).length() < 1.0e-6);
        assert_eq!(yaw_of(Vec3::Y), None);
    }

    #[test]
    fn interp_takes_short_way() {
        // From just below PI to just above -PI is a tiny step, not a full turn.
        let next = interp_yaw_constant(PI - 0.1, -PI + 0.1, 1.0, 1.0);
        assert!((wrap_angle(next - (-PI + 0.1))).abs() < 1.0e-5);
    }

    #[test]
    fn interp_is_rate_limited() {
        let next = interp_yaw_constant(0.0, 2.0, 0.5, 1.0);
        assert!((next - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn move_towards_stops_at_target() {
        let v = move_towards(Vec3::ZERO, Vec3::X * 3.0, 10.0);
        assert_eq!(v, Vec3::X * 3.0);
        let v = move_towards(Vec3::ZERO, Vec3::X * 3.0, 1.0);
        assert!((v - Vec3::X).length() < 1.0e-6);
    }

    #[test]
    fn safe_div_guards_zero() {
        assert_eq!(safe_div(Vec3::ONE, 0.0), Vec3::ZERO);
        assert_eq!(safe_div(Vec3::ONE * 2.0, 2.0), Vec3::ONE);
    }
}
