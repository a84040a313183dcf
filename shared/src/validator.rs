//! Sanity checks applied to physics state every tick.
//!
//! Positions must stay strictly inside the world box and velocities strictly
//! below [`MAX_VELOCITY`]. The clamp functions repair bad state in place and
//! report whether anything had to change.

use crate::vec2::Vec2;
use log::warn;

pub const MAX_WORLD_COORD: f32 = 10_000.0;
pub const MIN_WORLD_COORD: f32 = -10_000.0;
pub const MAX_VELOCITY: f32 = 5_000.0;

pub fn is_position_valid(pos: Vec2) -> bool {
    pos.is_finite()
        && pos.x > MIN_WORLD_COORD
        && pos.x < MAX_WORLD_COORD
        && pos.y > MIN_WORLD_COORD
        && pos.y < MAX_WORLD_COORD
}

pub fn is_velocity_valid(vel: Vec2) -> bool {
    vel.is_finite() && vel.length() < MAX_VELOCITY
}

/// Replaces a non-finite position with `fallback` and clamps each axis to
/// the world bounds. Returns true if the position was modified.
pub fn validate_and_clamp_position(pos: &mut Vec2, fallback: Vec2) -> bool {
    if !pos.is_finite() {
        warn!("Non-finite position detected, resetting to {:?}", fallback);
        *pos = fallback;
        return true;
    }

    let mut clamped = false;
    if pos.x < MIN_WORLD_COORD {
        pos.x = MIN_WORLD_COORD;
        clamped = true;
    }
    if pos.x > MAX_WORLD_COORD {
        pos.x = MAX_WORLD_COORD;
        clamped = true;
    }
    if pos.y < MIN_WORLD_COORD {
        pos.y = MIN_WORLD_COORD;
        clamped = true;
    }
    if pos.y > MAX_WORLD_COORD {
        pos.y = MAX_WORLD_COORD;
        clamped = true;
    }
    clamped
}

/// Zeroes a non-finite velocity and scales an oversized one down to
/// [`MAX_VELOCITY`]. Returns true if the velocity was modified.
pub fn validate_and_clamp_velocity(vel: &mut Vec2) -> bool {
    if !vel.is_finite() {
        warn!("Non-finite velocity detected, resetting to zero");
        *vel = Vec2::ZERO;
        return true;
    }

    let magnitude = vel.length();
    if magnitude > MAX_VELOCITY {
        *vel *= MAX_VELOCITY / magnitude;
        // Rounding can leave the length a hair above the cap.
        if vel.length() > MAX_VELOCITY {
            *vel *= 1.0 - 1e-6;
        }
        return true;
    }
    false
}
