//! Keyboard input mapped onto the shared [`Controller`] interface

use macroquad::prelude::*;
use shared::{Controller, ControllerView, Vec2};

/// Human player: WASD or arrow keys
#[derive(Debug, Default)]
pub struct KeyboardController {
    prev_key_r: bool,
    prev_key_tab: bool,
}

/// One-shot actions detected on key press
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvents {
    pub reconnect: bool,
    pub toggle_autopilot: bool,
}

impl KeyboardController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples control keys, reporting presses (current && !previous)
    pub fn poll_controls(&mut self) -> ControlEvents {
        let key_r = is_key_down(KeyCode::R);
        let key_tab = is_key_down(KeyCode::Tab);

        let events = ControlEvents {
            reconnect: key_r && !self.prev_key_r,
            toggle_autopilot: key_tab && !self.prev_key_tab,
        };

        self.prev_key_r = key_r;
        self.prev_key_tab = key_tab;
        events
    }
}

impl Controller for KeyboardController {
    fn movement_direction(&mut self, _view: &ControllerView<'_>) -> Vec2 {
        let up = is_key_down(KeyCode::W) || is_key_down(KeyCode::Up);
        let down = is_key_down(KeyCode::S) || is_key_down(KeyCode::Down);
        let left = is_key_down(KeyCode::A) || is_key_down(KeyCode::Left);
        let right = is_key_down(KeyCode::D) || is_key_down(KeyCode::Right);
        direction_from_keys(up, down, left, right)
    }
}

/// Screen coordinates: y grows downwards. Opposing keys cancel.
pub fn direction_from_keys(up: bool, down: bool, left: bool, right: bool) -> Vec2 {
    let axis = |neg: bool, pos: bool| match (neg, pos) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    };
    Vec2::new(axis(left, right), axis(up, down)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_single_keys() {
        assert_eq!(direction_from_keys(true, false, false, false), Vec2::new(0.0, -1.0));
        assert_eq!(direction_from_keys(false, true, false, false), Vec2::new(0.0, 1.0));
        assert_eq!(direction_from_keys(false, false, true, false), Vec2::new(-1.0, 0.0));
        assert_eq!(direction_from_keys(false, false, false, true), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let dir = direction_from_keys(true, false, false, true);
        assert_approx_eq!(dir.length(), 1.0, 1e-5);
        assert!(dir.x > 0.0 && dir.y < 0.0);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        assert_eq!(direction_from_keys(true, true, true, true), Vec2::ZERO);
        assert_eq!(direction_from_keys(false, false, false, false), Vec2::ZERO);
    }
}
