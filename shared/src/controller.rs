//! Movement controllers: anything that can steer a ball.
//!
//! Human input and AI policies both implement [`Controller`]; the server and
//! clients only ever ask for a direction and feed it to the simulation or the
//! network.

use crate::vec2::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Difficulty presets handed to bots in turn when none is configured.
pub const AI_DIFFICULTY_LEVELS: [f32; 5] = [0.5, 0.55, 0.6, 0.65, 0.7];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opponent {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Everything a controller may look at when choosing a direction.
#[derive(Debug, Clone, Copy)]
pub struct ControllerView<'a> {
    pub dt: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub opponents: &'a [Opponent],
    pub arena_center: Vec2,
    pub arena_radius: f32,
    pub arena_age: f32,
}

/// Anything that can steer a ball: keyboard, AI or a scripted driver.
pub trait Controller {
    /// Returns a unit vector or zero.
    fn movement_direction(&mut self, view: &ControllerView<'_>) -> Vec2;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiTuning {
    pub burst_min_delay: f32,
    pub burst_max_delay: f32,
    pub burst_duration: f32,
    /// Distance from the edge that triggers recovery.
    pub edge_margin: f32,
    /// Seconds of velocity used to predict positions.
    pub lookahead: f32,
    pub decision_min_interval: f32,
    pub decision_max_interval: f32,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            burst_min_delay: 6.0,
            burst_max_delay: 14.0,
            burst_duration: 5.0,
            edge_margin: 90.0,
            lookahead: 0.25,
            decision_min_interval: 0.08,
            decision_max_interval: 0.22,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    Recover,
    Hunt,
    Wander,
}

/// Heuristic opponent. All randomness comes from the seeded generator, so
/// the same seed and the same sequence of views yield the same directions.
pub struct AiController {
    rng: StdRng,
    difficulty: f32,
    tuning: AiTuning,
    mode: AiMode,
    direction: Vec2,
    decision_timer: f32,
    burst_cooldown: f32,
    burst_remaining: f32,
    wander_target: Vec2,
}

impl AiController {
    /// Default tuning; `difficulty` is clamped to `0..=1`.
    pub fn new(seed: u64, difficulty: f32) -> Self {
        Self::with_tuning(seed, difficulty, AiTuning::default())
    }

    /// Custom timings, mostly for tests.
    pub fn with_tuning(seed: u64, difficulty: f32, tuning: AiTuning) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let burst_cooldown = rng.gen_range(tuning.burst_min_delay..=tuning.burst_max_delay);
        Self {
            rng,
            difficulty: difficulty.clamp(0.0, 1.0),
            tuning,
            mode: AiMode::Wander,
            direction: Vec2::ZERO,
            decision_timer: 0.0,
            burst_cooldown,
            burst_remaining: 0.0,
            wander_target: Vec2::ZERO,
        }
    }

    pub fn difficulty(&self) -> f32 {
        self.difficulty
    }

    /// Behaviour chosen at the last decision.
    pub fn mode(&self) -> AiMode {
        self.mode
    }

    /// True during an aggression burst.
    pub fn is_bursting(&self) -> bool {
        self.burst_remaining > 0.0
    }

    fn update_burst(&mut self, dt: f32) {
        if self.burst_remaining > 0.0 {
            self.burst_remaining -= dt;
            return;
        }
        self.burst_cooldown -= dt;
        if self.burst_cooldown <= 0.0 {
            self.burst_remaining = self.tuning.burst_duration;
            self.burst_cooldown = self
                .rng
                .gen_range(self.tuning.burst_min_delay..=self.tuning.burst_max_delay);
        }
    }

    fn in_danger(&self, view: &ControllerView<'_>) -> bool {
        let outward = (view.position - view.arena_center).normalize();
        let distance = view.position.distance(view.arena_center);
        let outward_speed = view.velocity.dot(outward).max(0.0);
        let edge = view.arena_radius - distance - outward_speed * self.tuning.lookahead;
        edge < self.tuning.edge_margin
    }

    fn recover(&self, view: &ControllerView<'_>) -> Vec2 {
        let predicted = view.position + view.velocity * self.tuning.lookahead;
        (view.arena_center - predicted).normalize()
    }

    /// Picks the opponent that is closest to the edge relative to its distance
    /// from us and steers to hit it from the center side.
    fn hunt(&self, view: &ControllerView<'_>) -> Option<Vec2> {
        let radius = view.arena_radius.max(1.0);
        let target = view
            .opponents
            .iter()
            .map(|o| {
                let edge_pressure = o.position.distance(view.arena_center) / radius;
                let reach = o.position.distance(view.position) / (2.0 * radius);
                (o, edge_pressure - reach)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(o, _)| *o)?;

        let predicted = target.position + target.velocity * self.tuning.lookahead;
        let approach = (predicted - view.position).normalize();
        let outward = (predicted - view.arena_center).normalize();
        Some((approach + outward * 0.5).normalize())
    }

    fn wander(&mut self, view: &ControllerView<'_>) -> Vec2 {
        let arrived = view.position.distance(self.wander_target) < 40.0;
        if arrived || self.wander_target == Vec2::ZERO {
            let angle = self.rng.gen_range(0.0..2.0 * PI);
            let reach = self.rng.gen_range(0.0..0.4) * view.arena_radius;
            self.wander_target = view.arena_center + Vec2::from_angle(angle) * reach;
        }
        (self.wander_target - view.position).normalize()
    }

    fn jitter(&mut self, direction: Vec2) -> Vec2 {
        let chance = (1.0 - self.difficulty) * 0.5;
        if chance <= 0.0 || self.rng.gen::<f32>() >= chance {
            return direction;
        }
        let angle = self.rng.gen_range(-0.6..0.6_f32);
        let (sin, cos) = angle.sin_cos();
        Vec2::new(
            direction.x * cos - direction.y * sin,
            direction.x * sin + direction.y * cos,
        )
        .normalize()
    }
}

impl Controller for AiController {
    fn movement_direction(&mut self, view: &ControllerView<'_>) -> Vec2 {
        self.update_burst(view.dt);

        // Edge recovery overrides the decision cadence.
        if self.in_danger(view) {
            self.mode = AiMode::Recover;
            self.direction = self.recover(view);
            return self.direction;
        }

        self.decision_timer -= view.dt;
        if self.decision_timer > 0.0 && self.mode != AiMode::Recover {
            return self.direction;
        }
        let interval = self
            .rng
            .gen_range(self.tuning.decision_min_interval..=self.tuning.decision_max_interval);
        self.decision_timer = interval * (1.5 - self.difficulty);

        let aggressive = self.is_bursting() || self.rng.gen::<f32>() < self.difficulty;
        let hunted = if aggressive { self.hunt(view) } else { None };

        let direction = match hunted {
            Some(direction) => {
                self.mode = AiMode::Hunt;
                direction
            }
            None => {
                self.mode = AiMode::Wander;
                self.wander(view)
            }
        };

        self.direction = if self.is_bursting() {
            direction
        } else {
            self.jitter(direction)
        };
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const CENTER: Vec2 = Vec2::new(600.0, 450.0);

    fn view<'a>(position: Vec2, velocity: Vec2, opponents: &'a [Opponent]) -> ControllerView<'a> {
        ControllerView {
            dt: 1.0 / 60.0,
            position,
            velocity,
            opponents,
            arena_center: CENTER,
            arena_radius: 650.0,
            arena_age: 0.0,
        }
    }

    #[test]
    fn test_same_seed_same_directions() {
        let opponents = [
            Opponent {
                position: Vec2::new(800.0, 450.0),
                velocity: Vec2::new(10.0, 0.0),
            },
            Opponent {
                position: Vec2::new(500.0, 300.0),
                velocity: Vec2::ZERO,
            },
        ];
        let mut a = AiController::new(42, 0.6);
        let mut b = AiController::new(42, 0.6);
        for step in 0..600 {
            let pos = CENTER + Vec2::new(step as f32 * 0.3, 0.0);
            let v = view(pos, Vec2::new(20.0, 5.0), &opponents);
            assert_eq!(a.movement_direction(&v), b.movement_direction(&v));
        }
    }

    #[test]
    fn test_directions_are_unit_or_zero() {
        let opponents = [Opponent {
            position: Vec2::new(700.0, 500.0),
            velocity: Vec2::new(-30.0, 0.0),
        }];
        let mut ai = AiController::new(7, 0.5);
        for step in 0..300 {
            let pos = CENTER + Vec2::from_angle(step as f32 * 0.1) * 200.0;
            let dir = ai.movement_direction(&view(pos, Vec2::ZERO, &opponents));
            let len = dir.length();
            assert!(len == 0.0 || (len - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_recovers_near_edge() {
        let mut ai = AiController::new(1, 0.5);
        let pos = CENTER + Vec2::new(620.0, 0.0);
        let dir = ai.movement_direction(&view(pos, Vec2::new(100.0, 0.0), &[]));
        assert_eq!(ai.mode(), AiMode::Recover);
        assert!(dir.x < 0.0);
        assert_approx_eq!(dir.length(), 1.0, 1e-3);
    }

    #[test]
    fn test_hunts_nearby_opponent() {
        let opponents = [Opponent {
            position: Vec2::new(700.0, 450.0),
            velocity: Vec2::ZERO,
        }];
        let mut ai = AiController::new(3, 1.0);
        let dir = ai.movement_direction(&view(CENTER, Vec2::ZERO, &opponents));
        assert_eq!(ai.mode(), AiMode::Hunt);
        assert_approx_eq!(dir.x, 1.0, 1e-3);
        assert_approx_eq!(dir.y, 0.0, 1e-3);
    }

    #[test]
    fn test_wanders_without_opponents() {
        let mut ai = AiController::new(9, 1.0);
        let dir = ai.movement_direction(&view(CENTER + Vec2::new(300.0, 0.0), Vec2::ZERO, &[]));
        assert_eq!(ai.mode(), AiMode::Wander);
        // Wander targets sit inside 40% of the radius, so we head inward.
        assert!(dir.x < 0.0);
    }

    #[test]
    fn test_burst_starts_within_max_delay() {
        let mut ai = AiController::new(11, 0.5);
        let dt = 0.1;
        let mut saw_burst = false;
        for _ in 0..150 {
            ai.movement_direction(&ControllerView {
                dt,
                ..view(CENTER, Vec2::ZERO, &[])
            });
            saw_burst |= ai.is_bursting();
        }
        assert!(saw_burst);
    }

    #[test]
    fn test_difficulty_is_clamped() {
        assert_eq!(AiController::new(0, 3.0).difficulty(), 1.0);
        assert_eq!(AiController::new(0, -1.0).difficulty(), 0.0);
    }
}
