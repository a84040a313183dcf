//! Authoritative fixed-step arena physics.
//!
//! The simulation owns every [`SimPlayer`] in one circular arena. Each call to
//! [`Simulation::tick`] integrates movement for alive players, repairs invalid
//! state through the validator, eliminates players that left the shrinking
//! arena and finally resolves ball-to-ball collisions. Arena shrink is
//! advanced separately through [`Simulation::update_arena_shrink`] so callers
//! control the match clock.
//!
//! Players live in a `BTreeMap`, so iteration (and therefore collision order)
//! is by ascending id. Two instances fed the same calls produce identical
//! state.

use crate::validator;
use crate::vec2::Vec2;
use log::warn;
use std::collections::BTreeMap;

pub const DEFAULT_ARENA_CENTER: Vec2 = Vec2::new(600.0, 450.0);
pub const DEFAULT_ARENA_RADIUS: f32 = 650.0;

/// Tunable physics constants. `Default` yields the canonical tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub arena_center: Vec2,
    pub arena_radius: f32,
    /// Floor for the shrinking radius.
    pub min_arena_radius: f32,
    /// Seconds of arena age before shrinking begins.
    pub shrink_start_time: f32,
    /// Radius lost per second once shrinking.
    pub shrink_rate: f32,
    pub speed: f32,
    pub acceleration: f32,
    pub friction: f32,
    pub max_speed: f32,
    pub player_radius: f32,
    pub restitution: f32,
    pub impulse_boost: f32,
    /// Fraction of the overlap each ball is pushed back along the normal.
    pub separation_factor: f32,
    /// Constant added to every separation push so touching balls come apart.
    pub separation_bias: f32,
    /// Fraction of the player radius allowed past the edge before elimination.
    pub death_margin_factor: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arena_center: DEFAULT_ARENA_CENTER,
            arena_radius: DEFAULT_ARENA_RADIUS,
            min_arena_radius: 10.0,
            shrink_start_time: 3.0,
            shrink_rate: 7.0,
            speed: 180.0,
            acceleration: 36.0,
            friction: 0.0015,
            max_speed: 620.0,
            player_radius: 38.0,
            restitution: 2.15,
            impulse_boost: 1.25,
            separation_factor: 0.6,
            separation_bias: 4.5,
            death_margin_factor: 0.35,
        }
    }
}

impl SimulationConfig {
    /// Arena radius after `age` seconds. Pure in `age` so replays agree.
    pub fn radius_at(&self, age: f32) -> f32 {
        if age < self.shrink_start_time {
            return self.arena_radius;
        }
        let shrunk = self.arena_radius - self.shrink_rate * (age - self.shrink_start_time);
        shrunk.max(self.min_arena_radius.min(self.arena_radius))
    }

    /// Distance from the center beyond which a player is eliminated.
    pub fn death_distance(&self, current_radius: f32) -> f32 {
        current_radius + self.player_radius * self.death_margin_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPlayer {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Unit length or zero.
    pub input_direction: Vec2,
    pub alive: bool,
}

impl SimPlayer {
    fn spawned(id: u32, position: Vec2) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            input_direction: Vec2::ZERO,
            alive: true,
        }
    }
}

/// Read-only view handed to renderers and the snapshot encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub alive: bool,
}

/// Authoritative world: players keyed by id plus the shrinking arena.
pub struct Simulation {
    config: SimulationConfig,
    players: BTreeMap<u32, SimPlayer>,
    arena_age: f32,
    current_arena_radius: f32,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let current_arena_radius = config.arena_radius;
        Self {
            config,
            players: BTreeMap::new(),
            arena_age: 0.0,
            current_arena_radius,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Inserts a fresh player, overwriting any existing one with the same id.
    pub fn add_player(&mut self, id: u32, spawn_position: Vec2) {
        self.players.insert(id, SimPlayer::spawned(id, spawn_position));
    }

    /// Returns false if the id was unknown.
    pub fn remove_player(&mut self, id: u32) -> bool {
        self.players.remove(&id).is_some()
    }

    /// Stores the normalized direction for the next ticks. Unknown ids are
    /// ignored; non-finite directions become zero.
    pub fn apply_input(&mut self, id: u32, direction: Vec2) {
        if let Some(player) = self.players.get_mut(&id) {
            player.input_direction = direction.normalize();
        }
    }

    /// Puts an existing player back into play at `position` with no motion.
    pub fn respawn_player(&mut self, id: u32, position: Vec2) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                *player = SimPlayer::spawned(id, position);
                true
            }
            None => false,
        }
    }

    /// Ages the arena by `dt` and recomputes its radius.
    pub fn update_arena_shrink(&mut self, dt: f32) {
        self.arena_age += dt;
        self.current_arena_radius = self.config.radius_at(self.arena_age);
    }

    /// Restarts the arena clock at full radius.
    pub fn reset_arena(&mut self) {
        self.arena_age = 0.0;
        self.current_arena_radius = self.config.arena_radius;
    }

    /// Changes the initial radius, keeping the current age.
    pub fn set_arena_radius(&mut self, radius: f32) {
        self.config.arena_radius = radius;
        self.current_arena_radius = self.config.radius_at(self.arena_age);
    }

    /// Initial radius, before any shrink.
    pub fn arena_radius(&self) -> f32 {
        self.config.arena_radius
    }

    /// Radius after shrinking.
    pub fn current_arena_radius(&self) -> f32 {
        self.current_arena_radius
    }

    pub fn arena_age(&self) -> f32 {
        self.arena_age
    }

    pub fn arena_center(&self) -> Vec2 {
        self.config.arena_center
    }

    /// Integrates every alive player, eliminates those past the death distance, then resolves collisions.
    pub fn tick(&mut self, dt: f32) {
        let cfg = &self.config;
        let thrust = cfg.speed * cfg.acceleration * dt;
        let death_distance = cfg.death_distance(self.current_arena_radius);

        for player in self.players.values_mut().filter(|p| p.alive) {
            player.velocity += player.input_direction * thrust;
            player.velocity *= 1.0 - cfg.friction;

            let speed = player.velocity.length();
            if speed > cfg.max_speed {
                player.velocity *= cfg.max_speed / speed;
            }

            player.position += player.velocity * dt;

            validator::validate_and_clamp_position(&mut player.position, cfg.arena_center);
            validator::validate_and_clamp_velocity(&mut player.velocity);

            if player.position.distance(cfg.arena_center) > death_distance {
                player.alive = false;
                player.velocity = Vec2::ZERO;
            }
        }

        self.resolve_collisions();
    }

    /// Separates overlapping alive pairs and exchanges normal velocity with
    /// restitution, keeping the tangential component.
    pub fn resolve_collisions(&mut self) {
        let cfg = &self.config;
        let min_dist = cfg.player_radius * 2.0;
        let min_dist_sq = min_dist * min_dist;
        let ids: Vec<u32> = self.players.keys().copied().collect();

        for (i, &id_a) in ids.iter().enumerate() {
            for &id_b in &ids[i + 1..] {
                let (Some(&a), Some(&b)) = (self.players.get(&id_a), self.players.get(&id_b))
                else {
                    continue;
                };
                if !a.alive || !b.alive {
                    continue;
                }

                let delta = b.position - a.position;
                let dist_sq = delta.length_squared();
                if dist_sq >= min_dist_sq || dist_sq <= 1e-6 {
                    continue;
                }

                let dist = dist_sq.sqrt();
                let normal = delta / dist;
                let tangent = normal.perp();
                let push = (min_dist - dist) * cfg.separation_factor + cfg.separation_bias;

                let mut a = a;
                let mut b = b;
                a.position -= normal * push;
                b.position += normal * push;

                let va_n = a.velocity.dot(normal);
                let vb_n = b.velocity.dot(normal);
                if va_n - vb_n > 0.0 {
                    let va_t = a.velocity.dot(tangent);
                    let vb_t = b.velocity.dot(tangent);
                    let e = cfg.restitution;
                    let new_va_n = ((va_n + vb_n) + e * (vb_n - va_n)) * 0.5;
                    let new_vb_n = ((va_n + vb_n) + e * (va_n - vb_n)) * 0.5;
                    let new_va = normal * new_va_n + tangent * va_t;
                    let new_vb = normal * new_vb_n + tangent * vb_t;

                    let impulse_a = (new_va - a.velocity) * cfg.impulse_boost;
                    let impulse_b = (new_vb - b.velocity) * cfg.impulse_boost;
                    if validator::is_velocity_valid(impulse_a)
                        && validator::is_velocity_valid(impulse_b)
                    {
                        a.velocity += impulse_a;
                        b.velocity += impulse_b;
                    } else {
                        warn!(
                            "Invalid collision impulse between players {} and {}, skipping",
                            id_a, id_b
                        );
                    }
                }

                self.players.insert(id_a, a);
                self.players.insert(id_b, b);
            }
        }
    }

    /// Every player, alive or not, in id order.
    pub fn snapshot_players(&self) -> Vec<PlayerSnapshot> {
        self.players
            .values()
            .map(|p| PlayerSnapshot {
                id: p.id,
                position: p.position,
                velocity: p.velocity,
                alive: p.alive,
            })
            .collect()
    }

    pub fn player(&self, id: u32) -> Option<&SimPlayer> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players still in the arena.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// The single remaining alive player, if exactly one is left.
    pub fn sole_survivor(&self) -> Option<u32> {
        let mut alive = self.players.values().filter(|p| p.alive);
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(p.id),
            _ => None,
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
