//! Authoritative match state: the simulation plus bots, the tick counter,
//! snapshot pacing and round restarts.

use crate::config::ServerConfig;
use log::{info, warn};
use shared::controller::{AiController, Controller, ControllerView, Opponent};
use shared::protocol::{PlayerState, StateSnapshot};
use shared::{Simulation, Vec2};
use std::f32::consts::TAU;

struct Bot {
    player_id: u32,
    controller: AiController,
}

pub struct GameState {
    pub tick: u32,
    simulation: Simulation,
    bots: Vec<Bot>,
    /// Ring slot owners, indexed by slot. A slot is held until its player leaves.
    spawn_slots: Vec<Option<u32>>,
    spawn_radius: f32,
    snapshot_interval: f32,
    snapshot_timer: f32,
    round_restart_delay: Option<f32>,
    /// Seconds left before the finished round restarts.
    round_over: Option<f32>,
    rounds_completed: u32,
}

impl GameState {
    /// Empty match sized for `max_clients + bots` ring slots.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            tick: 0,
            simulation: Simulation::new(config.simulation.clone()),
            bots: Vec::new(),
            spawn_slots: vec![None; config.total_players().max(1)],
            spawn_radius: config.spawn_radius(),
            snapshot_interval: config.snapshot_interval.as_secs_f32(),
            snapshot_timer: 0.0,
            round_restart_delay: config.round_restart_delay.map(|d| d.as_secs_f32()),
            round_over: None,
            rounds_completed: 0,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Ring position of the slot held by `player_id`, if it holds one.
    pub fn spawn_position(&self, player_id: u32) -> Option<Vec2> {
        self.slot_of(player_id).map(|slot| self.slot_position(slot))
    }

    fn slot_of(&self, player_id: u32) -> Option<usize> {
        self.spawn_slots
            .iter()
            .position(|owner| *owner == Some(player_id))
    }

    fn slot_position(&self, slot: usize) -> Vec2 {
        let angle = slot as f32 / self.spawn_slots.len() as f32 * TAU;
        self.simulation.arena_center() + Vec2::from_angle(angle) * self.spawn_radius
    }

    /// First free slot, growing the ring if every slot is taken.
    fn claim_slot(&mut self, player_id: u32) -> usize {
        if let Some(slot) = self.slot_of(player_id) {
            return slot;
        }
        match self.spawn_slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.spawn_slots[slot] = Some(player_id);
                slot
            }
            None => {
                warn!("Spawn ring full, adding a slot for player {}", player_id);
                self.spawn_slots.push(Some(player_id));
                self.spawn_slots.len() - 1
            }
        }
    }

    /// Spawns `player_id` on the first free ring slot.
    pub fn add_player(&mut self, player_id: u32) -> Vec2 {
        let slot = self.claim_slot(player_id);
        let spawn = self.slot_position(slot);
        self.simulation.add_player(player_id, spawn);
        info!(
            "Added player {} in slot {} at ({:.1}, {:.1})",
            player_id, slot, spawn.x, spawn.y
        );
        spawn
    }

    /// Adds a player steered by an `AiController`.
    pub fn add_bot(&mut self, player_id: u32, seed: u64, difficulty: f32) {
        self.add_player(player_id);
        self.bots.push(Bot {
            player_id,
            controller: AiController::new(seed, difficulty),
        });
    }

    /// Removes the player, its bot controller and its ring slot.
    pub fn remove_player(&mut self, player_id: u32) -> bool {
        self.bots.retain(|bot| bot.player_id != player_id);
        if let Some(slot) = self.slot_of(player_id) {
            self.spawn_slots[slot] = None;
        }
        let removed = self.simulation.remove_player(player_id);
        if removed {
            info!("Removed player {}", player_id);
        }
        removed
    }

    pub fn apply_input(&mut self, player_id: u32, direction: Vec2) {
        self.simulation.apply_input(player_id, direction);
    }

    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    pub fn player_count(&self) -> usize {
        self.simulation.player_count()
    }

    /// Rounds finished and restarted so far.
    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn is_round_over(&self) -> bool {
        self.round_over.is_some()
    }

    /// Advances the match by one fixed tick.
    pub fn step(&mut self, dt: f32) {
        self.drive_bots(dt);
        self.simulation.update_arena_shrink(dt);
        self.simulation.tick(dt);
        self.tick = self.tick.wrapping_add(1);
        self.snapshot_timer += dt;
        self.update_round(dt);
    }

    /// True once per snapshot interval of simulated time.
    pub fn snapshot_due(&mut self) -> bool {
        if self.snapshot_timer >= self.snapshot_interval {
            // Keeps the remainder; a backlog of whole intervals collapses to one.
            self.snapshot_timer =
                (self.snapshot_timer - self.snapshot_interval) % self.snapshot_interval;
            true
        } else {
            false
        }
    }

    /// Full state for broadcast, with the current arena radius.
    pub fn build_snapshot(&self, server_time_ms: u32) -> StateSnapshot {
        StateSnapshot {
            tick: self.tick,
            server_time_ms,
            arena_radius: self.simulation.current_arena_radius(),
            players: self
                .simulation
                .snapshot_players()
                .into_iter()
                .map(|p| PlayerState {
                    player_id: p.id,
                    x: p.position.x,
                    y: p.position.y,
                    vx: p.velocity.x,
                    vy: p.velocity.y,
                    alive: p.alive,
                })
                .collect(),
        }
    }

    fn drive_bots(&mut self, dt: f32) {
        if self.bots.is_empty() {
            return;
        }
        let players = self.simulation.snapshot_players();
        let center = self.simulation.arena_center();
        let radius = self.simulation.current_arena_radius();
        let age = self.simulation.arena_age();

        for bot in &mut self.bots {
            let Some(me) = players.iter().find(|p| p.id == bot.player_id) else {
                continue;
            };
            if !me.alive {
                continue;
            }
            let opponents: Vec<Opponent> = players
                .iter()
                .filter(|p| p.alive && p.id != bot.player_id)
                .map(|p| Opponent {
                    position: p.position,
                    velocity: p.velocity,
                })
                .collect();
            let view = ControllerView {
                dt,
                position: me.position,
                velocity: me.velocity,
                opponents: &opponents,
                arena_center: center,
                arena_radius: radius,
                arena_age: age,
            };
            let direction = bot.controller.movement_direction(&view);
            self.simulation.apply_input(bot.player_id, direction);
        }
    }

    fn update_round(&mut self, dt: f32) {
        if self.simulation.player_count() < 2 || self.simulation.alive_count() > 1 {
            self.round_over = None;
            return;
        }

        match self.round_over {
            None => {
                match self.simulation.sole_survivor() {
                    Some(winner) => info!("Player {} wins the round", winner),
                    None => info!("Round over with no survivors"),
                }
                self.round_over = Some(self.round_restart_delay.unwrap_or(f32::INFINITY));
            }
            Some(remaining) if remaining - dt <= 0.0 => self.restart_round(),
            Some(remaining) => self.round_over = Some(remaining - dt),
        }
    }

    fn restart_round(&mut self) {
        self.simulation.reset_arena();
        let ids: Vec<u32> = self
            .simulation
            .snapshot_players()
            .iter()
            .map(|p| p.id)
            .collect();
        for id in ids {
            let slot = self.claim_slot(id);
            let spawn = self.slot_position(slot);
            self.simulation.respawn_player(id, spawn);
        }
        self.round_over = None;
        self.rounds_completed += 1;
        info!(
            "Round {} starting with {} players",
            self.rounds_completed + 1,
            self.simulation.player_count()
        );
    }
}
