//! Client-side replica of the server's players.
//!
//! Snapshots set per-player targets; [`ReplicaWorld::interpolate`] moves the
//! rendered positions toward them. Our own ball blends softly, remote balls
//! follow the server outright by default.

use shared::protocol::StateSnapshot;
use shared::{sequence_newer, Opponent, Vec2};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaPlayer {
    pub id: u32,
    /// Position drawn on screen.
    pub position: Vec2,
    pub velocity: Vec2,
    pub alive: bool,
}

#[derive(Debug, Default)]
pub struct ReplicaWorld {
    players: HashMap<u32, ReplicaPlayer>,
    /// Snapshot order of ids, used for stable iteration.
    order: Vec<u32>,
    targets: HashMap<u32, Vec2>,
    arena_radius: Option<f32>,
    last_tick: Option<u32>,
    server_time_ms: u32,
}

impl ReplicaWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a snapshot. Returns false if it is older than the last one
    /// applied and was ignored.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot) -> bool {
        if let Some(last) = self.last_tick {
            if !sequence_newer(snapshot.tick, last) {
                return false;
            }
        }

        self.order.clear();
        for state in &snapshot.players {
            let id = state.player_id;
            let entry = self.players.entry(id).or_insert(ReplicaPlayer {
                id,
                position: state.position(),
                velocity: state.velocity(),
                alive: state.alive,
            });
            entry.velocity = state.velocity();
            entry.alive = state.alive;
            self.targets.insert(id, state.position());
            self.order.push(id);
        }

        let present = &self.order;
        self.players.retain(|id, _| present.contains(id));
        self.targets.retain(|id, _| present.contains(id));

        self.arena_radius = Some(snapshot.arena_radius);
        self.last_tick = Some(snapshot.tick);
        self.server_time_ms = snapshot.server_time_ms;
        true
    }

    /// Moves every rendered position a fraction of the way to its target.
    pub fn interpolate(&mut self, local_id: Option<u32>, self_blend: f32, remote_blend: f32) {
        for (id, player) in self.players.iter_mut() {
            let Some(&target) = self.targets.get(id) else {
                continue;
            };
            let blend = if Some(*id) == local_id {
                self_blend
            } else {
                remote_blend
            };
            player.position += (target - player.position) * blend.clamp(0.0, 1.0);
        }
    }

    /// Players in the order of the last snapshot.
    pub fn players(&self) -> Vec<ReplicaPlayer> {
        self.order
            .iter()
            .filter_map(|id| self.players.get(id).copied())
            .collect()
    }

    /// Replica for `id`, if the last snapshot had it.
    pub fn player(&self, id: u32) -> Option<&ReplicaPlayer> {
        self.players.get(&id)
    }

    /// Every alive player except `local_id`, as seen by a controller.
    pub fn opponents_of(&self, local_id: Option<u32>) -> Vec<Opponent> {
        self.players()
            .into_iter()
            .filter(|p| p.alive && Some(p.id) != local_id)
            .map(|p| Opponent {
                position: p.position,
                velocity: p.velocity,
            })
            .collect()
    }

    /// Latest server position per player.
    pub fn target_positions(&self) -> &HashMap<u32, Vec2> {
        &self.targets
    }

    /// Radius from the last snapshot.
    pub fn arena_radius(&self) -> Option<f32> {
        self.arena_radius
    }

    /// Server tick of the last applied snapshot.
    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn server_time_ms(&self) -> u32 {
        self.server_time_ms
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Forgets everything, as after a disconnect.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::protocol::PlayerState;

    fn state(id: u32, x: f32, y: f32) -> PlayerState {
        PlayerState {
            player_id: id,
            x,
            y,
            vx: 1.0,
            vy: 2.0,
            alive: true,
        }
    }

    fn snapshot(tick: u32, players: Vec<PlayerState>) -> StateSnapshot {
        StateSnapshot {
            tick,
            server_time_ms: tick * 16,
            arena_radius: 500.0,
            players,
        }
    }

    #[test]
    fn test_new_players_start_at_target() {
        let mut world = ReplicaWorld::new();
        assert!(world.apply_snapshot(&snapshot(1, vec![state(1, 10.0, 20.0)])));
        let p = world.player(1).unwrap();
        assert_eq!(p.position, Vec2::new(10.0, 20.0));
        assert_eq!(world.target_positions()[&1], Vec2::new(10.0, 20.0));
        assert_eq!(world.arena_radius(), Some(500.0));
    }

    #[test]
    fn test_missing_players_are_removed() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(1, vec![state(1, 0.0, 0.0), state(2, 5.0, 5.0)]));
        world.apply_snapshot(&snapshot(2, vec![state(2, 6.0, 6.0)]));
        assert!(world.player(1).is_none());
        assert!(!world.target_positions().contains_key(&1));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_existing_player_keeps_rendered_position() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(1, vec![state(1, 0.0, 0.0)]));
        world.apply_snapshot(&snapshot(2, vec![state(1, 100.0, 0.0)]));
        assert_eq!(world.player(1).unwrap().position, Vec2::ZERO);
        assert_eq!(world.target_positions()[&1], Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_interpolation_blends() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(1, vec![state(1, 0.0, 0.0), state(2, 0.0, 0.0)]));
        world.apply_snapshot(&snapshot(
            2,
            vec![state(1, 100.0, 0.0), state(2, 100.0, 0.0)],
        ));

        world.interpolate(Some(1), 0.35, 1.0);
        assert_approx_eq!(world.player(1).unwrap().position.x, 35.0);
        assert_approx_eq!(world.player(2).unwrap().position.x, 100.0);

        world.interpolate(Some(1), 0.35, 1.0);
        assert_approx_eq!(world.player(1).unwrap().position.x, 35.0 + 65.0 * 0.35);
    }

    #[test]
    fn test_stale_snapshots_are_ignored() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(10, vec![state(1, 1.0, 1.0)]));
        assert!(!world.apply_snapshot(&snapshot(9, vec![])));
        assert!(!world.apply_snapshot(&snapshot(10, vec![])));
        assert_eq!(world.len(), 1);
        assert_eq!(world.last_tick(), Some(10));
    }

    #[test]
    fn test_players_follow_snapshot_order() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(
            1,
            vec![state(3, 0.0, 0.0), state(1, 0.0, 0.0), state(2, 0.0, 0.0)],
        ));
        let ids: Vec<u32> = world.players().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_opponents_exclude_local_and_dead() {
        let mut world = ReplicaWorld::new();
        let mut dead = state(3, 0.0, 0.0);
        dead.alive = false;
        world.apply_snapshot(&snapshot(1, vec![state(1, 0.0, 0.0), state(2, 5.0, 0.0), dead]));
        let opponents = world.opponents_of(Some(1));
        assert_eq!(opponents.len(), 1);
        assert_eq!(opponents[0].position, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn test_clear() {
        let mut world = ReplicaWorld::new();
        world.apply_snapshot(&snapshot(1, vec![state(1, 0.0, 0.0)]));
        world.clear();
        assert!(world.is_empty());
        assert_eq!(world.last_tick(), None);
        assert_eq!(world.arena_radius(), None);
    }
}
