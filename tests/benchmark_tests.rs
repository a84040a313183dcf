//! Performance benchmarks for critical game systems
//!
//! Thresholds are loose enough for debug builds on slow CI machines.

use client::game::ReplicaWorld;
use shared::protocol::{Message, PlayerState, StateSnapshot, MAX_SNAPSHOT_PLAYERS};
use shared::{
    AiController, Controller, ControllerView, Opponent, Simulation, SimulationConfig, Vec2,
    DEFAULT_ARENA_CENTER,
};
use std::time::Instant;

const DT: f32 = 1.0 / 60.0;

fn crowded_simulation(players: u32) -> Simulation {
    let mut sim = Simulation::new(SimulationConfig::default());
    for id in 1..=players {
        let angle = id as f32 / players as f32 * std::f32::consts::TAU;
        sim.add_player(id, DEFAULT_ARENA_CENTER + Vec2::from_angle(angle) * 60.0);
        sim.apply_input(id, -Vec2::from_angle(angle));
    }
    sim
}

fn full_snapshot(tick: u32) -> StateSnapshot {
    StateSnapshot {
        tick,
        server_time_ms: tick * 16,
        arena_radius: 500.0,
        players: (1..=MAX_SNAPSHOT_PLAYERS)
            .map(|id| PlayerState {
                player_id: id,
                x: id as f32,
                y: -(id as f32),
                vx: 1.5,
                vy: -2.5,
                alive: id % 3 != 0,
            })
            .collect(),
    }
}

/// Pairwise collision resolution with everyone piled in the middle
#[test]
fn benchmark_collision_resolution() {
    let mut sim = crowded_simulation(16);
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        sim.resolve_collisions();
    }

    let duration = start.elapsed();
    println!(
        "Collision resolution (16 players): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
    for p in sim.snapshot_players() {
        assert!(p.position.is_finite());
        assert!(p.velocity.is_finite());
    }
}

/// A full minute of 60 Hz ticks with eight players
#[test]
fn benchmark_simulation_ticks() {
    let mut sim = crowded_simulation(8);
    let ticks = 60 * 60;
    let start = Instant::now();

    for _ in 0..ticks {
        sim.update_arena_shrink(DT);
        sim.tick(DT);
    }

    let duration = start.elapsed();
    println!(
        "Simulation: {} ticks in {:?} ({:.2} μs/tick)",
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert!(duration.as_secs() < 5);
    assert!(sim.current_arena_radius() < sim.arena_radius());
}

/// Encoding and decoding the largest snapshot the protocol allows
#[test]
fn benchmark_snapshot_codec() {
    let message = Message::State(full_snapshot(1));
    let iterations = 2_000;
    let start = Instant::now();

    let mut bytes = 0;
    for _ in 0..iterations {
        let encoded = message.encode();
        bytes += encoded.len();
        let decoded = Message::decode(&encoded).unwrap();
        assert!(matches!(decoded, Message::State(ref s) if s.players.len() == MAX_SNAPSHOT_PLAYERS as usize));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} round trips ({} bytes) in {:?}",
        iterations, bytes, duration
    );

    assert!(duration.as_secs() < 5);
}

/// Applying and interpolating large snapshots on the client
#[test]
fn benchmark_replica_updates() {
    let mut world = ReplicaWorld::new();
    let iterations = 2_000;
    let start = Instant::now();

    for tick in 1..=iterations {
        assert!(world.apply_snapshot(&full_snapshot(tick)));
        world.interpolate(Some(1), 0.35, 1.0);
    }

    let duration = start.elapsed();
    println!("Replica updates: {} snapshots in {:?}", iterations, duration);

    assert!(duration.as_secs() < 5);
    assert_eq!(world.len(), MAX_SNAPSHOT_PLAYERS as usize);
}

/// Two identical bot matches must end in identical states
#[test]
fn stress_test_deterministic_bot_match() {
    fn run_match(seed: u64) -> Vec<(u32, Vec2, Vec2, bool)> {
        let mut sim = crowded_simulation(6);
        let mut bots: Vec<(u32, AiController)> = (1..=6)
            .map(|id| (id, AiController::new(seed + id as u64, 0.8)))
            .collect();

        for _ in 0..600 {
            let players = sim.snapshot_players();
            for (id, bot) in bots.iter_mut() {
                let Some(me) = players.iter().find(|p| p.id == *id && p.alive) else {
                    continue;
                };
                let opponents: Vec<Opponent> = players
                    .iter()
                    .filter(|p| p.alive && p.id != *id)
                    .map(|p| Opponent {
                        position: p.position,
                        velocity: p.velocity,
                    })
                    .collect();
                let view = ControllerView {
                    dt: DT,
                    position: me.position,
                    velocity: me.velocity,
                    opponents: &opponents,
                    arena_center: sim.arena_center(),
                    arena_radius: sim.current_arena_radius(),
                    arena_age: sim.arena_age(),
                };
                let direction = bot.movement_direction(&view);
                sim.apply_input(*id, direction);
            }
            sim.update_arena_shrink(DT);
            sim.tick(DT);
        }

        sim.snapshot_players()
            .into_iter()
            .map(|p| (p.id, p.position, p.velocity, p.alive))
            .collect()
    }

    let start = Instant::now();
    let a = run_match(42);
    let b = run_match(42);
    println!("Two bot matches in {:?}", start.elapsed());

    assert_eq!(a, b);
}
