//! # Arena Client Library
//!
//! Client side of the knockout arena: a replica of the server's world fed by
//! unreliable snapshots, plus the input, presentation and connection glue
//! used by the `client` and `headless` binaries.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for everything. The client never simulates
//! physics; it sends its movement direction at a fixed rate and draws what
//! the server reports.
//!
//! ### Snapshot Interpolation
//! Each snapshot updates a target position per player. Every frame the
//! rendered position moves a fraction of the way toward that target. The
//! local ball uses a soft self-correction factor, remote balls follow the
//! server outright.
//!
//! ### Round Trip Measurement
//! A ping carrying the local timestamp is sent every second and echoed by the
//! server. RTT reads `-1` until the first echo and after a disconnect.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Host, port, blend factors and send intervals, with `ARENA_HOST` /
//! `ARENA_PORT` overrides.
//!
//! ### Game Module (`game`)
//! The replica world: creation and removal of players as they appear in or
//! vanish from snapshots, stale snapshot rejection, interpolation.
//!
//! ### Input Module (`input`)
//! Keyboard state mapped to a normalized direction through the shared
//! `Controller` trait, so a human and the AI autopilot are interchangeable.
//!
//! ### Network Module (`network`)
//! Join handshake, input and ping pacing, message dispatch and RTT.
//!
//! ### Rendering Module (`rendering`)
//! Arena, balls and HUD drawn with macroquad.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::ClientConfig;
//! use client::network::NetworkManager;
//! use shared::Vec2;
//! use std::time::Duration;
//!
//! # async fn run() -> std::io::Result<()> {
//! let mut net = NetworkManager::new(ClientConfig::from_env());
//! net.connect().await?;
//!
//! loop {
//!     net.service(Duration::from_millis(1)).await;
//!     net.update(1.0 / 60.0, Vec2::new(1.0, 0.0));
//!     net.interpolate_snapshots();
//! }
//! # }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
