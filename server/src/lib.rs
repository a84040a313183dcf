//! # Arena Server Library
//!
//! Authoritative server for the last-ball-standing arena. The server owns the
//! canonical simulation, turns client inputs into steering, and broadcasts
//! state snapshots that clients render.
//!
//! ## Architecture
//!
//! ### Single-Threaded Loop
//! One task drives everything: it polls the transport, applies joins, leaves
//! and inputs as they arrive, runs fixed 60 Hz ticks through an accumulator
//! and sends a snapshot roughly every 30 ms. Nothing is shared across
//! threads, so the simulation needs no locking.
//!
//! ### Delivery
//! Join accepts travel reliably. Snapshots and pongs are unreliable since the
//! next one supersedes them. Client inputs are unreliable as well: the newest
//! sequence wins and lost inputs are simply never applied.
//!
//! ## Modules
//!
//! - [`client_manager`]: peer to player mapping, id allocation, input ordering
//! - [`config`]: server settings and validation
//! - [`game`]: simulation wrapper with bots, snapshot pacing and rounds
//! - [`network`]: the loop that ties transport and game together

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;

pub use config::ServerConfig;
pub use network::{Server, ServerError};
