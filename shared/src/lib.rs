//! Core of the arena game shared by the server and clients: the vector type,
//! physics validation, the authoritative simulation, the wire codec, the UDP
//! transport and movement controllers.

pub mod controller;
pub mod protocol;
pub mod simulation;
pub mod timestep;
pub mod transport;
pub mod validator;
pub mod vec2;

pub use controller::{AiController, Controller, ControllerView, Opponent};
pub use protocol::{
    InputCommand, JoinAccept, Message, MessageType, ParseError, Ping, PlayerState, StateSnapshot,
    PROTOCOL_VERSION,
};
pub use simulation::{
    PlayerSnapshot, SimPlayer, Simulation, SimulationConfig, DEFAULT_ARENA_CENTER,
    DEFAULT_ARENA_RADIUS,
};
pub use timestep::FixedTimestep;
pub use vec2::Vec2;

/// True if sequence `a` is newer than `b`, tolerating `u32` wrap-around.
pub fn sequence_newer(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < u32::MAX / 2
}
