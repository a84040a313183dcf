//! Connection-oriented UDP transport with reliable and unreliable delivery.
//!
//! A [`Server`] accepts up to a fixed number of peers on one socket; a
//! [`Client`] talks to exactly one server. Neither spawns tasks: callers poll
//! [`Server::service`] / [`Client::service`] once per loop iteration and act
//! on the returned events before polling again. Resends, heartbeats and
//! timeouts are all driven from inside `service`.

mod channel;
mod client;
mod context;
mod packet;
mod server;

pub use channel::{ReliableChannel, Received, MAX_REORDER_WINDOW};
pub use client::Client;
pub use context::TransportContext;
pub use packet::{Frame, FrameKind, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE};
pub use server::Server;

use log::warn;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resent until acknowledged and delivered in send order.
    Reliable,
    /// Sent once; may be lost, duplicated or reordered.
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The other side said goodbye.
    Remote,
    /// Nothing heard within the timeout, or reliable data went unacked.
    Timeout,
    /// The server refused the connection (full).
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected(PeerId),
    Disconnected(PeerId, DisconnectReason),
    Packet(PeerId, Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected(DisconnectReason),
    Packet(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub resend_interval: Duration,
    /// A reliable payload sent more often than this kills the connection.
    pub max_resend_attempts: u32,
    pub heartbeat_interval: Duration,
    pub peer_timeout: Duration,
    pub connect_retry_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            max_resend_attempts: 30,
            heartbeat_interval: Duration::from_secs(1),
            peer_timeout: Duration::from_secs(5),
            connect_retry_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Non-blocking send; failures are logged and reported as `false`.
/// Payloads larger than [`MAX_PAYLOAD_SIZE`] would be truncated by the
/// receiver, so they are refused up front.
fn payload_fits(len: usize, addr: SocketAddr) -> bool {
    if len > MAX_PAYLOAD_SIZE {
        warn!(
            "Refusing {} byte payload to {}: limit is {}",
            len, addr, MAX_PAYLOAD_SIZE
        );
        return false;
    }
    true
}

fn send_datagram(socket: &UdpSocket, addr: SocketAddr, bytes: &[u8]) -> bool {
    match socket.try_send_to(bytes, addr) {
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to send {} bytes to {}: {}", bytes.len(), addr, e);
            false
        }
    }
}
