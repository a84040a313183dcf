//! Server-side bookkeeping for connected clients.
//!
//! Maps transport peers to the player they control, hands out player ids
//! and enforces the client limit. Player ids come from one counter starting
//! at 1 that is also used for bots, so ids are never reused within a run.
//!
//! Inputs are latest-wins: each client remembers the newest sequence it has
//! applied and anything not newer is dropped. Lost inputs are never replayed.

use log::{debug, info};
use shared::sequence_newer;
use shared::transport::PeerId;
use std::collections::HashMap;
use std::time::Instant;

/// A connected client and the player it controls
#[derive(Debug)]
pub struct Client {
    pub peer: PeerId,
    pub player_id: u32,
    pub connected_at: Instant,
    /// Newest input sequence applied so far
    pub last_input_sequence: Option<u32>,
    pub inputs_applied: u64,
}

impl Client {
    pub fn new(peer: PeerId, player_id: u32) -> Self {
        Self {
            peer,
            player_id,
            connected_at: Instant::now(),
            last_input_sequence: None,
            inputs_applied: 0,
        }
    }

    /// Records `sequence` if it is newer than anything applied before.
    ///
    /// Returns false for stale or duplicate inputs, which callers drop.
    pub fn accept_sequence(&mut self, sequence: u32) -> bool {
        if let Some(last) = self.last_input_sequence {
            if !sequence_newer(sequence, last) {
                return false;
            }
        }
        self.last_input_sequence = Some(sequence);
        self.inputs_applied += 1;
        true
    }
}

pub struct ClientManager {
    clients: HashMap<PeerId, Client>,
    next_player_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager with room for `max_clients`.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_player_id: 1,
            max_clients,
        }
    }

    /// Hands out the next player id. Never returns 0.
    pub fn allocate_player_id(&mut self) -> u32 {
        let id = self.next_player_id;
        self.next_player_id = self.next_player_id.wrapping_add(1).max(1);
        id
    }

    /// Registers a peer and returns its new player id, or `None` when full.
    /// A peer that is already registered keeps its id.
    pub fn add_client(&mut self, peer: PeerId) -> Option<u32> {
        if let Some(existing) = self.clients.get(&peer) {
            return Some(existing.player_id);
        }
        if self.is_full() {
            return None;
        }

        let player_id = self.allocate_player_id();
        info!("Peer {} joined as player {}", peer, player_id);
        self.clients.insert(peer, Client::new(peer, player_id));
        Some(player_id)
    }

    /// Unregisters a peer, returning its client record.
    pub fn remove_client(&mut self, peer: PeerId) -> Option<Client> {
        let client = self.clients.remove(&peer)?;
        info!(
            "Player {} (peer {}) left after {:.1}s",
            client.player_id,
            peer,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    /// Player controlled by `peer`.
    pub fn player_id(&self, peer: PeerId) -> Option<u32> {
        self.clients.get(&peer).map(|c| c.player_id)
    }

    pub fn get(&self, peer: PeerId) -> Option<&Client> {
        self.clients.get(&peer)
    }

    /// Returns the player to steer if this input should be applied.
    pub fn accept_input(&mut self, peer: PeerId, sequence: u32) -> Option<u32> {
        let client = self.clients.get_mut(&peer)?;
        if client.accept_sequence(sequence) {
            Some(client.player_id)
        } else {
            debug!(
                "Dropping stale input {} from player {}",
                sequence, client.player_id
            );
            None
        }
    }

    /// All connected peers.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.clients.keys().copied()
    }

    /// True when no more clients are accepted.
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
