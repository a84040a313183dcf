//! Server loop: transport events in, fixed ticks, snapshots out.
//!
//! Everything runs on the calling task. Each [`Server::poll`] drains the
//! transport, applies the resulting joins, leaves and messages immediately,
//! steps the simulation by however many fixed ticks the wall clock allows and
//! broadcasts a snapshot when one is due.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameState;
use log::{debug, info, warn};
use shared::protocol::{self, JoinAccept, Message};
use shared::transport::{self, Delivery, PeerId, ServerEvent};
use shared::FixedTimestep;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    config: ServerConfig,
    transport: transport::Server,
    clients: ClientManager,
    game: GameState,
    timestep: FixedTimestep,
    started: Instant,
    last_update: Instant,
}

impl Server {
    /// Validates `config`, binds the socket and spawns the bots.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::InvalidConfig)?;

        let addr = SocketAddr::new(config.bind_address, config.port);
        let transport =
            transport::Server::bind(addr, config.max_clients, config.transport.clone())
                .await
                .map_err(|source| ServerError::Bind { addr, source })?;

        let mut clients = ClientManager::new(config.max_clients);
        let mut game = GameState::new(&config);
        for i in 0..config.bots {
            let player_id = clients.allocate_player_id();
            let seed = config.bot_seed.wrapping_add(i as u64);
            let difficulty = config.bot_difficulty_for(i);
            game.add_bot(player_id, seed, difficulty);
            debug!("Bot {} difficulty {:.2}", player_id, difficulty);
        }
        if config.bots > 0 {
            info!("Spawned {} bots (seed {})", config.bots, config.bot_seed);
        }

        let now = Instant::now();
        Ok(Self {
            timestep: FixedTimestep::from_rate(config.tick_rate, config.max_catch_up_ticks),
            config,
            transport,
            clients,
            game,
            started: now,
            last_update: now,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Connected clients and their players.
    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Milliseconds since the server started, wrapping.
    pub fn server_time_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Runs until the surrounding task is cancelled.
    pub async fn run(&mut self) {
        info!(
            "Server running: {} Hz ticks, snapshots every {} ms",
            self.config.tick_rate,
            self.config.snapshot_interval.as_millis()
        );
        self.last_update = Instant::now();
        loop {
            self.poll(Duration::ZERO).await;
            tokio::time::sleep(self.config.idle_sleep).await;
        }
    }

    /// One loop iteration. Returns the number of simulation ticks run.
    pub async fn poll(&mut self, timeout: Duration) -> u32 {
        for event in self.transport.service(timeout).await {
            self.handle_event(event);
        }

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update);
        self.last_update = now;

        let ticks = self.timestep.advance(elapsed.as_secs_f32());
        let dt = self.timestep.step();
        for _ in 0..ticks {
            self.game.step(dt);
        }

        if self.game.snapshot_due() {
            self.broadcast_state();
        }
        ticks
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected(peer) => match self.clients.add_client(peer) {
                Some(player_id) => {
                    if let Some(addr) = self.transport.peer_addr(peer) {
                        info!("Player {} joined from {}", player_id, addr);
                    }
                    self.game.add_player(player_id);
                    self.send_join_accept(peer, player_id);
                }
                None => {
                    warn!("No free player slot for peer {}, disconnecting", peer);
                    self.transport.disconnect_peer(peer);
                }
            },
            ServerEvent::Disconnected(peer, reason) => {
                if let Some(client) = self.clients.remove_client(peer) {
                    debug!("Peer {} gone: {:?}", peer, reason);
                    self.game.remove_player(client.player_id);
                }
            }
            ServerEvent::Packet(peer, data) => self.handle_packet(peer, &data),
        }
    }

    fn handle_packet(&mut self, peer: PeerId, data: &[u8]) {
        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping packet from peer {}: {}", peer, e);
                return;
            }
        };

        match message {
            Message::JoinRequest => match self.clients.player_id(peer) {
                Some(player_id) => self.send_join_accept(peer, player_id),
                None => debug!("Join request from unregistered peer {}", peer),
            },
            Message::Input(cmd) => {
                let Some(player_id) = self.clients.accept_input(peer, cmd.sequence) else {
                    return;
                };
                if cmd.player_id != player_id {
                    debug!(
                        "Peer {} claimed player {} but controls {}",
                        peer, cmd.player_id, player_id
                    );
                }
                self.game.apply_input(player_id, cmd.direction());
            }
            Message::Ping(ping) => {
                self.transport
                    .send_to(peer, &protocol::serialize_pong(&ping), Delivery::Unreliable);
            }
            other => debug!(
                "Ignoring unexpected {:?} from peer {}",
                other.message_type(),
                peer
            ),
        }
    }

    fn send_join_accept(&mut self, peer: PeerId, player_id: u32) {
        let bytes = protocol::serialize_join_accept(&JoinAccept { player_id });
        if !self.transport.send_to(peer, &bytes, Delivery::Reliable) {
            warn!("Failed to send join accept to peer {}", peer);
        }
    }

    fn broadcast_state(&mut self) {
        if self.transport.peer_count() == 0 {
            return;
        }
        let snapshot = self.game.build_snapshot(self.server_time_ms());
        let bytes = protocol::serialize_state(&snapshot);
        if !self.transport.broadcast(&bytes, Delivery::Unreliable) {
            debug!("Snapshot {} did not reach every peer", snapshot.tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{InputCommand, Ping, StateSnapshot};
    use shared::transport::{Client, ClientEvent, TransportConfig};
    use std::net::{IpAddr, Ipv4Addr};

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn joined_client(server: &mut Server) -> (Client, u32) {
        let addr = server.local_addr().unwrap();
        let mut client = Client::connect(addr, TransportConfig::default())
            .await
            .unwrap();
        for _ in 0..500 {
            server.poll(Duration::from_millis(1)).await;
            for event in client.service(Duration::from_millis(1)).await {
                if let ClientEvent::Packet(data) = event {
                    if let Ok(Message::JoinAccept(accept)) = Message::decode(&data) {
                        return (client, accept.player_id);
                    }
                }
            }
        }
        panic!("no join accept received");
    }

    async fn next_state(server: &mut Server, client: &mut Client) -> StateSnapshot {
        for _ in 0..500 {
            server.poll(Duration::from_millis(1)).await;
            for event in client.service(Duration::from_millis(1)).await {
                if let ClientEvent::Packet(data) = event {
                    if let Ok(Message::State(state)) = Message::decode(&data) {
                        return state;
                    }
                }
            }
        }
        panic!("no state received");
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            tick_rate: 0,
            ..test_config()
        };
        let result = tokio_test::block_on(Server::bind(config));
        assert!(matches!(result, Err(ServerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_bots_are_spawned_at_startup() {
        let server = Server::bind(ServerConfig {
            bots: 3,
            ..test_config()
        })
        .await
        .unwrap();
        assert_eq!(server.game().bot_count(), 3);
        assert_eq!(server.game().player_count(), 3);
        assert!(server.clients().is_empty());
    }

    #[tokio::test]
    async fn test_connect_assigns_player() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (_client, player_id) = joined_client(&mut server).await;
        assert_eq!(player_id, 1);
        assert_eq!(server.clients().len(), 1);
        assert!(server.game().simulation().contains(player_id));
    }

    #[tokio::test]
    async fn test_join_request_is_answered() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, player_id) = joined_client(&mut server).await;
        assert!(client.send(&protocol::serialize_join_request(), Delivery::Reliable));

        let mut answered = None;
        for _ in 0..500 {
            server.poll(Duration::from_millis(1)).await;
            for event in client.service(Duration::from_millis(1)).await {
                if let ClientEvent::Packet(data) = event {
                    if let Ok(Message::JoinAccept(accept)) = Message::decode(&data) {
                        answered = Some(accept.player_id);
                    }
                }
            }
            if answered.is_some() {
                break;
            }
        }
        assert_eq!(answered, Some(player_id));
    }

    #[tokio::test]
    async fn test_input_moves_owned_player() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, player_id) = joined_client(&mut server).await;
        let start = server.game().simulation().player(player_id).unwrap().position;

        let cmd = InputCommand {
            // The server steers the peer's own player regardless of this id.
            player_id: 999,
            dir_x: 1.0,
            dir_y: 0.0,
            sequence: 1,
            timestamp_ms: 0,
        };
        assert!(client.send(&protocol::serialize_input(&cmd), Delivery::Unreliable));

        let mut moved = false;
        for _ in 0..200 {
            server.poll(Duration::from_millis(1)).await;
            client.service(Duration::ZERO).await;
            let now = server.game().simulation().player(player_id).unwrap().position;
            if now.x > start.x + 1.0 {
                moved = true;
                break;
            }
        }
        assert!(moved);
    }

    #[tokio::test]
    async fn test_ping_is_echoed() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, _) = joined_client(&mut server).await;
        let ping = Ping { timestamp_ms: 4242 };
        assert!(client.send(&protocol::serialize_ping(&ping), Delivery::Unreliable));

        let mut echoed = None;
        for _ in 0..500 {
            server.poll(Duration::from_millis(1)).await;
            for event in client.service(Duration::from_millis(1)).await {
                if let ClientEvent::Packet(data) = event {
                    if let Ok(Message::Pong(pong)) = Message::decode(&data) {
                        echoed = Some(pong.timestamp_ms);
                    }
                }
            }
            if echoed.is_some() {
                break;
            }
        }
        assert_eq!(echoed, Some(4242));
    }

    #[tokio::test]
    async fn test_state_is_broadcast() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, player_id) = joined_client(&mut server).await;
        let state = next_state(&mut server, &mut client).await;
        assert!(state.players.iter().any(|p| p.player_id == player_id));
        assert!(state.arena_radius > 0.0);
    }

    #[tokio::test]
    async fn test_malformed_packet_is_dropped() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, _) = joined_client(&mut server).await;
        assert!(client.send(&[9, 9, 9], Delivery::Unreliable));
        assert!(client.send(&[1], Delivery::Reliable));
        let state = next_state(&mut server, &mut client).await;
        assert_eq!(state.players.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let (mut client, player_id) = joined_client(&mut server).await;
        client.disconnect();
        for _ in 0..200 {
            server.poll(Duration::from_millis(1)).await;
            if server.clients().is_empty() {
                break;
            }
        }
        assert!(server.clients().is_empty());
        assert!(!server.game().simulation().contains(player_id));
    }
}
