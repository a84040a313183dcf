use crate::config::ClientConfig;
use crate::game::{ReplicaPlayer, ReplicaWorld};
use log::{debug, error, info, warn};
use shared::protocol::{InputCommand, Message, Ping};
use shared::transport::{self, ClientEvent, Delivery, DisconnectReason};
use shared::{ControllerView, Opponent, Vec2};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

/// RTT value reported while no round trip has completed.
pub const RTT_UNKNOWN: i64 = -1;

/// Owns the transport connection and the replica of the server's world.
pub struct NetworkManager {
    config: ClientConfig,
    transport: Option<transport::Client>,
    world: ReplicaWorld,
    player_id: Option<u32>,
    rtt_ms: i64,
    next_sequence: u32,
    input_timer: f32,
    ping_timer: f32,
    snapshots_received: u64,
}

impl NetworkManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            world: ReplicaWorld::new(),
            player_id: None,
            rtt_ms: RTT_UNKNOWN,
            next_sequence: 1,
            input_timer: 0.0,
            ping_timer: 0.0,
            snapshots_received: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to the configured online host and port.
    pub async fn connect(&mut self) -> io::Result<()> {
        let host = self.config.online_host.clone();
        let port = self.config.online_port;
        self.connect_to(&host, port).await
    }

    /// Resolves `host` and connects to the first address found.
    pub async fn connect_to(&mut self, host: &str, port: u16) -> io::Result<()> {
        let addr = resolve(host, port).await?;
        self.connect_addr(addr).await
    }

    /// Drops any current connection and starts a new handshake.
    pub async fn connect_addr(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.disconnect();
        info!("Connecting to {}", addr);
        let client = transport::Client::connect(addr, self.config.transport.clone()).await?;
        self.transport = Some(client);
        Ok(())
    }

    /// Says goodbye to the server and resets the session.
    pub fn disconnect(&mut self) {
        if let Some(mut client) = self.transport.take() {
            client.disconnect();
        }
        self.reset_session();
    }

    /// Polls the transport once and handles everything it returned.
    /// Returns the number of game messages processed.
    pub async fn service(&mut self, timeout: Duration) -> usize {
        let Some(client) = self.transport.as_mut() else {
            return 0;
        };
        let events = client.service(timeout).await;

        let mut handled = 0;
        for event in events {
            match event {
                ClientEvent::Connected => {
                    info!("Transport connected, requesting join");
                    self.send_message(&Message::JoinRequest, Delivery::Reliable);
                }
                ClientEvent::Disconnected(reason) => {
                    match reason {
                        DisconnectReason::Rejected => warn!("Server rejected the connection"),
                        DisconnectReason::Timeout => warn!("Connection timed out"),
                        DisconnectReason::Remote => info!("Server closed the connection"),
                    }
                    self.transport = None;
                    self.reset_session();
                }
                ClientEvent::Packet(data) => match Message::decode(&data) {
                    Ok(message) => {
                        self.handle_message(message);
                        handled += 1;
                    }
                    Err(e) => warn!("Dropping malformed packet from server: {}", e),
                },
            }
        }
        handled
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::JoinAccept(accept) => {
                if self.player_id != Some(accept.player_id) {
                    info!("Joined as player {}", accept.player_id);
                }
                self.player_id = Some(accept.player_id);
            }
            Message::State(snapshot) => {
                if self.world.apply_snapshot(&snapshot) {
                    self.snapshots_received += 1;
                } else {
                    debug!("Ignoring stale snapshot for tick {}", snapshot.tick);
                }
            }
            Message::Pong(pong) => {
                let now = self.now_ms();
                self.rtt_ms = i64::from(now.wrapping_sub(pong.timestamp_ms));
            }
            other => debug!("Ignoring {:?} from server", other.message_type()),
        }
    }

    /// Sends one input command. Fails unless joined.
    pub fn send_input(&mut self, direction: Vec2) -> bool {
        let Some(player_id) = self.player_id else {
            return false;
        };
        let direction = if direction.is_finite() {
            direction
        } else {
            Vec2::ZERO
        };
        let cmd = InputCommand {
            player_id,
            dir_x: direction.x,
            dir_y: direction.y,
            sequence: self.next_sequence,
            timestamp_ms: self.now_ms(),
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.send_message(&Message::Input(cmd), Delivery::Unreliable)
    }

    /// Sends a timestamped ping; the echo sets [`rtt`](Self::rtt).
    pub fn send_ping(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        let ping = Ping {
            timestamp_ms: self.now_ms(),
        };
        self.send_message(&Message::Ping(ping), Delivery::Unreliable)
    }

    /// Advances the send timers: input at the configured rate once joined,
    /// pings at the ping interval.
    pub fn update(&mut self, dt: f32, direction: Vec2) {
        if !self.is_joined() {
            return;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.input_timer += dt;
        let input_interval = self.config.input_interval.as_secs_f32();
        if self.input_timer >= input_interval {
            self.input_timer %= input_interval.max(f32::EPSILON);
            self.send_input(direction);
        }

        self.ping_timer += dt;
        if self.ping_timer >= self.config.ping_interval.as_secs_f32() {
            self.ping_timer = 0.0;
            self.send_ping();
        }
    }

    /// Moves rendered positions toward the latest snapshot.
    pub fn interpolate_snapshots(&mut self) {
        self.world.interpolate(
            self.player_id,
            self.config.self_correction_blend,
            self.config.remote_blend,
        );
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .map_or(false, transport::Client::is_connected)
    }

    /// True while the transport handshake is in progress.
    pub fn is_connecting(&self) -> bool {
        self.transport
            .as_ref()
            .map_or(false, transport::Client::is_connecting)
    }

    /// Connected and holding a player id.
    pub fn is_joined(&self) -> bool {
        self.is_connected() && self.player_id.is_some()
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    /// Last measured round trip in milliseconds, or [`RTT_UNKNOWN`].
    pub fn rtt(&self) -> i64 {
        self.rtt_ms
    }

    /// Replicas in snapshot order.
    pub fn players(&self) -> Vec<ReplicaPlayer> {
        self.world.players()
    }

    pub fn target_positions(&self) -> &HashMap<u32, Vec2> {
        self.world.target_positions()
    }

    pub fn arena_radius(&self) -> Option<f32> {
        self.world.arena_radius()
    }

    /// Our own replica, once it appears in a snapshot.
    pub fn local_player(&self) -> Option<ReplicaPlayer> {
        self.player_id
            .and_then(|id| self.world.player(id))
            .copied()
    }

    /// Everyone else still alive.
    pub fn opponents(&self) -> Vec<Opponent> {
        self.world.opponents_of(self.player_id)
    }

    /// What a controller sees of the replica world, or `None` until our
    /// own ball is in a snapshot.
    pub fn controller_view<'a>(
        &self,
        dt: f32,
        opponents: &'a [Opponent],
    ) -> Option<ControllerView<'a>> {
        let me = self.local_player()?;
        let arena_radius = self.world.arena_radius()?;
        Some(ControllerView {
            dt,
            position: me.position,
            velocity: me.velocity,
            opponents,
            arena_center: self.config.arena_center,
            arena_radius,
            arena_age: self.world.server_time_ms() as f32 / 1000.0,
        })
    }

    pub fn world(&self) -> &ReplicaWorld {
        &self.world
    }

    /// Snapshots applied since the manager was created.
    pub fn snapshots_received(&self) -> u64 {
        self.snapshots_received
    }

    fn now_ms(&self) -> u32 {
        self.transport
            .as_ref()
            .map_or(0, |client| client.context().now_ms())
    }

    fn send_message(&mut self, message: &Message, delivery: Delivery) -> bool {
        match self.transport.as_mut() {
            Some(client) => client.send(&message.encode(), delivery),
            None => false,
        }
    }

    fn reset_session(&mut self) {
        self.world.clear();
        self.player_id = None;
        self.rtt_ms = RTT_UNKNOWN;
        self.next_sequence = 1;
        self.input_timer = 0.0;
        self.ping_timer = 0.0;
    }
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    addrs.next().ok_or_else(|| {
        error!("No address found for {}:{}", host, port);
        io::Error::new(ErrorKind::NotFound, format!("no address for {}:{}", host, port))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{JoinAccept, PlayerState, StateSnapshot};
    use shared::transport::{PeerId, Server, ServerEvent, TransportConfig};

    async fn fake_server() -> Server {
        Server::bind("127.0.0.1:0".parse().unwrap(), 4, TransportConfig::default())
            .await
            .unwrap()
    }

    /// Pumps both ends until the server sees the JoinRequest, answers it
    /// and the manager has its id.
    async fn joined(server: &mut Server, manager: &mut NetworkManager) -> PeerId {
        let addr = server.local_addr().unwrap();
        manager.connect_addr(addr).await.unwrap();
        let mut peer = None;
        for _ in 0..500 {
            for event in server.service(Duration::from_millis(1)).await {
                if let ServerEvent::Packet(from, data) = event {
                    if Message::decode(&data) == Ok(Message::JoinRequest) {
                        let accept = Message::JoinAccept(JoinAccept { player_id: 7 });
                        server.send_to(from, &accept.encode(), Delivery::Reliable);
                        peer = Some(from);
                    }
                }
            }
            manager.service(Duration::from_millis(1)).await;
            if let (Some(peer), true) = (peer, manager.is_joined()) {
                return peer;
            }
        }
        panic!("manager never joined");
    }

    async fn pump_until<F>(server: &mut Server, manager: &mut NetworkManager, mut done: F)
    where
        F: FnMut(&NetworkManager) -> bool,
    {
        for _ in 0..500 {
            server.service(Duration::from_millis(1)).await;
            manager.service(Duration::from_millis(1)).await;
            if done(manager) {
                return;
            }
        }
        panic!("condition never reached");
    }

    fn snapshot(tick: u32, ids: &[u32]) -> StateSnapshot {
        StateSnapshot {
            tick,
            server_time_ms: 0,
            arena_radius: 420.0,
            players: ids
                .iter()
                .map(|&id| PlayerState {
                    player_id: id,
                    x: id as f32 * 10.0,
                    y: 0.0,
                    vx: 0.0,
                    vy: 0.0,
                    alive: true,
                })
                .collect(),
        }
    }

    #[test]
    fn test_new_manager_is_idle() {
        let mut manager = NetworkManager::new(ClientConfig::default());
        assert!(!manager.is_connected());
        assert!(!manager.is_joined());
        assert_eq!(manager.rtt(), RTT_UNKNOWN);
        assert!(!manager.send_input(Vec2::new(1.0, 0.0)));
        assert!(!manager.send_ping());
        assert_eq!(tokio_test::block_on(manager.service(Duration::ZERO)), 0);
    }

    #[tokio::test]
    async fn test_join_sets_player_id() {
        let mut server = fake_server().await;
        let mut manager = NetworkManager::new(ClientConfig::default());
        joined(&mut server, &mut manager).await;
        assert_eq!(manager.player_id(), Some(7));
    }

    #[tokio::test]
    async fn test_snapshot_updates_replicas() {
        let mut server = fake_server().await;
        let mut manager = NetworkManager::new(ClientConfig::default());
        let peer = joined(&mut server, &mut manager).await;

        let state = Message::State(snapshot(5, &[7, 9]));
        server.send_to(peer, &state.encode(), Delivery::Reliable);
        pump_until(&mut server, &mut manager, |m| m.players().len() == 2).await;
        assert_eq!(manager.arena_radius(), Some(420.0));
        assert_eq!(manager.target_positions()[&9], Vec2::new(90.0, 0.0));

        let state = Message::State(snapshot(6, &[9]));
        server.send_to(peer, &state.encode(), Delivery::Reliable);
        pump_until(&mut server, &mut manager, |m| m.players().len() == 1).await;
        assert_eq!(manager.players()[0].id, 9);
        assert_eq!(manager.snapshots_received(), 2);
    }

    #[tokio::test]
    async fn test_pong_measures_rtt() {
        let mut server = fake_server().await;
        let mut manager = NetworkManager::new(ClientConfig::default());
        joined(&mut server, &mut manager).await;
        assert!(manager.send_ping());

        for _ in 0..500 {
            for event in server.service(Duration::from_millis(1)).await {
                if let ServerEvent::Packet(from, data) = event {
                    if let Ok(Message::Ping(ping)) = Message::decode(&data) {
                        server.send_to(from, &Message::Pong(ping).encode(), Delivery::Unreliable);
                    }
                }
            }
            manager.service(Duration::from_millis(1)).await;
            if manager.rtt() != RTT_UNKNOWN {
                break;
            }
        }
        assert!(manager.rtt() >= 0);
        assert!(manager.rtt() < 1000);
    }

    #[tokio::test]
    async fn test_inputs_carry_increasing_sequences() {
        let mut server = fake_server().await;
        let mut manager = NetworkManager::new(ClientConfig::default());
        joined(&mut server, &mut manager).await;

        assert!(manager.send_input(Vec2::new(1.0, 0.0)));
        assert!(manager.send_input(Vec2::new(f32::NAN, 0.0)));

        let mut commands = Vec::new();
        for _ in 0..500 {
            for event in server.service(Duration::from_millis(1)).await {
                if let ServerEvent::Packet(_, data) = event {
                    if let Ok(Message::Input(cmd)) = Message::decode(&data) {
                        commands.push(cmd);
                    }
                }
            }
            if commands.len() == 2 {
                break;
            }
        }
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].sequence, 1);
        assert_eq!(commands[0].player_id, 7);
        assert_eq!(commands[1].sequence, 2);
        assert_eq!(commands[1].direction(), Vec2::ZERO);
    }

    #[tokio::test]
    async fn test_server_disconnect_resets_session() {
        let mut server = fake_server().await;
        let mut manager = NetworkManager::new(ClientConfig::default());
        let peer = joined(&mut server, &mut manager).await;

        let state = Message::State(snapshot(1, &[7]));
        server.send_to(peer, &state.encode(), Delivery::Reliable);
        pump_until(&mut server, &mut manager, |m| !m.players().is_empty()).await;

        server.disconnect_peer(peer);
        pump_until(&mut server, &mut manager, |m| !m.is_connected()).await;
        assert_eq!(manager.player_id(), None);
        assert_eq!(manager.rtt(), RTT_UNKNOWN);
        assert!(manager.players().is_empty());
    }
}
