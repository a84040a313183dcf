use super::channel::ReliableChannel;
use super::context::TransportContext;
use super::packet::{Frame, MAX_DATAGRAM_SIZE};
use super::{payload_fits, send_datagram, Delivery, DisconnectReason, PeerId, ServerEvent, TransportConfig};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

#[derive(Debug)]
struct Peer {
    id: PeerId,
    addr: SocketAddr,
    channel: ReliableChannel,
    last_received: Instant,
    last_sent: Instant,
}

/// Listening side of the transport.
pub struct Server {
    socket: UdpSocket,
    config: TransportConfig,
    max_peers: usize,
    peers: HashMap<PeerId, Peer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    next_peer_id: u32,
    context: TransportContext,
}

impl Server {
    /// Binds `addr` and accepts up to `max_peers` connections.
    pub async fn bind(
        addr: SocketAddr,
        max_peers: usize,
        config: TransportConfig,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(
            "Transport listening on {} (max {} peers)",
            socket.local_addr()?,
            max_peers
        );
        Ok(Self {
            socket,
            config,
            max_peers,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_peer_id: 1,
            context: TransportContext::acquire(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn context(&self) -> &TransportContext {
        &self.context
    }

    /// Connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Remote address of a connected peer.
    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer).map(|p| p.addr)
    }

    /// Drains every pending datagram, waiting up to `timeout` if none is
    /// ready, then runs resends, heartbeats and timeout checks.
    pub async fn service(&mut self, timeout: Duration) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        self.drain(&mut events);
        if events.is_empty()
            && !timeout.is_zero()
            && tokio::time::timeout(timeout, self.socket.readable())
                .await
                .is_ok()
        {
            self.drain(&mut events);
        }
        self.maintain(Instant::now(), &mut events);
        events
    }

    /// Frames and sends `data` to one peer. False for unknown peers, oversized
    /// payloads or socket errors.
    pub fn send_to(&mut self, peer_id: PeerId, data: &[u8], delivery: Delivery) -> bool {
        let now = Instant::now();
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            warn!("Cannot send to unknown peer {}", peer_id);
            return false;
        };
        if !payload_fits(data.len(), peer.addr) {
            return false;
        }
        let bytes = match delivery {
            Delivery::Unreliable => Frame::Unreliable(data).encode(),
            Delivery::Reliable => {
                let sequence = peer.channel.push(data.to_vec(), now);
                Frame::Reliable {
                    sequence,
                    payload: data,
                }
                .encode()
            }
        };
        peer.last_sent = now;
        send_datagram(&self.socket, peer.addr, &bytes)
    }

    /// Sends to every connected peer. True only if every send succeeded.
    pub fn broadcast(&mut self, data: &[u8], delivery: Delivery) -> bool {
        let ids: Vec<PeerId> = self.peers.keys().copied().collect();
        let mut all_sent = true;
        for id in ids {
            all_sent &= self.send_to(id, data, delivery);
        }
        all_sent
    }

    /// Drops a peer after telling it so. No event is emitted.
    pub fn disconnect_peer(&mut self, peer_id: PeerId) -> bool {
        match self.remove_peer(peer_id) {
            Some(peer) => {
                send_datagram(&self.socket, peer.addr, &Frame::Disconnect.encode());
                info!("Disconnected peer {} ({})", peer_id, peer.addr);
                true
            }
            None => false,
        }
    }

    fn remove_peer(&mut self, peer_id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&peer_id)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    fn drain(&mut self, events: &mut Vec<ServerEvent>) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buffer) {
                Ok((len, addr)) => self.handle_datagram(&buffer[..len], addr, events),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("Receive error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr, events: &mut Vec<ServerEvent>) {
        let Some(frame) = Frame::decode(data) else {
            debug!("Dropping malformed datagram ({} bytes) from {}", data.len(), addr);
            return;
        };
        let now = Instant::now();

        let Some(peer_id) = self.by_addr.get(&addr).copied() else {
            if frame == Frame::Connect {
                self.accept(addr, now, events);
            } else {
                debug!("Ignoring {:?} from unknown address {}", frame.kind(), addr);
            }
            return;
        };

        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };
        peer.last_received = now;

        match frame {
            Frame::Connect => {
                // Our Accept was lost; repeat it.
                send_datagram(&self.socket, addr, &Frame::Accept.encode());
            }
            Frame::Disconnect => {
                self.remove_peer(peer_id);
                info!("Peer {} ({}) disconnected", peer_id, addr);
                events.push(ServerEvent::Disconnected(peer_id, DisconnectReason::Remote));
            }
            Frame::Unreliable(payload) => {
                events.push(ServerEvent::Packet(peer_id, payload.to_vec()));
            }
            Frame::Reliable { sequence, payload } => {
                let received = peer.channel.receive(sequence, payload);
                if received.ack {
                    send_datagram(&self.socket, addr, &Frame::Ack { sequence }.encode());
                }
                events.extend(
                    received
                        .delivered
                        .into_iter()
                        .map(|payload| ServerEvent::Packet(peer_id, payload)),
                );
            }
            Frame::Ack { sequence } => {
                peer.channel.acknowledge(sequence);
            }
            Frame::Heartbeat | Frame::Accept | Frame::Reject => {}
        }
    }

    fn accept(&mut self, addr: SocketAddr, now: Instant, events: &mut Vec<ServerEvent>) {
        if self.peers.len() >= self.max_peers {
            warn!("Rejecting connection from {}: server full", addr);
            send_datagram(&self.socket, addr, &Frame::Reject.encode());
            return;
        }

        let id = PeerId(self.next_peer_id);
        self.next_peer_id = self.next_peer_id.wrapping_add(1);
        self.peers.insert(
            id,
            Peer {
                id,
                addr,
                channel: ReliableChannel::new(),
                last_received: now,
                last_sent: now,
            },
        );
        self.by_addr.insert(addr, id);
        send_datagram(&self.socket, addr, &Frame::Accept.encode());
        info!("Peer {} connected from {}", id, addr);
        events.push(ServerEvent::Connected(id));
    }

    fn maintain(&mut self, now: Instant, events: &mut Vec<ServerEvent>) {
        let mut dead = Vec::new();
        for peer in self.peers.values_mut() {
            let silent = now.saturating_duration_since(peer.last_received);
            if silent > self.config.peer_timeout
                || peer.channel.exhausted(self.config.max_resend_attempts)
            {
                dead.push(peer.id);
                continue;
            }

            for (sequence, payload) in peer.channel.due_resends(now, self.config.resend_interval) {
                let frame = Frame::Reliable {
                    sequence,
                    payload: &payload,
                };
                send_datagram(&self.socket, peer.addr, &frame.encode());
                peer.last_sent = now;
            }

            if now.saturating_duration_since(peer.last_sent) >= self.config.heartbeat_interval {
                send_datagram(&self.socket, peer.addr, &Frame::Heartbeat.encode());
                peer.last_sent = now;
            }
        }

        for id in dead {
            if let Some(peer) = self.remove_peer(id) {
                warn!("Peer {} ({}) timed out", id, peer.addr);
                events.push(ServerEvent::Disconnected(id, DisconnectReason::Timeout));
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let goodbye = Frame::Disconnect.encode();
        for peer in self.peers.values() {
            send_datagram(&self.socket, peer.addr, &goodbye);
        }
    }
}
