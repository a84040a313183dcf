use super::channel::ReliableChannel;
use super::context::TransportContext;
use super::packet::{Frame, MAX_DATAGRAM_SIZE};
use super::{payload_fits, send_datagram, ClientEvent, Delivery, DisconnectReason, TransportConfig};
use log::{debug, info, warn};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting { started: Instant, last_attempt: Instant },
    Connected,
    Disconnected,
}

/// Connecting side of the transport. One server per client.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: TransportConfig,
    state: State,
    channel: ReliableChannel,
    last_received: Instant,
    last_sent: Instant,
    context: TransportContext,
}

impl Client {
    /// Binds an ephemeral local socket and starts the handshake. The
    /// connection is usable once [`ClientEvent::Connected`] is returned from
    /// [`service`](Self::service).
    pub async fn connect(server_addr: SocketAddr, config: TransportConfig) -> io::Result<Self> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        let now = Instant::now();
        let client = Self {
            socket,
            server_addr,
            config,
            state: State::Connecting {
                started: now,
                last_attempt: now,
            },
            channel: ReliableChannel::new(),
            last_received: now,
            last_sent: now,
            context: TransportContext::acquire(),
        };
        debug!("Connecting to {}", server_addr);
        send_datagram(&client.socket, server_addr, &Frame::Connect.encode());
        Ok(client)
    }

    /// Address the handshake targets.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Clock shared with every other transport endpoint.
    pub fn context(&self) -> &TransportContext {
        &self.context
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// True while the handshake is still being retried.
    pub fn is_connecting(&self) -> bool {
        matches!(self.state, State::Connecting { .. })
    }

    /// Reads everything pending, waiting up to `timeout` when nothing is, then
    /// handles handshake retries, resends, heartbeats and timeouts.
    pub async fn service(&mut self, timeout: Duration) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if self.state == State::Disconnected {
            return events;
        }
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

    /// Fails (returns false) unless the handshake has completed.
    pub fn send(&mut self, data: &[u8], delivery: Delivery) -> bool {
        if self.state != State::Connected {
            debug!("Dropping {} byte send: not connected", data.len());
            return false;
        }
        if !payload_fits(data.len(), self.server_addr) {
            return false;
        }
        let now = Instant::now();
        let bytes = match delivery {
            Delivery::Unreliable => Frame::Unreliable(data).encode(),
            Delivery::Reliable => {
                let sequence = self.channel.push(data.to_vec(), now);
                Frame::Reliable {
                    sequence,
                    payload: data,
                }
                .encode()
            }
        };
        self.last_sent = now;
        send_datagram(&self.socket, self.server_addr, &bytes)
    }

    /// Tells the server goodbye and stops servicing. No event is emitted.
    pub fn disconnect(&mut self) {
        if self.state == State::Disconnected {
            return;
        }
        send_datagram(&self.socket, self.server_addr, &Frame::Disconnect.encode());
        self.state = State::Disconnected;
        info!("Disconnected from {}", self.server_addr);
    }

    fn drain(&mut self, events: &mut Vec<ClientEvent>) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buffer) {
                Ok((len, addr)) if addr == self.server_addr => {
                    self.handle_datagram(&buffer[..len], events)
                }
                Ok((_, addr)) => debug!("Ignoring datagram from stranger {}", addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("Receive error: {}", e);
                    break;
                }
            }
        }
    }

    fn mark_connected(&mut self, events: &mut Vec<ClientEvent>) {
        if let State::Connecting { .. } = self.state {
            self.state = State::Connected;
            info!("Connected to {}", self.server_addr);
            events.push(ClientEvent::Connected);
        }
    }

    fn handle_datagram(&mut self, data: &[u8], events: &mut Vec<ClientEvent>) {
        if self.state == State::Disconnected {
            return;
        }
        let Some(frame) = Frame::decode(data) else {
            debug!("Dropping malformed datagram ({} bytes)", data.len());
            return;
        };
        self.last_received = Instant::now();

        match frame {
            Frame::Accept | Frame::Heartbeat => self.mark_connected(events),
            Frame::Reject => {
                if self.is_connecting() {
                    warn!("Connection to {} rejected", self.server_addr);
                    self.state = State::Disconnected;
                    events.push(ClientEvent::Disconnected(DisconnectReason::Rejected));
                }
            }
            Frame::Disconnect => {
                info!("Server {} closed the connection", self.server_addr);
                self.state = State::Disconnected;
                events.push(ClientEvent::Disconnected(DisconnectReason::Remote));
            }
            Frame::Unreliable(payload) => {
                self.mark_connected(events);
                events.push(ClientEvent::Packet(payload.to_vec()));
            }
            Frame::Reliable { sequence, payload } => {
                self.mark_connected(events);
                let received = self.channel.receive(sequence, payload);
                if received.ack {
                    send_datagram(
                        &self.socket,
                        self.server_addr,
                        &Frame::Ack { sequence }.encode(),
                    );
                }
                events.extend(received.delivered.into_iter().map(ClientEvent::Packet));
            }
            Frame::Ack { sequence } => {
                self.channel.acknowledge(sequence);
            }
            Frame::Connect => {}
        }
    }

    fn maintain(&mut self, now: Instant, events: &mut Vec<ClientEvent>) {
        match self.state {
            State::Disconnected => {}
            State::Connecting {
                started,
                last_attempt,
            } => {
                if now.saturating_duration_since(started) > self.config.connect_timeout {
                    warn!("Connection to {} timed out", self.server_addr);
                    self.state = State::Disconnected;
                    events.push(ClientEvent::Disconnected(DisconnectReason::Timeout));
                } else if now.saturating_duration_since(last_attempt)
                    >= self.config.connect_retry_interval
                {
                    send_datagram(&self.socket, self.server_addr, &Frame::Connect.encode());
                    self.state = State::Connecting {
                        started,
                        last_attempt: now,
                    };
                }
            }
            State::Connected => {
                let silent = now.saturating_duration_since(self.last_received);
                if silent > self.config.peer_timeout
                    || self.channel.exhausted(self.config.max_resend_attempts)
                {
                    warn!("Connection to {} timed out", self.server_addr);
                    self.state = State::Disconnected;
                    events.push(ClientEvent::Disconnected(DisconnectReason::Timeout));
                    return;
                }

                for (sequence, payload) in
                    self.channel.due_resends(now, self.config.resend_interval)
                {
                    let frame = Frame::Reliable {
                        sequence,
                        payload: &payload,
                    };
                    send_datagram(&self.socket, self.server_addr, &frame.encode());
                    self.last_sent = now;
                }

                if now.saturating_duration_since(self.last_sent) >= self.config.heartbeat_interval
                {
                    send_datagram(&self.socket, self.server_addr, &Frame::Heartbeat.encode());
                    self.last_sent = now;
                }
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.state != State::Disconnected {
            send_datagram(&self.socket, self.server_addr, &Frame::Disconnect.encode());
        }
    }
}
