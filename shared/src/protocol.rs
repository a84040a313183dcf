//! Game message codec.
//!
//! Every message starts with a two byte header `[version][type]`. Bodies are
//! fixed-layout little-endian records encoded with bincode's fixed-int
//! options, so field order in the structs below is the wire order:
//!
//! | message      | body                                                      |
//! |--------------|-----------------------------------------------------------|
//! | JoinRequest  | empty                                                     |
//! | JoinAccept   | `player_id u32`                                           |
//! | Input        | `player_id u32, dir_x f32, dir_y f32, sequence u32, timestamp_ms u32` |
//! | State        | `tick u32, server_time_ms u32, arena_radius f32, count u32` then `count` player records |
//! | Ping / Pong  | `timestamp_ms u32`                                        |
//!
//! A player record is 21 bytes: `player_id u32, x f32, y f32, vx f32, vy f32,
//! alive u8` with no padding. Decoding is all-or-nothing: any length, version
//! or field problem yields a [`ParseError`] and nothing is partially applied.

use crate::transport::MAX_PAYLOAD_SIZE;
use crate::vec2::Vec2;
use bincode::Options;
use log::error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTOCOL_VERSION: u8 = 1;
/// `[version][type]` prefix of every message.
pub const HEADER_SIZE: usize = 2;
pub const JOIN_ACCEPT_SIZE: usize = 4;
pub const INPUT_SIZE: usize = 20;
pub const PING_SIZE: usize = 4;
pub const STATE_HEADER_SIZE: usize = 16;
/// One packed `PlayerState` record.
pub const PLAYER_STATE_SIZE: usize = 21;
/// Largest player count whose snapshot still fits one datagram, even when
/// sent reliably. Larger counts are rejected.
pub const MAX_SNAPSHOT_PLAYERS: u32 =
    ((MAX_PAYLOAD_SIZE - HEADER_SIZE - STATE_HEADER_SIZE) / PLAYER_STATE_SIZE) as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    JoinRequest = 1,
    JoinAccept = 2,
    Input = 3,
    State = 4,
    Ping = 5,
    Pong = 6,
}

impl TryFrom<u8> for MessageType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::JoinRequest),
            2 => Ok(MessageType::JoinAccept),
            3 => Ok(MessageType::Input),
            4 => Ok(MessageType::State),
            5 => Ok(MessageType::Ping),
            6 => Ok(MessageType::Pong),
            other => Err(ParseError::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("packet too short: expected {expected} bytes, received {actual} bytes ({context})")]
    PacketTooShort {
        expected: usize,
        actual: usize,
        context: &'static str,
    },
    #[error("protocol version mismatch: expected v{expected}, received v{actual}")]
    InvalidProtocolVersion { expected: u8, actual: u8 },
    #[error("invalid field value in '{field}': {context}")]
    InvalidFieldValue { field: &'static str, context: String },
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("invalid player count {count}: {context}")]
    InvalidPlayerCount { count: u32, context: String },
    #[error("invalid message structure: {0}")]
    InvalidMessageStructure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JoinAccept {
    pub player_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputCommand {
    pub player_id: u32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub sequence: u32,
    pub timestamp_ms: u32,
}

impl InputCommand {
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.dir_x, self.dir_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub alive: bool,
}

impl PlayerState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }
}

/// Payload of both Ping and Pong; the server echoes the client's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub tick: u32,
    pub server_time_ms: u32,
    pub arena_radius: f32,
    pub players: Vec<PlayerState>,
}

#[derive(Serialize, Deserialize)]
struct StateHeader {
    tick: u32,
    server_time_ms: u32,
    arena_radius: f32,
    player_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    JoinRequest,
    JoinAccept(JoinAccept),
    Input(InputCommand),
    State(StateSnapshot),
    Ping(Ping),
    Pong(Ping),
}

impl Message {
    /// Type byte this message is encoded with.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::JoinRequest => MessageType::JoinRequest,
            Message::JoinAccept(_) => MessageType::JoinAccept,
            Message::Input(_) => MessageType::Input,
            Message::State(_) => MessageType::State,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
        }
    }

    /// Header plus body, ready for the transport.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::JoinRequest => serialize_join_request(),
            Message::JoinAccept(accept) => serialize_join_accept(accept),
            Message::Input(cmd) => serialize_input(cmd),
            Message::State(snapshot) => serialize_state(snapshot),
            Message::Ping(ping) => serialize_ping(ping),
            Message::Pong(pong) => serialize_pong(pong),
        }
    }

    /// Parses any message, checking version, type and exact length.
    pub fn decode(data: &[u8]) -> Result<Message, ParseError> {
        match parse_header(data)? {
            MessageType::JoinRequest => {
                expect_body_len(data, 0, "join request")?;
                Ok(Message::JoinRequest)
            }
            MessageType::JoinAccept => deserialize_join_accept(data).map(Message::JoinAccept),
            MessageType::Input => deserialize_input(data).map(Message::Input),
            MessageType::State => deserialize_state(data).map(Message::State),
            MessageType::Ping => deserialize_ping(data).map(Message::Ping),
            MessageType::Pong => deserialize_ping(data).map(Message::Pong),
        }
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn header(kind: MessageType, body_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + body_len);
    out.push(PROTOCOL_VERSION);
    out.push(kind as u8);
    out
}

fn append<T: Serialize>(out: &mut Vec<u8>, kind: MessageType, value: &T) {
    // Fixed-size records written into a Vec cannot fail.
    if let Err(e) = codec().serialize_into(&mut *out, value) {
        error!("Failed to encode {:?} message: {}", kind, e);
    }
}

fn encode_body<T: Serialize>(kind: MessageType, body_len: usize, body: &T) -> Vec<u8> {
    let mut out = header(kind, body_len);
    append(&mut out, kind, body);
    out
}

/// Validates length and version and returns the message type.
pub fn parse_header(data: &[u8]) -> Result<MessageType, ParseError> {
    if data.len() < HEADER_SIZE {
        return Err(ParseError::PacketTooShort {
            expected: HEADER_SIZE,
            actual: data.len(),
            context: "message header",
        });
    }
    if data[0] != PROTOCOL_VERSION {
        return Err(ParseError::InvalidProtocolVersion {
            expected: PROTOCOL_VERSION,
            actual: data[0],
        });
    }
    MessageType::try_from(data[1])
}

fn expect_type(data: &[u8], kind: MessageType) -> Result<(), ParseError> {
    let actual = parse_header(data)?;
    if actual != kind {
        return Err(ParseError::InvalidMessageStructure(format!(
            "expected {:?} message, found {:?}",
            kind, actual
        )));
    }
    Ok(())
}

fn expect_body_len(data: &[u8], size: usize, context: &'static str) -> Result<(), ParseError> {
    let body = data.len().saturating_sub(HEADER_SIZE);
    if body < size {
        return Err(ParseError::PacketTooShort {
            expected: HEADER_SIZE + size,
            actual: data.len(),
            context,
        });
    }
    if body > size {
        return Err(ParseError::InvalidMessageStructure(format!(
            "{} has {} trailing bytes",
            context,
            body - size
        )));
    }
    Ok(())
}

fn decode_record<T: DeserializeOwned>(bytes: &[u8], context: &'static str) -> Result<T, ParseError> {
    codec().deserialize(bytes).map_err(|e| match *e {
        bincode::ErrorKind::InvalidBoolEncoding(value) => ParseError::InvalidFieldValue {
            field: "alive",
            context: format!("{} flag byte {} is not 0 or 1", context, value),
        },
        other => ParseError::CorruptedData(format!("{}: {}", context, other)),
    })
}

fn decode_body<T: DeserializeOwned>(
    data: &[u8],
    kind: MessageType,
    size: usize,
    context: &'static str,
) -> Result<T, ParseError> {
    expect_type(data, kind)?;
    expect_body_len(data, size, context)?;
    decode_record(&data[HEADER_SIZE..], context)
}

fn require_finite(field: &'static str, value: f32) -> Result<(), ParseError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParseError::InvalidFieldValue {
            field,
            context: format!("{} is not finite", value),
        })
    }
}

pub fn serialize_join_request() -> Vec<u8> {
    header(MessageType::JoinRequest, 0)
}

pub fn serialize_join_accept(accept: &JoinAccept) -> Vec<u8> {
    encode_body(MessageType::JoinAccept, JOIN_ACCEPT_SIZE, accept)
}

pub fn serialize_input(cmd: &InputCommand) -> Vec<u8> {
    encode_body(MessageType::Input, INPUT_SIZE, cmd)
}

pub fn serialize_ping(ping: &Ping) -> Vec<u8> {
    encode_body(MessageType::Ping, PING_SIZE, ping)
}

pub fn serialize_pong(pong: &Ping) -> Vec<u8> {
    encode_body(MessageType::Pong, PING_SIZE, pong)
}

/// Header, state header, then one record per player.
pub fn serialize_state(snapshot: &StateSnapshot) -> Vec<u8> {
    let body_len = STATE_HEADER_SIZE + snapshot.players.len() * PLAYER_STATE_SIZE;
    let mut out = header(MessageType::State, body_len);
    let state_header = StateHeader {
        tick: snapshot.tick,
        server_time_ms: snapshot.server_time_ms,
        arena_radius: snapshot.arena_radius,
        player_count: snapshot.players.len() as u32,
    };
    append(&mut out, MessageType::State, &state_header);
    for player in &snapshot.players {
        append(&mut out, MessageType::State, player);
    }
    out
}

pub fn deserialize_join_accept(data: &[u8]) -> Result<JoinAccept, ParseError> {
    decode_body(data, MessageType::JoinAccept, JOIN_ACCEPT_SIZE, "join accept")
}

/// Rejects non-finite direction components.
pub fn deserialize_input(data: &[u8]) -> Result<InputCommand, ParseError> {
    let cmd: InputCommand = decode_body(data, MessageType::Input, INPUT_SIZE, "input")?;
    require_finite("dir_x", cmd.dir_x)?;
    require_finite("dir_y", cmd.dir_y)?;
    Ok(cmd)
}

/// Decodes either a Ping or a Pong body.
pub fn deserialize_ping(data: &[u8]) -> Result<Ping, ParseError> {
    let kind = parse_header(data)?;
    if kind != MessageType::Ping && kind != MessageType::Pong {
        return Err(ParseError::InvalidMessageStructure(format!(
            "expected Ping or Pong message, found {:?}",
            kind
        )));
    }
    expect_body_len(data, PING_SIZE, "ping")?;
    decode_record(&data[HEADER_SIZE..], "ping")
}

/// Validates the declared player count against both the cap and the bytes present.
pub fn deserialize_state(data: &[u8]) -> Result<StateSnapshot, ParseError> {
    expect_type(data, MessageType::State)?;
    let fixed_end = HEADER_SIZE + STATE_HEADER_SIZE;
    if data.len() < fixed_end {
        return Err(ParseError::PacketTooShort {
            expected: fixed_end,
            actual: data.len(),
            context: "state header",
        });
    }

    let state_header: StateHeader = decode_record(&data[HEADER_SIZE..fixed_end], "state header")?;
    require_finite("arena_radius", state_header.arena_radius)?;

    let count = state_header.player_count;
    if count > MAX_SNAPSHOT_PLAYERS {
        return Err(ParseError::InvalidPlayerCount {
            count,
            context: format!("exceeds maximum of {}", MAX_SNAPSHOT_PLAYERS),
        });
    }

    let records = &data[fixed_end..];
    let needed = count as usize * PLAYER_STATE_SIZE;
    if records.len() != needed {
        return Err(ParseError::InvalidPlayerCount {
            count,
            context: format!(
                "needs {} bytes of player records, packet carries {}",
                needed,
                records.len()
            ),
        });
    }

    let players = records
        .chunks_exact(PLAYER_STATE_SIZE)
        .map(|chunk| {
            let player: PlayerState = decode_record(chunk, "player state")?;
            for (field, value) in [
                ("x", player.x),
                ("y", player.y),
                ("vx", player.vx),
                ("vy", player.vy),
            ] {
                require_finite(field, value)?;
            }
            Ok(player)
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    Ok(StateSnapshot {
        tick: state_header.tick,
        server_time_ms: state_header.server_time_ms,
        arena_radius: state_header.arena_radius,
        players,
    })
}
