//! Datagram framing for the transport layer.
//!
//! `[magic][kind]` followed by a little-endian `u32` sequence for reliable
//! data and acks, then the payload. Game messages travel as payload and are
//! opaque here.

pub const MAGIC: u8 = 0xA7;
pub const FRAME_HEADER_SIZE: usize = 2;
pub const SEQUENCE_SIZE: usize = 4;
/// Largest datagram either side will read.
pub const MAX_DATAGRAM_SIZE: usize = 2048;
/// Largest payload that fits one datagram with either delivery.
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - FRAME_HEADER_SIZE - SEQUENCE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Connect = 1,
    Accept = 2,
    Reject = 3,
    Disconnect = 4,
    Heartbeat = 5,
    Unreliable = 6,
    Reliable = 7,
    Ack = 8,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => FrameKind::Connect,
            2 => FrameKind::Accept,
            3 => FrameKind::Reject,
            4 => FrameKind::Disconnect,
            5 => FrameKind::Heartbeat,
            6 => FrameKind::Unreliable,
            7 => FrameKind::Reliable,
            8 => FrameKind::Ack,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Connect,
    Accept,
    Reject,
    Disconnect,
    Heartbeat,
    Unreliable(&'a [u8]),
    Reliable { sequence: u32, payload: &'a [u8] },
    Ack { sequence: u32 },
}

impl<'a> Frame<'a> {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Connect => FrameKind::Connect,
            Frame::Accept => FrameKind::Accept,
            Frame::Reject => FrameKind::Reject,
            Frame::Disconnect => FrameKind::Disconnect,
            Frame::Heartbeat => FrameKind::Heartbeat,
            Frame::Unreliable(_) => FrameKind::Unreliable,
            Frame::Reliable { .. } => FrameKind::Reliable,
            Frame::Ack { .. } => FrameKind::Ack,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload_len = match self {
            Frame::Unreliable(payload) => payload.len(),
            Frame::Reliable { payload, .. } => SEQUENCE_SIZE + payload.len(),
            Frame::Ack { .. } => SEQUENCE_SIZE,
            _ => 0,
        };
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);
        out.push(MAGIC);
        out.push(self.kind() as u8);
        match self {
            Frame::Unreliable(payload) => out.extend_from_slice(payload),
            Frame::Reliable { sequence, payload } => {
                out.extend_from_slice(&sequence.to_le_bytes());
                out.extend_from_slice(payload);
            }
            Frame::Ack { sequence } => out.extend_from_slice(&sequence.to_le_bytes()),
            _ => {}
        }
        out
    }

    /// Returns `None` for anything that is not a well-formed frame.
    pub fn decode(data: &'a [u8]) -> Option<Frame<'a>> {
        if data.len() < FRAME_HEADER_SIZE || data[0] != MAGIC {
            return None;
        }
        let kind = FrameKind::from_byte(data[1])?;
        let body = &data[FRAME_HEADER_SIZE..];

        let frame = match kind {
            FrameKind::Connect => Frame::Connect,
            FrameKind::Accept => Frame::Accept,
            FrameKind::Reject => Frame::Reject,
            FrameKind::Disconnect => Frame::Disconnect,
            FrameKind::Heartbeat => Frame::Heartbeat,
            FrameKind::Unreliable => Frame::Unreliable(body),
            FrameKind::Reliable => {
                let sequence = read_sequence(body)?;
                Frame::Reliable {
                    sequence,
                    payload: &body[SEQUENCE_SIZE..],
                }
            }
            FrameKind::Ack => {
                if body.len() != SEQUENCE_SIZE {
                    return None;
                }
                Frame::Ack {
                    sequence: read_sequence(body)?,
                }
            }
        };
        Some(frame)
    }
}

fn read_sequence(body: &[u8]) -> Option<u32> {
    let bytes: [u8; SEQUENCE_SIZE] = body.get(..SEQUENCE_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
