//! Wire formats for control and data traffic
//!
//! All control traffic is framed as a control packet (length + packet
//! sequence) carrying one or more messages, each with its own header. Only
//! the HELLO message type is defined; unknown types are skipped using the
//! per-message size field. Data packets get a small routing header prepended
//! at each hop.
//!
//! ```text
//! Control packet:
//! ┌──────────────┬──────────────┬──────────────────┬─────┐
//! │ length (2B)  │ pkt seq (2B) │ message … (var)  │ …   │
//! └──────────────┴──────────────┴──────────────────┴─────┘
//!
//! Message:
//! ┌──────┬───────────┬─────┬──────┬─────────┬────────────┬──────────┐
//! │ type │ validity  │ TTL │ hops │ msg seq │ originator │ size     │
//! │ (1B) │ ms (2B)   │(1B) │ (1B) │  (2B)   │    (4B)    │ (2B)     │
//! └──────┴───────────┴─────┴──────┴─────────┴────────────┴──────────┘
//!
//! Hello body:
//! ┌────────┬────────┬───────┬─────┬──────┬───────┬────────────────┐
//! │ x (8B) │ y (8B) │ speed │ dir │ turn │ count │ neighbors (4B×n)│
//! │        │        │ (4B)  │(1B) │ (2B) │ (2B)  │                │
//! └────────┴────────┴───────┴─────┴──────┴───────┴────────────────┘
//! ```
//!
//! All integers are big-endian.

use crate::types::{Direction, JunctionId, NodeAddr, Position};
use std::time::Duration;
use thiserror::Error;

/// Well-known port all control traffic uses
pub const CONTROL_PORT: u16 = 12345;

/// Maximum number of messages batched into one control packet
pub const MAX_MSGS_PER_PACKET: usize = 64;

/// Sequence numbers wrap modulo 65536
pub const MAX_SEQ_NUM: u16 = 65535;

/// HELLO message type value
pub const MSG_HELLO: u8 = 1;

/// Control packet header size in bytes
pub const CTRL_HEADER_SIZE: usize = 4;

/// Message header size in bytes
pub const MSG_HEADER_SIZE: usize = 13;

/// Data routing header size in bytes
pub const DATA_HEADER_SIZE: usize = 6;

/// Errors produced while decoding inbound packets.
///
/// Decoding failures are never fatal: the receive path drops the offending
/// packet and carries on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated packet: needed {needed} more bytes")]
    Truncated { needed: usize },
    #[error("declared length {declared} does not match packet size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("invalid direction value {0}")]
    InvalidDirection(u8),
    #[error("invalid message size {0}")]
    InvalidMessageSize(u16),
}

/// Cursor over an inbound byte slice
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated { needed: n - self.remaining() });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(self.u16()? as i16)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn addr(&mut self) -> Result<NodeAddr, DecodeError> {
        let b = self.take(4)?;
        Ok(NodeAddr::from_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// HELLO message body: the sender's kinematic state plus its neighbor list
/// (receivers use the list for symmetry detection)
#[derive(Debug, Clone, PartialEq)]
pub struct HelloBody {
    pub position: Position,
    pub speed: f32,
    pub direction: Direction,
    /// Junction id of a latched pending turn, if any
    pub turn: Option<JunctionId>,
    pub neighbors: Vec<NodeAddr>,
}

impl HelloBody {
    fn encoded_len(&self) -> usize {
        8 + 8 + 4 + 1 + 2 + 2 + 4 * self.neighbors.len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.position.x.to_be_bytes());
        buf.extend_from_slice(&self.position.y.to_be_bytes());
        buf.extend_from_slice(&self.speed.to_be_bytes());
        buf.push(self.direction.as_u8());
        let turn = self.turn.map(|j| j as i16).unwrap_or(-1);
        buf.extend_from_slice(&turn.to_be_bytes());
        buf.extend_from_slice(&(self.neighbors.len() as u16).to_be_bytes());
        for addr in &self.neighbors {
            buf.extend_from_slice(addr.as_bytes());
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let x = r.f64()?;
        let y = r.f64()?;
        let speed = r.f32()?;
        let dir = r.u8()?;
        let direction = Direction::from_u8(dir).ok_or(DecodeError::InvalidDirection(dir))?;
        let turn = match r.i16()? {
            t if t < 0 => None,
            t => Some(t as JunctionId),
        };
        let count = r.u16()? as usize;
        let mut neighbors = Vec::with_capacity(count);
        for _ in 0..count {
            neighbors.push(r.addr()?);
        }
        Ok(Self { position: Position::new(x, y), speed, direction, turn, neighbors })
    }
}

/// Body of a decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Hello(HelloBody),
    /// A type this implementation does not understand; skipped, kept for
    /// logging
    Unknown { msg_type: u8 },
}

/// One message inside a control packet
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub ttl: u8,
    pub hop_count: u8,
    pub seq: u16,
    pub originator: NodeAddr,
    /// How long receivers may treat the carried state as valid
    pub validity: Duration,
    pub body: MessageBody,
}

impl Message {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let body_len = match &self.body {
            MessageBody::Hello(h) => h.encoded_len(),
            MessageBody::Unknown { .. } => 0,
        };
        let msg_type = match &self.body {
            MessageBody::Hello(_) => MSG_HELLO,
            MessageBody::Unknown { msg_type } => *msg_type,
        };
        buf.push(msg_type);
        buf.extend_from_slice(&(self.validity.as_millis() as u16).to_be_bytes());
        buf.push(self.ttl);
        buf.push(self.hop_count);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(self.originator.as_bytes());
        buf.extend_from_slice(&((MSG_HEADER_SIZE + body_len) as u16).to_be_bytes());
        if let MessageBody::Hello(h) = &self.body {
            h.encode_into(buf);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let msg_type = r.u8()?;
        let validity = Duration::from_millis(r.u16()? as u64);
        let ttl = r.u8()?;
        let hop_count = r.u8()?;
        let seq = r.u16()?;
        let originator = r.addr()?;
        let size = r.u16()?;
        if (size as usize) < MSG_HEADER_SIZE {
            return Err(DecodeError::InvalidMessageSize(size));
        }
        let body_len = size as usize - MSG_HEADER_SIZE;
        let body = if msg_type == MSG_HELLO {
            let mut body_reader = Reader::new(r.take(body_len)?);
            MessageBody::Hello(HelloBody::decode(&mut body_reader)?)
        } else {
            r.take(body_len)?;
            MessageBody::Unknown { msg_type }
        };
        Ok(Self { ttl, hop_count, seq, originator, validity, body })
    }
}

/// A decoded control packet
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPacket {
    pub seq: u16,
    pub messages: Vec<Message>,
}

/// Encode a batch of messages into one control packet
pub fn encode_control(seq: u16, messages: &[Message]) -> Vec<u8> {
    let mut body = Vec::new();
    for msg in messages {
        msg.encode_into(&mut body);
    }
    let mut buf = Vec::with_capacity(CTRL_HEADER_SIZE + body.len());
    buf.extend_from_slice(&((CTRL_HEADER_SIZE + body.len()) as u16).to_be_bytes());
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Decode a control packet, validating the declared length against the
/// actual byte count
pub fn decode_control(bytes: &[u8]) -> Result<ControlPacket, DecodeError> {
    let mut r = Reader::new(bytes);
    let length = r.u16()? as usize;
    let seq = r.u16()?;
    if length != bytes.len() {
        return Err(DecodeError::LengthMismatch { declared: length, actual: bytes.len() });
    }
    let mut messages = Vec::new();
    while r.remaining() > 0 {
        messages.push(Message::decode(&mut r)?);
    }
    Ok(ControlPacket { seq, messages })
}

/// Routing header prepended to unicast data packets.
///
/// Carries the junction the packet is currently heading for and the node
/// index of the previous forwarder (absent on the final hop and on locally
/// originated packets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub junction: Option<JunctionId>,
    pub sender: Option<i64>,
}

impl DataHeader {
    pub fn encode(&self) -> [u8; DATA_HEADER_SIZE] {
        let mut buf = [0u8; DATA_HEADER_SIZE];
        let junction = self.junction.map(|j| j as u16).unwrap_or(u16::MAX);
        buf[0..2].copy_from_slice(&junction.to_be_bytes());
        let sender = self.sender.map(|s| s as i32).unwrap_or(-1);
        buf[2..6].copy_from_slice(&sender.to_be_bytes());
        buf
    }

    /// Decode the header, returning it and the remaining payload
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = Reader::new(bytes);
        let junction = match r.u16()? {
            u16::MAX => None,
            j => Some(j as JunctionId),
        };
        let sender = match r.i32()? {
            s if s < 0 => None,
            s => Some(s as i64),
        };
        Ok((Self { junction, sender }, &bytes[DATA_HEADER_SIZE..]))
    }
}
