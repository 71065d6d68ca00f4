//! Core identifier, geometry and time types
//!
//! Everything here is small, `Copy` where possible, and shared by every other
//! module: node addresses, planar positions, axis-aligned travel directions
//! and the virtual timestamps the protocol runs on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Junction identifier — an index into the road map, in `[0, N)`.
pub type JunctionId = usize;

/// Node address — 4-byte unique ID, `Ord` so that address-keyed maps iterate
/// in a deterministic order (the forwarding tie-break relies on this).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddr([u8; 4]);

impl NodeAddr {
    /// Create a new NodeAddr from 4 bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        NodeAddr(bytes)
    }

    /// Create a NodeAddr from a u32
    pub fn from_u32(value: u32) -> Self {
        NodeAddr(value.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Deterministic integer node index derived from the address.
    ///
    /// Addresses are assigned sequentially within a /16, so the low two
    /// bytes recover a dense zero-based index.
    pub fn index(&self) -> i64 {
        let n = self.to_u32() as i64;
        (n / 256 % 256) * 256 + n % 256 - 1
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeAddr({}.{}.{}.{})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A position in the 2D road plane (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Straight-line distance to another position in meters
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned travel direction along a road segment.
///
/// The numeric values are part of the wire format (2-bit field in hello
/// messages) and of the corridor test: even values run along the x axis,
/// odd values along the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    East = 0,
    North = 1,
    West = 2,
    South = 3,
}

impl Direction {
    /// Decode from the 2-bit wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::East),
            1 => Some(Direction::North),
            2 => Some(Direction::West),
            3 => Some(Direction::South),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Opposite direction on the same road axis
    pub fn opposite(&self) -> Self {
        Direction::from_u8((self.as_u8() + 2) % 4).unwrap()
    }

    /// True for East/West travel (the corridor pads the y axis then)
    pub fn is_horizontal(&self) -> bool {
        self.as_u8() % 2 == 0
    }
}

/// Virtual protocol time: elapsed duration since the host clock's epoch.
///
/// The protocol never reads a wall clock; every handler receives the current
/// time from the host, which keeps event handling deterministic and lets
/// tests drive time explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp(Duration::from_secs_f64(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future
    pub fn since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_addr_roundtrip() {
        let addr = NodeAddr::from_bytes([10, 0, 1, 5]);
        assert_eq!(addr.to_u32(), 0x0a000105);
        assert_eq!(NodeAddr::from_u32(addr.to_u32()), addr);
    }

    #[test]
    fn test_node_addr_index() {
        // 10.0.0.1 is node 0, 10.0.0.2 node 1, 10.0.1.1 node 256
        assert_eq!(NodeAddr::from_bytes([10, 0, 0, 1]).index(), 0);
        assert_eq!(NodeAddr::from_bytes([10, 0, 0, 2]).index(), 1);
        assert_eq!(NodeAddr::from_bytes([10, 0, 1, 1]).index(), 256);
    }

    #[test]
    fn test_node_addr_ordering() {
        let a = NodeAddr::from_bytes([10, 0, 0, 1]);
        let b = NodeAddr::from_bytes([10, 0, 0, 2]);
        assert!(a < b);
    }

    #[test]
    fn test_position_distance() {
        let p1 = Position::new(0.0, 0.0);
        let p2 = Position::new(3.0, 4.0);
        assert!((p1.distance_to(&p2) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::East.opposite(), Direction::West);
        assert_eq!(Direction::North.opposite(), Direction::South);
        assert!(Direction::East.is_horizontal());
        assert!(!Direction::South.is_horizontal());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::ZERO + Duration::from_millis(1500);
        assert_eq!(t.as_secs_f64(), 1.5);
        assert_eq!(t.since(Timestamp::ZERO), Duration::from_millis(1500));
        assert_eq!(Timestamp::ZERO.since(t), Duration::ZERO);
    }
}
