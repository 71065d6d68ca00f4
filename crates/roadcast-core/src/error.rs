//! Protocol error types

use thiserror::Error;

/// Errors surfaced during protocol initialization.
///
/// Runtime conditions like TTL exhaustion, carry timeouts or missing next
/// hops are not errors — they produce drop/store events and the packet is
/// handled locally.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No usable interface was supplied; the instance cannot receive or
    /// transmit and must not start
    #[error("no usable network interface")]
    NoInterfaces,

    /// The scenario provides no trails to select a road position from
    #[error("trail set is empty")]
    NoTrails,

    /// The selected trail has fewer than the two junctions needed to seed
    /// the current/next position
    #[error("trail too short: {len} junctions, need at least 2")]
    TrailTooShort { len: usize },

    /// A configured junction id is outside the road map
    #[error("junction id {id} out of range for a map of {count} junctions")]
    JunctionOutOfRange { id: usize, count: usize },

    /// The configured junction count disagrees with the road map
    #[error("configured junction count {configured} does not match road map size {actual}")]
    JunctionCountMismatch { configured: usize, actual: usize },
}
