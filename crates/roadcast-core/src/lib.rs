//! Decentralized position-aware packet forwarding for vehicular networks.
//!
//! Vehicles discover one-hop neighbors through periodic hello beacons,
//! constrain greedy geographic forwarding to road corridors, plan across the
//! junction graph toward a rendezvous junction, and fall back to bounded
//! carry-and-forward when no relay exists.
//!
//! The crate is transport-agnostic: a [`protocol::RoadcastProtocol`] is
//! driven entirely by its host through the [`protocol::HostEnv`] trait, and
//! [`sim::RoadSim`] provides a deterministic in-process host for whole-fleet
//! runs.

pub mod beacon;
pub mod carry;
pub mod config;
pub mod error;
pub mod forwarding;
pub mod mobility;
pub mod neighbor;
pub mod planner;
pub mod protocol;
pub mod road;
pub mod sim;
pub mod types;
pub mod wire;

pub use config::ProtocolConfig;
pub use error::ProtocolError;
pub use protocol::{DropReason, HostEnv, Interface, RoadcastProtocol, Timer};
pub use road::{Junction, RoadMap, Trail, TrailSet};
pub use sim::{Motion, RoadSim, SimReport};
pub use types::{Direction, JunctionId, NodeAddr, Position, Timestamp};
