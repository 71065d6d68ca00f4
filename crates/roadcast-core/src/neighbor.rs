//! One-hop neighbor directory
//!
//! Tracks the vehicles heard from directly, keyed by originator address. A
//! fresher hello fully replaces the previous entry; a hello whose sequence
//! number is not strictly greater than the stored one is ignored. Sequence
//! numbers are compared as raw 16-bit integers with no wraparound handling —
//! a received value that wrapped past 65535 looks stale and is dropped. That
//! is documented protocol behavior, kept for compatibility.
//!
//! Entries expire through deferred checks: each accepted hello schedules one
//! check at now + hold time, and the check removes the entry only if its
//! recorded deadline has actually passed. A refresh in the meantime moves
//! the deadline, so earlier checks fall through as no-ops without any
//! rescheduling.

use crate::types::{Direction, JunctionId, NodeAddr, Position, Timestamp};
use crate::wire::HelloBody;
use std::collections::BTreeMap;
use std::time::Duration;

/// Link symmetry as observed from hello exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// We hear them; they have not yet listed us
    NotSym,
    /// Bidirectional: their hello lists us as a neighbor
    Sym,
}

/// State held for one neighbor
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub addr: NodeAddr,
    pub position: Position,
    pub speed: f32,
    pub direction: Direction,
    pub turn: Option<JunctionId>,
    pub seq: u16,
    pub status: LinkStatus,
    /// Absolute deadline after which the entry may be removed
    pub expires_at: Timestamp,
    /// Local interface address the hello arrived on
    pub recv_iface: NodeAddr,
}

/// Mapping from peer address to neighbor state.
///
/// A `BTreeMap` keeps iteration in address order, which the forwarding
/// tie-break depends on.
#[derive(Debug, Default)]
pub struct NeighborDirectory {
    entries: BTreeMap<NodeAddr, NeighborEntry>,
}

impl NeighborDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an accepted hello from `originator`.
    ///
    /// Returns `false` if the stored sequence number is already >= `seq`
    /// (raw integer compare) and the hello was ignored. On acceptance the
    /// entry is replaced wholesale, its expiry set to `now + validity`, and
    /// its status derived from whether `local_addr` appears in the hello's
    /// advertised neighbor list. The caller must schedule a deferred expiry
    /// check at now + hold time.
    pub fn update(
        &mut self,
        originator: NodeAddr,
        recv_iface: NodeAddr,
        seq: u16,
        validity: Duration,
        hello: &HelloBody,
        local_addr: NodeAddr,
        now: Timestamp,
    ) -> bool {
        if let Some(existing) = self.entries.get(&originator) {
            if existing.seq >= seq {
                return false;
            }
        }

        let status = if hello.neighbors.contains(&local_addr) {
            LinkStatus::Sym
        } else {
            LinkStatus::NotSym
        };

        self.entries.insert(
            originator,
            NeighborEntry {
                addr: originator,
                position: hello.position,
                speed: hello.speed,
                direction: hello.direction,
                turn: hello.turn,
                seq,
                status,
                expires_at: now + validity,
                recv_iface,
            },
        );
        true
    }

    /// Deferred expiry check for `addr`: removes the entry only if its
    /// recorded deadline has passed. A later refresh moves the deadline and
    /// makes this a no-op.
    pub fn expiry_check(&mut self, addr: NodeAddr, now: Timestamp) {
        if let Some(entry) = self.entries.get(&addr) {
            if entry.expires_at <= now {
                self.entries.remove(&addr);
            }
        }
    }

    pub fn get(&self, addr: &NodeAddr) -> Option<&NeighborEntry> {
        self.entries.get(addr)
    }

    pub fn remove(&mut self, addr: &NodeAddr) -> Option<NeighborEntry> {
        self.entries.remove(addr)
    }

    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.entries.contains_key(addr)
    }

    /// All entries in address order
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.values()
    }

    /// Symmetric neighbors in address order
    pub fn symmetric(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries
            .values()
            .filter(|e| e.status == LinkStatus::Sym)
    }

    /// Addresses of all known neighbors, for hello advertisement
    pub fn addresses(&self) -> Vec<NodeAddr> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
