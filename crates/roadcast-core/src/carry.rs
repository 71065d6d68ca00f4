//! Carry-and-forward packet buffering
//!
//! Three holding areas for data packets that cannot leave immediately, plus
//! the per-flow carry clock:
//!
//! - the wait queue, for packets with no usable next hop; re-examined when a
//!   new neighbor appears and on every position check
//! - the delay queue, for packets suspected of ping-ponging back to their
//!   previous sender; released after a short hold
//! - the send queue, drained at a fixed pace so re-routed packets do not
//!   burst out in one tick
//!
//! All three drain from the back, so the most recently queued packet is
//! re-examined first. The carry clock records, per (source, destination)
//! flow, when carrying began; it is set once and only cleared when the flow
//! leaves the wait state or the packet is dropped.

use crate::types::{NodeAddr, Timestamp};
use crate::wire::DataHeader;
use std::collections::BTreeMap;
use std::time::Duration;

/// A data packet held by this node, with enough context to re-route it
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub header: DataHeader,
    pub payload: Vec<u8>,
    pub src: NodeAddr,
    pub dst: NodeAddr,
    pub ttl: u8,
}

/// A packet with its chosen gateway, ready to transmit
#[derive(Debug, Clone)]
pub struct SendEntry {
    pub packet: PendingPacket,
    pub gateway: NodeAddr,
}

/// The buffering state of the carry-and-forward stage
#[derive(Debug, Default)]
pub struct CarryQueue {
    waiting: Vec<PendingPacket>,
    delayed: Vec<(PendingPacket, NodeAddr)>,
    send: Vec<SendEntry>,
    /// Per-flow carry start time, keyed by (source, destination)
    carry_start: BTreeMap<(NodeAddr, NodeAddr), Timestamp>,
}

impl CarryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a packet with no next hop and start its flow's carry clock if
    /// not already running. Returns true if the clock was started now.
    pub fn store(&mut self, packet: PendingPacket, now: Timestamp) -> bool {
        let key = (packet.src, packet.dst);
        self.waiting.push(packet);
        if self.carry_start.contains_key(&key) {
            false
        } else {
            self.carry_start.insert(key, now);
            true
        }
    }

    /// How long the (src, dst) flow has been carried, if it is being carried
    pub fn carry_age(&self, src: NodeAddr, dst: NodeAddr, now: Timestamp) -> Option<Duration> {
        self.carry_start.get(&(src, dst)).map(|start| now.since(*start))
    }

    /// Stop the carry clock for a flow (packet forwarded or dropped)
    pub fn clear_carry(&mut self, src: NodeAddr, dst: NodeAddr) {
        self.carry_start.remove(&(src, dst));
    }

    /// Pop the most recently stored waiting packet
    pub fn pop_waiting(&mut self) -> Option<PendingPacket> {
        self.waiting.pop()
    }

    pub fn has_waiting(&self) -> bool {
        !self.waiting.is_empty()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Hold a packet suspected of bouncing back to `next_hop`
    pub fn delay(&mut self, packet: PendingPacket, next_hop: NodeAddr) {
        self.delayed.push((packet, next_hop));
    }

    /// Release the most recently delayed packet
    pub fn pop_delayed(&mut self) -> Option<(PendingPacket, NodeAddr)> {
        self.delayed.pop()
    }

    /// Queue a routed packet for paced transmission
    pub fn enqueue_send(&mut self, entry: SendEntry) {
        self.send.push(entry);
    }

    /// Pop the next packet to transmit
    pub fn pop_send(&mut self) -> Option<SendEntry> {
        self.send.pop()
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send.is_empty()
    }
}
