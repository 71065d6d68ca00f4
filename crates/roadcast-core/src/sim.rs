//! Deterministic multi-vehicle simulation harness
//!
//! Drives any number of protocol instances from a single virtual clock. One
//! binary heap orders every pending event by (time, insertion sequence), so
//! a run is a pure function of its inputs: same map, motions and send
//! schedule, same report. Radio propagation is ideal within the configured
//! transmission range and silent beyond it, with a fixed small propagation
//! delay.

use crate::config::ProtocolConfig;
use crate::protocol::{DropReason, HostEnv, Interface, RoadcastProtocol, Timer};
use crate::road::{RoadMap, TrailSet};
use crate::types::{NodeAddr, Position, Timestamp};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;
use tracing::warn;

/// One-way propagation delay applied to every transmission
const PROP_DELAY: Duration = Duration::from_micros(500);

/// How a simulated vehicle moves
#[derive(Debug, Clone)]
pub enum Motion {
    Fixed(Position),
    /// Straight-line motion from `origin` at constant velocity (m/s)
    Line { origin: Position, velocity: (f64, f64) },
}

impl Motion {
    fn position_at(&self, t: Timestamp) -> Position {
        match self {
            Motion::Fixed(p) => *p,
            Motion::Line { origin, velocity } => {
                let secs = t.as_secs_f64();
                Position::new(origin.x + velocity.0 * secs, origin.y + velocity.1 * secs)
            }
        }
    }
}

/// A successful end-to-end delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub at: Timestamp,
    pub src: NodeAddr,
    pub dst: NodeAddr,
    pub payload: Vec<u8>,
}

/// A discarded packet
#[derive(Debug, Clone, PartialEq)]
pub struct DropRecord {
    pub at: Timestamp,
    pub src: NodeAddr,
    pub dst: NodeAddr,
    pub reason: DropReason,
}

/// Everything observable about a finished run
#[derive(Debug, Default, PartialEq)]
pub struct SimReport {
    pub delivered: Vec<Delivery>,
    pub dropped: Vec<DropRecord>,
    /// Times a packet entered some node's carry buffer
    pub stored: usize,
}

#[derive(Debug)]
enum EventKind {
    Start,
    Fire(Timer),
    Control(Vec<u8>),
    Data { src: NodeAddr, dst: NodeAddr, ttl: u8, bytes: Vec<u8> },
    Originate { dst: NodeAddr, payload: Vec<u8>, ttl: u8 },
}

#[derive(Debug)]
struct Event {
    at: Timestamp,
    seq: u64,
    node: usize,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Host-side actions a protocol instance requested while handling one event
enum Action {
    Schedule(Timer, Duration),
    SendControl(Vec<u8>),
    Forward { gateway: NodeAddr, src: NodeAddr, dst: NodeAddr, ttl: u8, bytes: Vec<u8> },
    Deliver { src: NodeAddr, payload: Vec<u8> },
    Dropped { src: NodeAddr, dst: NodeAddr, reason: DropReason },
    Stored,
}

/// [`HostEnv`] adapter that records what the protocol asked for; the
/// simulator applies the actions after the handler returns
struct NodeEnv<'a> {
    now: Timestamp,
    position: Position,
    positions: &'a BTreeMap<NodeAddr, Position>,
    actions: Vec<Action>,
}

impl HostEnv for NodeEnv<'_> {
    fn now(&self) -> Timestamp {
        self.now
    }
    fn position(&self) -> Position {
        self.position
    }
    fn resolve_position(&self, addr: NodeAddr) -> Option<Position> {
        self.positions.get(&addr).copied()
    }
    fn schedule(&mut self, timer: Timer, delay: Duration) {
        self.actions.push(Action::Schedule(timer, delay));
    }
    fn send_control(&mut self, _broadcast: NodeAddr, bytes: Vec<u8>) {
        self.actions.push(Action::SendControl(bytes));
    }
    fn forward_data(&mut self, gateway: NodeAddr, src: NodeAddr, dst: NodeAddr, ttl: u8, bytes: Vec<u8>) {
        self.actions.push(Action::Forward { gateway, src, dst, ttl, bytes });
    }
    fn deliver_local(&mut self, src: NodeAddr, payload: Vec<u8>) {
        self.actions.push(Action::Deliver { src, payload });
    }
    fn packet_dropped(&mut self, src: NodeAddr, dst: NodeAddr, reason: DropReason) {
        self.actions.push(Action::Dropped { src, dst, reason });
    }
    fn packet_stored(&mut self, _src: NodeAddr, _dst: NodeAddr) {
        self.actions.push(Action::Stored);
    }
}

struct SimNode {
    proto: RoadcastProtocol,
    motion: Motion,
    started: bool,
}

/// The simulation world
pub struct RoadSim {
    config: ProtocolConfig,
    map: RoadMap,
    nodes: Vec<SimNode>,
    index: BTreeMap<NodeAddr, usize>,
    events: BinaryHeap<Reverse<Event>>,
    next_seq: u64,
    report: SimReport,
}

impl RoadSim {
    pub fn new(config: ProtocolConfig, map: RoadMap) -> Self {
        Self {
            config,
            map,
            nodes: Vec::new(),
            index: BTreeMap::new(),
            events: BinaryHeap::new(),
            next_seq: 0,
            report: SimReport::default(),
        }
    }

    /// Add a vehicle; its protocol starts at `start_at`. Addresses are
    /// assigned sequentially from 10.0.0.1.
    pub fn add_node(
        &mut self,
        motion: Motion,
        trails: &TrailSet,
        start_at: Duration,
    ) -> Result<NodeAddr, crate::error::ProtocolError> {
        let n = self.nodes.len() as u8;
        let addr = NodeAddr::from_bytes([10, 0, 0, n + 1]);
        let interfaces = vec![Interface {
            addr,
            broadcast: NodeAddr::from_bytes([10, 0, 0, 255]),
        }];
        let start_pos = motion.position_at(Timestamp::ZERO + start_at);
        let proto = RoadcastProtocol::new(
            self.config.clone(),
            self.map.clone(),
            interfaces,
            trails,
            start_pos,
        )?;
        let idx = self.nodes.len();
        self.nodes.push(SimNode { proto, motion, started: false });
        self.index.insert(addr, idx);
        self.push(Timestamp::ZERO + start_at, idx, EventKind::Start);
        Ok(addr)
    }

    /// Schedule an application payload to be sent at `at`
    pub fn send_at(&mut self, at: Duration, from: NodeAddr, to: NodeAddr, payload: Vec<u8>, ttl: u8) {
        let idx = self.index[&from];
        self.push(
            Timestamp::ZERO + at,
            idx,
            EventKind::Originate { dst: to, payload, ttl },
        );
    }

    /// Process every event up to and including `end`
    pub fn run_until(&mut self, end: Duration) {
        let end = Timestamp::ZERO + end;
        loop {
            match self.events.peek() {
                Some(Reverse(ev)) if ev.at <= end => {}
                _ => break,
            }
            let Reverse(event) = self.events.pop().expect("peeked");
            self.dispatch(event);
        }
    }

    pub fn report(&self) -> &SimReport {
        &self.report
    }

    /// Protocol instance of a node, for state inspection
    pub fn node(&self, addr: NodeAddr) -> &RoadcastProtocol {
        &self.nodes[self.index[&addr]].proto
    }

    fn push(&mut self, at: Timestamp, node: usize, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Reverse(Event { at, seq, node, kind }));
    }

    fn positions_at(&self, now: Timestamp) -> BTreeMap<NodeAddr, Position> {
        self.index
            .iter()
            .map(|(addr, &idx)| (*addr, self.nodes[idx].motion.position_at(now)))
            .collect()
    }

    fn dispatch(&mut self, event: Event) {
        let now = event.at;
        let positions = self.positions_at(now);
        let node = &mut self.nodes[event.node];
        // A node that has not started yet neither transmits nor receives
        if !node.started {
            match event.kind {
                EventKind::Start => node.started = true,
                _ => return,
            }
        }
        let self_addr = node.proto.local_addr();
        let mut env = NodeEnv {
            now,
            position: positions[&self_addr],
            positions: &positions,
            actions: Vec::new(),
        };
        match event.kind {
            EventKind::Start => node.proto.start(&mut env),
            EventKind::Fire(timer) => node.proto.on_timer(timer, &mut env),
            EventKind::Control(bytes) => node.proto.handle_control(0, &bytes, &mut env),
            EventKind::Data { src, dst, ttl, bytes } => {
                node.proto.handle_data(src, dst, ttl, &bytes, &mut env)
            }
            EventKind::Originate { dst, payload, ttl } => {
                node.proto.originate(dst, payload, ttl, &mut env)
            }
        }
        let actions = env.actions;
        self.apply(event.node, self_addr, now, &positions, actions);
    }

    fn apply(
        &mut self,
        node: usize,
        self_addr: NodeAddr,
        now: Timestamp,
        positions: &BTreeMap<NodeAddr, Position>,
        actions: Vec<Action>,
    ) {
        let self_pos = positions[&self_addr];
        let range = self.config.transmission_range;
        for action in actions {
            match action {
                Action::Schedule(timer, delay) => {
                    self.push(now + delay, node, EventKind::Fire(timer));
                }
                Action::SendControl(bytes) => {
                    let targets: Vec<usize> = positions
                        .iter()
                        .filter(|(addr, _)| **addr != self_addr)
                        .filter(|(_, pos)| self_pos.distance_to(pos) <= range)
                        .map(|(addr, _)| self.index[addr])
                        .collect();
                    for idx in targets {
                        self.push(now + PROP_DELAY, idx, EventKind::Control(bytes.clone()));
                    }
                }
                Action::Forward { gateway, src, dst, ttl, bytes } => {
                    let Some(&idx) = self.index.get(&gateway) else {
                        warn!(%gateway, "unicast to unknown node");
                        continue;
                    };
                    if self_pos.distance_to(&positions[&gateway]) > range {
                        warn!(%gateway, "unicast target out of range, packet lost");
                        continue;
                    }
                    self.push(now + PROP_DELAY, idx, EventKind::Data { src, dst, ttl, bytes });
                }
                Action::Deliver { src, payload } => {
                    self.report.delivered.push(Delivery {
                        at: now,
                        src,
                        dst: self_addr,
                        payload,
                    });
                }
                Action::Dropped { src, dst, reason } => {
                    self.report.dropped.push(DropRecord { at: now, src, dst, reason });
                }
                Action::Stored => {
                    self.report.stored += 1;
                }
            }
        }
    }
}
