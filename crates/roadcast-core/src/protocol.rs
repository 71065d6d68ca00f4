//! Protocol instance: timers, receive paths and routing decisions
//!
//! One [`RoadcastProtocol`] runs per vehicle. It owns the neighbor
//! directory, mobility tracker, planner, beacon engine and carry queues, and
//! is driven entirely from the outside: the host delivers inbound packets
//! and fires timers, the protocol reacts by calling back into the host
//! through [`HostEnv`]. Nothing here spawns threads, reads clocks or touches
//! sockets, which is what keeps a full multi-vehicle run deterministic.

use crate::beacon::BeaconEngine;
use crate::carry::{CarryQueue, PendingPacket, SendEntry};
use crate::config::{ProtocolConfig, POSITION_CHECK_INTERVAL, SEND_DRAIN_INTERVAL};
use crate::error::ProtocolError;
use crate::forwarding::{self, ForwardingParams};
use crate::mobility::MobilityTracker;
use crate::neighbor::NeighborDirectory;
use crate::planner::JunctionPlanner;
use crate::road::{RoadMap, TrailSet};
use crate::types::{NodeAddr, Position, Timestamp};
use crate::wire::{self, DataHeader, MessageBody};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Timers the protocol asks the host to schedule; the host hands them back
/// through [`RoadcastProtocol::on_timer`] when they fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Generate the periodic hello
    Beacon,
    /// Flush queued hellos onto the wire (armed with jitter)
    BeaconFlush,
    /// Road-position check and carried-packet re-examination
    PositionCheck,
    /// Displacement sampling
    SpeedCheck,
    /// Deferred expiry check for one neighbor
    NeighborExpiry(NodeAddr),
    /// Release the most recently delayed ping-pong packet
    DelayRelease,
    /// Transmit one packet from the paced send queue
    SendDrain,
}

/// Why a data packet was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// TTL reached zero before delivery
    TtlExpired,
    /// Carried longer than the configured threshold with no next hop
    CarryTimeout,
}

/// A local network interface
#[derive(Debug, Clone, Copy)]
pub struct Interface {
    pub addr: NodeAddr,
    pub broadcast: NodeAddr,
}

/// Everything the protocol needs from its host.
///
/// The host owns the clock, the position source, the scheduler and the
/// transmit paths; the protocol calls in, never blocks, and never retains
/// the reference past one handler invocation.
pub trait HostEnv {
    /// Current virtual time
    fn now(&self) -> Timestamp;
    /// Current position of the local vehicle
    fn position(&self) -> Position;
    /// Look up another node's position, if the location service knows it
    fn resolve_position(&self, addr: NodeAddr) -> Option<Position>;
    /// Arrange for `timer` to fire after `delay`
    fn schedule(&mut self, timer: Timer, delay: Duration);
    /// Broadcast a control packet to an interface's subnet broadcast address
    fn send_control(&mut self, broadcast: NodeAddr, bytes: Vec<u8>);
    /// Unicast a data packet to `gateway`
    fn forward_data(&mut self, gateway: NodeAddr, src: NodeAddr, dst: NodeAddr, ttl: u8, bytes: Vec<u8>);
    /// Hand a packet addressed to this node up the stack
    fn deliver_local(&mut self, src: NodeAddr, payload: Vec<u8>);
    /// A packet was discarded
    fn packet_dropped(&mut self, src: NodeAddr, dst: NodeAddr, reason: DropReason);
    /// A packet entered the carry buffer
    fn packet_stored(&mut self, src: NodeAddr, dst: NodeAddr);
}

/// Per-vehicle protocol instance
pub struct RoadcastProtocol {
    config: ProtocolConfig,
    map: RoadMap,
    interfaces: Vec<Interface>,
    local_addr: NodeAddr,
    neighbors: NeighborDirectory,
    mobility: MobilityTracker,
    planner: JunctionPlanner,
    beacon: BeaconEngine,
    carry: CarryQueue,
}

impl RoadcastProtocol {
    pub fn new(
        config: ProtocolConfig,
        map: RoadMap,
        interfaces: Vec<Interface>,
        trails: &TrailSet,
        start: Position,
    ) -> Result<Self, ProtocolError> {
        if interfaces.is_empty() {
            return Err(ProtocolError::NoInterfaces);
        }
        if config.junction_count != map.len() {
            return Err(ProtocolError::JunctionCountMismatch {
                configured: config.junction_count,
                actual: map.len(),
            });
        }
        if config.rendezvous_junction >= map.len() {
            return Err(ProtocolError::JunctionOutOfRange {
                id: config.rendezvous_junction,
                count: map.len(),
            });
        }
        let mobility = MobilityTracker::new(start, trails, &map)?;
        let local_addr = interfaces[0].addr;
        let planner = JunctionPlanner::new(map.len());
        let beacon = BeaconEngine::new(
            config.seed.wrapping_add(local_addr.to_u32() as u64),
            config.max_jitter(),
        );
        Ok(Self {
            config,
            map,
            interfaces,
            local_addr,
            neighbors: NeighborDirectory::new(),
            mobility,
            planner,
            beacon,
            carry: CarryQueue::new(),
        })
    }

    pub fn local_addr(&self) -> NodeAddr {
        self.local_addr
    }

    pub fn neighbors(&self) -> &NeighborDirectory {
        &self.neighbors
    }

    pub fn mobility(&self) -> &MobilityTracker {
        &self.mobility
    }

    /// Arm the recurring timers. The first beacon is staggered by the node
    /// index so co-started vehicles do not all key up in the same tick.
    pub fn start<E: HostEnv>(&mut self, env: &mut E) {
        let stagger = Duration::from_millis(self.local_addr.index().max(0) as u64);
        env.schedule(Timer::Beacon, Duration::from_secs(1) + stagger);
        env.schedule(Timer::PositionCheck, POSITION_CHECK_INTERVAL);
        env.schedule(Timer::SpeedCheck, self.config.neighbor_hold_time());
        debug!(node = %self.local_addr, "protocol started");
    }

    /// Host callback for a fired timer
    pub fn on_timer<E: HostEnv>(&mut self, timer: Timer, env: &mut E) {
        match timer {
            Timer::Beacon => {
                self.emit_hello(env);
                env.schedule(Timer::Beacon, self.config.hello_interval());
            }
            Timer::BeaconFlush => {
                for bytes in self.beacon.flush() {
                    for iface in &self.interfaces {
                        env.send_control(iface.broadcast, bytes.clone());
                    }
                }
            }
            Timer::PositionCheck => {
                self.mobility.check_position(env.position(), &self.map, &self.config);
                self.check_wait_queue(env);
                env.schedule(Timer::PositionCheck, POSITION_CHECK_INTERVAL);
            }
            Timer::SpeedCheck => {
                self.mobility.check_speed(env.position());
                env.schedule(Timer::SpeedCheck, self.config.neighbor_hold_time());
            }
            Timer::NeighborExpiry(addr) => {
                self.neighbors.expiry_check(addr, env.now());
            }
            Timer::DelayRelease => {
                if let Some((mut packet, gateway)) = self.carry.pop_delayed() {
                    // Offset the decrement the extra hop will apply
                    packet.ttl = packet.ttl.saturating_add(1);
                    self.transmit(packet, gateway, env);
                }
            }
            Timer::SendDrain => {
                if let Some(entry) = self.carry.pop_send() {
                    self.transmit(entry.packet, entry.gateway, env);
                }
                if self.carry.has_pending_send() {
                    env.schedule(Timer::SendDrain, SEND_DRAIN_INTERVAL);
                }
            }
        }
    }

    /// Host callback for an inbound control packet. Malformed packets are
    /// logged and dropped; processing always continues.
    pub fn handle_control<E: HostEnv>(&mut self, iface: usize, bytes: &[u8], env: &mut E) {
        let packet = match wire::decode_control(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(node = %self.local_addr, error = %e, "discarding malformed control packet");
                return;
            }
        };
        let recv_iface = match self.interfaces.get(iface) {
            Some(i) => i.addr,
            None => {
                warn!(node = %self.local_addr, iface, "control packet on unknown interface index");
                return;
            }
        };
        for message in packet.messages {
            if self.is_local(message.originator) {
                continue;
            }
            if message.ttl == 0 {
                trace!(origin = %message.originator, "control message with exhausted ttl");
                continue;
            }
            match message.body {
                MessageBody::Hello(ref hello) => {
                    self.process_hello(&message, hello, recv_iface, env);
                }
                MessageBody::Unknown { msg_type } => {
                    debug!(msg_type, origin = %message.originator, "skipping unknown message type");
                }
            }
        }
    }

    /// Host callback for an inbound data packet (or one we must forward)
    pub fn handle_data<E: HostEnv>(
        &mut self,
        src: NodeAddr,
        dst: NodeAddr,
        ttl: u8,
        bytes: &[u8],
        env: &mut E,
    ) {
        if self.is_local(dst) {
            env.deliver_local(src, bytes.to_vec());
            return;
        }
        match DataHeader::decode(bytes) {
            Ok((header, payload)) => {
                if ttl <= 1 {
                    debug!(%src, %dst, "ttl exhausted");
                    self.carry.clear_carry(src, dst);
                    env.packet_dropped(src, dst, DropReason::TtlExpired);
                    return;
                }
                let packet = PendingPacket { header, payload: payload.to_vec(), src, dst, ttl };
                self.route_packet(packet, env);
            }
            Err(e) => {
                warn!(node = %self.local_addr, error = %e, "discarding data packet with bad routing header");
            }
        }
    }

    /// Route a locally originated payload toward `dst`
    pub fn originate<E: HostEnv>(&mut self, dst: NodeAddr, payload: Vec<u8>, ttl: u8, env: &mut E) {
        if self.is_local(dst) {
            env.deliver_local(self.local_addr, payload);
            return;
        }
        let packet = PendingPacket {
            header: DataHeader { junction: None, sender: None },
            payload,
            src: self.local_addr,
            dst,
            ttl,
        };
        self.route_packet(packet, env);
    }

    /// Host notification: an interface was brought up
    pub fn interface_up(&mut self, iface: Interface) {
        if !self.is_local(iface.addr) {
            debug!(addr = %iface.addr, "interface up");
            self.interfaces.push(iface);
        }
    }

    /// Host notification: an interface went away. Neighbors heard on it are
    /// no longer reachable and are purged.
    pub fn interface_down(&mut self, addr: NodeAddr) {
        self.interfaces.retain(|i| i.addr != addr);
        let stale: Vec<NodeAddr> = self
            .neighbors
            .iter()
            .filter(|e| e.recv_iface == addr)
            .map(|e| e.addr)
            .collect();
        for peer in stale {
            debug!(%peer, iface = %addr, "purging neighbor on downed interface");
            self.neighbors.remove(&peer);
        }
    }

    fn is_local(&self, addr: NodeAddr) -> bool {
        self.interfaces.iter().any(|i| i.addr == addr)
    }

    fn emit_hello<E: HostEnv>(&mut self, env: &mut E) {
        let message = self.beacon.make_hello(
            self.local_addr,
            env.position(),
            self.mobility.speed() as f32,
            self.mobility.direction(),
            self.mobility.pending_turn(),
            self.neighbors.addresses(),
            self.config.neighbor_hold_time(),
        );
        if let Some(jitter) = self.beacon.enqueue(message) {
            env.schedule(Timer::BeaconFlush, jitter);
        }
    }

    fn process_hello<E: HostEnv>(
        &mut self,
        message: &wire::Message,
        hello: &wire::HelloBody,
        recv_iface: NodeAddr,
        env: &mut E,
    ) {
        // Cross-axis senders are not useful relays on a straight segment.
        // They are accepted only inside a junction area, or when the sender
        // itself is near our nearest junction and might turn onto our road.
        let cross = hello.direction.is_horizontal() != self.mobility.direction().is_horizontal();
        if cross && !self.mobility.in_junction_area() {
            let anchor = self
                .map
                .position(self.mobility.nearest_junction(env.position(), &self.map));
            if hello.position.distance_to(&anchor) > self.config.junction_area_radius {
                trace!(origin = %message.originator, "ignoring cross-direction hello");
                return;
            }
        }

        let accepted = self.neighbors.update(
            message.originator,
            recv_iface,
            message.seq,
            message.validity,
            hello,
            self.local_addr,
            env.now(),
        );
        if !accepted {
            trace!(origin = %message.originator, seq = message.seq, "stale hello ignored");
            return;
        }
        env.schedule(
            Timer::NeighborExpiry(message.originator),
            self.config.neighbor_hold_time(),
        );
        debug!(origin = %message.originator, neighbors = self.neighbors.len(), "hello accepted");

        // A fresh neighbor may unblock carried packets
        if self.carry.has_waiting() {
            self.check_wait_queue(env);
        }
    }

    /// Pick a next hop for `packet` and either transmit, delay or store it.
    /// TTL is checked on the arriving-packet path only; a locally originated
    /// payload is never dropped for hop budget before its first transmission.
    fn route_packet<E: HostEnv>(&mut self, mut packet: PendingPacket, env: &mut E) {
        let self_pos = env.position();
        let nearest = self.mobility.nearest_junction(self_pos, &self.map);

        // Inside a junction area the route is replanned toward the
        // rendezvous junction, overriding whatever the header carried. On a
        // segment a freshly originated packet is stamped with the nearest
        // junction; forwarded packets keep the carried target.
        let mut junction = packet.header.junction;
        if self.mobility.in_junction_area() {
            junction = self.planner.next_junction_toward(
                &self.map,
                nearest,
                self.config.rendezvous_junction,
            );
        } else if junction.is_none() {
            junction = Some(nearest);
        }
        packet.header.junction = junction;

        let params = ForwardingParams {
            self_pos,
            dest_pos: env.resolve_position(packet.dst),
            dest: packet.dst,
            target_junction: junction,
            in_junction_area: self.mobility.in_junction_area(),
            nearest_junction: nearest,
            map: &self.map,
            config: &self.config,
        };
        match forwarding::next_hop(&params, self.neighbors.symmetric()) {
            // Sending straight back to the previous forwarder ping-pongs;
            // hold the packet briefly instead
            Some(hop) if packet.header.sender == Some(hop.index()) => {
                debug!(src = %packet.src, dst = %packet.dst, hop = %hop, "ping-pong suspected, delaying");
                self.carry.delay(packet, hop);
                env.schedule(Timer::DelayRelease, self.config.delay_queue_hold());
            }
            Some(hop) => {
                self.carry.clear_carry(packet.src, packet.dst);
                self.transmit(packet, hop, env);
            }
            None => {
                let (src, dst) = (packet.src, packet.dst);
                self.carry.store(packet, env.now());
                debug!(src = %src, dst = %dst, "no next hop, carrying");
                env.packet_stored(src, dst);
            }
        }
    }

    /// Stamp the routing header and hand the packet to the host. The header
    /// is omitted on the final hop.
    fn transmit<E: HostEnv>(&mut self, mut packet: PendingPacket, gateway: NodeAddr, env: &mut E) {
        let bytes = if gateway == packet.dst {
            packet.payload.clone()
        } else {
            packet.header.sender = Some(self.local_addr.index());
            let mut buf = Vec::with_capacity(wire::DATA_HEADER_SIZE + packet.payload.len());
            buf.extend_from_slice(&packet.header.encode());
            buf.extend_from_slice(&packet.payload);
            buf
        };
        let ttl = packet.ttl.saturating_sub(1);
        trace!(src = %packet.src, dst = %packet.dst, gateway = %gateway, ttl, "forwarding");
        env.forward_data(gateway, packet.src, packet.dst, ttl, bytes);
    }

    /// Re-examine every carried packet: drop the ones past the carry
    /// threshold, refresh target junctions, and move the routable ones to
    /// the paced send queue.
    fn check_wait_queue<E: HostEnv>(&mut self, env: &mut E) {
        let now = env.now();
        let self_pos = env.position();
        let nearest = self.mobility.nearest_junction(self_pos, &self.map);
        let threshold = self.config.carry_time_threshold();

        let mut drained = Vec::new();
        while let Some(packet) = self.carry.pop_waiting() {
            drained.push(packet);
        }

        let mut queued_any = false;
        let was_sending = self.carry.has_pending_send();
        for mut packet in drained {
            if let Some(age) = self.carry.carry_age(packet.src, packet.dst, now) {
                if age >= threshold {
                    debug!(src = %packet.src, dst = %packet.dst, age_secs = age.as_secs_f64(), "carry timeout");
                    self.carry.clear_carry(packet.src, packet.dst);
                    env.packet_dropped(packet.src, packet.dst, DropReason::CarryTimeout);
                    continue;
                }
            }

            // Refresh the target: replan inside a junction area; otherwise a
            // carried target that is no longer ahead of or behind us has
            // been overtaken by movement and snaps to the nearest junction.
            if self.mobility.in_junction_area() {
                packet.header.junction = self.planner.next_junction_toward(
                    &self.map,
                    nearest,
                    self.config.rendezvous_junction,
                );
            } else if let Some(j) = packet.header.junction {
                if j != self.mobility.current() && j != self.mobility.next() {
                    packet.header.junction = Some(nearest);
                }
            }

            let params = ForwardingParams {
                self_pos,
                dest_pos: env.resolve_position(packet.dst),
                dest: packet.dst,
                target_junction: packet.header.junction,
                in_junction_area: self.mobility.in_junction_area(),
                nearest_junction: nearest,
                map: &self.map,
                config: &self.config,
            };
            match forwarding::next_hop(&params, self.neighbors.symmetric()) {
                Some(hop) => {
                    self.carry.clear_carry(packet.src, packet.dst);
                    self.carry.enqueue_send(SendEntry { packet, gateway: hop });
                    queued_any = true;
                }
                // Still no usable hop: keep carrying without touching the
                // flow's carry clock
                None => {
                    self.carry.store(packet, now);
                }
            }
        }

        if queued_any && !was_sending {
            env.schedule(Timer::SendDrain, SEND_DRAIN_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Trail;
    use crate::types::Direction;
    use crate::wire::{encode_control, HelloBody, Message};
    use std::collections::BTreeMap;

    struct MockEnv {
        now: Timestamp,
        position: Position,
        resolved: BTreeMap<NodeAddr, Position>,
        scheduled: Vec<(Timer, Duration)>,
        control: Vec<(NodeAddr, Vec<u8>)>,
        forwarded: Vec<(NodeAddr, NodeAddr, NodeAddr, u8, Vec<u8>)>,
        delivered: Vec<(NodeAddr, Vec<u8>)>,
        dropped: Vec<(NodeAddr, NodeAddr, DropReason)>,
        stored: Vec<(NodeAddr, NodeAddr)>,
    }

    impl MockEnv {
        fn new(position: Position) -> Self {
            Self {
                now: Timestamp::ZERO,
                position,
                resolved: BTreeMap::new(),
                scheduled: Vec::new(),
                control: Vec::new(),
                forwarded: Vec::new(),
                delivered: Vec::new(),
                dropped: Vec::new(),
                stored: Vec::new(),
            }
        }

        fn has_timer(&self, timer: Timer) -> bool {
            self.scheduled.iter().any(|(t, _)| *t == timer)
        }
    }

    impl HostEnv for MockEnv {
        fn now(&self) -> Timestamp {
            self.now
        }
        fn position(&self) -> Position {
            self.position
        }
        fn resolve_position(&self, addr: NodeAddr) -> Option<Position> {
            self.resolved.get(&addr).copied()
        }
        fn schedule(&mut self, timer: Timer, delay: Duration) {
            self.scheduled.push((timer, delay));
        }
        fn send_control(&mut self, broadcast: NodeAddr, bytes: Vec<u8>) {
            self.control.push((broadcast, bytes));
        }
        fn forward_data(&mut self, gateway: NodeAddr, src: NodeAddr, dst: NodeAddr, ttl: u8, bytes: Vec<u8>) {
            self.forwarded.push((gateway, src, dst, ttl, bytes));
        }
        fn deliver_local(&mut self, src: NodeAddr, payload: Vec<u8>) {
            self.delivered.push((src, payload));
        }
        fn packet_dropped(&mut self, src: NodeAddr, dst: NodeAddr, reason: DropReason) {
            self.dropped.push((src, dst, reason));
        }
        fn packet_stored(&mut self, src: NodeAddr, dst: NodeAddr) {
            self.stored.push((src, dst));
        }
    }

    fn addr(n: u8) -> NodeAddr {
        NodeAddr::from_bytes([10, 0, 0, n])
    }

    fn setup() -> (RoadcastProtocol, MockEnv) {
        // 3x3 grid, 100 m spacing; local vehicle at the origin heading east
        // along the bottom row, rendezvous at junction 2
        let map = RoadMap::grid(3, 3, 100.0);
        let trails = TrailSet::new(vec![Trail {
            start: Position::new(0.0, 0.0),
            junctions: vec![0, 1, 2, 5],
        }]);
        let config = ProtocolConfig {
            junction_count: 9,
            rendezvous_junction: 2,
            ..ProtocolConfig::default()
        };
        let interfaces = vec![Interface {
            addr: addr(1),
            broadcast: NodeAddr::from_bytes([10, 0, 0, 255]),
        }];
        let proto =
            RoadcastProtocol::new(config, map, interfaces, &trails, Position::new(0.0, 0.0))
                .unwrap();
        let env = MockEnv::new(Position::new(0.0, 0.0));
        (proto, env)
    }

    /// A hello from `n` at (x, y) listing us, delivered as a control packet
    fn feed_hello(proto: &mut RoadcastProtocol, env: &mut MockEnv, n: u8, x: f64, y: f64, seq: u16) {
        feed_hello_dir(proto, env, n, x, y, seq, Direction::East);
    }

    fn feed_hello_dir(
        proto: &mut RoadcastProtocol,
        env: &mut MockEnv,
        n: u8,
        x: f64,
        y: f64,
        seq: u16,
        direction: Direction,
    ) {
        let msg = Message {
            ttl: 1,
            hop_count: 0,
            seq,
            originator: addr(n),
            validity: Duration::from_secs(1),
            body: MessageBody::Hello(HelloBody {
                position: Position::new(x, y),
                speed: 10.0,
                direction,
                turn: None,
                neighbors: vec![addr(1)],
            }),
        };
        let bytes = encode_control(0, &[msg]);
        proto.handle_control(0, &bytes, env);
    }

    #[test]
    fn test_new_requires_an_interface() {
        let map = RoadMap::grid(3, 3, 100.0);
        let trails = TrailSet::new(vec![Trail {
            start: Position::new(0.0, 0.0),
            junctions: vec![0, 1],
        }]);
        assert!(matches!(
            RoadcastProtocol::new(
                ProtocolConfig::default(),
                map,
                vec![],
                &trails,
                Position::new(0.0, 0.0)
            ),
            Err(ProtocolError::NoInterfaces)
        ));
    }

    #[test]
    fn test_new_validates_rendezvous_junction() {
        let map = RoadMap::grid(3, 3, 100.0);
        let trails = TrailSet::new(vec![Trail {
            start: Position::new(0.0, 0.0),
            junctions: vec![0, 1],
        }]);
        let config = ProtocolConfig {
            junction_count: 9,
            rendezvous_junction: 9,
            ..ProtocolConfig::default()
        };
        let interfaces = vec![Interface {
            addr: addr(1),
            broadcast: NodeAddr::from_bytes([10, 0, 0, 255]),
        }];
        assert!(matches!(
            RoadcastProtocol::new(config, map, interfaces, &trails, Position::new(0.0, 0.0)),
            Err(ProtocolError::JunctionOutOfRange { id: 9, count: 9 })
        ));
    }

    #[test]
    fn test_new_validates_junction_count_against_map() {
        let map = RoadMap::grid(3, 3, 100.0);
        let trails = TrailSet::new(vec![Trail {
            start: Position::new(0.0, 0.0),
            junctions: vec![0, 1],
        }]);
        let config = ProtocolConfig { junction_count: 4, ..ProtocolConfig::default() };
        let interfaces = vec![Interface {
            addr: addr(1),
            broadcast: NodeAddr::from_bytes([10, 0, 0, 255]),
        }];
        assert!(matches!(
            RoadcastProtocol::new(config, map, interfaces, &trails, Position::new(0.0, 0.0)),
            Err(ProtocolError::JunctionCountMismatch { configured: 4, actual: 9 })
        ));
    }

    #[test]
    fn test_start_staggers_first_beacon_by_node_index() {
        let (mut proto, mut env) = setup();
        proto.start(&mut env);
        // addr 10.0.0.1 is node index 0
        let beacon = env
            .scheduled
            .iter()
            .find(|(t, _)| *t == Timer::Beacon)
            .unwrap();
        assert_eq!(beacon.1, Duration::from_secs(1));
        assert!(env.has_timer(Timer::PositionCheck));
        assert!(env.has_timer(Timer::SpeedCheck));
    }

    #[test]
    fn test_beacon_flush_emits_control_packet() {
        let (mut proto, mut env) = setup();
        proto.on_timer(Timer::Beacon, &mut env);
        assert!(env.has_timer(Timer::BeaconFlush));
        assert!(env.control.is_empty());

        proto.on_timer(Timer::BeaconFlush, &mut env);
        assert_eq!(env.control.len(), 1);
        // Sent to the interface's subnet broadcast address
        assert_eq!(env.control[0].0, NodeAddr::from_bytes([10, 0, 0, 255]));
        let packet = wire::decode_control(&env.control[0].1).unwrap();
        assert_eq!(packet.messages.len(), 1);
        match &packet.messages[0].body {
            MessageBody::Hello(h) => assert_eq!(h.direction, Direction::East),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_hello_populates_directory_and_schedules_expiry() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        assert!(proto.neighbors().contains(&addr(2)));
        assert!(env.has_timer(Timer::NeighborExpiry(addr(2))));
    }

    #[test]
    fn test_own_hello_ignored() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 1, 80.0, 0.0, 0);
        assert!(proto.neighbors().is_empty());
    }

    #[test]
    fn test_malformed_control_packet_dropped_gracefully() {
        let (mut proto, mut env) = setup();
        proto.handle_control(0, &[0xFF, 0x00, 0x01], &mut env);
        proto.handle_control(0, &[], &mut env);
        assert!(proto.neighbors().is_empty());
        // Still functional afterwards
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        assert!(proto.neighbors().contains(&addr(2)));
    }

    #[test]
    fn test_control_on_unknown_interface_index_ignored() {
        let (mut proto, mut env) = setup();
        let msg = Message {
            ttl: 1,
            hop_count: 0,
            seq: 0,
            originator: addr(2),
            validity: Duration::from_secs(1),
            body: MessageBody::Hello(HelloBody {
                position: Position::new(80.0, 0.0),
                speed: 10.0,
                direction: Direction::East,
                turn: None,
                neighbors: vec![addr(1)],
            }),
        };
        let bytes = encode_control(0, &[msg]);
        // Only interface index 0 exists
        proto.handle_control(7, &bytes, &mut env);
        assert!(proto.neighbors().is_empty());
    }

    #[test]
    fn test_cross_direction_hello_ignored_on_segment() {
        let (mut proto, mut env) = setup();
        // Northbound sender far from our nearest junction
        feed_hello_dir(&mut proto, &mut env, 2, 80.0, 50.0, 0, Direction::North);
        assert!(proto.neighbors().is_empty());
        // Northbound sender right at our nearest junction is kept
        feed_hello_dir(&mut proto, &mut env, 3, 5.0, 5.0, 0, Direction::North);
        assert!(proto.neighbors().contains(&addr(3)));
    }

    #[test]
    fn test_originate_forwards_through_best_neighbor() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);

        // Past the midpoint of the first segment: junction 1 is nearest and
        // becomes the stamped target
        env.position = Position::new(60.0, 0.0);
        proto.originate(addr(9), vec![0xAB], 16, &mut env);
        assert_eq!(env.forwarded.len(), 1);
        let (gateway, src, dst, ttl, ref bytes) = env.forwarded[0];
        assert_eq!(gateway, addr(2));
        assert_eq!(src, addr(1));
        assert_eq!(dst, addr(9));
        assert_eq!(ttl, 15);
        // Routing header present: target junction 1, sender index 0
        let (header, payload) = DataHeader::decode(bytes).unwrap();
        assert_eq!(header.junction, Some(1));
        assert_eq!(header.sender, Some(0));
        assert_eq!(payload, &[0xAB]);
    }

    #[test]
    fn test_final_hop_omits_routing_header() {
        let (mut proto, mut env) = setup();
        // The destination itself is our neighbor but beyond direct reach is
        // irrelevant here: 80 m is within the proximity threshold, so the
        // destination wins outright
        feed_hello(&mut proto, &mut env, 9, 80.0, 0.0, 0);
        env.resolved.insert(addr(9), Position::new(80.0, 0.0));

        proto.originate(addr(9), vec![0xCD], 16, &mut env);
        let (gateway, _, _, _, ref bytes) = env.forwarded[0];
        assert_eq!(gateway, addr(9));
        assert_eq!(bytes, &vec![0xCD]);
    }

    #[test]
    fn test_local_destination_delivers_without_network() {
        let (mut proto, mut env) = setup();
        proto.originate(addr(1), vec![1, 2, 3], 16, &mut env);
        assert_eq!(env.delivered, vec![(addr(1), vec![1, 2, 3])]);
        assert!(env.forwarded.is_empty());
    }

    #[test]
    fn test_inbound_data_for_us_is_delivered() {
        let (mut proto, mut env) = setup();
        proto.handle_data(addr(5), addr(1), 3, &[9, 9], &mut env);
        assert_eq!(env.delivered, vec![(addr(5), vec![9, 9])]);
    }

    #[test]
    fn test_ttl_exhaustion_drops() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        let header = DataHeader { junction: Some(1), sender: None };
        let mut bytes = header.encode().to_vec();
        bytes.push(0xEE);
        proto.handle_data(addr(5), addr(9), 1, &bytes, &mut env);
        assert_eq!(env.dropped, vec![(addr(5), addr(9), DropReason::TtlExpired)]);
        assert!(env.forwarded.is_empty());
    }

    #[test]
    fn test_originated_ttl_one_delivered_to_destination_in_reach() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 9, 80.0, 0.0, 0);
        env.resolved.insert(addr(9), Position::new(80.0, 0.0));

        // One hop of budget is enough when the destination is the next hop
        proto.originate(addr(9), vec![0x01], 1, &mut env);
        assert!(env.dropped.is_empty());
        assert_eq!(env.forwarded.len(), 1);
        assert_eq!(env.forwarded[0].0, addr(9));
        assert_eq!(env.forwarded[0].3, 0);
    }

    #[test]
    fn test_no_neighbor_stores_packet() {
        let (mut proto, mut env) = setup();
        proto.originate(addr(9), vec![0xAB], 16, &mut env);
        assert_eq!(env.stored, vec![(addr(1), addr(9))]);
        assert!(env.forwarded.is_empty());
    }

    #[test]
    fn test_new_neighbor_releases_carried_packet_via_send_queue() {
        let (mut proto, mut env) = setup();
        env.position = Position::new(60.0, 0.0);
        proto.originate(addr(9), vec![0xAB], 16, &mut env);
        assert_eq!(env.stored.len(), 1);

        // A usable neighbor appears: the packet moves to the send queue and
        // a drain tick is armed
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        assert!(env.has_timer(Timer::SendDrain));
        assert!(env.forwarded.is_empty());

        proto.on_timer(Timer::SendDrain, &mut env);
        assert_eq!(env.forwarded.len(), 1);
        assert_eq!(env.forwarded[0].0, addr(2));
    }

    #[test]
    fn test_carried_packet_released_even_to_previous_forwarder() {
        let (mut proto, mut env) = setup();
        // Carried packet last forwarded by node index 1 (10.0.0.2); no
        // neighbors yet, so it is stored
        let header = DataHeader { junction: Some(1), sender: Some(1) };
        let mut bytes = header.encode().to_vec();
        bytes.push(0x42);
        proto.handle_data(addr(5), addr(9), 16, &bytes, &mut env);
        assert_eq!(env.stored.len(), 1);

        // The previous forwarder reappears as the only qualifying relay;
        // the re-check must still move the packet to the send queue
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        assert!(env.has_timer(Timer::SendDrain));

        proto.on_timer(Timer::SendDrain, &mut env);
        assert_eq!(env.forwarded.len(), 1);
        assert_eq!(env.forwarded[0].0, addr(2));
    }

    #[test]
    fn test_carry_timeout_drops_exactly_once() {
        let (mut proto, mut env) = setup();
        proto.originate(addr(9), vec![0xAB], 16, &mut env);

        // Just under the threshold: still carried
        env.now = Timestamp::from_secs_f64(9.9);
        proto.on_timer(Timer::PositionCheck, &mut env);
        assert!(env.dropped.is_empty());

        // Past it: dropped with the carry reason
        env.now = Timestamp::from_secs_f64(10.0);
        proto.on_timer(Timer::PositionCheck, &mut env);
        assert_eq!(env.dropped, vec![(addr(1), addr(9), DropReason::CarryTimeout)]);

        // Later checks must not drop again
        env.now = Timestamp::from_secs_f64(11.0);
        proto.on_timer(Timer::PositionCheck, &mut env);
        assert_eq!(env.dropped.len(), 1);
    }

    #[test]
    fn test_ping_pong_packet_delayed_then_released() {
        let (mut proto, mut env) = setup();
        // Neighbor 10.0.0.2 has node index 1
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);

        let header = DataHeader { junction: Some(1), sender: Some(1) };
        let mut bytes = header.encode().to_vec();
        bytes.push(0x01);
        proto.handle_data(addr(5), addr(9), 16, &bytes, &mut env);

        // Held, not forwarded
        assert!(env.forwarded.is_empty());
        assert!(env.has_timer(Timer::DelayRelease));

        // Released to the held gateway; the TTL credit offsets the second
        // decrement so the packet is not penalized for the hold
        proto.on_timer(Timer::DelayRelease, &mut env);
        assert_eq!(env.forwarded.len(), 1);
        assert_eq!(env.forwarded[0].0, addr(2));
        assert_eq!(env.forwarded[0].3, 16);
    }

    #[test]
    fn test_interface_down_purges_neighbors_heard_on_it() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 0);
        assert!(proto.neighbors().contains(&addr(2)));

        proto.interface_down(addr(1));
        assert!(proto.neighbors().is_empty());
    }

    #[test]
    fn test_stale_hello_does_not_resurrect_neighbor() {
        let (mut proto, mut env) = setup();
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 5);
        feed_hello(&mut proto, &mut env, 2, 80.0, 0.0, 3);
        assert_eq!(proto.neighbors().get(&addr(2)).unwrap().seq, 5);
    }
}
