//! Hello beacon batching and jittered emission
//!
//! Hellos are not transmitted the moment they are generated. Each one is
//! queued, and the first message to land in an empty queue arms a flush
//! timer with a small uniform random jitter so that nodes sharing a beacon
//! phase do not collide every interval. The flush packs everything queued
//! into control packets, at most [`wire::MAX_MSGS_PER_PACKET`] messages per
//! packet.
//!
//! Both sequence counters start at the maximum value so the first increment
//! wraps to zero.

use crate::types::{Direction, JunctionId, NodeAddr, Position};
use crate::wire::{self, HelloBody, Message, MessageBody};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Queues outgoing hellos and assigns sequence numbers
#[derive(Debug)]
pub struct BeaconEngine {
    queued: Vec<Message>,
    flush_armed: bool,
    packet_seq: u16,
    msg_seq: u16,
    max_jitter: Duration,
    rng: SmallRng,
}

impl BeaconEngine {
    pub fn new(seed: u64, max_jitter: Duration) -> Self {
        Self {
            queued: Vec::new(),
            flush_armed: false,
            packet_seq: wire::MAX_SEQ_NUM,
            msg_seq: wire::MAX_SEQ_NUM,
            max_jitter,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Build a hello advertising the local road state and neighbor set
    pub fn make_hello(
        &mut self,
        originator: NodeAddr,
        position: Position,
        speed: f32,
        direction: Direction,
        turn: Option<JunctionId>,
        neighbors: Vec<NodeAddr>,
        validity: Duration,
    ) -> Message {
        self.msg_seq = self.msg_seq.wrapping_add(1);
        Message {
            ttl: 1,
            hop_count: 0,
            seq: self.msg_seq,
            originator,
            validity,
            body: MessageBody::Hello(HelloBody {
                position,
                speed,
                direction,
                turn,
                neighbors,
            }),
        }
    }

    /// Queue a message for the next flush. Returns the jitter delay to
    /// schedule the flush with when this message armed it, `None` when a
    /// flush is already pending.
    pub fn enqueue(&mut self, message: Message) -> Option<Duration> {
        self.queued.push(message);
        if self.flush_armed {
            None
        } else {
            self.flush_armed = true;
            Some(self.jitter())
        }
    }

    /// Drain the queue into encoded control packets
    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        self.flush_armed = false;
        let mut packets = Vec::new();
        for chunk in self.queued.chunks(wire::MAX_MSGS_PER_PACKET) {
            self.packet_seq = self.packet_seq.wrapping_add(1);
            packets.push(wire::encode_control(self.packet_seq, chunk));
        }
        self.queued.clear();
        packets
    }

    fn jitter(&mut self) -> Duration {
        let max = self.max_jitter.as_secs_f64();
        Duration::from_secs_f64(self.rng.gen_range(0.0..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> BeaconEngine {
        BeaconEngine::new(42, Duration::from_millis(100))
    }

    fn hello(engine: &mut BeaconEngine, n: u8) -> Message {
        engine.make_hello(
            NodeAddr::from_bytes([10, 0, 0, n]),
            Position::new(0.0, 0.0),
            0.0,
            Direction::East,
            None,
            vec![],
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_first_message_sequence_is_zero() {
        let mut engine = engine();
        let m = hello(&mut engine, 1);
        assert_eq!(m.seq, 0);
        let m = hello(&mut engine, 1);
        assert_eq!(m.seq, 1);
    }

    #[test]
    fn test_only_first_enqueue_arms_flush() {
        let mut engine = engine();
        let m1 = hello(&mut engine, 1);
        let m2 = hello(&mut engine, 1);
        let delay = engine.enqueue(m1);
        assert!(delay.is_some());
        assert!(delay.unwrap() <= Duration::from_millis(100));
        assert!(engine.enqueue(m2).is_none());

        // After a flush the next enqueue arms again
        let packets = engine.flush();
        assert_eq!(packets.len(), 1);
        let m3 = hello(&mut engine, 1);
        assert!(engine.enqueue(m3).is_some());
    }

    #[test]
    fn test_flush_splits_into_max_sized_packets() {
        let mut engine = engine();
        for _ in 0..(wire::MAX_MSGS_PER_PACKET + 1) {
            let m = hello(&mut engine, 1);
            engine.enqueue(m);
        }
        let packets = engine.flush();
        assert_eq!(packets.len(), 2);

        let first = wire::decode_control(&packets[0]).unwrap();
        let second = wire::decode_control(&packets[1]).unwrap();
        assert_eq!(first.messages.len(), wire::MAX_MSGS_PER_PACKET);
        assert_eq!(second.messages.len(), 1);
        // Packet sequence numbers also start at zero
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
    }

    #[test]
    fn test_flush_with_empty_queue_emits_nothing() {
        let mut engine = engine();
        assert!(engine.flush().is_empty());
    }

    #[test]
    fn test_jitter_is_deterministic_per_seed() {
        let mut a = BeaconEngine::new(7, Duration::from_millis(100));
        let mut b = BeaconEngine::new(7, Duration::from_millis(100));
        let ma = hello(&mut a, 1);
        let mb = hello(&mut b, 1);
        assert_eq!(a.enqueue(ma), b.enqueue(mb));
    }
}
