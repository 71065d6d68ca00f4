//! Vehicle road-position state machine
//!
//! Tracks where the vehicle is relative to the road graph: the junction it
//! came from, the one it is heading to, its travel direction, a latched
//! pending turn, and whether it is inside a junction's influence radius.
//! Fed by two periodic checks: a fast position check that advances the trail
//! and maintains the junction-area flag, and a slow speed check that samples
//! straight-line displacement.

use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::road::{RoadMap, TrailSet};
use crate::types::{Direction, JunctionId, Position};
use std::collections::VecDeque;

/// Road-position state of the local vehicle
#[derive(Debug)]
pub struct MobilityTracker {
    /// Junction most recently passed
    current: JunctionId,
    /// Junction being approached
    next: JunctionId,
    /// Remaining trail beyond `next`
    trail: VecDeque<JunctionId>,
    direction: Direction,
    /// Next trail junction, latched when close enough to signal a turn;
    /// peeked, never consumed — trail advancement pops independently
    pending_turn: Option<JunctionId>,
    /// Inside some junction's influence radius
    in_junction_area: bool,
    /// Displacement over the last speed sampling interval
    speed: f64,
    last_sample: Position,
}

impl MobilityTracker {
    /// Seed the tracker from the starting position: select the trail with
    /// the nearest recorded start and pop its first two junctions as
    /// current/next.
    pub fn new(
        start: Position,
        trails: &TrailSet,
        map: &RoadMap,
    ) -> Result<Self, ProtocolError> {
        let trail = trails.nearest(start).ok_or(ProtocolError::NoTrails)?;
        if trail.junctions.len() < 2 {
            return Err(ProtocolError::TrailTooShort { len: trail.junctions.len() });
        }
        let mut remaining: VecDeque<JunctionId> = trail.junctions.iter().copied().collect();
        let current = remaining.pop_front().expect("length checked");
        let next = remaining.pop_front().expect("length checked");
        let direction = map.direction_between(current, next);
        Ok(Self {
            current,
            next,
            trail: remaining,
            direction,
            pending_turn: None,
            in_junction_area: false,
            speed: 0.0,
            last_sample: start,
        })
    }

    pub fn current(&self) -> JunctionId {
        self.current
    }

    pub fn next(&self) -> JunctionId {
        self.next
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn pending_turn(&self) -> Option<JunctionId> {
        self.pending_turn
    }

    pub fn in_junction_area(&self) -> bool {
        self.in_junction_area
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whichever of current/next junction is closer to `position`
    pub fn nearest_junction(&self, position: Position, map: &RoadMap) -> JunctionId {
        let to_current = position.distance_to(&map.position(self.current));
        let to_next = position.distance_to(&map.position(self.next));
        if to_current < to_next {
            self.current
        } else {
            self.next
        }
    }

    /// Periodic position check: advance the trail on arrival, latch the
    /// pending turn inside signal range, maintain the junction-area flag
    /// with hysteresis.
    pub fn check_position(&mut self, position: Position, map: &RoadMap, config: &ProtocolConfig) {
        let dis_to_next = position.distance_to(&map.position(self.next));
        let dis_to_curr = position.distance_to(&map.position(self.current));

        if dis_to_next <= config.arrival_threshold {
            self.pending_turn = None;
            self.current = self.next;
            if let Some(junction) = self.trail.pop_front() {
                self.next = junction;
                self.direction = map.direction_between(self.current, self.next);
            }
        } else if dis_to_next <= config.turn_signal_range && self.pending_turn.is_none() {
            self.pending_turn = self.trail.front().copied();
        }

        if !self.in_junction_area {
            if dis_to_next < config.junction_area_radius {
                self.in_junction_area = true;
            }
        } else if dis_to_next > config.junction_area_radius
            && dis_to_curr > config.junction_area_radius
        {
            self.in_junction_area = false;
        }
    }

    /// Periodic speed check: displacement since the last sample
    pub fn check_speed(&mut self, position: Position) {
        self.speed = position.distance_to(&self.last_sample);
        self.last_sample = position;
    }
}
