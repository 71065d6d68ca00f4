//! Greedy geographic next-hop selection
//!
//! Pure decision logic: given the local view (own position, target junction,
//! junction-area flag) and the symmetric neighbor set, pick the neighbor
//! that makes the most geographic progress toward the target junction. No
//! candidate is accepted outside the proximity threshold, and inside a
//! junction area candidates must additionally sit on the road corridor
//! between the nearest junction and the target, so packets never cut across
//! the map off-road.

use crate::config::ProtocolConfig;
use crate::neighbor::NeighborEntry;
use crate::road::RoadMap;
use crate::types::{JunctionId, NodeAddr, Position};

/// Inputs to one next-hop decision
#[derive(Debug)]
pub struct ForwardingParams<'a> {
    pub self_pos: Position,
    /// Destination position if the location service resolved it
    pub dest_pos: Option<Position>,
    pub dest: NodeAddr,
    /// Junction the packet is currently being moved toward
    pub target_junction: Option<JunctionId>,
    pub in_junction_area: bool,
    /// Junction nearest to the local vehicle, anchoring the corridor test
    pub nearest_junction: JunctionId,
    pub map: &'a RoadMap,
    pub config: &'a ProtocolConfig,
}

/// Pick the next hop for a data packet, or `None` when no neighbor improves
/// on the local position (the caller then stores the packet).
///
/// Neighbors must be supplied in address order; ties on progress resolve to
/// the first candidate seen, which makes the choice deterministic.
pub fn next_hop<'a, I>(params: &ForwardingParams<'_>, neighbors: I) -> Option<NodeAddr>
where
    I: Iterator<Item = &'a NeighborEntry>,
{
    let proximity = params.config.proximity_threshold();

    // Destination in direct reach beats any relay
    if let Some(dest_pos) = params.dest_pos {
        if params.self_pos.distance_to(&dest_pos) < proximity {
            return Some(params.dest);
        }
    }

    let target = params.target_junction?;
    let target_pos = params.map.position(target);

    let corridor = params
        .in_junction_area
        .then(|| Corridor::between(params.map, params.nearest_junction, target, params.config.road_width));

    let mut best = params.self_pos.distance_to(&target_pos);
    let mut chosen = None;
    for entry in neighbors {
        if params.self_pos.distance_to(&entry.position) >= proximity {
            continue;
        }
        if let Some(ref corridor) = corridor {
            if !corridor.contains(entry.position) {
                continue;
            }
        }
        let progress = entry.position.distance_to(&target_pos);
        if progress < best {
            best = progress;
            chosen = Some(entry.addr);
        }
    }
    chosen
}

/// Axis-aligned road corridor between two junctions, padded by the road
/// half-width on the cross axis
#[derive(Debug)]
struct Corridor {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Corridor {
    fn between(map: &RoadMap, from: JunctionId, to: JunctionId, road_width: f64) -> Self {
        let a = map.position(from);
        let b = map.position(to);
        let horizontal = a.y == b.y;
        let (pad_x, pad_y) = if horizontal {
            (0.0, road_width)
        } else {
            (road_width, 0.0)
        };
        Self {
            min_x: a.x.min(b.x) - pad_x,
            max_x: a.x.max(b.x) + pad_x,
            min_y: a.y.min(b.y) - pad_y,
            max_y: a.y.max(b.y) + pad_y,
        }
    }

    fn contains(&self, p: Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}
