//! Static road map and precomputed vehicle trails
//!
//! The map is a set of junctions with positions and undirected adjacency,
//! fixed for the lifetime of a run. Trails are the precomputed junction
//! sequences vehicles are assumed to follow; a vehicle picks the trail whose
//! recorded start point is nearest to its own starting position.

use crate::types::{Direction, JunctionId, Position};
use serde::{Deserialize, Serialize};

/// A node of the road graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Junction {
    pub id: JunctionId,
    pub position: Position,
    /// Ids of directly connected junctions
    pub edges: Vec<JunctionId>,
}

/// The static road graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadMap {
    junctions: Vec<Junction>,
}

impl RoadMap {
    pub fn new(junctions: Vec<Junction>) -> Self {
        Self { junctions }
    }

    /// Build a regular cols × rows grid with the given segment spacing,
    /// junction 0 at the origin, ids row-major
    pub fn grid(cols: usize, rows: usize, spacing: f64) -> Self {
        let mut junctions = Vec::with_capacity(cols * rows);
        for r in 0..rows {
            for c in 0..cols {
                let id = r * cols + c;
                let mut edges = Vec::new();
                if c > 0 {
                    edges.push(id - 1);
                }
                if c + 1 < cols {
                    edges.push(id + 1);
                }
                if r > 0 {
                    edges.push(id - cols);
                }
                if r + 1 < rows {
                    edges.push(id + cols);
                }
                junctions.push(Junction {
                    id,
                    position: Position::new(c as f64 * spacing, r as f64 * spacing),
                    edges,
                });
            }
        }
        Self { junctions }
    }

    pub fn len(&self) -> usize {
        self.junctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.junctions.is_empty()
    }

    /// Position of a junction
    pub fn position(&self, id: JunctionId) -> Position {
        self.junctions[id].position
    }

    /// Whether two junctions are connected by a road segment
    pub fn is_adjacent(&self, a: JunctionId, b: JunctionId) -> bool {
        self.junctions[a].edges.contains(&b)
    }

    /// Travel direction when moving from junction `from` to junction `to`.
    ///
    /// Junctions sharing a y coordinate give East/West by x; anything else
    /// gives North/South by y (the map is axis-aligned by construction).
    pub fn direction_between(&self, from: JunctionId, to: JunctionId) -> Direction {
        let f = self.position(from);
        let t = self.position(to);
        if t.y == f.y {
            if t.x > f.x {
                Direction::East
            } else {
                Direction::West
            }
        } else if t.y > f.y {
            Direction::North
        } else {
            Direction::South
        }
    }
}

/// A precomputed junction sequence with its recorded start point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trail {
    pub start: Position,
    pub junctions: Vec<JunctionId>,
}

/// The known trails for a scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrailSet {
    trails: Vec<Trail>,
}

impl TrailSet {
    pub fn new(trails: Vec<Trail>) -> Self {
        Self { trails }
    }

    pub fn push(&mut self, trail: Trail) {
        self.trails.push(trail);
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// The trail whose recorded start point is nearest to `position`
    pub fn nearest(&self, position: Position) -> Option<&Trail> {
        let mut best: Option<&Trail> = None;
        let mut min = f64::INFINITY;
        for trail in &self.trails {
            let dis = position.distance_to(&trail.start);
            if dis < min {
                min = dis;
                best = Some(trail);
            }
        }
        best
    }
}
