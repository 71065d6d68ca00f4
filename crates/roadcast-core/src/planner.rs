//! Junction-graph path planner
//!
//! Answers one question on the forwarding hot path: heading from junction A
//! toward junction B across the road graph, which junction comes first? The
//! adjacency matrix is owned here, sized once, and rebuilt in place from the
//! static map on every query — edge weight 1 between adjacent junctions,
//! infinite otherwise — followed by a single-source shortest-path run.

use crate::road::RoadMap;
use crate::types::JunctionId;

/// Shortest-path planner over the junction graph
#[derive(Debug)]
pub struct JunctionPlanner {
    /// N×N edge weights, rebuilt per query
    graph: Vec<Vec<f64>>,
    n: usize,
}

impl JunctionPlanner {
    pub fn new(junction_count: usize) -> Self {
        Self {
            graph: vec![vec![f64::INFINITY; junction_count]; junction_count],
            n: junction_count,
        }
    }

    /// The junction to head for first when traveling from `src` to `dst`.
    ///
    /// Returns `Some(src)` when already there, `None` when `dst` is
    /// unreachable — the caller must treat that exactly like having no next
    /// hop.
    pub fn next_junction_toward(
        &mut self,
        map: &RoadMap,
        src: JunctionId,
        dst: JunctionId,
    ) -> Option<JunctionId> {
        if src == dst {
            return Some(src);
        }
        self.rebuild(map);
        self.dijkstra(src, dst)
    }

    fn rebuild(&mut self, map: &RoadMap) {
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                let weight = if map.is_adjacent(i, j) { 1.0 } else { f64::INFINITY };
                self.graph[i][j] = weight;
                self.graph[j][i] = weight;
            }
        }
    }

    /// Dijkstra over the rebuilt matrix, then walk parent pointers back from
    /// `dst` to find the node whose parent is `src`.
    fn dijkstra(&self, src: JunctionId, dst: JunctionId) -> Option<JunctionId> {
        let n = self.n;
        let mut visited = vec![false; n];
        let mut distance = vec![f64::INFINITY; n];
        let mut parent: Vec<Option<JunctionId>> = vec![None; n];

        distance[src] = 0.0;
        visited[src] = true;
        let mut curr = src;

        loop {
            if curr == dst {
                break;
            }
            let mut min = f64::INFINITY;
            let mut next = None;
            for node in 0..n {
                if visited[node] {
                    continue;
                }
                let through = distance[curr] + self.graph[curr][node];
                if through < distance[node] {
                    distance[node] = through;
                    parent[node] = Some(curr);
                }
                if distance[node] < min {
                    min = distance[node];
                    next = Some(node);
                }
            }
            match next {
                Some(node) => {
                    visited[node] = true;
                    curr = node;
                }
                // No unvisited node is reachable
                None => break,
            }
        }

        // Walk back from dst until the parent is src; the walk dead-ends at
        // None when dst was never reached.
        let mut junction = dst;
        loop {
            match parent[junction] {
                Some(p) if p == src => return Some(junction),
                Some(p) => junction = p,
                None => return None,
            }
        }
    }
}
