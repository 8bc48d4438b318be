//! Contraction graph abstraction.
//!
//! The contractor only needs four capabilities: iterate a node's edges,
//! insert an edge, delete a node, and look an edge up by endpoints. The
//! dynamic graph below implements them over per-source edge lists. Every
//! logical edge is stored at both endpoints with mirrored direction flags,
//! so a node's list contains its incoming edges too (backward flag set).

use crate::graph::edge_based::EdgeBasedEdge;
use crate::INVALID_NODE_ID;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractorEdgeData {
    pub weight: u32,
    /// Original edge id, meaningful while `shortcut` is false.
    pub id: u32,
    /// Number of original edges this edge represents (1 for originals).
    pub originals: u32,
    pub forward: bool,
    pub backward: bool,
    pub shortcut: bool,
    /// Contracted middle node, meaningful while `shortcut` is true.
    pub middle: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractorEdge {
    pub target: u32,
    pub data: ContractorEdgeData,
}

pub trait ContractionGraph {
    fn node_count(&self) -> usize;
    fn edges(&self, node: u32) -> &[ContractorEdge];
    fn insert_edge(&mut self, source: u32, edge: ContractorEdge);
    fn delete_node(&mut self, node: u32);
    fn find_edge(&self, source: u32, target: u32) -> Option<&ContractorEdge>;
}

#[derive(Debug)]
pub struct DynamicGraph {
    adjacency: Vec<Vec<ContractorEdge>>,
}

impl DynamicGraph {
    /// Normalize the edge-based edge list: both endpoints get a record with
    /// mirrored flags, parallel edges per (source, target) collapse to the
    /// minimum weight per direction (one record when both directions agree).
    pub fn from_input_edges(node_count: u32, input: &[EdgeBasedEdge]) -> Self {
        #[derive(Clone, Copy)]
        struct Raw {
            source: u32,
            target: u32,
            id: u32,
            weight: u32,
            forward: bool,
            backward: bool,
        }

        let mut raw = Vec::with_capacity(input.len() * 2);
        for edge in input {
            let weight = edge.weight.max(1);
            raw.push(Raw {
                source: edge.source,
                target: edge.target,
                id: edge.edge_id,
                weight,
                forward: edge.forward,
                backward: edge.backward,
            });
            raw.push(Raw {
                source: edge.target,
                target: edge.source,
                id: edge.edge_id,
                weight,
                forward: edge.backward,
                backward: edge.forward,
            });
        }
        raw.sort_unstable_by_key(|e| (e.source, e.target));

        let mut adjacency = vec![Vec::new(); node_count as usize];
        let mut i = 0;
        while i < raw.len() {
            let (source, target) = (raw[i].source, raw[i].target);
            let mut forward_weight = u32::MAX;
            let mut forward_id = INVALID_NODE_ID;
            let mut backward_weight = u32::MAX;
            let mut backward_id = INVALID_NODE_ID;
            while i < raw.len() && raw[i].source == source && raw[i].target == target {
                let e = raw[i];
                if e.forward && e.weight < forward_weight {
                    forward_weight = e.weight;
                    forward_id = e.id;
                }
                if e.backward && e.weight < backward_weight {
                    backward_weight = e.weight;
                    backward_id = e.id;
                }
                i += 1;
            }
            if source == target {
                continue; // self-loops never help a shortest path
            }
            if forward_weight == backward_weight && forward_weight != u32::MAX {
                adjacency[source as usize].push(ContractorEdge {
                    target,
                    data: ContractorEdgeData {
                        weight: forward_weight,
                        id: forward_id,
                        originals: 1,
                        forward: true,
                        backward: true,
                        shortcut: false,
                        middle: INVALID_NODE_ID,
                    },
                });
                continue;
            }
            if forward_weight != u32::MAX {
                adjacency[source as usize].push(ContractorEdge {
                    target,
                    data: ContractorEdgeData {
                        weight: forward_weight,
                        id: forward_id,
                        originals: 1,
                        forward: true,
                        backward: false,
                        shortcut: false,
                        middle: INVALID_NODE_ID,
                    },
                });
            }
            if backward_weight != u32::MAX {
                adjacency[source as usize].push(ContractorEdge {
                    target,
                    data: ContractorEdgeData {
                        weight: backward_weight,
                        id: backward_id,
                        originals: 1,
                        forward: false,
                        backward: true,
                        shortcut: false,
                        middle: INVALID_NODE_ID,
                    },
                });
            }
        }

        Self { adjacency }
    }

    /// Insert one directed shortcut plus its mirror, deduplicating against
    /// existing records: an equal-or-lighter edge in the same direction
    /// absorbs it, a heavier one is improved in place.
    pub fn add_directed_shortcut(&mut self, from: u32, to: u32, weight: u32, middle: u32) {
        // A backward-only shortcut with identical weight and middle is the
        // other direction of the same record: merge instead of duplicating.
        if let Some(pos) = self.adjacency[from as usize].iter().position(|e| {
            e.target == to
                && e.data.shortcut
                && !e.data.forward
                && e.data.backward
                && e.data.weight == weight
                && e.data.middle == middle
        }) {
            let existing = self.adjacency[from as usize][pos];
            self.adjacency[from as usize][pos].data.forward = true;
            if let Some(mirror) = self.find_mirror(to, from, &existing.data) {
                self.adjacency[to as usize][mirror].data.backward = true;
            }
            return;
        }

        if let Some(pos) = self.adjacency[from as usize]
            .iter()
            .position(|e| e.target == to && e.data.forward)
        {
            let existing = self.adjacency[from as usize][pos];
            if existing.data.weight <= weight {
                return;
            }
            if !existing.data.backward {
                // Improve both records in place.
                self.update_record(from, pos, weight, middle);
                if let Some(mirror) = self.find_mirror(to, from, &existing.data) {
                    self.update_record(to, mirror, weight, middle);
                }
                return;
            }
            // Shared bidirectional record with a heavier weight: strip the
            // forward flag from it (and its mirror) and fall through to a
            // fresh insert for this direction.
            self.adjacency[from as usize][pos].data.forward = false;
            if let Some(mirror) = self.find_mirror(to, from, &existing.data) {
                self.adjacency[to as usize][mirror].data.backward = false;
            }
        }

        let data = ContractorEdgeData {
            weight,
            id: INVALID_NODE_ID,
            originals: 0,
            forward: true,
            backward: false,
            shortcut: true,
            middle,
        };
        self.insert_edge(from, ContractorEdge { target: to, data });
        self.insert_edge(
            to,
            ContractorEdge {
                target: from,
                data: ContractorEdgeData {
                    forward: false,
                    backward: true,
                    ..data
                },
            },
        );
    }

    /// Set the hop count of the most recently inserted / improved shortcut.
    pub fn set_shortcut_originals(&mut self, from: u32, to: u32, originals: u32) {
        if let Some(e) = self.adjacency[from as usize]
            .iter_mut()
            .find(|e| e.target == to && e.data.forward && e.data.shortcut)
        {
            e.data.originals = originals;
        }
        if let Some(e) = self.adjacency[to as usize]
            .iter_mut()
            .find(|e| e.target == from && e.data.backward && e.data.shortcut)
        {
            e.data.originals = originals;
        }
    }

    fn update_record(&mut self, node: u32, pos: usize, weight: u32, middle: u32) {
        let data = &mut self.adjacency[node as usize][pos].data;
        data.weight = weight;
        data.shortcut = true;
        data.middle = middle;
        data.id = INVALID_NODE_ID;
    }

    /// The mirrored record of (other → node) stored at `node`.
    fn find_mirror(&self, node: u32, target: u32, original: &ContractorEdgeData) -> Option<usize> {
        self.adjacency[node as usize].iter().position(|e| {
            e.target == target
                && e.data.weight == original.weight
                && e.data.forward == original.backward
                && e.data.backward == original.forward
                && e.data.shortcut == original.shortcut
        })
    }
}

impl ContractionGraph for DynamicGraph {
    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    fn edges(&self, node: u32) -> &[ContractorEdge] {
        &self.adjacency[node as usize]
    }

    fn insert_edge(&mut self, source: u32, edge: ContractorEdge) {
        self.adjacency[source as usize].push(edge);
    }

    fn delete_node(&mut self, node: u32) {
        let neighbors: Vec<u32> = self.adjacency[node as usize]
            .iter()
            .map(|e| e.target)
            .collect();
        for neighbor in neighbors {
            self.adjacency[neighbor as usize].retain(|e| e.target != node);
        }
        self.adjacency[node as usize].clear();
    }

    fn find_edge(&self, source: u32, target: u32) -> Option<&ContractorEdge> {
        self.adjacency[source as usize]
            .iter()
            .find(|e| e.target == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: u32, target: u32, weight: u32, forward: bool, backward: bool) -> EdgeBasedEdge {
        EdgeBasedEdge {
            source,
            target,
            edge_id: source * 100 + target,
            weight,
            forward,
            backward,
        }
    }

    #[test]
    fn normalization_merges_symmetric_pairs() {
        // One forward edge 0→1 and one backward-capable record merge when
        // the weights agree.
        let graph =
            DynamicGraph::from_input_edges(2, &[input(0, 1, 10, true, true)]);
        assert_eq!(graph.edges(0).len(), 1);
        let e = graph.edges(0)[0];
        assert!(e.data.forward && e.data.backward);
        let m = graph.edges(1)[0];
        assert!(m.data.forward && m.data.backward);
    }

    #[test]
    fn asymmetric_weights_stay_separate() {
        let graph = DynamicGraph::from_input_edges(
            2,
            &[input(0, 1, 10, true, false), input(1, 0, 20, true, false)],
        );
        // Node 0: forward record (w=10) and backward record (w=20).
        let fwd = graph.edges(0).iter().find(|e| e.data.forward).unwrap();
        let bwd = graph.edges(0).iter().find(|e| e.data.backward).unwrap();
        assert_eq!(fwd.data.weight, 10);
        assert_eq!(bwd.data.weight, 20);
    }

    #[test]
    fn parallel_edges_keep_minimum() {
        let graph = DynamicGraph::from_input_edges(
            2,
            &[input(0, 1, 10, true, false), input(0, 1, 7, true, false)],
        );
        assert_eq!(graph.edges(0).len(), 1);
        assert_eq!(graph.edges(0)[0].data.weight, 7);
    }

    #[test]
    fn delete_node_removes_both_sides() {
        let mut graph = DynamicGraph::from_input_edges(
            3,
            &[input(0, 1, 10, true, true), input(1, 2, 10, true, true)],
        );
        graph.delete_node(1);
        assert!(graph.edges(1).is_empty());
        assert!(graph.edges(0).is_empty());
        assert!(graph.edges(2).is_empty());
    }

    #[test]
    fn shortcut_dedup_keeps_shorter() {
        let mut graph = DynamicGraph::from_input_edges(2, &[input(0, 1, 10, true, false)]);
        // A heavier shortcut is absorbed by the existing edge.
        graph.add_directed_shortcut(0, 1, 15, 9);
        assert_eq!(graph.edges(0).len(), 1);
        assert!(!graph.edges(0)[0].data.shortcut);

        // A lighter one improves the record in place.
        graph.add_directed_shortcut(0, 1, 5, 9);
        assert_eq!(graph.edges(0).len(), 1);
        let e = graph.edges(0)[0];
        assert!(e.data.shortcut);
        assert_eq!(e.data.weight, 5);
        assert_eq!(e.data.middle, 9);
        // Mirror stays consistent.
        let m = graph.edges(1)[0];
        assert!(m.data.backward && !m.data.forward);
        assert_eq!(m.data.weight, 5);
    }

    #[test]
    fn shortcut_splits_shared_record() {
        let mut graph = DynamicGraph::from_input_edges(2, &[input(0, 1, 10, true, true)]);
        graph.add_directed_shortcut(0, 1, 5, 9);
        // The old record lost its forward flag, the new one carries it.
        let fwd: Vec<_> = graph.edges(0).iter().filter(|e| e.data.forward).collect();
        assert_eq!(fwd.len(), 1);
        assert_eq!(fwd[0].data.weight, 5);
        let bwd: Vec<_> = graph.edges(0).iter().filter(|e| e.data.backward).collect();
        assert_eq!(bwd.len(), 1);
        assert_eq!(bwd[0].data.weight, 10);
    }
}
