//! Correctness harness for the contracted graph.
//!
//! The bidirectional upward search over the `.hsgr` CSR must return the
//! same distances as plain Dijkstra over the edge-based graph it was built
//! from. The test suite runs this on literal scenarios and on seeded random
//! pairs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::graph::edge_based::EdgeBasedEdge;
use crate::serialize::HsgrData;

/// Plain Dijkstra over the edge-based edge list. Returns the distance to
/// every reachable node.
pub fn plain_dijkstra(
    node_count: u32,
    edges: &[EdgeBasedEdge],
    source: u32,
) -> FxHashMap<u32, u32> {
    let mut adjacency: Vec<Vec<(u32, u32)>> = vec![Vec::new(); node_count as usize];
    for edge in edges {
        if edge.forward {
            adjacency[edge.source as usize].push((edge.target, edge.weight.max(1)));
        }
        if edge.backward {
            adjacency[edge.target as usize].push((edge.source, edge.weight.max(1)));
        }
    }

    let mut dist: FxHashMap<u32, u32> = FxHashMap::default();
    let mut heap = BinaryHeap::new();
    dist.insert(source, 0);
    heap.push(Reverse((0u32, source)));

    while let Some(Reverse((d, node))) = heap.pop() {
        if dist.get(&node).is_some_and(|&best| d > best) {
            continue;
        }
        for &(target, weight) in &adjacency[node as usize] {
            let next = d + weight;
            if dist.get(&target).map_or(true, |&best| next < best) {
                dist.insert(target, next);
                heap.push(Reverse((next, target)));
            }
        }
    }
    dist
}

/// Bidirectional search over the contracted CSR. Both directions only ever
/// scan a node's own record list; by construction every record points
/// upward in the hierarchy (or sideways inside the core).
pub struct ContractedSearch<'a> {
    data: &'a HsgrData,
}

impl<'a> ContractedSearch<'a> {
    pub fn new(data: &'a HsgrData) -> Self {
        Self { data }
    }

    fn records(&self, node: u32) -> impl Iterator<Item = &crate::serialize::HsgrEdge> {
        let begin = self.data.node_array[node as usize] as usize;
        let end = self.data.node_array[node as usize + 1] as usize;
        self.data.edges[begin..end].iter()
    }

    pub fn query(&self, source: u32, target: u32) -> Option<u32> {
        if source == target {
            return Some(0);
        }

        let mut forward_dist: FxHashMap<u32, u32> = FxHashMap::default();
        let mut backward_dist: FxHashMap<u32, u32> = FxHashMap::default();
        let mut forward_heap = BinaryHeap::new();
        let mut backward_heap = BinaryHeap::new();

        forward_dist.insert(source, 0);
        forward_heap.push(Reverse((0u32, source)));
        backward_dist.insert(target, 0);
        backward_heap.push(Reverse((0u32, target)));

        let mut best: Option<u32> = None;

        while !forward_heap.is_empty() || !backward_heap.is_empty() {
            if let Some(upper) = best {
                let forward_min = forward_heap.peek().map(|Reverse((d, _))| *d);
                let backward_min = backward_heap.peek().map(|Reverse((d, _))| *d);
                let continue_any = [forward_min, backward_min]
                    .into_iter()
                    .flatten()
                    .any(|d| d < upper);
                if !continue_any {
                    break;
                }
            }

            self.settle_one(
                &mut forward_heap,
                &mut forward_dist,
                &backward_dist,
                &mut best,
                true,
            );
            self.settle_one(
                &mut backward_heap,
                &mut backward_dist,
                &forward_dist,
                &mut best,
                false,
            );
        }

        best
    }

    fn settle_one(
        &self,
        heap: &mut BinaryHeap<Reverse<(u32, u32)>>,
        dist: &mut FxHashMap<u32, u32>,
        other: &FxHashMap<u32, u32>,
        best: &mut Option<u32>,
        forward: bool,
    ) {
        let Some(Reverse((d, node))) = heap.pop() else {
            return;
        };
        if dist.get(&node).is_some_and(|&known| d > known) {
            return;
        }
        if let Some(&other_d) = other.get(&node) {
            let total = d + other_d;
            if best.map_or(true, |b| total < b) {
                *best = Some(total);
            }
        }
        for record in self.records(node) {
            let traversable = if forward {
                record.forward
            } else {
                record.backward
            };
            if !traversable {
                continue;
            }
            let next = d + record.weight.max(1);
            if dist.get(&record.target).map_or(true, |&known| next < known) {
                dist.insert(record.target, next);
                heap.push(Reverse((next, record.target)));
            }
        }
    }
}

#[derive(Debug)]
pub struct ValidationReport {
    pub pairs_checked: usize,
    pub mismatches: usize,
}

/// Compare the contracted search against plain Dijkstra on seeded random
/// pairs. Deterministic for a given seed.
pub fn validate_ch_correctness(
    hsgr: &HsgrData,
    node_count: u32,
    edges: &[EdgeBasedEdge],
    n_pairs: usize,
    seed: u64,
) -> ValidationReport {
    let search = ContractedSearch::new(hsgr);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mismatches = 0usize;

    for _ in 0..n_pairs {
        let source = rng.gen_range(0..node_count);
        let target = rng.gen_range(0..node_count);
        let baseline = plain_dijkstra(node_count, edges, source)
            .get(&target)
            .copied();
        let contracted = search.query(source, target);
        if baseline != contracted {
            mismatches += 1;
            println!(
                "✗ mismatch {} → {}: dijkstra {:?}, hierarchy {:?}",
                source, target, baseline, contracted
            );
        }
    }

    ValidationReport {
        pairs_checked: n_pairs,
        mismatches,
    }
}

/// Structural invariants of the serialized CSR.
pub fn check_csr_invariants(hsgr: &HsgrData) -> Vec<String> {
    let mut errors = Vec::new();
    for window in hsgr.node_array.windows(2) {
        if window[0] > window[1] {
            errors.push(format!(
                "node array not monotone: {} > {}",
                window[0], window[1]
            ));
            break;
        }
    }
    if let Some(&last) = hsgr.node_array.last() {
        if last as usize != hsgr.edges.len() {
            errors.push(format!(
                "sentinel {} does not equal edge count {}",
                last,
                hsgr.edges.len()
            ));
        }
    }
    for (node, window) in hsgr.node_array.windows(2).enumerate() {
        for record in &hsgr.edges[window[0] as usize..window[1] as usize] {
            if record.target as usize + 1 >= hsgr.node_array.len() {
                errors.push(format!(
                    "edge of node {} targets {} beyond node array",
                    node, record.target
                ));
            }
        }
    }
    errors
}
