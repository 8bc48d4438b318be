//! Parallel contraction-hierarchy construction.
//!
//! Rounds of: recompute stale priorities, select a two-hop independent set
//! of locally minimal nodes, simulate their contractions in parallel on
//! thread-local scratch state, recheck, then commit on a single thread.
//! Two-hop independence makes the committed contractions commute: a
//! selected node's one-hop neighborhood is disjoint from every other
//! selected node's, and shortcuts inserted elsewhere preserve distances, so
//! the simulated shortcut sets stay exact at commit time.

pub mod graph;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use self::graph::{ContractionGraph, DynamicGraph};
use crate::graph::edge_based::EdgeBasedEdge;

/// Output edge of the contraction: original edges plus shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryEdge {
    pub source: u32,
    pub target: u32,
    pub data: QueryEdgeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryEdgeData {
    pub weight: u32,
    /// Middle node iff `shortcut`, original edge id otherwise.
    pub id: u32,
    pub shortcut: bool,
    pub forward: bool,
    pub backward: bool,
}

impl Ord for QueryEdge {
    // Total order so equal-endpoint records sort reproducibly and repeat
    // runs serialize byte-identical output.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (
            self.source,
            self.target,
            self.data.weight,
            self.data.id,
            self.data.forward,
            self.data.backward,
            self.data.shortcut,
        )
            .cmp(&(
                other.source,
                other.target,
                other.data.weight,
                other.data.id,
                other.data.forward,
                other.data.backward,
                other.data.shortcut,
            ))
    }
}

impl PartialOrd for QueryEdge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct ContractionResult {
    pub edges: Vec<QueryEdge>,
    /// Bit per node: left uncontracted (the core).
    pub is_core: Vec<bool>,
    /// Contraction round per node, +inf for core nodes.
    pub levels: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Shortcut {
    from: u32,
    to: u32,
    weight: u32,
    originals: u32,
}

#[derive(Debug, Default)]
struct Simulation {
    shortcuts: Vec<Shortcut>,
    in_degree: usize,
    out_degree: usize,
    removed_hops: u32,
    shortcut_hops: u32,
}

/// Thread-local witness-search state.
struct Scratch {
    heap: BinaryHeap<Reverse<(u32, u32)>>,
    dist: FxHashMap<u32, u32>,
}

impl Scratch {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            dist: FxHashMap::default(),
        }
    }
}

/// Contract the edge-based graph.
///
/// `cached_levels` (from `--use-cached-priority`) replaces the priority
/// heuristic entirely: nodes are taken in cached-level order and priorities
/// are never recomputed.
pub fn contract(
    node_count: u32,
    input_edges: &[EdgeBasedEdge],
    core_factor: f64,
    cached_levels: Option<Vec<f32>>,
) -> ContractionResult {
    let n = node_count as usize;
    let mut graph = DynamicGraph::from_input_edges(node_count, input_edges);

    let use_cached = cached_levels.is_some();
    let mut priorities: Vec<f32> = cached_levels.unwrap_or_else(|| vec![0.0; n]);
    if use_cached && priorities.len() != n {
        priorities.resize(n, f32::INFINITY);
    }
    let mut depths: Vec<i32> = vec![0; n];
    let mut levels: Vec<f32> = vec![f32::INFINITY; n];
    let mut contracted: Vec<bool> = vec![false; n];
    let mut needs_update: Vec<bool> = vec![true; n];

    let mut external_edges: Vec<QueryEdge> = Vec::new();
    let mut remaining: Vec<u32> = (0..node_count).collect();
    let mut contracted_count = 0usize;
    let mut round = 0u32;

    println!(
        "Contracting {} nodes, {} input edges (core factor {})",
        n,
        input_edges.len(),
        core_factor
    );

    let mut last_report = 0usize;
    while (contracted_count as f64) < core_factor * n as f64 {
        let hop_limit = hop_limit_for(contracted_count, n);

        // Step 1: refresh priorities invalidated by the last round.
        if !use_cached {
            let updates: Vec<(u32, f32)> = remaining
                .par_iter()
                .filter(|&&v| needs_update[v as usize])
                .map_init(Scratch::new, |scratch, &v| {
                    let sim = simulate(&graph, v, hop_limit, scratch);
                    (v, priority_of(&sim, depths[v as usize]))
                })
                .collect();
            for (v, priority) in updates {
                priorities[v as usize] = priority;
                needs_update[v as usize] = false;
            }
        }

        // Step 2: two-hop independent set of locally minimal nodes.
        let independent: Vec<u32> = remaining
            .par_iter()
            .copied()
            .filter(|&v| is_locally_minimal(&graph, &priorities, v))
            .collect();
        if independent.is_empty() {
            break;
        }

        // Step 3: simulate the selected contractions in parallel.
        let simulations: Vec<(u32, Simulation)> = independent
            .par_iter()
            .map_init(Scratch::new, |scratch, &v| {
                (v, simulate(&graph, v, hop_limit, scratch))
            })
            .collect();

        // Step 4: recheck with the refreshed priorities; defer nodes that
        // lost their local minimum (but never the whole round).
        let mut survivors: Vec<&(u32, Simulation)> = Vec::with_capacity(simulations.len());
        if !use_cached {
            for (v, sim) in &simulations {
                priorities[*v as usize] = priority_of(sim, depths[*v as usize]);
            }
            for pair in &simulations {
                if is_locally_minimal(&graph, &priorities, pair.0) || survivors.is_empty() {
                    survivors.push(pair);
                }
            }
        } else {
            survivors.extend(simulations.iter());
        }

        // Step 5: single-threaded commit.
        for (v, sim) in survivors {
            if (contracted_count as f64) >= core_factor * n as f64 {
                break;
            }
            let v = *v;
            for shortcut in &sim.shortcuts {
                graph.add_directed_shortcut(shortcut.from, shortcut.to, shortcut.weight, v);
                graph.set_shortcut_originals(shortcut.from, shortcut.to, shortcut.originals);
            }

            let neighbors: Vec<u32> = graph.edges(v).iter().map(|e| e.target).collect();
            for edge in graph.edges(v) {
                if edge.target == v {
                    continue;
                }
                external_edges.push(QueryEdge {
                    source: v,
                    target: edge.target,
                    data: QueryEdgeData {
                        weight: edge.data.weight,
                        id: if edge.data.shortcut {
                            edge.data.middle
                        } else {
                            edge.data.id
                        },
                        shortcut: edge.data.shortcut,
                        forward: edge.data.forward,
                        backward: edge.data.backward,
                    },
                });
            }
            graph.delete_node(v);

            levels[v as usize] = round as f32;
            contracted[v as usize] = true;
            contracted_count += 1;

            for neighbor in neighbors {
                let d = depths[v as usize] + 1;
                if depths[neighbor as usize] < d {
                    depths[neighbor as usize] = d;
                }
                needs_update[neighbor as usize] = true;
            }
        }

        remaining.retain(|&v| !contracted[v as usize]);
        round += 1;

        if contracted_count - last_report >= (n / 20).max(1) {
            println!(
                "  {:5.1}% contracted ({} rounds, {} edges emitted)",
                contracted_count as f64 / n as f64 * 100.0,
                round,
                external_edges.len()
            );
            last_report = contracted_count;
        }
    }

    // Core nodes keep their mutual edges; each live endpoint contributes its
    // records so bidirectional search works inside the core.
    for &v in &remaining {
        for edge in graph.edges(v) {
            if edge.target == v {
                continue;
            }
            external_edges.push(QueryEdge {
                source: v,
                target: edge.target,
                data: QueryEdgeData {
                    weight: edge.data.weight,
                    id: if edge.data.shortcut {
                        edge.data.middle
                    } else {
                        edge.data.id
                    },
                    shortcut: edge.data.shortcut,
                    forward: edge.data.forward,
                    backward: edge.data.backward,
                },
            });
        }
    }

    let is_core: Vec<bool> = contracted.iter().map(|&c| !c).collect();
    println!(
        "  ✓ Contraction done: {} rounds, {} core nodes, {} edges",
        round,
        is_core.iter().filter(|&&c| c).count(),
        external_edges.len()
    );

    ContractionResult {
        edges: external_edges,
        is_core,
        levels,
    }
}

/// Witness hop limit: generous early, tight once the graph is dense with
/// shortcuts.
fn hop_limit_for(contracted: usize, total: usize) -> u32 {
    let ratio = contracted as f64 / total.max(1) as f64;
    if ratio < 0.6 {
        5
    } else if ratio < 0.9 {
        3
    } else {
        2
    }
}

fn priority_of(sim: &Simulation, depth: i32) -> f32 {
    let product = (sim.in_degree * sim.out_degree) as f32;
    let edge_quotient = if product > 0.0 {
        sim.shortcuts.len() as f32 / product
    } else {
        0.0
    };
    let original_quotient = if sim.removed_hops > 0 {
        (2 * sim.shortcut_hops) as f32 / sim.removed_hops as f32
    } else {
        0.0
    };
    edge_quotient + original_quotient + depth as f32
}

/// Priority comparison with deterministic id tie-break.
fn beats(priority_a: f32, a: u32, priority_b: f32, b: u32) -> bool {
    priority_a < priority_b || (priority_a == priority_b && a < b)
}

/// Is `v`'s priority minimal over its two-hop neighborhood?
fn is_locally_minimal<G: ContractionGraph>(graph: &G, priorities: &[f32], v: u32) -> bool {
    let p = priorities[v as usize];
    for e1 in graph.edges(v) {
        let u = e1.target;
        if u == v {
            continue;
        }
        if beats(priorities[u as usize], u, p, v) {
            return false;
        }
        for e2 in graph.edges(u) {
            let w = e2.target;
            if w == v || w == u {
                continue;
            }
            if beats(priorities[w as usize], w, p, v) {
                return false;
            }
        }
    }
    true
}

/// Determine the shortcuts contracting `v` would require. A shortcut u→w is
/// needed iff no witness path of weight ≤ weight(u→v→w) avoids v.
fn simulate<G: ContractionGraph>(
    graph: &G,
    v: u32,
    hop_limit: u32,
    scratch: &mut Scratch,
) -> Simulation {
    let mut sim = Simulation::default();

    let mut in_list: Vec<(u32, u32, u32)> = Vec::new();
    let mut out_list: Vec<(u32, u32, u32)> = Vec::new();
    for edge in graph.edges(v) {
        if edge.target == v {
            continue;
        }
        sim.removed_hops += edge.data.originals.max(1);
        if edge.data.backward {
            in_list.push((edge.target, edge.data.weight, edge.data.originals.max(1)));
        }
        if edge.data.forward {
            out_list.push((edge.target, edge.data.weight, edge.data.originals.max(1)));
        }
    }
    sim.in_degree = in_list.len();
    sim.out_degree = out_list.len();
    if in_list.is_empty() || out_list.is_empty() {
        return sim;
    }

    for &(u, weight_in, originals_in) in &in_list {
        let limit = out_list
            .iter()
            .filter(|&&(w, _, _)| w != u)
            .map(|&(_, weight_out, _)| weight_in + weight_out)
            .max();
        let Some(limit) = limit else { continue };

        witness_search(graph, scratch, u, v, limit, hop_limit);

        for &(w, weight_out, originals_out) in &out_list {
            if w == u {
                continue;
            }
            let path_weight = weight_in + weight_out;
            let witnessed = scratch
                .dist
                .get(&w)
                .is_some_and(|&d| d <= path_weight);
            if !witnessed {
                sim.shortcuts.push(Shortcut {
                    from: u,
                    to: w,
                    weight: path_weight,
                    originals: originals_in + originals_out,
                });
                sim.shortcut_hops += originals_in + originals_out;
            }
        }
    }

    sim
}

/// Bounded forward Dijkstra from `source`, never entering `forbidden`,
/// pruned at `limit` and `hop_limit`. Distances land in `scratch.dist`.
fn witness_search<G: ContractionGraph>(
    graph: &G,
    scratch: &mut Scratch,
    source: u32,
    forbidden: u32,
    limit: u32,
    hop_limit: u32,
) {
    scratch.heap.clear();
    scratch.dist.clear();
    let mut hops: FxHashMap<u32, u32> = FxHashMap::default();

    scratch.dist.insert(source, 0);
    hops.insert(source, 0);
    scratch.heap.push(Reverse((0, source)));

    while let Some(Reverse((d, node))) = scratch.heap.pop() {
        if d > limit {
            break;
        }
        if scratch.dist.get(&node).is_some_and(|&best| d > best) {
            continue;
        }
        let node_hops = hops.get(&node).copied().unwrap_or(0);
        if node_hops >= hop_limit {
            continue;
        }

        for edge in graph.edges(node) {
            if !edge.data.forward || edge.target == forbidden {
                continue;
            }
            let next = d.saturating_add(edge.data.weight);
            if next > limit {
                continue;
            }
            let improved = scratch
                .dist
                .get(&edge.target)
                .map_or(true, |&best| next < best);
            if improved {
                scratch.dist.insert(edge.target, next);
                hops.insert(edge.target, node_hops + 1);
                scratch.heap.push(Reverse((next, edge.target)));
            }
        }
    }
}
