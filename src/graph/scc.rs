//! Strongly-connected-component labeling of the edge-based graph.
//!
//! Runs on the directed augmented graph: all traversable edge-based edges
//! plus symmetric links between the paired forward/reverse ids of every
//! segment, so that the two directions of one road always share a
//! component. Components under 1000 nodes are flagged tiny; the query
//! engine uses the flag to avoid snapping onto disconnected islands.

use rayon::prelude::*;

use super::edge_based::{EdgeBasedEdge, EdgeBasedNode};
use crate::INVALID_NODE_ID;

pub const TINY_COMPONENT_SIZE: usize = 1000;

/// Annotate `nodes` in place with component ids and tiny flags.
pub fn label_components(
    node_count: u32,
    edges: &[EdgeBasedEdge],
    nodes: &mut [EdgeBasedNode],
) {
    let mut links: Vec<(u32, u32)> = Vec::with_capacity(edges.len() * 2 + nodes.len() * 2);
    for edge in edges {
        if edge.forward {
            links.push((edge.source, edge.target));
        }
        if edge.backward {
            links.push((edge.target, edge.source));
        }
    }
    for node in nodes.iter() {
        if node.reverse_edge_based_node_id != INVALID_NODE_ID
            && node.forward_edge_based_node_id != INVALID_NODE_ID
        {
            links.push((
                node.forward_edge_based_node_id,
                node.reverse_edge_based_node_id,
            ));
            links.push((
                node.reverse_edge_based_node_id,
                node.forward_edge_based_node_id,
            ));
        }
    }
    links.par_sort_unstable();
    links.dedup();

    let scc = TarjanScc::run(node_count as usize, &links);

    for node in nodes.iter_mut() {
        let representative = if node.forward_edge_based_node_id != INVALID_NODE_ID {
            node.forward_edge_based_node_id
        } else {
            node.reverse_edge_based_node_id
        };
        let component = scc.component_of[representative as usize];
        node.component_id = 1 + component;
        node.is_tiny_component =
            (scc.component_sizes[component as usize] as usize) < TINY_COMPONENT_SIZE;
        debug_assert!(
            node.reverse_edge_based_node_id == INVALID_NODE_ID
                || node.forward_edge_based_node_id == INVALID_NODE_ID
                || scc.component_of[node.reverse_edge_based_node_id as usize] == component,
            "paired edge-based nodes must share a component"
        );
    }
}

pub struct TarjanScc {
    pub component_of: Vec<u32>,
    pub component_sizes: Vec<u32>,
}

impl TarjanScc {
    /// Iterative Tarjan over a CSR built from sorted `links`.
    pub fn run(node_count: usize, links: &[(u32, u32)]) -> Self {
        let mut first: Vec<u32> = vec![0; node_count + 1];
        for &(source, _) in links {
            first[source as usize + 1] += 1;
        }
        for i in 0..node_count {
            first[i + 1] += first[i];
        }
        let targets: Vec<u32> = links.iter().map(|&(_, t)| t).collect();

        const UNVISITED: u32 = u32::MAX;
        let mut index_of = vec![UNVISITED; node_count];
        let mut low_link = vec![0u32; node_count];
        let mut on_stack = vec![false; node_count];
        let mut component_of = vec![0u32; node_count];
        let mut component_sizes = Vec::new();
        let mut stack: Vec<u32> = Vec::new();
        let mut next_index = 0u32;

        // Explicit DFS frames: (node, next child offset).
        let mut frames: Vec<(u32, u32)> = Vec::new();

        for root in 0..node_count as u32 {
            if index_of[root as usize] != UNVISITED {
                continue;
            }
            frames.push((root, first[root as usize]));
            index_of[root as usize] = next_index;
            low_link[root as usize] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root as usize] = true;

            while let Some(frame) = frames.last_mut() {
                let node = frame.0;
                let end = first[node as usize + 1];
                if frame.1 < end {
                    let target = targets[frame.1 as usize];
                    frame.1 += 1;
                    if index_of[target as usize] == UNVISITED {
                        index_of[target as usize] = next_index;
                        low_link[target as usize] = next_index;
                        next_index += 1;
                        stack.push(target);
                        on_stack[target as usize] = true;
                        frames.push((target, first[target as usize]));
                    } else if on_stack[target as usize] {
                        low_link[node as usize] =
                            low_link[node as usize].min(index_of[target as usize]);
                    }
                } else {
                    frames.pop();
                    if let Some(&(parent, _)) = frames.last() {
                        low_link[parent as usize] =
                            low_link[parent as usize].min(low_link[node as usize]);
                    }
                    if low_link[node as usize] == index_of[node as usize] {
                        let component = component_sizes.len() as u32;
                        let mut size = 0u32;
                        loop {
                            let member = stack.pop().expect("tarjan stack underflow");
                            on_stack[member as usize] = false;
                            component_of[member as usize] = component;
                            size += 1;
                            if member == node {
                                break;
                            }
                        }
                        component_sizes.push(size);
                    }
                }
            }
        }

        Self {
            component_of,
            component_sizes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_cycles_are_two_components() {
        // 0→1→0 and 2→3→2, no cross links.
        let links = vec![(0, 1), (1, 0), (2, 3), (3, 2)];
        let mut sorted = links.clone();
        sorted.sort_unstable();
        let scc = TarjanScc::run(4, &sorted);
        assert_eq!(scc.component_sizes.len(), 2);
        assert_eq!(scc.component_of[0], scc.component_of[1]);
        assert_eq!(scc.component_of[2], scc.component_of[3]);
        assert_ne!(scc.component_of[0], scc.component_of[2]);
    }

    #[test]
    fn one_way_bridge_does_not_merge() {
        // 0↔1, 2↔3, bridge 1→2 only: still two SCCs.
        let mut links = vec![(0, 1), (1, 0), (2, 3), (3, 2), (1, 2)];
        links.sort_unstable();
        let scc = TarjanScc::run(4, &links);
        assert_eq!(scc.component_sizes.len(), 2);
    }

    #[test]
    fn isolated_nodes_are_singletons() {
        let scc = TarjanScc::run(3, &[]);
        assert_eq!(scc.component_sizes, vec![1, 1, 1]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        // A long path exercises the explicit DFS stack.
        let n = 100_000;
        let links: Vec<(u32, u32)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        let scc = TarjanScc::run(n as usize, &links);
        assert_eq!(scc.component_sizes.len(), n as usize);
    }
}
