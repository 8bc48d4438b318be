//! Degree-2 chain collapse.
//!
//! Every maximal chain of plain intersections between two "interesting"
//! nodes is folded into one edge per direction. Interesting means: barrier,
//! via node of a turn restriction, degree other than 2, or attribute
//! mismatch between the two incident edges. Collapsing sums weights, folds
//! the traffic-signal penalty into the downstream half, concatenates the
//! geometry, and remaps restriction endpoints that pointed at the collapsed
//! node.

use rustc_hash::FxHashSet;

use super::compressed::CompressedEdgeContainer;
use super::node_based::{NodeBasedGraph, QueryNode};
use super::restriction::RestrictionMap;
use crate::geometry::haversine_meters;
use crate::NodeId;

pub struct GraphCompressor {
    traffic_signal_penalty: i32,
}

impl GraphCompressor {
    pub fn new(traffic_signal_penalty: i32) -> Self {
        Self {
            traffic_signal_penalty,
        }
    }

    pub fn compress(
        &self,
        barrier_nodes: &FxHashSet<NodeId>,
        traffic_lights: &FxHashSet<NodeId>,
        restriction_map: &mut RestrictionMap,
        graph: &mut NodeBasedGraph,
        container: &mut CompressedEdgeContainer,
        coordinates: &[QueryNode],
    ) -> usize {
        let node_count = graph.node_count();
        let mut collapsed = 0usize;

        for node_v in 0..node_count as NodeId {
            if barrier_nodes.contains(&node_v) || restriction_map.is_via_node(node_v) {
                continue;
            }
            if graph.degree(node_v) != 2 {
                continue;
            }

            let mut out = graph.arcs_of(node_v);
            let forward_e2 = out.next().unwrap();
            let reverse_e2 = out.next().unwrap();
            drop(out);

            let node_w = graph.target(forward_e2);
            let node_u = graph.target(reverse_e2);
            if node_u == node_w || node_u == node_v || node_w == node_v {
                continue;
            }

            let (Some(forward_e1), Some(reverse_e1)) =
                (graph.find_arc(node_u, node_v), graph.find_arc(node_w, node_v))
            else {
                continue;
            };

            // Both through-directions must agree on everything but weight.
            let compatible = {
                let fwd1 = &graph.arc(forward_e1).data;
                let fwd2 = &graph.arc(forward_e2).data;
                let rev1 = &graph.arc(reverse_e1).data;
                let rev2 = &graph.arc(reverse_e2).data;
                fwd1.is_compatible_to(fwd2) && rev1.is_compatible_to(rev2)
            };
            if !compatible {
                continue;
            }

            let forward_weight1 = graph.arc(forward_e1).data.weight.max(0) as u32;
            let forward_weight2 = graph.arc(forward_e2).data.weight.max(0) as u32;
            let reverse_weight1 = graph.arc(reverse_e1).data.weight.max(0) as u32;
            let reverse_weight2 = graph.arc(reverse_e2).data.weight.max(0) as u32;

            let penalty = if traffic_lights.contains(&node_v) {
                self.traffic_signal_penalty.max(0) as u32
            } else {
                0
            };

            let len_uv = segment_length(coordinates, node_u, node_v);
            let len_vw = segment_length(coordinates, node_v, node_w);

            container.compress(
                forward_e1,
                forward_e2,
                node_v,
                node_w,
                forward_weight1,
                forward_weight2,
                len_uv,
                len_vw,
                penalty,
            );
            container.compress(
                reverse_e1,
                reverse_e2,
                node_v,
                node_u,
                reverse_weight1,
                reverse_weight2,
                len_vw,
                len_uv,
                penalty,
            );

            graph.arc_mut(forward_e1).data.weight =
                (forward_weight1 + forward_weight2 + penalty) as i32;
            graph.arc_mut(forward_e1).target = node_w;
            graph.arc_mut(reverse_e1).data.weight =
                (reverse_weight1 + reverse_weight2 + penalty) as i32;
            graph.arc_mut(reverse_e1).target = node_u;

            graph.delete_arc(forward_e2);
            graph.delete_arc(reverse_e2);

            restriction_map.fixup_starting(node_u, node_v, node_w);
            restriction_map.fixup_starting(node_w, node_v, node_u);
            restriction_map.fixup_arriving(node_u, node_v, node_w);
            restriction_map.fixup_arriving(node_w, node_v, node_u);

            collapsed += 1;
        }

        collapsed
    }
}

fn segment_length(coordinates: &[QueryNode], from: NodeId, to: NodeId) -> f32 {
    let a = &coordinates[from as usize];
    let b = &coordinates[to as usize];
    haversine_meters(a.lat_f64(), a.lon_f64(), b.lat_f64(), b.lon_f64()) as f32
}
