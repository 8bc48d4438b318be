//! Edge-based graph factory.
//!
//! Expands the compressed node-based graph: every traversable directed road
//! segment becomes an edge-based node, every legal turn between two segments
//! becomes an edge-based edge priced by the profile's turn function. Turn
//! restrictions, u-turn policy, barrier pass-through and traffic-signal
//! penalties are all materialized here; downstream stages never see them
//! again.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::compressed::CompressedEdgeContainer;
use super::node_based::{ArcIndex, NodeBasedGraph, QueryNode};
use super::restriction::RestrictionMap;
use crate::fingerprint::Fingerprint;
use crate::geometry::{haversine_meters, turn_angle};
use crate::profile::{Profile, ProfileProperties};
use crate::{NodeId, INVALID_NODE_ID};

/// One edge-based node: a directed road segment (plus its paired reverse
/// direction, when that exists).
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNode {
    pub forward_edge_based_node_id: u32,
    /// `INVALID_NODE_ID` for one-way segments.
    pub reverse_edge_based_node_id: u32,
    pub u: NodeId,
    pub v: NodeId,
    pub geometry_offset: u32,
    pub component_id: u32,
    pub is_tiny_component: bool,
    pub forward_length: f32,
    pub reverse_length: f32,
    pub name_id: u32,
    pub travel_mode: u8,
}

/// 16-byte edge-based edge record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeBasedEdge {
    pub source: u32,
    pub target: u32,
    /// Running id of this edge, also the record index in the side-car files.
    pub edge_id: u32,
    pub weight: u32,
    pub forward: bool,
    pub backward: bool,
}

pub const EDGE_BASED_EDGE_SIZE: usize = 16;
const WEIGHT_MASK: u32 = (1 << 30) - 1;

impl EdgeBasedEdge {
    pub fn encode(&self) -> [u8; EDGE_BASED_EDGE_SIZE] {
        let mut buf = [0u8; EDGE_BASED_EDGE_SIZE];
        buf[0..4].copy_from_slice(&self.source.to_le_bytes());
        buf[4..8].copy_from_slice(&self.target.to_le_bytes());
        buf[8..12].copy_from_slice(&self.edge_id.to_le_bytes());
        let packed = (self.weight & WEIGHT_MASK)
            | (self.forward as u32) << 30
            | (self.backward as u32) << 31;
        buf[12..16].copy_from_slice(&packed.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; EDGE_BASED_EDGE_SIZE]) -> Self {
        let packed = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        Self {
            source: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            target: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            edge_id: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            weight: packed & WEIGHT_MASK,
            forward: packed & (1 << 30) != 0,
            backward: packed & (1 << 31) != 0,
        }
    }
}

/// Result of the expansion.
pub struct EdgeExpansion {
    pub nodes: Vec<EdgeBasedNode>,
    pub edges: Vec<EdgeBasedEdge>,
    pub edge_based_node_count: u32,
}

/// Streaming writers for the side-car lookup files.
pub struct SidecarWriters {
    segments: BufWriter<File>,
    penalties: BufWriter<File>,
}

impl SidecarWriters {
    pub fn create<P: AsRef<Path>>(segment_path: P, penalty_path: P) -> Result<Self> {
        Ok(Self {
            segments: BufWriter::new(File::create(segment_path.as_ref()).with_context(|| {
                format!("Failed to create {}", segment_path.as_ref().display())
            })?),
            penalties: BufWriter::new(File::create(penalty_path.as_ref()).with_context(|| {
                format!("Failed to create {}", penalty_path.as_ref().display())
            })?),
        })
    }

    pub fn finish(mut self) -> Result<()> {
        self.segments.flush()?;
        self.penalties.flush()?;
        Ok(())
    }
}

pub struct EdgeBasedGraphFactory<'a> {
    graph: &'a NodeBasedGraph,
    container: &'a mut CompressedEdgeContainer,
    restriction_map: &'a RestrictionMap,
    barrier_nodes: &'a FxHashSet<NodeId>,
    traffic_lights: &'a FxHashSet<NodeId>,
    coordinates: &'a [QueryNode],
    properties: ProfileProperties,
}

impl<'a> EdgeBasedGraphFactory<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &'a NodeBasedGraph,
        container: &'a mut CompressedEdgeContainer,
        restriction_map: &'a RestrictionMap,
        barrier_nodes: &'a FxHashSet<NodeId>,
        traffic_lights: &'a FxHashSet<NodeId>,
        coordinates: &'a [QueryNode],
        properties: ProfileProperties,
    ) -> Self {
        Self {
            graph,
            container,
            restriction_map,
            barrier_nodes,
            traffic_lights,
            coordinates,
            properties,
        }
    }

    pub fn run(
        &mut self,
        profile: &mut dyn Profile,
        mut sidecars: Option<&mut SidecarWriters>,
    ) -> Result<EdgeExpansion> {
        let (arc_to_ebn, node_count) = self.renumber_arcs();
        let nodes = self.build_edge_based_nodes(&arc_to_ebn);
        println!("  ✓ Generated {} edge-based nodes", node_count);

        let edges = self.generate_edges(profile, &arc_to_ebn, sidecars.as_deref_mut())?;
        println!("  ✓ Generated {} edge-based edges", edges.len());

        Ok(EdgeExpansion {
            nodes,
            edges,
            edge_based_node_count: node_count,
        })
    }

    /// Assign a dense edge-based node id to every traversable directed arc,
    /// in node order then adjacency order.
    fn renumber_arcs(&self) -> (Vec<u32>, u32) {
        let mut ids = vec![INVALID_NODE_ID; self.graph.arc_count()];
        let mut next = 0u32;
        for u in 0..self.graph.node_count() as NodeId {
            for arc in self.graph.arcs_of(u) {
                if !self.graph.arc(arc).data.reversed {
                    ids[arc as usize] = next;
                    next += 1;
                }
            }
        }
        (ids, next)
    }

    fn build_edge_based_nodes(&mut self, arc_to_ebn: &[u32]) -> Vec<EdgeBasedNode> {
        let mut nodes = Vec::new();
        for u in 0..self.graph.node_count() as NodeId {
            for arc in self.graph.arcs_of(u).collect::<Vec<_>>() {
                let v = self.graph.target(arc);
                // Visit each undirected pair once, from its low endpoint.
                if u > v {
                    continue;
                }
                let reverse_arc = match self.graph.find_arc(v, u) {
                    Some(r) => r,
                    None => continue,
                };
                let forward_id = arc_to_ebn[arc as usize];
                let reverse_id = arc_to_ebn[reverse_arc as usize];
                if forward_id == INVALID_NODE_ID && reverse_id == INVALID_NODE_ID {
                    continue;
                }

                let geometry_arc = if forward_id != INVALID_NODE_ID {
                    arc
                } else {
                    reverse_arc
                };
                let (geom_source, geom_target) = if geometry_arc == arc { (u, v) } else { (v, u) };
                let base_length = self.segment_length(geom_source, geom_target);
                let weight = self.graph.arc(geometry_arc).data.weight.max(1) as u32;
                let geometry_offset = self.container.position_or_insert(
                    geometry_arc,
                    geom_target,
                    base_length,
                    weight,
                );

                let forward_length = self.direction_length(arc, u, v);
                let reverse_length = self.direction_length(reverse_arc, v, u);

                let data = &self.graph.arc(geometry_arc).data;
                nodes.push(EdgeBasedNode {
                    forward_edge_based_node_id: forward_id,
                    reverse_edge_based_node_id: reverse_id,
                    u,
                    v,
                    geometry_offset,
                    component_id: 0,
                    is_tiny_component: false,
                    forward_length,
                    reverse_length,
                    name_id: data.name_id,
                    travel_mode: data.travel_mode,
                });
            }
        }
        nodes
    }

    fn direction_length(&self, arc: ArcIndex, from: NodeId, to: NodeId) -> f32 {
        match self.container.segments(arc) {
            Some(segments) => segments.iter().map(|s| s.length).sum(),
            None => self.segment_length(from, to),
        }
    }

    fn segment_length(&self, from: NodeId, to: NodeId) -> f32 {
        let a = &self.coordinates[from as usize];
        let b = &self.coordinates[to as usize];
        haversine_meters(a.lat_f64(), a.lon_f64(), b.lat_f64(), b.lon_f64()) as f32
    }

    fn generate_edges(
        &self,
        profile: &mut dyn Profile,
        arc_to_ebn: &[u32],
        mut sidecars: Option<&mut SidecarWriters>,
    ) -> Result<Vec<EdgeBasedEdge>> {
        let mut edges = Vec::new();

        for node_u in 0..self.graph.node_count() as NodeId {
            for e1 in self.graph.arcs_of(node_u) {
                if self.graph.arc(e1).data.reversed {
                    continue;
                }
                let node_v = self.graph.target(e1);
                let is_barrier = self.barrier_nodes.contains(&node_v);

                for e2 in self.graph.arcs_of(node_v) {
                    if self.graph.arc(e2).data.reversed {
                        continue;
                    }
                    let node_w = self.graph.target(e2);
                    let is_u_turn = node_u == node_w;

                    // Barriers block through traffic but allow turning back.
                    // Elsewhere u-turns exist at dead ends, or everywhere
                    // when the profile opts in.
                    if is_barrier && !is_u_turn {
                        continue;
                    }
                    if !is_barrier
                        && is_u_turn
                        && self.graph.degree(node_v) > 1
                        && !self.properties.allow_u_turns
                    {
                        continue;
                    }

                    if self.properties.use_turn_restrictions
                        && self
                            .restriction_map
                            .is_turn_restricted(node_u, node_v, node_w)
                    {
                        continue;
                    }

                    let angle = self.approach_angle(e1, e2, node_u, node_v);
                    let turn_penalty = profile.turn_function(angle);
                    if turn_penalty < 0 {
                        continue;
                    }

                    let mut fixed_penalty = turn_penalty as u32;
                    if self.traffic_lights.contains(&node_v) {
                        fixed_penalty += self.properties.traffic_signal_penalty.max(0) as u32;
                    }
                    if is_u_turn {
                        fixed_penalty += self.properties.u_turn_penalty.max(0) as u32;
                    }

                    let approach_weight = self.graph.arc(e1).data.weight.max(1) as u32;
                    let edge_id = edges.len() as u32;

                    if let Some(writers) = sidecars.as_deref_mut() {
                        self.write_sidecar_record(writers, e1, node_u, fixed_penalty)?;
                    }

                    edges.push(EdgeBasedEdge {
                        source: arc_to_ebn[e1 as usize],
                        target: arc_to_ebn[e2 as usize],
                        edge_id,
                        weight: approach_weight + fixed_penalty,
                        forward: true,
                        backward: false,
                    });
                }
            }
        }

        Ok(edges)
    }

    /// Turn angle at `node_v` between the last segment of the approach and
    /// the first segment of the exit. With fewer than three distinct
    /// geometry points this degrades to the endpoint bearings.
    fn approach_angle(&self, e1: ArcIndex, e2: ArcIndex, node_u: NodeId, node_v: NodeId) -> f64 {
        let first = match self.container.segments(e1) {
            Some(segments) if segments.len() >= 2 => segments[segments.len() - 2].node,
            _ => node_u,
        };
        let third = match self.container.segments(e2) {
            Some(segments) => segments[0].node,
            None => self.graph.target(e2),
        };
        let c = |n: NodeId| {
            let q = &self.coordinates[n as usize];
            (q.lat_f64(), q.lon_f64())
        };
        turn_angle(c(first), c(node_v), c(third))
    }

    /// One `.edge_segment_lookup` record: the approach edge's original
    /// segments by external node id, plus the fixed penalty record in
    /// `.edge_penalties`.
    fn write_sidecar_record(
        &self,
        writers: &mut SidecarWriters,
        e1: ArcIndex,
        node_u: NodeId,
        fixed_penalty: u32,
    ) -> Result<()> {
        writers
            .penalties
            .write_all(&fixed_penalty.to_le_bytes())?;

        let external = |n: NodeId| self.coordinates[n as usize].external;

        match self.container.segments(e1) {
            Some(segments) => {
                let node_count = segments.len() as u32 + 1;
                writers.segments.write_all(&node_count.to_le_bytes())?;
                writers
                    .segments
                    .write_all(&external(node_u).to_le_bytes())?;
                for segment in segments {
                    writers
                        .segments
                        .write_all(&external(segment.node).to_le_bytes())?;
                    writers
                        .segments
                        .write_all(&(segment.length as f64).to_le_bytes())?;
                    writers.segments.write_all(&segment.weight.to_le_bytes())?;
                }
            }
            None => {
                let node_v = self.graph.target(e1);
                let length = self.segment_length(node_u, node_v) as f64;
                let weight = self.graph.arc(e1).data.weight.max(1) as u32;
                writers.segments.write_all(&2u32.to_le_bytes())?;
                writers
                    .segments
                    .write_all(&external(node_u).to_le_bytes())?;
                writers
                    .segments
                    .write_all(&external(node_v).to_le_bytes())?;
                writers.segments.write_all(&length.to_le_bytes())?;
                writers.segments.write_all(&weight.to_le_bytes())?;
            }
        }
        Ok(())
    }
}

/// Write the `.edges` artifact.
pub fn write_edge_based_graph<P: AsRef<Path>>(
    path: P,
    max_edge_id: u64,
    edges: &[EdgeBasedEdge],
) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    Fingerprint::valid().write_to(&mut writer)?;
    writer.write_all(&(edges.len() as u64).to_le_bytes())?;
    writer.write_all(&max_edge_id.to_le_bytes())?;
    for edge in edges {
        writer.write_all(&edge.encode())?;
    }
    writer.flush()?;
    Ok(())
}
