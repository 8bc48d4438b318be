//! Node-based graph: the road topology as parsed, before edge expansion.
//!
//! The on-disk form is the `.osrm` artifact. In memory the graph is a
//! dynamic adjacency structure that supports the in-place edits the
//! compressor needs: every input edge is materialized as two directed arcs
//! (one per direction, the non-traversable one marked `reversed`) so that
//! chain collapsing can always pair the two sides of a segment.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::fingerprint::Fingerprint;
use crate::{ExternalNodeId, NodeId, INVALID_NODE_ID};

/// Fixed-point coordinate scale: micro-degrees.
pub const COORDINATE_PRECISION: f64 = 1_000_000.0;

/// A node of the raw graph with its stable external id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryNode {
    pub external: ExternalNodeId,
    pub lat: i32,
    pub lon: i32,
}

impl QueryNode {
    pub fn lat_f64(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }

    pub fn lon_f64(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }
}

/// 20-byte node-based edge record of the `.osrm` artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeBasedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub name_id: u32,
    /// Deci-seconds.
    pub weight: i32,
    pub forward: bool,
    pub backward: bool,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub ignore_in_grid: bool,
    pub is_split: bool,
    pub travel_mode: u8,
    pub highway_class: u16,
}

pub const NODE_BASED_EDGE_SIZE: usize = 20;
const NODE_RECORD_SIZE: usize = 17;

impl NodeBasedEdge {
    fn encode(&self) -> [u8; NODE_BASED_EDGE_SIZE] {
        let mut buf = [0u8; NODE_BASED_EDGE_SIZE];
        buf[0..4].copy_from_slice(&self.source.to_le_bytes());
        buf[4..8].copy_from_slice(&self.target.to_le_bytes());
        buf[8..12].copy_from_slice(&self.name_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.weight.to_le_bytes());
        let mut flags = 0u8;
        flags |= self.forward as u8;
        flags |= (self.backward as u8) << 1;
        flags |= (self.roundabout as u8) << 2;
        flags |= (self.access_restricted as u8) << 3;
        flags |= (self.ignore_in_grid as u8) << 4;
        flags |= (self.is_split as u8) << 5;
        buf[16] = flags;
        buf[17] = self.travel_mode;
        buf[18..20].copy_from_slice(&self.highway_class.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; NODE_BASED_EDGE_SIZE]) -> Self {
        let flags = buf[16];
        Self {
            source: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            target: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            name_id: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            weight: i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            forward: flags & 1 != 0,
            backward: flags & 2 != 0,
            roundabout: flags & 4 != 0,
            access_restricted: flags & 8 != 0,
            ignore_in_grid: flags & 16 != 0,
            is_split: flags & 32 != 0,
            travel_mode: buf[17],
            highway_class: u16::from_le_bytes([buf[18], buf[19]]),
        }
    }
}

/// A `.osrm` node record before splitting into coordinate map and flag sets.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub external: ExternalNodeId,
    pub lat: i32,
    pub lon: i32,
    pub barrier: bool,
    pub traffic_light: bool,
}

/// Write the `.osrm` artifact: fingerprint, nodes, node-based edges.
pub fn write_node_based_graph<P: AsRef<Path>>(
    path: P,
    nodes: &[NodeInfo],
    edges: &[NodeBasedEdge],
) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);

    Fingerprint::valid().write_to(&mut writer)?;
    writer.write_all(&(nodes.len() as u32).to_le_bytes())?;
    for node in nodes {
        writer.write_all(&node.external.to_le_bytes())?;
        writer.write_all(&node.lat.to_le_bytes())?;
        writer.write_all(&node.lon.to_le_bytes())?;
        let flags = node.barrier as u8 | (node.traffic_light as u8) << 1;
        writer.write_all(&[flags])?;
    }
    writer.write_all(&(edges.len() as u32).to_le_bytes())?;
    for edge in edges {
        writer.write_all(&edge.encode())?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug)]
pub struct LoadedNodeBasedGraph {
    pub nodes: Vec<QueryNode>,
    pub barrier_nodes: Vec<NodeId>,
    pub traffic_lights: Vec<NodeId>,
    pub edges: Vec<NodeBasedEdge>,
}

/// Read the `.osrm` artifact back.
pub fn read_node_based_graph<P: AsRef<Path>>(path: P) -> Result<LoadedNodeBasedGraph> {
    let label = path.as_ref().display().to_string();
    let file = File::open(path.as_ref()).with_context(|| format!("Failed to open {}", label))?;
    let mut reader = BufReader::new(file);

    Fingerprint::read_and_check(&mut reader, &label)?;

    let mut count_buf = [0u8; 4];
    reader.read_exact(&mut count_buf)?;
    let node_count = u32::from_le_bytes(count_buf);

    let mut nodes = Vec::with_capacity(node_count as usize);
    let mut barrier_nodes = Vec::new();
    let mut traffic_lights = Vec::new();
    let mut record = [0u8; NODE_RECORD_SIZE];
    for internal in 0..node_count {
        reader.read_exact(&mut record)?;
        nodes.push(QueryNode {
            external: u64::from_le_bytes(record[0..8].try_into().unwrap()),
            lat: i32::from_le_bytes(record[8..12].try_into().unwrap()),
            lon: i32::from_le_bytes(record[12..16].try_into().unwrap()),
        });
        if record[16] & 1 != 0 {
            barrier_nodes.push(internal);
        }
        if record[16] & 2 != 0 {
            traffic_lights.push(internal);
        }
    }

    reader.read_exact(&mut count_buf)?;
    let edge_count = u32::from_le_bytes(count_buf);
    let mut edges = Vec::with_capacity(edge_count as usize);
    let mut edge_buf = [0u8; NODE_BASED_EDGE_SIZE];
    for _ in 0..edge_count {
        reader.read_exact(&mut edge_buf)?;
        let edge = NodeBasedEdge::decode(&edge_buf);
        if edge.source as usize >= nodes.len() || edge.target as usize >= nodes.len() {
            bail!("{}: edge references node beyond node count", label);
        }
        edges.push(edge);
    }

    Ok(LoadedNodeBasedGraph {
        nodes,
        barrier_nodes,
        traffic_lights,
        edges,
    })
}

/// Write the internal→external node map (`.nodes`).
pub fn write_node_map<P: AsRef<Path>>(path: P, nodes: &[QueryNode]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&(nodes.len() as u32).to_le_bytes())?;
    for node in nodes {
        writer.write_all(&node.external.to_le_bytes())?;
        writer.write_all(&node.lat.to_le_bytes())?;
        writer.write_all(&node.lon.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub type ArcIndex = u32;
pub const INVALID_ARC: ArcIndex = u32::MAX;

/// Per-arc payload of the dynamic graph. Weight-independent attribute
/// equality decides whether two arcs may be collapsed into one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcData {
    pub weight: i32,
    pub name_id: u32,
    /// This direction is present for pairing only, not traversable.
    pub reversed: bool,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub ignore_in_grid: bool,
    pub is_split: bool,
    pub travel_mode: u8,
    pub highway_class: u16,
}

impl ArcData {
    /// Attribute equality ignoring weight, used by the compressor.
    pub fn is_compatible_to(&self, other: &ArcData) -> bool {
        self.name_id == other.name_id
            && self.reversed == other.reversed
            && self.roundabout == other.roundabout
            && self.access_restricted == other.access_restricted
            && self.travel_mode == other.travel_mode
            && self.highway_class == other.highway_class
    }
}

#[derive(Debug, Clone)]
pub struct Arc {
    pub source: NodeId,
    pub target: NodeId,
    pub data: ArcData,
}

/// Dynamic node-based graph: arc arena plus per-node adjacency indices.
/// Arcs are never moved; deletion unlinks them and poisons the target.
#[derive(Debug)]
pub struct NodeBasedGraph {
    arcs: Vec<Arc>,
    adjacency: Vec<Vec<ArcIndex>>,
}

impl NodeBasedGraph {
    pub fn from_edges(node_count: usize, edges: &[NodeBasedEdge]) -> Self {
        let mut graph = Self {
            arcs: Vec::with_capacity(edges.len() * 2),
            adjacency: vec![Vec::new(); node_count],
        };
        for edge in edges {
            let data = ArcData {
                weight: edge.weight,
                name_id: edge.name_id,
                reversed: false,
                roundabout: edge.roundabout,
                access_restricted: edge.access_restricted,
                ignore_in_grid: edge.ignore_in_grid,
                is_split: edge.is_split,
                travel_mode: edge.travel_mode,
                highway_class: edge.highway_class,
            };
            graph.insert_arc(
                edge.source,
                edge.target,
                ArcData {
                    reversed: !edge.forward,
                    ..data
                },
            );
            graph.insert_arc(
                edge.target,
                edge.source,
                ArcData {
                    reversed: !edge.backward,
                    ..data
                },
            );
        }
        graph
    }

    pub fn insert_arc(&mut self, source: NodeId, target: NodeId, data: ArcData) -> ArcIndex {
        let index = self.arcs.len() as ArcIndex;
        self.arcs.push(Arc {
            source,
            target,
            data,
        });
        self.adjacency[source as usize].push(index);
        index
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Total arc arena size, including deleted arcs.
    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn arc(&self, index: ArcIndex) -> &Arc {
        &self.arcs[index as usize]
    }

    pub fn arc_mut(&mut self, index: ArcIndex) -> &mut Arc {
        &mut self.arcs[index as usize]
    }

    pub fn target(&self, index: ArcIndex) -> NodeId {
        self.arcs[index as usize].target
    }

    /// Out-arcs of `node` (live only).
    pub fn arcs_of(&self, node: NodeId) -> impl Iterator<Item = ArcIndex> + '_ {
        self.adjacency[node as usize].iter().copied()
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node as usize].len()
    }

    pub fn find_arc(&self, source: NodeId, target: NodeId) -> Option<ArcIndex> {
        self.adjacency[source as usize]
            .iter()
            .copied()
            .find(|&a| self.arcs[a as usize].target == target)
    }

    pub fn delete_arc(&mut self, index: ArcIndex) {
        let source = self.arcs[index as usize].source;
        self.adjacency[source as usize].retain(|&a| a != index);
        self.arcs[index as usize].target = INVALID_NODE_ID;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn edge(source: u32, target: u32, weight: i32) -> NodeBasedEdge {
        NodeBasedEdge {
            source,
            target,
            name_id: 0,
            weight,
            forward: true,
            backward: true,
            roundabout: false,
            access_restricted: false,
            ignore_in_grid: false,
            is_split: false,
            travel_mode: 1,
            highway_class: 3,
        }
    }

    #[test]
    fn edge_record_is_20_bytes() {
        let encoded = edge(7, 9, 120).encode();
        assert_eq!(encoded.len(), NODE_BASED_EDGE_SIZE);
        assert_eq!(NodeBasedEdge::decode(&encoded), edge(7, 9, 120));
    }

    #[test]
    fn osrm_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.osrm");
        let nodes = vec![
            NodeInfo {
                external: 100,
                lat: 43_000_000,
                lon: 7_000_000,
                barrier: false,
                traffic_light: true,
            },
            NodeInfo {
                external: 200,
                lat: 43_100_000,
                lon: 7_100_000,
                barrier: true,
                traffic_light: false,
            },
        ];
        let edges = vec![edge(0, 1, 42)];
        write_node_based_graph(&path, &nodes, &edges).unwrap();

        let loaded = read_node_based_graph(&path).unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.nodes[0].external, 100);
        assert_eq!(loaded.traffic_lights, vec![0]);
        assert_eq!(loaded.barrier_nodes, vec![1]);
        assert_eq!(loaded.edges, edges);
    }

    #[test]
    fn dynamic_graph_pairs_arcs() {
        let graph = NodeBasedGraph::from_edges(3, &[edge(0, 1, 10), edge(1, 2, 10)]);
        assert_eq!(graph.degree(1), 2);
        let forward = graph.find_arc(0, 1).unwrap();
        let reverse = graph.find_arc(1, 0).unwrap();
        assert!(!graph.arc(forward).data.reversed);
        assert!(!graph.arc(reverse).data.reversed);
    }

    #[test]
    fn delete_arc_unlinks() {
        let mut graph = NodeBasedGraph::from_edges(2, &[edge(0, 1, 10)]);
        let arc = graph.find_arc(0, 1).unwrap();
        graph.delete_arc(arc);
        assert!(graph.find_arc(0, 1).is_none());
        assert_eq!(graph.degree(0), 0);
    }
}
