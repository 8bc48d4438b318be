//! Static spatial index over edge-based nodes.
//!
//! Bulk-loads an R-tree keyed on the bounding box of each segment's
//! endpoints. Two artifacts: `.ramIndex` holds the serialized branching
//! structure, `.fileIndex` the packed 56-byte leaf records the query engine
//! memory-maps for snapping. Leaves carry the full edge-based node payload,
//! component and tiny flag included, so snapping can skip disconnected
//! islands without touching any other file.

use anyhow::{Context, Result};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::fingerprint::Fingerprint;
use crate::graph::edge_based::EdgeBasedNode;
use crate::graph::node_based::QueryNode;

pub type TreeEntry = GeomWithData<Rectangle<[f64; 2]>, u32>;

const LEAF_RECORD_SIZE: usize = 56;
const TINY_FLAG: u32 = 1 << 31;

/// Packed leaf record mirrored into `.fileIndex`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialLeaf {
    pub min_lat: i32,
    pub min_lon: i32,
    pub max_lat: i32,
    pub max_lon: i32,
    pub forward_edge_based_node_id: u32,
    pub reverse_edge_based_node_id: u32,
    pub u: u32,
    pub v: u32,
    pub geometry_offset: u32,
    pub name_id: u32,
    pub component_id: u32,
    pub is_tiny_component: bool,
    pub forward_length: f32,
    pub reverse_length: f32,
    pub travel_mode: u8,
}

impl SpatialLeaf {
    fn encode(&self) -> [u8; LEAF_RECORD_SIZE] {
        let mut buf = [0u8; LEAF_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.min_lat.to_le_bytes());
        buf[4..8].copy_from_slice(&self.min_lon.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_lat.to_le_bytes());
        buf[12..16].copy_from_slice(&self.max_lon.to_le_bytes());
        buf[16..20].copy_from_slice(&self.forward_edge_based_node_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.reverse_edge_based_node_id.to_le_bytes());
        buf[24..28].copy_from_slice(&self.u.to_le_bytes());
        buf[28..32].copy_from_slice(&self.v.to_le_bytes());
        buf[32..36].copy_from_slice(&self.geometry_offset.to_le_bytes());
        buf[36..40].copy_from_slice(&self.name_id.to_le_bytes());
        let component = self.component_id | if self.is_tiny_component { TINY_FLAG } else { 0 };
        buf[40..44].copy_from_slice(&component.to_le_bytes());
        buf[44..48].copy_from_slice(&self.forward_length.to_le_bytes());
        buf[48..52].copy_from_slice(&self.reverse_length.to_le_bytes());
        buf[52] = self.travel_mode;
        buf
    }

    fn decode(buf: &[u8; LEAF_RECORD_SIZE]) -> Self {
        let component = u32::from_le_bytes(buf[40..44].try_into().unwrap());
        Self {
            min_lat: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            min_lon: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            max_lat: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            max_lon: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            forward_edge_based_node_id: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            reverse_edge_based_node_id: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            u: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
            v: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
            geometry_offset: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            name_id: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            component_id: component & !TINY_FLAG,
            is_tiny_component: component & TINY_FLAG != 0,
            forward_length: f32::from_le_bytes(buf[44..48].try_into().unwrap()),
            reverse_length: f32::from_le_bytes(buf[48..52].try_into().unwrap()),
            travel_mode: buf[52],
        }
    }
}

/// Build and write the static R-tree. Returns the leaf count.
pub fn build_rtree<P: AsRef<Path>>(
    nodes: &[EdgeBasedNode],
    coordinates: &[QueryNode],
    ram_index_path: P,
    file_index_path: P,
) -> Result<usize> {
    let mut leaves = Vec::with_capacity(nodes.len());
    let mut entries = Vec::with_capacity(nodes.len());

    for node in nodes {
        let a = &coordinates[node.u as usize];
        let b = &coordinates[node.v as usize];
        let leaf = SpatialLeaf {
            min_lat: a.lat.min(b.lat),
            min_lon: a.lon.min(b.lon),
            max_lat: a.lat.max(b.lat),
            max_lon: a.lon.max(b.lon),
            forward_edge_based_node_id: node.forward_edge_based_node_id,
            reverse_edge_based_node_id: node.reverse_edge_based_node_id,
            u: node.u,
            v: node.v,
            geometry_offset: node.geometry_offset,
            name_id: node.name_id,
            component_id: node.component_id,
            is_tiny_component: node.is_tiny_component,
            forward_length: node.forward_length,
            reverse_length: node.reverse_length,
            travel_mode: node.travel_mode,
        };
        let index = leaves.len() as u32;
        entries.push(TreeEntry::new(
            Rectangle::from_corners(
                [a.lon_f64().min(b.lon_f64()), a.lat_f64().min(b.lat_f64())],
                [a.lon_f64().max(b.lon_f64()), a.lat_f64().max(b.lat_f64())],
            ),
            index,
        ));
        leaves.push(leaf);
    }

    let tree = RTree::bulk_load(entries);

    let ram_file = File::create(ram_index_path.as_ref())
        .with_context(|| format!("Failed to create {}", ram_index_path.as_ref().display()))?;
    let mut ram_writer = BufWriter::new(ram_file);
    Fingerprint::valid().write_to(&mut ram_writer)?;
    bincode::serialize_into(&mut ram_writer, &tree)
        .context("Failed to serialize R-tree branching structure")?;
    ram_writer.flush()?;

    let leaf_file = File::create(file_index_path.as_ref())
        .with_context(|| format!("Failed to create {}", file_index_path.as_ref().display()))?;
    let mut leaf_writer = BufWriter::new(leaf_file);
    leaf_writer.write_all(&(leaves.len() as u32).to_le_bytes())?;
    for leaf in &leaves {
        leaf_writer.write_all(&leaf.encode())?;
    }
    leaf_writer.flush()?;

    Ok(leaves.len())
}

/// Read both artifacts back (used by tests and the query engine shim).
pub fn read_rtree<P: AsRef<Path>>(
    ram_index_path: P,
    file_index_path: P,
) -> Result<(RTree<TreeEntry>, Vec<SpatialLeaf>)> {
    let ram_label = ram_index_path.as_ref().display().to_string();
    let mut ram_reader = BufReader::new(
        File::open(ram_index_path.as_ref())
            .with_context(|| format!("Failed to open {}", ram_label))?,
    );
    Fingerprint::read_and_check(&mut ram_reader, &ram_label)?;
    let tree: RTree<TreeEntry> =
        bincode::deserialize_from(&mut ram_reader).context("Failed to read R-tree structure")?;

    let mut leaf_reader = BufReader::new(
        File::open(file_index_path.as_ref())
            .with_context(|| format!("Failed to open {}", file_index_path.as_ref().display()))?,
    );
    let mut buf4 = [0u8; 4];
    leaf_reader.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4);
    let mut leaves = Vec::with_capacity(count as usize);
    let mut record = [0u8; LEAF_RECORD_SIZE];
    for _ in 0..count {
        leaf_reader.read_exact(&mut record)?;
        leaves.push(SpatialLeaf::decode(&record));
    }

    Ok((tree, leaves))
}
