//! Contracted-graph serialization.
//!
//! `.hsgr` is the query engine's memory-mapped CSR: fingerprint, CRC-32 of
//! the packed edge array, node array of first-edge offsets (with sentinel
//! tail), then 12-byte edge records. `.core` is the uncontracted-node
//! bitmap, `.level` the per-node contraction round.

use anyhow::{bail, Context, Result};
use bit_vec::BitVec;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::checksum;
use crate::contract::QueryEdge;
use crate::fingerprint::Fingerprint;

const HSGR_EDGE_SIZE: usize = 12;
const WEIGHT_BITS: u32 = 29;
const WEIGHT_MASK: u32 = (1 << WEIGHT_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsgrEdge {
    pub target: u32,
    /// Middle node iff `shortcut`, original edge id otherwise.
    pub id: u32,
    pub weight: u32,
    pub forward: bool,
    pub backward: bool,
    pub shortcut: bool,
}

impl HsgrEdge {
    fn encode(&self) -> [u8; HSGR_EDGE_SIZE] {
        let mut buf = [0u8; HSGR_EDGE_SIZE];
        buf[0..4].copy_from_slice(&self.target.to_le_bytes());
        buf[4..8].copy_from_slice(&self.id.to_le_bytes());
        let packed = (self.weight & WEIGHT_MASK)
            | (self.forward as u32) << 29
            | (self.backward as u32) << 30
            | (self.shortcut as u32) << 31;
        buf[8..12].copy_from_slice(&packed.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HSGR_EDGE_SIZE]) -> Self {
        let packed = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        Self {
            target: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            weight: packed & WEIGHT_MASK,
            forward: packed & (1 << 29) != 0,
            backward: packed & (1 << 30) != 0,
            shortcut: packed & (1 << 31) != 0,
        }
    }
}

#[derive(Debug)]
pub struct HsgrData {
    pub checksum: u32,
    /// `first_edge` per node, length `max_node_id + 2` with sentinel tail.
    pub node_array: Vec<u32>,
    pub edges: Vec<HsgrEdge>,
}

/// Sort, index and write the contracted graph. Returns (crc32, edge count).
pub fn write_contracted_graph<P: AsRef<Path>>(
    path: P,
    max_node_id: u32,
    edges: &mut Vec<QueryEdge>,
) -> Result<(u32, usize)> {
    edges.par_sort_unstable();

    let max_used_node_id = edges
        .iter()
        .map(|e| e.source.max(e.target))
        .max()
        .unwrap_or(0);

    let node_array_size = max_node_id as usize + 2;
    let mut node_array = vec![0u32; node_array_size];
    {
        let mut edge = 0usize;
        for node in 0..=max_used_node_id as usize {
            node_array[node] = edge as u32;
            while edge < edges.len() && edges[edge].source == node as u32 {
                edge += 1;
            }
        }
        for entry in node_array
            .iter_mut()
            .take(node_array_size)
            .skip(max_used_node_id as usize + 1)
        {
            *entry = edges.len() as u32;
        }
    }

    // Pack the edge array once; the CRC covers exactly these bytes.
    let mut edge_bytes = Vec::with_capacity(edges.len() * HSGR_EDGE_SIZE);
    for edge in edges.iter() {
        debug_assert!(edge.source != edge.target, "self loop in contracted graph");
        if cfg!(debug_assertions) && edge.data.weight == 0 {
            println!(
                "⚠ zero-weight contracted edge {} → {}",
                edge.source, edge.target
            );
        }
        let record = HsgrEdge {
            target: edge.target,
            id: edge.data.id,
            weight: edge.data.weight,
            forward: edge.data.forward,
            backward: edge.data.backward,
            shortcut: edge.data.shortcut,
        };
        edge_bytes.extend_from_slice(&record.encode());
    }
    let crc = checksum::checksum(&edge_bytes);

    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    Fingerprint::valid().write_to(&mut writer)?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&(node_array_size as u32).to_le_bytes())?;
    writer.write_all(&(edges.len() as u32).to_le_bytes())?;
    for entry in &node_array {
        writer.write_all(&entry.to_le_bytes())?;
    }
    writer.write_all(&edge_bytes)?;
    writer.flush()?;

    Ok((crc, edges.len()))
}

pub fn read_contracted_graph<P: AsRef<Path>>(path: P) -> Result<HsgrData> {
    let label = path.as_ref().display().to_string();
    let file = File::open(path.as_ref()).with_context(|| format!("Failed to open {}", label))?;
    let mut reader = BufReader::new(file);
    Fingerprint::read_and_check(&mut reader, &label)?;

    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    let stored_crc = u32::from_le_bytes(buf4);
    reader.read_exact(&mut buf4)?;
    let node_array_size = u32::from_le_bytes(buf4) as usize;
    reader.read_exact(&mut buf4)?;
    let edge_count = u32::from_le_bytes(buf4) as usize;

    let mut node_array = Vec::with_capacity(node_array_size);
    for _ in 0..node_array_size {
        reader.read_exact(&mut buf4)?;
        node_array.push(u32::from_le_bytes(buf4));
    }

    let mut edge_bytes = vec![0u8; edge_count * HSGR_EDGE_SIZE];
    reader.read_exact(&mut edge_bytes)?;
    if checksum::checksum(&edge_bytes) != stored_crc {
        bail!("{}: edge array CRC32 mismatch, file is corrupt", label);
    }

    let edges = edge_bytes
        .chunks_exact(HSGR_EDGE_SIZE)
        .map(|chunk| HsgrEdge::decode(chunk.try_into().unwrap()))
        .collect();

    Ok(HsgrData {
        checksum: stored_crc,
        node_array,
        edges,
    })
}

/// Write the `.core` bitmap: bit set = node left uncontracted.
pub fn write_core_markers<P: AsRef<Path>>(path: P, is_core: &[bool]) -> Result<()> {
    let mut bits = BitVec::from_elem(is_core.len(), false);
    for (i, &core) in is_core.iter().enumerate() {
        if core {
            bits.set(i, true);
        }
    }
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&(is_core.len() as u32).to_le_bytes())?;
    writer.write_all(&bits.to_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_core_markers<P: AsRef<Path>>(path: P) -> Result<Vec<bool>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4) as usize;
    let mut bytes = vec![0u8; count.div_ceil(8)];
    reader.read_exact(&mut bytes)?;
    let bits = BitVec::from_bytes(&bytes);
    Ok((0..count).map(|i| bits.get(i).unwrap_or(false)).collect())
}

/// Write the `.level` file: one float per node.
pub fn write_node_levels<P: AsRef<Path>>(path: P, levels: &[f32]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&(levels.len() as u32).to_le_bytes())?;
    for level in levels {
        writer.write_all(&level.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_node_levels<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4) as usize;
    let mut levels = Vec::with_capacity(count);
    for _ in 0..count {
        reader.read_exact(&mut buf4)?;
        levels.push(f32::from_le_bytes(buf4));
    }
    Ok(levels)
}
