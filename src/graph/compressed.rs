//! Compressed-edge geometry container.
//!
//! When the compressor collapses a degree-2 chain, the shape of the original
//! road must survive for the query engine to render. Each directed arc that
//! carries compressed geometry owns a bucket of segment entries; an entry is
//! the segment's end node with the segment's length and weight. Arcs that
//! were never compressed get a single-segment bucket on demand.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::node_based::ArcIndex;
use crate::NodeId;

/// One original road segment: ends at `node`, with per-segment length and
/// weight (not cumulative; the serializer accumulates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentEntry {
    pub node: NodeId,
    pub length: f32,
    pub weight: u32,
}

#[derive(Debug, Default)]
pub struct CompressedEdgeContainer {
    positions: FxHashMap<ArcIndex, u32>,
    buckets: Vec<Vec<SegmentEntry>>,
}

impl CompressedEdgeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket position of `arc`, creating a single-segment bucket if the arc
    /// was never compressed. The position is the geometry-container offset
    /// recorded on edge-based nodes.
    pub fn position_or_insert(
        &mut self,
        arc: ArcIndex,
        target: NodeId,
        length: f32,
        weight: u32,
    ) -> u32 {
        if let Some(&pos) = self.positions.get(&arc) {
            return pos;
        }
        let pos = self.buckets.len() as u32;
        self.buckets.push(vec![SegmentEntry {
            node: target,
            length,
            weight,
        }]);
        self.positions.insert(arc, pos);
        pos
    }

    pub fn segments(&self, arc: ArcIndex) -> Option<&[SegmentEntry]> {
        self.positions
            .get(&arc)
            .map(|&pos| self.buckets[pos as usize].as_slice())
    }

    /// Record the collapse of `via` on the chain `... -arc1-> via -arc2-> target`.
    ///
    /// `arc1` keeps living as the surviving edge and absorbs `arc2`'s
    /// geometry. The single-segment parameters are used only when the
    /// respective arc has no bucket yet (i.e. was still an original segment).
    /// `penalty` is the traffic-signal surcharge folded into the first
    /// downstream segment so that segment weights keep summing to the edge
    /// weight.
    #[allow(clippy::too_many_arguments)]
    pub fn compress(
        &mut self,
        arc1: ArcIndex,
        arc2: ArcIndex,
        via: NodeId,
        target: NodeId,
        weight1: u32,
        weight2: u32,
        length1: f32,
        length2: f32,
        penalty: u32,
    ) {
        let mut downstream = match self.positions.remove(&arc2) {
            Some(pos) => std::mem::take(&mut self.buckets[pos as usize]),
            None => vec![SegmentEntry {
                node: target,
                length: length2,
                weight: weight2,
            }],
        };
        downstream[0].weight += penalty;

        let pos = self.position_or_insert(arc1, via, length1, weight1);
        self.buckets[pos as usize].extend_from_slice(&downstream);
    }

    /// Write the `.geometry` artifact: offset table plus cumulative
    /// (node, length, weight) triples.
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&(self.buckets.len() as u32).to_le_bytes())?;
        let mut offset = 0u32;
        for bucket in &self.buckets {
            writer.write_all(&offset.to_le_bytes())?;
            offset += bucket.len() as u32;
        }
        writer.write_all(&offset.to_le_bytes())?;

        writer.write_all(&offset.to_le_bytes())?; // entry count
        for bucket in &self.buckets {
            let mut cum_length = 0.0f32;
            let mut cum_weight = 0u32;
            for entry in bucket {
                cum_length += entry.length;
                cum_weight += entry.weight;
                writer.write_all(&entry.node.to_le_bytes())?;
                writer.write_all(&cum_length.to_le_bytes())?;
                writer.write_all(&cum_weight.to_le_bytes())?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Read `.geometry` back as cumulative triples per poly-line.
pub fn read_geometry<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<(NodeId, f32, u32)>>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4) as usize;

    let mut offsets = Vec::with_capacity(count + 1);
    for _ in 0..=count {
        reader.read_exact(&mut buf4)?;
        offsets.push(u32::from_le_bytes(buf4));
    }

    reader.read_exact(&mut buf4)?;
    let entry_count = u32::from_le_bytes(buf4) as usize;
    let mut entries = Vec::with_capacity(entry_count);
    let mut record = [0u8; 12];
    for _ in 0..entry_count {
        reader.read_exact(&mut record)?;
        entries.push((
            u32::from_le_bytes(record[0..4].try_into().unwrap()),
            f32::from_le_bytes(record[4..8].try_into().unwrap()),
            u32::from_le_bytes(record[8..12].try_into().unwrap()),
        ));
    }

    let mut polylines = Vec::with_capacity(count);
    for window in offsets.windows(2) {
        polylines.push(entries[window[0] as usize..window[1] as usize].to_vec());
    }
    Ok(polylines)
}
