//! Extraction containers: external→internal id mapping and the first round
//! of artifacts (`.osrm`, `.names`, `.restrictions`).
//!
//! Only nodes actually referenced by a kept way receive an internal id;
//! internal ids are dense and ordered by external id. Edge weights are
//! computed here from haversine length and profile speed with the same
//! formula the speed-override path uses later.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::callbacks::{ExtractionContainers, WayEndpoints};
use crate::geometry::haversine_meters;
use crate::graph::node_based::{write_node_based_graph, NodeBasedEdge, NodeInfo, COORDINATE_PRECISION};
use crate::graph::restriction::{write_restrictions, TurnRestriction};
use crate::prepare::speeds::segment_weight;
use crate::ExternalNodeId;

#[derive(Debug)]
pub struct PreparedCounts {
    pub node_count: usize,
    pub edge_count: usize,
    pub restriction_count: usize,
    pub name_count: usize,
    pub dropped_edges: usize,
    pub dropped_restrictions: usize,
}

pub fn prepare_data<P: AsRef<Path>>(
    mut containers: ExtractionContainers,
    osrm_path: P,
    restrictions_path: P,
    names_path: P,
) -> Result<PreparedCounts> {
    write_names(names_path.as_ref(), &containers.names)?;

    // Coordinate lookup by external id; first record wins on duplicates.
    containers.nodes.sort_by_key(|n| n.external);
    containers.nodes.dedup_by_key(|n| n.external);
    let coordinate_index: FxHashMap<ExternalNodeId, usize> = containers
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.external, i))
        .collect();

    // Internal ids: dense, ordered by external id, used nodes only.
    let mut used: Vec<ExternalNodeId> = containers
        .edges
        .iter()
        .flat_map(|e| [e.from, e.to])
        .filter(|external| coordinate_index.contains_key(external))
        .collect();
    used.sort_unstable();
    used.dedup();
    let internal_ids: FxHashMap<ExternalNodeId, u32> = used
        .iter()
        .enumerate()
        .map(|(i, &external)| (external, i as u32))
        .collect();

    let node_infos: Vec<NodeInfo> = used
        .iter()
        .map(|external| {
            let record = &containers.nodes[coordinate_index[external]];
            NodeInfo {
                external: record.external,
                lat: (record.lat * COORDINATE_PRECISION) as i32,
                lon: (record.lon * COORDINATE_PRECISION) as i32,
                barrier: record.barrier,
                traffic_light: record.traffic_light,
            }
        })
        .collect();

    let mut edges = Vec::with_capacity(containers.edges.len());
    let mut dropped_edges = 0usize;
    for edge in &containers.edges {
        let (Some(&source), Some(&target)) =
            (internal_ids.get(&edge.from), internal_ids.get(&edge.to))
        else {
            dropped_edges += 1;
            continue;
        };
        let from = &containers.nodes[coordinate_index[&edge.from]];
        let to = &containers.nodes[coordinate_index[&edge.to]];
        let length = haversine_meters(from.lat, from.lon, to.lat, to.lon);
        let weight = segment_weight(length, edge.speed.max(1.0).round() as u32) as i32;

        edges.push(NodeBasedEdge {
            source,
            target,
            name_id: edge.name_id,
            weight,
            forward: edge.forward,
            backward: edge.backward,
            roundabout: edge.roundabout,
            access_restricted: edge.access_restricted,
            ignore_in_grid: edge.ignore_in_grid,
            is_split: edge.is_split,
            travel_mode: edge.travel_mode,
            highway_class: edge.highway_class,
        });
    }
    if dropped_edges > 0 {
        println!(
            "⚠ Dropped {} way segments referencing missing nodes",
            dropped_edges
        );
    }

    let endpoints_by_way: FxHashMap<u64, WayEndpoints> = containers
        .way_endpoints
        .iter()
        .map(|ep| (ep.way_id, *ep))
        .collect();

    let mut restrictions = Vec::with_capacity(containers.restrictions.len());
    let mut dropped_restrictions = 0usize;
    for raw in &containers.restrictions {
        let resolved = resolve_restriction(raw, &endpoints_by_way, &internal_ids);
        match resolved {
            Some(restriction) => restrictions.push(restriction),
            None => dropped_restrictions += 1,
        }
    }
    if dropped_restrictions > 0 {
        println!(
            "⚠ Dropped {} unresolvable turn restrictions",
            dropped_restrictions
        );
    }

    write_node_based_graph(osrm_path.as_ref(), &node_infos, &edges)?;
    write_restrictions(restrictions_path.as_ref(), &restrictions)?;

    Ok(PreparedCounts {
        node_count: node_infos.len(),
        edge_count: edges.len(),
        restriction_count: restrictions.len(),
        name_count: containers.names.len(),
        dropped_edges,
        dropped_restrictions,
    })
}

/// Map a (via node, from way, to way) restriction to an internal node
/// triple. The from/to node is the way's neighbor of the via node, which
/// requires the via node to be an endpoint of both ways.
fn resolve_restriction(
    raw: &crate::osm::InputRestriction,
    endpoints: &FxHashMap<u64, WayEndpoints>,
    internal_ids: &FxHashMap<ExternalNodeId, u32>,
) -> Option<TurnRestriction> {
    let from_way = endpoints.get(&raw.from_way)?;
    let to_way = endpoints.get(&raw.to_way)?;
    let from_external = neighbor_of_via(from_way, raw.via_node)?;
    let to_external = neighbor_of_via(to_way, raw.via_node)?;
    Some(TurnRestriction {
        from: *internal_ids.get(&from_external)?,
        via: *internal_ids.get(&raw.via_node)?,
        to: *internal_ids.get(&to_external)?,
        is_only: raw.is_only,
    })
}

fn neighbor_of_via(way: &WayEndpoints, via: ExternalNodeId) -> Option<ExternalNodeId> {
    if way.first == via {
        Some(way.second)
    } else if way.last == via {
        Some(way.penultimate)
    } else {
        None
    }
}

/// Write `.names`: prefix-sum offsets, then the concatenated UTF-8 bytes.
pub fn write_names<P: AsRef<Path>>(path: P, names: &[String]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&(names.len() as u32).to_le_bytes())?;
    let mut offset = 0u32;
    for name in names {
        writer.write_all(&offset.to_le_bytes())?;
        offset += name.len() as u32;
    }
    writer.write_all(&offset.to_le_bytes())?;
    for name in names {
        writer.write_all(name.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
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
    let mut bytes = vec![0u8; *offsets.last().unwrap_or(&0) as usize];
    reader.read_exact(&mut bytes)?;
    let mut names = Vec::with_capacity(count);
    for window in offsets.windows(2) {
        let slice = &bytes[window[0] as usize..window[1] as usize];
        names.push(String::from_utf8_lossy(slice).into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.names");
        let names = vec![
            String::new(),
            "Hauptstraße".to_string(),
            "Rue de Rivoli".to_string(),
        ];
        write_names(&path, &names).unwrap();
        assert_eq!(read_names(&path).unwrap(), names);
    }

    #[test]
    fn via_neighbor_resolution() {
        let way = WayEndpoints {
            way_id: 1,
            first: 10,
            second: 11,
            penultimate: 18,
            last: 19,
        };
        assert_eq!(neighbor_of_via(&way, 10), Some(11));
        assert_eq!(neighbor_of_via(&way, 19), Some(18));
        assert_eq!(neighbor_of_via(&way, 15), None);
    }
}
