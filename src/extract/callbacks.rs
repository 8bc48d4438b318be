//! Extraction callbacks.
//!
//! Receives profile-classified elements in input order (the caller owns the
//! synchronization) and accumulates them in the extraction containers.
//! Street names are deduplicated to dense name ids here.

use rustc_hash::FxHashMap;

use crate::osm::{InputRestriction, RawNode, RawWay};
use crate::profile::{NodeResult, WayResult};
use crate::ExternalNodeId;

/// A raw node with its profile classification.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionNodeRecord {
    pub external: ExternalNodeId,
    pub lat: f64,
    pub lon: f64,
    pub barrier: bool,
    pub traffic_light: bool,
}

/// One directed way segment before id mapping and weight computation.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionEdge {
    pub from: ExternalNodeId,
    pub to: ExternalNodeId,
    pub speed: f64,
    pub name_id: u32,
    pub forward: bool,
    pub backward: bool,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub ignore_in_grid: bool,
    pub is_split: bool,
    pub travel_mode: u8,
    pub highway_class: u16,
}

/// Endpoint nodes of a used way, kept for restriction resolution: the
/// neighbor of the via node on the from/to way is looked up here.
#[derive(Debug, Clone, Copy)]
pub struct WayEndpoints {
    pub way_id: u64,
    pub first: ExternalNodeId,
    pub second: ExternalNodeId,
    pub penultimate: ExternalNodeId,
    pub last: ExternalNodeId,
}

#[derive(Debug, Default)]
pub struct ExtractionContainers {
    pub nodes: Vec<ExtractionNodeRecord>,
    pub edges: Vec<ExtractionEdge>,
    pub names: Vec<String>,
    pub restrictions: Vec<InputRestriction>,
    pub way_endpoints: Vec<WayEndpoints>,
}

pub struct ExtractorCallbacks {
    string_map: FxHashMap<String, u32>,
    pub containers: ExtractionContainers,
}

impl Default for ExtractorCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorCallbacks {
    pub fn new() -> Self {
        let mut containers = ExtractionContainers::default();
        containers.names.push(String::new());
        let mut string_map = FxHashMap::default();
        string_map.insert(String::new(), 0);
        Self {
            string_map,
            containers,
        }
    }

    pub fn process_node(&mut self, node: &RawNode, result: &NodeResult) {
        self.containers.nodes.push(ExtractionNodeRecord {
            external: node.id,
            lat: node.lat,
            lon: node.lon,
            barrier: result.barrier,
            traffic_light: result.traffic_light,
        });
    }

    pub fn process_way(&mut self, way: &RawWay, result: &WayResult) {
        if !result.forward() && !result.backward() {
            return;
        }
        if way.node_refs.len() < 2 {
            return;
        }

        let name_id = self.name_id(&result.name);
        let split = result.forward()
            && result.backward()
            && result.forward_speed != result.backward_speed;

        for pair in way.node_refs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == b {
                continue;
            }
            let template = ExtractionEdge {
                from: a,
                to: b,
                speed: result.forward_speed,
                name_id,
                forward: true,
                backward: true,
                roundabout: result.roundabout,
                access_restricted: result.access_restricted,
                ignore_in_grid: result.ignore_in_grid,
                is_split: split,
                travel_mode: result.travel_mode,
                highway_class: result.highway_class,
            };
            if result.forward() && result.backward() && !split {
                self.containers.edges.push(template);
                continue;
            }
            if result.forward() {
                self.containers.edges.push(ExtractionEdge {
                    backward: false,
                    ..template
                });
            }
            if result.backward() {
                self.containers.edges.push(ExtractionEdge {
                    from: b,
                    to: a,
                    speed: result.backward_speed,
                    backward: false,
                    ..template
                });
            }
        }

        let refs = &way.node_refs;
        self.containers.way_endpoints.push(WayEndpoints {
            way_id: way.id,
            first: refs[0],
            second: refs[1],
            penultimate: refs[refs.len() - 2],
            last: refs[refs.len() - 1],
        });
    }

    pub fn process_restriction(&mut self, restriction: InputRestriction) {
        self.containers.restrictions.push(restriction);
    }

    fn name_id(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.string_map.get(name) {
            return id;
        }
        let id = self.containers.names.len() as u32;
        self.containers.names.push(name.to_string());
        self.string_map.insert(name.to_string(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::RawTags;

    fn way(id: u64, refs: Vec<u64>) -> RawWay {
        RawWay {
            id,
            node_refs: refs,
            tags: RawTags::default(),
        }
    }

    fn result(fwd: f64, bwd: f64, name: &str) -> WayResult {
        WayResult {
            forward_speed: fwd,
            backward_speed: bwd,
            name: name.to_string(),
            travel_mode: 1,
            ..Default::default()
        }
    }

    #[test]
    fn names_are_deduplicated() {
        let mut callbacks = ExtractorCallbacks::new();
        callbacks.process_way(&way(1, vec![1, 2]), &result(50.0, 50.0, "Main Street"));
        callbacks.process_way(&way(2, vec![2, 3]), &result(50.0, 50.0, "Main Street"));
        callbacks.process_way(&way(3, vec![3, 4]), &result(50.0, 50.0, "Side Street"));
        assert_eq!(callbacks.containers.names.len(), 3); // "", Main, Side
        assert_eq!(
            callbacks.containers.edges[0].name_id,
            callbacks.containers.edges[1].name_id
        );
    }

    #[test]
    fn split_speeds_make_two_oneways() {
        let mut callbacks = ExtractorCallbacks::new();
        callbacks.process_way(&way(1, vec![1, 2]), &result(60.0, 30.0, ""));
        let edges = &callbacks.containers.edges;
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.forward && !e.backward && e.is_split));
        assert_eq!(edges[0].from, 1);
        assert_eq!(edges[1].from, 2);
        assert_eq!(edges[1].speed, 30.0);
    }

    #[test]
    fn inaccessible_way_is_dropped() {
        let mut callbacks = ExtractorCallbacks::new();
        callbacks.process_way(&way(1, vec![1, 2]), &result(0.0, 0.0, ""));
        assert!(callbacks.containers.edges.is_empty());
        assert!(callbacks.containers.way_endpoints.is_empty());
    }

    #[test]
    fn endpoints_recorded_for_restriction_fixup() {
        let mut callbacks = ExtractorCallbacks::new();
        callbacks.process_way(&way(9, vec![1, 2, 3, 4]), &result(50.0, 50.0, ""));
        let ep = callbacks.containers.way_endpoints[0];
        assert_eq!((ep.first, ep.second, ep.penultimate, ep.last), (1, 2, 3, 4));
    }
}
