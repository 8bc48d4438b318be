//! monarch-route: offline routing preprocessor
//!
//! Pipeline:
//! - Extract: raw map events → profile classification → node-based graph
//! - Compress: degree-2 chains collapse into compressed edges with geometry
//! - Expand: node-based graph → edge-based graph (turns become edges)
//! - Label: SCC components + tiny flags on the edge-based nodes
//! - Index: static R-tree over edge-based node bounding boxes
//! - Contract: parallel contraction hierarchy with witness searches
//! - Serialize: CSR query graph with fingerprint and CRC32
//!
//! Key principle: the edge-based graph is the routing graph. Turn
//! restrictions, penalties and signal costs are materialized during
//! expansion; the contractor and the query engine never see them again.

pub mod checksum;
pub mod contract;
pub mod extract;
pub mod fingerprint;
pub mod geometry;
pub mod graph;
pub mod osm;
pub mod prepare;
pub mod profile;
pub mod serialize;
pub mod spatial;
pub mod validate;

/// Dense internal node id, assigned during loading.
pub type NodeId = u32;
/// Stable external node id inherited from the input map.
pub type ExternalNodeId = u64;

/// Sentinel for "no such node" in the internal id space.
pub const INVALID_NODE_ID: NodeId = u32::MAX;
/// Sentinel for "no such node" in the external id space.
pub const INVALID_EXTERNAL_NODE_ID: ExternalNodeId = u64::MAX;

pub use contract::{QueryEdge, QueryEdgeData};
pub use extract::{run_extract, ExtractConfig, ExtractResult};
pub use fingerprint::Fingerprint;
pub use graph::{EdgeBasedEdge, EdgeBasedNode, NodeBasedEdge};
pub use prepare::{run_prepare, PrepareConfig, PrepareResult};
pub use profile::{CarProfile, Profile, ProfileProperties, ProfileSource};
