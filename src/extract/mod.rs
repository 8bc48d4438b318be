//! Extract stage driver.
//!
//! Raw map events → profile classification → containers → node-based graph
//! on disk → compression → edge expansion → SCC labeling → spatial index.
//! The node-based graph is reloaded from disk between the two halves so the
//! prepare stage can run in a separate process against the same artifacts.

pub mod callbacks;
pub mod containers;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;

use self::callbacks::ExtractorCallbacks;
use crate::graph::compressed::CompressedEdgeContainer;
use crate::graph::compressor::GraphCompressor;
use crate::graph::edge_based::{
    write_edge_based_graph, EdgeBasedGraphFactory, SidecarWriters,
};
use crate::graph::node_based::{
    read_node_based_graph, write_node_map, NodeBasedGraph,
};
use crate::graph::restriction::{read_restrictions, RestrictionMap};
use crate::graph::scc;
use crate::osm::reader::PbfSource;
use crate::osm::{InputRestriction, MapSource, RawElement, RawNode, RawWay};
use crate::prepare::artifact;
use crate::profile::{NodeResult, ProfileSource, WayResult};
use crate::spatial;

pub struct ExtractConfig {
    pub input: PathBuf,
    pub profile_name: String,
    pub generate_edge_lookup: bool,
}

#[derive(Debug)]
pub struct ExtractResult {
    pub base: PathBuf,
    pub node_count: usize,
    pub edge_count: usize,
    pub restriction_count: usize,
    pub edge_based_node_count: u32,
    pub edge_based_edge_count: usize,
}

/// Base path for all artifacts: the input path with its map extension
/// stripped.
pub fn base_for_input(input: &Path) -> PathBuf {
    let name = input.to_string_lossy();
    for suffix in [".osm.pbf", ".pbf", ".osm"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return PathBuf::from(stripped);
        }
    }
    input.to_path_buf()
}

pub fn run_extract(config: ExtractConfig) -> Result<ExtractResult> {
    let profile = crate::profile::by_name(&config.profile_name)
        .with_context(|| format!("Unknown profile '{}'", config.profile_name))?;

    println!("🦋 Extracting {}", config.input.display());
    println!("📄 Profile: {}", profile.name());

    let mut source = PbfSource::open(&config.input)?;
    let base = base_for_input(&config.input);
    run_extract_from_source(&mut source, profile.as_ref(), &base, config.generate_edge_lookup)
}

/// Format-agnostic entry point; tests feed in-memory sources here.
pub fn run_extract_from_source(
    source: &mut dyn MapSource,
    profile: &dyn ProfileSource,
    base: &Path,
    generate_edge_lookup: bool,
) -> Result<ExtractResult> {
    let start = Instant::now();

    // Phase 1: parse and classify.
    let parse_start = Instant::now();
    let mut extractor_callbacks = ExtractorCallbacks::new();
    let counts = parse_source(source, profile, &mut extractor_callbacks)?;
    println!(
        "Raw input contains {} nodes, {} ways, {} restrictions ({:.2}s)",
        counts.0,
        counts.1,
        counts.2,
        parse_start.elapsed().as_secs_f64()
    );

    if extractor_callbacks.containers.edges.is_empty() {
        bail!("The input data is empty, no routable ways found");
    }

    let timestamp = source.timestamp().unwrap_or_else(|| "n/a".to_string());
    std::fs::write(artifact(base, "timestamp"), &timestamp)?;

    let osrm_path = artifact(base, "osrm");
    let restrictions_path = artifact(base, "restrictions");
    let names_path = artifact(base, "names");
    let prepared = containers::prepare_data(
        extractor_callbacks.containers,
        &osrm_path,
        &restrictions_path,
        &names_path,
    )?;
    println!(
        "  ✓ {} nodes, {} edges, {} restrictions, {} names",
        prepared.node_count,
        prepared.edge_count,
        prepared.restriction_count,
        prepared.name_count
    );

    // Phase 2: edge expansion, from the artifacts just written.
    println!("Generating edge-expanded graph representation");
    let expansion_start = Instant::now();

    let loaded = read_node_based_graph(&osrm_path)?;
    if loaded.edges.is_empty() {
        bail!("The node-based graph is empty after id mapping");
    }
    let restrictions = read_restrictions(&restrictions_path)?;
    println!(
        " - {} restrictions, {} barrier nodes, {} traffic lights",
        restrictions.len(),
        loaded.barrier_nodes.len(),
        loaded.traffic_lights.len()
    );

    let barrier_nodes: FxHashSet<u32> = loaded.barrier_nodes.iter().copied().collect();
    let traffic_lights: FxHashSet<u32> = loaded.traffic_lights.iter().copied().collect();
    let mut restriction_map = RestrictionMap::new(restrictions);

    let mut graph = NodeBasedGraph::from_edges(loaded.nodes.len(), &loaded.edges);
    let mut container = CompressedEdgeContainer::new();

    let properties = profile.properties();
    let compressor = GraphCompressor::new(properties.traffic_signal_penalty);
    let collapsed = compressor.compress(
        &barrier_nodes,
        &traffic_lights,
        &mut restriction_map,
        &mut graph,
        &mut container,
        &loaded.nodes,
    );
    println!("  ✓ Collapsed {} degree-2 nodes", collapsed);

    let mut factory = EdgeBasedGraphFactory::new(
        &graph,
        &mut container,
        &restriction_map,
        &barrier_nodes,
        &traffic_lights,
        &loaded.nodes,
        properties,
    );

    let mut sidecars = if generate_edge_lookup {
        Some(SidecarWriters::create(
            artifact(base, "edge_segment_lookup"),
            artifact(base, "edge_penalties"),
        )?)
    } else {
        None
    };
    let mut profile_state = profile.make_state();
    let mut expansion = factory.run(profile_state.as_mut(), sidecars.as_mut())?;
    if let Some(writers) = sidecars {
        writers.finish()?;
    }

    container.serialize(artifact(base, "geometry"))?;

    let max_edge_id = expansion.edge_based_node_count.saturating_sub(1) as u64;
    write_edge_based_graph(artifact(base, "edges"), max_edge_id, &expansion.edges)?;
    println!(
        "Expansion: {} edge-based nodes, {} edge-based edges ({:.2}s)",
        expansion.edge_based_node_count,
        expansion.edges.len(),
        expansion_start.elapsed().as_secs_f64()
    );

    println!("Finding connected components");
    scc::label_components(
        expansion.edge_based_node_count,
        &expansion.edges,
        &mut expansion.nodes,
    );

    println!("Building r-tree ...");
    spatial::build_rtree(
        &expansion.nodes,
        &loaded.nodes,
        artifact(base, "ramIndex"),
        artifact(base, "fileIndex"),
    )?;

    println!("Writing node map ...");
    write_node_map(artifact(base, "nodes"), &loaded.nodes)?;

    write_lock_file(base, &prepared, &expansion, start.elapsed().as_millis() as u64)?;

    println!(
        "✅ Extraction finished after {:.2}s; run prepare on {} next",
        start.elapsed().as_secs_f64(),
        base.display()
    );

    Ok(ExtractResult {
        base: base.to_path_buf(),
        node_count: prepared.node_count,
        edge_count: prepared.edge_count,
        restriction_count: prepared.restriction_count,
        edge_based_node_count: expansion.edge_based_node_count,
        edge_based_edge_count: expansion.edges.len(),
    })
}

enum Classified {
    Node(RawNode, NodeResult),
    Way(RawWay, WayResult),
    Restriction(InputRestriction),
}

/// Consume the source buffer by buffer. Within a buffer, classification runs
/// as a parallel-for on per-thread profile states; results keep their input
/// order and are committed serially.
fn parse_source(
    source: &mut dyn MapSource,
    profile: &dyn ProfileSource,
    extractor_callbacks: &mut ExtractorCallbacks,
) -> Result<(u64, u64, u64)> {
    let mut node_count = 0u64;
    let mut way_count = 0u64;
    let mut restriction_count = 0u64;

    while let Some(buffer) = source.next_buffer()? {
        let classified: Vec<Classified> = buffer
            .into_par_iter()
            .map_init(
                || profile.make_state(),
                |state, element| match element {
                    RawElement::Node(node) => {
                        let mut result = NodeResult::default();
                        state.node_function(&node, &mut result);
                        Classified::Node(node, result)
                    }
                    RawElement::Way(way) => {
                        let mut result = WayResult::default();
                        state.way_function(&way, &mut result);
                        Classified::Way(way, result)
                    }
                    RawElement::Restriction(restriction) => {
                        Classified::Restriction(restriction)
                    }
                },
            )
            .collect();

        for item in classified {
            match item {
                Classified::Node(node, result) => {
                    node_count += 1;
                    extractor_callbacks.process_node(&node, &result);
                }
                Classified::Way(way, result) => {
                    way_count += 1;
                    extractor_callbacks.process_way(&way, &result);
                }
                Classified::Restriction(restriction) => {
                    restriction_count += 1;
                    extractor_callbacks.process_restriction(restriction);
                }
            }
        }
    }

    Ok((node_count, way_count, restriction_count))
}

fn write_lock_file(
    base: &Path,
    prepared: &containers::PreparedCounts,
    expansion: &crate::graph::edge_based::EdgeExpansion,
    elapsed_ms: u64,
) -> Result<()> {
    let sha_of = |suffix: &str| -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(std::fs::read(artifact(base, suffix))?);
        Ok(hex::encode(hasher.finalize()))
    };

    let lock = serde_json::json!({
        "node_count": prepared.node_count,
        "edge_count": prepared.edge_count,
        "restriction_count": prepared.restriction_count,
        "name_count": prepared.name_count,
        "edge_based_node_count": expansion.edge_based_node_count,
        "edge_based_edge_count": expansion.edges.len(),
        "dropped_edges": prepared.dropped_edges,
        "dropped_restrictions": prepared.dropped_restrictions,
        "extract_time_ms": elapsed_ms,
        "osrm_sha256": sha_of("osrm")?,
        "edges_sha256": sha_of("edges")?,
        "created_at_utc": chrono::Utc::now().to_rfc3339(),
    });
    let lock_path = artifact(base, "extract.lock.json");
    std::fs::write(&lock_path, serde_json::to_string_pretty(&lock)?)?;
    println!("📋 Lock file: {}", lock_path.display());
    Ok(())
}
