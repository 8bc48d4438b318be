//! Prepare stage: reload the edge-based graph, optionally re-apply fresh
//! per-segment speeds, contract, and serialize the hierarchy.

pub mod speeds;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::contract;
use crate::fingerprint::Fingerprint;
use crate::graph::edge_based::{EdgeBasedEdge, EDGE_BASED_EDGE_SIZE};
use crate::serialize;
use self::speeds::SegmentSpeedTable;

pub struct PrepareConfig {
    pub base: PathBuf,
    pub core_factor: f64,
    pub segment_speed_file: Option<PathBuf>,
    pub level_output: Option<PathBuf>,
    pub use_cached_priority: bool,
    pub debug_dumps: bool,
}

#[derive(Debug)]
pub struct PrepareResult {
    pub hsgr_path: PathBuf,
    pub edge_count: usize,
    pub checksum: u32,
    pub core_node_count: usize,
}

pub fn artifact(base: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", base.display(), suffix))
}

#[derive(Debug)]
pub struct LoadedEdgeGraph {
    pub edges: Vec<EdgeBasedEdge>,
    pub max_edge_id: u64,
}

/// Read `.edges` back; with a speed table, every edge weight is recomputed
/// from its side-car segment list plus the stored fixed penalty.
pub fn load_edge_expanded_graph(
    base: &Path,
    speed_table: Option<&SegmentSpeedTable>,
) -> Result<LoadedEdgeGraph> {
    let edges_path = artifact(base, "edges");
    let label = edges_path.display().to_string();
    println!("Opening {}", label);

    let mut reader = BufReader::new(
        File::open(&edges_path).with_context(|| format!("Failed to open {}", label))?,
    );
    Fingerprint::read_and_check(&mut reader, &label)?;

    let mut buf8 = [0u8; 8];
    reader.read_exact(&mut buf8)?;
    let edge_count = u64::from_le_bytes(buf8);
    reader.read_exact(&mut buf8)?;
    let max_edge_id = u64::from_le_bytes(buf8);

    let mut sidecars = match speed_table {
        Some(_) => {
            let segments_path = artifact(base, "edge_segment_lookup");
            let penalties_path = artifact(base, "edge_penalties");
            let segments = File::open(&segments_path);
            let penalties = File::open(&penalties_path);
            match (segments, penalties) {
                (Ok(s), Ok(p)) => Some((BufReader::new(s), BufReader::new(p))),
                _ => bail!(
                    "Could not load {} or {}; was extraction run with --generate-edge-lookup?",
                    segments_path.display(),
                    penalties_path.display()
                ),
            }
        }
        None => None,
    };

    println!("Reading {} edges from the edge-based graph", edge_count);
    let mut edges = Vec::with_capacity(edge_count as usize);
    let mut record = [0u8; EDGE_BASED_EDGE_SIZE];
    for _ in 0..edge_count {
        reader.read_exact(&mut record)?;
        let mut edge = EdgeBasedEdge::decode(&record);

        if let (Some(table), Some((segments, penalties))) = (speed_table, sidecars.as_mut()) {
            let mut buf4 = [0u8; 4];
            penalties.read_exact(&mut buf4)?;
            let fixed_penalty = u32::from_le_bytes(buf4);

            segments.read_exact(&mut buf4)?;
            let node_count = u32::from_le_bytes(buf4);
            let mut prev = read_u64(segments)?;
            let mut new_weight = 0u32;
            for _ in 1..node_count {
                let node = read_u64(segments)?;
                let length = read_f64(segments)?;
                segments.read_exact(&mut buf4)?;
                let original_weight = u32::from_le_bytes(buf4);

                new_weight += match table.lookup(prev, node) {
                    Some(speed) => speeds::segment_weight(length, speed),
                    None => original_weight,
                };
                prev = node;
            }
            edge.weight = fixed_penalty + new_weight;
        }

        edges.push(edge);
    }
    println!("  ✓ Done reading edges");

    Ok(LoadedEdgeGraph { edges, max_edge_id })
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub fn run_prepare(config: PrepareConfig) -> Result<PrepareResult> {
    if !(0.0..=1.0).contains(&config.core_factor) {
        bail!(
            "Core factor must be between 0.0 and 1.0 (inclusive), got {}",
            config.core_factor
        );
    }

    let start = Instant::now();
    println!("🔨 Preparing {} for routing", config.base.display());

    let speed_table = match &config.segment_speed_file {
        Some(path) => {
            let table = SegmentSpeedTable::from_csv(path)?;
            println!(
                "  ✓ Segment speed data supplied: {} rows from {}",
                table.len(),
                path.display()
            );
            Some(table)
        }
        None => None,
    };

    let loaded = load_edge_expanded_graph(&config.base, speed_table.as_ref())?;
    if loaded.edges.is_empty() {
        bail!("The edge-based graph is empty, nothing to prepare");
    }
    let node_count = (loaded.max_edge_id + 1) as u32;

    let level_path = config
        .level_output
        .clone()
        .unwrap_or_else(|| artifact(&config.base, "level"));

    let cached_levels = if config.use_cached_priority {
        let levels = serialize::read_node_levels(&level_path)
            .with_context(|| format!("Failed to read cached levels from {}", level_path.display()))?;
        println!("  ✓ Reusing {} cached node levels", levels.len());
        Some(levels)
    } else {
        None
    };

    let contraction_start = Instant::now();
    let result = contract::contract(
        node_count,
        &loaded.edges,
        config.core_factor,
        cached_levels,
    );
    println!(
        "Contraction took {:.2}s",
        contraction_start.elapsed().as_secs_f64()
    );

    let mut contracted_edges = result.edges;
    let hsgr_path = artifact(&config.base, "hsgr");
    let (checksum, edge_count) = serialize::write_contracted_graph(
        &hsgr_path,
        loaded.max_edge_id as u32,
        &mut contracted_edges,
    )?;
    println!("  ✓ Wrote {} ({} edges, CRC32 {:#010x})", hsgr_path.display(), edge_count, checksum);

    let core_path = artifact(&config.base, "core");
    serialize::write_core_markers(&core_path, &result.is_core)?;
    println!("  ✓ Wrote {}", core_path.display());

    if !config.use_cached_priority {
        serialize::write_node_levels(&level_path, &result.levels)?;
        println!("  ✓ Wrote {}", level_path.display());
    }

    if config.debug_dumps {
        write_debug_dumps(&config.base, &result.levels, &contracted_edges, &loaded.edges)?;
    }

    let core_node_count = result.is_core.iter().filter(|&&c| c).count();
    write_lock_file(
        &config.base,
        edge_count,
        checksum,
        core_node_count,
        start.elapsed().as_millis() as u64,
        &hsgr_path,
    )?;

    println!(
        "✅ Preprocessing finished after {:.2}s",
        start.elapsed().as_secs_f64()
    );

    Ok(PrepareResult {
        hsgr_path,
        edge_count,
        checksum,
        core_node_count,
    })
}

/// Opt-in plain-text dumps of the contraction outputs.
fn write_debug_dumps(
    base: &Path,
    levels: &[f32],
    contracted: &[contract::QueryEdge],
    input_edges: &[EdgeBasedEdge],
) -> Result<()> {
    let mut levels_file = File::create(artifact(base, "node_levels.txt"))?;
    writeln!(levels_file, "level")?;
    for level in levels {
        writeln!(levels_file, "{}", level)?;
    }

    let mut edges_file = File::create(artifact(base, "contracted_edges.txt"))?;
    writeln!(edges_file, "source\ttarget\tweight\tforward\tbackward")?;
    for edge in contracted {
        writeln!(
            edges_file,
            "{}\t{}\t{}\t{}\t{}",
            edge.source, edge.target, edge.data.weight, edge.data.forward, edge.data.backward
        )?;
    }

    let mut input_file = File::create(artifact(base, "edge_based_edges.txt"))?;
    writeln!(input_file, "source\ttarget\tedge_id\tweight\tforward\tbackward")?;
    for edge in input_edges {
        writeln!(
            input_file,
            "{}\t{}\t{}\t{}\t{}\t{}",
            edge.source, edge.target, edge.edge_id, edge.weight, edge.forward, edge.backward
        )?;
    }
    Ok(())
}

fn write_lock_file(
    base: &Path,
    edge_count: usize,
    checksum: u32,
    core_node_count: usize,
    elapsed_ms: u64,
    hsgr_path: &Path,
) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(std::fs::read(hsgr_path)?);
    let hsgr_sha = hex::encode(hasher.finalize());

    let lock = serde_json::json!({
        "edge_count": edge_count,
        "edges_crc32": checksum,
        "core_node_count": core_node_count,
        "prepare_time_ms": elapsed_ms,
        "hsgr_sha256": hsgr_sha,
        "created_at_utc": chrono::Utc::now().to_rfc3339(),
    });
    let lock_path = artifact(base, "prepare.lock.json");
    std::fs::write(&lock_path, serde_json::to_string_pretty(&lock)?)?;
    println!("📋 Lock file: {}", lock_path.display());
    Ok(())
}
