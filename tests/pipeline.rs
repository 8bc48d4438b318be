//! End-to-end scenarios: literal small inputs through extract and prepare.

use std::path::{Path, PathBuf};

use monarch_route::extract::run_extract_from_source;
use monarch_route::osm::{InputRestriction, RawElement, RawNode, RawTags, RawWay, VecSource};
use monarch_route::prepare::speeds::SegmentSpeedTable;
use monarch_route::prepare::{artifact, load_edge_expanded_graph, run_prepare, PrepareConfig};
use monarch_route::profile::{NodeResult, Profile, ProfileProperties, ProfileSource, WayResult};
use monarch_route::serialize::{read_contracted_graph, read_core_markers, read_node_levels, write_node_levels};
use monarch_route::validate::{validate_ch_correctness, ContractedSearch};

/// Deterministic test profile: speed and name come straight from tags, all
/// turns are free, restrictions are honored.
struct TagProfile;

struct TagState;

impl Profile for TagState {
    fn node_function(&mut self, node: &RawNode, out: &mut NodeResult) {
        out.barrier = node.tags.get("barrier").is_some();
        out.traffic_light = node.tags.get("signal").is_some();
    }

    fn way_function(&mut self, way: &RawWay, out: &mut WayResult) {
        let speed: f64 = match way.tags.get("speed").and_then(|s| s.parse().ok()) {
            Some(speed) => speed,
            None => return,
        };
        out.forward_speed = speed;
        if way.tags.get("oneway") != Some("yes") {
            out.backward_speed = speed;
        }
        if let Some(name) = way.tags.get("name") {
            out.name = name.to_string();
        }
        out.travel_mode = 1;
        out.highway_class = 1;
    }

    fn turn_function(&mut self, _angle: f64) -> i32 {
        0
    }
}

impl ProfileSource for TagProfile {
    fn name(&self) -> &str {
        "tag"
    }

    fn properties(&self) -> ProfileProperties {
        ProfileProperties {
            traffic_signal_penalty: 0,
            u_turn_penalty: 0,
            allow_u_turns: false,
            use_turn_restrictions: true,
        }
    }

    fn make_state(&self) -> Box<dyn Profile + '_> {
        Box::new(TagState)
    }
}

fn tags(pairs: &[(&str, &str)]) -> RawTags {
    RawTags::new(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn node(id: u64, lat: f64, lon: f64) -> RawElement {
    RawElement::Node(RawNode {
        id,
        lat,
        lon,
        tags: RawTags::default(),
    })
}

fn way(id: u64, refs: &[u64], extra: &[(&str, &str)]) -> RawElement {
    RawElement::Way(RawWay {
        id,
        node_refs: refs.to_vec(),
        tags: tags(extra),
    })
}

/// ~20 m of longitude at the equator: at 72 km/h one segment weighs
/// 10 deci-seconds.
const STEP: f64 = 0.000_180;

fn extract_to(base: &Path, elements: Vec<RawElement>) -> monarch_route::ExtractResult {
    let mut source = VecSource::new(elements);
    run_extract_from_source(&mut source, &TagProfile, base, true).unwrap()
}

fn prepare_with(base: &Path, core_factor: f64) {
    run_prepare(PrepareConfig {
        base: base.to_path_buf(),
        core_factor,
        segment_speed_file: None,
        level_output: None,
        use_cached_priority: false,
        debug_dumps: false,
    })
    .unwrap();
}

/// Scenario: one-way chain A-B-C-D with per-segment names (so nothing
/// compresses) expands to 3 edge-based nodes and 2 turn edges of weight 10.
#[test]
fn linear_chain_expands_and_contracts() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("chain");

    let result = extract_to(
        &base,
        vec![
            node(1, 0.0, 0.0),
            node(2, 0.0, STEP),
            node(3, 0.0, 2.0 * STEP),
            node(4, 0.0, 3.0 * STEP),
            way(10, &[1, 2], &[("speed", "72"), ("oneway", "yes"), ("name", "a")]),
            way(11, &[2, 3], &[("speed", "72"), ("oneway", "yes"), ("name", "b")]),
            way(12, &[3, 4], &[("speed", "72"), ("oneway", "yes"), ("name", "c")]),
        ],
    );
    assert_eq!(result.edge_based_node_count, 3);
    assert_eq!(result.edge_based_edge_count, 2);

    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    let mut pairs: Vec<(u32, u32, u32)> = loaded
        .edges
        .iter()
        .map(|e| (e.source, e.target, e.weight))
        .collect();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(0, 1, 10), (1, 2, 10)]);

    // Force the middle segment to contract first: exactly one shortcut
    // AB→CD with middle BC and weight 20 must appear.
    write_node_levels(&artifact(&base, "level"), &[1.0, 0.0, 2.0]).unwrap();
    run_prepare(PrepareConfig {
        base: base.clone(),
        core_factor: 1.0,
        segment_speed_file: None,
        level_output: None,
        use_cached_priority: true,
        debug_dumps: false,
    })
    .unwrap();

    let hsgr = read_contracted_graph(&artifact(&base, "hsgr")).unwrap();
    let shortcuts: Vec<_> = hsgr.edges.iter().filter(|e| e.shortcut).collect();
    assert_eq!(shortcuts.len(), 1);
    assert_eq!(shortcuts[0].weight, 20);
    assert_eq!(shortcuts[0].id, 1); // middle = BC
    assert!(shortcuts[0].forward);

    // Full hierarchy: nothing left in the core.
    let core = read_core_markers(&artifact(&base, "core")).unwrap();
    assert!(core.iter().all(|&c| !c));

    // The hierarchy answers the end-to-end distance.
    let search = ContractedSearch::new(&hsgr);
    assert_eq!(search.query(0, 2), Some(20));
}

/// Scenario: u-turns exist exactly at dead ends.
#[test]
fn u_turn_only_at_dead_end() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("uturn");

    extract_to(
        &base,
        vec![
            node(1, 0.0, 0.0),
            node(2, 0.0, STEP),
            node(3, 0.0, -STEP),
            way(10, &[3, 1], &[("speed", "72"), ("name", "c")]),
            way(11, &[1, 2], &[("speed", "72"), ("name", "b")]),
        ],
    );

    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    let turns: Vec<(u32, u32)> = loaded.edges.iter().map(|e| (e.source, e.target)).collect();
    // Edge-based node ids by allocation: A→C=0, A→B=1, B→A=2, C→A=3.
    assert!(turns.contains(&(1, 2)), "u-turn at dead end B missing");
    assert!(turns.contains(&(0, 3)), "u-turn at dead end C missing");
    assert!(!turns.contains(&(2, 1)), "u-turn at through node A present");
    assert!(turns.contains(&(3, 1)), "through turn CA→AB missing");
    assert!(turns.contains(&(2, 0)), "through turn BA→AC missing");
    assert_eq!(turns.len(), 4);
}

/// Scenario: a `no` restriction removes exactly its turn, an `only`
/// restriction removes everything else.
#[test]
fn turn_restrictions_filter_candidates() {
    let build = |is_only: bool| {
        vec![
            node(1, 0.0, -STEP),
            node(2, STEP, 0.0),
            node(3, 0.0, STEP),
            node(5, 0.0, 0.0),
            way(10, &[1, 5], &[("speed", "72"), ("oneway", "yes"), ("name", "a")]),
            way(11, &[5, 2], &[("speed", "72"), ("oneway", "yes"), ("name", "b")]),
            way(12, &[5, 3], &[("speed", "72"), ("oneway", "yes"), ("name", "c")]),
            RawElement::Restriction(InputRestriction {
                via_node: 5,
                from_way: 10,
                to_way: 11,
                is_only,
            }),
        ]
    };

    // no_turn(A,V,B): AV→VB gone, AV→VC stays.
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("no_turn");
    let result = extract_to(&base, build(false));
    assert_eq!(result.restriction_count, 1);
    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    assert_eq!(loaded.edges.len(), 1);
    // Internal ids sort by external: A=0, B=1, C=2, V=3; edge-based nodes
    // in allocation order: A→V=0, B? none, V→B=1, V→C=2.
    assert_eq!((loaded.edges[0].source, loaded.edges[0].target), (0, 2));

    // only_turn(A,V,B): AV→VB is the unique continuation.
    let base = dir.path().join("only_turn");
    extract_to(&base, build(true));
    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    assert_eq!(loaded.edges.len(), 1);
    assert_eq!((loaded.edges[0].source, loaded.edges[0].target), (0, 1));
}

/// Scenario: per-segment speed override recomputes exactly the overridden
/// segment, keeps the fixed penalty, and rejects nothing else.
#[test]
fn segment_speed_override_reweights() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("speeds");

    // ~100 m segments at 100 km/h: factory weight 36 deci-seconds.
    let hundred = 0.000_899;
    extract_to(
        &base,
        vec![
            node(1, 0.0, 0.0),
            node(2, 0.0, hundred),
            node(3, 0.0, 2.0 * hundred),
            way(10, &[1, 2], &[("speed", "100"), ("oneway", "yes"), ("name", "x")]),
            way(11, &[2, 3], &[("speed", "100"), ("oneway", "yes"), ("name", "y")]),
        ],
    );

    let plain = load_edge_expanded_graph(&base, None).unwrap();
    assert_eq!(plain.edges.len(), 1);
    assert_eq!(plain.edges[0].weight, 36);

    // Override (1,2) to 72 km/h: max(1, floor(100·10/20 + 0.5)) = 50.
    let csv_path = dir.path().join("speeds.csv");
    std::fs::write(&csv_path, "1,2,72\n").unwrap();
    let table = SegmentSpeedTable::from_csv(&csv_path).unwrap();
    let reweighted = load_edge_expanded_graph(&base, Some(&table)).unwrap();
    assert_eq!(reweighted.edges[0].weight, 50);

    // A row for an unrelated segment changes nothing.
    std::fs::write(&csv_path, "7,8,30\n").unwrap();
    let table = SegmentSpeedTable::from_csv(&csv_path).unwrap();
    let untouched = load_edge_expanded_graph(&base, Some(&table)).unwrap();
    assert_eq!(untouched.edges[0].weight, 36);
}

/// Boundary: core factor 0.0 contracts nothing and the hierarchy degrades
/// to the plain edge-based graph.
#[test]
fn core_factor_zero_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("core0");

    extract_to(
        &base,
        vec![
            node(1, 0.0, 0.0),
            node(2, 0.0, STEP),
            node(3, 0.0, 2.0 * STEP),
            way(10, &[1, 2], &[("speed", "72"), ("name", "a")]),
            way(11, &[2, 3], &[("speed", "72"), ("name", "b")]),
        ],
    );
    prepare_with(&base, 0.0);

    let core = read_core_markers(&artifact(&base, "core")).unwrap();
    assert!(core.iter().all(|&c| c), ".core must mark every node");

    let levels = read_node_levels(&artifact(&base, "level")).unwrap();
    assert!(levels.iter().all(|&l| l.is_infinite()));

    let hsgr = read_contracted_graph(&artifact(&base, "hsgr")).unwrap();
    assert!(hsgr.edges.iter().all(|e| !e.shortcut));

    // Every input edge survives as a forward record at its source.
    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    for edge in &loaded.edges {
        let begin = hsgr.node_array[edge.source as usize] as usize;
        let end = hsgr.node_array[edge.source as usize + 1] as usize;
        assert!(
            hsgr.edges[begin..end]
                .iter()
                .any(|r| r.target == edge.target && r.weight == edge.weight && r.forward),
            "input edge {}→{} missing from .hsgr",
            edge.source,
            edge.target
        );
    }
}

/// Boundary: empty input aborts before any graph artifact is written.
#[test]
fn empty_input_aborts_early() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("empty");

    let mut source = VecSource::new(vec![node(1, 0.0, 0.0), node(2, 0.0, STEP)]);
    let err = run_extract_from_source(&mut source, &TagProfile, &base, false).unwrap_err();
    assert!(err.to_string().contains("empty"));
    assert!(!artifact(&base, "osrm").exists());
    assert!(!artifact(&base, "timestamp").exists());
}

/// Boundary: an out-of-range core factor aborts before touching files.
#[test]
fn core_factor_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("nothing");
    let err = run_prepare(PrepareConfig {
        base: base.clone(),
        core_factor: 1.5,
        segment_speed_file: None,
        level_output: None,
        use_cached_priority: false,
        debug_dumps: false,
    })
    .unwrap_err();
    assert!(err.to_string().contains("Core factor"));
    assert!(!artifact(&base, "hsgr").exists());
}

/// Scenario: cached levels are deterministic; two cached runs produce a
/// byte-identical `.hsgr`, and a forced unusual order still answers
/// queries exactly.
#[test]
fn cached_priority_is_deterministic_and_correct() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("cached");

    // Small grid with a detour so witnesses matter.
    let mut elements = Vec::new();
    for i in 0..6u64 {
        elements.push(node(i + 1, 0.0, i as f64 * STEP));
        elements.push(node(i + 101, STEP, i as f64 * STEP));
    }
    for i in 0..5u64 {
        elements.push(way(
            200 + i,
            &[i + 1, i + 2],
            &[("speed", "72"), ("name", "s")],
        ));
        elements.push(way(
            300 + i,
            &[i + 101, i + 102],
            &[("speed", "36"), ("name", "n")],
        ));
    }
    for i in [0u64, 2, 5] {
        elements.push(way(
            400 + i,
            &[i + 1, i + 101],
            &[("speed", "72"), ("name", "x")],
        ));
    }
    extract_to(&base, elements);

    prepare_with(&base, 1.0);

    let cached_run = |base: &PathBuf| {
        run_prepare(PrepareConfig {
            base: base.clone(),
            core_factor: 1.0,
            segment_speed_file: None,
            level_output: None,
            use_cached_priority: true,
            debug_dumps: false,
        })
        .unwrap();
        std::fs::read(artifact(base, "hsgr")).unwrap()
    };
    let first = cached_run(&base);
    let second = cached_run(&base);
    assert_eq!(first, second, "cached prepare must be byte-identical");

    // Reverse the contraction order entirely: distances must not change.
    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    let node_count = (loaded.max_edge_id + 1) as u32;
    let reversed: Vec<f32> = (0..node_count).map(|i| (node_count - i) as f32).collect();
    write_node_levels(&artifact(&base, "level"), &reversed).unwrap();
    cached_run(&base);

    let hsgr = read_contracted_graph(&artifact(&base, "hsgr")).unwrap();
    let report = validate_ch_correctness(&hsgr, node_count, &loaded.edges, 50, 42_424_242);
    assert_eq!(report.mismatches, 0);
}

/// Full pipeline sanity: hierarchy distances equal plain Dijkstra on a
/// mesh with mixed speeds.
#[test]
fn hierarchy_matches_dijkstra_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("mesh");

    let mut elements = Vec::new();
    let index = |row: u64, col: u64| row * 10 + col + 1;
    for row in 0..4u64 {
        for col in 0..4u64 {
            elements.push(node(index(row, col), row as f64 * STEP, col as f64 * STEP));
        }
    }
    let mut way_id = 100;
    for row in 0..4u64 {
        for col in 0..4u64 {
            let speed = if (row + col) % 2 == 0 { "72" } else { "36" };
            if col + 1 < 4 {
                elements.push(way(
                    way_id,
                    &[index(row, col), index(row, col + 1)],
                    &[("speed", speed), ("name", "h")],
                ));
                way_id += 1;
            }
            if row + 1 < 4 {
                elements.push(way(
                    way_id,
                    &[index(row, col), index(row + 1, col)],
                    &[("speed", speed), ("name", "v")],
                ));
                way_id += 1;
            }
        }
    }
    extract_to(&base, elements);
    prepare_with(&base, 1.0);

    let loaded = load_edge_expanded_graph(&base, None).unwrap();
    let node_count = (loaded.max_edge_id + 1) as u32;
    let hsgr = read_contracted_graph(&artifact(&base, "hsgr")).unwrap();

    let report = validate_ch_correctness(&hsgr, node_count, &loaded.edges, 80, 7);
    assert_eq!(report.mismatches, 0);

    // Partial hierarchy answers the same distances through the core.
    prepare_with(&base, 0.6);
    let hsgr = read_contracted_graph(&artifact(&base, "hsgr")).unwrap();
    let report = validate_ch_correctness(&hsgr, node_count, &loaded.edges, 80, 8);
    assert_eq!(report.mismatches, 0);
}
