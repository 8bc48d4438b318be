use clap::Parser;
use std::path::PathBuf;

use monarch_route::prepare::{run_prepare, PrepareConfig};

#[derive(Parser)]
#[command(name = "prepare")]
#[command(about = "Contract an extracted graph for fast routing queries", long_about = None)]
struct Cli {
    /// Artifact base path, as produced by extract
    base: PathBuf,

    /// Number of worker threads (capped at the hardware parallelism)
    #[arg(long, default_value = "8")]
    threads: usize,

    /// Fraction of nodes to contract; 1.0 builds a full hierarchy, lower
    /// values leave an uncontracted core
    #[arg(long, default_value = "1.0")]
    core_factor: f64,

    /// CSV of per-segment speed overrides (from,to,speed-kmh); requires
    /// extraction with --generate-edge-lookup
    #[arg(long)]
    segment_speed_file: Option<PathBuf>,

    /// Node level file path (default: <base>.level)
    #[arg(long)]
    level_output: Option<PathBuf>,

    /// Reuse an existing level file instead of recomputing priorities
    #[arg(long)]
    use_cached_priority: bool,

    /// Write plain-text debug dumps of levels and edges
    #[arg(long)]
    debug_dumps: bool,
}

fn main() {
    let cli = Cli::parse();

    let threads = cli.threads.min(
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    );
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
    println!("Threads: {}", threads);

    let config = PrepareConfig {
        base: cli.base,
        core_factor: cli.core_factor,
        segment_speed_file: cli.segment_speed_file,
        level_output: cli.level_output,
        use_cached_priority: cli.use_cached_priority,
        debug_dumps: cli.debug_dumps,
    };

    if let Err(error) = run_prepare(config) {
        eprintln!("[error] {:#}", error);
        std::process::exit(1);
    }
}
