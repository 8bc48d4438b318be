use clap::Parser;
use std::path::PathBuf;

use monarch_route::extract::{run_extract, ExtractConfig};

#[derive(Parser)]
#[command(name = "extract")]
#[command(about = "Extract a routable graph from a raw map dump", long_about = None)]
struct Cli {
    /// Input map file (.osm.pbf)
    input: PathBuf,

    /// Routing profile to classify ways and price turns
    #[arg(long, default_value = "car")]
    profile: String,

    /// Number of worker threads (capped at the hardware parallelism)
    #[arg(long, default_value = "8")]
    threads: usize,

    /// Emit the .edge_segment_lookup/.edge_penalties side-cars needed for
    /// per-segment speed overrides at prepare time
    #[arg(long)]
    generate_edge_lookup: bool,
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

    let config = ExtractConfig {
        input: cli.input,
        profile_name: cli.profile,
        generate_edge_lookup: cli.generate_edge_lookup,
    };

    if let Err(error) = run_extract(config) {
        eprintln!("[error] {:#}", error);
        std::process::exit(1);
    }
}
