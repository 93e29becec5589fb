//! memtrace-ngram - mine recurring access patterns from memory traces

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use memtrace_ngram::bench::BenchmarkRunner;
use memtrace_ngram::core::config::MinerConfig;
use memtrace_ngram::core::error::MinerResult;
use memtrace_ngram::core::pipeline::{MiningPass, TraceMiner};
use memtrace_ngram::report::{self, ngram_files};
use memtrace_ngram::SimilarityMatrix;

#[derive(Parser)]
#[command(name = "memtrace-ngram")]
#[command(about = "Mine recurring access n-grams from memory traces", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine n-grams from one or more trace files
    Mine {
        #[arg(required = true)]
        traces: Vec<PathBuf>,

        /// Config file (defaults to the user config, if any)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reduction threshold as a fraction of all records
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Minimum occurrences/records ratio for emitted n-grams
        #[arg(long)]
        min_ratio: Option<f64>,

        /// Instruction pointer to source line table
        #[arg(long)]
        source_lines: Option<PathBuf>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Do not write augmented traces back to disk
        #[arg(long)]
        no_persist: bool,
    },

    /// Pairwise distance matrix over n-gram files or directories of them
    Similarity {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write the matrix here (plus a .json next to it)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show pattern tree statistics and hot nodes for a trace
    Stats {
        trace: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Show effective configuration
    Config {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Time each stage on synthetic traces
    Bench {
        #[arg(short, long, default_value = "10")]
        iterations: usize,

        #[arg(short, long, default_value = "10000")]
        records: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Mine {
            traces,
            config,
            threshold,
            min_ratio,
            source_lines,
            output_dir,
            no_persist,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(threshold) = threshold {
                config.reduce_threshold = threshold;
            }
            if let Some(ratio) = min_ratio {
                config.min_occurrence_ratio = ratio;
            }
            if source_lines.is_some() {
                config.source_lines = source_lines;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            if no_persist {
                config.persist_normalized = false;
            }

            let mut miner = TraceMiner::new(config)?;
            let mut failed = 0usize;

            for trace in &traces {
                match miner.mine_file(trace) {
                    Ok(report) => {
                        println!("{}:", report.trace.display());
                        println!("  Records:   {}", report.summary.tree.total_records);
                        println!("  Nodes:     {} ({} kept)", report.summary.tree.node_count, report.summary.reduced_nodes);
                        println!("  Variants:  {}", report.summary.ngram_variants);
                        for ngram in &report.summary.emitted {
                            println!(
                                "  ngram{:<4} length {:<5} x{:<7} ({:.2}%)",
                                ngram.index,
                                ngram.length,
                                ngram.occurrences,
                                ngram.ratio * 100.0
                            );
                        }
                    }
                    Err(e) => {
                        warn!("{}: {}", trace.display(), e);
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                return Err(format!("{} of {} traces failed", failed, traces.len()).into());
            }
        }

        Commands::Similarity { inputs, output } => {
            let mut files = Vec::new();
            for input in &inputs {
                if input.is_dir() {
                    files.extend(ngram_files::discover(input)?);
                } else {
                    files.push(input.clone());
                }
            }
            info!("Comparing {} n-gram files", files.len());

            let entries = report::load_ngram_entries(&files)?;
            let matrix = SimilarityMatrix::compute(&entries);

            for (i, label) in matrix.labels().iter().enumerate() {
                println!("{:>4}  {}", i, label);
            }
            println!();
            print!("{}", matrix.to_text());
            println!("\nMean distance: {:.6}", matrix.mean_distance());
            for (i, j, d) in matrix.closest_pairs(5) {
                println!("  {} ~ {}  {:.6}", matrix.labels()[i], matrix.labels()[j], d);
            }

            if let Some(path) = output {
                let json = report::write_matrix(&path, &matrix)?;
                info!("Wrote {} and {}", path.display(), json.display());
            }
        }

        Commands::Stats { trace, config, threshold } => {
            let mut config = load_config(config.as_deref())?;
            config.persist_normalized = false;
            let threshold = threshold.unwrap_or(config.reduce_threshold);

            let mut miner = TraceMiner::new(config.clone())?;
            let records = miner.load_records(&trace)?;
            let mut pass = MiningPass::new(trace.display().to_string(), config);
            pass.load_records(records)?;
            pass.build_tree()?;
            pass.reduce(threshold)?;
            let summary = pass.summary()?;

            println!("Pattern Tree: {}", summary.label);
            println!("  Records:        {}", summary.tree.total_records);
            println!("  Nodes:          {}", summary.tree.node_count);
            println!("  Edge contexts:  {}", summary.tree.edge_count);
            println!("  Reduced at {}: {} nodes, {} edge contexts", threshold, summary.reduced_nodes, summary.reduced_edges);
            println!("  Hot nodes:");
            for node in &summary.hot_nodes {
                println!(
                    "    {:<24} {:>8} {}",
                    node.key,
                    node.visits,
                    if node.is_read { "read" } else { "write" }
                );
            }
        }

        Commands::Config { path } => {
            let config = load_config(path.as_deref())?;
            println!("Current Configuration:");
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Bench { iterations, records } => {
            println!("Running benchmarks ({} iterations, {} records)...", iterations, records);
            let runner = BenchmarkRunner::new(iterations, records);

            for result in runner.run_all() {
                println!("\nBenchmark: {}", result.name);
                println!("  Iterations:  {}", result.iterations);
                println!("  Total:       {} ms", result.total_ms);
                println!("  Avg:         {:.3} ms", result.avg_ms);
                println!("  Min:         {} ms", result.min_ms);
                println!("  Max:         {} ms", result.max_ms);
                println!("  Ops/sec:     {:.0}", result.ops_per_sec);
            }
        }
    }

    Ok(())
}

/// Explicit file, else the user config when it exists, else defaults
fn load_config(path: Option<&Path>) -> MinerResult<MinerConfig> {
    if let Some(path) = path {
        return MinerConfig::load(path);
    }
    match MinerConfig::default_path() {
        Some(path) if path.exists() => {
            info!("Using config {}", path.display());
            MinerConfig::load(&path)
        }
        _ => Ok(MinerConfig::default()),
    }
}
