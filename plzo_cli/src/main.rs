mod bench;
mod naming;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xxhash_rust::xxh3::xxh3_64;

use plzo_codecs::codec_by_name;
use plzo_core::format::HEADER_SIZE;
use plzo_core::{
    read_header, ArchiveEngine, Backend, ChunkPlan, EngineConfig, RunStats, DEFAULT_WORKERS,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "plzo",
    about = "Parallel block compression: code a file's chunks concurrently into one container",
    version
)]
struct Cli {
    /// Log chunk dispatch and engine state changes (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct CodecArgs {
    /// Codec to use: passthrough | lz4 | zstd (not recorded in the archive)
    #[arg(short, long, default_value = "lz4")]
    codec: String,
    /// Zstd compression level (1–22, only used with --codec zstd)
    #[arg(long, default_value_t = 3)]
    zstd_level: i32,
    /// Worker pool backend: threads | rayon
    #[arg(long, default_value = "threads")]
    backend: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a parallel container
    Compress {
        /// Source file
        input: PathBuf,
        /// Destination container (default: input with a .plzo extension)
        output: Option<PathBuf>,
        /// Number of chunks, and of workers compressing them (1–255)
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        #[command(flatten)]
        codec: CodecArgs,
    },
    /// Restore the original bytes from a container
    Decompress {
        /// Source container
        input: PathBuf,
        /// Destination file (default: container stem plus "_dp")
        output: Option<PathBuf>,
        #[command(flatten)]
        codec: CodecArgs,
    },
    /// Print the container header and chunk size table
    Inspect {
        /// Container to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
    },
    /// Compare two files byte for byte
    Verify {
        original: PathBuf,
        restored: PathBuf,
    },
    /// Time serial vs parallel compression and decompression of each file
    Bench {
        /// Files to benchmark
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Number of chunks and workers for the parallel runs
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        #[command(flatten)]
        codec: CodecArgs,
        /// Also write the results table to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_engine(codec: &CodecArgs, workers: usize) -> anyhow::Result<ArchiveEngine> {
    let backend: Backend = codec.backend.parse()?;
    let codec = codec_by_name(&codec.codec, codec.zstd_level)?;
    let config = EngineConfig::default()
        .with_workers(workers)
        .with_backend(backend);
    let engine = ArchiveEngine::new(config, codec)?;
    Ok(engine)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn print_stats(engine: &ArchiveEngine, stats: &RunStats) {
    let secs = stats.elapsed.as_secs_f64();
    eprintln!("  codec       : {}", engine.codec().name());
    eprintln!("  backend     : {}", engine.config().backend);
    eprintln!("  workers     : {}", stats.worker_count);
    eprintln!("  input       : {}", human_bytes(stats.input_len));
    eprintln!("  output      : {}", human_bytes(stats.output_len));
    eprintln!("  ratio       : {:.4}", stats.ratio());
    if secs > 0.0 {
        eprintln!(
            "  throughput  : {}/s",
            human_bytes((stats.input_len as f64 / secs) as u64)
        );
    }
    eprintln!("  elapsed     : {:.3}s", secs);
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: Option<PathBuf>,
    workers: usize,
    codec: &CodecArgs,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| {
        let derived = naming::archive_name_for(&input);
        tracing::debug!(archive = %derived.display(), "derived archive name");
        derived
    });
    let mut engine = build_engine(codec, workers)?;
    let stats = engine
        .compress_file(&input, &output)
        .with_context(|| format!("compressing {:?} into {:?}", input, output))?;
    eprintln!("  archive     : {:?}", output);
    print_stats(&engine, &stats);
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: Option<PathBuf>,
    codec: &CodecArgs,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| {
        let derived = naming::restored_name_for(&input);
        tracing::debug!(restored = %derived.display(), "derived output name");
        derived
    });
    // The worker count in the config is ignored; the container carries its own.
    let mut engine = build_engine(codec, DEFAULT_WORKERS)?;
    let stats = engine
        .decompress_file(&input, &output)
        .with_context(|| format!("decompressing {:?} into {:?}", input, output))?;
    eprintln!("  restored    : {:?}", output);
    print_stats(&engine, &stats);
    Ok(())
}

fn run_inspect(file: PathBuf, show_chunks: bool) -> anyhow::Result<()> {
    let f = File::open(&file).with_context(|| format!("opening {:?}", file))?;
    let file_size = f.metadata()?.len();
    let (header, sizes) = read_header(&mut BufReader::new(f))?;
    let plan = ChunkPlan::from_header(&header)?;

    let payload: u64 = sizes.iter().map(|&s| s as u64).sum();
    let expected = (header.prefix_len() as u64) + payload;

    println!("=== PLZO container: {:?} ===", file);
    println!();
    println!("  workers        : {}", plan.worker_count());
    println!("  nominal chunk  : {}", human_bytes(plan.nominal_chunk_size()));
    println!("  remainder      : {} B", plan.remainder());
    println!("  raw size       : {}", human_bytes(plan.total_len()));
    println!("  header + table : {} B", HEADER_SIZE + header.size_table_len());
    println!("  payload        : {}", human_bytes(payload));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.4}", file_size as f64 / plan.total_len() as f64);
    if file_size != expected {
        println!(
            "  WARNING        : size table declares {} bytes, file has {}",
            expected, file_size
        );
    }

    if show_chunks {
        println!();
        println!(
            "  {:>6}  {:>14}  {:>12}  {:>12}",
            "chunk", "raw offset", "raw", "compressed"
        );
        println!("  {}", "-".repeat(50));
        for (i, size) in sizes.iter().enumerate() {
            let range = plan.chunk_range(i);
            println!(
                "  {:>6}  {:>14}  {:>12}  {:>12}",
                i,
                range.start,
                human_bytes(range.end - range.start),
                human_bytes(*size as u64)
            );
        }
    }

    Ok(())
}

fn run_verify(original: &Path, restored: &Path) -> anyhow::Result<()> {
    let a = std::fs::read(original).with_context(|| format!("reading {:?}", original))?;
    let b = std::fs::read(restored).with_context(|| format!("reading {:?}", restored))?;

    println!("  {:<12} {:>12} B  xxh3 {:016x}", "original", a.len(), xxh3_64(&a));
    println!("  {:<12} {:>12} B  xxh3 {:016x}", "restored", b.len(), xxh3_64(&b));

    if a.len() != b.len() {
        anyhow::bail!("sizes differ: {} vs {} bytes", a.len(), b.len());
    }
    if let Some(pos) = a.iter().zip(&b).position(|(x, y)| x != y) {
        anyhow::bail!("files differ at byte offset {}", pos);
    }
    println!("  files are identical");
    Ok(())
}

fn run_bench(
    files: Vec<PathBuf>,
    workers: usize,
    codec: &CodecArgs,
    report: Option<PathBuf>,
) -> anyhow::Result<()> {
    let backend: Backend = codec.backend.parse()?;
    let config = EngineConfig::default()
        .with_workers(workers)
        .with_backend(backend);
    config.validate()?;
    let resolved = codec_by_name(&codec.codec, codec.zstd_level)?;

    let mut rows = Vec::with_capacity(files.len());
    for file in &files {
        eprintln!("benchmarking {:?}...", file);
        rows.push(bench::bench_file(file, resolved.clone(), config)?);
    }

    let table = bench::render_report(&rows, workers);
    println!("{}", table);
    if let Some(path) = report {
        std::fs::write(&path, &table).with_context(|| format!("writing report {:?}", path))?;
        eprintln!("  report written to {:?}", path);
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Compress {
            input,
            output,
            workers,
            codec,
        } => run_compress(input, output, workers, &codec),
        Commands::Decompress {
            input,
            output,
            codec,
        } => run_decompress(input, output, &codec),
        Commands::Inspect { file, chunks } => run_inspect(file, chunks),
        Commands::Verify { original, restored } => run_verify(&original, &restored),
        Commands::Bench {
            files,
            workers,
            codec,
            report,
        } => run_bench(files, workers, &codec, report),
    }
}
