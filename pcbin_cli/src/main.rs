use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcbin_codecs::codec_by_name;
use pcbin_core::format::LENGTH_PREFIX_SIZE;
use pcbin_core::{
    create_binfile, BuildOptions, Codec, CodeEntry, Domain, JsonDirSource, Postcode, PostcodeFile, ReaderOptions,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pcbin",
    about = "Build, inspect and query compact postcode binfiles",
    version
)]
struct Cli {
    /// Metadata codec: zstd | lz4 | passthrough (must match at build and read time)
    #[arg(short, long, global = true, default_value = "zstd")]
    codec: String,
    /// Zstd compression level (1–22, only used with --codec zstd)
    #[arg(long, global = true, default_value_t = 19)]
    level: i32,
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a binfile from a dataset directory
    Build {
        /// Directory holding postcodes.jsonl and the reference tables
        dataset: PathBuf,
        /// Destination binfile
        #[arg(short, long, default_value = "postcodes.bin")]
        output: PathBuf,
        /// Only read the first N rows
        #[arg(long)]
        max: Option<usize>,
    },
    /// Print the record layout and table sizes
    Inspect {
        #[arg(short, long, default_value = "postcodes.bin")]
        input: PathBuf,
    },
    /// Print records in file order
    Dump {
        #[arg(short, long, default_value = "postcodes.bin")]
        input: PathBuf,
        /// Stop after N records
        #[arg(short, long)]
        limit: Option<u64>,
    },
    /// Look up one postcode
    Seek {
        outcode: String,
        incode: String,
        #[arg(short, long, default_value = "postcodes.bin")]
        input: PathBuf,
        /// Records kept in the reader cache (0 disables it)
        #[arg(long, default_value_t = 1000)]
        cache: usize,
    },
    /// Benchmark exact-match lookups of postcodes sampled from the file
    Bench {
        #[arg(short, long, default_value = "postcodes.bin")]
        input: PathBuf,
        /// Number of lookups
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Records kept in the reader cache (0 disables it)
        #[arg(long, default_value_t = 1000)]
        cache: usize,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
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

fn open(input: &Path, codec: &str, level: i32, cache: usize) -> anyhow::Result<PostcodeFile> {
    let codec = codec_by_name(codec, level)?;
    let options = ReaderOptions { cache_capacity: cache };
    PostcodeFile::open_with(input, Arc::from(codec), &options)
        .with_context(|| format!("opening binfile {:?}", input))
}

fn describe(pc: &Postcode) -> String {
    let name = |entry: Option<&CodeEntry>| {
        entry
            .map(|e| e.name.clone().unwrap_or_else(|| e.code.clone()))
            .unwrap_or_else(|| "-".into())
    };
    let coords = match (pc.latitude(), pc.longitude()) {
        (Some(lat), Some(lon)) => format!("{:.5},{:.5}", lat, lon),
        _ => "-".into(),
    };
    format!(
        "{:<9} {:>19}  {} | {} | {} | {} | {} | imd {}",
        pc.pcd(),
        coords,
        name(pc.country()),
        name(pc.county()),
        name(pc.electoral_division()),
        name(pc.local_authority_district()),
        name(pc.urban_rural()),
        pc.imd().map_or_else(|| "-".into(), |v| v.to_string())
    )
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_build(dataset: PathBuf, output: PathBuf, max: Option<usize>, codec_name: &str, level: i32) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name, level)?;
    let codec_display = codec.name().to_string();
    let mut source = JsonDirSource::new(&dataset);
    let options = BuildOptions { max_rows: max };

    let t0 = Instant::now();
    let summary = create_binfile(&mut source, &output, codec, &options)
        .with_context(|| format!("building {:?} from {:?}", output, dataset))?;
    let elapsed = t0.elapsed();
    let file_size = std::fs::metadata(&output)?.len();

    eprintln!("  codec       : {}", codec_display);
    eprintln!("  records     : {}", summary.records);
    eprintln!("  skipped     : {}", summary.skipped);
    eprintln!("  outcodes    : {}", summary.outcodes);
    eprintln!("  incodes     : {}", summary.incodes);
    eprintln!("  locations   : {}", summary.locations);
    eprintln!(
        "  metadata    : {} -> {}",
        human_bytes(summary.metadata_raw_bytes as u64),
        human_bytes(summary.metadata_compressed_bytes as u64)
    );
    eprintln!("  file size   : {}", human_bytes(file_size));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(input: PathBuf, codec: &str, level: i32) -> anyhow::Result<()> {
    let reader = open(&input, codec, level, 0)?;
    let file_size = std::fs::metadata(&input)?.len();
    let meta = reader.metadata();
    let metadata_size = reader.record_start() - LENGTH_PREFIX_SIZE;

    println!("=== Postcode binfile: {:?} ===", input);
    println!();
    println!("  record size    : {} bytes", meta.data_spec.byte_length);
    for field in &meta.data_spec.fields {
        println!("    {:<16} : {:>2} bits", field.name, field.bit_length);
    }
    println!("  records        : {}", reader.len());
    println!("  outcodes       : {}", meta.outcodes.len());
    println!("  incodes        : {}", meta.incodes.len());
    println!("  locations      : {}", meta.locations.len());
    for domain in Domain::ALL {
        println!("  {:<14} : {}", domain.name(), meta.references.table(domain).len());
    }
    println!("  metadata       : {}", human_bytes(metadata_size));
    println!("  file on disk   : {}", human_bytes(file_size));
    Ok(())
}

fn run_dump(input: PathBuf, limit: Option<u64>, codec: &str, level: i32) -> anyhow::Result<()> {
    let mut reader = open(&input, codec, level, 0)?;
    let limit = limit.map_or(usize::MAX, |n| n as usize);
    for pc in reader.iter().take(limit) {
        println!("{}", describe(&pc?));
    }
    Ok(())
}

fn run_seek(outcode: &str, incode: &str, input: PathBuf, cache: usize, codec: &str, level: i32) -> anyhow::Result<()> {
    let mut reader = open(&input, codec, level, cache)?;
    let t0 = Instant::now();
    match reader.find(outcode, incode) {
        Ok(pc) => {
            let elapsed = t0.elapsed();
            println!("{}", pc);
            println!("  {}", describe(&pc));
            if let Some(link) = pc.google() {
                println!("  {}", link);
            }
            eprintln!("  found in {:.3}ms", elapsed.as_secs_f64() * 1000.0);
        }
        Err(e) if e.is_not_found() => println!("Postcode not found"),
        Err(e) => return Err(e).with_context(|| format!("looking up {} {}", outcode, incode)),
    }
    Ok(())
}

fn run_bench(input: PathBuf, count: u64, seed: u64, cache: usize, codec: &str, level: i32) -> anyhow::Result<()> {
    let mut reader = open(&input, codec, level, cache)?;
    let record_count = reader.len();

    if record_count == 0 || count == 0 {
        anyhow::bail!("nothing to benchmark: {} records, {} lookups", record_count, count);
    }

    // Simple LCG for reproducible random record positions
    let positions: Vec<u64> = {
        let mut rng = seed;
        (0..count)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (rng >> 33) % record_count
            })
            .collect()
    };
    let targets = positions
        .iter()
        .map(|&pos| reader.read_postcode(pos).map(|pc| pc.pcd()))
        .collect::<Result<Vec<_>, _>>()?;

    eprintln!(
        "benchmarking {} exact lookups across {} records...",
        count, record_count
    );

    let t0 = Instant::now();
    let mut latencies_us: Vec<u64> = Vec::with_capacity(count as usize);

    for pcd in &targets {
        let t = Instant::now();
        reader.exact(pcd).with_context(|| format!("looking up {}", pcd))?;
        latencies_us.push(t.elapsed().as_micros() as u64);
    }

    let elapsed = t0.elapsed();
    latencies_us.sort_unstable();

    let last = latencies_us.len() - 1;
    let p50 = latencies_us[latencies_us.len() / 2];
    let p95 = latencies_us[((latencies_us.len() as f64 * 0.95) as usize).min(last)];
    let p99 = latencies_us[((latencies_us.len() as f64 * 0.99) as usize).min(last)];
    let min = latencies_us[0];
    let max = latencies_us[last];

    println!();
    println!("=== Exact Lookup Benchmark ===");
    println!("  lookups     : {}", count);
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {:.0} lookups/s",
        count as f64 / elapsed.as_secs_f64()
    );
    println!("  latency:");
    println!("    min  : {} µs", min);
    println!("    p50  : {} µs", p50);
    println!("    p95  : {} µs", p95);
    println!("    p99  : {} µs", p99);
    println!("    max  : {} µs", max);

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let (codec, level) = (cli.codec.as_str(), cli.level);
    match cli.command {
        Commands::Build { dataset, output, max } => run_build(dataset, output, max, codec, level),
        Commands::Inspect { input } => run_inspect(input, codec, level),
        Commands::Dump { input, limit } => run_dump(input, limit, codec, level),
        Commands::Seek {
            outcode,
            incode,
            input,
            cache,
        } => run_seek(&outcode, &incode, input, cache, codec, level),
        Commands::Bench {
            input,
            count,
            seed,
            cache,
        } => run_bench(input, count, seed, cache, codec, level),
    }
}
