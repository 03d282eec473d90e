//! Paged VM - segmented, two-level paging simulator
//!
//! Usage: paged-vm [OPTIONS] (--config <FILE> | --segments <N>)
//!
//! Segments come from a config file (`id dirs pages prot` per line) or are
//! generated. Requests can then be replayed from a batch file, typed in
//! interactively, or generated by a stress run that writes a CSV log.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;

use paged_vm::constants::*;
use paged_vm::error::{VmError, VmResult};
use paged_vm::io::{load_config, parse_request, read_batch, TranslationLog};
use paged_vm::logger;
use paged_vm::simulation::{describe, initialize_random_segments, run_batch, stress_test, SessionStats};
use paged_vm::{ManagerConfig, MemoryManager, PageProtection, ReplacementPolicy};

/// Command-line configuration
#[derive(Parser, Debug)]
#[command(name = "paged-vm")]
#[command(author, version, about = "Segmented two-level paging simulator", long_about = None)]
struct Cli {
    /// Page replacement algorithm
    #[arg(short, long, value_enum, default_value_t = ReplacementPolicy::Fifo)]
    policy: ReplacementPolicy,

    /// Number of physical frames
    #[arg(short, long, default_value_t = DEFAULT_NUM_FRAMES)]
    frames: usize,

    /// Page size in addressable units
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Load segments from this file
    #[arg(short, long, value_name = "FILE", conflicts_with = "segments")]
    config: Option<PathBuf>,

    /// Generate this many segments instead of loading a config file
    #[arg(short, long, value_name = "N")]
    segments: Option<u32>,

    /// Give each page a random protection instead of its segment's
    #[arg(long)]
    random_page_protection: bool,

    /// Seed for every random choice (latency, protection, generated requests)
    #[arg(long)]
    seed: Option<u64>,

    /// Replay requests from this file (`seg dir page offset access` per line)
    #[arg(short, long, value_name = "FILE")]
    batch: Option<PathBuf>,

    /// Write a CSV row per batch request to this file
    #[arg(long, value_name = "FILE", requires = "batch")]
    batch_log: Option<PathBuf>,

    /// Read requests from stdin until -1 or end of input
    #[arg(short, long)]
    interactive: bool,

    /// Run this many random requests after everything else
    #[arg(long, value_name = "N")]
    stress: Option<usize>,

    /// Fraction of stress requests that stay in range
    #[arg(long, default_value_t = STRESS_VALID_RATIO)]
    valid_ratio: f64,

    /// CSV log for the stress run
    #[arg(long, value_name = "FILE", default_value = "results.txt")]
    stress_log: PathBuf,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init(logger::level_for(cli.verbose)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    // Run the simulator and handle any errors
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main logic separated from main() for cleaner error handling
fn run(cli: &Cli) -> VmResult<()> {
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_os_rng(),
    };

    let page_protection = if cli.random_page_protection {
        PageProtection::Randomized
    } else {
        PageProtection::Inherit
    };
    let mut config = ManagerConfig::new(cli.frames, cli.page_size, cli.policy)
        .with_page_protection(page_protection);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    let mut manager = MemoryManager::new(config)?;

    // Step 1: Segments
    if let Some(path) = &cli.config {
        load_config(&mut manager, path)?;
    } else if let Some(count) = cli.segments {
        initialize_random_segments(&mut manager, count, &mut rng)?;
    }
    if manager.segment_count() == 0 {
        return Err(VmError::NoSegments);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", manager.memory_map())?;

    // Step 2: Batch file
    if let Some(path) = &cli.batch {
        let requests = read_batch(path)?;
        writeln!(out, "\n--- Processing Batch File: {} ---", path.display())?;
        let stats = match &cli.batch_log {
            Some(log_path) => {
                let mut csv = TranslationLog::create(log_path)?;
                let stats = run_batch(&mut manager, &requests, &mut out, Some(&mut csv))?;
                csv.finish(&[])?;
                stats
            }
            None => run_batch::<_, io::Sink>(&mut manager, &requests, &mut out, None)?,
        };
        writeln!(out, "\n--- Batch Processing Summary ---\n{}", stats)?;
        writeln!(out, "--------------------------------")?;
    }

    // Step 3: Interactive session
    if cli.interactive {
        let stats = interactive(&mut manager, &mut out)?;
        if stats.total > 0 {
            writeln!(out, "\n--- Manual Session Metrics ---")?;
            writeln!(out, "Average Translation Latency: {:.2}", stats.average_latency())?;
        }
    }

    // Step 4: Stress run
    if let Some(count) = cli.stress {
        let csv = TranslationLog::create(&cli.stress_log)?;
        let report = stress_test(&mut manager, count, cli.valid_ratio, &mut rng, csv)?;
        writeln!(out, "\n{}", report)?;
        writeln!(out, "Stress test results logged to {}", cli.stress_log.display())?;
    }

    Ok(())
}

fn interactive<W: Write>(manager: &mut MemoryManager, out: &mut W) -> VmResult<SessionStats> {
    let mut stats = SessionStats::default();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        write!(out, "\nEnter logical address (seg dir page offset access[0=R,1=W]) or -1 to stop: ")?;
        out.flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();
        if line == "-1" || line.starts_with("-1 ") {
            break;
        }
        let Some(request) = parse_request(line) else {
            log::warn!("could not parse request: {}", line);
            continue;
        };

        let translation = manager.translate_request(&request);
        stats.record(&translation);
        writeln!(out, "{}", describe(&request, &translation))?;
        writeln!(out, "{}", manager.memory_map())?;
    }
    Ok(stats)
}
