mod cache;
mod clock;
mod config;
mod replace;
mod report;
mod trace;

use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{bail, Context};

use cache::Cache;
use replace::{lru::Lru, AccessResult, Replace};
use trace::{Record, Trace};

use crate::config::Geometry;

const USAGE: &str = "\
Usage: csim [-hv] -s <num> -E <num> -b <num> -t <file>
Options:
  -h                Print this help message.
  -v                Optional verbose flag.
  -s <num>          Number of set index bits.
  -E <num>          Number of lines per set.
  -b <num>          Number of block offset bits.
  -t <file>         Trace file (.xz traces are decompressed).
  --config <json>   Geometry as JSON, e.g. '{\"s\":4,\"E\":1,\"b\":4}', instead of -s/-E/-b.
  -p <path>         Read the --config JSON from a file.
  --json <path>     Also write the final statistics as JSON.
  --heartbeat <n>   Log progress every n trace records.
  -w <n>            Replay n records before counting (warmup).

Examples:
  linux>  csim -s 4 -E 1 -b 4 -t traces/yi.trace
  linux>  csim -v -s 8 -E 2 -b 4 -t traces/yi.trace";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        println!("{USAGE}");
        return Ok(());
    }
    let verbose = args.contains("-v");

    let geometry = match read_geometry(&mut args) {
        Ok(geometry) => geometry,
        Err(err) => {
            eprintln!("{err:#}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };
    let trace_path: Option<PathBuf> = args.opt_value_from_str("-t")?;
    let Some(trace_path) = trace_path else {
        eprintln!("Missing required command line argument -t");
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let stats_path: Option<PathBuf> = args.opt_value_from_str("--json")?;
    let n_warm: u64 = args
        .opt_value_from_str("-w")
        .context("-w should be an integer")?
        .unwrap_or(0);
    let heartbeat_int: u64 = args
        .opt_value_from_str("--heartbeat")
        .context("--heartbeat should be an integer")?
        .unwrap_or(0);
    let records_per_block: usize = args
        .opt_value_from_str("--buffer-size")
        .context("--buffer-size must be an integer")?
        .unwrap_or(1024 * 16);
    let blocks_per_queue: usize = args
        .opt_value_from_str("--queue-size")
        .context("--queue-size must be an integer")?
        .unwrap_or(32);

    let rest = args.finish();
    if !rest.is_empty() {
        log::warn!("Ignoring unrecognized arguments: {rest:?}");
    }
    log::debug!(
        "Parsed args: {geometry} ({} sets, {} byte blocks) t={} v={verbose}",
        geometry.n_sets(),
        geometry.block_size(),
        trace_path.display()
    );

    let mut cache = Cache::new(geometry, Lru)?;
    let trace = Trace::read(&trace_path, records_per_block, blocks_per_queue)
        .with_context(|| format!("Could not open trace file {}", trace_path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let verbose_out: Option<&mut dyn Write> = if verbose {
        Some(&mut out as &mut dyn Write)
    } else {
        None
    };
    let n_records = simulate(&mut cache, &trace, verbose_out, n_warm, heartbeat_int)?;
    log::info!("Replayed {n_records} records from {}", trace_path.display());

    let stats = cache.stats();
    writeln!(out, "{}", report::summary_line(&stats))?;
    report::write_results(&env::current_dir()?, &stats)
        .with_context(|| format!("Could not write {}", report::RESULTS_FILE))?;
    if let Some(stats_path) = stats_path {
        report::write_json(&stats_path, &stats)
            .with_context(|| format!("Could not write {}", stats_path.display()))?;
    }
    Ok(())
}

fn read_geometry(args: &mut pico_args::Arguments) -> anyhow::Result<Geometry> {
    let config_str: Option<String> = args.opt_value_from_str("--config")?;
    let config_path: Option<PathBuf> = args.opt_value_from_str("-p")?;
    let config_str = match (config_str, config_path) {
        (Some(config_str), _) => Some(config_str),
        (None, Some(path)) => Some(
            fs::read_to_string(&path)
                .with_context(|| format!("Could not read config file {}", path.display()))?,
        ),
        (None, None) => None,
    };
    if let Some(config_str) = config_str {
        return serde_json::from_str(&config_str).context("Invalid geometry config");
    }

    let set_bits: Option<u32> = args
        .opt_value_from_str("-s")
        .context("-s should be a non-negative integer")?;
    let lines_per_set: Option<usize> = args
        .opt_value_from_str("-E")
        .context("-E should be a positive integer")?;
    let block_bits: Option<u32> = args
        .opt_value_from_str("-b")
        .context("-b should be a non-negative integer")?;
    let (Some(s), Some(e), Some(b)) = (set_bits, lines_per_set, block_bits) else {
        bail!("Missing required command line argument");
    };
    Ok(Geometry::new(s, e, b)?)
}

/// Replays the trace into the cache until the stream ends or turns bad,
/// returning the number of records applied. Counters are reset once the
/// first `n_warm` records have been applied.
fn simulate<R: Replace>(
    cache: &mut Cache<R>,
    trace: &Trace,
    mut verbose: Option<&mut dyn Write>,
    n_warm: u64,
    heartbeat_int: u64,
) -> io::Result<u64> {
    let mut n_records = 0;
    let mut next_heartbeat = heartbeat_int;

    for block in trace.rec.iter() {
        let records = match block {
            Ok(records) => records,
            Err(err) => {
                log::warn!("Stopping early: {err}");
                break;
            }
        };
        for record in &records {
            let results = operate(cache, record);
            if let Some(out) = verbose.as_mut() {
                writeln!(out, "{}", report::verbose_line(record, &results))?;
            }
            n_records += 1;
            if n_records == n_warm {
                cache.clear_stats();
                log::info!("Finished warmup after {n_warm} records");
            }
        }
        if heartbeat_int != 0 && n_records >= next_heartbeat {
            log::info!("Records: {n_records}");
            while next_heartbeat <= n_records {
                next_heartbeat += heartbeat_int;
            }
        }
    }
    Ok(n_records)
}

fn operate<R: Replace>(cache: &mut Cache<R>, record: &Record) -> Vec<AccessResult> {
    record.accesses().map(|addr| cache.access(addr)).collect()
}
